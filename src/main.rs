use std::{
    io::{self, Write},
    pin::pin,
    process,
};

use futures::stream::TryStreamExt;
use tootline::{
    application::error::AppError,
    config::{self, PageArgs, RemoteSettings, TimelineArgs},
    domain::types::{Scope, TimelineQuery},
    infra::{error::InfraError, http::open_feed, telemetry},
};
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    let chain = error.chain();
    if dispatcher::has_been_set() {
        error!(error = %error, ?chain, "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_writer(io::stderr)
        .with_max_level(Level::ERROR)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, ?chain, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match cli_args.command {
        config::Command::Timeline(args) => run_timeline(&settings.remote, args).await,
        config::Command::Page(args) => run_page(&settings.remote, args).await,
    }
}

fn scope_for(federated: bool) -> Scope {
    Scope::from_local_flag(!federated)
}

async fn run_timeline(remote: &RemoteSettings, args: TimelineArgs) -> Result<(), AppError> {
    let mut query = TimelineQuery::new(scope_for(args.federated));
    if let Some(newest) = args.newest {
        query = query.newest(newest);
    }
    if let Some(oldest) = args.oldest {
        query = query.oldest(oldest);
    }

    info!(
        target = "tootline::timeline",
        host = %args.host,
        scope = %query.scope,
        newest = ?query.newest,
        oldest = ?query.oldest,
        "Starting timeline walk"
    );

    let limit = args.limit.unwrap_or(usize::MAX);
    let mut source = open_feed(&args.host, remote)?;
    let mut printed = 0_usize;

    if limit > 0 {
        let mut statuses = pin!(source.iterate(query).into_stream());
        let stdout = io::stdout();
        let mut out = stdout.lock();
        while let Some(status) = statuses.try_next().await? {
            let line = serde_json::to_string(&status)
                .map_err(|err| AppError::unexpected(format!("failed to render status: {err}")))?;
            writeln!(out, "{line}").map_err(InfraError::from)?;
            printed += 1;
            if printed >= limit {
                break;
            }
        }
        out.flush().map_err(InfraError::from)?;
    }

    info!(
        target = "tootline::timeline",
        printed,
        cached_spans = source.cache().span_count(),
        "Timeline walk completed"
    );
    Ok(())
}

async fn run_page(remote: &RemoteSettings, args: PageArgs) -> Result<(), AppError> {
    let scope = scope_for(args.federated);
    let mut source = open_feed(&args.host, remote)?;
    let page = source.get_page(scope, args.from_id).await?;

    let out = serde_json::to_string_pretty(&page)
        .map_err(|err| AppError::unexpected(format!("failed to render page: {err}")))?;
    println!("{out}");
    Ok(())
}
