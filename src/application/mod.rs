pub mod error;
pub mod feed;
pub mod fetch;
pub mod timeline;
