use thiserror::Error;

use toolgate_core::catalog::CatalogError;
use toolgate_core::store::StoreError;
use toolgate_mcp::ServeError;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{}", .0)]
    Custom(String),

    #[error("IO::{:?}: {}", .0.kind(), .0)]
    Io(#[from] std::io::Error),

    #[error("Catalog: {}", .0)]
    Catalog(#[from] CatalogError),

    #[error("Store: {}", .0)]
    Store(#[from] StoreError),

    #[error("MCP: {}", .0)]
    Serve(#[from] ServeError),

    #[error("Logging: {}", .0)]
    Logging(String),
}
