// @awa-component: QRY-QueryAPI
//
//! Parameter resolution and query compilation.
//!
//! [`resolve`] turns a tool's parameter list plus the caller's arguments into
//! filter clauses and an optional search query; [`Compiler::compile`] turns
//! that into a backend-agnostic [`QueryDescriptor`].

mod compiler;
mod descriptor;
mod resolver;

use thiserror::Error;

use crate::embedding::EmbeddingError;
use crate::expr::ExprError;

pub use compiler::Compiler;
pub use descriptor::{Clause, Filter, QueryDescriptor, SortDirective};
pub use resolver::{Arguments, Resolution, resolve};
pub(crate) use resolver::supplied;

/// Errors raised while resolving or compiling a call.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Parameter {0} is required")]
    MissingParameter(String),

    #[error("Invalid tool configuration: {0}")]
    Config(String),

    #[error("Search query attribute must be $vectorize or $vector (got {0})")]
    InvalidSearchAttribute(String),

    #[error("Failed to generate embedding: {0}")]
    EmbeddingGenerationFailed(#[source] EmbeddingError),

    #[error("Failed to evaluate expression for {param}: {source}")]
    Expression {
        param: String,
        #[source]
        source: ExprError,
    },
}
