//! # toolgate_core
//!
//! Core domain logic for Toolgate.
//!
//! A tool is a parameterised data query described declaratively by a
//! [`spec::ToolSpec`]. At call time the [`execution::ToolExecutor`] looks the
//! spec up in the [`catalog::Catalog`], resolves the caller's arguments into
//! filter clauses ([`query::resolve`]), compiles them into a
//! [`query::QueryDescriptor`] ([`query::Compiler`]), sends the descriptor to
//! the storage collaborator ([`dispatch`]) and records the lifecycle of the
//! call in the audit trail ([`audit`]).

pub mod audit;
pub mod catalog;
pub mod dispatch;
pub mod embedding;
pub mod execution;
pub mod expr;
pub mod query;
pub mod spec;
pub mod store;

#[cfg(test)]
mod test_support;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
