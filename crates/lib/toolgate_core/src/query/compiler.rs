// @awa-component: QRY-QueryCompiler
//
//! Query Compiler: resolution + tool configuration → [`QueryDescriptor`].

use std::sync::Arc;

use tracing::debug;

use super::{QueryDescriptor, QueryError, Resolution, SortDirective};
use crate::embedding::Embedder;
use crate::spec::{DEFAULT_LIMIT, ToolSpec, VECTOR_ATTRIBUTE, VECTORIZE_ATTRIBUTE};

/// Builds query descriptors. Holds the embedding collaborator used for
/// `$vector` search slots.
#[derive(Clone)]
pub struct Compiler {
    embedder: Arc<dyn Embedder>,
}

impl Compiler {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self { embedder }
    }

    /// Compile a resolved call. An embedding failure aborts compilation.
    pub async fn compile(
        &self,
        spec: &ToolSpec,
        resolution: Resolution,
    ) -> Result<QueryDescriptor, QueryError> {
        let limit = match spec.limit {
            None => DEFAULT_LIMIT,
            Some(0) => {
                return Err(QueryError::Config(format!(
                    "tool {} has a limit of 0",
                    spec.name
                )));
            }
            Some(n) => n,
        };

        let sort = match resolution.search_query {
            Some(query) => Some(self.search_sort(spec, query).await?),
            None => spec.sort.clone().map(SortDirective::Static),
        };

        let filter = Some(resolution.filter).filter(|f| !f.is_empty());

        Ok(QueryDescriptor {
            filter,
            sort,
            projection: spec.projection.clone(),
            limit,
        })
    }

    async fn search_sort(&self, spec: &ToolSpec, query: String) -> Result<SortDirective, QueryError> {
        let slot = spec.search_slot().ok_or_else(|| {
            QueryError::Config(format!("tool {} has no search parameter", spec.name))
        })?;

        if let Some(model) = &slot.embedding_model {
            debug!(tool = %spec.name, model = %model, "generating query embedding");
            let vector = self
                .embedder
                .generate_embedding(&query, model)
                .await
                .map_err(QueryError::EmbeddingGenerationFailed)?;
            return Ok(SortDirective::Vector(vector));
        }

        match slot.attribute.as_str() {
            VECTORIZE_ATTRIBUTE => Ok(SortDirective::Vectorize(query)),
            VECTOR_ATTRIBUTE => Err(QueryError::InvalidSearchAttribute(format!(
                "{VECTOR_ATTRIBUTE} without embedding_model"
            ))),
            other => Err(QueryError::InvalidSearchAttribute(other.to_string())),
        }
    }
}
