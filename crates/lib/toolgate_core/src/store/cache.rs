// @awa-component: STO-HandleCache
//
//! Process-wide cache of open database handles, keyed by database name.
//!
//! The first lookup for a name opens the handle; concurrent first lookups
//! for the same name share one connection attempt through a per-key
//! `OnceCell`. A failed attempt leaves the cell empty so a later call retries.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::OnceCell;
use tracing::debug;

use super::{Database, StorageClient, StoreError};

type Slot = Arc<OnceCell<Arc<dyn Database>>>;

pub struct Databases {
    client: Arc<dyn StorageClient>,
    handles: DashMap<String, Slot>,
}

impl Databases {
    pub fn new(client: Arc<dyn StorageClient>) -> Self {
        Self {
            client,
            handles: DashMap::new(),
        }
    }

    pub fn default_name(&self) -> &str {
        self.client.default_database()
    }

    /// Handle for `name`, or for the default database when `None`.
    pub async fn get(&self, name: Option<&str>) -> Result<Arc<dyn Database>, StoreError> {
        let name = name.unwrap_or_else(|| self.client.default_database());
        // clone the slot so no map guard is held across the await
        let slot: Slot = self.handles.entry(name.to_string()).or_default().clone();

        let db = slot
            .get_or_try_init(|| async {
                debug!(database = name, "opening database handle");
                self.client.connect(name).await
            })
            .await?;
        Ok(Arc::clone(db))
    }

    /// Number of database names with an open handle.
    pub fn open_count(&self) -> usize {
        self.handles.iter().filter(|e| e.value().initialized()).count()
    }
}
