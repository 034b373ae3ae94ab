use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::trace;

use super::{Table, Warehouse};
use crate::error::Result;

/// Wrapper that memoizes results of any `Warehouse` by exact SQL text.
///
/// Entries live for the lifetime of the wrapper; there is no eviction.
/// Failed executions are not cached.
pub struct CachedWarehouse<W: Warehouse> {
    inner: W,
    cache: Arc<RwLock<HashMap<String, Table>>>,
}

impl<W: Warehouse> CachedWarehouse<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// The uncached warehouse, for statements that must always run
    pub fn inner(&self) -> &W {
        &self.inner
    }

    pub async fn clear_cache(&self) {
        self.cache.write().await.clear();
    }

    pub async fn cached_len(&self) -> usize {
        self.cache.read().await.len()
    }
}

#[async_trait]
impl<W: Warehouse> Warehouse for CachedWarehouse<W> {
    async fn execute(&self, sql: &str) -> Result<Table> {
        {
            let cache = self.cache.read().await;
            if let Some(table) = cache.get(sql) {
                trace!("result cache hit");
                return Ok(table.clone());
            }
        }

        let table = self.inner.execute(sql).await?;

        {
            let mut cache = self.cache.write().await;
            cache.insert(sql.to_string(), table.clone());
        }

        Ok(table)
    }
}
