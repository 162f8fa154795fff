//! In-memory history store

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use revtrail_core::{Attribution, Delta, EntityRef, HistoryRecord, QueryOptions};

use crate::errors::{version_conflict, Result};
use crate::fence::CommitFence;
use crate::traits::HistoryStore;

/// History store holding every record in process memory
///
/// Records for one entity live in a vector indexed by version; the write
/// lock makes the compare-and-swap in `insert_next` atomic.
#[derive(Debug, Default)]
pub struct MemoryHistoryStore {
    records: RwLock<HashMap<EntityRef, Vec<HistoryRecord>>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn latest_version(&self, entity: &EntityRef) -> Result<Option<u64>> {
        let records = self.records.read().await;
        Ok(records
            .get(entity)
            .and_then(|history| history.last())
            .map(|record| record.version))
    }

    async fn insert_next_fenced(
        &self,
        entity: &EntityRef,
        expected_latest: Option<u64>,
        diff: Delta,
        attribution: &Attribution,
        fence: &CommitFence,
    ) -> Result<HistoryRecord> {
        let mut records = self.records.write().await;
        let history = records.entry(entity.clone()).or_default();

        let actual = history.last().map(|record| record.version);
        if actual != expected_latest {
            return Err(version_conflict(entity, expected_latest, actual));
        }

        let version = history.len() as u64;
        let record = HistoryRecord::new(entity, version, diff, attribution);
        fence.commit("insert_next", || {
            history.push(record.clone());
            Ok(())
        })?;
        Ok(record)
    }

    async fn records_descending(
        &self,
        entity: &EntityRef,
        min_version: u64,
    ) -> Result<Vec<HistoryRecord>> {
        let records = self.records.read().await;
        Ok(records
            .get(entity)
            .map(|history| {
                history
                    .iter()
                    .rev()
                    .take_while(|record| record.version >= min_version)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn records_all(
        &self,
        entity: &EntityRef,
        options: &QueryOptions,
    ) -> Result<Vec<HistoryRecord>> {
        let records = self.records.read().await;
        let history = records.get(entity).cloned().unwrap_or_default();
        Ok(options.apply(history))
    }
}
