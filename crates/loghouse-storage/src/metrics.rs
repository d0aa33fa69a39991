//! Storage metrics.
//!
//! An explicit metrics sink constructed against a caller-supplied registry
//! and passed by reference into the chunk store. Nothing here touches a
//! process-global registry.

use prometheus::{IntCounter, IntCounterVec, Opts, Registry};

use crate::error::Result;

const SIZE_CLASS_LABEL: &str = "size_class";

/// Counters for requests sent to the storage backend.
pub struct StorageMetrics {
    pub lists: IntCounterVec,
    pub reads: IntCounter,
    pub writes: IntCounter,
    pub deletes: IntCounter,
}

impl StorageMetrics {
    pub fn new(registry: &Registry) -> Result<Self> {
        let lists = IntCounterVec::new(
            Opts::new(
                "loghouse_storage_lists",
                "List requests sent to the storage backend",
            ),
            &[SIZE_CLASS_LABEL],
        )
        .map_err(internal)?;
        let reads = IntCounter::new(
            "loghouse_storage_reads",
            "Read requests sent to the storage backend",
        )
        .map_err(internal)?;
        let writes = IntCounter::new(
            "loghouse_storage_writes",
            "Write requests sent to the storage backend",
        )
        .map_err(internal)?;
        let deletes = IntCounter::new(
            "loghouse_storage_deletes",
            "Delete requests sent to the storage backend",
        )
        .map_err(internal)?;

        for collector in [
            Box::new(lists.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(reads.clone()),
            Box::new(writes.clone()),
            Box::new(deletes.clone()),
        ] {
            registry.register(collector).map_err(internal)?;
        }

        Ok(Self {
            lists,
            reads,
            writes,
            deletes,
        })
    }
}

fn internal(err: prometheus::Error) -> crate::Error {
    loghouse_core::Error::Internal(format!("unable to create storage metrics: {err}")).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_in_supplied_registry() {
        let registry = Registry::new();
        let metrics = StorageMetrics::new(&registry).unwrap();
        metrics.reads.inc();
        metrics.lists.with_label_values(&["small"]).inc();

        let families = registry.gather();
        assert!(families.iter().any(|f| f.get_name() == "loghouse_storage_reads"));
    }

    #[test]
    fn double_registration_fails() {
        let registry = Registry::new();
        StorageMetrics::new(&registry).unwrap();
        assert!(StorageMetrics::new(&registry).is_err());
    }
}
