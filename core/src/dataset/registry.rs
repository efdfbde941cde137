//! Per-user dataset handles shared across requests

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use super::schema::validate;
use super::DatasetResult;
use crate::table::DataFrame;

/// User id to the dataset their questions run against
#[derive(Debug, Default)]
pub struct DatasetRegistry {
    datasets: RwLock<HashMap<String, Arc<DataFrame>>>,
}

impl DatasetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a validated dataset, replacing any previous one
    pub async fn insert(&self, user_id: &str, frame: DataFrame) -> DatasetResult<Arc<DataFrame>> {
        validate(&frame)?;
        let frame = Arc::new(frame);
        let rows = frame.len();
        self.datasets
            .write()
            .await
            .insert(user_id.to_string(), frame.clone());
        info!(user_id, rows, "Dataset registered");
        Ok(frame)
    }

    pub async fn get(&self, user_id: &str) -> Option<Arc<DataFrame>> {
        self.datasets.read().await.get(user_id).cloned()
    }

    pub async fn remove(&self, user_id: &str) -> Option<Arc<DataFrame>> {
        self.datasets.write().await.remove(user_id)
    }

    pub async fn len(&self) -> usize {
        self.datasets.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.datasets.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::schema::column_names;
    use crate::dataset::DatasetError;
    use crate::table::{Cell, Column};

    fn schema_frame(rows: usize) -> DataFrame {
        DataFrame::new(
            column_names()
                .into_iter()
                .map(|name| Column::new(name, vec![Cell::Null; rows]))
                .collect(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_insert_get_replace_remove() {
        let registry = DatasetRegistry::new();
        assert!(registry.is_empty().await);

        registry.insert("athlete-1", schema_frame(2)).await.unwrap();
        assert_eq!(registry.get("athlete-1").await.unwrap().len(), 2);
        assert!(registry.get("athlete-2").await.is_none());

        registry.insert("athlete-1", schema_frame(5)).await.unwrap();
        assert_eq!(registry.len().await, 1);
        assert_eq!(registry.get("athlete-1").await.unwrap().len(), 5);

        assert!(registry.remove("athlete-1").await.is_some());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_invalid_dataset_is_refused() {
        let registry = DatasetRegistry::new();
        let frame = DataFrame::new(vec![Column::new("id", vec![Cell::Int(1)])]).unwrap();
        assert!(matches!(
            registry.insert("athlete-1", frame).await,
            Err(DatasetError::MissingColumns(_))
        ));
        assert!(registry.is_empty().await);
    }

    #[test]
    fn test_shared_snapshot_survives_replacement() {
        tokio_test::block_on(async {
            let registry = DatasetRegistry::new();
            registry.insert("athlete-1", schema_frame(3)).await.unwrap();
            let held = registry.get("athlete-1").await.unwrap();
            registry.insert("athlete-1", schema_frame(1)).await.unwrap();
            // a running query keeps the table it started with
            assert_eq!(held.len(), 3);
            assert_eq!(registry.get("athlete-1").await.unwrap().len(), 1);
        });
    }
}
