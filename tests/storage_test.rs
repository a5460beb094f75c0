//! Integration tests for SQLite storage layer
//!
//! Tests database operations using an in-memory SQLite database.

use chrono::{Duration, Utc};

use deot::config::DatabaseConfig;
use deot::error::StorageError;
use deot::executor::AnalysisStats;
use deot::storage::{AnalysisRecord, AnalysisStatus, ExecutionInfo, SqliteStorage, Storage};
use deot::tree::TreeStats;

/// Create an in-memory storage instance for testing
async fn create_test_storage() -> SqliteStorage {
    SqliteStorage::new_in_memory()
        .await
        .expect("Failed to create in-memory storage")
}

fn execution() -> ExecutionInfo {
    ExecutionInfo {
        platform: "openai".to_string(),
        model: "gpt-4o".to_string(),
        temperature: 0.3,
        max_layer: 2,
        max_nodes: 5,
        validation_enabled: true,
    }
}

fn completed_record(id: &str) -> AnalysisRecord {
    AnalysisRecord::new(id, "How do tariffs affect shipping?", execution())
        .with_optimized_query("Effects of 2024 tariffs on container shipping volumes")
        .with_stats(
            AnalysisStats {
                total_nodes: 3,
                max_depth: 2,
                breadth_analyses: 1,
                depth_analyses: 0,
                validation_passed: 3,
                validation_failed: 0,
            },
            TreeStats {
                total_nodes: 3,
                max_depth: 2,
                breadth_decisions: 1,
                complete_decisions: 2,
                ..TreeStats::default()
            },
        )
        .with_visualization(format!("output/{}.mmd", id))
        .complete("Tariffs reduce volumes.")
}

#[cfg(test)]
mod record_tests {
    use super::*;

    #[tokio::test]
    async fn test_save_and_get_analysis() {
        let storage = create_test_storage().await;
        let record = completed_record("analysis_1");

        storage.save_analysis(&record).await.unwrap();
        let loaded = storage
            .get_analysis("analysis_1")
            .await
            .unwrap()
            .expect("record should exist");

        assert_eq!(loaded.id, record.id);
        assert_eq!(loaded.query, record.query);
        assert_eq!(loaded.optimized_query, record.optimized_query);
        assert_eq!(loaded.final_response.as_deref(), Some("Tariffs reduce volumes."));
        assert_eq!(loaded.status, AnalysisStatus::Completed);
        assert_eq!(loaded.stats, record.stats);
        assert_eq!(loaded.tree_stats, record.tree_stats);
        assert_eq!(loaded.execution, record.execution);
        assert_eq!(loaded.visualization_ref.as_deref(), Some("output/analysis_1.mmd"));
        assert!(loaded.completed_at.is_some());
        assert!((loaded.started_at - record.started_at).num_milliseconds().abs() < 1);
    }

    #[tokio::test]
    async fn test_get_nonexistent_analysis() {
        let storage = create_test_storage().await;
        let result = storage.get_analysis("missing").await.unwrap();
        assert!(result.is_none(), "Should return None for nonexistent analysis");
    }

    #[tokio::test]
    async fn test_save_replaces_existing_record() {
        let storage = create_test_storage().await;
        let running = AnalysisRecord::new("analysis_1", "q", execution());
        storage.save_analysis(&running).await.unwrap();

        let failed = running.fail("root build failed");
        storage.save_analysis(&failed).await.unwrap();

        let loaded = storage.get_analysis("analysis_1").await.unwrap().unwrap();
        assert_eq!(loaded.status, AnalysisStatus::Failed);
        assert_eq!(loaded.error.as_deref(), Some("root build failed"));
        assert!(loaded.final_response.is_none());
        assert_eq!(storage.list_analyses(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_analysis() {
        let storage = create_test_storage().await;
        storage.save_analysis(&completed_record("analysis_1")).await.unwrap();

        storage.delete_analysis("analysis_1").await.unwrap();
        assert!(storage.get_analysis("analysis_1").await.unwrap().is_none());

        let err = storage.delete_analysis("analysis_1").await.unwrap_err();
        assert!(matches!(err, StorageError::AnalysisNotFound { .. }));
    }
}

#[cfg(test)]
mod history_tests {
    use super::*;

    #[tokio::test]
    async fn test_list_newest_first_with_limit() {
        let storage = create_test_storage().await;
        let now = Utc::now();

        for (i, id) in ["analysis_a", "analysis_b", "analysis_c"].iter().enumerate() {
            let mut record = completed_record(id);
            record.started_at = now - Duration::minutes(10 - i as i64);
            storage.save_analysis(&record).await.unwrap();
        }

        let all = storage.list_analyses(10).await.unwrap();
        let ids: Vec<_> = all.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["analysis_c", "analysis_b", "analysis_a"]);

        let limited = storage.list_analyses(2).await.unwrap();
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[0].id, "analysis_c");
    }

    #[tokio::test]
    async fn test_list_empty() {
        let storage = create_test_storage().await;
        assert!(storage.list_analyses(5).await.unwrap().is_empty());
    }
}

#[cfg(test)]
mod file_tests {
    use super::*;

    #[tokio::test]
    async fn test_file_database_persists_across_connections() {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig {
            path: dir.path().join("nested").join("deot.db"),
            max_connections: 2,
        };

        {
            let storage = SqliteStorage::new(&config).await.unwrap();
            storage.save_analysis(&completed_record("analysis_1")).await.unwrap();
            storage.pool().close().await;
        }

        let storage = SqliteStorage::new(&config).await.unwrap();
        let loaded = storage.get_analysis("analysis_1").await.unwrap();
        assert!(loaded.is_some());
    }
}
