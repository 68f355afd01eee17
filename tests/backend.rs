//! Conformance tests every storage backend must pass.

use chrono::DateTime;
use model_registry::hash::compute_sha256_hash;
use model_registry::storage::{
    BackendError, DuckDbBackend, InMemoryBackend, ModelInfo, StorageBackend, VersionArgs,
};
use std::collections::HashMap;
use std::sync::Arc;

fn user_data(entries: &[(&str, &str)]) -> HashMap<String, String> {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

async fn push(backend: &dyn StorageBackend, model_id: &str, data: &[u8]) -> u32 {
    backend
        .create_or_update_model_version(model_id, VersionArgs::new(data.to_vec()))
        .await
        .unwrap()
        .version_number
}

async fn check_missing_versions(backend: Arc<dyn StorageBackend>) {
    assert_eq!(
        backend.retrieve_model_version_info("m", 0).await,
        Err(BackendError::unknown_model("m"))
    );

    backend.create_or_update_model(ModelInfo::new("m")).await.unwrap();
    for version_number in [0, 1, 3] {
        assert_eq!(
            backend.retrieve_model_version_info("m", version_number).await,
            Err(BackendError::unknown_model_version("m", 0))
        );
        assert_eq!(
            backend.retrieve_model_version_data("m", version_number).await,
            Err(BackendError::unknown_model_version("m", 0))
        );
        assert_eq!(
            backend.delete_model_version("m", version_number).await,
            Err(BackendError::unknown_model_version("m", 0))
        );
    }

    push(backend.as_ref(), "m", b"one").await;
    assert_eq!(
        backend.retrieve_model_version_info("m", 2).await,
        Err(BackendError::unknown_model_version("m", 2))
    );
}

async fn check_sequential_numbering(backend: Arc<dyn StorageBackend>) {
    for expected in 1..=3 {
        assert_eq!(push(backend.as_ref(), "m", b"data").await, expected);
        assert_eq!(
            backend.retrieve_model_info("m").await.unwrap().latest_version_number,
            expected
        );
    }

    let next = backend
        .create_or_update_model_version("m", VersionArgs::new(b"four".to_vec()).with_version_number(4))
        .await
        .unwrap();
    assert_eq!(next.version_number, 4);

    let gap = backend
        .create_or_update_model_version("m", VersionArgs::new(b"six".to_vec()).with_version_number(6))
        .await;
    assert_eq!(
        gap,
        Err(BackendError::InvalidVersionNumber {
            model_id: "m".into(),
            version_number: 6,
            next_version_number: 5,
        })
    );
    assert_eq!(
        backend.retrieve_model_version_info("m", 6).await,
        Err(BackendError::unknown_model_version("m", 6))
    );

    let latest = backend.retrieve_model_version_info("m", 0).await.unwrap();
    assert_eq!(latest.version_number, 4);
    assert_eq!(latest.data_size, 4);
}

async fn check_model_upsert(backend: Arc<dyn StorageBackend>) {
    assert!(!backend.has_model("m").await.unwrap());

    let created = backend
        .create_or_update_model(ModelInfo::new("m").with_user_data(user_data(&[("a", "1"), ("b", "2")])))
        .await
        .unwrap();
    assert_eq!(created.latest_version_number, 0);
    assert!(backend.has_model("m").await.unwrap());

    push(backend.as_ref(), "m", b"data").await;

    // User data is replaced wholesale, never merged, and the latest version is kept.
    let replaced = ModelInfo::new("m").with_user_data(user_data(&[("c", "3")]));
    backend.create_or_update_model(replaced.clone()).await.unwrap();
    let updated = backend.create_or_update_model(replaced).await.unwrap();
    assert_eq!(updated.user_data, user_data(&[("c", "3")]));
    assert_eq!(updated.latest_version_number, 1);

    let stored = backend.retrieve_model_info("m").await.unwrap();
    assert_eq!(stored, updated);
}

async fn check_version_creation_creates_model(backend: Arc<dyn StorageBackend>) {
    let info = backend
        .create_or_update_model_version(
            "implicit",
            VersionArgs::new(b"payload".to_vec())
                .with_archived(true)
                .with_user_data(user_data(&[("stage", "prod")]))
                .with_creation_timestamp(DateTime::from_timestamp_nanos(1_600_000_000_123_456_789)),
        )
        .await
        .unwrap();
    assert_eq!(info.version_number, 1);

    let model = backend.retrieve_model_info("implicit").await.unwrap();
    assert!(model.user_data.is_empty());
    assert_eq!(model.latest_version_number, 1);

    let stored = backend.retrieve_model_version_info("implicit", 1).await.unwrap();
    assert_eq!(stored, info);
    assert!(stored.archived);
    assert_eq!(stored.user_data, user_data(&[("stage", "prod")]));
    assert_eq!(stored.creation_timestamp.timestamp_nanos_opt(), Some(1_600_000_000_123_456_789));
    assert_eq!(stored.data_hash, compute_sha256_hash(b"payload"));
    assert_eq!(stored.data_size, 7);
}

async fn check_delete_model_cascades(backend: Arc<dyn StorageBackend>) {
    push(backend.as_ref(), "m", b"one").await;
    push(backend.as_ref(), "m", b"two").await;
    push(backend.as_ref(), "other", b"kept").await;

    backend.delete_model("m").await.unwrap();
    assert!(!backend.has_model("m").await.unwrap());
    for version_number in [0, 1, 2] {
        assert_eq!(
            backend.retrieve_model_version_info("m", version_number).await,
            Err(BackendError::unknown_model("m"))
        );
    }
    assert_eq!(backend.delete_model("m").await, Err(BackendError::unknown_model("m")));
    assert_eq!(
        backend.list_model_version_infos("m", 0, 0).await,
        Err(BackendError::unknown_model("m"))
    );

    assert_eq!(&backend.retrieve_model_version_data("other", 1).await.unwrap()[..], b"kept");

    // A recreated model starts numbering from scratch.
    assert_eq!(push(backend.as_ref(), "m", b"again").await, 1);
}

async fn check_delete_version_keeps_numbering(backend: Arc<dyn StorageBackend>) {
    for data in [&b"one"[..], b"two", b"three"] {
        push(backend.as_ref(), "m", data).await;
    }
    backend.delete_model_version("m", 2).await.unwrap();

    assert_eq!(
        backend.retrieve_model_version_info("m", 2).await,
        Err(BackendError::unknown_model_version("m", 2))
    );
    let numbers: Vec<u32> = backend
        .list_model_version_infos("m", 0, 0)
        .await
        .unwrap()
        .iter()
        .map(|info| info.version_number)
        .collect();
    assert_eq!(numbers, vec![1, 3]);
    assert_eq!(&backend.retrieve_model_version_data("m", 3).await.unwrap()[..], b"three");

    // Freed numbers are never reused, even when the latest version goes away.
    backend.delete_model_version("m", 0).await.unwrap();
    assert_eq!(push(backend.as_ref(), "m", b"four").await, 4);
    assert_eq!(backend.retrieve_model_info("m").await.unwrap().latest_version_number, 4);
}

async fn check_model_listing_pagination(backend: Arc<dyn StorageBackend>) {
    let mut expected: Vec<String> = (0..25).map(|i| format!("model-{:02}", (i * 7) % 25)).collect();
    for model_id in &expected {
        backend.create_or_update_model(ModelInfo::new(model_id.clone())).await.unwrap();
    }
    expected.sort();

    assert_eq!(backend.list_models(0, 0).await.unwrap(), expected);

    for page_size in [1, 4, 7, 25, 100] {
        let mut listed = Vec::new();
        let mut offset = 0;
        loop {
            let page = backend.list_models(offset, page_size).await.unwrap();
            if page.is_empty() {
                break;
            }
            assert!(page.len() <= page_size);
            offset += page.len();
            listed.extend(page);
        }
        assert_eq!(listed, expected, "page size {}", page_size);
    }
}

async fn check_version_listing_pagination(backend: Arc<dyn StorageBackend>) {
    for i in 0..10u8 {
        push(backend.as_ref(), "m", &[i]).await;
    }
    backend.delete_model_version("m", 5).await.unwrap();
    let expected: Vec<u32> = (1..=10).filter(|&n| n != 5).collect();

    for page_size in [1, 3, 9, 50] {
        let mut listed = Vec::new();
        let mut initial = 0;
        loop {
            let page = backend.list_model_version_infos("m", initial, page_size).await.unwrap();
            let Some(last) = page.last() else {
                break;
            };
            initial = last.version_number + 1;
            listed.extend(page.iter().map(|info| info.version_number));
        }
        assert_eq!(listed, expected, "page size {}", page_size);
    }

    let tail = backend.list_model_version_infos("m", 5, 2).await.unwrap();
    assert_eq!(tail.iter().map(|info| info.version_number).collect::<Vec<_>>(), vec![6, 7]);
}

async fn check_listing_past_the_end(backend: Arc<dyn StorageBackend>) {
    push(backend.as_ref(), "m", b"data").await;

    for offset in [1, i64::MAX as usize, (i64::MAX as u64 + 1) as usize, usize::MAX] {
        assert!(
            backend.list_models(offset, 0).await.unwrap().is_empty(),
            "offset {}",
            offset
        );
    }
    assert!(backend.list_models(usize::MAX, 10).await.unwrap().is_empty());
    assert!(backend.list_model_version_infos("m", u32::MAX, 0).await.unwrap().is_empty());
}

async fn check_concurrent_version_creation(backend: Arc<dyn StorageBackend>) {
    backend.create_or_update_model(ModelInfo::new("m")).await.unwrap();

    let tasks: Vec<_> = (0..20u8)
        .map(|i| {
            let backend = backend.clone();
            tokio::spawn(async move {
                backend
                    .create_or_update_model_version("m", VersionArgs::new(vec![i; 16]))
                    .await
                    .unwrap()
                    .version_number
            })
        })
        .collect();

    let mut numbers = Vec::new();
    for task in tasks {
        numbers.push(task.await.unwrap());
    }
    numbers.sort_unstable();
    assert_eq!(numbers, (1..=20).collect::<Vec<u32>>());
    assert_eq!(backend.retrieve_model_info("m").await.unwrap().latest_version_number, 20);
}

async fn check_version_update_scenario(backend: Arc<dyn StorageBackend>) {
    backend.create_or_update_model(ModelInfo::new("m1")).await.unwrap();

    let first: Vec<u8> = (0..5000).map(|i| (i % 256) as u8).collect();
    let created = backend
        .create_or_update_model_version("m1", VersionArgs::new(first.clone()))
        .await
        .unwrap();
    assert_eq!(created.version_number, 1);
    assert_eq!(created.data_size, 5000);

    let second = vec![42u8; 1200];
    let updated = backend
        .create_or_update_model_version("m1", VersionArgs::new(second.clone()).with_version_number(1))
        .await
        .unwrap();
    assert_eq!(updated.version_number, 1);
    assert_eq!(updated.data_size, 1200);
    assert_eq!(updated.data_hash, compute_sha256_hash(&second));
    assert_ne!(updated.data_hash, created.data_hash);

    assert_eq!(&backend.retrieve_model_version_data("m1", 1).await.unwrap()[..], &second[..]);
    assert_eq!(backend.retrieve_model_info("m1").await.unwrap().latest_version_number, 1);
    assert_eq!(backend.list_model_version_infos("m1", 0, 0).await.unwrap().len(), 1);
}

async fn check_destroy(backend: Arc<dyn StorageBackend>) {
    push(backend.as_ref(), "m", b"data").await;
    backend.destroy().await.unwrap();

    assert!(backend.retrieve_model_info("m").await.is_err());
    assert!(backend
        .create_or_update_model_version("m", VersionArgs::new(b"late".to_vec()))
        .await
        .is_err());
}

macro_rules! backend_conformance_tests {
    ($name:ident, $backend:expr) => {
        mod $name {
            use super::*;

            fn backend() -> Arc<dyn StorageBackend> {
                Arc::new($backend)
            }

            #[tokio::test]
            async fn missing_versions() {
                check_missing_versions(backend()).await;
            }

            #[tokio::test]
            async fn sequential_numbering() {
                check_sequential_numbering(backend()).await;
            }

            #[tokio::test]
            async fn model_upsert() {
                check_model_upsert(backend()).await;
            }

            #[tokio::test]
            async fn version_creation_creates_model() {
                check_version_creation_creates_model(backend()).await;
            }

            #[tokio::test]
            async fn delete_model_cascades() {
                check_delete_model_cascades(backend()).await;
            }

            #[tokio::test]
            async fn delete_version_keeps_numbering() {
                check_delete_version_keeps_numbering(backend()).await;
            }

            #[tokio::test]
            async fn model_listing_pagination() {
                check_model_listing_pagination(backend()).await;
            }

            #[tokio::test]
            async fn version_listing_pagination() {
                check_version_listing_pagination(backend()).await;
            }

            #[tokio::test]
            async fn listing_past_the_end() {
                check_listing_past_the_end(backend()).await;
            }

            #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
            async fn concurrent_version_creation() {
                check_concurrent_version_creation(backend()).await;
            }

            #[tokio::test]
            async fn version_update_scenario() {
                check_version_update_scenario(backend()).await;
            }

            #[tokio::test]
            async fn destroy() {
                check_destroy(backend()).await;
            }
        }
    };
}

backend_conformance_tests!(memory, InMemoryBackend::new());
backend_conformance_tests!(duckdb, DuckDbBackend::new_in_memory().unwrap());

#[tokio::test]
async fn duckdb_file_backend_conformance() {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("models.duckdb");
    let backend: Arc<dyn StorageBackend> = Arc::new(DuckDbBackend::new(path.to_str().unwrap()).unwrap());

    check_version_update_scenario(backend.clone()).await;
    check_delete_version_keeps_numbering(backend).await;
}
