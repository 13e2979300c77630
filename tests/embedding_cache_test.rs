//! Embedding cache: idempotence, normalization, request coalescing.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use mimir::cache::{
    EmbeddingCache, MemorySharedCache, SharedCache, TieredCache, TieredCacheConfig,
    normalize_query,
};
use mimir::{Embedding, MimirError};

fn embedding_cache() -> EmbeddingCache {
    EmbeddingCache::new(Arc::new(TieredCache::local_only()), "test-model")
}

async fn must_not_compute() -> mimir::Result<Embedding> {
    panic!("expected a cache hit")
}

fn vector_for(text: &str) -> Embedding {
    Embedding::new(vec![text.len() as f32, 0.25, -1.5, f32::MIN_POSITIVE], "test-model")
}

#[tokio::test]
async fn second_lookup_is_served_from_cache() {
    let cache = embedding_cache();
    let calls = AtomicUsize::new(0);
    let compute = || async {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(vector_for("what is diabetes?"))
    };

    let first = cache.get_or_compute("what is diabetes?", compute).await.unwrap();
    let second = cache.get_or_compute("what is diabetes?", compute).await.unwrap();

    assert!(!first.cached);
    assert!(second.cached);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    // Bit-exact round trip through the cache
    assert_eq!(first.value, second.value);
}

#[tokio::test]
async fn equivalent_queries_share_one_entry() {
    let cache = embedding_cache();
    let a = normalize_query("  What is   DIABETES? ");
    let b = normalize_query("what is diabetes?");
    assert_eq!(cache.key_for(&a), cache.key_for(&b));

    cache
        .get_or_compute(&a, || async { Ok(vector_for("x")) })
        .await
        .unwrap();
    let hit = cache
        .get_or_compute(&b, must_not_compute)
        .await
        .unwrap();
    assert!(hit.cached);
}

#[tokio::test]
async fn different_models_do_not_share_entries() {
    let shared = Arc::new(TieredCache::local_only());
    let small = EmbeddingCache::new(shared.clone(), "small");
    let large = EmbeddingCache::new(shared, "large");
    assert_ne!(small.key_for("q"), large.key_for("q"));

    small
        .get_or_compute("q", || async { Ok(vector_for("q")) })
        .await
        .unwrap();
    let other = large
        .get_or_compute("q", || async { Ok(vector_for("qq")) })
        .await
        .unwrap();
    assert!(!other.cached);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_misses_compute_once() {
    let cache = Arc::new(embedding_cache());
    let calls = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..16 {
        let cache = cache.clone();
        let calls = calls.clone();
        handles.push(tokio::spawn(async move {
            cache
                .get_or_compute("chest pain differential", || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok(vector_for("chest pain differential"))
                })
                .await
        }));
    }

    for handle in handles {
        let resolved = handle.await.unwrap().unwrap();
        assert_eq!(resolved.value, vector_for("chest pain differential"));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_waiters_share_a_failure() {
    let cache = Arc::new(embedding_cache());
    let calls = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let cache = cache.clone();
        let calls = calls.clone();
        handles.push(tokio::spawn(async move {
            cache
                .get_or_compute("q", || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Err(MimirError::Http("connection reset".into()))
                })
                .await
        }));
    }

    for handle in handles {
        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, MimirError::Http(_)));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failures_are_not_cached() {
    let cache = embedding_cache();

    let err = cache
        .get_or_compute("q", || async { Err(MimirError::Timeout(Duration::from_secs(5))) })
        .await
        .unwrap_err();
    assert!(matches!(err, MimirError::Timeout(_)));

    let retried = cache
        .get_or_compute("q", || async { Ok(vector_for("q")) })
        .await
        .unwrap();
    assert!(!retried.cached);
}

#[tokio::test]
async fn forget_drops_the_entry() {
    let cache = embedding_cache();
    cache
        .get_or_compute("q", || async { Ok(vector_for("q")) })
        .await
        .unwrap();
    cache.forget("q").await;

    let again = cache
        .get_or_compute("q", || async { Ok(vector_for("q")) })
        .await
        .unwrap();
    assert!(!again.cached);
}

#[tokio::test]
async fn corrupt_entry_is_recomputed() {
    let tiered = Arc::new(TieredCache::local_only());
    let cache = EmbeddingCache::new(tiered.clone(), "test-model");
    tiered
        .set(&cache.key_for("q"), vec![0xde, 0xad], Duration::from_secs(60))
        .await;

    let resolved = cache
        .get_or_compute("q", || async { Ok(vector_for("q")) })
        .await
        .unwrap();
    assert!(!resolved.cached);
    assert_eq!(resolved.value, vector_for("q"));
}

#[tokio::test]
async fn entries_are_visible_to_other_processes() {
    let shared = Arc::new(MemorySharedCache::new());
    let tier = |shared: &Arc<MemorySharedCache>| {
        let l2: Arc<dyn SharedCache> = shared.clone();
        Arc::new(TieredCache::init(TieredCacheConfig::new(), Some(l2)).unwrap())
    };
    let node_a = EmbeddingCache::new(tier(&shared), "test-model");
    let node_b = EmbeddingCache::new(tier(&shared), "test-model");

    node_a
        .get_or_compute("q", || async { Ok(vector_for("q")) })
        .await
        .unwrap();
    let from_b = node_b
        .get_or_compute("q", must_not_compute)
        .await
        .unwrap();
    assert!(from_b.cached);
    assert_eq!(from_b.value, vector_for("q"));
}
