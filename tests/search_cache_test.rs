//! Search result cache: ranking, invalidation, corpus change races.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use mimir::cache::{
    MemorySharedCache, SearchResultCache, SharedCache, TieredCache, TieredCacheConfig,
};
use mimir::providers::{CorpusListener, InMemoryVectorIndex, VectorIndex};
use mimir::{FilterConditions, MimirError, PassageMetadata, SearchQuery, SearchResult};

use common::{keyword_vector, medical_index, passage};

fn result(id: &str, score: f32) -> SearchResult {
    SearchResult::new(id, score, id, "snippet", PassageMetadata::new("doc"))
}

fn search_cache() -> SearchResultCache {
    SearchResultCache::new(Arc::new(TieredCache::local_only()), "keyword-v1")
}

fn key(cache: &SearchResultCache, query: &str) -> String {
    cache.key_for(query, 5, 0.3, &FilterConditions::new())
}

async fn must_not_search() -> mimir::Result<Vec<SearchResult>> {
    panic!("expected a cache hit")
}

#[tokio::test]
async fn results_are_ranked_and_cached() {
    let cache = search_cache();
    let k = key(&cache, "hypertension");

    let first = cache
        .get_or_search(&k, || async {
            Ok(vec![result("b", 0.5), result("c", 0.9), result("a", 0.5), result("n", f32::NAN)])
        })
        .await
        .unwrap();
    assert!(!first.cached);
    let ids: Vec<_> = first.value.iter().map(|r| r.passage_id.as_str()).collect();
    assert_eq!(ids, ["c", "a", "b"], "NaN dropped, ties broken by id");

    let second = cache.get_or_search(&k, must_not_search).await.unwrap();
    assert!(second.cached);
    assert_eq!(second.value, first.value);
}

#[tokio::test]
async fn empty_results_are_cached() {
    let cache = search_cache();
    let k = key(&cache, "xyzzy");

    cache.get_or_search(&k, || async { Ok(Vec::new()) }).await.unwrap();
    let hit = cache.get_or_search(&k, must_not_search).await.unwrap();
    assert!(hit.cached);
    assert!(hit.value.is_empty());
}

#[tokio::test]
async fn search_errors_are_not_cached() {
    let cache = search_cache();
    let k = key(&cache, "q");

    let err = cache
        .get_or_search(&k, || async { Err(MimirError::Http("index down".into())) })
        .await
        .unwrap_err();
    assert!(matches!(err, MimirError::Http(_)));

    let retried = cache
        .get_or_search(&k, || async { Ok(vec![result("a", 0.8)]) })
        .await
        .unwrap();
    assert!(!retried.cached);
}

#[test]
fn parameters_take_part_in_the_key() {
    let cache = search_cache();
    let none = FilterConditions::new();
    let mut cardiology = FilterConditions::new();
    cardiology.insert("specialty".into(), serde_json::json!("cardiology"));

    let base = cache.key_for("q", 5, 0.3, &none);
    assert_ne!(base, cache.key_for("q", 6, 0.3, &none));
    assert_ne!(base, cache.key_for("q", 5, 0.31, &none));
    assert_ne!(base, cache.key_for("q", 5, 0.3, &cardiology));
    assert_ne!(base, cache.key_for("q2", 5, 0.3, &none));
    assert!(base.starts_with("search:"));

    let other_model = SearchResultCache::new(Arc::new(TieredCache::local_only()), "other-model");
    assert_ne!(base, other_model.key_for("q", 5, 0.3, &none));
}

#[tokio::test]
async fn invalidate_namespace_drops_only_search_entries() {
    let shared = Arc::new(MemorySharedCache::new());
    let l2: Arc<dyn SharedCache> = shared.clone();
    let tiered = Arc::new(TieredCache::init(TieredCacheConfig::new(), Some(l2)).unwrap());
    let cache = SearchResultCache::new(tiered.clone(), "keyword-v1");

    let k1 = key(&cache, "a");
    let k2 = key(&cache, "b");
    cache.get_or_search(&k1, || async { Ok(vec![result("x", 0.9)]) }).await.unwrap();
    cache.get_or_search(&k2, || async { Ok(vec![result("y", 0.9)]) }).await.unwrap();
    tiered.set("embed:keep", b"v".to_vec(), Duration::from_secs(60)).await;

    let before = cache.epoch();
    assert_eq!(cache.invalidate_namespace().await, 2);
    assert_eq!(cache.epoch(), before + 1);

    assert!(!shared.contains(&k1));
    assert!(!shared.contains(&k2));
    assert!(shared.contains("embed:keep"));
    let again = cache
        .get_or_search(&k1, || async { Ok(vec![result("x", 0.7)]) })
        .await
        .unwrap();
    assert!(!again.cached);
    assert_eq!(again.value[0].score, 0.7);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn invalidation_during_search_prevents_caching() {
    let cache = Arc::new(search_cache());
    let k = key(&cache, "q");

    let searching = {
        let cache = cache.clone();
        let k = k.clone();
        tokio::spawn(async move {
            cache
                .get_or_search(&k, || async {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    Ok(vec![result("stale", 0.9)])
                })
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    cache.invalidate_namespace().await;

    let stale = searching.await.unwrap().unwrap();
    assert!(!stale.cached);
    assert_eq!(stale.value[0].passage_id, "stale");

    let calls = AtomicUsize::new(0);
    let fresh = cache
        .get_or_search(&k, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![result("fresh", 0.9)])
        })
        .await
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1, "stale results must not be served");
    assert_eq!(fresh.value[0].passage_id, "fresh");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn invalidation_during_shared_read_is_not_served_later() {
    let shared = Arc::new(MemorySharedCache::new().with_latency(Duration::from_millis(100)));
    let node = |shared: &Arc<MemorySharedCache>| {
        let l2: Arc<dyn SharedCache> = shared.clone();
        let tiered = Arc::new(TieredCache::init(TieredCacheConfig::new(), Some(l2)).unwrap());
        Arc::new(SearchResultCache::new(tiered, "keyword-v1"))
    };
    let other_node = node(&shared);
    let cache = node(&shared);
    let k = key(&cache, "hypertension");

    other_node
        .get_or_search(&k, || async { Ok(vec![result("stale", 0.9)]) })
        .await
        .unwrap();

    let reading = {
        let cache = cache.clone();
        let k = k.clone();
        tokio::spawn(async move {
            cache
                .get_or_search(&k, || async { Ok(vec![result("fresh", 0.9)]) })
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    cache.invalidate_namespace().await;

    let raced = reading.await.unwrap().unwrap();
    assert!(!raced.cached);
    assert_eq!(raced.value[0].passage_id, "fresh");

    let calls = AtomicUsize::new(0);
    let after = cache
        .get_or_search(&k, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![result("fresh", 0.9)])
        })
        .await
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1, "invalidated entry must not come back");
    assert!(!after.cached);
    assert_eq!(after.value[0].passage_id, "fresh");
}

#[tokio::test]
async fn corpus_changes_invalidate_through_listener() {
    let index = medical_index().await;
    let cache = Arc::new(search_cache());
    let listener: Arc<dyn CorpusListener> = cache.clone();
    index.add_listener(listener);

    let query = SearchQuery {
        vector: keyword_vector("hypertension treatment"),
        top_k: 3,
        score_threshold: 0.0,
        filter: FilterConditions::new(),
    };
    let k = cache.key_for("hypertension treatment", 3, 0.0, &FilterConditions::new());

    let run = |index: Arc<InMemoryVectorIndex>, query: SearchQuery| async move {
        index.search(&query).await
    };

    let first = cache
        .get_or_search(&k, || run(index.clone(), query.clone()))
        .await
        .unwrap();
    assert!(!first.cached);
    let epoch = cache.epoch();

    index
        .upsert_document(
            "guideline-htn-2025",
            vec![passage(
                "htn-new",
                "guideline-htn-2025",
                "Updated guidance",
                "Hypertension treatment guidance.",
            )],
        )
        .await
        .unwrap();
    assert_eq!(cache.epoch(), epoch + 1);

    let second = cache
        .get_or_search(&k, || run(index.clone(), query.clone()))
        .await
        .unwrap();
    assert!(!second.cached);
    assert!(second.value.iter().any(|r| r.passage_id == "htn-new"));

    assert!(index.remove_document("guideline-htn-2025").await);
    assert_eq!(cache.epoch(), epoch + 2);
    assert!(!index.remove_document("guideline-htn-2025").await);
    assert_eq!(cache.epoch(), epoch + 2, "no-op removal does not invalidate");
}

#[tokio::test]
async fn corrupt_entry_is_replaced() {
    let tiered = Arc::new(TieredCache::local_only());
    let cache = SearchResultCache::new(tiered.clone(), "keyword-v1");
    let k = key(&cache, "q");
    tiered.set(&k, b"{not json".to_vec(), Duration::from_secs(60)).await;

    let resolved = cache
        .get_or_search(&k, || async { Ok(vec![result("a", 0.5)]) })
        .await
        .unwrap();
    assert!(!resolved.cached);
    assert_eq!(resolved.value.len(), 1);
}
