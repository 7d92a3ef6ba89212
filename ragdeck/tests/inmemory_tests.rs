//! Property tests for in-memory vector store search and upsert semantics.

use std::collections::HashMap;

use proptest::prelude::*;
use ragdeck::document::{Chunk, Record};
use ragdeck::inmemory::InMemoryVectorStore;
use ragdeck::vectorstore::VectorStore;

/// Generate a non-zero L2-normalized embedding of the given dimension.
fn arb_normalized_embedding(dim: usize) -> impl Strategy<Value = Vec<f32>> {
    proptest::collection::vec(-1.0f32..1.0f32, dim).prop_filter_map(
        "non-zero embedding",
        |mut v| {
            let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm < 1e-8 {
                return None;
            }
            for val in &mut v {
                *val /= norm;
            }
            Some(v)
        },
    )
}

/// Generate a record with a normalized embedding.
fn arb_record(dim: usize) -> impl Strategy<Value = Record> {
    ("[a-z]{3,8}", "[a-z ]{5,30}", arb_normalized_embedding(dim)).prop_map(
        |(id, text, embedding)| Chunk {
            id,
            text,
            embedding,
            metadata: HashMap::new(),
            document_id: "doc_1".to_string(),
        },
    )
}

fn dedup(records: &[Record]) -> Vec<Record> {
    let mut seen = std::collections::HashSet::new();
    records.iter().filter(|r| seen.insert(r.id.clone())).cloned().collect()
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap()
}

/// Searching returns at most `top_k` results in non-increasing score order.
mod prop_search_ordering {
    use super::*;

    const DIM: usize = 16;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn results_ordered_descending_and_bounded_by_top_k(
            records in proptest::collection::vec(arb_record(DIM), 1..20),
            query in arb_normalized_embedding(DIM),
            top_k in 0usize..25,
        ) {
            let unique = dedup(&records);
            let results = runtime().block_on(async {
                let store = InMemoryVectorStore::new();
                store.create_collection("test", DIM).await.unwrap();
                store.upsert("test", &unique).await.unwrap();
                store.search("test", &query, top_k).await.unwrap()
            });

            prop_assert!(results.len() <= top_k);
            prop_assert_eq!(results.len(), top_k.min(unique.len()));

            for window in results.windows(2) {
                prop_assert!(
                    window[0].score >= window[1].score,
                    "results not in descending order: {} < {}",
                    window[0].score,
                    window[1].score,
                );
            }
        }
    }
}

/// Adding the same records twice leaves the store unchanged.
mod prop_upsert_idempotence {
    use super::*;

    const DIM: usize = 8;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn re_adding_records_changes_nothing(
            records in proptest::collection::vec(arb_record(DIM), 1..15),
            query in arb_normalized_embedding(DIM),
        ) {
            let unique = dedup(&records);
            let (count_once, once, count_twice, twice) = runtime().block_on(async {
                let store = InMemoryVectorStore::new();
                store.create_collection("test", DIM).await.unwrap();

                store.upsert("test", &unique).await.unwrap();
                let count_once = store.count("test").await.unwrap();
                let once = store.search("test", &query, unique.len()).await.unwrap();

                store.upsert("test", &unique).await.unwrap();
                let count_twice = store.count("test").await.unwrap();
                let twice = store.search("test", &query, unique.len()).await.unwrap();
                (count_once, once, count_twice, twice)
            });

            prop_assert_eq!(count_once, unique.len());
            prop_assert_eq!(count_once, count_twice);
            let ids_once: Vec<String> = once.into_iter().map(|r| r.chunk.id).collect();
            let ids_twice: Vec<String> = twice.into_iter().map(|r| r.chunk.id).collect();
            prop_assert_eq!(ids_once, ids_twice);
        }
    }
}

#[tokio::test]
async fn query_identical_to_second_record_returns_it_with_score_one() {
    let store = InMemoryVectorStore::new();
    store.create_collection("deck", 3).await.unwrap();

    let record = |id: &str, embedding: Vec<f32>| Chunk {
        id: id.to_string(),
        text: format!("record {id}"),
        embedding,
        metadata: HashMap::new(),
        document_id: "deck".to_string(),
    };
    store
        .upsert(
            "deck",
            &[
                record("record_1", vec![0.9, 0.1, 0.0]),
                record("record_2", vec![0.2, 0.3, 0.9]),
                record("record_3", vec![0.0, 1.0, 0.1]),
            ],
        )
        .await
        .unwrap();

    let results = store.search("deck", &[0.2, 0.3, 0.9], 1).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].chunk.id, "record_2");
    assert!((results[0].score - 1.0).abs() < 1e-6);
}

#[tokio::test]
async fn concurrent_searches_see_whole_batches() {
    use std::sync::Arc;

    let store = Arc::new(InMemoryVectorStore::new());
    store.create_collection("c", 2).await.unwrap();

    let batch: Vec<Record> = (0..50)
        .map(|i| Chunk {
            id: format!("r{i}"),
            text: String::new(),
            embedding: vec![1.0, i as f32],
            metadata: HashMap::new(),
            document_id: "d".to_string(),
        })
        .collect();

    let writer = {
        let store = store.clone();
        tokio::spawn(async move { store.upsert("c", &batch).await })
    };
    let reader = {
        let store = store.clone();
        tokio::spawn(async move { store.search("c", &[1.0, 0.0], 100).await })
    };

    writer.await.unwrap().unwrap();
    let seen = reader.await.unwrap().unwrap().len();
    assert!(seen == 0 || seen == 50, "observed a partial batch of {seen}");
}
