//! End-to-end tests over the search crate: ranking a small corpus and
//! exhausting the daily neuron budget.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use prism_config::{EmbeddingConfig, ScoringConfig};
use prism_core::{CodeChunk, Language, QueryEmbedding, ScoringContext};
use prism_search::{
    BudgetTracker, EmbeddingClient, EmbeddingProvider, ProviderKind, ProviderStatus,
    ScoringService, SearchError, VectorStore,
};

const DIM: usize = 384;

/// Vector with the given leading component, unit magnitude.
fn slanted(leading: f32) -> Vec<f32> {
    let mut v = vec![0.0f32; DIM];
    v[0] = leading;
    v[1] = (1.0 - leading * leading).sqrt();
    v
}

fn query_axis() -> Vec<f32> {
    let mut v = vec![0.0f32; DIM];
    v[0] = 1.0;
    v
}

#[test]
fn scenario_simple_ranking() {
    let store = Arc::new(VectorStore::new(DIM));

    let login = CodeChunk::new(
        "auth/login.ts:login",
        "auth/login.ts",
        "function login",
        1,
        1,
        Language::Typescript,
    )
    .with_symbols(vec!["login".to_string()]);

    let parse_date = CodeChunk::new(
        "util/date.ts:parseDate",
        "util/date.ts",
        "function parseDate",
        1,
        1,
        Language::Typescript,
    )
    .with_symbols(vec!["parseDate".to_string()]);

    // Embeddings arranged so cosine(query, login) = 0.9 and
    // cosine(query, parse_date) = 0.1
    store.insert(login.clone(), slanted(0.9)).unwrap();
    store.insert(parse_date.clone(), slanted(0.1)).unwrap();

    let service =
        ScoringService::with_default_scorers(store.clone(), &ScoringConfig::default()).unwrap();
    let query = QueryEmbedding::new(query_axis(), "how do users log in?");
    let context = ScoringContext::default();

    let scored = service
        .score_batch(vec![login, parse_date], &query, &context)
        .unwrap();

    assert_eq!(scored.len(), 2);
    assert_eq!(scored[0].chunk.id, "auth/login.ts:login");
    assert_eq!(scored[0].rank, 1);
    assert_eq!(scored[1].chunk.id, "util/date.ts:parseDate");
    assert_eq!(scored[1].rank, 2);
    assert!(
        scored[0].score.total >= 0.5,
        "login chunk total {} should be >= 0.5",
        scored[0].score.total
    );
    assert!(scored[0].score.total > scored[1].score.total);
    assert!((scored[0].score.semantic - 0.9).abs() < 1e-3);
}

/// Remote-shaped provider whose per-embed cost is its dimension in neurons.
struct CostlyProvider {
    dimension: usize,
}

#[async_trait]
impl EmbeddingProvider for CostlyProvider {
    async fn embed_batch(
        &self,
        texts: Vec<String>,
    ) -> prism_search::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![0.5; self.dimension]).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Cloudflare
    }

    async fn check_status(&self) -> prism_search::Result<ProviderStatus> {
        Ok(ProviderStatus::healthy(ProviderKind::Cloudflare))
    }
}

#[tokio::test]
async fn scenario_budget_exhaustion() {
    // Daily limit 1000 neurons; each single-text embed costs 800
    let budget = Arc::new(BudgetTracker::with_limit(
        1000.0,
        0.80,
        Default::default(),
        1.0,
    ));
    let config = EmbeddingConfig {
        dimension: 800,
        inter_batch_delay_ms: 0,
        ..Default::default()
    };
    let client = EmbeddingClient::new(
        Arc::new(CostlyProvider { dimension: 800 }),
        None,
        budget.clone(),
        &config,
    );
    let cancel = CancellationToken::new();

    // First embed fits and is tracked
    client.embed("first query", &cancel).await.unwrap();
    assert_eq!(budget.stats().used, 800.0);

    // Second embed needs another 800 with only 200 left: fail fast
    let result = client.embed("second query", &cancel).await;
    match result {
        Err(SearchError::EmbeddingFailed(message)) => {
            assert!(message.contains("budget"), "unexpected message: {}", message)
        }
        other => panic!("expected EmbeddingFailed, got {:?}", other.map(|v| v.len())),
    }

    let stats = budget.stats();
    assert_eq!(stats.used, 800.0);
    assert_eq!(stats.remaining, 200.0);
}

#[test]
fn store_roundtrip_and_stats() {
    let store = VectorStore::new(4);
    let chunk = CodeChunk::new("id", "src/lib.rs", "fn main() {}", 1, 3, Language::Rust);

    store.insert(chunk.clone(), vec![1.0, 0.0, 0.0, 0.0]).unwrap();
    assert_eq!(store.get("id"), Some(chunk.clone()));
    assert_eq!(store.stats().chunk_count, 1);

    // Upsert leaves the count unchanged
    store.insert(chunk, vec![0.0, 1.0, 0.0, 0.0]).unwrap();
    assert_eq!(store.stats().chunk_count, 1);
}
