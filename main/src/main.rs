//! In-process demo driver: seeds the runtime store with fixtures, starts
//! the ingestion worker, queues a demo upload, then runs a handful of
//! queries through the orchestrator and prints the resulting envelopes.
//! No HTTP surface here, just the pipeline exercised directly.

use std::sync::Arc;
use std::time::Duration;

use common::config::EmbeddingBackendKind;
use common::model::{AccessMode, DemoDocument, GraphEdge, JobStatus};
use common::providers::{CriticModel, DeterministicCritic, DeterministicEmbeddingProvider};
use common::store::RuntimeStore;
use ingestion_worker::IngestionWorker;
use orchestrator::Orchestrator;
use retrieval_engine::RetrievalEngine;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEMO_QUESTIONS: &[&str] = &[
    "hello",
    "how many documents and graph edges do I have",
    "show graph dependencies for project alpha",
    "summarize the uploaded audit file",
];

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let config = common::config::get_config().unwrap_or_else(|e| {
        warn!(error = %e, "failed to load config, falling back to defaults");
        Default::default()
    });

    if !matches!(config.embedding_backend, EmbeddingBackendKind::Deterministic) {
        warn!(
            backend = ?config.embedding_backend,
            "no remote embedding backend is wired up in this build, using the deterministic fallback"
        );
    }

    let store = Arc::new(RuntimeStore::new());
    store.seed_demo_corpus(
        vec![DemoDocument {
            source: "alpha-notes.txt".to_string(),
            chunk_id: "demo-doc-1".to_string(),
            content: "Project Alpha is a retrieval service with document and graph dependencies."
                .to_string(),
        }],
        vec![
            GraphEdge {
                source: "project alpha".to_string(),
                relationship: "depends_on".to_string(),
                target: "common-lib".to_string(),
                evidence: "Cargo.toml manifest".to_string(),
            },
            GraphEdge {
                source: "project alpha".to_string(),
                relationship: "depends_on".to_string(),
                target: "retrieval-engine".to_string(),
                evidence: "workspace member".to_string(),
            },
        ],
    );

    let embedding_provider = Arc::new(DeterministicEmbeddingProvider::new(config.embedding_dimensions));
    let engine = RetrievalEngine::new(
        store.clone(),
        embedding_provider.clone(),
        None,
        None,
        None,
        config.rerank_backend,
        None,
    );
    let orchestrator = Orchestrator::new(
        store.clone(),
        engine,
        Arc::new(DeterministicCritic) as Arc<dyn CriticModel>,
        config.clone(),
    );

    let ingestion = IngestionWorker::new(store.clone(), embedding_provider, None, config.snapshot_path.clone());
    if let Err(e) = ingestion.start().await {
        warn!(error = %e, "ingestion worker failed to start");
    }

    let upload_job = ingestion
        .enqueue(
            "demo-upload.txt".to_string(),
            "text/plain".to_string(),
            "demo-user".to_string(),
            b"Project Alpha quarterly audit notes covering its graph and document dependencies."
                .to_vec(),
            None,
        )
        .await;
    match &upload_job {
        Ok(job_id) => info!(job_id, "queued demo upload"),
        Err(e) => warn!(error = %e, "failed to queue demo upload"),
    }

    if let Ok(job_id) = &upload_job {
        for _ in 0..50 {
            if let Some(job) = store.get_job(job_id) {
                if matches!(job.status, JobStatus::Success | JobStatus::Failed) {
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    for (i, question) in DEMO_QUESTIONS.iter().enumerate() {
        let thread_id = format!("demo-thread-{i}");
        let outcome = orchestrator
            .handle_query(question, &thread_id, Some("demo-user"), None, None, AccessMode::Demo)
            .await;

        info!(
            question,
            route = ?outcome.trace.route,
            policy = ?outcome.envelope.policy,
            confidence = ?outcome.envelope.confidence,
            "query handled"
        );
        println!("Q: {question}");
        println!("A: {}", outcome.envelope.answer);
        println!(
            "   policy={:?} confidence={:?} citations={}\n",
            outcome.envelope.policy,
            outcome.envelope.confidence,
            outcome.envelope.citations.len()
        );
    }

    ingestion.stop().await;
}
