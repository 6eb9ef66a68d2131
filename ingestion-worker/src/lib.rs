//! The ingestion worker: a single-consumer cooperative queue that
//! parses, chunks, embeds and optionally upserts an uploaded document,
//! persisting a snapshot after every stage transition.

mod chunking;
mod state;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use common::error::AppError;
use common::model::{
    ChunkMetadata, DocumentChunk, IngestionJob, JobStage, JobStatus, QueuedUpload, RetrievalHit,
    SourceType,
};
use common::providers::{DocumentStore, EmbeddingProvider};
use common::store::RuntimeStore;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use state::ready;

const CHUNK_SIZE: usize = 600;
const CHUNK_OVERLAP: usize = 120;

const SUPPORTED_CONTENT_TYPES: &[&str] = &[
    "text/plain",
    "text/markdown",
    "application/pdf",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
];

enum QueueMessage {
    Job(String),
    Stop,
}

struct WorkerContext {
    store: Arc<RuntimeStore>,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    document_store: Option<Arc<dyn DocumentStore>>,
    snapshot_path: PathBuf,
}

pub struct IngestionWorker {
    ctx: Arc<WorkerContext>,
    sender: Mutex<Option<mpsc::UnboundedSender<QueueMessage>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl IngestionWorker {
    pub fn new(
        store: Arc<RuntimeStore>,
        embedding_provider: Arc<dyn EmbeddingProvider>,
        document_store: Option<Arc<dyn DocumentStore>>,
        snapshot_path: PathBuf,
    ) -> Self {
        Self {
            ctx: Arc::new(WorkerContext { store, embedding_provider, document_store, snapshot_path }),
            sender: Mutex::new(None),
            handle: Mutex::new(None),
        }
    }

    /// Hydrates from the durable snapshot, re-enqueues any job left in
    /// `queued`/`processing` with a matching upload, and spawns the
    /// consumer loop.
    pub async fn start(&self) -> Result<(), AppError> {
        self.ctx.store.hydrate_from_snapshot(&self.ctx.snapshot_path).await?;

        let (tx, rx) = mpsc::unbounded_channel();

        let recoverable: Vec<String> = self
            .ctx
            .store
            .list_jobs()
            .into_iter()
            .filter(|job| matches!(job.status, JobStatus::Queued | JobStatus::Processing))
            .filter(|job| self.ctx.store.get_queued_upload(&job.job_id).is_some())
            .map(|job| job.job_id)
            .collect();

        for job_id in &recoverable {
            info!(job_id, "recovering ingestion job from snapshot");
            let _ = tx.send(QueueMessage::Job(job_id.clone()));
        }

        let ctx = Arc::clone(&self.ctx);
        let handle = tokio::spawn(async move { run_loop(ctx, rx).await });

        *self.sender.lock().unwrap_or_else(|p| p.into_inner()) = Some(tx);
        *self.handle.lock().unwrap_or_else(|p| p.into_inner()) = Some(handle);
        Ok(())
    }

    /// Queues a new upload and returns its job id. Fails if `start` has not
    /// been called.
    pub async fn enqueue(
        &self,
        filename: String,
        content_type: String,
        user_id: String,
        bytes: Vec<u8>,
        user_access_token: Option<String>,
    ) -> Result<String, AppError> {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
            .ok_or_else(|| AppError::Unsupported("ingestion worker not started".to_string()))?;

        let job_id = Uuid::new_v4().to_string();
        let job = IngestionJob::new(job_id.clone(), filename.clone(), content_type.clone(), user_id.clone());
        let upload = QueuedUpload {
            job_id: job_id.clone(),
            user_id,
            filename,
            content_type,
            bytes,
            user_access_token,
        };

        self.ctx.store.insert_job(job);
        self.ctx.store.enqueue_upload(upload);
        self.ctx.store.persist_snapshot(&self.ctx.snapshot_path).await?;

        sender
            .send(QueueMessage::Job(job_id.clone()))
            .map_err(|_| AppError::Internal("ingestion worker loop is gone".to_string()))?;

        Ok(job_id)
    }

    /// Pushes the stop sentinel and waits for the in-flight job to drain.
    pub async fn stop(&self) {
        let sender = self.sender.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(sender) = sender {
            let _ = sender.send(QueueMessage::Stop);
        }

        let handle = self.handle.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

async fn run_loop(ctx: Arc<WorkerContext>, mut rx: mpsc::UnboundedReceiver<QueueMessage>) {
    while let Some(message) = rx.recv().await {
        match message {
            QueueMessage::Job(job_id) => process_job(&ctx, job_id).await,
            QueueMessage::Stop => break,
        }
    }
}

#[instrument(skip(ctx))]
async fn process_job(ctx: &WorkerContext, job_id: String) {
    let Some(mut job) = ctx.store.get_job(&job_id) else {
        warn!(job_id, "job vanished before processing, skipping");
        return;
    };
    let Some(upload) = ctx.store.get_queued_upload(&job_id) else {
        warn!(job_id, "queued upload vanished before processing, skipping");
        return;
    };

    job.status = JobStatus::Processing;
    ctx.store.update_job(job.clone());

    if let Err(err) = drive(ctx, &mut job, &upload).await {
        job.status = JobStatus::Failed;
        job.stage = JobStage::Failed;
        job.error_message = Some(err.to_string());
        ctx.store.update_job(job.clone());
        warn!(job_id = %job.job_id, error = %err, "ingestion job failed");
    }

    ctx.store.remove_queued_upload(&job_id);
    if let Err(err) = ctx.store.persist_snapshot(&ctx.snapshot_path).await {
        warn!(error = %err, "failed to persist snapshot after job completion");
    }
}

async fn drive(ctx: &WorkerContext, job: &mut IngestionJob, upload: &QueuedUpload) -> Result<(), AppError> {
    if !SUPPORTED_CONTENT_TYPES.contains(&upload.content_type.as_str()) {
        return Err(AppError::Unsupported("Unsupported file format. Use PDF, DOCX, MD, or TXT.".to_string()));
    }

    let machine = ready();

    let machine = machine.parse().map_err(|(_, guard)| map_guard_error("parse", &guard))?;
    advance(ctx, job, JobStage::Parsing).await?;

    let text = String::from_utf8_lossy(&upload.bytes).into_owned();

    let machine = machine.chunk().map_err(|(_, guard)| map_guard_error("chunk", &guard))?;
    advance(ctx, job, JobStage::Chunking).await?;

    let windows = chunking::chunk_text(&text, CHUNK_SIZE, CHUNK_OVERLAP);
    let contents: Vec<String> = windows.iter().map(|w| w.content.clone()).collect();

    let machine = machine.embed().map_err(|(_, guard)| map_guard_error("embed", &guard))?;
    advance(ctx, job, JobStage::Embedding).await?;

    let embeddings = ctx.embedding_provider.embed_documents(&contents).await?;

    let mut chunks = Vec::with_capacity(windows.len());
    for (index, window) in windows.into_iter().enumerate() {
        chunks.push(DocumentChunk {
            chunk_id: format!("{}-{}", job.job_id, window.offset_start),
            content: window.content,
            metadata: ChunkMetadata {
                source: upload.filename.clone(),
                page: None,
                offset_start: window.offset_start,
                offset_end: window.offset_end,
                user_id: upload.user_id.clone(),
            },
            // fewer returned vectors than chunks degrades to an empty
            // embedding per chunk rather than failing the job.
            embedding: embeddings.get(index).cloned().unwrap_or_default(),
        });
    }

    let final_machine = if let (Some(store), Some(token)) =
        (&ctx.document_store, upload.user_access_token.as_deref())
    {
        let machine = machine.upsert().map_err(|(_, guard)| map_guard_error("upsert", &guard))?;
        advance(ctx, job, JobStage::Upserting).await?;

        for chunk in &chunks {
            let hit = RetrievalHit {
                source_id: chunk.chunk_id.clone(),
                score: 0.0,
                content: chunk.content.clone(),
                source_type: SourceType::PrivateDocument,
                location: format!("{}#{}", chunk.metadata.source, chunk.metadata.offset_start),
            };
            if let Err(err) = store.upsert_chunk(token, hit).await {
                warn!(error = %err, chunk_id = %chunk.chunk_id, "remote upsert failed, chunk kept locally only");
            }
        }

        machine.complete().map_err(|(_, guard)| map_guard_error("complete", &guard))?
    } else {
        machine.complete().map_err(|(_, guard)| map_guard_error("complete", &guard))?
    };
    let _ = final_machine;

    job.chunk_count += chunks.len();
    ctx.store.append_chunks(&upload.user_id, chunks);
    job.stage = JobStage::Completed;
    job.status = JobStatus::Success;
    ctx.store.update_job(job.clone());
    ctx.store.persist_snapshot(&ctx.snapshot_path).await?;

    Ok(())
}

async fn advance(ctx: &WorkerContext, job: &mut IngestionJob, stage: JobStage) -> Result<(), AppError> {
    job.stage = stage;
    ctx.store.update_job(job.clone());
    ctx.store.persist_snapshot(&ctx.snapshot_path).await
}

fn map_guard_error(event: &str, guard: &state_machines::core::GuardError) -> AppError {
    AppError::Internal(format!("invalid ingestion transition during {event}: {guard:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::providers::DeterministicEmbeddingProvider;
    use std::time::Duration;

    fn snapshot_path() -> PathBuf {
        std::env::temp_dir().join(format!("ingestion-worker-test-{}.json", Uuid::new_v4()))
    }

    fn worker(store: Arc<RuntimeStore>, path: PathBuf) -> IngestionWorker {
        IngestionWorker::new(store, Arc::new(DeterministicEmbeddingProvider::new(8)), None, path)
    }

    async fn wait_until_terminal(store: &RuntimeStore, job_id: &str) -> IngestionJob {
        for _ in 0..100 {
            if let Some(job) = store.get_job(job_id) {
                if matches!(job.status, JobStatus::Success | JobStatus::Failed) {
                    return job;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {job_id} never reached a terminal status");
    }

    #[tokio::test]
    async fn enqueue_before_start_fails() {
        let store = Arc::new(RuntimeStore::memory());
        let w = worker(store, snapshot_path());
        let result = w
            .enqueue("a.txt".into(), "text/plain".into(), "u1".into(), b"hello".to_vec(), None)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn job_runs_to_completion_and_chunks_are_stored() {
        let path = snapshot_path();
        let store = Arc::new(RuntimeStore::memory());
        let w = worker(store.clone(), path.clone());
        w.start().await.expect("start");

        let job_id = w
            .enqueue(
                "a.txt".into(),
                "text/plain".into(),
                "u1".into(),
                "hello world, this is a small test document".repeat(50).into_bytes(),
                None,
            )
            .await
            .expect("enqueue");

        let job = wait_until_terminal(&store, &job_id).await;
        assert_eq!(job.status, JobStatus::Success);
        assert_eq!(job.stage, JobStage::Completed);
        assert!(job.chunk_count > 0);
        assert!(store.get_queued_upload(&job_id).is_none());
        assert_eq!(store.chunk_count_for_user("u1"), job.chunk_count);

        w.stop().await;
        tokio::fs::remove_file(&path).await.ok();
    }

    #[tokio::test]
    async fn unsupported_content_type_fails_job() {
        let path = snapshot_path();
        let store = Arc::new(RuntimeStore::memory());
        let w = worker(store.clone(), path.clone());
        w.start().await.expect("start");

        let job_id = w
            .enqueue("a.exe".into(), "application/octet-stream".into(), "u1".into(), b"binary".to_vec(), None)
            .await
            .expect("enqueue");

        let job = wait_until_terminal(&store, &job_id).await;
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error_message.unwrap_or_default().contains("Unsupported file format"));

        w.stop().await;
        tokio::fs::remove_file(&path).await.ok();
    }

    #[tokio::test]
    async fn recovers_unfinished_jobs_on_start() {
        let path = snapshot_path();
        let store = Arc::new(RuntimeStore::memory());
        let job_id = Uuid::new_v4().to_string();
        store.insert_job(IngestionJob::new(
            job_id.clone(),
            "a.txt".into(),
            "text/plain".into(),
            "u1".into(),
        ));
        store.enqueue_upload(QueuedUpload {
            job_id: job_id.clone(),
            user_id: "u1".into(),
            filename: "a.txt".into(),
            content_type: "text/plain".into(),
            bytes: b"recovered content for a crashed job".to_vec(),
            user_access_token: None,
        });

        let w = worker(store.clone(), path.clone());
        w.start().await.expect("start");

        let job = wait_until_terminal(&store, &job_id).await;
        assert_eq!(job.status, JobStatus::Success);

        w.stop().await;
        tokio::fs::remove_file(&path).await.ok();
    }
}
