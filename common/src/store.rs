//! Process-wide in-memory state, single-owner over a mutex.
//!
//! All mutable collections are owned here and guarded by a single mutex.
//! Readers outside mutation paths get a consistent snapshot because every
//! access takes the same lock.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{info, warn};

use crate::error::AppError;
use crate::model::{
    ConversationTurn, DemoDocument, DocumentChunk, GraphEdge, IngestionJob, QueryTrace,
    QueuedUpload, RetrievalBundle, RingBuffer, TurnRole,
};

const TRACE_LOG_CAPACITY: usize = 500;

#[derive(Default)]
struct StoreInner {
    ingestion_jobs: HashMap<String, IngestionJob>,
    queued_uploads: HashMap<String, QueuedUpload>,
    private_chunks_by_user: HashMap<String, Vec<DocumentChunk>>,
    conversation_turns_by_thread: HashMap<String, Vec<ConversationTurn>>,
    demo_usage_by_session: HashMap<String, u32>,
    runtime_keys_by_session: HashMap<String, String>,
    shared_demo_documents: Vec<DemoDocument>,
    shared_graph_edges: Vec<GraphEdge>,
    query_embedding_cache: HashMap<String, Vec<f32>>,
    retrieval_cache: HashMap<String, RetrievalBundle>,
    trace_log: Option<RingBuffer<QueryTrace>>,
}

/// Shape written to / read from the durable snapshot. Only the
/// ingestion-related collections are persisted; caches, traces and
/// conversation turns are process-lifetime only.
#[derive(Serialize, Deserialize, Default)]
struct Snapshot {
    ingestion_jobs: HashMap<String, IngestionJob>,
    private_chunks_by_user: HashMap<String, Vec<DocumentChunk>>,
    queued_uploads: HashMap<String, QueuedUpload>,
}

pub struct RuntimeStore {
    inner: Mutex<StoreInner>,
}

impl RuntimeStore {
    pub fn new() -> Self {
        let mut inner = StoreInner::default();
        inner.trace_log = Some(RingBuffer::new(TRACE_LOG_CAPACITY));
        Self { inner: Mutex::new(inner) }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    // -- seeding (loading from disk is out of scope; callers supply data) --

    pub fn seed_demo_corpus(&self, docs: Vec<DemoDocument>, edges: Vec<GraphEdge>) {
        let mut guard = self.lock();
        guard.shared_demo_documents = docs;
        guard.shared_graph_edges = edges;
    }

    pub fn shared_demo_documents(&self) -> Vec<DemoDocument> {
        self.lock().shared_demo_documents.clone()
    }

    pub fn shared_graph_edges(&self) -> Vec<GraphEdge> {
        self.lock().shared_graph_edges.clone()
    }

    // -- ingestion jobs --

    pub fn insert_job(&self, job: IngestionJob) {
        self.lock().ingestion_jobs.insert(job.job_id.clone(), job);
    }

    pub fn get_job(&self, job_id: &str) -> Option<IngestionJob> {
        self.lock().ingestion_jobs.get(job_id).cloned()
    }

    pub fn update_job(&self, job: IngestionJob) {
        self.lock().ingestion_jobs.insert(job.job_id.clone(), job);
    }

    pub fn list_jobs(&self) -> Vec<IngestionJob> {
        self.lock().ingestion_jobs.values().cloned().collect()
    }

    // -- queued uploads --

    pub fn enqueue_upload(&self, upload: QueuedUpload) {
        self.lock().queued_uploads.insert(upload.job_id.clone(), upload);
    }

    pub fn get_queued_upload(&self, job_id: &str) -> Option<QueuedUpload> {
        self.lock().queued_uploads.get(job_id).cloned()
    }

    pub fn remove_queued_upload(&self, job_id: &str) {
        self.lock().queued_uploads.remove(job_id);
    }

    pub fn list_queued_uploads(&self) -> Vec<QueuedUpload> {
        self.lock().queued_uploads.values().cloned().collect()
    }

    // -- private chunks --

    pub fn append_chunks(&self, user_id: &str, chunks: Vec<DocumentChunk>) {
        self.lock()
            .private_chunks_by_user
            .entry(user_id.to_string())
            .or_default()
            .extend(chunks);
    }

    pub fn chunks_for_user(&self, user_id: &str) -> Vec<DocumentChunk> {
        self.lock().private_chunks_by_user.get(user_id).cloned().unwrap_or_default()
    }

    pub fn chunk_count_for_user(&self, user_id: &str) -> usize {
        self.lock().private_chunks_by_user.get(user_id).map(Vec::len).unwrap_or(0)
    }

    // -- conversation turns --

    pub fn append_turn(&self, thread_id: &str, role: TurnRole, content: String) {
        self.lock()
            .conversation_turns_by_thread
            .entry(thread_id.to_string())
            .or_default()
            .push(ConversationTurn { role, content });
    }

    pub fn recent_turns(&self, thread_id: &str, limit: usize) -> Vec<ConversationTurn> {
        let guard = self.lock();
        let turns = guard.conversation_turns_by_thread.get(thread_id);
        match turns {
            Some(t) => {
                let skip = t.len().saturating_sub(limit);
                t[skip..].to_vec()
            }
            None => Vec::new(),
        }
    }

    pub fn last_user_turn(&self, thread_id: &str) -> Option<ConversationTurn> {
        let guard = self.lock();
        guard
            .conversation_turns_by_thread
            .get(thread_id)
            .and_then(|turns| turns.iter().rev().find(|t| t.role == TurnRole::User).cloned())
    }

    // -- demo quota / runtime keys --

    pub fn demo_usage(&self, session_id: &str) -> u32 {
        *self.lock().demo_usage_by_session.get(session_id).unwrap_or(&0)
    }

    pub fn consume_demo_quota(&self, session_id: &str, quota: u32) -> bool {
        let mut guard = self.lock();
        let used = guard.demo_usage_by_session.entry(session_id.to_string()).or_insert(0);
        if *used >= quota {
            return false;
        }
        *used += 1;
        true
    }

    pub fn set_runtime_key(&self, session_id: &str, key: String) {
        self.lock().runtime_keys_by_session.insert(session_id.to_string(), key);
    }

    pub fn clear_runtime_key(&self, session_id: &str) {
        self.lock().runtime_keys_by_session.remove(session_id);
    }

    pub fn runtime_key(&self, session_id: &str) -> Option<String> {
        self.lock().runtime_keys_by_session.get(session_id).cloned()
    }

    // -- caches --

    pub fn get_query_embedding(&self, key: &str) -> Option<Vec<f32>> {
        self.lock().query_embedding_cache.get(key).cloned()
    }

    pub fn put_query_embedding(&self, key: String, embedding: Vec<f32>) {
        self.lock().query_embedding_cache.insert(key, embedding);
    }

    pub fn get_cached_bundle(&self, key: &str) -> Option<RetrievalBundle> {
        self.lock().retrieval_cache.get(key).cloned()
    }

    pub fn put_cached_bundle(&self, key: String, bundle: RetrievalBundle) {
        self.lock().retrieval_cache.insert(key, bundle);
    }

    // -- trace log --

    pub fn push_trace(&self, trace: QueryTrace) {
        let mut guard = self.lock();
        if let Some(log) = guard.trace_log.as_mut() {
            log.push(trace);
        }
    }

    pub fn recent_traces(&self, limit: usize) -> Vec<QueryTrace> {
        let guard = self.lock();
        match guard.trace_log.as_ref() {
            Some(log) => log.last_n(limit).into_iter().cloned().collect(),
            None => Vec::new(),
        }
    }

    // -- durability --

    /// Atomic write-then-rename of the persisted subset of state.
    pub async fn persist_snapshot(&self, path: &Path) -> Result<(), AppError> {
        let snapshot = {
            let guard = self.lock();
            Snapshot {
                ingestion_jobs: guard.ingestion_jobs.clone(),
                private_chunks_by_user: guard.private_chunks_by_user.clone(),
                queued_uploads: guard.queued_uploads.clone(),
            }
        };
        let json = serde_json::to_vec_pretty(&snapshot)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let tmp_path: PathBuf = path.with_extension("tmp");
        fs::write(&tmp_path, json).await?;
        fs::rename(&tmp_path, path).await?;
        Ok(())
    }

    /// Hydrates from a snapshot written by `persist_snapshot`. Missing file
    /// is not an error (first run).
    pub async fn hydrate_from_snapshot(&self, path: &Path) -> Result<(), AppError> {
        let bytes = match fs::read(path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no snapshot found, starting empty");
                return Ok(());
            }
            Err(e) => return Err(AppError::Io(e)),
        };

        let snapshot: Snapshot = match serde_json::from_slice(&bytes) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "snapshot was malformed, starting empty");
                return Ok(());
            }
        };

        let mut guard = self.lock();
        guard.ingestion_jobs = snapshot.ingestion_jobs;
        guard.private_chunks_by_user = snapshot.private_chunks_by_user;
        guard.queued_uploads = snapshot.queued_uploads;
        Ok(())
    }
}

impl Default for RuntimeStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl RuntimeStore {
    /// In-memory store for tests; identical to `new()` since this crate has
    /// no real backing database.
    pub fn memory() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ChunkMetadata;

    #[test]
    fn demo_quota_stops_at_limit() {
        let store = RuntimeStore::memory();
        assert!(store.consume_demo_quota("s1", 2));
        assert!(store.consume_demo_quota("s1", 2));
        assert!(!store.consume_demo_quota("s1", 2));
        assert_eq!(store.demo_usage("s1"), 2);
    }

    #[test]
    fn conversation_turns_preserve_order() {
        let store = RuntimeStore::memory();
        store.append_turn("t1", TurnRole::User, "hello".into());
        store.append_turn("t1", TurnRole::Assistant, "hi".into());
        store.append_turn("t1", TurnRole::User, "bye".into());

        let recent = store.recent_turns("t1", 6);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].content, "hello");
        assert_eq!(recent[2].content, "bye");
    }

    #[test]
    fn recent_turns_respects_limit() {
        let store = RuntimeStore::memory();
        for i in 0..10 {
            store.append_turn("t1", TurnRole::User, format!("turn {i}"));
        }
        let recent = store.recent_turns("t1", 6);
        assert_eq!(recent.len(), 6);
        assert_eq!(recent[0].content, "turn 4");
    }

    #[tokio::test]
    async fn snapshot_round_trips() {
        let dir = std::env::temp_dir().join(format!("rt-store-test-{}", uuid::Uuid::new_v4()));
        let path = dir.join("snapshot.json");

        let store = RuntimeStore::memory();
        store.append_chunks(
            "user1",
            vec![DocumentChunk {
                chunk_id: "c1".into(),
                content: "hello".into(),
                metadata: ChunkMetadata {
                    source: "doc.txt".into(),
                    page: None,
                    offset_start: 0,
                    offset_end: 5,
                    user_id: "user1".into(),
                },
                embedding: vec![0.1, 0.2],
            }],
        );
        store.persist_snapshot(&path).await.expect("persist");

        let restored = RuntimeStore::memory();
        restored.hydrate_from_snapshot(&path).await.expect("hydrate");
        assert_eq!(restored.chunk_count_for_user("user1"), 1);

        tokio::fs::remove_dir_all(&dir).await.ok();
    }

    #[tokio::test]
    async fn hydrate_missing_file_is_ok() {
        let store = RuntimeStore::memory();
        let path = std::env::temp_dir().join(format!("nope-{}.json", uuid::Uuid::new_v4()));
        store.hydrate_from_snapshot(&path).await.expect("should not error");
    }
}
