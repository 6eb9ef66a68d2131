use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Classification of a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutePath {
    Direct,
    Document,
    Graph,
    Hybrid,
    Aggregate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteDecision {
    pub path: RoutePath,
    pub reason: String,
}

/// A single step tag in a `ToolPlan`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepTag {
    Synthesis,
    DocumentRetrieval,
    GraphRetrieval,
    AggregateRetrieval,
    HybridMerge,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ToolPlan {
    pub steps: Vec<StepTag>,
}

impl ToolPlan {
    pub fn new(steps: Vec<StepTag>) -> Self {
        Self { steps }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    PrivateDocument,
    DemoDocument,
    SharedGraph,
    Aggregate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalHit {
    pub source_id: String,
    pub score: f32,
    pub content: String,
    pub source_type: SourceType,
    pub location: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalBundle {
    pub route: RoutePath,
    pub hits: Vec<RetrievalHit>,
    pub degraded: bool,
    pub backend_failures: Vec<String>,
    pub rerank_strategy: String,
}

impl RetrievalBundle {
    /// `degraded` is exactly "any backend failure was recorded".
    pub fn new(
        route: RoutePath,
        hits: Vec<RetrievalHit>,
        backend_failures: Vec<String>,
        rerank_strategy: impl Into<String>,
    ) -> Self {
        Self {
            route,
            degraded: !backend_failures.is_empty(),
            hits,
            backend_failures,
            rerank_strategy: rerank_strategy.into(),
        }
    }

    pub fn top_score(&self) -> f32 {
        self.hits.first().map(|h| h.score).unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Ok,
    Skipped,
    Blocked,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDecision {
    pub tool_name: String,
    pub rationale: String,
    pub latency_ms: u64,
    pub status: ToolStatus,
    pub attempt: u32,
}

impl ToolDecision {
    pub fn new(
        tool_name: impl Into<String>,
        rationale: impl Into<String>,
        latency_ms: u64,
        status: ToolStatus,
    ) -> Self {
        Self {
            tool_name: tool_name.into(),
            rationale: rationale.into(),
            latency_ms,
            status,
            attempt: 1,
        }
    }

    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = attempt;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopePolicy {
    NeedsContext,
    LowEvidence,
    InfraDegraded,
    DegradedAnswer,
    Grounded,
    PlannerBudgetExceeded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    pub source_id: String,
    pub location: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerEnvelope {
    pub answer: String,
    pub confidence: Confidence,
    pub citations: Vec<Citation>,
    pub policy: EnvelopePolicy,
    pub action: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source: String,
    pub page: Option<u32>,
    pub offset_start: usize,
    pub offset_end: usize,
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub chunk_id: String,
    pub content: String,
    pub metadata: ChunkMetadata,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Success,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStage {
    Queued,
    Parsing,
    Chunking,
    Embedding,
    Upserting,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionJob {
    pub job_id: String,
    pub status: JobStatus,
    pub stage: JobStage,
    pub filename: String,
    pub content_type: String,
    pub user_id: String,
    pub chunk_count: usize,
    pub error_message: Option<String>,
}

impl IngestionJob {
    pub fn new(job_id: String, filename: String, content_type: String, user_id: String) -> Self {
        Self {
            job_id,
            status: JobStatus::Queued,
            stage: JobStage::Queued,
            filename,
            content_type,
            user_id,
            chunk_count: 0,
            error_message: None,
        }
    }

    /// status=success iff stage=completed and chunk_count >= 0
    /// (always true for `usize`); status=failed iff stage=failed with a
    /// message present.
    pub fn is_consistent(&self) -> bool {
        match self.status {
            JobStatus::Success => self.stage == JobStage::Completed,
            JobStatus::Failed => self.stage == JobStage::Failed && self.error_message.is_some(),
            JobStatus::Queued | JobStatus::Processing => {
                !matches!(self.stage, JobStage::Completed | JobStage::Failed)
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedUpload {
    pub job_id: String,
    pub user_id: String,
    pub filename: String,
    pub content_type: String,
    #[serde(with = "base64_bytes")]
    pub bytes: Vec<u8>,
    pub user_access_token: Option<String>,
}

/// The persisted snapshot stores chunk bytes base64-encoded.
mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let raw = String::deserialize(d)?;
        STANDARD.decode(&raw).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryTrace {
    pub trace_id: String,
    pub route: RoutePath,
    pub confidence: Confidence,
    pub access_mode: AccessMode,
    pub latency_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    Demo,
    Authenticated,
}

/// Ring buffer of the last `capacity` entries, used for the trace log.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    capacity: usize,
    items: VecDeque<T>,
}

impl<T> RingBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            items: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, item: T) {
        if self.items.len() >= self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(item);
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn last_n(&self, n: usize) -> Vec<&T> {
        let skip = self.items.len().saturating_sub(n);
        self.items.iter().skip(skip).collect()
    }
}

/// Shared demo document fixture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemoDocument {
    pub source: String,
    pub chunk_id: String,
    pub content: String,
}

/// Shared knowledge-graph edge fixture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: String,
    pub relationship: String,
    pub target: String,
    pub evidence: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriticVerdict {
    pub should_refine: bool,
    pub reason: String,
}

pub fn now() -> DateTime<Utc> {
    Utc::now()
}
