use thiserror::Error;

/// Error kinds the core itself can raise.
///
/// `BackendFailure` from the design is deliberately absent here: a remote
/// vector/graph/LLM call failing is never propagated as an `AppError`, it is
/// tagged onto `RetrievalBundle::backend_failures` and the engine recovers
/// locally. `AuthError` is likewise absent, it belongs to the HTTP surface
/// this crate does not implement.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("parsing error: {0}")]
    Parsing(String),

    #[error("critic error: {0}")]
    Critic(String),

    #[error("planner budget exceeded")]
    BudgetExceeded,

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
