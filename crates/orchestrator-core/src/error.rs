use thiserror::Error;

/// The stage in which an error originated, used by the queue consumer to
/// decide fail-vs-skip without downcasting the underlying error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Envelope,
    JobSpec,
    Lease,
    Router,
    Store,
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("envelope malformed: {0}")]
    EnvelopeMalformed(String),

    #[error("jobspec invalid: {0}")]
    JobSpecInvalid(String),

    #[error("signature verification failed: {0}")]
    SignatureInvalid(String),

    #[error("processing lease unavailable")]
    LeaseUnavailable,

    #[error("lease store error: {0}")]
    LeaseStore(#[from] anyhow::Error),

    #[error("router error (transient={transient}): {message}")]
    Router { message: String, transient: bool },

    #[error("store error: {0}")]
    Store(String),

    #[error("not found: {0}")]
    NotFound(String),
}

impl OrchestratorError {
    pub fn stage(&self) -> Stage {
        match self {
            OrchestratorError::EnvelopeMalformed(_) => Stage::Envelope,
            OrchestratorError::JobSpecInvalid(_) | OrchestratorError::SignatureInvalid(_) => {
                Stage::JobSpec
            }
            OrchestratorError::LeaseUnavailable | OrchestratorError::LeaseStore(_) => Stage::Lease,
            OrchestratorError::Router { .. } => Stage::Router,
            OrchestratorError::Store(_) | OrchestratorError::NotFound(_) => Stage::Store,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, OrchestratorError::Router { transient: true, .. })
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
