use std::fmt;
use std::path::PathBuf;

/// External service a gateway error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    /// The coding-agent API.
    Agents,
    /// The source-control host.
    GitHub,
    /// The LLM reviewer.
    Reviewer,
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Service::Agents => write!(f, "agent API"),
            Service::GitHub => write!(f, "GitHub"),
            Service::Reviewer => write!(f, "reviewer"),
        }
    }
}

/// Errors that can occur across Warden.
///
/// Each variant wraps a specific error domain. Library crates use this type
/// directly; the binary reports it through `miette` at the boundary.
///
/// # Examples
///
/// ```
/// use warden_core::WardenError;
///
/// let err = WardenError::Config("missing API key".into());
/// assert!(err.to_string().contains("missing API key"));
/// ```
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum WardenError {
    /// Filesystem I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// JSON serialization / deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML deserialization failure.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A gateway could not be reached (connect failure, timeout).
    #[error("{service} unavailable: {message}")]
    Unavailable { service: Service, message: String },

    /// A gateway answered with a non-success HTTP status.
    #[error("{service} returned {status}: {message}")]
    Api {
        service: Service,
        status: u16,
        message: String,
    },

    /// A repository URL that does not name a GitHub `owner/repo`.
    #[error("invalid repository URL: {0}")]
    InvalidRepository(String),

    /// No chain is keyed by this identity.
    #[error("chain not found: {0}")]
    ChainNotFound(String),

    /// A chain already exists for, or already contains, this identity.
    #[error("chain already exists for agent {0}")]
    DuplicateChain(String),

    /// The identity already participates in a chain.
    #[error("agent {0} already belongs to a chain")]
    DuplicateAgent(String),

    /// The review pipeline could not produce a verdict.
    #[error("review failed: {0}")]
    Review(String),

    /// The check runner could not run at all (as opposed to a failing step).
    #[error("check runner error: {0}")]
    Check(String),

    /// A state file could not be written.
    #[error("failed to persist {}: {source}", .path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl WardenError {
    /// Build an [`WardenError::Unavailable`] for `service`.
    pub fn unavailable(service: Service, message: impl Into<String>) -> Self {
        Self::Unavailable {
            service,
            message: message.into(),
        }
    }

    /// Build an [`WardenError::Api`] for `service`.
    pub fn api(service: Service, status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            service,
            status,
            message: message.into(),
        }
    }

    /// HTTP status of an [`WardenError::Api`] error.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// `true` for 401/403 answers, the signal to downgrade from check runs to
    /// commit statuses.
    ///
    /// # Examples
    ///
    /// ```
    /// use warden_core::{Service, WardenError};
    ///
    /// assert!(WardenError::api(Service::GitHub, 403, "forbidden").is_authorization());
    /// assert!(!WardenError::api(Service::GitHub, 422, "invalid").is_authorization());
    /// ```
    pub fn is_authorization(&self) -> bool {
        matches!(self.status(), Some(401 | 403))
    }

    /// `true` when the agent API refused a followup for this agent: a 4xx
    /// answer other than an authorization failure or rate limit.
    ///
    /// Transport errors are not rejections; the message may have arrived.
    pub fn followup_rejected(&self) -> bool {
        match self {
            Self::Api {
                service: Service::Agents,
                status,
                ..
            } => (400..500).contains(status) && !matches!(status, 401 | 403 | 429),
            _ => false,
        }
    }
}
