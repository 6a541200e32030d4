use std::fmt;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Whether retrying the failed call can reasonably succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network trouble, throttling, an API server restart.
    Transient,
    /// Bad credentials, missing permissions, unknown resource.
    Permanent,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Transient => f.write_str("transient"),
            ErrorKind::Permanent => f.write_str("permanent"),
        }
    }
}

/// A failed list, watch or log call against the cluster.
#[derive(Debug, Error)]
#[error("{kind} cluster error: {source}")]
pub struct ClusterError {
    pub kind: ErrorKind,
    #[source]
    source: BoxError,
}

impl ClusterError {
    pub fn new(kind: ErrorKind, source: impl Into<BoxError>) -> Self {
        Self {
            kind,
            source: source.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind == ErrorKind::Transient
    }
}

/// Problems detected before any loop starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("a label selector is required (--labels)")]
    MissingSelector,

    #[error("a namespace is required (--namespace)")]
    MissingNamespace,

    #[error("invalid value for --{flag}: {reason}")]
    InvalidSetting { flag: &'static str, reason: String },

    #[error("failed to load cluster credentials: {0}")]
    Credentials(#[source] BoxError),
}

/// Reasons a long-running task gave up.
#[derive(Debug, Error)]
pub enum TailError {
    #[error("pod locator failed: {0}")]
    Locator(#[from] ClusterError),

    #[error("failed to write log output: {0}")]
    Output(#[from] std::io::Error),

    #[error("pod locator stopped publishing")]
    MailboxClosed,

    #[error("task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
