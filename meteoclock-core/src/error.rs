use thiserror::Error;

/// Why a JSON document could not be walked to the end.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("payload is empty")]
    Empty,

    #[error("payload does not contain a closing brace")]
    Unterminated,

    #[error("malformed JSON: {0}")]
    Malformed(String),
}

/// Failures reported by an HTTP session.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to configure client for {host}:{port}: {message}")]
    Configure {
        host: String,
        port: u16,
        message: String,
    },

    #[error("session is not connected")]
    NotConnected,

    #[error("connect failed: {0}")]
    Connect(String),

    #[error("send failed: {0}")]
    Send(String),

    #[error("receive failed: {0}")]
    Receive(String),

    #[error("body exceeds {limit} bytes")]
    TooLarge { limit: usize },
}

/// Everything that can go wrong inside one acquisition cycle.
///
/// None of these are fatal: the caller logs them and keeps showing
/// whatever was last published.
#[derive(Debug, Error)]
pub enum AcquireError {
    #[error("transport failure during {stage}: {message}")]
    Transport { stage: &'static str, message: String },

    #[error("{stage} request failed with status {status}: {excerpt}")]
    Status {
        stage: &'static str,
        status: u16,
        excerpt: String,
    },

    #[error("{stage} response exceeds {limit} bytes")]
    ResponseTooLarge { stage: &'static str, limit: usize },

    #[error("failed to parse {stage} payload: {source}")]
    Parse {
        stage: &'static str,
        #[source]
        source: ParseError,
    },

    #[error("field '{key}' has unexpected format: {value:?}")]
    FieldMismatch { key: &'static str, value: String },

    #[error("no coordinates available to build the weather request")]
    MissingCoordinates,

    #[error("network association failed after {attempts} attempt(s): {message}")]
    Association { attempts: u32, message: String },
}

impl AcquireError {
    /// Attributes a session failure to the stage it happened in.
    pub fn from_transport(stage: &'static str, err: TransportError) -> Self {
        match err {
            TransportError::TooLarge { limit } => AcquireError::ResponseTooLarge { stage, limit },
            other => AcquireError::Transport {
                stage,
                message: other.to_string(),
            },
        }
    }
}
