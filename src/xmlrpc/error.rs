//! XML-RPC client error types.

/// Errors from a single XML-RPC call.
///
/// Transport failures, malformed documents and decoded faults are kept apart
/// so the caller can decide which ones to step over.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// Request could not be sent or the body could not be read.
    #[error("http request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Server answered with a status other than 200.
    #[error("non-ok http status: {0}")]
    Status(u16),

    /// Endpoint URL could not be parsed.
    #[error("invalid endpoint url {url:?}: {reason}")]
    Endpoint { url: String, reason: String },

    /// Request parameters cannot be put on the wire.
    #[error("cannot encode request: {0}")]
    Encode(String),
    /// Response could not be decoded.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// Server returned a fault envelope.
    #[error("xmlrpc request returned fault {code}: {message}")]
    Fault { code: i32, message: String },
}

impl RpcError {
    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        RpcError::Malformed(msg.into())
    }

    /// Network or HTTP level failure.
    pub fn is_transport(&self) -> bool {
        matches!(self, RpcError::Transport(_) | RpcError::Status(_))
    }

    pub fn is_fault(&self) -> bool {
        matches!(self, RpcError::Fault { .. })
    }

    /// Fault code, if this is a fault.
    pub fn fault_code(&self) -> Option<i32> {
        match self {
            RpcError::Fault { code, .. } => Some(*code),
            _ => None,
        }
    }
}
