/// Errors from the remote inventory layer.
#[derive(Debug, Clone, thiserror::Error)]
pub enum InventoryError {
    /// Credentials were rejected.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The endpoint's certificate could not be verified.
    #[error("TLS verification failed: {0}")]
    Tls(String),

    /// Connection refused, reset, DNS failure and the like.
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    /// The endpoint answered with a non-2xx status.
    #[error("Inventory API error ({status}): {body}")]
    Api { status: u16, body: String },

    /// The endpoint answered with a body we could not interpret.
    #[error("Unexpected response: {0}")]
    Decode(String),

    #[error("Session already closed")]
    SessionClosed,

    #[error("Unsupported platform type: {0}")]
    Unsupported(String),
}

impl InventoryError {
    /// Whether the failure concerns reaching the endpoint rather than the
    /// content it returned. Connection-level failures are worth retrying.
    pub fn is_connection_level(&self) -> bool {
        match self {
            Self::Auth(_) | Self::Tls(_) | Self::Network(_) | Self::Timeout => true,
            Self::SessionClosed => true,
            Self::Api { status, .. } => *status >= 500 || *status == 401 || *status == 429,
            Self::Decode(_) | Self::Unsupported(_) => false,
        }
    }
}

impl From<reqwest::Error> for InventoryError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            return Self::Timeout;
        }
        if e.is_decode() {
            return Self::Decode(e.to_string());
        }
        if e.is_connect() {
            // reqwest does not expose TLS failures as a kind; inspect the chain.
            let chain = error_chain(&e);
            if chain.contains("certificate") || chain.contains("tls") || chain.contains("TLS") {
                return Self::Tls(chain);
            }
            return Self::Network(chain);
        }
        if let Some(status) = e.status() {
            return Self::Api {
                status: status.as_u16(),
                body: e.to_string(),
            };
        }
        Self::Network(e.to_string())
    }
}

fn error_chain(e: &dyn std::error::Error) -> String {
    let mut out = e.to_string();
    let mut source = e.source();
    while let Some(inner) = source {
        out.push_str(": ");
        out.push_str(&inner.to_string());
        source = inner.source();
    }
    out
}
