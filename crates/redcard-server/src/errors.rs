//! Server startup errors.

/// Errors starting the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Binding or serving failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// `listen` was called more than once.
    #[error("server is already listening")]
    AlreadyListening,
}
