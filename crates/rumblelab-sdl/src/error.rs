use thiserror::Error;

/// Error type for the SDL2 backend.
#[derive(Debug, Error)]
pub enum Error {
    /// Failed to initialize SDL2 or one of its subsystems.
    #[error("Backend init failed: {0}")]
    BackendInit(String),
    /// Requested joystick, effect or slot is not open.
    #[error("Not found: {0}")]
    NotFound(u32),
    /// Operation is not supported on the current device.
    #[error("Operation unsupported")]
    Unsupported,
    /// The runtime thread did not answer in time.
    #[error("Runtime did not reply in time")]
    Timeout,
    /// The runtime thread has exited.
    #[error("Runtime is gone")]
    Disconnected,
    /// A generic SDL error.
    #[error("Backend error: {0}")]
    Backend(String),
}

/// Convenient result alias for backend operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for rumblelab_session::Error {
    fn from(e: Error) -> Self {
        use rumblelab_session::Error as SessionError;
        match e {
            Error::BackendInit(reason) => SessionError::Discovery(reason),
            Error::NotFound(id) => SessionError::NotFound(id),
            Error::Unsupported => SessionError::Unsupported,
            Error::Timeout | Error::Disconnected => SessionError::Io(e.to_string()),
            Error::Backend(reason) => SessionError::Backend(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_into_session_error() {
        let e: rumblelab_session::Error = Error::NotFound(3).into();
        assert!(matches!(e, rumblelab_session::Error::NotFound(3)));
        let e: rumblelab_session::Error = Error::Timeout.into();
        assert!(matches!(e, rumblelab_session::Error::Io(_)));
        let e: rumblelab_session::Error = Error::BackendInit("no video".into()).into();
        assert!(matches!(e, rumblelab_session::Error::Discovery(_)));
    }
}
