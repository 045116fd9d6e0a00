use std::error::Error;
use std::fmt;
use std::io;
use std::sync::PoisonError;

#[derive(Debug)]
pub enum RelayError {
    // Listener errors
    Bind(String),
    Accept(String),

    // Connections errors
    Transport(String),
    ConnectionClosed,

    // Registry errors
    RegistryLock(String),

    // Configuration errors
    ConfigError(String),

    // System errors
    SystemError(String),
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bind(msg) => write!(f, "Failed to open listening endpoint: {}", msg),
            Self::Accept(msg) => write!(f, "Accept error: {}", msg),
            Self::Transport(msg) => write!(f, "Transport error: {}", msg),
            Self::ConnectionClosed => write!(f, "Connection closed unexpectedly"),
            Self::RegistryLock(msg) => write!(f, "Registry lock error: {}", msg),
            Self::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            Self::SystemError(msg) => write!(f, "System error: {}", msg),
        }
    }
}

impl Error for RelayError {}

impl From<io::Error> for RelayError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe => RelayError::ConnectionClosed,
            _ => RelayError::Transport(err.to_string()),
        }
    }
}

// Converting from PoisonError to facilitate poisoned mutex handling
impl<T> From<PoisonError<T>> for RelayError {
    fn from(err: PoisonError<T>) -> Self {
        RelayError::RegistryLock(format!("Mutex poisoned: {}", err))
    }
}

// Generic result type for the relay
pub type Result<T> = std::result::Result<T, RelayError>;
