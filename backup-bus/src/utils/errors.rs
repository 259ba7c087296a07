//! Error types for the bus substrate and its callers.

use thiserror::Error;

/// Failures while encoding or decoding a single wire frame.
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("Malformed length field: {0:?}")]
    MalformedLength(String),

    #[error("Connection closed before a full frame was read")]
    ConnectionClosed,

    #[error("Frame too large: payload of {0} bytes exceeds the 99999 byte limit")]
    FrameTooLarge(usize),

    #[error("Invalid service name: {0:?}")]
    InvalidServiceName(String),

    #[error("Payload of {0} bytes has no service field")]
    MissingServiceField(usize),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures of a bus session (service or client role).
#[derive(Error, Debug)]
pub enum BusError {
    #[error("Frame error: {0}")]
    Frame(FrameError),

    #[error("Transport error: {0}")]
    Transport(std::io::Error),

    #[error("Registration failed: {0}")]
    RegistrationFailed(String),

    #[error("Command error: {0}")]
    Command(#[from] CommandError),
}

impl From<FrameError> for BusError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::Io(e) => BusError::Transport(e),
            other => BusError::Frame(other),
        }
    }
}

impl From<std::io::Error> for BusError {
    fn from(err: std::io::Error) -> Self {
        BusError::Transport(err)
    }
}

impl BusError {
    /// True when the peer went away rather than sending garbage.
    pub fn is_connection_closed(&self) -> bool {
        matches!(self, BusError::Frame(FrameError::ConnectionClosed))
    }
}

/// Failures parsing or building a `<command>|<json>` body.
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Malformed request: expected '<command>|<json>'")]
    Malformed,

    #[error("Malformed JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid request: {0}")]
    Invalid(String),
}

/// A relative key that cannot be placed safely below a root.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("relative path is empty")]
    Empty,

    #[error("relative path '{0}' escapes its root")]
    Escapes(String),

    #[error("relative path '{0}' has an empty or dot segment")]
    BadSegment(String),
}

/// Failures surfaced by the client drivers.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    #[error("Service {service} answered {status}: {content}")]
    Reply {
        service: String,
        status: String,
        content: String,
    },

    #[error("Service rejected the request: {0}")]
    Rejected(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Integrity error: {0}")]
    Integrity(String),

    #[error("Invalid path: {0}")]
    Path(#[from] PathError),
}

impl From<CommandError> for ClientError {
    fn from(err: CommandError) -> Self {
        ClientError::Bus(BusError::Command(err))
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
