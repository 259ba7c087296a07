//! Backup bus library
//!
//! Frame codec and sessions for the backup platform's message bus, the
//! command schemas of its services, and client drivers for backup and
//! restore.

pub mod client;
pub mod config;
pub mod frame;
pub mod fs;
pub mod protocol;
pub mod session;
pub mod utils;

// Re-export commonly used types
pub use config::{BusConfig, Config};
pub use frame::{Frame, FrameCodec};
pub use session::{run_service, transact, RequestHandler, RestartPolicy, ServiceSession};
pub use utils::errors::{BusError, ClientError, CommandError, FrameError};
pub type Result<T> = std::result::Result<T, ClientError>;
