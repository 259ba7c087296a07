//! Utility modules shared by the bus, its services and its client.

pub mod errors;
pub mod hash;
pub mod logger;

pub use errors::{BusError, ClientError, CommandError, FrameError, PathError, Result};
