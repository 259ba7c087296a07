//! The three storage tiers every backed up file is written to.

pub mod cloud;
pub mod tier;

pub use cloud::{BusCloudGateway, CloudError, CloudGateway, CloudSource};
pub use tier::{LocalTier, Placement};

/// Object key used for a file on the cloud tier.
pub fn remote_path(structure: &str, relative_path: &str) -> String {
    format!("{}/{}", structure, relative_path)
}
