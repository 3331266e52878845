//! Azure provider for weatherdeck
//!
//! Drives the `az` CLI to create, update and delete the resources a
//! weather forecast stack declares.

pub mod az;
pub mod error;
pub mod provider;

pub use az::{AccountInfo, Az};
pub use error::{AzureError, Result};
pub use provider::{AzureProvider, SUPPORTED_TYPES};
