//! # Core Runtime Module
//!
//! Foundational runtime infrastructure for the media catalog engine:
//! - Logging and tracing infrastructure
//! - Catalog configuration
//! - Event bus system
//!
//! Every other core crate depends on this one for its logging conventions
//! and lifecycle events.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{CatalogConfig, CatalogConfigBuilder};
pub use error::{Error, Result};
pub use events::{CatalogEvent, CoreEvent, EventBus, ScanEvent};
