use thiserror::Error;

/// Errors raised while setting up the runtime (configuration, logging).
#[derive(Error, Debug)]
pub enum Error {
    /// A configuration value is missing or out of range.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A host capability was neither injected nor available as a desktop default.
    #[error("Capability missing: {capability} - {message}")]
    CapabilityMissing { capability: String, message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
