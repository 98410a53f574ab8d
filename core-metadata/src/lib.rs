//! # Metadata Module
//!
//! Loads type-specific metadata for media records.
//!
//! ## Overview
//!
//! - [`MetadataReader`] is the seam the synchronizer calls once per new or
//!   changed record during a full crawl.
//! - [`TagMetadataReader`] reads audio tags and container properties with
//!   `lofty` on the blocking pool.

pub mod error;
pub mod extractor;

pub use error::{MetadataError, Result};
pub use extractor::{MetadataReader, TagMetadataReader};
