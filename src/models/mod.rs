//! Model preset catalog and download management.

pub mod catalog;
#[cfg(feature = "model-download")]
pub mod download;
