//! Enrichment client for the external Dify workflow/chat service.

pub mod dify;

pub use dify::{DifyClient, UNKNOWN_STAGE};
