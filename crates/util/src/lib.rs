pub mod document_store;
pub mod redaction;

pub use document_store::*;
pub use redaction::{mask_secret, redact_sensitive};
