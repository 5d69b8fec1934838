pub mod record;
pub mod context;
pub mod encode;
pub mod allowlist;
pub mod reporter;
pub mod formatter;
pub mod filter;
pub mod shared;
pub mod layer;

pub mod init;
pub mod env;
pub mod error;

/// Target of the crate's own diagnostics; the layer never formats these.
pub(crate) const INTERNAL_TARGET: &str = "tracing_record_sanitizer::internal";
