//! Content type inference from file extensions.

use std::path::Path;

/// Content type used when the extension is missing or unknown.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Signature of a pluggable content type function.
pub type ContentTypeFn = fn(&Path) -> &'static str;

pub fn content_type_for(path: &Path) -> &'static str {
    mime_guess::from_path(path)
        .first_raw()
        .unwrap_or(DEFAULT_CONTENT_TYPE)
}
