//! Generated-file naming and download resolution.
//!
//! Only names produced by [`generate_filename`] are ever served. Anything
//! else, including traversal attempts and names that merely look similar, is
//! reported as [`AppError::NotFound`] so the download surface never reveals
//! whether an arbitrary path exists.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use uuid::Uuid;

use crate::{AppError, Result};

/// Prefix of every generated file name.
pub const FILENAME_PREFIX: &str = "presentation_";

/// Extension of every generated file name.
pub const FILENAME_EXTENSION: &str = "pptx";

/// A fresh `presentation_<uuid>.pptx` file name.
#[must_use]
pub fn generate_filename() -> String {
    format!("{FILENAME_PREFIX}{}.{FILENAME_EXTENSION}", Uuid::new_v4())
}

/// Download location of `filename` under `prefix`.
#[must_use]
pub fn download_location(prefix: &str, filename: &str) -> String {
    format!("{}/{filename}", prefix.trim_end_matches('/'))
}

/// Whether `filename` has the exact shape of a generated name.
#[must_use]
pub fn is_generated_filename(filename: &str) -> bool {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^presentation_[0-9a-fA-F-]{36}\.pptx$").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(filename))
}

/// Resolve a requested file name to an existing file inside `output_dir`.
///
/// # Errors
///
/// Returns [`AppError::NotFound`] if the name is not a generated name, the
/// resolved path escapes `output_dir`, or the file does not exist.
pub fn resolve(output_dir: &Path, filename: &str) -> Result<PathBuf> {
    if !is_generated_filename(filename) {
        return Err(AppError::NotFound(format!("unknown file: {filename}")));
    }

    let root = output_dir
        .canonicalize()
        .map_err(|_| AppError::NotFound(format!("unknown file: {filename}")))?;
    let candidate = root.join(filename);

    // Symlinks are resolved so a link pointing outside the root is rejected.
    let resolved = candidate
        .canonicalize()
        .map_err(|_| AppError::NotFound(format!("unknown file: {filename}")))?;

    if !resolved.starts_with(&root) || !resolved.is_file() {
        return Err(AppError::NotFound(format!("unknown file: {filename}")));
    }

    Ok(resolved)
}
