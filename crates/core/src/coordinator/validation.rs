//! Submission manifest validation.
//!
//! The whole manifest is checked before any record exists, so a rejected
//! submission leaves nothing behind.

use once_cell::sync::Lazy;
use regex_lite::Regex;

use crate::preset::QualityPreset;
use crate::storage::keys;

use super::config::SubmissionLimits;
use super::types::{CoordinatorError, SubmitRequest};

/// Longest accepted filename in bytes. Every key derived from it must stay
/// writable by the filesystem object store.
pub const MAX_FILENAME_LEN: usize = keys::MAX_SOURCE_FILENAME_LEN;

/// A plain filename: no path separators or control characters, with an extension.
static FILENAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^/\\\x00-\x1f\x7f]+\.([A-Za-z0-9]+)$").unwrap());

/// Validate a submission and return the parsed preset.
pub fn validate_submission(
    request: &SubmitRequest,
    limits: &SubmissionLimits,
) -> Result<QualityPreset, CoordinatorError> {
    let preset: QualityPreset = request
        .quality_preset
        .parse()
        .map_err(|e: crate::preset::UnknownPreset| CoordinatorError::Validation(e.to_string()))?;

    if request.files.is_empty() {
        return Err(CoordinatorError::Validation(
            "at least one file is required".to_string(),
        ));
    }
    if request.files.len() > limits.max_files {
        return Err(CoordinatorError::Validation(format!(
            "{} files submitted, at most {} allowed",
            request.files.len(),
            limits.max_files
        )));
    }

    for (index, entry) in request.files.iter().enumerate() {
        validate_filename(&entry.filename, limits)
            .map_err(|reason| CoordinatorError::Validation(format!("files[{}]: {}", index, reason)))?;

        if entry.file_size == 0 {
            return Err(CoordinatorError::Validation(format!(
                "files[{}]: {} is empty",
                index, entry.filename
            )));
        }
        if entry.file_size > limits.max_file_size_bytes {
            return Err(CoordinatorError::Validation(format!(
                "files[{}]: {} is {} bytes, at most {} allowed",
                index, entry.filename, entry.file_size, limits.max_file_size_bytes
            )));
        }
    }

    Ok(preset)
}

fn validate_filename(filename: &str, limits: &SubmissionLimits) -> Result<(), String> {
    if filename.len() > MAX_FILENAME_LEN {
        return Err(format!("filename longer than {} bytes", MAX_FILENAME_LEN));
    }
    let Some(caps) = FILENAME.captures(filename) else {
        return Err(format!("invalid filename {:?}", filename));
    };
    let extension = &caps[1];
    if !limits.is_allowed_extension(extension) {
        return Err(format!("extension .{} is not an accepted video format", extension));
    }
    Ok(())
}
