//! Deterministic object key scheme.
//!
//! Other tools read and write these keys directly, so the layout is fixed:
//!
//! - source:   `tasks/{task_id}/source/{file_id}/{filename}`
//! - output:   `output/{task_id}/{file_id}/{stem}_h265.mp4`
//! - metadata: `tasks/{task_id}/metadata/{file_id}/{filename}.json`
//!
//! Conversion attempts are staged under
//! `output/{task_id}/{file_id}/attempts/{preset}/{stem}_h265.mp4` until one is
//! accepted and copied to the output key.

use std::path::Path;

use crate::preset::QualityPreset;

/// Extension of every converted output.
pub const OUTPUT_EXTENSION: &str = "mp4";

const OUTPUT_SUFFIX: &str = "_h265";

const METADATA_SUFFIX: &str = ".json";

/// Longest single path segment common filesystems accept.
pub const NAME_MAX: usize = 255;

/// Longest source filename whose derived output and metadata names still
/// fit in [`NAME_MAX`]. An output name drops the extension (at least two
/// bytes with its dot) and appends `_h265.mp4`.
pub const MAX_SOURCE_FILENAME_LEN: usize = {
    let output = NAME_MAX + 2 - (OUTPUT_SUFFIX.len() + 1 + OUTPUT_EXTENSION.len());
    let metadata = NAME_MAX - METADATA_SUFFIX.len();
    if output < metadata {
        output
    } else {
        metadata
    }
};

pub fn source_key(task_id: &str, file_id: &str, filename: &str) -> String {
    format!("tasks/{}/source/{}/{}", task_id, file_id, filename)
}

pub fn output_key(task_id: &str, file_id: &str, filename: &str) -> String {
    format!(
        "output/{}/{}/{}",
        task_id,
        file_id,
        output_filename(filename)
    )
}

/// Staging key for the output of one conversion attempt.
pub fn attempt_output_key(
    task_id: &str,
    file_id: &str,
    filename: &str,
    preset: QualityPreset,
) -> String {
    format!(
        "output/{}/{}/attempts/{}/{}",
        task_id,
        file_id,
        preset.as_str(),
        output_filename(filename)
    )
}

pub fn metadata_key(task_id: &str, file_id: &str, filename: &str) -> String {
    format!(
        "tasks/{}/metadata/{}/{}{}",
        task_id, file_id, filename, METADATA_SUFFIX
    )
}

/// `{stem}_h265.mp4` for a source filename.
pub fn output_filename(filename: &str) -> String {
    let stem = Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(filename);
    format!("{}{}.{}", stem, OUTPUT_SUFFIX, OUTPUT_EXTENSION)
}

/// Parts of a source key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceKey<'a> {
    pub task_id: &'a str,
    pub file_id: &'a str,
    pub filename: &'a str,
}

/// Split a key of the form `tasks/{task_id}/source/{file_id}/{filename}`.
pub fn parse_source_key(key: &str) -> Option<SourceKey<'_>> {
    let mut parts = key.splitn(5, '/');
    let (Some("tasks"), Some(task_id), Some("source"), Some(file_id), Some(filename)) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return None;
    };

    if task_id.is_empty() || file_id.is_empty() || filename.is_empty() || filename.contains('/')
    {
        return None;
    }

    Some(SourceKey {
        task_id,
        file_id,
        filename,
    })
}

/// Preset of an attempt staging key.
pub fn attempt_preset(key: &str) -> Option<QualityPreset> {
    let mut parts = key.split('/');
    match (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) {
        (Some("output"), Some(_), Some(_), Some("attempts"), Some(preset)) => preset.parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        assert_eq!(
            source_key("t1", "f1", "Beach Day.MOV"),
            "tasks/t1/source/f1/Beach Day.MOV"
        );
        assert_eq!(
            output_key("t1", "f1", "Beach Day.MOV"),
            "output/t1/f1/Beach Day_h265.mp4"
        );
        assert_eq!(
            metadata_key("t1", "f1", "Beach Day.MOV"),
            "tasks/t1/metadata/f1/Beach Day.MOV.json"
        );
    }

    #[test]
    fn test_output_filename_keeps_inner_dots() {
        assert_eq!(output_filename("my.trip.2019.mkv"), "my.trip.2019_h265.mp4");
        assert_eq!(output_filename("noext"), "noext_h265.mp4");
    }

    #[test]
    fn test_attempt_keys_are_distinct_per_preset() {
        let balanced = attempt_output_key("t1", "f2", "a.mov", QualityPreset::Balanced);
        let high = attempt_output_key("t1", "f2", "a.mov", QualityPreset::High);

        assert_eq!(balanced, "output/t1/f2/attempts/balanced/a_h265.mp4");
        assert_ne!(balanced, high);
        assert_eq!(attempt_preset(&high), Some(QualityPreset::High));
        assert_eq!(attempt_preset(&output_key("t1", "f2", "a.mov")), None);
    }

    #[test]
    fn test_parse_source_key() {
        let parsed = parse_source_key("tasks/t1/source/f3/clip.mp4").unwrap();
        assert_eq!(parsed.task_id, "t1");
        assert_eq!(parsed.file_id, "f3");
        assert_eq!(parsed.filename, "clip.mp4");

        assert!(parse_source_key("output/t1/f3/clip_h265.mp4").is_none());
        assert!(parse_source_key("tasks/t1/source/f3/").is_none());
        assert!(parse_source_key("tasks/t1/source/f3/a/b.mp4").is_none());
    }
}
