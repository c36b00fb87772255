//! Coordinator configuration.

use serde::{Deserialize, Serialize};

use crate::workflow::WorkflowConfig;

/// Scheduling and URL settings for the task coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Files of one task allowed in CONVERTING/VERIFYING at the same time.
    /// Further files stay PENDING until a slot frees.
    #[serde(default = "default_max_concurrent_files")]
    pub max_concurrent_files: usize,

    /// Lifetime of the upload URLs handed out at submission (seconds).
    #[serde(default = "default_url_ttl")]
    pub upload_url_ttl_secs: u64,

    /// Lifetime of download URLs in status responses (seconds).
    #[serde(default = "default_url_ttl")]
    pub download_url_ttl_secs: u64,

    /// How often expired tasks are purged (seconds).
    #[serde(default = "default_purge_interval")]
    pub purge_interval_secs: u64,

    /// Per-file workflow timing and retry budget.
    #[serde(flatten)]
    pub workflow: WorkflowConfig,
}

fn default_max_concurrent_files() -> usize {
    5
}

fn default_url_ttl() -> u64 {
    3600 // 1 hour
}

fn default_purge_interval() -> u64 {
    3600 // 1 hour
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_files: default_max_concurrent_files(),
            upload_url_ttl_secs: default_url_ttl(),
            download_url_ttl_secs: default_url_ttl(),
            purge_interval_secs: default_purge_interval(),
            workflow: WorkflowConfig::default(),
        }
    }
}

impl CoordinatorConfig {
    pub fn with_max_concurrent_files(mut self, max: usize) -> Self {
        self.max_concurrent_files = max;
        self
    }

    pub fn with_workflow(mut self, workflow: WorkflowConfig) -> Self {
        self.workflow = workflow;
        self
    }

    pub fn upload_url_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.upload_url_ttl_secs as i64)
    }

    pub fn download_url_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.download_url_ttl_secs as i64)
    }

    pub fn purge_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.purge_interval_secs.max(1))
    }
}

/// Constraints a submission manifest must satisfy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionLimits {
    /// Most files one task may contain.
    #[serde(default = "default_max_files")]
    pub max_files: usize,

    /// Largest accepted source file in bytes.
    #[serde(default = "default_max_file_size")]
    pub max_file_size_bytes: u64,

    /// Accepted filename extensions, compared case-insensitively, without the dot.
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
}

fn default_max_files() -> usize {
    100
}

fn default_max_file_size() -> u64 {
    50 * 1024 * 1024 * 1024 // 50 GiB
}

fn default_allowed_extensions() -> Vec<String> {
    ["mp4", "mov", "m4v", "mkv", "avi", "mts", "m2ts", "3gp", "webm"]
        .iter()
        .map(|ext| ext.to_string())
        .collect()
}

impl Default for SubmissionLimits {
    fn default() -> Self {
        Self {
            max_files: default_max_files(),
            max_file_size_bytes: default_max_file_size(),
            allowed_extensions: default_allowed_extensions(),
        }
    }
}

impl SubmissionLimits {
    pub fn with_max_files(mut self, max_files: usize) -> Self {
        self.max_files = max_files;
        self
    }

    pub fn with_max_file_size_bytes(mut self, max: u64) -> Self {
        self.max_file_size_bytes = max;
        self
    }

    pub fn is_allowed_extension(&self, extension: &str) -> bool {
        self.allowed_extensions
            .iter()
            .any(|allowed| allowed.trim_start_matches('.').eq_ignore_ascii_case(extension))
    }
}

/// How long task records are kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    #[serde(default = "default_task_ttl_days")]
    pub task_ttl_days: u32,
}

fn default_task_ttl_days() -> u32 {
    90
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            task_ttl_days: default_task_ttl_days(),
        }
    }
}

impl RetentionConfig {
    pub fn task_ttl(&self) -> chrono::Duration {
        chrono::Duration::days(self.task_ttl_days as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.max_concurrent_files, 5);
        assert_eq!(config.upload_url_ttl_secs, 3600);
        assert_eq!(config.download_url_ttl_secs, 3600);
        assert_eq!(config.workflow.retry.max_attempts, 3);
    }

    #[test]
    fn test_workflow_settings_share_the_section() {
        let toml = r#"
            max_concurrent_files = 2
            poll_interval_ms = 250

            [retry]
            max_attempts = 5
        "#;
        let config: CoordinatorConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.max_concurrent_files, 2);
        assert_eq!(config.workflow.poll_interval_ms, 250);
        assert_eq!(config.workflow.retry.max_attempts, 5);
        assert_eq!(config.workflow.transcode_timeout_secs, 7200);
    }

    #[test]
    fn test_extension_match_ignores_case_and_dot() {
        let mut limits = SubmissionLimits::default();
        assert!(limits.is_allowed_extension("MOV"));
        assert!(limits.is_allowed_extension("m2ts"));
        assert!(!limits.is_allowed_extension("jpg"));

        limits.allowed_extensions = vec![".Mp4".to_string()];
        assert!(limits.is_allowed_extension("mp4"));
        assert!(!limits.is_allowed_extension("mov"));
    }

    #[test]
    fn test_default_retention() {
        let retention: RetentionConfig = toml::from_str("").unwrap();
        assert_eq!(retention.task_ttl_days, 90);
        assert_eq!(retention.task_ttl(), chrono::Duration::days(90));
    }
}
