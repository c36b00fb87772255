//! HTTP clients for the transcoder and scorer services.
//!
//! Transcoder:
//! - `POST {url}/jobs` with a [`TranscodeRequest`] body → `{"job_id": "..."}`
//! - `GET {url}/jobs/{job_id}` → [`JobStatus`]
//!
//! Scorer:
//! - `POST {url}/score` with `{"source_key", "output_key"}` → `{"ssim_score": 0.97}`

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::config::CollaboratorConfig;
use super::error::CollaboratorError;
use super::traits::{QualityScorer, TranscodeEngine};
use super::types::{is_valid_score, JobStatus, TranscodeRequest};
use crate::metrics;

fn build_client(config: &CollaboratorConfig) -> Result<(Client, String), CollaboratorError> {
    if config.url.trim().is_empty() {
        return Err(CollaboratorError::Configuration(
            "collaborator url is required".to_string(),
        ));
    }

    let client = Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs.max(1)))
        .build()
        .map_err(|e| CollaboratorError::Configuration(e.to_string()))?;

    Ok((client, config.url.trim_end_matches('/').to_string()))
}

/// Turn a non-2xx response into a classified error.
async fn check_status(response: Response) -> Result<Response, CollaboratorError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(CollaboratorError::from_http_status(status.as_u16(), body))
}

fn record<T>(
    service: &str,
    operation: &str,
    started: Instant,
    result: &Result<T, CollaboratorError>,
) {
    metrics::EXTERNAL_SERVICE_DURATION
        .with_label_values(&[service, operation])
        .observe(started.elapsed().as_secs_f64());
    let status = match result {
        Ok(_) => "success",
        Err(e) => e.kind(),
    };
    metrics::EXTERNAL_SERVICE_REQUESTS
        .with_label_values(&[service, operation, status])
        .inc();
}

// =============================================================================
// Transcoder
// =============================================================================

#[derive(Debug, Deserialize)]
struct SubmitJobResponse {
    job_id: String,
}

/// [`TranscodeEngine`] backed by an HTTP job API.
pub struct HttpTranscodeEngine {
    client: Client,
    base_url: String,
}

impl HttpTranscodeEngine {
    pub fn new(config: &CollaboratorConfig) -> Result<Self, CollaboratorError> {
        let (client, base_url) = build_client(config)?;
        Ok(Self { client, base_url })
    }

    async fn do_submit(&self, request: &TranscodeRequest) -> Result<String, CollaboratorError> {
        let url = format!("{}/jobs", self.base_url);
        debug!(
            "Submitting transcode job: task={}, file={}, preset={}",
            request.task_id, request.file_id, request.preset
        );

        let response = self.client.post(&url).json(request).send().await?;
        let body: SubmitJobResponse = check_status(response).await?.json().await?;

        if body.job_id.is_empty() {
            return Err(CollaboratorError::InvalidResponse(
                "empty job id".to_string(),
            ));
        }
        Ok(body.job_id)
    }

    async fn do_poll(&self, job_id: &str) -> Result<JobStatus, CollaboratorError> {
        let url = format!("{}/jobs/{}", self.base_url, urlencoding::encode(job_id));
        let response = self.client.get(&url).send().await?;
        let status: JobStatus = check_status(response).await?.json().await?;
        Ok(status)
    }
}

#[async_trait]
impl TranscodeEngine for HttpTranscodeEngine {
    fn name(&self) -> &str {
        "http"
    }

    async fn submit(&self, request: &TranscodeRequest) -> Result<String, CollaboratorError> {
        let started = Instant::now();
        let result = self.do_submit(request).await;
        record("transcoder", "submit", started, &result);
        result
    }

    async fn poll(&self, job_id: &str) -> Result<JobStatus, CollaboratorError> {
        let started = Instant::now();
        let result = self.do_poll(job_id).await;
        record("transcoder", "poll", started, &result);
        result
    }
}

// =============================================================================
// Scorer
// =============================================================================

#[derive(Debug, Serialize)]
struct ScoreRequest<'a> {
    source_key: &'a str,
    output_key: &'a str,
}

#[derive(Debug, Deserialize)]
struct ScoreResponse {
    ssim_score: f64,
}

/// [`QualityScorer`] backed by an HTTP scoring service.
pub struct HttpQualityScorer {
    client: Client,
    base_url: String,
}

impl HttpQualityScorer {
    pub fn new(config: &CollaboratorConfig) -> Result<Self, CollaboratorError> {
        let (client, base_url) = build_client(config)?;
        Ok(Self { client, base_url })
    }

    async fn do_score(&self, source_key: &str, output_key: &str) -> Result<f64, CollaboratorError> {
        let url = format!("{}/score", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&ScoreRequest {
                source_key,
                output_key,
            })
            .send()
            .await?;
        let body: ScoreResponse = check_status(response).await?.json().await?;

        validate_score(body.ssim_score)
    }
}

fn validate_score(score: f64) -> Result<f64, CollaboratorError> {
    if is_valid_score(score) {
        Ok(score)
    } else {
        Err(CollaboratorError::InvalidResponse(format!(
            "similarity score {} outside [0, 1]",
            score
        )))
    }
}

#[async_trait]
impl QualityScorer for HttpQualityScorer {
    fn name(&self) -> &str {
        "http"
    }

    async fn score(&self, source_key: &str, output_key: &str) -> Result<f64, CollaboratorError> {
        let started = Instant::now();
        let result = self.do_score(source_key, output_key).await;
        record("scorer", "score", started, &result);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_url() {
        let result = HttpTranscodeEngine::new(&CollaboratorConfig::new("  "));
        assert!(matches!(result, Err(CollaboratorError::Configuration(_))));
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let scorer = HttpQualityScorer::new(&CollaboratorConfig::new("http://scorer:9100/")).unwrap();
        assert_eq!(scorer.base_url, "http://scorer:9100");
    }

    #[test]
    fn test_validate_score() {
        assert_eq!(validate_score(0.97).unwrap(), 0.97);
        assert!(validate_score(1.2).is_err());
        assert!(validate_score(f64::NAN).is_err());
    }

    #[test]
    fn test_job_status_wire_format() {
        let status: JobStatus =
            serde_json::from_str(r#"{"status": "progressing", "percent": 40}"#).unwrap();
        assert_eq!(status, JobStatus::Progressing { percent: Some(40) });

        let status: JobStatus = serde_json::from_str(
            r#"{"status": "failed", "code": 1517, "message": "throttled"}"#,
        )
        .unwrap();
        assert_eq!(
            status,
            JobStatus::Failed {
                code: Some(1517),
                message: "throttled".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_unreachable_service_is_transient() {
        let engine = HttpTranscodeEngine::new(
            &CollaboratorConfig::new("http://127.0.0.1:1").with_timeout_secs(2),
        )
        .unwrap();

        let err = engine.poll("job-1").await.unwrap_err();
        assert!(err.is_retryable(), "unexpected error: {:?}", err);
    }
}
