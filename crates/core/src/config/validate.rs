use super::{
    types::{AuthMethod, Config},
    ConfigError,
};

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Check values serde accepts but the service cannot run with.
///
/// Every problem is reported at once rather than only the first.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut problems = Vec::new();
    let mut require = |ok: bool, problem: &str| {
        if !ok {
            problems.push(problem.to_string());
        }
    };

    require(
        config.auth.method != AuthMethod::ApiKey
            || config.auth.api_key.as_deref().is_some_and(|k| !k.trim().is_empty()),
        "auth.api_key must be set when auth.method = \"api_key\"",
    );
    require(config.server.port != 0, "server.port cannot be 0");
    require(
        config
            .server
            .public_url
            .as_deref()
            .map_or(true, is_http_url),
        "server.public_url must be an http(s) URL",
    );
    require(
        config.coordinator.max_concurrent_files > 0,
        "coordinator.max_concurrent_files cannot be 0",
    );
    require(config.limits.max_files > 0, "limits.max_files cannot be 0");
    require(
        !config.limits.allowed_extensions.is_empty(),
        "limits.allowed_extensions cannot be empty",
    );
    require(
        config.retention.task_ttl_days > 0,
        "retention.task_ttl_days cannot be 0",
    );
    require(
        is_http_url(&config.transcoder.url),
        "transcoder.url must be an http(s) URL",
    );
    require(
        is_http_url(&config.scorer.url),
        "scorer.url must be an http(s) URL",
    );

    if problems.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::Invalid(problems))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthConfig;

    fn config() -> Config {
        Config::with_auth(AuthConfig {
            method: AuthMethod::None,
            api_key: None,
        })
    }

    fn problems(config: &Config) -> Vec<String> {
        match validate_config(config) {
            Err(ConfigError::Invalid(problems)) => problems,
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(validate_config(&config()).is_ok());
    }

    #[test]
    fn test_api_key_required_for_api_key_method() {
        let mut config = config();
        config.auth.method = AuthMethod::ApiKey;
        assert_eq!(problems(&config).len(), 1);

        config.auth.api_key = Some("  ".to_string());
        assert_eq!(problems(&config).len(), 1);

        config.auth.api_key = Some("key".to_string());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_reports_every_problem() {
        let mut config = config();
        config.server.port = 0;
        config.coordinator.max_concurrent_files = 0;
        config.limits.allowed_extensions.clear();
        config.retention.task_ttl_days = 0;
        config.scorer.url = "localhost:9100".to_string();

        let problems = problems(&config);
        assert_eq!(problems.len(), 5, "{:?}", problems);
        assert!(problems.iter().any(|p| p.starts_with("scorer.url")));
    }

    #[test]
    fn test_public_url_needs_scheme() {
        let mut config = config();
        config.server.public_url = Some("reelpress.example.com".to_string());
        assert_eq!(
            problems(&config),
            vec!["server.public_url must be an http(s) URL".to_string()]
        );
    }
}
