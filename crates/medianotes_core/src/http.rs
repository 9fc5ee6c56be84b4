use std::env;
use std::thread::sleep;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, bail};
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::config::MediaNotesConfig;

pub const TIMEOUT_ENV: &str = "MEDIANOTES_HTTP_TIMEOUT_MS";
pub const RETRIES_ENV: &str = "MEDIANOTES_HTTP_RETRIES";
pub const RETRY_DELAY_ENV: &str = "MEDIANOTES_HTTP_RETRY_DELAY_MS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpSettings {
    pub user_agent: String,
    pub timeout_ms: u64,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
}

impl HttpSettings {
    pub fn from_config(config: &MediaNotesConfig) -> Self {
        Self::from_config_with_lookup(config, |key| env::var(key).ok())
    }

    /// Environment > config file > built-in default, per field.
    pub fn from_config_with_lookup<F>(config: &MediaNotesConfig, lookup_env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let http = &config.http;
        Self {
            user_agent: config.user_agent(),
            timeout_ms: env_value_u64(&lookup_env, TIMEOUT_ENV, http.timeout_ms.unwrap_or(30_000)),
            max_retries: env_value_usize(&lookup_env, RETRIES_ENV, http.max_retries.unwrap_or(2)),
            retry_delay_ms: env_value_u64(
                &lookup_env,
                RETRY_DELAY_ENV,
                http.retry_delay_ms.unwrap_or(500),
            ),
        }
    }
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self::from_config_with_lookup(&MediaNotesConfig::default(), |_| None)
    }
}

/// Blocking HTTP client shared by the metadata providers and the poster
/// fetcher. Requests are spaced at least `min_interval` apart and retried
/// with exponential backoff on transient failures.
pub struct HttpClient {
    client: Client,
    settings: HttpSettings,
    service: &'static str,
    min_interval: Duration,
    last_request_at: Option<Instant>,
    request_count: usize,
}

impl HttpClient {
    pub fn new(settings: HttpSettings, service: &'static str, min_interval: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(settings.timeout_ms))
            .user_agent(settings.user_agent.clone())
            .build()
            .with_context(|| format!("failed to build {service} HTTP client"))?;
        Ok(Self {
            client,
            settings,
            service,
            min_interval,
            last_request_at: None,
            request_count: 0,
        })
    }

    pub fn request_count(&self) -> usize {
        self.request_count
    }

    pub fn get_json<T: DeserializeOwned>(
        &mut self,
        url: &str,
        params: &[(&str, String)],
        headers: &[(&str, String)],
    ) -> Result<T> {
        let response = self.send_with_retry(|client| {
            with_headers(client.get(url).query(params), headers)
        })?;
        response
            .json()
            .with_context(|| format!("failed to decode {} JSON response", self.service))
    }

    /// POST with query parameters and an optional plain-text body.
    pub fn post_json<T: DeserializeOwned>(
        &mut self,
        url: &str,
        params: &[(&str, String)],
        headers: &[(&str, String)],
        body: Option<&str>,
    ) -> Result<T> {
        let response = self.send_with_retry(|client| {
            let mut request = with_headers(client.post(url).query(params), headers);
            if let Some(body) = body {
                request = request.body(body.to_string());
            }
            request
        })?;
        response
            .json()
            .with_context(|| format!("failed to decode {} JSON response", self.service))
    }

    pub fn get_bytes(&mut self, url: &str) -> Result<Vec<u8>> {
        let response = self.send_with_retry(|client| client.get(url))?;
        let bytes = response
            .bytes()
            .with_context(|| format!("failed to read {} response body", self.service))?;
        Ok(bytes.to_vec())
    }

    fn send_with_retry<F>(&mut self, build: F) -> Result<Response>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let max_retries = self.settings.max_retries;
        for attempt in 0..=max_retries {
            self.apply_rate_limit();
            match build(&self.client).send() {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }
                    if attempt < max_retries && is_retryable_status(status) {
                        warn!(service = self.service, %status, attempt, "retrying request");
                        self.wait_before_retry(attempt);
                        continue;
                    }
                    bail!("{} request failed with HTTP {status}", self.service);
                }
                Err(error) => {
                    if attempt < max_retries && is_retryable_error(&error) {
                        warn!(service = self.service, %error, attempt, "retrying request");
                        self.wait_before_retry(attempt);
                        continue;
                    }
                    return Err(error).with_context(|| format!("failed to call {}", self.service));
                }
            }
        }

        bail!("{} request exhausted retry budget", self.service)
    }

    fn apply_rate_limit(&mut self) {
        if let Some(last) = self.last_request_at {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                sleep(self.min_interval - elapsed);
            }
        }
        self.last_request_at = Some(Instant::now());
        self.request_count += 1;
        debug!(service = self.service, count = self.request_count, "http request");
    }

    fn wait_before_retry(&self, attempt: usize) {
        let exponent = u32::try_from(attempt).unwrap_or(16);
        let base = self
            .settings
            .retry_delay_ms
            .saturating_mul(2u64.saturating_pow(exponent));
        let jitter = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|duration| u64::from(duration.subsec_millis() % 100))
            .unwrap_or(0);
        sleep(Duration::from_millis(base.saturating_add(jitter)));
    }
}

fn with_headers(mut request: RequestBuilder, headers: &[(&str, String)]) -> RequestBuilder {
    for (name, value) in headers {
        request = request.header(*name, value.as_str());
    }
    request
}

fn env_value_u64<F>(lookup_env: &F, key: &str, default: u64) -> u64
where
    F: Fn(&str) -> Option<String>,
{
    lookup_env(key)
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_value_usize<F>(lookup_env: &F, key: &str, default: usize) -> usize
where
    F: Fn(&str) -> Option<String>,
{
    lookup_env(key)
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

fn is_retryable_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::REQUEST_TIMEOUT
            | StatusCode::TOO_MANY_REQUESTS
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

fn is_retryable_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::time::{Duration, Instant};

    use reqwest::StatusCode;

    use super::*;
    use crate::config::HttpSection;

    #[test]
    fn settings_prefer_env_over_config() {
        let mut config = MediaNotesConfig::default();
        config.http = HttpSection {
            user_agent: None,
            timeout_ms: Some(5_000),
            max_retries: Some(4),
            retry_delay_ms: None,
        };
        let env = BTreeMap::from([(RETRIES_ENV, "7"), (RETRY_DELAY_ENV, "not-a-number")]);
        let settings =
            HttpSettings::from_config_with_lookup(&config, |key| env.get(key).map(|v| v.to_string()));

        assert_eq!(settings.timeout_ms, 5_000);
        assert_eq!(settings.max_retries, 7);
        assert_eq!(settings.retry_delay_ms, 500);
    }

    #[test]
    fn default_settings_use_builtin_values() {
        let settings = HttpSettings::default();
        assert_eq!(settings.timeout_ms, 30_000);
        assert_eq!(settings.max_retries, 2);
    }

    #[test]
    fn retryable_statuses_are_transient_only() {
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(!is_retryable_status(StatusCode::NOT_FOUND));
        assert!(!is_retryable_status(StatusCode::UNAUTHORIZED));
    }

    #[test]
    fn rate_limit_spaces_consecutive_requests() {
        let mut client = HttpClient::new(HttpSettings::default(), "test", Duration::from_millis(40))
            .expect("client");
        let started = Instant::now();
        client.apply_rate_limit();
        client.apply_rate_limit();
        assert!(started.elapsed() >= Duration::from_millis(40));
        assert_eq!(client.request_count(), 2);
    }
}
