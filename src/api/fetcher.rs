use crate::config::{Config, RetryPolicy};
use crate::error::{Error, Result};
use crate::models::WorkUnit;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ORIGIN, REFERER};
use serde_json::Value;
use std::fmt;
use tracing::{info, warn};

/// Raw outcome of a single GET
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: u16,
    pub body: String,
}

#[derive(Debug, Clone)]
pub enum TransportError {
    Timeout,
    Request(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Timeout => f.write_str("request timed out"),
            TransportError::Request(msg) => write!(f, "request failed: {}", msg),
        }
    }
}

/// Something that can perform a GET and hand back status and body
#[allow(async_fn_in_trait)]
pub trait Transport {
    async fn get(&self, url: &str) -> std::result::Result<UpstreamResponse, TransportError>;
}

impl<T: Transport> Transport for &T {
    async fn get(&self, url: &str) -> std::result::Result<UpstreamResponse, TransportError> {
        (**self).get(url).await
    }
}

/// `reqwest` backed transport carrying the headers the stats site insists on
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(config: &Config) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let referer = HeaderValue::from_str(&config.referer)
            .map_err(|_| Error::Config(format!("invalid referer '{}'", config.referer)))?;
        headers.insert(REFERER, referer.clone());
        headers.insert(ORIGIN, referer);

        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .default_headers(headers)
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    async fn get(&self, url: &str) -> std::result::Result<UpstreamResponse, TransportError> {
        let map_err = |e: reqwest::Error| {
            if e.is_timeout() {
                TransportError::Timeout
            } else {
                TransportError::Request(e.to_string())
            }
        };

        let response = self.client.get(url).send().await.map_err(map_err)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(map_err)?;
        Ok(UpstreamResponse { status, body })
    }
}

enum Attempt<T> {
    Done(T),
    Retry(String),
    Fail(Error),
}

/// Bounded-retry GET + JSON parse. Holds no cache.
pub struct Fetcher<T> {
    transport: T,
    policy: RetryPolicy,
}

impl<T: Transport> Fetcher<T> {
    pub fn new(transport: T, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    /// Fetch `url` on behalf of `unit` and shape the body with `parse`.
    ///
    /// Timeouts, connection errors, 429, 502/503/504 and non-JSON bodies are
    /// retried up to `max_attempts`. Any other non-200 status, or a body that
    /// `parse` rejects, fails straight away.
    pub async fn fetch_with<O, P>(
        &self,
        unit: &WorkUnit,
        resource: &str,
        url: &str,
        parse: P,
    ) -> Result<O>
    where
        P: Fn(&Value) -> std::result::Result<O, String>,
    {
        let max = self.policy.max_attempts.max(1);
        let mut last_reason = String::new();

        for attempt in 1..=max {
            match self.attempt(unit, resource, url, &parse).await {
                Attempt::Done(value) => {
                    info!(%unit, resource, attempt, outcome = "ok", "fetched");
                    return Ok(value);
                }
                Attempt::Fail(err) => {
                    warn!(%unit, resource, attempt, outcome = "failed", error = %err, "giving up");
                    return Err(err);
                }
                Attempt::Retry(reason) => {
                    if attempt < max {
                        let delay = self.policy.backoff.delay(attempt, &mut rand::thread_rng());
                        warn!(
                            %unit,
                            resource,
                            attempt,
                            outcome = "retry",
                            %reason,
                            delay_secs = delay.as_secs_f64(),
                            "transient failure"
                        );
                        tokio::time::sleep(delay).await;
                    } else {
                        warn!(%unit, resource, attempt, outcome = "exhausted", %reason, "transient failure");
                    }
                    last_reason = reason;
                }
            }
        }

        Err(Error::TransientUpstream {
            unit: unit.to_string(),
            resource: resource.to_string(),
            attempts: max,
            reason: last_reason,
        })
    }

    async fn attempt<O, P>(&self, unit: &WorkUnit, resource: &str, url: &str, parse: &P) -> Attempt<O>
    where
        P: Fn(&Value) -> std::result::Result<O, String>,
    {
        let response = match self.transport.get(url).await {
            Ok(r) => r,
            Err(e) => return Attempt::Retry(e.to_string()),
        };

        match response.status {
            200 => {}
            429 => return Attempt::Retry("rate limited (429)".to_string()),
            502..=504 => return Attempt::Retry(format!("upstream unavailable ({})", response.status)),
            status => {
                return Attempt::Fail(Error::UpstreamStatus {
                    unit: unit.to_string(),
                    resource: resource.to_string(),
                    status,
                })
            }
        }

        let doc: Value = match serde_json::from_str(&response.body) {
            Ok(doc) => doc,
            Err(e) => return Attempt::Retry(format!("body is not JSON: {}", e)),
        };

        match parse(&doc) {
            Ok(value) => Attempt::Done(value),
            Err(reason) => Attempt::Fail(Error::MalformedResponse {
                unit: unit.to_string(),
                resource: resource.to_string(),
                reason,
            }),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::models::RawDataset;
    use serde_json::json;

    fn dataset() -> serde_json::Value {
        json!({"headers": ["personId", "points"], "data": [[1, 30]]})
    }

    #[tokio::test]
    async fn test_succeeds_after_rate_limits() {
        let transport = FnTransport::new(|_, n| if n < 3 { status(429) } else { ok(dataset()) });
        let fetcher = Fetcher::new(&transport, no_wait(5));

        let ds = fetcher
            .fetch_with(&WorkUnit::from("0022400001"), "advanced", "http://x", RawDataset::from_document)
            .await
            .unwrap();
        assert_eq!(ds.len(), 1);
        assert_eq!(transport.calls(), 4);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let transport = FnTransport::new(|_, _| status(429));
        let fetcher = Fetcher::new(&transport, no_wait(5));

        let err = fetcher
            .fetch_with(&WorkUnit::from("0022400001"), "advanced", "http://x", RawDataset::from_document)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TransientUpstream { attempts: 5, .. }));
        assert!(err.is_unit_skip());
        assert_eq!(transport.calls(), 5);
    }

    #[tokio::test]
    async fn test_missing_data_key_not_retried() {
        let transport = FnTransport::new(|_, _| ok(json!({"headers": ["personId"]})));
        let fetcher = Fetcher::new(&transport, no_wait(5));

        let err = fetcher
            .fetch_with(&WorkUnit::from("0022400001"), "traditional", "http://x", RawDataset::from_document)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MalformedResponse { .. }));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_permanent_status_not_retried() {
        let transport = FnTransport::new(|_, _| status(404));
        let fetcher = Fetcher::new(&transport, no_wait(5));

        let err = fetcher
            .fetch_with(&WorkUnit::from("0022400001"), "advanced", "http://x", RawDataset::from_document)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UpstreamStatus { status: 404, .. }));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_timeouts_and_garbage_bodies_are_retried() {
        let transport = FnTransport::new(|_, n| match n {
            0 => Err(TransportError::Timeout),
            1 => Ok(UpstreamResponse {
                status: 200,
                body: "<html>slow down</html>".to_string(),
            }),
            2 => status(503),
            _ => ok(dataset()),
        });
        let fetcher = Fetcher::new(&transport, no_wait(5));

        let ds = fetcher
            .fetch_with(&WorkUnit::from("0022400001"), "advanced", "http://x", RawDataset::from_document)
            .await
            .unwrap();
        assert_eq!(ds.columns, vec!["personId", "points"]);
        assert_eq!(transport.calls(), 4);
    }
}
