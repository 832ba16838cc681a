//! A [`Facilitator`] reached over HTTP.
//!
//! [`FacilitatorClient`] posts JSON to the remote `./verify` and `./settle`
//! endpoints. Every request carries a timeout (10 seconds unless configured)
//! so the gateway never waits on a silent facilitator.
//!
//! Failures are classified for the gateway:
//!
//! - transport errors, timeouts, and `502`/`503`/`504` answers are
//!   [`FacilitatorError::Unavailable`]
//! - any other non-`200` status or an unreadable body is
//!   [`FacilitatorError::Backend`]

use http::{HeaderMap, StatusCode};
use paylink::facilitator::{Facilitator, FacilitatorError};
use paylink::proto::{SettleRequest, SettleResponse, VerifyRequest, VerifyResponse};
use reqwest::Client;
use std::time::Duration;
use url::Url;

#[cfg(feature = "telemetry")]
use tracing::{Instrument, Span};

/// Errors that can occur while talking to a remote facilitator.
#[derive(Debug, thiserror::Error)]
pub enum FacilitatorClientError {
    /// URL parse error.
    #[error("URL parse error: {context}: {source}")]
    UrlParse {
        /// Human-readable context.
        context: &'static str,
        /// The underlying parse error.
        #[source]
        source: url::ParseError,
    },
    /// HTTP transport error, including timeouts.
    #[error("HTTP error: {context}: {source}")]
    Http {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
    /// The response body is not the expected JSON.
    #[error("Failed to deserialize JSON: {context}: {source}")]
    JsonDeserialization {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
    /// Unexpected HTTP status code.
    #[error("Unexpected HTTP status {status}: {context}: {body}")]
    HttpStatus {
        /// Human-readable context.
        context: &'static str,
        /// The HTTP status code.
        status: StatusCode,
        /// The response body.
        body: String,
    },
}

impl FacilitatorClientError {
    /// Whether the facilitator could not be reached or is overloaded.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        match self {
            Self::Http { .. } => true,
            Self::HttpStatus { status, .. } => matches!(
                *status,
                StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT
            ),
            Self::UrlParse { .. } | Self::JsonDeserialization { .. } => false,
        }
    }
}

impl From<FacilitatorClientError> for FacilitatorError {
    fn from(err: FacilitatorClientError) -> Self {
        if err.is_unavailable() {
            Self::Unavailable(Box::new(err))
        } else {
            Self::Backend(Box::new(err))
        }
    }
}

/// A client for a remote facilitator.
#[derive(Clone, Debug)]
pub struct FacilitatorClient {
    /// Base URL of the facilitator (e.g. `https://facilitator.example/`)
    base_url: Url,
    /// Full URL of `POST /verify`
    verify_url: Url,
    /// Full URL of `POST /settle`
    settle_url: Url,
    /// Shared reqwest client
    client: Client,
    /// Headers sent with each request
    headers: HeaderMap,
    /// Per-request timeout
    timeout: Duration,
}

impl Facilitator for FacilitatorClient {
    async fn verify(&self, request: &VerifyRequest) -> Result<VerifyResponse, FacilitatorError> {
        let fut = self.post_json(&self.verify_url, "POST /verify", request);
        #[cfg(feature = "telemetry")]
        let fut = fut.instrument(tracing::info_span!(
            "paylink.facilitator_client.verify",
            timeout = ?self.timeout,
            otel.status_code = tracing::field::Empty,
            error.message = tracing::field::Empty,
        ));
        Ok(fut.await?)
    }

    async fn settle(&self, request: &SettleRequest) -> Result<SettleResponse, FacilitatorError> {
        let fut = self.post_json(&self.settle_url, "POST /settle", request);
        #[cfg(feature = "telemetry")]
        let fut = fut.instrument(tracing::info_span!(
            "paylink.facilitator_client.settle",
            timeout = ?self.timeout,
            otel.status_code = tracing::field::Empty,
            error.message = tracing::field::Empty,
        ));
        Ok(fut.await?)
    }
}

impl FacilitatorClient {
    /// Timeout applied when none is configured.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Returns the base URL used by this client.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Returns the computed `./verify` URL.
    #[must_use]
    pub const fn verify_url(&self) -> &Url {
        &self.verify_url
    }

    /// Returns the computed `./settle` URL.
    #[must_use]
    pub const fn settle_url(&self) -> &Url {
        &self.settle_url
    }

    /// Returns the per-request timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Constructs a client from a base URL.
    ///
    /// # Errors
    ///
    /// Returns [`FacilitatorClientError::UrlParse`] if endpoint URLs cannot be derived.
    pub fn try_new(base_url: Url) -> Result<Self, FacilitatorClientError> {
        let join = |path: &str, context: &'static str| {
            base_url
                .join(path)
                .map_err(|source| FacilitatorClientError::UrlParse { context, source })
        };
        let verify_url = join("./verify", "Failed to construct ./verify URL")?;
        let settle_url = join("./settle", "Failed to construct ./settle URL")?;
        Ok(Self {
            client: Client::new(),
            base_url,
            verify_url,
            settle_url,
            headers: HeaderMap::new(),
            timeout: Self::DEFAULT_TIMEOUT,
        })
    }

    /// Attaches headers (e.g. an API key) to every request.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Sets the per-request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// POSTs `payload` and reads a `200` JSON answer.
    async fn post_json<T, R>(
        &self,
        url: &Url,
        context: &'static str,
        payload: &T,
    ) -> Result<R, FacilitatorClientError>
    where
        T: serde::Serialize + Sync + ?Sized,
        R: serde::de::DeserializeOwned,
    {
        let mut req = self
            .client
            .post(url.clone())
            .json(payload)
            .timeout(self.timeout);
        for (key, value) in &self.headers {
            req = req.header(key, value);
        }
        let result = match req.send().await {
            Err(source) => Err(FacilitatorClientError::Http { context, source }),
            Ok(response) if response.status() == StatusCode::OK => response
                .json::<R>()
                .await
                .map_err(|source| FacilitatorClientError::JsonDeserialization { context, source }),
            Ok(response) => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                Err(FacilitatorClientError::HttpStatus {
                    context,
                    status,
                    body,
                })
            }
        };

        record_result_on_span(&result);

        result
    }
}

/// Parses a base URL, normalizing to exactly one trailing slash so endpoint
/// joins keep any path prefix.
impl TryFrom<&str> for FacilitatorClient {
    type Error = FacilitatorClientError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let mut normalized = value.trim_end_matches('/').to_owned();
        normalized.push('/');
        let url = Url::parse(&normalized).map_err(|source| FacilitatorClientError::UrlParse {
            context: "Failed to parse base url",
            source,
        })?;
        Self::try_new(url)
    }
}

impl TryFrom<String> for FacilitatorClient {
    type Error = FacilitatorClientError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

/// Records the outcome of a request on the current span.
#[cfg(feature = "telemetry")]
fn record_result_on_span<R>(result: &Result<R, FacilitatorClientError>) {
    let span = Span::current();
    match result {
        Ok(_) => {
            span.record("otel.status_code", "OK");
        }
        Err(err) => {
            span.record("otel.status_code", "ERROR");
            span.record("error.message", tracing::field::display(err));
            tracing::event!(tracing::Level::ERROR, error = %err, "Request to facilitator failed");
        }
    }
}

/// Noop without the `telemetry` feature.
#[cfg(not(feature = "telemetry"))]
const fn record_result_on_span<R>(_result: &Result<R, FacilitatorClientError>) {}

#[cfg(test)]
mod tests {
    use super::*;
    use paylink::amount::Price;
    use paylink::challenge::RequirementBuilder;
    use paylink::networks::AssetBook;
    use paylink::proto::{Authorization, ExactPayload, PaymentProof, V1};
    use paylink::registry::{RouteConfig, RouteKey};
    use paylink::timestamp::UnixTimestamp;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn verify_request() -> VerifyRequest {
        let route = RouteConfig::new(Price::parse("$0.01").unwrap(), "base-sepolia");
        let requirement = RequirementBuilder::new("0xpay", AssetBook::known())
            .build_challenge(&RouteKey::new("GET", "/weather"), &route, "http://localhost/weather")
            .unwrap()
            .accepts
            .remove(0);
        let now = UnixTimestamp::now();
        VerifyRequest {
            x402_version: V1,
            payment_payload: PaymentProof {
                x402_version: V1,
                scheme: requirement.scheme.clone(),
                network: requirement.network.clone(),
                payload: ExactPayload {
                    signature: "0xsig".to_owned(),
                    authorization: Authorization {
                        from: "0xpayer".to_owned(),
                        to: requirement.pay_to.clone(),
                        asset: requirement.asset.clone(),
                        value: requirement.max_amount_required.clone(),
                        valid_after: now,
                        valid_before: now + 300,
                        nonce: requirement.nonce().unwrap(),
                    },
                },
            },
            payment_requirements: requirement,
        }
    }

    async fn client_for(server: &MockServer) -> FacilitatorClient {
        FacilitatorClient::try_from(server.uri())
            .unwrap()
            .with_timeout(Duration::from_millis(200))
    }

    #[tokio::test]
    async fn verify_posts_camel_case_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/verify"))
            .and(body_partial_json(json!({
                "x402Version": 1,
                "paymentRequirements": { "network": "base-sepolia", "maxAmountRequired": "10000" }
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "isValid": true, "payer": "0xpayer" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let response = client_for(&server).await.verify(&verify_request()).await.unwrap();
        assert_eq!(response, VerifyResponse::valid("0xpayer"));
    }

    #[tokio::test]
    async fn invalid_verdicts_are_answers_not_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/verify"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "isValid": false, "invalidReason": "insufficient_funds" })),
            )
            .mount(&server)
            .await;

        let response = Facilitator::verify(&client_for(&server).await, &verify_request())
            .await
            .unwrap();
        assert!(!response.is_valid);
        assert_eq!(response.invalid_reason.as_deref(), Some("insufficient_funds"));
    }

    #[tokio::test]
    async fn timeouts_are_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/verify"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "isValid": true }))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let err = Facilitator::verify(&client_for(&server).await, &verify_request())
            .await
            .unwrap_err();
        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn unreachable_hosts_are_unavailable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let client = FacilitatorClient::try_from(format!("http://127.0.0.1:{port}/")).unwrap();
        let err = Facilitator::verify(&client, &verify_request()).await.unwrap_err();
        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn overloaded_is_unavailable_but_other_statuses_are_backend_failures() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/verify"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/settle"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let verify = Facilitator::verify(&client, &verify_request()).await.unwrap_err();
        assert!(verify.is_unavailable());
        let settle = Facilitator::settle(&client, &verify_request()).await.unwrap_err();
        assert!(!settle.is_unavailable());
    }

    #[tokio::test]
    async fn garbage_json_is_a_backend_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/verify"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = Facilitator::verify(&client_for(&server).await, &verify_request())
            .await
            .unwrap_err();
        assert!(matches!(err, FacilitatorError::Backend(_)));
    }

    #[test]
    fn keeps_base_path_when_joining_endpoints() {
        let client = FacilitatorClient::try_from("https://x402.org/facilitator").unwrap();
        assert_eq!(client.verify_url().as_str(), "https://x402.org/facilitator/verify");
        assert_eq!(client.settle_url().as_str(), "https://x402.org/facilitator/settle");
        assert_eq!(client.timeout(), FacilitatorClient::DEFAULT_TIMEOUT);
    }
}
