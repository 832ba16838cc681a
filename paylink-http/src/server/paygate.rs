//! Payment gate for one priced request.
//!
//! [`Paygate`] runs the verification state machine for a request that hit a
//! priced route: read the `X-PAYMENT` proof, check its nonce was issued here
//! for this route and is still fresh, match it against the route's
//! requirements, ask the facilitator, then either call the inner service or
//! answer with a fresh `402` challenge.
//!
//! A paid access is counted once the facilitator verified the proof, or,
//! with settlement on, once the payment settled.

use axum_core::response::{IntoResponse, Response};
use http::header::{CONTENT_TYPE, HOST, WWW_AUTHENTICATE};
use http::{HeaderName, HeaderValue, StatusCode};
use paylink::challenge::RequirementBuilder;
use paylink::encoding::HeaderPayload;
use paylink::facilitator::Facilitator;
use paylink::proto::{PaymentChallenge, PaymentProof, PaymentRequirement, SettleResponse, V1, VerifyRequest};
use paylink::registry::{RouteConfig, RouteKey};
use paylink::timestamp::UnixTimestamp;
use std::convert::Infallible;
use std::sync::Arc;
use tower::Service;
use url::Url;

#[cfg(feature = "telemetry")]
use tracing::Instrument;
#[cfg(feature = "telemetry")]
use tracing::instrument;

use super::access::AccessCounter;
use super::error::{PaygateError, VerificationError};
use crate::constants::{WWW_AUTHENTICATE_SCHEME, X_PAYMENT_HEADER};

const X_PAYMENT_RESPONSE: HeaderName = HeaderName::from_static("x-payment-response");
const PAYMENT_REQUIRED: HeaderName = HeaderName::from_static("payment-required");

/// Gate for a single request to a priced route.
#[allow(missing_debug_implementations)]
pub struct Paygate<TFacilitator> {
    /// Verifies and settles proofs
    pub facilitator: TFacilitator,
    /// Quotes the route and issues challenge nonces
    pub builder: Arc<RequirementBuilder>,
    /// Route being gated
    pub route_key: RouteKey,
    /// Price and networks of the route
    pub route: RouteConfig,
    /// Full URL of the requested resource
    pub resource: String,
    /// Whether to settle after the inner service answered
    pub settle: bool,
    /// Admitted request counts
    pub counter: AccessCounter,
}

impl<TFacilitator> Paygate<TFacilitator> {
    /// Calls the inner service with proper telemetry instrumentation.
    async fn call_inner<
        ReqBody,
        ResBody,
        S: Service<http::Request<ReqBody>, Response = http::Response<ResBody>>,
    >(
        mut inner: S,
        req: http::Request<ReqBody>,
    ) -> Result<http::Response<ResBody>, S::Error>
    where
        S::Future: Send,
    {
        #[cfg(feature = "telemetry")]
        {
            inner
                .call(req)
                .instrument(tracing::info_span!("inner"))
                .await
        }
        #[cfg(not(feature = "telemetry"))]
        {
            inner.call(req).await
        }
    }

    /// A `402` with a fresh challenge for this route, carrying `error` if given.
    #[must_use]
    pub fn challenge_response(&self, error: Option<String>) -> Response {
        match self
            .builder
            .build_challenge(&self.route_key, &self.route, &self.resource)
        {
            Ok(challenge) => {
                let challenge = match error {
                    Some(error) => challenge.with_error(error),
                    None => challenge,
                };
                challenge_into_response(&challenge, &self.resource)
            }
            Err(err) => PaygateError::from(err).into_response(),
        }
    }

    /// Renders an error, turning payer-fixable ones into a fresh challenge.
    fn error_into_response(&self, err: PaygateError) -> Response {
        if err.is_challenge() {
            #[cfg(feature = "telemetry")]
            tracing::debug!(route = %self.route_key, error = %err, "Issuing payment challenge");
            self.challenge_response(Some(err.to_string()))
        } else {
            #[cfg(feature = "telemetry")]
            tracing::warn!(route = %self.route_key, error = %err, "Payment gate failure");
            err.into_response()
        }
    }

    #[cfg_attr(not(feature = "telemetry"), allow(unused_variables))]
    fn record_access(&self, payer: Option<&str>) {
        let count = self.counter.record(&self.route_key);
        #[cfg(feature = "telemetry")]
        tracing::info!(
            route = %self.route_key,
            payer = payer.unwrap_or_default(),
            count,
            "Paid access recorded"
        );
    }

    /// Expands the route with `proof`'s nonce and finds the requirement it pays.
    fn matching_requirement(&self, proof: &PaymentProof) -> Result<PaymentRequirement, PaygateError> {
        let nonce = proof.payload.authorization.nonce;
        let requirements = self
            .builder
            .requirements(&self.route, &self.resource, Some(nonce))?;
        requirements
            .into_iter()
            .find(|requirement| pays_for(proof, requirement))
            .ok_or_else(|| VerificationError::NoPaymentMatching.into())
    }
}

impl<TFacilitator> Paygate<TFacilitator>
where
    TFacilitator: Facilitator,
{
    /// Handles a request to a priced route.
    ///
    /// Payer-fixable failures become `402` with a fresh challenge, an
    /// unreachable facilitator becomes `503`, anything else `500`.
    ///
    /// # Errors
    ///
    /// This method is infallible (`Infallible` error type).
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "paylink.handle_request", skip_all, fields(route = %self.route_key))
    )]
    pub async fn handle_request<
        ReqBody,
        ResBody,
        S: Service<http::Request<ReqBody>, Response = http::Response<ResBody>>,
    >(
        self,
        inner: S,
        req: http::Request<ReqBody>,
    ) -> Result<Response, Infallible>
    where
        S::Response: IntoResponse,
        S::Error: IntoResponse,
        S::Future: Send,
    {
        match self.handle_request_fallible(inner, req).await {
            Ok(response) => Ok(response),
            Err(err) => Ok(self.error_into_response(err)),
        }
    }

    /// Handles a request, returning failures as [`PaygateError`] instead of
    /// rendering them.
    ///
    /// # Errors
    ///
    /// Returns [`PaygateError`] if the request is not admitted or settlement fails.
    pub async fn handle_request_fallible<
        ReqBody,
        ResBody,
        S: Service<http::Request<ReqBody>, Response = http::Response<ResBody>>,
    >(
        &self,
        inner: S,
        req: http::Request<ReqBody>,
    ) -> Result<Response, PaygateError>
    where
        S::Response: IntoResponse,
        S::Error: IntoResponse,
        S::Future: Send,
    {
        let header = req
            .headers()
            .get(X_PAYMENT_HEADER)
            .map(HeaderValue::as_bytes)
            .ok_or(VerificationError::PaymentHeaderRequired(X_PAYMENT_HEADER))?;
        let proof =
            PaymentProof::from_header(header).map_err(|_| VerificationError::InvalidPaymentHeader)?;

        let nonce = proof.payload.authorization.nonce;
        if !self.builder.authenticates(&nonce, &self.route_key) {
            return Err(VerificationError::UnknownChallenge.into());
        }
        if !nonce.is_fresh_at(UnixTimestamp::now(), self.route.max_timeout_seconds) {
            return Err(VerificationError::StaleChallenge.into());
        }

        let requirement = self.matching_requirement(&proof)?;
        let verify_request = VerifyRequest {
            x402_version: V1,
            payment_payload: proof,
            payment_requirements: requirement,
        };

        let verdict = self.facilitator.verify(&verify_request).await?;
        if !verdict.is_valid {
            let reason = verdict
                .invalid_reason
                .unwrap_or_else(|| "invalid_payment".to_owned());
            return Err(VerificationError::Rejected(reason).into());
        }

        #[cfg(feature = "telemetry")]
        tracing::debug!(route = %self.route_key, "Payment verified");
        let payer = verdict.payer.as_deref();
        if !self.settle {
            self.record_access(payer);
        }

        let response = match Self::call_inner(inner, req).await {
            Ok(response) => response.into_response(),
            Err(err) => return Ok(err.into_response()),
        };

        if !self.settle || response.status().is_client_error() || response.status().is_server_error() {
            return Ok(response);
        }

        #[cfg(feature = "telemetry")]
        tracing::debug!("Settling payment after request execution");

        let settlement = self.facilitator.settle(&verify_request).await?;
        if !settlement.success {
            let reason = settlement
                .error_reason
                .unwrap_or_else(|| "settlement_failed".to_owned());
            return Err(PaygateError::Settlement(reason));
        }
        self.record_access(payer.or(settlement.payer.as_deref()));

        let header_value = settlement_to_header(&settlement)?;
        let mut response = response;
        response.headers_mut().insert(X_PAYMENT_RESPONSE, header_value);
        Ok(response)
    }
}

/// Whether `proof` pays exactly what `requirement` asks for.
fn pays_for(proof: &PaymentProof, requirement: &PaymentRequirement) -> bool {
    let authorization = &proof.payload.authorization;
    proof.scheme == requirement.scheme
        && proof.network == requirement.network
        && authorization.asset.eq_ignore_ascii_case(&requirement.asset)
        && authorization.to.eq_ignore_ascii_case(&requirement.pay_to)
        && authorization.value == requirement.max_amount_required
}

/// Encodes a settlement as an `X-PAYMENT-RESPONSE` header value.
fn settlement_to_header(settlement: &SettleResponse) -> Result<HeaderValue, PaygateError> {
    let payload =
        HeaderPayload::from_json(settlement).map_err(|err| PaygateError::Settlement(err.to_string()))?;
    HeaderValue::from_bytes(payload.as_ref()).map_err(|err| PaygateError::Settlement(err.to_string()))
}

/// Renders `challenge` as a `402` with the JSON body and both hint headers.
#[must_use]
pub fn challenge_into_response(challenge: &PaymentChallenge, resource: &str) -> Response {
    let Ok(body) = serde_json::to_string(challenge) else {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };
    let mut response = (
        StatusCode::PAYMENT_REQUIRED,
        [(CONTENT_TYPE, HeaderValue::from_static("application/json"))],
        body,
    )
        .into_response();

    let headers = response.headers_mut();
    if let Some(value) = HeaderPayload::from_json(challenge)
        .ok()
        .and_then(|payload| HeaderValue::from_bytes(payload.as_ref()).ok())
    {
        headers.insert(PAYMENT_REQUIRED, value);
    }
    let discovery = format!(
        r#"{WWW_AUTHENTICATE_SCHEME} realm="{resource}", accepts="{}""#,
        challenge.accepts.len()
    );
    if let Ok(value) = HeaderValue::from_str(&discovery) {
        headers.insert(WWW_AUTHENTICATE, value);
    }
    response
}

/// Full URL of the requested resource.
///
/// Joins the request path and query onto `base_url`, or onto
/// `http://<Host header>` when no base URL is configured.
pub fn resource_url<B>(base_url: Option<&Url>, req: &http::Request<B>) -> String {
    let path_and_query = req
        .uri()
        .path_and_query()
        .map_or("/", http::uri::PathAndQuery::as_str);
    match base_url {
        Some(base) => base
            .join(path_and_query)
            .map_or_else(|_| base.to_string(), String::from),
        None => {
            let host = req
                .headers()
                .get(HOST)
                .and_then(|host| host.to_str().ok())
                .unwrap_or("localhost");
            format!("http://{host}{path_and_query}")
        }
    }
}
