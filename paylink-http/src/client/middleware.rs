//! The paying `reqwest` middleware.
//!
//! [`PaymentClient`] sends each request as-is. On `402 Payment Required` it
//! reads the challenge, lets its [`PaymentSelector`] pick one requirement,
//! builds a signed proof and sends the request exactly once more with an
//! `X-PAYMENT` header. It never sends a third request.

use http::{Extensions, HeaderName, HeaderValue, StatusCode};
use paylink::PaymentError;
use paylink::encoding::HeaderPayload;
use paylink::proof::ProofBuilder;
use paylink::proto::{PaymentChallenge, SettleResponse};
use paylink::selector::{FirstMatch, PaymentSelector};
use reqwest::{Request, Response};
use reqwest_middleware as rqm;
#[cfg(feature = "telemetry")]
use tracing::{debug, info, instrument, trace};

use crate::constants::{PAYMENT_REQUIRED_HEADER, X_PAYMENT_RESPONSE_HEADER};

const X_PAYMENT: HeaderName = HeaderName::from_static("x-payment");

/// Middleware that answers payment challenges and retries once.
#[derive(Debug, Clone)]
pub struct PaymentClient<TSelector = FirstMatch> {
    selector: TSelector,
    proofs: ProofBuilder,
}

impl PaymentClient<FirstMatch> {
    /// A client paying `exact` requirements on every network `proofs` knows.
    #[must_use]
    pub fn new(proofs: ProofBuilder) -> Self {
        Self {
            selector: FirstMatch::new(proofs.supported_networks()),
            proofs,
        }
    }
}

impl<TSelector> PaymentClient<TSelector> {
    /// Replaces the selector.
    pub fn with_selector<P: PaymentSelector>(self, selector: P) -> PaymentClient<P> {
        PaymentClient {
            selector,
            proofs: self.proofs,
        }
    }

    /// The selector in use.
    pub const fn selector(&self) -> &TSelector {
        &self.selector
    }

    /// The proof builder in use.
    pub const fn proofs(&self) -> &ProofBuilder {
        &self.proofs
    }
}

impl<TSelector> PaymentClient<TSelector>
where
    TSelector: PaymentSelector,
{
    /// Turns a 402 response into the `X-PAYMENT` header for the retry.
    ///
    /// # Errors
    ///
    /// [`PaymentError::MalformedChallenge`] if the response carries no usable
    /// challenge, [`PaymentError::NoSupportedRequirement`] if nothing offered is
    /// acceptable, or whatever building the proof fails with.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "paylink.reqwest.make_payment_header", skip_all, err)
    )]
    pub async fn make_payment_header(&self, res: Response) -> Result<HeaderValue, PaymentError> {
        let challenge = parse_challenge(res).await?;

        let requirement = self
            .selector
            .select(&challenge.accepts)
            .ok_or(PaymentError::NoSupportedRequirement)?;

        #[cfg(feature = "telemetry")]
        debug!(
            scheme = %requirement.scheme,
            network = %requirement.network,
            amount = %requirement.max_amount_required,
            "Selected payment requirement"
        );

        let proof = self.proofs.build(requirement).await?;
        let payload = proof
            .to_header()
            .map_err(|e| PaymentError::UnsupportedRequirement(e.to_string()))?;
        HeaderValue::from_bytes(payload.as_ref())
            .map_err(|e| PaymentError::UnsupportedRequirement(e.to_string()))
    }
}

/// Runs the next middleware or HTTP client with optional telemetry instrumentation.
#[cfg_attr(
    feature = "telemetry",
    instrument(name = "paylink.reqwest.next", skip_all)
)]
async fn run_next(
    next: rqm::Next<'_>,
    req: Request,
    extensions: &mut Extensions,
) -> rqm::Result<Response> {
    next.run(req, extensions).await
}

fn fail(err: PaymentError) -> rqm::Error {
    rqm::Error::Middleware(err.into())
}

#[async_trait::async_trait]
impl<TSelector> rqm::Middleware for PaymentClient<TSelector>
where
    TSelector: PaymentSelector + 'static,
{
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "paylink.reqwest.handle", skip_all, err)
    )]
    async fn handle(
        &self,
        req: Request,
        extensions: &mut Extensions,
        next: rqm::Next<'_>,
    ) -> rqm::Result<Response> {
        let retry_req = req.try_clone();
        let res = run_next(next.clone(), req, extensions).await?;

        if res.status() != StatusCode::PAYMENT_REQUIRED {
            #[cfg(feature = "telemetry")]
            trace!(status = ?res.status(), "No payment required, returning response");
            return Ok(res);
        }

        #[cfg(feature = "telemetry")]
        info!(url = %res.url(), "Received 402 Payment Required, processing payment");

        let mut retry = retry_req.ok_or_else(|| fail(PaymentError::RequestNotCloneable))?;
        let header = self.make_payment_header(res).await.map_err(fail)?;
        retry.headers_mut().insert(X_PAYMENT, header);

        #[cfg(feature = "telemetry")]
        trace!(url = %retry.url(), "Retrying request with payment");

        let res = run_next(next, retry, extensions)
            .await
            .map_err(|e| fail(PaymentError::UpstreamUnavailable(e.to_string())))?;

        match res.status() {
            StatusCode::PAYMENT_REQUIRED => {
                let reason = read_challenge(res).await.ok().and_then(|c| c.error);
                Err(fail(PaymentError::PaymentRejected { reason }))
            }
            StatusCode::SERVICE_UNAVAILABLE => {
                let detail = res
                    .text()
                    .await
                    .ok()
                    .filter(|body| !body.is_empty())
                    .unwrap_or_else(|| StatusCode::SERVICE_UNAVAILABLE.to_string());
                Err(fail(PaymentError::UpstreamUnavailable(detail)))
            }
            _ => Ok(res),
        }
    }
}

/// Reads a challenge from the JSON body, falling back to the
/// `PAYMENT-REQUIRED` header.
async fn read_challenge(response: Response) -> Result<PaymentChallenge, PaymentError> {
    let hint = response
        .headers()
        .get(PAYMENT_REQUIRED_HEADER)
        .map(|value| HeaderPayload::from(value.as_bytes()));
    let body = response
        .bytes()
        .await
        .map_err(|e| PaymentError::MalformedChallenge(e.to_string()))?;

    match serde_json::from_slice::<PaymentChallenge>(&body) {
        Ok(challenge) => Ok(challenge),
        Err(body_err) => {
            #[cfg(feature = "telemetry")]
            debug!(error = %body_err, "402 body is not a challenge, trying header");
            let hint = hint.ok_or_else(|| PaymentError::MalformedChallenge(body_err.to_string()))?;
            hint.to_json()
                .map_err(|e| PaymentError::MalformedChallenge(e.to_string()))
        }
    }
}

/// Parses a 402 response into a [`PaymentChallenge`] offering at least one
/// requirement.
///
/// # Errors
///
/// Returns [`PaymentError::MalformedChallenge`] if neither the body nor the
/// `PAYMENT-REQUIRED` header holds a challenge, or if it offers nothing.
#[cfg_attr(
    feature = "telemetry",
    instrument(name = "paylink.reqwest.parse_challenge", skip_all, err)
)]
pub async fn parse_challenge(response: Response) -> Result<PaymentChallenge, PaymentError> {
    let challenge = read_challenge(response).await?;
    if challenge.accepts.is_empty() {
        return Err(PaymentError::MalformedChallenge(
            "challenge offers no payment requirements".to_owned(),
        ));
    }
    Ok(challenge)
}

/// Recovers the [`PaymentError`] a [`PaymentClient`] failed with.
///
/// Returns `None` for plain transport errors from the first attempt.
#[must_use]
pub fn payment_error(err: &rqm::Error) -> Option<&PaymentError> {
    match err {
        rqm::Error::Middleware(inner) => inner.downcast_ref::<PaymentError>(),
        rqm::Error::Reqwest(_) => None,
    }
}

/// Decodes the `X-PAYMENT-RESPONSE` settlement header, if present.
#[must_use]
pub fn settlement_of(response: &Response) -> Option<SettleResponse> {
    let value = response.headers().get(X_PAYMENT_RESPONSE_HEADER)?;
    HeaderPayload::from(value.as_bytes()).to_json().ok()
}
