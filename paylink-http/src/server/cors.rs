//! CORS for browser payers.
//!
//! Browsers only let scripts read the payment headers when they are exposed,
//! so the layer always lists them.

use http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, WWW_AUTHENTICATE};
use http::{HeaderName, HeaderValue, Method};
use tower_http::cors::{AllowOrigin, CorsLayer};

/// Builds a [`CorsLayer`] for `origins`.
///
/// An empty list, or a list containing `*`, allows any origin. Origins that are
/// not valid header values are skipped.
#[must_use]
pub fn payment_cors<I, S>(origins: I) -> CorsLayer
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let origins: Vec<String> = origins
        .into_iter()
        .map(|origin| origin.as_ref().trim().to_owned())
        .filter(|origin| !origin.is_empty())
        .collect();

    let allow_origin = if origins.is_empty() || origins.iter().any(|origin| origin == "*") {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(
            origins
                .iter()
                .filter_map(|origin| HeaderValue::from_str(origin).ok()),
        )
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            ACCEPT,
            AUTHORIZATION,
            CONTENT_TYPE,
            HeaderName::from_static("x-payment"),
        ])
        .expose_headers([
            HeaderName::from_static("x-payment-response"),
            HeaderName::from_static("payment-required"),
            WWW_AUTHENTICATE,
        ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::body::Body;
    use axum::routing::get;
    use http::Request;
    use tower::ServiceExt;

    #[tokio::test]
    async fn exposes_payment_headers_to_allowed_origins() {
        let app = Router::new()
            .route("/weather", get(|| async { "ok" }))
            .layer(payment_cors(["http://localhost:3000"]));

        let response = app
            .oneshot(
                Request::get("/weather")
                    .header("origin", "http://localhost:3000")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let headers = response.headers();
        assert_eq!(
            headers.get("access-control-allow-origin").unwrap(),
            "http://localhost:3000"
        );
        let exposed = headers
            .get("access-control-expose-headers")
            .unwrap()
            .to_str()
            .unwrap()
            .to_ascii_lowercase();
        assert!(exposed.contains("x-payment-response"));
        assert!(exposed.contains("payment-required"));
    }
}
