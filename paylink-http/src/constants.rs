//! Header names and defaults shared by the gateway and the client.

/// Payment proof, client to server. Base64 JSON [`paylink::proto::PaymentProof`].
pub const X_PAYMENT_HEADER: &str = "X-PAYMENT";

/// Settlement result, server to client. Base64 JSON [`paylink::proto::SettleResponse`].
pub const X_PAYMENT_RESPONSE_HEADER: &str = "X-PAYMENT-RESPONSE";

/// Challenge hint on 402 responses. Base64 JSON [`paylink::proto::PaymentChallenge`].
pub const PAYMENT_REQUIRED_HEADER: &str = "PAYMENT-REQUIRED";

/// Authentication scheme used in the `WWW-Authenticate` discovery header.
pub const WWW_AUTHENTICATE_SCHEME: &str = "X402";

/// Public facilitator used when none is configured.
pub const DEFAULT_FACILITATOR_URL: &str = "https://x402.org/facilitator";
