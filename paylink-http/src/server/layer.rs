//! Tower layer that puts a [`PriceRegistry`] in front of a service.
//!
//! Requests whose method and path are not priced pass straight through,
//! whatever headers they carry. Priced requests go through a [`Paygate`].
//!
//! ```ignore
//! let layer = PaymentGateLayer::new(facilitator, registry, builder)
//!     .with_base_url(Url::parse("https://api.example/")?)
//!     .with_settlement(true);
//! let app = Router::new().route("/weather", get(weather)).layer(layer);
//! ```

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum_core::extract::Request;
use axum_core::response::Response;
use paylink::challenge::RequirementBuilder;
use paylink::facilitator::Facilitator;
use paylink::registry::PriceRegistry;
use tower::util::BoxCloneSyncService;
use tower::{Layer, Service};
use url::Url;

use super::access::AccessCounter;
use super::paygate::{Paygate, resource_url};

/// Layer enforcing payment on every route priced in a registry.
#[derive(Clone)]
#[allow(missing_debug_implementations)] // generic facilitator may not implement Debug
pub struct PaymentGateLayer<TFacilitator> {
    facilitator: TFacilitator,
    registry: Arc<PriceRegistry>,
    builder: Arc<RequirementBuilder>,
    base_url: Option<Arc<Url>>,
    settle: bool,
    counter: AccessCounter,
}

impl<TFacilitator> PaymentGateLayer<TFacilitator> {
    /// Creates a layer with settlement off and a fresh access counter.
    #[must_use]
    pub fn new(facilitator: TFacilitator, registry: PriceRegistry, builder: RequirementBuilder) -> Self {
        Self {
            facilitator,
            registry: Arc::new(registry),
            builder: Arc::new(builder),
            base_url: None,
            settle: false,
            counter: AccessCounter::new(),
        }
    }

    /// Sets the base URL resource URLs are built from.
    ///
    /// Without one, the request's `Host` header is used.
    #[must_use]
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = Some(Arc::new(base_url));
        self
    }

    /// Settles verified payments after the inner service answered.
    #[must_use]
    pub const fn with_settlement(mut self, settle: bool) -> Self {
        self.settle = settle;
        self
    }

    /// Shares `counter` instead of the layer's own.
    #[must_use]
    pub fn with_access_counter(mut self, counter: AccessCounter) -> Self {
        self.counter = counter;
        self
    }

    /// Counts of admitted paid requests.
    #[must_use]
    pub const fn access_counter(&self) -> &AccessCounter {
        &self.counter
    }

    /// The priced routes.
    #[must_use]
    pub fn registry(&self) -> &PriceRegistry {
        &self.registry
    }

    /// Returns a reference to the underlying facilitator.
    pub const fn facilitator(&self) -> &TFacilitator {
        &self.facilitator
    }
}

impl<S, TFacilitator> Layer<S> for PaymentGateLayer<TFacilitator>
where
    S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + Sync + 'static,
    S::Future: Send + 'static,
    TFacilitator: Facilitator + Clone,
{
    type Service = PaymentGateService<TFacilitator>;

    fn layer(&self, inner: S) -> Self::Service {
        PaymentGateService {
            facilitator: self.facilitator.clone(),
            registry: Arc::clone(&self.registry),
            builder: Arc::clone(&self.builder),
            base_url: self.base_url.clone(),
            settle: self.settle,
            counter: self.counter.clone(),
            inner: BoxCloneSyncService::new(inner),
        }
    }
}

/// Service produced by [`PaymentGateLayer`].
#[derive(Clone)]
#[allow(missing_debug_implementations)] // BoxCloneSyncService does not implement Debug
pub struct PaymentGateService<TFacilitator> {
    facilitator: TFacilitator,
    registry: Arc<PriceRegistry>,
    builder: Arc<RequirementBuilder>,
    base_url: Option<Arc<Url>>,
    settle: bool,
    counter: AccessCounter,
    inner: BoxCloneSyncService<Request, Response, Infallible>,
}

impl<TFacilitator> Service<Request> for PaymentGateService<TFacilitator>
where
    TFacilitator: Facilitator + Clone + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Response, Infallible>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let mut inner = self.inner.clone();

        let Some((route_key, route)) = self
            .registry
            .lookup(req.method().as_str(), req.uri().path())
            .map(|(key, route)| (key.clone(), route.clone()))
        else {
            return Box::pin(async move { inner.call(req).await });
        };

        let gate = Paygate {
            facilitator: self.facilitator.clone(),
            builder: Arc::clone(&self.builder),
            route_key,
            route,
            resource: resource_url(self.base_url.as_deref(), &req),
            settle: self.settle,
            counter: self.counter.clone(),
        };
        Box::pin(gate.handle_request(inner, req))
    }
}
