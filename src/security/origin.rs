//! Origin-based request forgery protection.
//!
//! Browsers always attach an `Origin` header to cross-origin requests and
//! script cannot forge it, so checking it against the trusted domains stops
//! forged state-changing requests. This complements anti-CSRF tokens rather
//! than replacing them.

use std::future::{ready, Ready};
use std::sync::Arc;

use actix_web::body::{BoxBody, MessageBody};
use actix_web::dev::{Payload, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::http::header::{self, ContentType};
use actix_web::{Error, FromRequest, HttpMessage, HttpRequest, HttpResponse};
use tracing::info;

use super::chain::{Gatekeeper, Handler, HandlerFuture, SecurityChain, SecurityChainMiddleware};
use super::domain::{is_bare_origin, Domain};

pub const REJECTION_BODY: &str = "Origin is not a trusted host.";

/// The trusted domain that accepted the current request.
///
/// Lives in the request extensions for the lifetime of one request only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedDomain(pub Domain);

/// Reads back the domain [`OriginSecurity`] matched for this request.
///
/// `None` means the request never passed through the gate.
pub fn matched_domain(req: &HttpRequest) -> Option<Domain> {
    req.extensions().get::<MatchedDomain>().map(|m| m.0.clone())
}

impl FromRequest for MatchedDomain {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<MatchedDomain>()
                .cloned()
                .ok_or_else(|| {
                    actix_web::error::ErrorInternalServerError(
                        "request did not pass origin security",
                    )
                }),
        )
    }
}

/// Gatekeeper rejecting requests whose `Origin` matches no trusted domain.
#[derive(Clone)]
pub struct OriginSecurity {
    domains: Arc<[Domain]>,
    valid_domains: Arc<str>,
}

impl OriginSecurity {
    pub fn new(domains: Vec<Domain>) -> Self {
        let valid_domains = domains
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        Self {
            domains: domains.into(),
            valid_domains: format!("[{valid_domains}]").into(),
        }
    }

    pub fn domains(&self) -> &[Domain] {
        &self.domains
    }

    /// First configured domain accepting `origin`, in registration order.
    /// An origin carrying a path, query or credentials never matches.
    pub fn evaluate(&self, origin: &str) -> Option<&Domain> {
        let url = url::Url::parse(origin).ok().filter(is_bare_origin)?;
        self.domains.iter().find(|d| d.matches(&url))
    }

    fn reject(&self, req: ServiceRequest, origin: &str) -> ServiceResponse<BoxBody> {
        info!(
            "validDomains" = %self.valid_domains,
            origin = %origin,
            "Origin validation failed"
        );
        req.into_response(
            HttpResponse::Forbidden()
                .content_type(ContentType::plaintext())
                .body(REJECTION_BODY),
        )
    }
}

impl std::fmt::Debug for OriginSecurity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OriginSecurity")
            .field("domains", &self.valid_domains)
            .finish()
    }
}

impl Gatekeeper for OriginSecurity {
    fn wrap(&self, next: Handler) -> Handler {
        let gate = self.clone();
        Handler::boxed(move |req: ServiceRequest| -> HandlerFuture {
            let origin = req
                .headers()
                .get(header::ORIGIN)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_owned();

            match gate.evaluate(&origin) {
                Some(domain) => {
                    req.extensions_mut().insert(MatchedDomain(domain.clone()));
                    next.call(req)
                }
                None => {
                    let resp = gate.reject(req, &origin);
                    Box::pin(ready(Ok(resp)))
                }
            }
        })
    }
}

/// Lets the gate be installed on its own with `App::wrap`.
impl<S, B> Transform<S, ServiceRequest> for OriginSecurity
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type InitError = ();
    type Transform = SecurityChainMiddleware<S>;
    type Future = futures::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        SecurityChain::new().with(self.clone()).new_transform(service)
    }
}
