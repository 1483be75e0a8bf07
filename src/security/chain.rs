//! Composable request gatekeepers.
//!
//! A [`Gatekeeper`] turns the next [`Handler`] into a new one that may pass
//! the request through, enrich its extensions first, or answer on its own.
//! A [`SecurityChain`] is an ordered list of gatekeepers installed with
//! `App::wrap`; the first one registered sees the request first.

use std::future::Future;
use std::rc::Rc;
use std::sync::Arc;
use std::task::{Context, Poll};

use actix_web::body::{BoxBody, MessageBody};
use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::Error;
use futures::future::{ready, LocalBoxFuture, Ready};

pub type HandlerFuture = LocalBoxFuture<'static, Result<ServiceResponse<BoxBody>, Error>>;

/// One stage of request handling. Cheap to clone; lives on a single worker.
#[derive(Clone)]
pub struct Handler(Rc<dyn Fn(ServiceRequest) -> HandlerFuture>);

impl Handler {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(ServiceRequest) -> Fut + 'static,
        Fut: Future<Output = Result<ServiceResponse<BoxBody>, Error>> + 'static,
    {
        Self(Rc::new(move |req| Box::pin(f(req))))
    }

    /// Like [`Handler::new`] for closures that already return a boxed future.
    pub fn boxed<F>(f: F) -> Self
    where
        F: Fn(ServiceRequest) -> HandlerFuture + 'static,
    {
        Self(Rc::new(f))
    }

    /// Adapts the wrapped actix service so gatekeepers can forward to it.
    pub fn from_service<S, B>(service: Rc<S>) -> Self
    where
        S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
        S::Future: 'static,
        B: MessageBody + 'static,
    {
        Self(Rc::new(move |req| {
            let fut = service.call(req);
            Box::pin(async move { fut.await.map(ServiceResponse::map_into_boxed_body) })
        }))
    }

    pub fn call(&self, req: ServiceRequest) -> HandlerFuture {
        (self.0)(req)
    }
}

/// Wraps the next handler. Implementations hold only immutable,
/// process-wide configuration; per-request facts go into the request.
pub trait Gatekeeper: Send + Sync {
    fn wrap(&self, next: Handler) -> Handler;
}

impl<F> Gatekeeper for F
where
    F: Fn(Handler) -> Handler + Send + Sync,
{
    fn wrap(&self, next: Handler) -> Handler {
        self(next)
    }
}

#[derive(Clone, Default)]
pub struct SecurityChain {
    gatekeepers: Vec<Arc<dyn Gatekeeper>>,
}

impl SecurityChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a gatekeeper; it runs after every previously added one.
    pub fn with<G>(mut self, gatekeeper: G) -> Self
    where
        G: Gatekeeper + 'static,
    {
        self.gatekeepers.push(Arc::new(gatekeeper));
        self
    }

    pub fn len(&self) -> usize {
        self.gatekeepers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gatekeepers.is_empty()
    }

    /// Composes the chain in front of `handler`.
    pub fn then(&self, handler: Handler) -> Handler {
        self.gatekeepers
            .iter()
            .rev()
            .fold(handler, |next, gatekeeper| gatekeeper.wrap(next))
    }
}

impl std::fmt::Debug for SecurityChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityChain")
            .field("gatekeepers", &self.gatekeepers.len())
            .finish()
    }
}

impl<S, B> Transform<S, ServiceRequest> for SecurityChain
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type InitError = ();
    type Transform = SecurityChainMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        let service = Rc::new(service);
        let handler = self.then(Handler::from_service(service.clone()));
        ready(Ok(SecurityChainMiddleware { service, handler }))
    }
}

/// Service produced by [`SecurityChain`]; not used directly.
pub struct SecurityChainMiddleware<S> {
    service: Rc<S>,
    handler: Handler,
}

impl<S, B> Service<ServiceRequest> for SecurityChainMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Future = HandlerFuture;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        self.handler.call(req)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, web, App, HttpMessage, HttpRequest, HttpResponse};
    use std::sync::Mutex;

    type Trail = Arc<Mutex<Vec<&'static str>>>;

    fn recording(name: &'static str, trail: Trail) -> impl Fn(Handler) -> Handler + Send + Sync {
        move |next: Handler| {
            let trail = trail.clone();
            Handler::new(move |req| {
                trail.lock().unwrap().push(name);
                next.call(req)
            })
        }
    }

    #[derive(Clone)]
    struct Tag(&'static str);

    async fn echo_tag(req: HttpRequest) -> HttpResponse {
        match req.extensions().get::<Tag>() {
            Some(tag) => HttpResponse::Ok().body(tag.0),
            None => HttpResponse::Ok().body("untagged"),
        }
    }

    #[actix_web::test]
    async fn test_gatekeepers_run_in_registration_order() {
        let trail: Trail = Arc::default();
        let chain = SecurityChain::new()
            .with(recording("first", trail.clone()))
            .with(recording("second", trail.clone()))
            .with(recording("third", trail.clone()));
        assert_eq!(chain.len(), 3);

        let app = test::init_service(App::new().wrap(chain).route("/", web::get().to(echo_tag))).await;
        let resp = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;

        assert!(resp.status().is_success());
        assert_eq!(*trail.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[actix_web::test]
    async fn test_gatekeeper_can_short_circuit() {
        let trail: Trail = Arc::default();
        let deny = |_next: Handler| {
            Handler::new(|req: ServiceRequest| async move {
                Ok(req.into_response(HttpResponse::Unauthorized().body("no")))
            })
        };
        let chain = SecurityChain::new()
            .with(deny)
            .with(recording("after", trail.clone()));

        let app = test::init_service(App::new().wrap(chain).route("/", web::get().to(echo_tag))).await;
        let resp = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;

        assert_eq!(resp.status(), 401);
        assert_eq!(test::read_body(resp).await, "no");
        assert!(trail.lock().unwrap().is_empty());
    }

    #[actix_web::test]
    async fn test_gatekeeper_can_enrich_request() {
        let tagger = |next: Handler| {
            Handler::new(move |req: ServiceRequest| {
                req.extensions_mut().insert(Tag("tagged"));
                next.call(req)
            })
        };
        let app = test::init_service(
            App::new()
                .wrap(SecurityChain::new().with(tagger))
                .route("/", web::get().to(echo_tag)),
        )
        .await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
        assert_eq!(test::read_body(resp).await, "tagged");
    }

    #[actix_web::test]
    async fn test_empty_chain_passes_through() {
        let chain = SecurityChain::new();
        assert!(chain.is_empty());
        let app = test::init_service(App::new().wrap(chain).route("/", web::get().to(echo_tag))).await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
        assert_eq!(test::read_body(resp).await, "untagged");
    }
}
