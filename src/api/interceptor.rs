//! Ordered request interceptors run ahead of the handlers.

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use std::ops::ControlFlow;
use std::sync::Arc;

/// A single check on an incoming request. `Break` answers the request
/// immediately; `Continue` hands it to the next interceptor.
pub trait Interceptor: Send + Sync {
    fn name(&self) -> &'static str;

    fn intercept(&self, request: &Request<Body>) -> ControlFlow<Response>;
}

/// Interceptors in the order they run
#[derive(Default, Clone)]
pub struct InterceptorChain {
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl InterceptorChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, interceptor: impl Interceptor + 'static) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    /// Run every interceptor until one breaks
    pub fn run(&self, request: &Request<Body>) -> ControlFlow<Response> {
        for interceptor in &self.interceptors {
            match interceptor.intercept(request) {
                ControlFlow::Continue(()) => {}
                ControlFlow::Break(response) => {
                    tracing::debug!(
                        interceptor = interceptor.name(),
                        status = response.status().as_u16(),
                        "Request short-circuited"
                    );
                    return ControlFlow::Break(response);
                }
            }
        }
        ControlFlow::Continue(())
    }
}

/// Middleware adapter for [`InterceptorChain`]
pub async fn run_interceptors(
    State(chain): State<Arc<InterceptorChain>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    match chain.run(&request) {
        ControlFlow::Continue(()) => next.run(request).await,
        ControlFlow::Break(response) => response,
    }
}
