//! One request lifecycle, end to end.
//!
//! ```text
//! request ─► filters (outer → inner)
//!              └─► route resolution
//!                    └─► interceptors: pre_handle …
//!                          └─► handler  (woven calls inside)
//!                    ◄─── interceptors: post_handle …, after_completion (reverse)
//! response ◄─ filters (inner → outer)
//! ```
//!
//! Failures that escape the filters (business and system failures from the
//! handler, anything a filter itself returns) are translated into an
//! [`Outcome`](crate::Outcome) exactly once, here. A panic in a filter or
//! interceptor hook is caught here too and answered as a system failure;
//! hooks that had not yet run by then, after-completion included, are
//! skipped for that request.

use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tracing::{Instrument, error, info, info_span};

use crate::dispatch::{Dispatcher, panic_message};
use crate::error::{Error, SystemError};
use crate::filter::{FilterChain, FilterRegistration};
use crate::interceptor::{InterceptorChain, InterceptorRegistration};
use crate::matching::PatternError;
use crate::request::Request;
use crate::response::{IntoResponse, Response};
use crate::router::Router;
use crate::translate::ErrorTranslator;

pub struct Pipeline {
    filters: FilterChain,
    dispatcher: Dispatcher,
    translator: ErrorTranslator,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    /// Runs one request through every stage. Never fails: every failure is
    /// already an outcome in the returned response.
    pub async fn handle(&self, mut req: Request) -> Response {
        let span = info_span!("request", method = %req.method(), path = req.path());
        async move {
            let mut res = Response::default();
            let run = AssertUnwindSafe(self.filters.run(&mut req, &mut res, &self.dispatcher))
                .catch_unwind()
                .await;
            let failure: Option<Error> = match run {
                Ok(Ok(())) => None,
                Ok(Err(err)) => Some(err),
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    error!(panic = %message, "pipeline unit panicked");
                    res = Response::default();
                    Some(SystemError::Panic(message).into())
                }
            };
            if let Some(err) = failure {
                res.merge(self.translator.translate(&err).into_response());
            }
            res
        }
        .instrument(span)
        .await
    }

    /// Filter names in execution order.
    pub fn filters(&self) -> Vec<&str> {
        self.filters.names()
    }

    /// Runs filter teardown. Safe to call more than once.
    pub fn shutdown(&self) {
        info!("pipeline shutting down");
        self.filters.destroy();
    }
}

#[derive(Default)]
pub struct PipelineBuilder {
    filters: Vec<FilterRegistration>,
    interceptors: Vec<InterceptorRegistration>,
    router: Router,
    translator: ErrorTranslator,
}

impl PipelineBuilder {
    pub fn filter(mut self, registration: FilterRegistration) -> Self {
        self.filters.push(registration);
        self
    }

    pub fn interceptor(mut self, registration: InterceptorRegistration) -> Self {
        self.interceptors.push(registration);
        self
    }

    pub fn router(mut self, router: Router) -> Self {
        self.router = router;
        self
    }

    pub fn translator(mut self, translator: ErrorTranslator) -> Self {
        self.translator = translator;
        self
    }

    /// Assembles both chains. Filter `init` hooks run here.
    pub fn build(self) -> Result<Pipeline, PatternError> {
        let interceptors = InterceptorChain::assemble(self.interceptors)?.translator(self.translator.clone());
        let filters = FilterChain::assemble(self.filters)?;
        info!(filters = filters.len(), interceptors = interceptors.names().len(), "pipeline assembled");
        Ok(Pipeline {
            filters,
            dispatcher: Dispatcher::new(self.router, interceptors),
            translator: self.translator,
        })
    }
}

#[cfg(test)]
mod tests {
    use http::{Method, StatusCode};
    use serde_json::{Value, json};

    use async_trait::async_trait;

    use super::*;
    use crate::filter::{Filter, Next};
    use crate::interceptor::Interceptor;
    use crate::outcome::Outcome;

    async fn hello(_: Request) -> Result<Outcome, Error> {
        Ok(Outcome::success(json!("hello")))
    }

    async fn broken(_: Request) -> Result<Outcome, Error> {
        Err(Error::missing("user"))
    }

    async fn panics(_: Request) -> Result<Outcome, Error> {
        panic!("index out of bounds")
    }

    fn pipeline() -> Pipeline {
        Pipeline::builder()
            .router(Router::new().get("/hello", hello).get("/broken", broken).get("/panics", panics))
            .build()
            .unwrap()
    }

    fn body(res: &Response) -> Value {
        serde_json::from_slice(res.body()).unwrap()
    }

    #[tokio::test]
    async fn success_outcome() {
        let res = pipeline().handle(Request::new(Method::GET, "/hello")).await;
        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(body(&res), json!({ "code": "200", "success": true, "message": "ok", "data": "hello" }));
    }

    #[tokio::test]
    async fn missing_reference_is_a_system_failure() {
        let res = pipeline().handle(Request::new(Method::GET, "/broken")).await;
        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body(&res)["message"], "missing reference");
    }

    #[tokio::test]
    async fn panic_is_a_system_failure() {
        let res = pipeline().handle(Request::new(Method::GET, "/panics")).await;
        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body(&res)["success"], false);
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        let res = pipeline().handle(Request::new(Method::GET, "/nope")).await;
        assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(body(&res)["code"], "404");
    }

    struct PanickingFilter;

    #[async_trait]
    impl Filter for PanickingFilter {
        async fn do_filter(&self, _: &mut Request, res: &mut Response, _: Next<'_>) -> Result<(), Error> {
            res.set_header("x-partial", "yes");
            panic!("filter bug")
        }
    }

    struct PanickingInterceptor;

    impl Interceptor for PanickingInterceptor {
        fn pre_handle(&self, _: &mut Request, _: &mut Response) -> Result<bool, Error> {
            panic!("interceptor bug")
        }
    }

    #[tokio::test]
    async fn panicking_filter_becomes_a_system_failure() {
        let pipeline = Pipeline::builder()
            .filter(FilterRegistration::new("broken", PanickingFilter))
            .router(Router::new().get("/hello", hello))
            .build()
            .unwrap();

        let res = pipeline.handle(Request::new(Method::GET, "/hello")).await;
        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body(&res)["success"], false);
        assert_eq!(res.header("x-partial"), None);
    }

    #[tokio::test]
    async fn panicking_interceptor_becomes_a_system_failure() {
        let pipeline = Pipeline::builder()
            .interceptor(InterceptorRegistration::new("broken", PanickingInterceptor))
            .router(Router::new().get("/hello", hello))
            .build()
            .unwrap();

        let res = pipeline.handle(Request::new(Method::GET, "/hello")).await;
        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body(&res)["code"], "500");
    }
}
