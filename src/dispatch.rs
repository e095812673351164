//! The innermost stage: route resolution, the interceptor chain and the
//! handler call.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use futures::FutureExt;
use http::StatusCode;
use tracing::{debug, error};

use crate::error::{Error, SystemError};
use crate::filter::Endpoint;
use crate::handler::BoxedHandler;
use crate::interceptor::InterceptorChain;
use crate::outcome::{Outcome, codes};
use crate::request::Request;
use crate::response::{IntoResponse, Response};
use crate::router::Router;

pub(crate) struct Dispatcher {
    router: Router,
    interceptors: InterceptorChain,
}

impl Dispatcher {
    pub(crate) fn new(router: Router, interceptors: InterceptorChain) -> Self {
        Self { router, interceptors }
    }
}

#[async_trait]
impl Endpoint for Dispatcher {
    async fn call(&self, req: &mut Request, res: &mut Response) -> Result<(), Error> {
        let Some((handler, params)) = self.router.lookup(req.method(), req.path()) else {
            debug!("no route");
            let outcome = Outcome::business_failure(codes::NOT_FOUND, "no route")
                .with_status(StatusCode::NOT_FOUND);
            res.merge(outcome.into_response());
            return Ok(());
        };
        req.set_params(params);
        self.interceptors.execute(req, res, |req| invoke(handler, req)).await
    }
}

/// Calls the handler. A panic anywhere inside it becomes a system failure.
async fn invoke(handler: BoxedHandler, req: Request) -> Result<Response, Error> {
    match AssertUnwindSafe(async move { handler.call(req).await }).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(panic = %message, "handler panicked");
            Err(SystemError::Panic(message).into())
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
