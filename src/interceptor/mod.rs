//! Framework-level interceptors.
//!
//! Interceptors run after route resolution and around the handler. Each
//! exposes three hooks:
//!
//! | Hook | Runs | Order |
//! |---|---|---|
//! | `pre_handle` | before the handler; `Ok(false)` vetoes the request | registration |
//! | `post_handle` | after the handler returned successfully | registration |
//! | `after_completion` | always, for every unit whose `pre_handle` ran | reverse |
//!
//! Path rules are checked once when the request enters the chain. A unit
//! that does not apply to the path is skipped entirely: none of its three
//! hooks run for that request.
//!
//! Validation and authentication failures raised here are resolved here:
//! they are translated into the response before `after_completion` runs and
//! never reach the handler or the outermost error boundary.

mod auth;
mod chain;
mod validation;

use crate::error::Error;
use crate::request::Request;
use crate::response::Response;

pub use auth::AuthInterceptor;
pub use chain::{InterceptorChain, InterceptorRegistration};
pub use validation::ValidationInterceptor;

pub trait Interceptor: Send + Sync + 'static {
    /// `Ok(false)` stops the request; whatever the interceptor wrote into
    /// `res` is sent.
    fn pre_handle(&self, _req: &mut Request, _res: &mut Response) -> Result<bool, Error> {
        Ok(true)
    }

    fn post_handle(&self, _req: &Request, _res: &mut Response) -> Result<(), Error> {
        Ok(())
    }

    /// `err` is the failure that ended the request, if any.
    fn after_completion(&self, _req: &Request, _res: &Response, _err: Option<&Error>) {}
}
