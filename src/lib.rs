//! # crosscut
//!
//! Cross-cutting concerns layered around one request pipeline: transport
//! filters, path-scoped interceptors, method-level advice, cache-aside
//! storage and stateless token authentication.
//!
//! ## How a request flows
//!
//! Filters wrap everything and see the request before routing. Interceptors
//! run after routing with pre/post/after-completion hooks. The handler runs
//! innermost, and any call it makes through a [`Woven`](weave::Woven) handle
//! is wrapped by the aspects whose rules match that call site. Every exit
//! ends as the same four-field [`Outcome`].
//!
//! Each layer has its own short-circuit rule:
//!
//! - a filter ends the request by not calling [`Next::run`](filter::Next::run);
//! - an interceptor ends it by returning `Ok(false)` from `pre_handle`;
//! - an around advice skips the real call by not calling
//!   [`CallContext::proceed`](weave::CallContext::proceed).
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use crosscut::auth::{Claims, TokenAuthenticator};
//! use crosscut::filter::{FilterRegistration, LogFilter};
//! use crosscut::interceptor::{AuthInterceptor, InterceptorRegistration};
//! use crosscut::{Error, Outcome, Pipeline, Request, Router, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let tokens = Arc::new(TokenAuthenticator::new("change-me")?);
//!
//!     let pipeline = Pipeline::builder()
//!         .filter(FilterRegistration::new("log", LogFilter).url_pattern("/**"))
//!         .interceptor(
//!             InterceptorRegistration::new("auth", AuthInterceptor::new(Arc::clone(&tokens)))
//!                 .add_path_patterns(["/user/**"])
//!                 .exclude_path_patterns(["/user/login"]),
//!         )
//!         .router(Router::new().get("/user/center", center))
//!         .build()?;
//!
//!     Server::bind(([0, 0, 0, 0], 3000).into()).serve(pipeline).await?;
//!     Ok(())
//! }
//!
//! async fn center(req: Request) -> Result<Outcome, Error> {
//!     let claims = req.extensions().get::<Claims>().ok_or_else(|| Error::missing("claims"))?;
//!     Ok(Outcome::success(claims.subject().unwrap_or_default()))
//! }
//! ```

pub mod auth;
pub mod cache;
pub mod config;
mod dispatch;
mod error;
pub mod filter;
mod handler;
pub mod interceptor;
pub mod logging;
pub mod matching;
pub mod order;
mod outcome;
mod pipeline;
mod request;
mod response;
mod router;
mod server;
mod translate;
pub mod validation;
pub mod weave;

pub use error::{Error, SystemError};
pub use handler::{BoxFuture, Handler};
pub use outcome::{Outcome, OutcomeKind, codes};
pub use pipeline::{Pipeline, PipelineBuilder};
pub use request::Request;
pub use response::{IntoResponse, Response, ResponseBuilder};
pub use router::Router;
pub use server::Server;
pub use translate::ErrorTranslator;
