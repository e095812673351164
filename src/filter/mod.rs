//! Transport-level filters.
//!
//! A filter sees the raw request and the mutable response before routing,
//! and wraps everything inside it: the inner filters, route resolution, the
//! interceptor chain and the handler. It continues the chain by calling
//! [`Next::run`]; returning without doing so ends the request right there,
//! and whatever is in the response at that point is what gets sent.
//!
//! ```rust
//! use async_trait::async_trait;
//! use crosscut::filter::{Filter, Next};
//! use crosscut::{Error, Request, Response};
//!
//! struct RequestId;
//!
//! #[async_trait]
//! impl Filter for RequestId {
//!     async fn do_filter(&self, req: &mut Request, res: &mut Response, next: Next<'_>) -> Result<(), Error> {
//!         let id = req.header("x-request-id").unwrap_or("generated").to_owned();
//!         res.set_header("x-request-id", &id);
//!         next.run(req, res).await
//!     }
//! }
//! ```
//!
//! Filters are assembled once into a [`FilterChain`], sorted ascending by
//! order with ties kept in registration order. `init` runs for each filter at
//! assembly and `destroy` once at shutdown; a failure in either is logged
//! and otherwise ignored.

mod chain;
mod log;

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::Error;
use crate::request::Request;
use crate::response::Response;

pub use chain::{Endpoint, FilterChain, FilterRegistration, Next};
pub use log::LogFilter;

#[async_trait]
pub trait Filter: Send + Sync + 'static {
    fn init(&self, _config: &FilterConfig) -> Result<(), Error> {
        Ok(())
    }

    async fn do_filter(&self, req: &mut Request, res: &mut Response, next: Next<'_>) -> Result<(), Error>;

    fn destroy(&self) -> Result<(), Error> {
        Ok(())
    }
}

/// What a filter is told about itself at assembly.
#[derive(Debug, Clone, Default)]
pub struct FilterConfig {
    name: String,
    init_params: BTreeMap<String, String>,
}

impl FilterConfig {
    pub(crate) fn new(name: String, init_params: BTreeMap<String, String>) -> Self {
        Self { name, init_params }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn init_param(&self, key: &str) -> Option<&str> {
        self.init_params.get(key).map(String::as_str)
    }

    pub fn init_params(&self) -> &BTreeMap<String, String> {
        &self.init_params
    }
}
