use std::time::Instant;

use async_trait::async_trait;
use tracing::info;

use super::{Filter, FilterConfig, Next};
use crate::error::Error;
use crate::request::Request;
use crate::response::Response;

/// Logs one event when a request enters and one when its response leaves.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogFilter;

#[async_trait]
impl Filter for LogFilter {
    fn init(&self, config: &FilterConfig) -> Result<(), Error> {
        info!(filter = config.name(), params = ?config.init_params(), "log filter ready");
        Ok(())
    }

    async fn do_filter(&self, req: &mut Request, res: &mut Response, next: Next<'_>) -> Result<(), Error> {
        let started = Instant::now();
        info!(method = %req.method(), path = req.path(), "request received");

        let result = next.run(req, res).await;

        info!(
            status = res.status_code().as_u16(),
            failed = result.is_err(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "response sent"
        );
        result
    }
}
