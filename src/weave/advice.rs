use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::context::CallContext;
use super::{Advice, JoinPoint};
use crate::error::Error;
use crate::matching::CallRule;

// ── LogAdvice ─────────────────────────────────────────────────────────────────

/// One log line per hook.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAdvice;

impl Advice for LogAdvice {
    fn before(&self, jp: &JoinPoint<'_>, args: &[Value]) {
        info!(site = %jp.site(), args = ?args, "call starting");
    }

    fn after(&self, jp: &JoinPoint<'_>) {
        debug!(site = %jp.site(), "call finished");
    }

    fn after_returning(&self, jp: &JoinPoint<'_>, result: &Value) {
        info!(site = %jp.site(), result = %result, "call returned");
    }

    fn after_throwing(&self, jp: &JoinPoint<'_>, err: &Error) {
        warn!(site = %jp.site(), error = %err, "call failed");
    }
}

// ── TimingAdvice ──────────────────────────────────────────────────────────────

type Observer = Arc<dyn Fn(&JoinPoint<'_>, Duration) + Send + Sync>;

/// Measures the time spent inside its around scope and logs it.
#[derive(Clone, Default)]
pub struct TimingAdvice {
    observer: Option<Observer>,
}

impl TimingAdvice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also hands every measurement to `observer`.
    pub fn observe(mut self, observer: impl Fn(&JoinPoint<'_>, Duration) + Send + Sync + 'static) -> Self {
        self.observer = Some(Arc::new(observer));
        self
    }
}

impl fmt::Debug for TimingAdvice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimingAdvice").field("observed", &self.observer.is_some()).finish()
    }
}

impl Advice for TimingAdvice {
    fn around(&self, ctx: &mut CallContext<'_>) -> Result<Value, Error> {
        let started = Instant::now();
        let result = ctx.proceed();
        let elapsed = started.elapsed();
        info!(site = %ctx.site(), elapsed_ms = elapsed.as_secs_f64() * 1000.0, ok = result.is_ok(), "call timed");
        if let Some(observer) = &self.observer {
            observer(ctx.join_point(), elapsed);
        }
        result
    }
}

// ── SysLogAdvice ──────────────────────────────────────────────────────────────

/// Marker that opts a call site into system logging. Its value, if any,
/// becomes the record's remark.
pub const SYS_LOG_MARKER: &str = "sys_log";

/// One audited call.
#[derive(Debug, Clone, Serialize)]
pub struct SysLogRecord {
    pub type_name: String,
    pub method: String,
    pub params: Vec<Value>,
    pub elapsed: Duration,
    pub remark: Option<String>,
    pub created_at: SystemTime,
    pub succeeded: bool,
}

/// Where audit records go.
pub trait SysLogSink: Send + Sync + 'static {
    fn record(&self, record: SysLogRecord);
}

/// Writes audit records as structured log events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSysLogSink;

impl SysLogSink for TracingSysLogSink {
    fn record(&self, record: SysLogRecord) {
        info!(
            type_name = %record.type_name,
            method = %record.method,
            params = ?record.params,
            elapsed_ms = record.elapsed.as_millis() as u64,
            remark = record.remark.as_deref().unwrap_or_default(),
            succeeded = record.succeeded,
            "sys log"
        );
    }
}

/// Produces a [`SysLogRecord`] for every call marked with [`SYS_LOG_MARKER`].
#[derive(Clone)]
pub struct SysLogAdvice {
    sink: Arc<dyn SysLogSink>,
}

impl SysLogAdvice {
    pub fn new(sink: impl SysLogSink) -> Self {
        Self { sink: Arc::new(sink) }
    }

    /// Selects call sites carrying [`SYS_LOG_MARKER`].
    pub fn pointcut() -> CallRule {
        CallRule::marker(SYS_LOG_MARKER)
    }
}

impl Default for SysLogAdvice {
    fn default() -> Self {
        Self::new(TracingSysLogSink)
    }
}

impl fmt::Debug for SysLogAdvice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SysLogAdvice").finish_non_exhaustive()
    }
}

impl Advice for SysLogAdvice {
    fn around(&self, ctx: &mut CallContext<'_>) -> Result<Value, Error> {
        let params = ctx.args().to_vec();
        let started = Instant::now();
        let result = ctx.proceed();

        let site = ctx.site();
        self.sink.record(SysLogRecord {
            type_name: site.type_name().to_owned(),
            method: site.method().to_owned(),
            params,
            elapsed: started.elapsed(),
            remark: site.marker(SYS_LOG_MARKER).and_then(|m| m.value()).map(str::to_owned),
            created_at: SystemTime::now(),
            succeeded: result.is_ok(),
        });
        result
    }
}
