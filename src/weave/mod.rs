//! Method-level call interception.
//!
//! # Model
//!
//! An [`Aspect`] is a named [`Advice`] plus the [`CallRule`](crate::matching::CallRule)
//! saying which call sites it applies to. A [`Weaver`] holds every aspect in
//! a fixed order (ascending `order`, ties in registration order). Weaving a
//! [`CallSite`](crate::matching::CallSite) resolves, once, the aspects that
//! match it and returns a [`Woven`] handle; invoking the handle runs the
//! real call nested inside those aspects:
//!
//! ```text
//! before₁
//! around₁ ─┐
//!          │ before₂
//!          │ around₂ ─┐
//!          │          │ real call
//!          │ ◄────────┘
//!          │ after₂, after_returning₂ | after_throwing₂
//! ◄────────┘
//! after₁, after_returning₁ | after_throwing₁
//! ```
//!
//! `around` is the only hook that can change control flow. It receives a
//! [`CallContext`] whose continuation runs everything inside it. Calling the
//! continuation twice is an error; not calling it skips the real call and
//! whatever `around` returns becomes the result.
//!
//! ```rust
//! use crosscut::matching::{CallRule, CallSite};
//! use crosscut::weave::{Advice, Aspect, CallContext, Weaver};
//! use crosscut::Error;
//! use serde_json::{json, Value};
//!
//! struct RejectNegativeIds;
//!
//! impl Advice for RejectNegativeIds {
//!     fn around(&self, ctx: &mut CallContext<'_>) -> Result<Value, Error> {
//!         if ctx.args()[0].as_i64().is_some_and(|id| id < 0) {
//!             return Ok(json!("rejected"));
//!         }
//!         ctx.proceed()
//!     }
//! }
//!
//! let weaver = Weaver::new().aspect(Aspect::new(
//!     "guard",
//!     CallRule::signature("demo::*.find*").unwrap(),
//!     RejectNegativeIds,
//! ));
//! let find = weaver.weave(CallSite::new("demo::UserService", "find_user"));
//!
//! let result = find.invoke(vec![json!(-1)], |_| Ok(json!("found"))).unwrap();
//! assert_eq!(result, json!("rejected"));
//! ```

mod advice;
mod aspect;
mod context;
mod weaver;

use serde_json::Value;

use crate::error::Error;
use crate::matching::CallSite;

pub use advice::{LogAdvice, SYS_LOG_MARKER, SysLogAdvice, SysLogRecord, SysLogSink, TimingAdvice, TracingSysLogSink};
pub use aspect::Aspect;
pub use context::CallContext;
pub use weaver::{Weaver, Woven};

/// Hooks run around a matched call. Every hook has a no-op default.
pub trait Advice: Send + Sync + 'static {
    /// Before the call. Cannot veto it.
    fn before(&self, _jp: &JoinPoint<'_>, _args: &[Value]) {}

    /// Wraps the call; see [`CallContext`].
    fn around(&self, ctx: &mut CallContext<'_>) -> Result<Value, Error> {
        ctx.proceed()
    }

    /// After the call, success or failure. Runs before the two below.
    fn after(&self, _jp: &JoinPoint<'_>) {}

    fn after_returning(&self, _jp: &JoinPoint<'_>, _result: &Value) {}

    /// Observes a failure; it keeps propagating.
    fn after_throwing(&self, _jp: &JoinPoint<'_>, _err: &Error) {}
}

/// The call site being advised and the aspect doing it.
#[derive(Debug, Clone, Copy)]
pub struct JoinPoint<'a> {
    site: &'a CallSite,
    aspect: &'a str,
}

impl<'a> JoinPoint<'a> {
    pub(crate) fn new(site: &'a CallSite, aspect: &'a str) -> Self {
        Self { site, aspect }
    }

    pub fn site(&self) -> &'a CallSite {
        self.site
    }

    pub fn aspect(&self) -> &'a str {
        self.aspect
    }
}
