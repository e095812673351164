use serde_json::Value;
use tracing::warn;

use super::JoinPoint;
use crate::error::{Error, SystemError};
use crate::matching::CallSite;

pub(crate) type Continuation<'a> = dyn FnMut(Vec<Value>) -> Result<Value, Error> + 'a;

/// Per-call state handed to [`Advice::around`](super::Advice::around).
///
/// Holds the arguments (which the hook may replace) and the continuation
/// into the rest of the chain. The continuation runs at most once.
pub struct CallContext<'a> {
    join_point: JoinPoint<'a>,
    args: Vec<Value>,
    proceeded: bool,
    rest: &'a mut Continuation<'a>,
}

impl<'a> CallContext<'a> {
    pub(crate) fn new(join_point: JoinPoint<'a>, args: Vec<Value>, rest: &'a mut Continuation<'a>) -> Self {
        Self { join_point, args, proceeded: false, rest }
    }

    pub fn join_point(&self) -> &JoinPoint<'a> {
        &self.join_point
    }

    pub fn site(&self) -> &CallSite {
        self.join_point.site()
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn args_mut(&mut self) -> &mut Vec<Value> {
        &mut self.args
    }

    pub fn set_args(&mut self, args: Vec<Value>) {
        self.args = args;
    }

    /// `true` once the continuation has been invoked.
    pub fn proceeded(&self) -> bool {
        self.proceeded
    }

    /// Runs the rest of the chain with the current arguments.
    pub fn proceed(&mut self) -> Result<Value, Error> {
        let args = self.args.clone();
        self.proceed_with(args)
    }

    /// Runs the rest of the chain with `args`.
    ///
    /// # Errors
    ///
    /// [`SystemError::ContinuationReused`] on a second call; the rest of
    /// the chain does not run again.
    pub fn proceed_with(&mut self, args: Vec<Value>) -> Result<Value, Error> {
        if self.proceeded {
            return Err(SystemError::ContinuationReused { site: self.site().to_string() }.into());
        }
        self.proceeded = true;
        (self.rest)(args)
    }

    /// Replaces a failure with a fabricated result. The replacement is
    /// logged with the failure it hides.
    pub fn recover(&self, err: Error, replacement: Value) -> Value {
        warn!(
            site = %self.site(),
            aspect = self.join_point.aspect(),
            error = %err,
            replacement = %replacement,
            "failure replaced by around hook"
        );
        replacement
    }
}
