use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, trace};

use super::context::CallContext;
use super::{Aspect, JoinPoint};
use crate::error::{Error, SystemError};
use crate::matching::CallSite;

/// Every registered aspect, in wrapping order.
#[derive(Debug, Clone, Default)]
pub struct Weaver {
    aspects: Vec<Arc<Aspect>>,
}

impl Weaver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an aspect. Aspects are kept sorted by order, ties in the order
    /// they were added.
    pub fn aspect(mut self, aspect: Aspect) -> Self {
        self.aspects.push(Arc::new(aspect));
        self.aspects.sort_by_key(|a| a.precedence());
        self
    }

    pub fn names(&self) -> Vec<&str> {
        self.aspects.iter().map(|a| a.name()).collect()
    }

    /// Resolves the aspects that apply to `site`. Do this once per call site
    /// at startup and keep the handle.
    pub fn weave(&self, site: CallSite) -> Woven {
        let chain: Vec<_> = self.aspects.iter().filter(|a| a.applies_to(&site)).cloned().collect();
        debug!(
            site = %site,
            aspects = ?chain.iter().map(|a| a.name()).collect::<Vec<_>>(),
            "call site woven"
        );
        Woven { site, chain }
    }
}

/// A call site with its matched aspects.
#[derive(Debug, Clone)]
pub struct Woven {
    site: CallSite,
    chain: Vec<Arc<Aspect>>,
}

impl Woven {
    pub fn site(&self) -> &CallSite {
        &self.site
    }

    /// Names of the aspects wrapping this site, outermost first.
    pub fn aspects(&self) -> Vec<&str> {
        self.chain.iter().map(|a| a.name()).collect()
    }

    pub fn is_advised(&self) -> bool {
        !self.chain.is_empty()
    }

    /// Runs `target` with `args` inside every matched aspect.
    ///
    /// `target` runs at most once, and not at all if an around hook
    /// declines to continue.
    pub fn invoke<F>(&self, args: Vec<Value>, target: F) -> Result<Value, Error>
    where
        F: FnOnce(Vec<Value>) -> Result<Value, Error>,
    {
        let mut target = Some(target);
        self.run(0, args, &mut target)
    }

    fn run<F>(&self, idx: usize, args: Vec<Value>, target: &mut Option<F>) -> Result<Value, Error>
    where
        F: FnOnce(Vec<Value>) -> Result<Value, Error>,
    {
        let Some(aspect) = self.chain.get(idx) else {
            let call = target
                .take()
                .ok_or_else(|| SystemError::ContinuationReused { site: self.site.to_string() })?;
            trace!(site = %self.site, "invoking target");
            return call(args);
        };

        let jp = JoinPoint::new(&self.site, aspect.name());
        let advice = aspect.advice();

        advice.before(&jp, &args);
        let result = {
            let mut rest = |args: Vec<Value>| self.run(idx + 1, args, target);
            let mut ctx = CallContext::new(jp, args, &mut rest);
            let result = advice.around(&mut ctx);
            if !ctx.proceeded() {
                debug!(site = %self.site, aspect = aspect.name(), "around hook short-circuited the call");
            }
            result
        };
        advice.after(&jp);
        match &result {
            Ok(value) => advice.after_returning(&jp, value),
            Err(err) => advice.after_throwing(&jp, err),
        }
        result
    }
}
