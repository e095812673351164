use std::fmt;
use std::sync::Arc;

use super::Advice;
use crate::config::{AspectRule, ConfigError};
use crate::matching::{CallRule, CallSite};
use crate::order::DEFAULT_ORDER;

/// A named advice bound to the call sites its rule selects.
#[derive(Clone)]
pub struct Aspect {
    name: String,
    rule: CallRule,
    order: i32,
    advice: Arc<dyn Advice>,
}

impl Aspect {
    pub fn new(name: impl Into<String>, rule: CallRule, advice: impl Advice) -> Self {
        Self::shared(name, rule, Arc::new(advice))
    }

    /// Same as [`new`](Aspect::new) for an advice that is also held elsewhere.
    pub fn shared(name: impl Into<String>, rule: CallRule, advice: Arc<dyn Advice>) -> Self {
        Self { name: name.into(), rule, order: DEFAULT_ORDER, advice }
    }

    /// Binds `advice` to a configured pointcut and order.
    pub fn from_rule(rule: &AspectRule, advice: impl Advice) -> Result<Self, ConfigError> {
        Ok(Self::new(rule.name.as_str(), rule.pointcut()?, advice).order(rule.order))
    }

    /// Lower wraps further out.
    pub fn order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rule(&self) -> &CallRule {
        &self.rule
    }

    pub fn precedence(&self) -> i32 {
        self.order
    }

    pub fn applies_to(&self, site: &CallSite) -> bool {
        self.rule.matches(site)
    }

    pub(crate) fn advice(&self) -> &dyn Advice {
        self.advice.as_ref()
    }
}

impl fmt::Debug for Aspect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Aspect")
            .field("name", &self.name)
            .field("rule", &self.rule)
            .field("order", &self.order)
            .finish_non_exhaustive()
    }
}
