use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use super::store::{Cache, TtlPolicy};
use crate::error::Error;
use crate::matching::{CallRule, CallSite};
use crate::order::LOWEST_PRECEDENCE;
use crate::weave::{Advice, Aspect, CallContext};

/// How a cache key is derived from a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySpec {
    /// The same key for every call.
    Fixed(String),
    /// The listed arguments, as a JSON array.
    Args(Vec<usize>),
    /// The call site and every argument, as a JSON array.
    Identity,
}

impl KeySpec {
    /// Key from the first argument, the common `#id` case.
    pub fn first_arg() -> Self {
        Self::Args(vec![0])
    }

    /// Keys are JSON text, so argument lists that differ in type, count or
    /// content never share a key.
    pub fn derive(&self, site: &CallSite, args: &[Value]) -> Result<String, Error> {
        match self {
            Self::Fixed(key) => Ok(key.clone()),
            Self::Args(indices) => {
                let parts = indices
                    .iter()
                    .map(|&i| {
                        args.get(i)
                            .cloned()
                            .ok_or_else(|| Error::missing(format!("argument {i} for the cache key of {site}")))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::Array(parts).to_string())
            }
            Self::Identity => {
                let key = Value::Array(vec![Value::from(site.to_string()), Value::Array(args.to_vec())]);
                Ok(key.to_string())
            }
        }
    }
}

// ── Cacheable ─────────────────────────────────────────────────────────────────

/// Serves a call from the cache, running it only on a miss.
#[derive(Debug, Clone)]
pub struct CacheableAdvice {
    cache: Arc<Cache>,
    key: KeySpec,
    ttl: Option<TtlPolicy>,
}

impl CacheableAdvice {
    pub fn new(cache: Arc<Cache>, key: KeySpec) -> Self {
        Self { cache, key, ttl: None }
    }

    /// Overrides the cache's default policy for entries this advice stores.
    pub fn ttl(mut self, ttl: TtlPolicy) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Wraps the advice in an aspect at the lowest precedence, so any other
    /// aspect on the same call runs outside the cache lookup.
    pub fn into_aspect(self, name: impl Into<String>, rule: CallRule) -> Aspect {
        Aspect::new(name, rule, self).order(LOWEST_PRECEDENCE)
    }
}

impl Advice for CacheableAdvice {
    fn around(&self, ctx: &mut CallContext<'_>) -> Result<Value, Error> {
        let key = self.key.derive(ctx.site(), ctx.args())?;
        let ttl = self.ttl.unwrap_or(self.cache.settings().ttl);
        self.cache.get_or_compute(&key, ttl, || ctx.proceed())
    }
}

// ── CacheEvict ────────────────────────────────────────────────────────────────

/// Evicts after a successful call (or before the call, if asked to).
#[derive(Debug, Clone)]
pub struct CacheEvictAdvice {
    cache: Arc<Cache>,
    key: KeySpec,
    all_entries: bool,
    before_invocation: bool,
}

impl CacheEvictAdvice {
    pub fn new(cache: Arc<Cache>, key: KeySpec) -> Self {
        Self { cache, key, all_entries: false, before_invocation: false }
    }

    /// Clears the whole cache instead of one key.
    pub fn all_entries(mut self) -> Self {
        self.all_entries = true;
        self
    }

    /// Evicts before the call runs, whether or not it then succeeds.
    pub fn before_invocation(mut self) -> Self {
        self.before_invocation = true;
        self
    }

    pub fn into_aspect(self, name: impl Into<String>, rule: CallRule) -> Aspect {
        Aspect::new(name, rule, self).order(LOWEST_PRECEDENCE)
    }

    fn evict(&self, site: &CallSite, args: &[Value]) -> Result<(), Error> {
        if self.all_entries {
            self.cache.clear();
        } else {
            let key = self.key.derive(site, args)?;
            self.cache.evict(&key);
        }
        debug!(cache = self.cache.name(), site = %site, "cache evicted");
        Ok(())
    }
}

impl Advice for CacheEvictAdvice {
    fn around(&self, ctx: &mut CallContext<'_>) -> Result<Value, Error> {
        if self.before_invocation {
            self.evict(ctx.site(), ctx.args())?;
            return ctx.proceed();
        }
        let args = ctx.args().to_vec();
        let result = ctx.proceed()?;
        self.evict(ctx.site(), &args)?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use serde_json::json;

    use super::*;
    use crate::cache::CacheSettings;
    use crate::weave::Weaver;

    fn user_cache() -> Arc<Cache> {
        Arc::new(Cache::new("users", CacheSettings::default()))
    }

    fn rule(method: &str) -> CallRule {
        CallRule::signature(&format!("demo::UserService.{method}")).unwrap()
    }

    #[test]
    fn keys_are_deterministic() {
        let site = CallSite::new("demo::UserService", "find");
        let args = [json!(7), json!("ann")];
        assert_eq!(KeySpec::first_arg().derive(&site, &args).unwrap(), "[7]");
        assert_eq!(KeySpec::Args(vec![1, 0]).derive(&site, &args).unwrap(), r#"["ann",7]"#);
        assert_eq!(KeySpec::Fixed("caffeine".into()).derive(&site, &args).unwrap(), "caffeine");
        assert_eq!(
            KeySpec::Identity.derive(&site, &args).unwrap(),
            r#"["demo::UserService.find",[7,"ann"]]"#
        );
        assert!(KeySpec::Args(vec![2]).derive(&site, &args).is_err());
    }

    #[test]
    fn distinct_arguments_never_share_a_key() {
        let site = CallSite::new("demo::UserService", "find");
        let pairs = [
            (vec![json!("1")], vec![json!(1)]),
            (vec![json!("a,b")], vec![json!("a"), json!("b")]),
            (vec![json!("a:b")], vec![json!("a"), json!("b")]),
            (vec![json!(null)], vec![json!("null")]),
            (vec![], vec![json!("")]),
        ];
        for (left, right) in &pairs {
            assert_ne!(
                KeySpec::Identity.derive(&site, left).unwrap(),
                KeySpec::Identity.derive(&site, right).unwrap(),
                "{left:?} vs {right:?}"
            );
        }

        let both = KeySpec::Args(vec![0, 1]);
        assert_ne!(
            both.derive(&site, &[json!("a:b"), json!("c")]).unwrap(),
            both.derive(&site, &[json!("a"), json!("b:c")]).unwrap()
        );
        assert_ne!(
            KeySpec::first_arg().derive(&site, &[json!("1")]).unwrap(),
            KeySpec::first_arg().derive(&site, &[json!(1)]).unwrap()
        );
    }

    #[test]
    fn string_and_number_ids_are_cached_apart() {
        let cache = user_cache();
        let find = Weaver::new()
            .aspect(CacheableAdvice::new(Arc::clone(&cache), KeySpec::Identity).into_aspect("cache", rule("find")))
            .weave(CallSite::new("demo::UserService", "find"));

        let by_number = find.invoke(vec![json!(1)], |_| Ok(json!("number"))).unwrap();
        let by_string = find.invoke(vec![json!("1")], |_| Ok(json!("string"))).unwrap();

        assert_eq!(by_number, "number");
        assert_eq!(by_string, "string");
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn cacheable_runs_the_call_on_miss_only() {
        let cache = user_cache();
        let find = Weaver::new()
            .aspect(CacheableAdvice::new(Arc::clone(&cache), KeySpec::first_arg()).into_aspect("cache", rule("find")))
            .weave(CallSite::new("demo::UserService", "find"));

        let loads = Cell::new(0);
        let load = |args: Vec<Value>| -> Result<Value, Error> {
            loads.set(loads.get() + 1);
            Ok(json!({ "id": args[0], "name": "ann" }))
        };

        find.invoke(vec![json!(1)], load).unwrap();
        let again = find.invoke(vec![json!(1)], load).unwrap();
        find.invoke(vec![json!(2)], load).unwrap();

        assert_eq!(again["name"], "ann");
        assert_eq!(loads.get(), 2);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn evict_after_success_only() {
        let cache = user_cache();
        cache.put("[1]", json!("cached"));
        let weaver = Weaver::new().aspect(
            CacheEvictAdvice::new(Arc::clone(&cache), KeySpec::first_arg()).into_aspect("evict", rule("delete")),
        );
        let delete = weaver.weave(CallSite::new("demo::UserService", "delete"));

        assert!(delete.invoke(vec![json!(1)], |_| Err(Error::internal("db down"))).is_err());
        assert!(cache.get("[1]").is_some());

        delete.invoke(vec![json!(1)], |_| Ok(Value::Null)).unwrap();
        assert!(cache.get("[1]").is_none());
    }

    #[test]
    fn evict_all_before_invocation() {
        let cache = user_cache();
        cache.put("1", json!("a"));
        cache.put("2", json!("b"));
        let reset = Weaver::new()
            .aspect(
                CacheEvictAdvice::new(Arc::clone(&cache), KeySpec::Fixed("caffeine".into()))
                    .all_entries()
                    .before_invocation()
                    .into_aspect("evict-all", rule("reset")),
            )
            .weave(CallSite::new("demo::UserService", "reset"));

        assert!(reset.invoke(vec![], |_| Err(Error::internal("failed anyway"))).is_err());
        assert!(cache.is_empty());
    }
}
