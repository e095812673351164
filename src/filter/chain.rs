use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tracing::{debug, info, trace, warn};

use super::{Filter, FilterConfig};
use crate::config::FilterRule;
use crate::error::Error;
use crate::handler::BoxFuture;
use crate::matching::{PathRules, PatternError};
use crate::order::DEFAULT_ORDER;
use crate::request::Request;
use crate::response::Response;

/// Whatever sits inside the innermost filter.
#[async_trait]
pub trait Endpoint: Send + Sync {
    async fn call(&self, req: &mut Request, res: &mut Response) -> Result<(), Error>;
}

// ── Registration ──────────────────────────────────────────────────────────────

/// A filter plus the name, order, path scope and init parameters it is
/// registered with.
pub struct FilterRegistration {
    name: String,
    filter: Arc<dyn Filter>,
    order: i32,
    include: Vec<String>,
    exclude: Vec<String>,
    init_params: BTreeMap<String, String>,
}

impl FilterRegistration {
    pub fn new(name: impl Into<String>, filter: impl Filter) -> Self {
        Self {
            name: name.into(),
            filter: Arc::new(filter),
            order: DEFAULT_ORDER,
            include: Vec::new(),
            exclude: Vec::new(),
            init_params: BTreeMap::new(),
        }
    }

    /// Name, patterns, order and init parameters taken from a configured rule.
    pub fn from_rule(rule: &FilterRule, filter: impl Filter) -> Self {
        Self {
            include: rule.url_patterns.clone(),
            exclude: rule.exclude_patterns.clone(),
            order: rule.order,
            init_params: rule.init_params.clone(),
            ..Self::new(rule.name.as_str(), filter)
        }
    }

    /// Adds a path the filter applies to. With none, it applies everywhere.
    pub fn url_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.include.push(pattern.into());
        self
    }

    pub fn url_patterns<I>(mut self, patterns: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.include.extend(patterns.into_iter().map(Into::into));
        self
    }

    /// Adds a path the filter never applies to, even when included.
    pub fn exclude_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.exclude.push(pattern.into());
        self
    }

    /// Lower runs earlier, i.e. further out.
    pub fn order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    pub fn init_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.init_params.insert(key.into(), value.into());
        self
    }
}

pub(crate) struct RegisteredFilter {
    name: String,
    order: i32,
    rules: PathRules,
    filter: Arc<dyn Filter>,
}

// ── Chain ─────────────────────────────────────────────────────────────────────

/// Filters in execution order, assembled once at startup.
pub struct FilterChain {
    filters: Vec<RegisteredFilter>,
    destroyed: AtomicBool,
}

impl FilterChain {
    /// Compiles every path pattern, sorts by order and runs each filter's
    /// `init`. Only a bad pattern fails assembly.
    pub fn assemble(registrations: Vec<FilterRegistration>) -> Result<Self, PatternError> {
        let mut pending = Vec::with_capacity(registrations.len());
        for reg in registrations {
            let rules = PathRules::new(&reg.include, &reg.exclude)?;
            let config = FilterConfig::new(reg.name.clone(), reg.init_params);
            let unit = RegisteredFilter { name: reg.name, order: reg.order, rules, filter: reg.filter };
            pending.push((unit, config));
        }
        pending.sort_by_key(|(unit, _)| unit.order);

        let filters = pending
            .into_iter()
            .map(|(unit, config)| {
                match unit.filter.init(&config) {
                    Ok(()) => info!(filter = %unit.name, order = unit.order, "filter initialised"),
                    Err(e) => warn!(filter = %unit.name, error = %e, "filter init failed"),
                }
                unit
            })
            .collect();

        Ok(Self { filters, destroyed: AtomicBool::new(false) })
    }

    pub fn empty() -> Self {
        Self { filters: Vec::new(), destroyed: AtomicBool::new(false) }
    }

    /// Runs `req` through every applicable filter and then `endpoint`.
    pub async fn run(
        &self,
        req: &mut Request,
        res: &mut Response,
        endpoint: &dyn Endpoint,
    ) -> Result<(), Error> {
        Next { filters: &self.filters, endpoint }.run(req, res).await
    }

    /// Tears every filter down in reverse order. Later calls do nothing.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        for unit in self.filters.iter().rev() {
            match unit.filter.destroy() {
                Ok(()) => info!(filter = %unit.name, "filter destroyed"),
                Err(e) => warn!(filter = %unit.name, error = %e, "filter destroy failed"),
            }
        }
    }

    /// Filter names in execution order.
    pub fn names(&self) -> Vec<&str> {
        self.filters.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

// ── Continuation ──────────────────────────────────────────────────────────────

/// The rest of the chain. Consumed by [`run`](Next::run), so a filter can
/// continue at most once.
pub struct Next<'a> {
    filters: &'a [RegisteredFilter],
    endpoint: &'a dyn Endpoint,
}

impl<'a> Next<'a> {
    pub fn run<'b>(self, req: &'b mut Request, res: &'b mut Response) -> BoxFuture<'b, Result<(), Error>>
    where
        'a: 'b,
    {
        Box::pin(async move {
            let mut rest = self.filters;
            while let Some((unit, tail)) = rest.split_first() {
                if unit.rules.applies(req.path()) {
                    trace!(filter = %unit.name, "entering filter");
                    let next = Next { filters: tail, endpoint: self.endpoint };
                    return unit.filter.do_filter(req, res, next).await;
                }
                debug!(filter = %unit.name, path = req.path(), "filter skipped");
                rest = tail;
            }
            self.endpoint.call(req, res).await
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use http::{Method, StatusCode};
    use parking_lot::Mutex;

    use super::*;

    struct Terminal;

    #[async_trait]
    impl Endpoint for Terminal {
        async fn call(&self, req: &mut Request, res: &mut Response) -> Result<(), Error> {
            res.set_body(format!("handled {}", req.path()));
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct Journal(Arc<Mutex<Vec<String>>>);

    impl Journal {
        fn push(&self, line: impl Into<String>) {
            self.0.lock().push(line.into());
        }

        fn lines(&self) -> Vec<String> {
            self.0.lock().clone()
        }
    }

    struct Recording {
        tag: &'static str,
        journal: Journal,
    }

    #[async_trait]
    impl Filter for Recording {
        fn init(&self, config: &FilterConfig) -> Result<(), Error> {
            self.journal.push(format!("init {}", config.name()));
            Ok(())
        }

        async fn do_filter(&self, req: &mut Request, res: &mut Response, next: Next<'_>) -> Result<(), Error> {
            self.journal.push(format!("{} before", self.tag));
            let result = next.run(req, res).await;
            self.journal.push(format!("{} after", self.tag));
            result
        }

        fn destroy(&self) -> Result<(), Error> {
            self.journal.push(format!("destroy {}", self.tag));
            Ok(())
        }
    }

    struct Gate;

    #[async_trait]
    impl Filter for Gate {
        async fn do_filter(&self, _: &mut Request, res: &mut Response, _: Next<'_>) -> Result<(), Error> {
            res.set_status(StatusCode::FORBIDDEN);
            Ok(())
        }
    }

    struct BrokenInit;

    #[async_trait]
    impl Filter for BrokenInit {
        fn init(&self, _: &FilterConfig) -> Result<(), Error> {
            Err(Error::internal("no config"))
        }

        async fn do_filter(&self, req: &mut Request, res: &mut Response, next: Next<'_>) -> Result<(), Error> {
            next.run(req, res).await
        }

        fn destroy(&self) -> Result<(), Error> {
            Err(Error::internal("already gone"))
        }
    }

    fn recording(tag: &'static str, journal: &Journal) -> Recording {
        Recording { tag, journal: journal.clone() }
    }

    #[tokio::test]
    async fn runs_ascending_by_order_and_unwinds_in_reverse() {
        let journal = Journal::default();
        let chain = FilterChain::assemble(vec![
            FilterRegistration::new("second", recording("second", &journal)).order(2),
            FilterRegistration::new("first", recording("first", &journal)).order(1),
            FilterRegistration::new("also-second", recording("also-second", &journal)).order(2),
        ])
        .unwrap();
        assert_eq!(chain.names(), ["first", "second", "also-second"]);

        let mut req = Request::new(Method::GET, "/a");
        let mut res = Response::default();
        chain.run(&mut req, &mut res, &Terminal).await.unwrap();

        assert_eq!(res.body(), b"handled /a");
        assert_eq!(
            journal.lines()[3..],
            [
                "first before", "second before", "also-second before",
                "also-second after", "second after", "first after",
            ]
        );
    }

    #[tokio::test]
    async fn filter_that_does_not_continue_ends_the_request() {
        let journal = Journal::default();
        let chain = FilterChain::assemble(vec![
            FilterRegistration::new("gate", Gate).order(1),
            FilterRegistration::new("inner", recording("inner", &journal)).order(2),
        ])
        .unwrap();

        let mut req = Request::new(Method::GET, "/a");
        let mut res = Response::default();
        chain.run(&mut req, &mut res, &Terminal).await.unwrap();

        assert_eq!(res.status_code(), StatusCode::FORBIDDEN);
        assert!(res.body().is_empty());
        assert_eq!(journal.lines(), ["init inner"]);
    }

    #[tokio::test]
    async fn excluded_path_skips_the_filter_entirely() {
        let journal = Journal::default();
        let chain = FilterChain::assemble(vec![
            FilterRegistration::new("scoped", recording("scoped", &journal))
                .url_pattern("/api/**")
                .exclude_pattern("/api/health"),
        ])
        .unwrap();

        for path in ["/api/health", "/static/app.js"] {
            let mut req = Request::new(Method::GET, path);
            chain.run(&mut req, &mut Response::default(), &Terminal).await.unwrap();
        }
        assert_eq!(journal.lines(), ["init scoped"]);

        let mut req = Request::new(Method::GET, "/api/users");
        chain.run(&mut req, &mut Response::default(), &Terminal).await.unwrap();
        assert_eq!(journal.lines()[1..], ["scoped before", "scoped after"]);
    }

    #[test]
    fn failing_init_and_destroy_do_not_abort() {
        let journal = Journal::default();
        let chain = FilterChain::assemble(vec![
            FilterRegistration::new("broken", BrokenInit).order(1),
            FilterRegistration::new("fine", recording("fine", &journal)).order(2),
        ])
        .unwrap();
        assert_eq!(chain.len(), 2);

        chain.destroy();
        chain.destroy();
        assert_eq!(journal.lines(), ["init fine", "destroy fine"]);
    }

    #[test]
    fn init_params_reach_the_filter() {
        struct Params(Arc<AtomicUsize>);

        #[async_trait]
        impl Filter for Params {
            fn init(&self, config: &FilterConfig) -> Result<(), Error> {
                if config.init_param("encoding") == Some("utf-8") {
                    self.0.fetch_add(1, Ordering::SeqCst);
                }
                Ok(())
            }

            async fn do_filter(&self, req: &mut Request, res: &mut Response, next: Next<'_>) -> Result<(), Error> {
                next.run(req, res).await
            }
        }

        let seen = Arc::new(AtomicUsize::new(0));
        FilterChain::assemble(vec![
            FilterRegistration::new("encoding", Params(Arc::clone(&seen))).init_param("encoding", "utf-8"),
        ])
        .unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn bad_pattern_fails_assembly() {
        let result = FilterChain::assemble(vec![FilterRegistration::new("gate", Gate).url_pattern("no-slash")]);
        assert!(result.is_err());
    }
}
