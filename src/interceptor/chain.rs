use std::future::Future;
use std::sync::Arc;

use tracing::debug;

use super::Interceptor;
use crate::config::InterceptorRule;
use crate::error::Error;
use crate::matching::{PathRules, PatternError};
use crate::order::DEFAULT_ORDER;
use crate::request::Request;
use crate::response::{IntoResponse, Response};
use crate::translate::ErrorTranslator;

pub struct InterceptorRegistration {
    name: String,
    interceptor: Arc<dyn Interceptor>,
    order: i32,
    include: Vec<String>,
    exclude: Vec<String>,
}

impl InterceptorRegistration {
    pub fn new(name: impl Into<String>, interceptor: impl Interceptor) -> Self {
        Self {
            name: name.into(),
            interceptor: Arc::new(interceptor),
            order: DEFAULT_ORDER,
            include: Vec::new(),
            exclude: Vec::new(),
        }
    }

    pub fn from_rule(rule: &InterceptorRule, interceptor: impl Interceptor) -> Self {
        Self {
            include: rule.include.clone(),
            exclude: rule.exclude.clone(),
            order: rule.order,
            ..Self::new(rule.name.as_str(), interceptor)
        }
    }

    /// With no path patterns the interceptor applies to every path.
    pub fn add_path_patterns<I>(mut self, patterns: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.include.extend(patterns.into_iter().map(Into::into));
        self
    }

    /// Exclusions win over inclusions.
    pub fn exclude_path_patterns<I>(mut self, patterns: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.exclude.extend(patterns.into_iter().map(Into::into));
        self
    }

    pub fn order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }
}

struct RegisteredInterceptor {
    name: String,
    rules: PathRules,
    interceptor: Arc<dyn Interceptor>,
}

/// Interceptors in execution order, assembled once at startup.
pub struct InterceptorChain {
    units: Vec<RegisteredInterceptor>,
    translator: ErrorTranslator,
}

impl InterceptorChain {
    /// Compiles path patterns and sorts by order, ties kept in registration
    /// order.
    pub fn assemble(registrations: Vec<InterceptorRegistration>) -> Result<Self, PatternError> {
        let mut ordered = Vec::with_capacity(registrations.len());
        for reg in registrations {
            let rules = PathRules::new(&reg.include, &reg.exclude)?;
            ordered.push((reg.order, RegisteredInterceptor { name: reg.name, rules, interceptor: reg.interceptor }));
        }
        ordered.sort_by_key(|(order, _)| *order);
        Ok(Self {
            units: ordered.into_iter().map(|(_, unit)| unit).collect(),
            translator: ErrorTranslator::default(),
        })
    }

    /// Translator used for the failures this chain resolves itself.
    pub fn translator(mut self, translator: ErrorTranslator) -> Self {
        self.translator = translator;
        self
    }

    pub fn names(&self) -> Vec<&str> {
        self.units.iter().map(|u| u.name.as_str()).collect()
    }

    /// Runs the pre hooks, `dispatch`, the post hooks and finally the
    /// after-completion hooks.
    ///
    /// The handler's response is merged into `res`. A validation or auth
    /// failure is written into `res` as an outcome and `Ok(())` is
    /// returned; any other failure is returned after the after-completion
    /// hooks have seen it.
    pub async fn execute<F, Fut>(&self, req: &mut Request, res: &mut Response, dispatch: F) -> Result<(), Error>
    where
        F: FnOnce(Request) -> Fut,
        Fut: Future<Output = Result<Response, Error>>,
    {
        let path = req.path().to_owned();
        let applicable: Vec<&RegisteredInterceptor> = self
            .units
            .iter()
            .filter(|unit| {
                let applies = unit.rules.applies(&path);
                if !applies {
                    debug!(interceptor = %unit.name, path = %path, "interceptor skipped");
                }
                applies
            })
            .collect();

        let mut entered = 0;
        let outcome = run(&applicable, &mut entered, req, res, dispatch).await;

        if let Err(err) = &outcome {
            if err.is_client_fault() {
                res.merge(self.translator.translate(err).into_response());
            }
        }
        for unit in applicable[..entered].iter().rev() {
            unit.interceptor.after_completion(req, res, outcome.as_ref().err());
        }

        match outcome {
            Err(err) if !err.is_client_fault() => Err(err),
            _ => Ok(()),
        }
    }
}

async fn run<F, Fut>(
    units: &[&RegisteredInterceptor],
    entered: &mut usize,
    req: &mut Request,
    res: &mut Response,
    dispatch: F,
) -> Result<(), Error>
where
    F: FnOnce(Request) -> Fut,
    Fut: Future<Output = Result<Response, Error>>,
{
    for unit in units {
        *entered += 1;
        if !unit.interceptor.pre_handle(req, res)? {
            debug!(interceptor = %unit.name, "request vetoed");
            return Ok(());
        }
    }

    let response = dispatch(req.clone()).await?;
    res.merge(response);

    for unit in units {
        unit.interceptor.post_handle(req, res)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use http::{Method, StatusCode};
    use parking_lot::Mutex;

    use super::*;
    use crate::auth::AuthError;
    use crate::outcome::Outcome;

    #[derive(Clone, Default)]
    struct Journal(Arc<Mutex<Vec<String>>>);

    impl Journal {
        fn push(&self, line: String) {
            self.0.lock().push(line);
        }

        fn lines(&self) -> Vec<String> {
            self.0.lock().clone()
        }
    }

    #[derive(Clone, Copy)]
    enum Pre {
        Continue,
        Veto,
        Fail,
    }

    struct Journaling {
        tag: &'static str,
        pre: Pre,
        journal: Journal,
    }

    impl Interceptor for Journaling {
        fn pre_handle(&self, _: &mut Request, res: &mut Response) -> Result<bool, Error> {
            self.journal.push(format!("{} pre", self.tag));
            match self.pre {
                Pre::Continue => Ok(true),
                Pre::Veto => {
                    res.merge(Outcome::business_failure("403", "vetoed").into_response());
                    Ok(false)
                }
                Pre::Fail => Err(AuthError::Missing.into()),
            }
        }

        fn post_handle(&self, _: &Request, _: &mut Response) -> Result<(), Error> {
            self.journal.push(format!("{} post", self.tag));
            Ok(())
        }

        fn after_completion(&self, _: &Request, _: &Response, err: Option<&Error>) {
            let suffix = if err.is_some() { " (failed)" } else { "" };
            self.journal.push(format!("{} done{suffix}", self.tag));
        }
    }

    fn journaling(tag: &'static str, pre: Pre, journal: &Journal) -> Journaling {
        Journaling { tag, pre, journal: journal.clone() }
    }

    async fn ok_handler(_: Request) -> Result<Response, Error> {
        Ok(Response::text("handled"))
    }

    async fn failing_handler(_: Request) -> Result<Response, Error> {
        Err(Error::business("B001", "out of stock"))
    }

    fn chain(regs: Vec<InterceptorRegistration>) -> InterceptorChain {
        InterceptorChain::assemble(regs).unwrap()
    }

    #[tokio::test]
    async fn hooks_nest_around_the_handler() {
        let journal = Journal::default();
        let chain = chain(vec![
            InterceptorRegistration::new("a", journaling("a", Pre::Continue, &journal)),
            InterceptorRegistration::new("b", journaling("b", Pre::Continue, &journal)),
        ]);

        let mut req = Request::new(Method::GET, "/x");
        let mut res = Response::default();
        chain.execute(&mut req, &mut res, ok_handler).await.unwrap();

        assert_eq!(res.body(), b"handled");
        assert_eq!(journal.lines(), ["a pre", "b pre", "a post", "b post", "b done", "a done"]);
    }

    #[tokio::test]
    async fn veto_skips_handler_and_post_but_not_completion() {
        let journal = Journal::default();
        let chain = chain(vec![
            InterceptorRegistration::new("a", journaling("a", Pre::Continue, &journal)),
            InterceptorRegistration::new("b", journaling("b", Pre::Veto, &journal)),
            InterceptorRegistration::new("c", journaling("c", Pre::Continue, &journal)),
        ]);

        let mut req = Request::new(Method::GET, "/x");
        let mut res = Response::default();
        let handled = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&handled);
        chain
            .execute(&mut req, &mut res, |_| async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Response::text("handled"))
            })
            .await
            .unwrap();

        assert_eq!(handled.load(Ordering::SeqCst), 0);
        assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(journal.lines(), ["a pre", "b pre", "b done", "a done"]);
    }

    #[tokio::test]
    async fn auth_failure_is_resolved_inside_the_chain() {
        let journal = Journal::default();
        let chain = chain(vec![
            InterceptorRegistration::new("guard", journaling("guard", Pre::Fail, &journal)),
        ]);

        let mut req = Request::new(Method::GET, "/user/center");
        let mut res = Response::default();
        chain.execute(&mut req, &mut res, ok_handler).await.unwrap();

        assert_eq!(res.status_code(), StatusCode::UNAUTHORIZED);
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["code"], "401");
        assert_eq!(journal.lines(), ["guard pre", "guard done (failed)"]);
    }

    #[tokio::test]
    async fn handler_failure_propagates_after_completion() {
        let journal = Journal::default();
        let chain = chain(vec![
            InterceptorRegistration::new("a", journaling("a", Pre::Continue, &journal)),
        ]);

        let mut req = Request::new(Method::GET, "/x");
        let mut res = Response::default();
        let err = chain.execute(&mut req, &mut res, failing_handler).await.unwrap_err();

        assert!(matches!(err, Error::Business { .. }));
        assert_eq!(journal.lines(), ["a pre", "a done (failed)"]);
    }

    #[tokio::test]
    async fn completion_runs_once_on_every_exit_path() {
        struct Counting(Arc<AtomicUsize>);

        impl Interceptor for Counting {
            fn after_completion(&self, _: &Request, _: &Response, _: Option<&Error>) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let journal = Journal::default();
        let count = Arc::new(AtomicUsize::new(0));
        let chain = chain(vec![
            InterceptorRegistration::new("count", Counting(Arc::clone(&count))).order(1),
            InterceptorRegistration::new("veto", journaling("veto", Pre::Veto, &journal))
                .order(2)
                .add_path_patterns(["/vetoed"]),
        ]);

        let paths = ["/ok", "/vetoed", "/fails"];
        for path in paths {
            let mut req = Request::new(Method::GET, path);
            let mut res = Response::default();
            let _ = chain
                .execute(&mut req, &mut res, |req| async move {
                    if req.path() == "/fails" {
                        Err(Error::internal("boom"))
                    } else {
                        Ok(Response::text("ok"))
                    }
                })
                .await;
        }
        assert_eq!(count.load(Ordering::SeqCst), paths.len());
    }

    #[tokio::test]
    async fn excluded_unit_runs_no_hooks() {
        let journal = Journal::default();
        let chain = chain(vec![
            InterceptorRegistration::new("auth", journaling("auth", Pre::Continue, &journal))
                .add_path_patterns(["/user/**"])
                .exclude_path_patterns(["/user/login", "/user/error"]),
        ]);

        for path in ["/user/login", "/user/error", "/public"] {
            let mut req = Request::new(Method::POST, path);
            chain.execute(&mut req, &mut Response::default(), ok_handler).await.unwrap();
        }
        assert!(journal.lines().is_empty());

        let mut req = Request::new(Method::GET, "/user/center");
        chain.execute(&mut req, &mut Response::default(), ok_handler).await.unwrap();
        assert_eq!(journal.lines(), ["auth pre", "auth post", "auth done"]);
    }

    #[test]
    fn ordered_by_order_then_registration() {
        let journal = Journal::default();
        let chain = chain(vec![
            InterceptorRegistration::new("late", journaling("late", Pre::Continue, &journal)).order(5),
            InterceptorRegistration::new("early", journaling("early", Pre::Continue, &journal)).order(-5),
            InterceptorRegistration::new("middle", journaling("middle", Pre::Continue, &journal)),
        ]);
        assert_eq!(chain.names(), ["early", "middle", "late"]);
    }
}
