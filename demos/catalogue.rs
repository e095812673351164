//! Every cross-cutting layer wired into one small user service.
//!
//! Run with:
//!   CROSSCUT_AUTH__SECRET=change-me cargo run --example catalogue
//!
//! Try:
//!   curl 'http://localhost:3000/user/login?userName=ann'
//!   curl http://localhost:3000/user/center -H 'authorization: Bearer <token>'
//!   curl http://localhost:3000/users/7            # second call is served from the cache
//!   curl -X POST http://localhost:3000/saveUser \
//!        -H 'content-type: application/json' \
//!        -d '{"account":"","age":200}'               # 400 with both violations

use std::sync::Arc;

use crosscut::auth::{Claims, TokenAuthenticator};
use crosscut::cache::{CacheEvictAdvice, CacheManager, CacheableAdvice, KeySpec};
use crosscut::config::{FilterRule, InterceptorRule, PipelineConfig};
use crosscut::filter::{FilterRegistration, LogFilter};
use crosscut::interceptor::{AuthInterceptor, InterceptorRegistration, ValidationInterceptor};
use crosscut::matching::{CallRule, CallSite, Marker, PathRules, RequestRule};
use crosscut::validation::{Constraint, Schema};
use crosscut::weave::{Aspect, LogAdvice, SYS_LOG_MARKER, SysLogAdvice, TimingAdvice, Weaver, Woven};
use crosscut::{Error, Outcome, Pipeline, Request, Router, Server, logging};
use http::Method;
use serde_json::{Value, json};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = PipelineConfig::load()?;
    logging::init(&config.logging)?;

    let tokens = Arc::new(TokenAuthenticator::from_config(&config.auth)?);
    let users = Arc::new(UserService::new(&config)?);

    let log_rule = config.filter("log").cloned().unwrap_or_else(|| FilterRule {
        name: "log".into(),
        url_patterns: vec!["/**".into()],
        exclude_patterns: Vec::new(),
        order: 1,
        init_params: Default::default(),
    });
    let auth_rule = config.interceptor("auth").cloned().unwrap_or_else(|| InterceptorRule {
        name: "auth".into(),
        include: vec!["/user/**".into()],
        exclude: vec!["/user/login".into()],
        order: 1,
    });

    let validation = ValidationInterceptor::new().schema(
        RequestRule::new(PathRules::new(["/saveUser"], Vec::<String>::new())?).method(Method::POST),
        Schema::new()
            .body_field("account", [Constraint::NotBlank, Constraint::MaxLength(16)])
            .body_field("age", [Constraint::Range { min: 0, max: 150 }]),
    );

    let router = Router::new()
        .get("/user/login", {
            let tokens = Arc::clone(&tokens);
            let ttl = config.auth.ttl();
            move |req: Request| {
                let tokens = Arc::clone(&tokens);
                async move {
                    let name = req.query("userName").ok_or_else(|| Error::business("B100", "userName is required"))?;
                    let token = tokens.issue(&Claims::new().with("sub", name).with("userName", name), ttl)?;
                    Ok::<_, Error>(Outcome::success(json!({ "token": token.as_str() })))
                }
            }
        })
        .get("/user/center", center)
        .get("/users/{id}", {
            let users = Arc::clone(&users);
            move |req: Request| {
                let users = Arc::clone(&users);
                async move {
                    let id: u64 = req
                        .param("id")
                        .and_then(|id| id.parse().ok())
                        .ok_or_else(|| Error::business("B101", "id must be a number"))?;
                    Ok::<_, Error>(Outcome::success(users.find(id)?))
                }
            }
        })
        .post("/saveUser", {
            let users = Arc::clone(&users);
            move |req: Request| {
                let users = Arc::clone(&users);
                async move {
                    let body: Value = serde_json::from_slice(req.body())?;
                    Ok::<_, Error>(Outcome::success(users.save(body)?))
                }
            }
        });

    let pipeline = Pipeline::builder()
        .filter(FilterRegistration::from_rule(&log_rule, LogFilter))
        .interceptor(InterceptorRegistration::from_rule(&auth_rule, AuthInterceptor::from_config(tokens, &config.auth)?))
        .interceptor(InterceptorRegistration::new("validation", validation).order(2))
        .router(router)
        .build()?;

    Server::from_config(&config.server).serve(pipeline).await?;
    Ok(())
}

async fn center(req: Request) -> Result<Outcome, Error> {
    let claims = req.extensions().get::<Claims>().ok_or_else(|| Error::missing("claims"))?;
    Ok(Outcome::success(json!({ "userName": claims.get_str("userName") })))
}

// ── Service ───────────────────────────────────────────────────────────────────

/// The service's methods are bound to their call sites once, at startup.
struct UserService {
    find: Woven,
    save: Woven,
}

impl UserService {
    fn new(config: &PipelineConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let caches = CacheManager::from_config(&config.cache);
        let users = caches.cache("users");

        let timing = match config.aspect("timing") {
            Some(rule) => Aspect::from_rule(rule, TimingAdvice::new())?,
            None => Aspect::new("timing", CallRule::signature("demo::UserService.*")?, TimingAdvice::new()).order(1),
        };

        let weaver = Weaver::new()
            .aspect(Aspect::new("trace", CallRule::signature("demo::UserService.*")?, LogAdvice))
            .aspect(timing)
            .aspect(Aspect::new("sys-log", SysLogAdvice::pointcut(), SysLogAdvice::default()).order(2))
            .aspect(
                CacheableAdvice::new(Arc::clone(&users), KeySpec::first_arg())
                    .into_aspect("user-cache", CallRule::signature("demo::UserService.find")?),
            )
            .aspect(
                CacheEvictAdvice::new(users, KeySpec::Fixed("all".into()))
                    .all_entries()
                    .into_aspect("user-evict", CallRule::signature("demo::UserService.save")?),
            );
        Ok(Self {
            find: weaver.weave(CallSite::new("demo::UserService", "find")),
            save: weaver.weave(
                CallSite::new("demo::UserService", "save").marked(Marker::new(SYS_LOG_MARKER).with_value("save user")),
            ),
        })
    }

    fn find(&self, id: u64) -> Result<Value, Error> {
        self.find.invoke(vec![json!(id)], |args| Ok(json!({ "id": args[0], "account": "ann" })))
    }

    fn save(&self, user: Value) -> Result<Value, Error> {
        self.save.invoke(vec![user], |mut args| Ok(args.remove(0)))
    }
}
