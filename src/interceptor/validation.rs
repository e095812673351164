use tracing::trace;

use super::Interceptor;
use crate::error::Error;
use crate::matching::RequestRule;
use crate::request::Request;
use crate::response::Response;
use crate::validation::{Schema, ValidationError};

/// Checks requests against the schemas registered for them before the
/// handler runs. Violations from every matching schema are reported together.
#[derive(Debug, Clone, Default)]
pub struct ValidationInterceptor {
    schemas: Vec<(RequestRule, Schema)>,
}

impl ValidationInterceptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schema(mut self, rule: RequestRule, schema: Schema) -> Self {
        self.schemas.push((rule, schema));
        self
    }
}

impl Interceptor for ValidationInterceptor {
    fn pre_handle(&self, req: &mut Request, _res: &mut Response) -> Result<bool, Error> {
        let mut violations = Vec::new();
        for (rule, schema) in &self.schemas {
            if !rule.matches(req.method(), req.path()) {
                continue;
            }
            if let Err(e) = schema.validate(req) {
                violations.extend(e.violations().iter().cloned());
            }
        }
        if violations.is_empty() {
            trace!(path = req.path(), "request valid");
            return Ok(true);
        }
        Err(ValidationError::new(violations).into())
    }
}

#[cfg(test)]
mod tests {
    use http::Method;
    use serde_json::json;

    use super::*;
    use crate::matching::PathRules;
    use crate::validation::Constraint;

    fn interceptor() -> ValidationInterceptor {
        ValidationInterceptor::new().schema(
            RequestRule::new(PathRules::new(["/saveUser"], Vec::<&str>::new()).unwrap()).method(Method::POST),
            Schema::new()
                .body_field("account", [Constraint::NotBlank, Constraint::MaxLength(3)])
                .body_field("password", [Constraint::NotBlank]),
        )
    }

    #[test]
    fn every_violation_is_reported() {
        let mut req = Request::new(Method::POST, "/saveUser").with_json(&json!({ "account": "toolong" }));
        let err = interceptor().pre_handle(&mut req, &mut Response::default()).unwrap_err();
        let Error::Validation(e) = err else { panic!("expected a validation failure") };
        let fields: Vec<_> = e.violations().iter().map(|v| v.field.as_str()).collect();
        assert_eq!(fields, ["account", "password"]);
    }

    #[test]
    fn unmatched_requests_pass() {
        let mut get = Request::new(Method::GET, "/saveUser");
        assert!(interceptor().pre_handle(&mut get, &mut Response::default()).unwrap());

        let mut valid = Request::new(Method::POST, "/saveUser")
            .with_json(&json!({ "account": "ann", "password": "x" }));
        assert!(interceptor().pre_handle(&mut valid, &mut Response::default()).unwrap());
    }
}
