//! Declarative field constraints for request bodies and query strings.
//!
//! A [`Schema`] lists the constraints each field must satisfy. Validation
//! collects every violation rather than stopping at the first one, so the
//! client sees the complete list in a single round trip.

use serde_json::{Map, Value};

use crate::request::Request;

/// One failed constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub field: String,
    pub reason: String,
}

/// Client-supplied data failed one or more declared constraints.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("parameter validation failed: {}", list(.violations))]
pub struct ValidationError {
    violations: Vec<Violation>,
}

impl ValidationError {
    pub fn new(violations: Vec<Violation>) -> Self {
        Self { violations }
    }

    pub fn single(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(vec![Violation { field: field.into(), reason: reason.into() }])
    }

    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }
}

fn list(violations: &[Violation]) -> String {
    violations.iter().map(|v| format!("{}: {}; ", v.field, v.reason)).collect()
}

/// A single constraint.
///
/// `null` or an absent field passes every constraint except `Required`,
/// `NotBlank` and `NotEmpty`.
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    Required,
    /// String with at least one non-whitespace character.
    NotBlank,
    /// Non-empty string, array or object.
    NotEmpty,
    /// At most `n` characters.
    MaxLength(usize),
    /// At least `n` characters.
    MinLength(usize),
    /// Integer within `min..=max`. Numeric strings are accepted, which is
    /// what query parameters always are.
    Range { min: i64, max: i64 },
}

impl Constraint {
    fn check(&self, value: Option<&Value>) -> Result<(), String> {
        let value = value.filter(|v| !v.is_null());
        match (self, value) {
            (Self::Required, None) => Err("is required".into()),
            (Self::NotBlank, v) => match v.and_then(Value::as_str) {
                Some(s) if !s.trim().is_empty() => Ok(()),
                _ => Err("must not be blank".into()),
            },
            (Self::NotEmpty, v) => {
                let empty = match v {
                    None => true,
                    Some(Value::String(s)) => s.is_empty(),
                    Some(Value::Array(a)) => a.is_empty(),
                    Some(Value::Object(o)) => o.is_empty(),
                    Some(_) => false,
                };
                if empty { Err("must not be empty".into()) } else { Ok(()) }
            }
            (_, None) => Ok(()),
            (Self::MaxLength(n), Some(v)) => match char_len(v) {
                Some(len) if len > *n => Err(format!("length must be at most {n}")),
                _ => Ok(()),
            },
            (Self::MinLength(n), Some(v)) => match char_len(v) {
                Some(len) if len < *n => Err(format!("length must be at least {n}")),
                _ => Ok(()),
            },
            (Self::Range { min, max }, Some(v)) => match as_integer(v) {
                Some(i) if (*min..=*max).contains(&i) => Ok(()),
                Some(_) => Err(format!("must be between {min} and {max}")),
                None => Err("must be an integer".into()),
            },
            (Self::Required, Some(_)) => Ok(()),
        }
    }
}

fn char_len(v: &Value) -> Option<usize> {
    v.as_str().map(|s| s.chars().count())
}

fn as_integer(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Where a field is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSource {
    /// Top-level key of a JSON object body.
    Body,
    /// Query-string parameter.
    Query,
}

#[derive(Debug, Clone)]
struct FieldRule {
    source: FieldSource,
    field: String,
    constraints: Vec<Constraint>,
}

/// The constraints declared for one request shape.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    fields: Vec<FieldRule>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn body_field(self, field: &str, constraints: impl IntoIterator<Item = Constraint>) -> Self {
        self.field(FieldSource::Body, field, constraints)
    }

    pub fn query_field(self, field: &str, constraints: impl IntoIterator<Item = Constraint>) -> Self {
        self.field(FieldSource::Query, field, constraints)
    }

    fn field(
        mut self,
        source: FieldSource,
        field: &str,
        constraints: impl IntoIterator<Item = Constraint>,
    ) -> Self {
        self.fields.push(FieldRule {
            source,
            field: field.to_owned(),
            constraints: constraints.into_iter().collect(),
        });
        self
    }

    /// Validates the request's JSON body and query string.
    ///
    /// An empty body counts as an empty object. A body that is not a JSON
    /// object is itself a violation.
    pub fn validate(&self, req: &Request) -> Result<(), ValidationError> {
        let needs_body = self.fields.iter().any(|f| f.source == FieldSource::Body);
        let body = if needs_body && !req.body().is_empty() {
            match serde_json::from_slice::<Value>(req.body()) {
                Ok(Value::Object(map)) => map,
                _ => return Err(ValidationError::single("body", "must be a JSON object")),
            }
        } else {
            Map::new()
        };

        let mut violations = Vec::new();
        for rule in &self.fields {
            let value = match rule.source {
                FieldSource::Body => body.get(&rule.field).cloned(),
                FieldSource::Query => req.query(&rule.field).map(|s| Value::String(s.to_owned())),
            };
            for constraint in &rule.constraints {
                if let Err(reason) = constraint.check(value.as_ref()) {
                    violations.push(Violation { field: rule.field.clone(), reason });
                }
            }
        }

        if violations.is_empty() { Ok(()) } else { Err(ValidationError::new(violations)) }
    }
}

#[cfg(test)]
mod tests {
    use http::Method;
    use serde_json::json;

    use super::*;

    fn user_schema() -> Schema {
        Schema::new()
            .body_field("userName", [Constraint::NotBlank, Constraint::MaxLength(3)])
            .body_field("account", [Constraint::NotBlank, Constraint::MaxLength(3)])
    }

    #[test]
    fn valid_body_passes() {
        let req = Request::new(Method::POST, "/saveUser")
            .with_json(&json!({ "userName": "ann", "account": "a1" }));
        assert_eq!(user_schema().validate(&req), Ok(()));
    }

    #[test]
    fn every_violation_is_reported() {
        let req = Request::new(Method::POST, "/saveUser")
            .with_json(&json!({ "userName": "toolong", "account": "  " }));
        let err = user_schema().validate(&req).unwrap_err();
        assert_eq!(err.violations().len(), 2);
        assert_eq!(
            err.to_string(),
            "parameter validation failed: userName: length must be at most 3; account: must not be blank; "
        );
    }

    #[test]
    fn empty_body_counts_as_empty_object() {
        let req = Request::new(Method::POST, "/saveUser");
        let err = user_schema().validate(&req).unwrap_err();
        assert_eq!(err.violations().len(), 2);
    }

    #[test]
    fn malformed_body_is_a_violation() {
        let req = Request::new(Method::POST, "/saveUser").with_body("[1,2]");
        let err = user_schema().validate(&req).unwrap_err();
        assert_eq!(err.violations()[0].field, "body");
    }

    #[test]
    fn query_fields_and_ranges() {
        let schema = Schema::new()
            .query_field("account", [Constraint::NotEmpty, Constraint::MaxLength(3)])
            .query_field("age", [Constraint::Range { min: 0, max: 150 }]);

        let ok = Request::new(Method::GET, "/getByAccount?account=abc&age=30");
        assert!(schema.validate(&ok).is_ok());

        let encoded = Request::new(Method::GET, "/getByAccount?account=a%20c&age=3%30");
        assert!(schema.validate(&encoded).is_ok());

        let bad = Request::new(Method::GET, "/getByAccount?age=200");
        let err = schema.validate(&bad).unwrap_err();
        let fields: Vec<_> = err.violations().iter().map(|v| v.field.as_str()).collect();
        assert_eq!(fields, ["account", "age"]);
    }
}
