//! Declarative rule matching.
//!
//! Decides whether a pipeline unit applies to a request (method + path) or
//! to a call site (type + method + declared markers). Everything here is a
//! pure function of the rule and the subject: no I/O, no interior
//! mutability, no registry lookups. Rules are compiled once when a chain is
//! assembled and evaluated as often as needed afterwards.
//!
//! ```rust
//! use crosscut::matching::{matches, PathRules, RequestRule, Rule, Subject};
//! use http::Method;
//!
//! let rule = Rule::Request(RequestRule::new(
//!     PathRules::new(["/user/**"], ["/user/login", "/user/error"]).unwrap(),
//! ));
//!
//! let visit = |path| Subject::Request { method: &Method::GET, path };
//! assert!(matches(&rule, &visit("/user/center")));
//! assert!(!matches(&rule, &visit("/user/login")));
//! ```

mod pattern;

use std::borrow::Cow;
use std::fmt;

use http::Method;

pub use pattern::{PathPattern, PatternError, SignaturePattern};

// ── Call sites ────────────────────────────────────────────────────────────────

/// A declarative tag attached to a call site, optionally with a value
/// (`sys_log("update profile")`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    name: Cow<'static, str>,
    value: Option<String>,
}

impl Marker {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self { name: name.into(), value: None }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }
}

/// The identity of an interceptable call: declaring type, method name and
/// the markers it was declared with.
///
/// Markers belong to the call site itself. There is no inheritance: a
/// marker on one site says nothing about any other site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
    type_name: Cow<'static, str>,
    method: Cow<'static, str>,
    markers: Vec<Marker>,
}

impl CallSite {
    pub fn new(type_name: impl Into<Cow<'static, str>>, method: impl Into<Cow<'static, str>>) -> Self {
        Self { type_name: type_name.into(), method: method.into(), markers: Vec::new() }
    }

    /// Declares `marker` on this site. Returns `self` for chaining.
    pub fn marked(mut self, marker: Marker) -> Self {
        self.markers.push(marker);
        self
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    pub fn marker(&self, name: &str) -> Option<&Marker> {
        self.markers.iter().find(|m| m.name() == name)
    }
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.type_name, self.method)
    }
}

// ── Rules ─────────────────────────────────────────────────────────────────────

/// Inclusion and exclusion path patterns of one unit.
///
/// Exclusion wins: a path matching both lists is excluded. An empty
/// inclusion list means "every path".
#[derive(Debug, Clone, Default)]
pub struct PathRules {
    include: Vec<PathPattern>,
    exclude: Vec<PathPattern>,
}

impl PathRules {
    pub fn new<I, E>(include: I, exclude: E) -> Result<Self, PatternError>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
        E: IntoIterator,
        E::Item: AsRef<str>,
    {
        let compile = |p: &str| PathPattern::parse(p);
        Ok(Self {
            include: include.into_iter().map(|p| compile(p.as_ref())).collect::<Result<_, _>>()?,
            exclude: exclude.into_iter().map(|p| compile(p.as_ref())).collect::<Result<_, _>>()?,
        })
    }

    /// Matches every path.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn applies(&self, path: &str) -> bool {
        if self.exclude.iter().any(|p| p.matches(path)) {
            return false;
        }
        self.include.is_empty() || self.include.iter().any(|p| p.matches(path))
    }

    pub fn includes(&self) -> &[PathPattern] {
        &self.include
    }

    pub fn excludes(&self) -> &[PathPattern] {
        &self.exclude
    }
}

/// Matches requests by path rules and, optionally, by method.
#[derive(Debug, Clone, Default)]
pub struct RequestRule {
    methods: Vec<Method>,
    paths: PathRules,
}

impl RequestRule {
    /// Any method, the given paths.
    pub fn new(paths: PathRules) -> Self {
        Self { methods: Vec::new(), paths }
    }

    /// Restricts the rule to `method`. May be called more than once.
    pub fn method(mut self, method: Method) -> Self {
        self.methods.push(method);
        self
    }

    pub fn matches(&self, method: &Method, path: &str) -> bool {
        (self.methods.is_empty() || self.methods.contains(method)) && self.paths.applies(path)
    }
}

/// Matches call sites.
#[derive(Debug, Clone)]
pub enum CallRule {
    /// The site declares a marker with this name.
    Marker(String),
    /// The site's type and method match the pattern.
    Signature(SignaturePattern),
    /// Any of the nested rules matches.
    AnyOf(Vec<CallRule>),
}

impl CallRule {
    pub fn marker(name: impl Into<String>) -> Self {
        Self::Marker(name.into())
    }

    pub fn signature(pattern: &str) -> Result<Self, PatternError> {
        SignaturePattern::parse(pattern).map(Self::Signature)
    }

    pub fn matches(&self, site: &CallSite) -> bool {
        match self {
            Self::Marker(name) => site.marker(name).is_some(),
            Self::Signature(pattern) => pattern.matches(site),
            Self::AnyOf(rules) => rules.iter().any(|r| r.matches(site)),
        }
    }
}

/// Either kind of rule.
#[derive(Debug, Clone)]
pub enum Rule {
    Request(RequestRule),
    Call(CallRule),
}

/// What a [`Rule`] is evaluated against.
#[derive(Debug, Clone, Copy)]
pub enum Subject<'a> {
    Request { method: &'a Method, path: &'a str },
    Call(&'a CallSite),
}

/// `true` when `rule` applies to `subject`. A request rule never matches a
/// call site and vice versa.
pub fn matches(rule: &Rule, subject: &Subject<'_>) -> bool {
    match (rule, subject) {
        (Rule::Request(rule), Subject::Request { method, path }) => rule.matches(method, path),
        (Rule::Call(rule), Subject::Call(site)) => rule.matches(site),
        _ => false,
    }
}
