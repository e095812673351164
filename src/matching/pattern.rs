//! Wildcard patterns over `/`-separated paths and `::`-separated type names.
//!
//! Both pattern kinds compile to the same segment list:
//!
//! | Segment | Matches |
//! |---|---|
//! | `users` | exactly `users` |
//! | `*` | any one segment |
//! | `get*` | one segment, `*` standing for any run of characters |
//! | `**` | zero or more segments; only allowed last |

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use super::CallSite;

/// Rejected at assembly time, never at request time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    #[error("empty pattern")]
    Empty,

    #[error("path pattern `{0}` must start with `/`")]
    NotAbsolute(String),

    #[error("`**` is only allowed as the last segment of `{0}`")]
    MisplacedRest(String),

    #[error("signature pattern `{0}` must look like `<type>.<method>`")]
    BadSignature(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Glob(String),
    Any,
    Rest,
}

impl Segment {
    fn parse(raw: &str) -> Self {
        match raw {
            "**" => Self::Rest,
            "*" => Self::Any,
            s if s.contains('*') => Self::Glob(s.to_owned()),
            s => Self::Literal(s.to_owned()),
        }
    }

    fn accepts(&self, input: &str) -> bool {
        match self {
            Self::Literal(lit) => lit == input,
            Self::Glob(glob) => glob_match(glob, input),
            Self::Any => true,
            Self::Rest => true,
        }
    }
}

fn compile<'a>(raw: &str, parts: impl Iterator<Item = &'a str>) -> Result<Vec<Segment>, PatternError> {
    let segments: Vec<Segment> = parts.map(Segment::parse).collect();
    let rest_at = segments.iter().position(|s| *s == Segment::Rest);
    if rest_at.is_some_and(|i| i + 1 != segments.len()) {
        return Err(PatternError::MisplacedRest(raw.to_owned()));
    }
    Ok(segments)
}

fn match_segments<'a>(segments: &[Segment], mut input: impl Iterator<Item = &'a str>) -> bool {
    for segment in segments {
        if *segment == Segment::Rest {
            return true;
        }
        match input.next() {
            Some(part) if segment.accepts(part) => {}
            _ => return false,
        }
    }
    input.next().is_none()
}

/// `*` matches any run of characters (including none) inside one segment.
fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && p[pi] == '*' {
            backtrack = Some((pi, ti));
            pi += 1;
        } else if pi < p.len() && p[pi] == t[ti] {
            pi += 1;
            ti += 1;
        } else if let Some((star, matched)) = backtrack {
            pi = star + 1;
            ti = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|&c| c == '*')
}

fn path_parts(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

fn type_parts(type_name: &str) -> impl Iterator<Item = &str> {
    type_name.split("::").filter(|s| !s.is_empty())
}

// ── PathPattern ───────────────────────────────────────────────────────────────

/// A URL path pattern such as `/user/*` or `/user/**`.
///
/// Empty segments are ignored on both sides, so `/user/` and `/user` are
/// the same path. `/**` matches every path including `/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    pub fn parse(raw: &str) -> Result<Self, PatternError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(PatternError::Empty);
        }
        if !raw.starts_with('/') {
            return Err(PatternError::NotAbsolute(raw.to_owned()));
        }
        Ok(Self { raw: raw.to_owned(), segments: compile(raw, path_parts(raw))? })
    }

    pub fn matches(&self, path: &str) -> bool {
        match_segments(&self.segments, path_parts(path))
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl FromStr for PathPattern {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

// ── SignaturePattern ──────────────────────────────────────────────────────────

/// A call-site pattern of the form `<type>.<method>`.
///
/// The type half is matched per `::` component, the method half is a single
/// glob: `service::*.*` matches every method of every type directly inside
/// `service`, `service::**.get*` every getter anywhere below it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignaturePattern {
    raw: String,
    type_segments: Vec<Segment>,
    method: Segment,
}

impl SignaturePattern {
    pub fn parse(raw: &str) -> Result<Self, PatternError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(PatternError::Empty);
        }
        let (type_part, method_part) = raw
            .rsplit_once('.')
            .filter(|(t, m)| !t.is_empty() && !m.is_empty() && !m.contains(':'))
            .ok_or_else(|| PatternError::BadSignature(raw.to_owned()))?;
        let method = match Segment::parse(method_part) {
            Segment::Rest => Segment::Any,
            other => other,
        };
        Ok(Self {
            raw: raw.to_owned(),
            type_segments: compile(raw, type_parts(type_part))?,
            method,
        })
    }

    pub fn matches(&self, site: &CallSite) -> bool {
        self.method.accepts(site.method())
            && match_segments(&self.type_segments, type_parts(site.type_name()))
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl FromStr for SignaturePattern {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
