//! # Path Patterns
//!
//! Compiles route templates into segment matchers.
//!
//! A template is a `/`-separated list of segments. Each segment is either a
//! literal (`items`) or a named parameter (`{id}`), optionally constrained by
//! a regex (`{id:[0-9]+}`). Unconstrained parameters match any non-empty
//! segment.
//!
//! Matching is segment-for-segment: the request path must have exactly as
//! many segments as the template. Literal comparison and regex constraints
//! are case-insensitive; parameter names keep their case.

use crate::error::{Error, Result};
use regex::{Regex, RegexBuilder};
use std::collections::HashMap;
use std::fmt;

/// Path parameter values keyed by parameter name
pub type ParameterMap = HashMap<String, String>;

#[derive(Debug, Clone)]
enum Segment {
    /// Lower-cased literal text
    Literal(String),
    /// Named parameter with optional constraint
    Param {
        name: String,
        constraint: Option<Regex>,
    },
}

/// A compiled route template
///
/// Immutable after [`PathPattern::compile`]; the segment matchers and the
/// ordered parameter names are computed once and cached.
#[derive(Debug, Clone)]
pub struct PathPattern {
    template: String,
    segments: Vec<Segment>,
    param_names: Vec<String>,
}

impl PathPattern {
    /// Compile a route template
    ///
    /// A missing leading `/` is added and a trailing `/` (other than the
    /// root) is dropped.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidPattern` if a parameter name is empty or
    /// duplicated, if braces do not enclose a whole segment, or if a custom
    /// constraint fails to compile.
    pub fn compile(template: &str) -> Result<Self> {
        let template = normalize_template(template);
        let mut segments = Vec::new();
        let mut param_names: Vec<String> = Vec::new();

        for raw in split_segments(&template) {
            let Some((name, constraint)) = parse_param_segment(raw) else {
                if raw.contains('{') || raw.contains('}') {
                    return Err(invalid(
                        &template,
                        format!("braces must enclose a whole segment: '{raw}'"),
                    ));
                }
                segments.push(Segment::Literal(raw.to_lowercase()));
                continue;
            };

            if name.is_empty() || !name.chars().all(is_name_char) {
                return Err(invalid(&template, format!("invalid parameter name '{name}'")));
            }
            if param_names.iter().any(|n| n == name) {
                return Err(invalid(
                    &template,
                    format!("duplicate parameter name '{name}'"),
                ));
            }

            let constraint = match constraint {
                Some(re) if !re.is_empty() => Some(compile_constraint(&template, re)?),
                _ => None,
            };

            param_names.push(name.to_string());
            segments.push(Segment::Param {
                name: name.to_string(),
                constraint,
            });
        }

        Ok(Self {
            template,
            segments,
            param_names,
        })
    }

    /// Match a request path, extracting parameter values
    ///
    /// Returns `None` if the segment count differs, a literal differs, or a
    /// parameter constraint rejects its segment.
    #[must_use]
    pub fn matches(&self, path: &str) -> Option<ParameterMap> {
        let parts: Vec<&str> = split_segments(path).collect();
        if parts.len() != self.segments.len() {
            return None;
        }

        let mut params = ParameterMap::with_capacity(self.param_names.len());
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                Segment::Literal(literal) => {
                    if !eq_lowercased(literal, part) {
                        return None;
                    }
                }
                Segment::Param { name, constraint } => {
                    if part.is_empty() {
                        return None;
                    }
                    if let Some(re) = constraint {
                        if !re.is_match(part) {
                            return None;
                        }
                    }
                    params.insert(name.clone(), part.to_string());
                }
            }
        }
        Some(params)
    }

    /// The normalized template text
    #[must_use]
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Parameter names in template order
    #[must_use]
    pub fn param_names(&self) -> &[String] {
        &self.param_names
    }

    /// Whether the template has no parameters
    #[must_use]
    pub fn is_literal(&self) -> bool {
        self.param_names.is_empty()
    }

    /// Lower-cased lookup key for a literal template
    ///
    /// Returns `None` for templated patterns.
    #[must_use]
    pub fn literal_key(&self) -> Option<String> {
        self.is_literal().then(|| self.template.to_lowercase())
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.template)
    }
}

/// Parse a segment into `(name, constraint)` if it is a parameter
///
/// Examples:
/// - `{id}` -> `("id", None)`
/// - `{id:[0-9]+}` -> `("id", Some("[0-9]+"))`
/// - `items` -> `None`
fn parse_param_segment(segment: &str) -> Option<(&str, Option<&str>)> {
    let inner = segment.strip_prefix('{')?.strip_suffix('}')?;
    Some(match inner.split_once(':') {
        Some((name, re)) => (name, Some(re)),
        None => (inner, None),
    })
}

fn compile_constraint(template: &str, re: &str) -> Result<Regex> {
    RegexBuilder::new(&format!("^(?:{re})$"))
        .case_insensitive(true)
        .build()
        .map_err(|e| invalid(template, format!("bad constraint '{re}': {e}")))
}

fn normalize_template(template: &str) -> String {
    let trimmed = template.trim();
    let mut normalized = if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    };
    if normalized.len() > 1 && normalized.ends_with('/') {
        normalized.pop();
    }
    normalized
}

/// Split a path into segments, ignoring the leading `/`
///
/// The root path has no segments.
pub(crate) fn split_segments(path: &str) -> impl Iterator<Item = &str> {
    let rest = path.strip_prefix('/').unwrap_or(path);
    rest.split('/').filter(move |_| !rest.is_empty())
}

fn eq_lowercased(lowered: &str, candidate: &str) -> bool {
    lowered.chars().eq(candidate.chars().flat_map(char::to_lowercase))
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-'
}

fn invalid(pattern: &str, reason: String) -> Error {
    Error::InvalidPattern {
        pattern: pattern.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_pattern() {
        let p = PathPattern::compile("/students/list").unwrap();
        assert!(p.is_literal());
        assert_eq!(p.literal_key().as_deref(), Some("/students/list"));
        assert!(p.matches("/students/list").unwrap().is_empty());
        assert!(p.matches("/students").is_none());
    }

    #[test]
    fn test_single_parameter() {
        let p = PathPattern::compile("/items/{id}").unwrap();
        let params = p.matches("/items/42").unwrap();
        assert_eq!(params.get("id").map(String::as_str), Some("42"));
        assert_eq!(p.param_names(), &["id".to_string()]);
    }

    #[test]
    fn test_segment_count_must_match() {
        let p = PathPattern::compile("/items/{id}").unwrap();
        assert!(p.matches("/items/42/extra").is_none());
        assert!(p.matches("/items").is_none());
    }

    #[test]
    fn test_empty_segment_does_not_match_parameter() {
        let p = PathPattern::compile("/items/{id}").unwrap();
        assert!(p.matches("/items/").is_none());
    }

    #[test]
    fn test_case_insensitive_literal_keeps_value_case() {
        let p = PathPattern::compile("/Users/{Name}").unwrap();
        let params = p.matches("/USERS/Ana").unwrap();
        assert_eq!(params.get("Name").map(String::as_str), Some("Ana"));
        assert!(params.get("name").is_none());
    }

    #[test]
    fn test_regex_constraint() {
        let p = PathPattern::compile("/orders/{id:[0-9]+}").unwrap();
        assert!(p.matches("/orders/123").is_some());
        assert!(p.matches("/orders/abc").is_none());
    }

    #[test]
    fn test_constraint_with_quantifier_braces() {
        let p = PathPattern::compile("/years/{y:\\d{4}}").unwrap();
        assert!(p.matches("/years/2024").is_some());
        assert!(p.matches("/years/24").is_none());
    }

    #[test]
    fn test_constraint_is_case_insensitive() {
        let p = PathPattern::compile("/codes/{c:[a-f]+}").unwrap();
        assert!(p.matches("/codes/ABC").is_some());
    }

    #[test]
    fn test_duplicate_parameter_rejected() {
        let err = PathPattern::compile("/a/{id}/b/{id}").unwrap_err();
        assert!(matches!(err, Error::InvalidPattern { .. }));
    }

    #[test]
    fn test_bad_regex_rejected() {
        assert!(PathPattern::compile("/a/{id:[0-9}").is_err());
    }

    #[test]
    fn test_partial_brace_segment_rejected() {
        assert!(PathPattern::compile("/files/report-{id}").is_err());
    }

    #[test]
    fn test_normalization() {
        let p = PathPattern::compile("items/{id}/").unwrap();
        assert_eq!(p.template(), "/items/{id}");
        assert!(p.matches("/items/7").is_some());
    }

    #[test]
    fn test_root() {
        let p = PathPattern::compile("/").unwrap();
        assert!(p.matches("/").is_some());
        assert!(p.matches("/x").is_none());
    }

    #[test]
    fn test_multiple_parameters() {
        let p = PathPattern::compile("/users/{user_id}/posts/{post_id}").unwrap();
        let params = p.matches("/users/456/posts/789").unwrap();
        assert_eq!(params.get("user_id").map(String::as_str), Some("456"));
        assert_eq!(params.get("post_id").map(String::as_str), Some("789"));
    }
}
