//! Path templates.
//!
//! # Responsibilities
//! - Parse templates such as `/ping` or `/users/{id}/posts/{post}`
//! - Bind variable segments of a concrete path to their names
//!
//! # Design Decisions
//! - Literal segments match exactly (case-sensitive)
//! - A variable matches exactly one non-empty segment; there is no wildcard
//! - No regex, so matching stays linear in the number of segments
//! - Literals match the raw segment; bound values are percent-decoded

use percent_encoding::percent_decode_str;
use std::collections::HashMap;
use std::fmt;

use crate::error::SetupError;

/// Variables bound while matching a path.
pub type PathParams = HashMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Variable(String),
}

/// A parsed path template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    raw: String,
    segments: Vec<Segment>,
}

impl PathTemplate {
    pub fn parse(template: &str) -> Result<Self, SetupError> {
        let invalid = |reason: &str| SetupError::InvalidTemplate {
            template: template.to_string(),
            reason: reason.to_string(),
        };

        let rest = template
            .strip_prefix('/')
            .ok_or_else(|| invalid("must start with '/'"))?;

        let mut segments = Vec::new();
        if !rest.is_empty() {
            for part in rest.split('/') {
                if part.is_empty() {
                    return Err(invalid("empty path segment"));
                }
                let segment = match part.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
                    Some(name) => {
                        if name.is_empty()
                            || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
                        {
                            return Err(invalid("variable names must be non-empty identifiers"));
                        }
                        if segments
                            .iter()
                            .any(|s| matches!(s, Segment::Variable(n) if n == name))
                        {
                            return Err(invalid("variable bound twice"));
                        }
                        Segment::Variable(name.to_string())
                    }
                    None if part.contains('{') || part.contains('}') => {
                        return Err(invalid("variables must span a whole segment"));
                    }
                    None => Segment::Literal(part.to_string()),
                };
                segments.push(segment);
            }
        }

        Ok(Self {
            raw: template.to_string(),
            segments,
        })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Bind the variables of an already matched path, percent-decoded.
    pub(crate) fn bind(&self, path_segments: &[&str]) -> PathParams {
        self.segments
            .iter()
            .zip(path_segments)
            .filter_map(|(segment, value)| match segment {
                Segment::Variable(name) => Some((
                    name.clone(),
                    percent_decode_str(value).decode_utf8_lossy().into_owned(),
                )),
                Segment::Literal(_) => None,
            })
            .collect()
    }
}

impl fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Split a request path into segments. `/` yields no segments.
pub fn split_path(path: &str) -> Vec<&str> {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    if trimmed.is_empty() {
        Vec::new()
    } else {
        trimmed.split('/').collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_literals_and_variables() {
        let template = PathTemplate::parse("/users/{id}/posts").unwrap();
        assert_eq!(
            template.segments(),
            &[
                Segment::Literal("users".into()),
                Segment::Variable("id".into()),
                Segment::Literal("posts".into()),
            ]
        );
        assert!(PathTemplate::parse("/").unwrap().segments().is_empty());
    }

    #[test]
    fn rejects_malformed_templates() {
        for bad in ["ping", "/a//b", "/{}", "/x{id}", "/{a}/{a}", "/trailing/"] {
            assert!(PathTemplate::parse(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn binds_variables_by_position() {
        let template = PathTemplate::parse("/users/{id}/posts/{post}").unwrap();
        let params = template.bind(&split_path("/users/7/posts/42"));
        assert_eq!(params.get("id").map(String::as_str), Some("7"));
        assert_eq!(params.get("post").map(String::as_str), Some("42"));
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn bound_values_are_percent_decoded() {
        let template = PathTemplate::parse("/users/{name}/files/{file}").unwrap();
        let params = template.bind(&split_path("/users/a%20b/files/x%2Fy%zz"));
        assert_eq!(params["name"], "a b");
        assert_eq!(params["file"], "x/y%zz");
    }

    #[test]
    fn split_path_handles_root_and_trailing_slash() {
        assert!(split_path("/").is_empty());
        assert_eq!(split_path("/ping"), vec!["ping"]);
        assert_eq!(split_path("/ping/"), vec!["ping", ""]);
    }
}
