//! Annotation scanner.
//!
//! Matches single comment lines against the annotation grammar and slices
//! out the JSON body. The scanner accepts both raw source lines
//! (`// @provider({...})`) and doc-attribute values where `syn` has already
//! stripped the comment marker (` @provider({...})`). It never validates the
//! JSON; decoding happens in the model builder.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

/// Recognized form: optional whitespace, an optional line-comment marker,
/// `@`, one of the three keywords, and a parenthesized body.
pub const ANNOTATION_PATTERN: &str = r"^\s*(?://[/!]*)?\s*@(provider|inject|group)\s*\((.*)\s*\)";

static ANNOTATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(ANNOTATION_PATTERN).expect("annotation pattern must compile"));

///
/// AnnotationKind
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AnnotationKind {
    Provider,
    Inject,
    Group,
}

impl AnnotationKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Provider => "provider",
            Self::Inject => "inject",
            Self::Group => "group",
        }
    }
}

/// Matches one comment line. Returns the annotation kind and the raw text
/// between the parentheses, or `None` for lines that are not annotations.
#[must_use]
pub fn match_comment(line: &str) -> Option<(AnnotationKind, &str)> {
    let caps = ANNOTATION.captures(line)?;
    let kind = match &caps[1] {
        "provider" => AnnotationKind::Provider,
        "inject" => AnnotationKind::Inject,
        _ => AnnotationKind::Group,
    };
    let body = caps.get(2).map_or("", |m| m.as_str());
    Some((kind, body))
}

///
/// Annotation bodies
/// Decoded from the parenthesized JSON by the model builder.
///

#[derive(Debug, Deserialize)]
pub struct ProviderAnnotation {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct GroupAnnotation {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct InjectAnnotation {
    pub param: String,
    pub id: String,
    /// Explicit import path for the parameter's package; overrides the
    /// use-table lookup entirely.
    #[serde(default)]
    pub pkg: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_raw_comment_lines() {
        let (kind, body) = match_comment(r#"// @provider({"id": "main.db"})"#).unwrap();
        assert_eq!(kind, AnnotationKind::Provider);
        assert_eq!(body, r#"{"id": "main.db"}"#);
    }

    #[test]
    fn matches_doc_comment_lines() {
        let (kind, body) = match_comment(r#"/// @group({"id": "strings"})"#).unwrap();
        assert_eq!(kind, AnnotationKind::Group);
        assert_eq!(body, r#"{"id": "strings"}"#);
    }

    #[test]
    fn matches_stripped_doc_values() {
        // What a `#[doc = "..."]` attribute carries once syn removes `///`.
        let (kind, body) =
            match_comment(r#" @inject({"param":"db", "id":"main.db"})"#).unwrap();
        assert_eq!(kind, AnnotationKind::Inject);
        assert_eq!(body, r#"{"param":"db", "id":"main.db"}"#);
    }

    #[test]
    fn tolerates_interior_whitespace() {
        let (kind, body) = match_comment(r#"  //   @provider  ( {"id": "x"} )"#).unwrap();
        assert_eq!(kind, AnnotationKind::Provider);
        // Greedy body capture runs to the last closing parenthesis.
        assert_eq!(body, r#" {"id": "x"} "#);
    }

    #[test]
    fn body_may_contain_parentheses() {
        let (_, body) = match_comment(r#"// @provider({"id": "fn(x)"})"#).unwrap();
        assert_eq!(body, r#"{"id": "fn(x)"}"#);
    }

    #[test]
    fn ignores_non_annotations() {
        assert!(match_comment("// a plain comment").is_none());
        assert!(match_comment("/// Builds the database pool.").is_none());
        assert!(match_comment("// @unknown({})").is_none());
        assert!(match_comment("let x = 1; // @provider({})").is_none());
        assert!(match_comment("").is_none());
    }

    #[test]
    fn keyword_must_be_exact() {
        assert!(match_comment("// @providers({\"id\": \"x\"})").is_none());
        assert!(match_comment("// @Provider({\"id\": \"x\"})").is_none());
    }
}
