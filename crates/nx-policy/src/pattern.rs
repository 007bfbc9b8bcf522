// pattern.rs - Allow/deny rule matching for paths and hosts.
//
// Two kinds of pattern:
//
// - Literal ("./src", "api.openai.com"): matches the subject exactly or
//   any descendant of it. For paths a descendant is "src/..."; for hosts
//   it is a subdomain ("eu.api.openai.com").
// - Wildcard ("src/**/*.rs", "*.internal"): `*` matches any run without a
//   separator, `**` matches any run including separators. The pattern is
//   anchored to the whole subject, or the subject followed by "/...".
//
// Matching is case-sensitive. Backslashes are normalized to '/' and a
// leading "./" is stripped from both sides before comparison.

use regex::Regex;

use crate::error::PolicyError;

/// What kind of subject a matcher compares against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubjectKind {
    Path,
    Host,
}

#[derive(Debug, Clone)]
enum Compiled {
    Literal(String),
    Wildcard(Regex),
}

#[derive(Debug, Clone)]
struct Rule {
    source: String,
    compiled: Compiled,
}

/// A compiled, ordered list of rule patterns.
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    kind: SubjectKind,
    rules: Vec<Rule>,
}

impl PatternMatcher {
    /// Compile a list of patterns. Order is preserved for first-match lookups.
    pub fn new(kind: SubjectKind, patterns: &[String]) -> Result<Self, PolicyError> {
        let rules = patterns
            .iter()
            .map(|p| compile(p).map(|compiled| Rule { source: p.clone(), compiled }))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { kind, rules })
    }

    /// Return the first pattern (as written in the policy) that matches `subject`.
    pub fn first_match(&self, subject: &str) -> Option<&str> {
        let subject = normalize(subject);
        self.rules
            .iter()
            .find(|rule| self.matches_rule(rule, &subject))
            .map(|rule| rule.source.as_str())
    }

    pub fn is_match(&self, subject: &str) -> bool {
        self.first_match(subject).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    fn matches_rule(&self, rule: &Rule, subject: &str) -> bool {
        match &rule.compiled {
            Compiled::Wildcard(re) => re.is_match(subject),
            Compiled::Literal(lit) => {
                if subject == lit {
                    return true;
                }
                match self.kind {
                    SubjectKind::Path => {
                        // "." covers the project, never an absolute path.
                        (lit.is_empty() && !subject.starts_with('/'))
                            || subject.starts_with(&format!("{}/", lit))
                    }
                    SubjectKind::Host => subject.ends_with(&format!(".{}", lit)),
                }
            }
        }
    }
}

fn normalize(raw: &str) -> String {
    let mut s = raw.replace('\\', "/");
    while let Some(rest) = s.strip_prefix("./") {
        s = rest.to_string();
    }
    s
}

/// Canonical spelling of a rule entry, for comparing entries across
/// policy layers: "./src/", "src" and ".\\src" are the same rule.
pub(crate) fn entry_key(entry: &str) -> String {
    let normalized = normalize(entry);
    let trimmed = normalized.trim_end_matches('/');
    if trimmed.is_empty() || trimmed == "." {
        ".".to_string()
    } else {
        trimmed.to_string()
    }
}

fn compile(pattern: &str) -> Result<Compiled, PolicyError> {
    let normalized = normalize(pattern);
    if !normalized.contains('*') {
        let literal = normalized.trim_end_matches('/').to_string();
        return Ok(Compiled::Literal(if literal == "." {
            String::new()
        } else {
            literal
        }));
    }

    let mut body = String::with_capacity(normalized.len() * 2);
    let mut chars = normalized.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '*' {
            if chars.peek() == Some(&'*') {
                chars.next();
                body.push_str(".*");
            } else {
                body.push_str("[^/]*");
            }
        } else {
            body.push_str(&regex::escape(&c.to_string()));
        }
    }

    let re = Regex::new(&format!("^{}(?:/.*)?$", body)).map_err(|e| {
        PolicyError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        }
    })?;
    Ok(Compiled::Wildcard(re))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(patterns: &[&str]) -> PatternMatcher {
        let owned: Vec<String> = patterns.iter().map(|s| s.to_string()).collect();
        PatternMatcher::new(SubjectKind::Path, &owned).unwrap()
    }

    fn hosts(patterns: &[&str]) -> PatternMatcher {
        let owned: Vec<String> = patterns.iter().map(|s| s.to_string()).collect();
        PatternMatcher::new(SubjectKind::Host, &owned).unwrap()
    }

    #[test]
    fn literal_matches_exact_and_descendants() {
        let m = paths(&["./src"]);
        assert!(m.is_match("src"));
        assert!(m.is_match("src/main.rs"));
        assert!(m.is_match("./src/deep/mod.rs"));
        assert!(!m.is_match("srcfoo/main.rs"));
        assert!(!m.is_match("lib/src/main.rs"));
    }

    #[test]
    fn entry_keys_ignore_spelling() {
        assert_eq!(entry_key("./src/"), "src");
        assert_eq!(entry_key("src\\"), "src");
        assert_eq!(entry_key("./"), ".");
        assert_eq!(entry_key("api.openai.com"), "api.openai.com");
    }

    #[test]
    fn dot_literal_covers_relative_paths_only() {
        let m = paths(&["."]);
        assert!(m.is_match("src/lib.rs"));
        assert!(m.is_match("./README.md"));
        assert!(!m.is_match("/etc/passwd"));
    }

    #[test]
    fn trailing_slash_on_literal_is_ignored() {
        assert!(paths(&["docs/"]).is_match("docs/readme.md"));
    }

    #[test]
    fn single_star_stops_at_separator() {
        let m = paths(&["src/*.rs"]);
        assert!(m.is_match("src/main.rs"));
        assert!(!m.is_match("src/nested/main.rs"));
    }

    #[test]
    fn double_star_crosses_separators() {
        let m = paths(&["src/**/*.rs"]);
        assert!(m.is_match("src/a/b/c.rs"));
        assert!(!m.is_match("tests/a.rs"));
    }

    #[test]
    fn wildcard_covers_subject_descendants() {
        // "**/.env*" matches the file and anything beneath a matching directory.
        let m = paths(&["**/.env*"]);
        assert!(m.is_match("app/.env"));
        assert!(m.is_match("app/.env.local/key"));
    }

    #[test]
    fn dots_in_patterns_are_literal() {
        let m = paths(&["*.md"]);
        assert!(m.is_match("README.md"));
        assert!(!m.is_match("READMEXmd"));
    }

    #[test]
    fn matching_is_case_sensitive() {
        assert!(!paths(&["./Src"]).is_match("src/main.rs"));
    }

    #[test]
    fn backslashes_are_normalized() {
        assert!(paths(&["src\\lib"]).is_match("src/lib/mod.rs"));
        assert!(paths(&["src/lib"]).is_match("src\\lib\\mod.rs"));
    }

    #[test]
    fn host_literal_covers_subdomains_only() {
        let m = hosts(&["openai.com"]);
        assert!(m.is_match("openai.com"));
        assert!(m.is_match("api.openai.com"));
        assert!(!m.is_match("notopenai.com"));
    }

    #[test]
    fn host_wildcard() {
        let m = hosts(&["*.internal"]);
        assert!(m.is_match("db.internal"));
        assert!(!m.is_match("internal"));
    }

    #[test]
    fn first_match_reports_pattern_as_written() {
        let m = paths(&["./docs", "./src"]);
        assert_eq!(m.first_match("src/lib.rs"), Some("./src"));
        assert_eq!(m.first_match("target/x"), None);
    }
}
