//! Collector source repair for an empty endpoint override.
//!
//! The collector reads its endpoint with `os.getenv("VAR", "default")`. When
//! `VAR` is exported but empty, that call returns `""` and the built-in
//! default is silently shadowed. The repair rewrites each such call site to
//! `os.getenv("VAR") or "default"`, which falls back on any falsy value.
//!
//! Call sites are located by a small scanner that parses the call
//! expression (accessor, parenthesised arguments, trailing `or` operand)
//! instead of pattern-matching text, and the rewrite keeps each argument's
//! original spelling. A rewritten source parses as already patched, so
//! applying the operation again changes nothing.

use std::ops::Range;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::config::PatchConfig;
use crate::error::Result;

/// One `accessor(var[, default])` call site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvLookup {
    /// Byte range of the call expression, accessor through closing paren.
    pub span: Range<usize>,
    /// Variable name argument as written, quotes included.
    pub var_literal: String,
    /// Variable name with quotes removed.
    pub var: String,
    /// Second argument as written, if any.
    pub default_arg: Option<String>,
    /// Operand of an `or` directly following the call, if any.
    pub or_fallback: Option<String>,
}

/// What the scanner found for the configured variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchState {
    /// At least one call site bakes the default into the call.
    Unpatched(Vec<EnvLookup>),
    /// Every call site already uses an `or` fallback.
    Patched,
    /// No call site needs or has the fallback.
    NotFound,
}

/// Result of applying a [`PatchOperation`] to its target file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PatchOutcome {
    Applied {
        rewrites: usize,
        before_digest: String,
        after_digest: String,
    },
    AlreadyApplied,
    PatternNotFound,
    TargetMissing { path: PathBuf },
}

impl PatchOutcome {
    pub fn changed(&self) -> bool {
        matches!(self, PatchOutcome::Applied { .. })
    }
}

/// The env-fallback rewrite bound to one target file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchOperation {
    pub target: PathBuf,
    pub env_var: String,
    pub accessor: String,
}

impl PatchOperation {
    pub fn from_config(config: &PatchConfig) -> Self {
        Self {
            target: config.target.clone(),
            env_var: config.env_var.clone(),
            accessor: config.accessor.clone(),
        }
    }

    /// Classify `source` with respect to this operation.
    pub fn detect(&self, source: &str) -> PatchState {
        let lookups: Vec<EnvLookup> = find_lookups(source, &self.accessor)
            .into_iter()
            .filter(|l| l.var == self.env_var)
            .collect();

        let unpatched: Vec<EnvLookup> = lookups
            .iter()
            .filter(|l| l.default_arg.is_some())
            .cloned()
            .collect();

        if !unpatched.is_empty() {
            PatchState::Unpatched(unpatched)
        } else if lookups.iter().any(|l| l.or_fallback.is_some()) {
            PatchState::Patched
        } else {
            PatchState::NotFound
        }
    }

    /// Rewritten source, or `None` when nothing needs to change.
    pub fn rewrite(&self, source: &str) -> Option<String> {
        match self.detect(source) {
            PatchState::Unpatched(sites) => Some(self.rewrite_sites(source, &sites)),
            PatchState::Patched | PatchState::NotFound => None,
        }
    }

    fn rewrite_sites(&self, source: &str, sites: &[EnvLookup]) -> String {
        let mut out = String::with_capacity(source.len() + 8 * sites.len());
        let mut cursor = 0;
        for site in sites {
            let Some(default_arg) = &site.default_arg else {
                continue;
            };
            out.push_str(&source[cursor..site.span.start]);
            out.push_str(&format!(
                "{}({}) or {}",
                self.accessor, site.var_literal, default_arg
            ));
            cursor = site.span.end;
        }
        out.push_str(&source[cursor..]);
        out
    }

    /// Apply the rewrite to `root.join(target)` in place.
    pub fn apply(&self, root: &Path) -> Result<PatchOutcome> {
        let path = root.join(&self.target);
        if !path.exists() {
            debug!(path = %path.display(), "patch target not found");
            return Ok(PatchOutcome::TargetMissing { path });
        }

        let source = std::fs::read_to_string(&path)?;
        let sites = match self.detect(&source) {
            PatchState::Unpatched(sites) => sites,
            PatchState::Patched => return Ok(PatchOutcome::AlreadyApplied),
            PatchState::NotFound => return Ok(PatchOutcome::PatternNotFound),
        };

        let patched = self.rewrite_sites(&source, &sites);
        std::fs::write(&path, &patched)?;
        info!(path = %path.display(), rewrites = sites.len(), "applied env fallback patch");

        Ok(PatchOutcome::Applied {
            rewrites: sites.len(),
            before_digest: content_digest(&source),
            after_digest: content_digest(&patched),
        })
    }
}

/// SHA-256 hex digest of `content`.
pub fn content_digest(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

/// Every parseable `accessor(...)` call site in `source`.
pub fn find_lookups(source: &str, accessor: &str) -> Vec<EnvLookup> {
    let mut found = Vec::new();
    if accessor.is_empty() {
        return found;
    }

    let mut search_from = 0;
    while let Some(offset) = source[search_from..].find(accessor) {
        let start = search_from + offset;
        search_from = start + accessor.len();

        let preceded_by_name = source[..start]
            .chars()
            .next_back()
            .is_some_and(|c| is_name_char(c) || c == '.');
        let followed_by_name = source[search_from..]
            .chars()
            .next()
            .is_some_and(is_name_char);
        if preceded_by_name || followed_by_name {
            continue;
        }

        let mut scanner = Scanner::new(source, search_from);
        if let Some(lookup) = scanner.call(start) {
            search_from = lookup.span.end;
            found.push(lookup);
        }
    }

    found
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Cursor over the source text. Structural tokens are ASCII, so byte
/// positions always fall on char boundaries.
#[derive(Clone)]
struct Scanner<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(src: &'a str, pos: usize) -> Self {
        Self { src, pos }
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn skip_ws(&mut self) {
        while let Some(c) = self.peek() {
            if !c.is_whitespace() {
                break;
            }
            self.pos += c.len_utf8();
        }
    }

    fn skip_inline_ws(&mut self) {
        while matches!(self.peek(), Some(' ' | '\t')) {
            self.pos += 1;
        }
    }

    /// `( literal [, operand] [,] )` followed by an optional `or operand`.
    fn call(&mut self, start: usize) -> Option<EnvLookup> {
        self.skip_ws();
        if !self.eat('(') {
            return None;
        }
        self.skip_ws();
        let var_literal = self.string_literal()?;
        self.skip_ws();

        let mut default_arg = None;
        if self.eat(',') {
            self.skip_ws();
            if self.peek() != Some(')') {
                default_arg = Some(self.operand()?);
                self.skip_ws();
                self.eat(',');
                self.skip_ws();
            }
        }
        if !self.eat(')') {
            return None;
        }
        let end = self.pos;

        let mut tail = self.clone();
        tail.skip_inline_ws();
        let or_fallback = if tail.keyword("or") {
            tail.skip_inline_ws();
            tail.operand()
        } else {
            None
        };

        Some(EnvLookup {
            span: start..end,
            var: unquote(&var_literal),
            var_literal,
            default_arg,
            or_fallback,
        })
    }

    fn keyword(&mut self, word: &str) -> bool {
        let rest = &self.src[self.pos..];
        if rest.starts_with(word)
            && !rest[word.len()..]
                .chars()
                .next()
                .is_some_and(is_name_char)
        {
            self.pos += word.len();
            true
        } else {
            false
        }
    }

    /// A string literal or a dotted name.
    fn operand(&mut self) -> Option<String> {
        if let Some(literal) = self.clone().string_literal() {
            self.string_literal();
            return Some(literal);
        }
        self.dotted_name()
    }

    fn dotted_name(&mut self) -> Option<String> {
        let start = self.pos;
        match self.peek() {
            Some(c) if c.is_alphabetic() || c == '_' => {}
            _ => return None,
        }
        while let Some(c) = self.peek() {
            if is_name_char(c) || c == '.' {
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }
        Some(self.src[start..self.pos].to_string())
    }

    /// Single-line quoted string with an optional `r`/`u`/`b` prefix,
    /// returned exactly as written.
    fn string_literal(&mut self) -> Option<String> {
        let start = self.pos;
        let mut prefix = 0;
        while prefix < 2 && matches!(self.peek(), Some('r' | 'R' | 'u' | 'U' | 'b' | 'B')) {
            self.pos += 1;
            prefix += 1;
        }

        let quote = match self.peek() {
            Some(q @ ('"' | '\'')) => q,
            _ => {
                self.pos = start;
                return None;
            }
        };
        self.pos += 1;

        if self.src[self.pos..].starts_with(quote) && self.src[self.pos + 1..].starts_with(quote) {
            // Triple-quoted strings are out of scope.
            self.pos = start;
            return None;
        }

        let mut escaped = false;
        while let Some(c) = self.peek() {
            self.pos += c.len_utf8();
            match c {
                '\n' => break,
                '\\' if !escaped => escaped = true,
                c if c == quote && !escaped => {
                    return Some(self.src[start..self.pos].to_string());
                }
                _ => escaped = false,
            }
        }

        self.pos = start;
        None
    }
}

/// Strip prefix and quotes from a literal and drop backslash escapes.
fn unquote(literal: &str) -> String {
    let body = literal.trim_start_matches(|c: char| c.is_ascii_alphabetic());
    let inner = body.get(1..body.len().saturating_sub(1)).unwrap_or_default();

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op() -> PatchOperation {
        PatchOperation::from_config(&PatchConfig::default())
    }

    const UNPATCHED: &str = r#"import os
API_URL = os.getenv("POLYMARKET_MARKETS_URL", "https://clob.polymarket.com/markets?limit=200&offset=0")
"#;

    const PATCHED: &str = r#"import os
API_URL = os.getenv("POLYMARKET_MARKETS_URL") or "https://clob.polymarket.com/markets?limit=200&offset=0"
"#;

    #[test]
    fn test_detects_two_argument_call() {
        match op().detect(UNPATCHED) {
            PatchState::Unpatched(sites) => {
                assert_eq!(sites.len(), 1);
                assert_eq!(sites[0].var, "POLYMARKET_MARKETS_URL");
                assert_eq!(
                    sites[0].default_arg.as_deref(),
                    Some("\"https://clob.polymarket.com/markets?limit=200&offset=0\"")
                );
            }
            other => panic!("expected Unpatched, got {other:?}"),
        }
    }

    #[test]
    fn test_rewrite_produces_or_fallback() {
        assert_eq!(op().rewrite(UNPATCHED).as_deref(), Some(PATCHED));
    }

    #[test]
    fn test_patched_source_is_recognised() {
        assert_eq!(op().detect(PATCHED), PatchState::Patched);
        assert_eq!(op().rewrite(PATCHED), None);
    }

    #[test]
    fn test_other_variables_are_left_alone() {
        let src = "TOKEN = os.getenv(\"OTHER_TOKEN\", \"x\")\n";
        assert_eq!(op().detect(src), PatchState::NotFound);
    }

    #[test]
    fn test_accessor_must_stand_alone() {
        let src = "URL = myos.getenv(\"POLYMARKET_MARKETS_URL\", \"x\")\n";
        assert!(find_lookups(src, "os.getenv").is_empty());
    }

    #[test]
    fn test_multiline_call_with_single_quotes_and_trailing_comma() {
        let src = "URL = os.getenv(\n    'POLYMARKET_MARKETS_URL',\n    'https://a.example/m',\n)\n";
        let patched = op().rewrite(src).unwrap();
        assert_eq!(
            patched,
            "URL = os.getenv('POLYMARKET_MARKETS_URL') or 'https://a.example/m'\n"
        );
    }

    #[test]
    fn test_name_default_is_preserved() {
        let src = "URL = os.getenv(\"POLYMARKET_MARKETS_URL\", config.DEFAULT_URL)\n";
        let patched = op().rewrite(src).unwrap();
        assert_eq!(
            patched,
            "URL = os.getenv(\"POLYMARKET_MARKETS_URL\") or config.DEFAULT_URL\n"
        );
    }

    #[test]
    fn test_escaped_quotes_inside_default() {
        let src = r#"URL = os.getenv("POLYMARKET_MARKETS_URL", "https://x/\"q\"")"#;
        let patched = op().rewrite(src).unwrap();
        assert_eq!(
            patched,
            r#"URL = os.getenv("POLYMARKET_MARKETS_URL") or "https://x/\"q\"""#
        );
    }

    #[test]
    fn test_unterminated_literal_is_not_a_call() {
        let src = "URL = os.getenv(\"POLYMARKET_MARKETS_URL, \"x\"\n";
        assert_eq!(op().detect(src), PatchState::NotFound);
    }

    #[test]
    fn test_unquote_strips_prefix_and_escapes() {
        assert_eq!(unquote("r'ABC'"), "ABC");
        assert_eq!(unquote("\"a\\\"b\""), "a\"b");
    }

    #[test]
    fn test_apply_reports_missing_target() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = op().apply(dir.path()).unwrap();
        assert!(matches!(outcome, PatchOutcome::TargetMissing { .. }));
        assert!(!outcome.changed());
    }

    #[test]
    fn test_apply_writes_file_with_digests() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join(&op().target);
        std::fs::create_dir_all(target.parent().unwrap()).unwrap();
        std::fs::write(&target, UNPATCHED).unwrap();

        let outcome = op().apply(dir.path()).unwrap();
        match outcome {
            PatchOutcome::Applied {
                rewrites,
                before_digest,
                after_digest,
            } => {
                assert_eq!(rewrites, 1);
                assert_eq!(before_digest, content_digest(UNPATCHED));
                assert_eq!(after_digest, content_digest(PATCHED));
            }
            other => panic!("expected Applied, got {other:?}"),
        }
        assert_eq!(std::fs::read_to_string(&target).unwrap(), PATCHED);
    }
}
