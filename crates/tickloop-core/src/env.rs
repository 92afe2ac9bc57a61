//! Point-in-time view of the process environment.
//!
//! The supervisor and publisher read variables through an [`EnvSnapshot`]
//! rather than `std::env` so a pass sees one consistent environment and
//! tests never mutate process-global state.

use std::collections::HashMap;

/// How a variable is set, as the audit distinguishes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvPresence {
    Unset,
    /// Present but empty or whitespace-only.
    Blank,
    Set(String),
}

#[derive(Debug, Clone, Default)]
pub struct EnvSnapshot {
    vars: HashMap<String, String>,
}

impl EnvSnapshot {
    /// Capture the current process environment. Non-UTF-8 values are lossily converted.
    pub fn capture() -> Self {
        let vars = std::env::vars_os()
            .map(|(k, v)| {
                (
                    k.to_string_lossy().into_owned(),
                    v.to_string_lossy().into_owned(),
                )
            })
            .collect();
        Self { vars }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Raw value, empty strings included.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Value if set to something other than whitespace; empty counts as absent.
    pub fn non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|v| !v.trim().is_empty())
    }

    pub fn presence(&self, key: &str) -> EnvPresence {
        match self.get(key) {
            None => EnvPresence::Unset,
            Some(v) if v.trim().is_empty() => EnvPresence::Blank,
            Some(v) => EnvPresence::Set(v.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presence_distinguishes_unset_blank_and_set() {
        let env = EnvSnapshot::from_pairs([("EMPTY", ""), ("SPACES", "  \t"), ("URL", "https://x")]);
        assert_eq!(env.presence("MISSING"), EnvPresence::Unset);
        assert_eq!(env.presence("EMPTY"), EnvPresence::Blank);
        assert_eq!(env.presence("SPACES"), EnvPresence::Blank);
        assert_eq!(env.presence("URL"), EnvPresence::Set("https://x".to_string()));
    }

    #[test]
    fn test_non_empty_treats_blank_as_absent() {
        let env = EnvSnapshot::from_pairs([("TOKEN", " "), ("REPO", "org/repo")]);
        assert_eq!(env.get("TOKEN"), Some(" "));
        assert_eq!(env.non_empty("TOKEN"), None);
        assert_eq!(env.non_empty("REPO"), Some("org/repo"));
    }
}
