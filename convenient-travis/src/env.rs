//! Environment line parsing
//!
//! A Travis env axis entry is a single line of `KEY=value` pairs, for example
//! `NETTE=nette-2.4 COVERAGE="--coverage ./coverage.xml"`. Double quoted
//! values may contain spaces and keep their quotes, so the value can be
//! dropped verbatim into a Dockerfile `ENV` directive.

use indexmap::IndexMap;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::LazyLock;

static PAIR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([^=\t ]+)=("[^"]+"|[^\t ]+)"#).expect("env pair pattern is valid")
});

/// Ordered environment variables of one job
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Environment {
    vars: IndexMap<String, String>,
}

impl Environment {
    /// Parse an environment line
    ///
    /// A repeated key keeps its first position and takes the last value.
    /// A blank line yields an empty environment.
    pub fn parse(line: &str) -> Self {
        let mut vars = IndexMap::new();
        if line.trim().is_empty() {
            return Self { vars };
        }

        for captures in PAIR_PATTERN.captures_iter(line) {
            let _ = vars.insert(captures[1].to_string(), captures[2].to_string());
        }

        Self { vars }
    }

    /// Canonical `KEY=value` line, pairs joined by single spaces
    ///
    /// This is the identity used for matrix deduplication and matching.
    pub fn line(&self) -> String {
        self.vars
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Look up a single variable
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Iterate variables in encounter order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of variables
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// True when no variables are set
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.line())
    }
}
