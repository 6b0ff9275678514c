//! Load-time errors raised while compiling directives into scopes.

use std::fmt;

use thiserror::Error;

/// Where a directive came from, for error reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePos {
    pub origin: String,
    pub line: usize,
}

impl SourcePos {
    pub fn new(origin: impl Into<String>, line: usize) -> Self {
        Self {
            origin: origin.into(),
            line,
        }
    }
}

impl fmt::Display for SourcePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.origin, self.line)
    }
}

/// Grammar violations in rule, check-rule and flag directives.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ConfigErrorKind {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("unknown rule field")]
    UnknownField,

    #[error("unknown match zone")]
    UnknownZone,

    #[error("unparsable pattern: {0}")]
    InvalidPattern(String),

    #[error("invalid rule id")]
    InvalidId,

    #[error("invalid score, expected `$TAG:N`")]
    InvalidScore,

    #[error("whitelist ids must be non-zero integers")]
    InvalidWhitelist,

    #[error("score tag must be `$`-prefixed and followed by whitespace")]
    InvalidTag,

    #[error("comparator must be one of >, >=, <, <=")]
    InvalidComparator,

    #[error("threshold must be a signed integer")]
    InvalidThreshold,

    #[error("action must be exactly BLOCK, ALLOW or LOG")]
    InvalidAction,

    #[error("unknown directive")]
    UnknownDirective,

    #[error("directive is not allowed here")]
    MisplacedDirective,

    #[error("wrong number of arguments")]
    WrongArity,

    #[error("unterminated quoted string")]
    UnterminatedQuote,
}

/// A malformed directive, naming the offending token and, once known, its
/// source line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}{kind} near `{token}`", position_prefix(.at))]
pub struct ConfigError {
    pub kind: ConfigErrorKind,
    pub token: String,
    pub at: Option<SourcePos>,
}

fn position_prefix(at: &Option<SourcePos>) -> String {
    at.as_ref().map(|pos| format!("{pos}: ")).unwrap_or_default()
}

impl ConfigError {
    pub fn new(kind: ConfigErrorKind, token: impl Into<String>) -> Self {
        Self {
            kind,
            token: token.into(),
            at: None,
        }
    }

    /// Attach the directive position unless one is already set.
    pub fn at(mut self, pos: &SourcePos) -> Self {
        if self.at.is_none() {
            self.at = Some(pos.clone());
        }
        self
    }
}

/// Failure while assembling a location scope.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ScopeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("rule table for scope '{scope}' is full ({len} rules)")]
    Resource { scope: String, len: usize },
}
