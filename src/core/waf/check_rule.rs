//! Threshold policies (`CheckRule "$TAG <cmp> N" ACTION`).

use std::fmt;

use super::error::{ConfigError, ConfigErrorKind};

/// Comparison applied between an accumulated score and a threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Greater,
    GreaterOrEqual,
    Less,
    LessOrEqual,
}

impl Comparator {
    /// Whether `score <self> threshold` holds.
    pub fn holds(&self, score: i64, threshold: i64) -> bool {
        match self {
            Comparator::Greater => score > threshold,
            Comparator::GreaterOrEqual => score >= threshold,
            Comparator::Less => score < threshold,
            Comparator::LessOrEqual => score <= threshold,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Comparator::Greater => ">",
            Comparator::GreaterOrEqual => ">=",
            Comparator::Less => "<",
            Comparator::LessOrEqual => "<=",
        }
    }
}

/// What a firing check rule does.
///
/// Keywords map by exact, case-sensitive equality: `BLOCK`, `ALLOW`, `LOG`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckAction {
    Block,
    Allow,
    Log,
}

impl CheckAction {
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "BLOCK" => Some(CheckAction::Block),
            "ALLOW" => Some(CheckAction::Allow),
            "LOG" => Some(CheckAction::Log),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CheckAction::Block => "BLOCK",
            CheckAction::Allow => "ALLOW",
            CheckAction::Log => "LOG",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckRule {
    pub tag: String,
    pub comparator: Comparator,
    pub threshold: i64,
    pub action: CheckAction,
}

impl CheckRule {
    /// Whether the rule fires for `score`.
    pub fn fires(&self, score: i64) -> bool {
        self.comparator.holds(score, self.threshold)
    }
}

impl fmt::Display for CheckRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.tag,
            self.comparator.as_str(),
            self.threshold,
            self.action.as_str()
        )
    }
}

/// Parser for the two free-text arguments of a `CheckRule` directive.
pub struct CheckRuleParser;

impl CheckRuleParser {
    /// Parse `"$TAG <cmp> N"` plus an action keyword.
    ///
    /// The tag runs up to the first whitespace. Two-character comparators are
    /// tried before single-character ones. The threshold is the first signed
    /// integer found after the comparator, skipping anything that is neither
    /// a digit nor `-`; only whitespace may follow it.
    pub fn parse(expr: &str, action: &str) -> Result<CheckRule, ConfigError> {
        let bytes = expr.as_bytes();
        let invalid = |kind| ConfigError::new(kind, expr);

        if bytes.first() != Some(&b'$') {
            return Err(invalid(ConfigErrorKind::InvalidTag));
        }
        let tag_end = bytes
            .iter()
            .position(u8::is_ascii_whitespace)
            .ok_or_else(|| invalid(ConfigErrorKind::InvalidTag))?;
        if tag_end < 2 {
            return Err(invalid(ConfigErrorKind::InvalidTag));
        }
        let tag = &expr[..tag_end];

        let mut i = tag_end;
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }

        let comparator = match (bytes.get(i), bytes.get(i + 1)) {
            (Some(b'>'), Some(b'=')) => Comparator::GreaterOrEqual,
            (Some(b'<'), Some(b'=')) => Comparator::LessOrEqual,
            (Some(b'>'), _) => Comparator::Greater,
            (Some(b'<'), _) => Comparator::Less,
            _ => return Err(invalid(ConfigErrorKind::InvalidComparator)),
        };
        i += comparator.as_str().len();

        while i < bytes.len() && !bytes[i].is_ascii_digit() && bytes[i] != b'-' {
            i += 1;
        }
        let start = i;
        if bytes.get(i) == Some(&b'-') {
            i += 1;
        }
        let digits_start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if i == digits_start || !expr[i..].trim().is_empty() {
            return Err(invalid(ConfigErrorKind::InvalidThreshold));
        }
        let threshold = expr[start..i]
            .parse::<i64>()
            .map_err(|_| invalid(ConfigErrorKind::InvalidThreshold))?;

        let action = CheckAction::from_keyword(action)
            .ok_or_else(|| ConfigError::new(ConfigErrorKind::InvalidAction, action))?;

        Ok(CheckRule {
            tag: tag.to_string(),
            comparator,
            threshold,
            action,
        })
    }
}
