//! Compiled detection rules and the request zones they target.

use std::fmt;

use regex::Regex;

/// Numeric identifier carried by `id:` in a rule directive.
pub type RuleId = u32;

/// Identifier reserved for findings raised by the engine itself.
pub const INTERNAL_RULE_ID: RuleId = 0;

/// Request component a rule is evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Zone {
    /// Percent-decoded request path
    Url,
    /// Query string arguments
    Args,
    /// Request headers
    Headers,
    /// Request body
    Body,
}

impl Zone {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Zone::Url => "URL",
            Zone::Args => "ARGS",
            Zone::Headers => "HEADERS",
            Zone::Body => "BODY",
        }
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named variable inside one of the variable-bearing zones.
///
/// Produced by `$ARGS_VAR:name`, `$BODY_VAR:name` and `$HEADERS_VAR:name`
/// match zones. Names compare ASCII case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomLocation {
    pub name: String,
    pub args_var: bool,
    pub body_var: bool,
    pub headers_var: bool,
}

impl CustomLocation {
    pub fn args(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args_var: true,
            ..Self::default()
        }
    }

    pub fn body(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            body_var: true,
            ..Self::default()
        }
    }

    pub fn headers(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            headers_var: true,
            ..Self::default()
        }
    }

    /// Whether this location names a variable in `zone`.
    pub fn covers(&self, zone: Zone) -> bool {
        match zone {
            Zone::Args => self.args_var,
            Zone::Body => self.body_var,
            Zone::Headers => self.headers_var,
            Zone::Url => false,
        }
    }

    pub fn names(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

/// Target classes parsed from a rule's `mz:` field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Targets {
    pub headers: bool,
    pub body: bool,
    pub url: bool,
    pub args: bool,
    pub custom_locations: Vec<CustomLocation>,
}

impl Targets {
    pub fn is_empty(&self) -> bool {
        !self.headers
            && !self.body
            && !self.url
            && !self.args
            && self.custom_locations.is_empty()
    }

    /// Whether the zone as a whole is targeted (not just named variables).
    pub fn covers_zone(&self, zone: Zone) -> bool {
        match zone {
            Zone::Url => self.url,
            Zone::Args => self.args,
            Zone::Headers => self.headers,
            Zone::Body => self.body,
        }
    }

    /// Whether a match found in `zone` (optionally on variable `name`) falls
    /// inside these targets.
    pub fn covers(&self, zone: Zone, name: Option<&str>) -> bool {
        if self.covers_zone(zone) {
            return true;
        }
        match name {
            Some(name) => self
                .custom_locations
                .iter()
                .any(|loc| loc.covers(zone) && loc.names(name)),
            None => false,
        }
    }
}

/// Pattern reference of a rule, compiled at configuration time.
#[derive(Debug, Clone)]
pub enum Pattern {
    /// `str:` literal, stored lowercased for case-insensitive search
    Literal(String),
    /// `rx:` regular expression
    Regex(Regex),
}

impl Pattern {
    pub fn literal(text: &str) -> Self {
        Pattern::Literal(text.to_lowercase())
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Literal(text) => write!(f, "str:{text}"),
            Pattern::Regex(re) => write!(f, "rx:{}", re.as_str()),
        }
    }
}

/// One `$TAG:N` contribution of a rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Score {
    pub tag: String,
    pub value: i64,
}

impl Score {
    pub fn new(tag: impl Into<String>, value: i64) -> Self {
        Self {
            tag: tag.into(),
            value,
        }
    }
}

/// A compiled `MainRule` / `BasicRule`.
#[derive(Debug, Clone)]
pub struct Rule {
    pub id: RuleId,
    pub msg: Option<String>,
    /// Absent only on whitelist rules
    pub pattern: Option<Pattern>,
    pub scores: Vec<Score>,
    pub targets: Targets,
    /// Ids this rule whitelists; empty for detection rules
    pub whitelist: Vec<RuleId>,
}

impl Rule {
    pub fn is_whitelist(&self) -> bool {
        !self.whitelist.is_empty()
    }

    /// Whether this whitelist rule suppresses a match of `rule_id` found in
    /// `zone` on variable `name`. A whitelist without targets applies
    /// everywhere.
    pub fn suppresses(&self, rule_id: RuleId, zone: Zone, name: Option<&str>) -> bool {
        self.whitelist.contains(&rule_id)
            && (self.targets.is_empty() || self.targets.covers(zone, name))
    }
}
