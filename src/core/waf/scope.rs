//! Location scopes: the rules, flags and counters governing one URL prefix.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tracing::debug;

use super::{
    check_rule::{CheckRule, CheckRuleParser},
    compiler::RuleCompiler,
    error::{ConfigError, ConfigErrorKind, ScopeError},
    rule::Rule,
    store::{RuleStore, StoreSummary},
};
use crate::config::directives::Directive;

/// Request counters of one scope, updated lock-free from request tasks.
#[derive(Debug, Default)]
pub struct ScopeCounters {
    processed: AtomicU64,
    blocked: AtomicU64,
}

impl ScopeCounters {
    pub fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_blocked(&self) {
        self.blocked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn blocked(&self) -> u64 {
        self.blocked.load(Ordering::Relaxed)
    }
}

/// Immutable configuration of one location plus its live counters.
#[derive(Debug)]
pub struct LocationScope {
    pub name: String,
    pub store: RuleStore,
    pub enabled: bool,
    pub force_disabled: bool,
    pub learning: bool,
    pub denied_url: Option<String>,
    pub counters: ScopeCounters,
}

impl LocationScope {
    /// Whether requests in this scope are inspected at all.
    pub fn is_active(&self) -> bool {
        self.enabled && !self.force_disabled
    }

    pub fn snapshot(&self) -> ScopeSnapshot {
        ScopeSnapshot {
            name: self.name.clone(),
            active: self.is_active(),
            learning: self.learning,
            denied_url: self.denied_url.clone(),
            requests_processed: self.counters.processed(),
            requests_blocked: self.counters.blocked(),
            rules: self.store.summary(),
        }
    }
}

/// Point-in-time view of a scope, as reported by the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ScopeSnapshot {
    pub name: String,
    pub active: bool,
    pub learning: bool,
    pub denied_url: Option<String>,
    pub requests_processed: u64,
    pub requests_blocked: u64,
    pub rules: StoreSummary,
}

/// Compile the `MainRule` directives shared by every location.
///
/// Any other directive at main level is rejected.
pub fn compile_main_rules(directives: &[Directive]) -> Result<Vec<Rule>, ConfigError> {
    directives
        .iter()
        .map(|directive| {
            if directive.keyword() != "MainRule" {
                return Err(ConfigError::new(
                    ConfigErrorKind::MisplacedDirective,
                    directive.keyword(),
                )
                .at(&directive.pos));
            }
            RuleCompiler::compile(directive.args()).map_err(|e| e.at(&directive.pos))
        })
        .collect()
}

/// Builds a [`LocationScope`] from main rules and location directives.
#[derive(Debug)]
pub struct ScopeBuilder {
    name: String,
    store: RuleStore,
    enabled: bool,
    force_disabled: bool,
    learning: bool,
    denied_url: Option<String>,
}

impl ScopeBuilder {
    /// Start a scope seeded with the shared main rules. Scopes start
    /// disabled until `SecRulesEnabled` is applied.
    pub fn new(name: impl Into<String>, main_rules: &[Rule]) -> Result<Self, ScopeError> {
        let mut builder = Self {
            name: name.into(),
            store: RuleStore::new(),
            enabled: false,
            force_disabled: false,
            learning: false,
            denied_url: None,
        };
        for rule in main_rules {
            builder.insert(rule.clone())?;
        }
        Ok(builder)
    }

    pub fn apply_all<'a>(
        mut self,
        directives: impl IntoIterator<Item = &'a Directive>,
    ) -> Result<Self, ScopeError> {
        for directive in directives {
            self.apply(directive)?;
        }
        Ok(self)
    }

    /// Apply one location-level directive.
    pub fn apply(&mut self, directive: &Directive) -> Result<(), ScopeError> {
        let args = directive.args();
        let arity = |expected: usize| {
            if args.len() == expected {
                Ok(())
            } else {
                Err(ConfigError::new(ConfigErrorKind::WrongArity, directive.tokens.join(" "))
                    .at(&directive.pos))
            }
        };

        match directive.keyword() {
            "BasicRule" => {
                let rule = RuleCompiler::compile(args).map_err(|e| e.at(&directive.pos))?;
                self.insert(rule)?;
            }
            "CheckRule" => {
                arity(2)?;
                let rule = CheckRuleParser::parse(&args[0], &args[1])
                    .map_err(|e| e.at(&directive.pos))?;
                self.push_check_rule(rule);
            }
            "DeniedUrl" => {
                arity(1)?;
                self.denied_url = Some(args[0].clone());
            }
            "LearningMode" => {
                arity(0)?;
                self.learning = true;
            }
            "SecRulesEnabled" => {
                arity(0)?;
                self.enabled = true;
            }
            "SecRulesDisabled" => {
                arity(0)?;
                self.force_disabled = true;
            }
            "MainRule" => {
                return Err(ConfigError::new(ConfigErrorKind::MisplacedDirective, "MainRule")
                    .at(&directive.pos)
                    .into());
            }
            other => {
                return Err(ConfigError::new(ConfigErrorKind::UnknownDirective, other)
                    .at(&directive.pos)
                    .into());
            }
        }
        Ok(())
    }

    pub fn push_check_rule(&mut self, rule: CheckRule) {
        debug!(scope = %self.name, check_rule = %rule, "check rule added");
        self.store.push_check_rule(rule);
    }

    fn insert(&mut self, rule: Rule) -> Result<(), ScopeError> {
        self.store
            .insert(rule)
            .map(|_| ())
            .map_err(|full| ScopeError::Resource {
                scope: self.name.clone(),
                len: full.len,
            })
    }

    pub fn build(self) -> LocationScope {
        LocationScope {
            name: self.name,
            store: self.store,
            enabled: self.enabled,
            force_disabled: self.force_disabled,
            learning: self.learning,
            denied_url: self.denied_url,
            counters: ScopeCounters::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::directives::parse_directives;

    fn scope(main: &str, location: &str) -> Result<LocationScope, ScopeError> {
        let main = compile_main_rules(&parse_directives("main", main)?)?;
        let directives = parse_directives("loc", location)?;
        Ok(ScopeBuilder::new("/", &main)?
            .apply_all(&directives)?
            .build())
    }

    #[test]
    fn test_scope_defaults_to_disabled() {
        let scope = scope("", "").unwrap();
        assert!(!scope.is_active());
        assert!(!scope.learning);
        assert!(scope.denied_url.is_none());
    }

    #[test]
    fn test_flags_and_denied_url() {
        let scope = scope(
            "",
            "SecRulesEnabled; LearningMode; DeniedUrl /blocked; CheckRule \"$SQL >= 8\" BLOCK;",
        )
        .unwrap();
        assert!(scope.is_active());
        assert!(scope.learning);
        assert_eq!(scope.denied_url.as_deref(), Some("/blocked"));
        assert_eq!(scope.store.check_rules().len(), 1);
    }

    #[test]
    fn test_force_disabled_wins() {
        let scope = scope("", "SecRulesEnabled; SecRulesDisabled;").unwrap();
        assert!(!scope.is_active());
    }

    #[test]
    fn test_main_rules_precede_basic_rules() {
        let scope = scope(
            "MainRule str:a mz:URL s:$A:1 id:1;",
            "BasicRule str:b mz:URL s:$A:1 id:2;",
        )
        .unwrap();
        let ids: Vec<u32> = scope.store.rules().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_errors_carry_position() {
        let err = scope("", "SecRulesEnabled;\nCheckRule \"$SQL >= 8\" block;").unwrap_err();
        match err {
            ScopeError::Config(err) => {
                assert_eq!(err.kind, ConfigErrorKind::InvalidAction);
                assert_eq!(err.at.map(|pos| pos.line), Some(2));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_misplaced_and_unknown_directives() {
        let err = scope("", "MainRule str:a mz:URL s:$A:1 id:1;").unwrap_err();
        assert!(matches!(
            err,
            ScopeError::Config(ConfigError { kind: ConfigErrorKind::MisplacedDirective, .. })
        ));

        let err = scope("BasicRule str:a mz:URL s:$A:1 id:1;", "").unwrap_err();
        assert!(matches!(
            err,
            ScopeError::Config(ConfigError { kind: ConfigErrorKind::MisplacedDirective, .. })
        ));

        let err = scope("", "SecRulesEnabledd;").unwrap_err();
        assert!(matches!(
            err,
            ScopeError::Config(ConfigError { kind: ConfigErrorKind::UnknownDirective, .. })
        ));
    }

    #[test]
    fn test_wrong_arity() {
        for text in ["DeniedUrl;", "LearningMode now;", "CheckRule \"$A > 1\";"] {
            let err = scope("", text).unwrap_err();
            assert!(
                matches!(
                    err,
                    ScopeError::Config(ConfigError { kind: ConfigErrorKind::WrongArity, .. })
                ),
                "{text}"
            );
        }
    }

    #[test]
    fn test_counters_snapshot() {
        let scope = scope("", "SecRulesEnabled;").unwrap();
        scope.counters.record_processed();
        scope.counters.record_processed();
        scope.counters.record_blocked();
        let snapshot = scope.snapshot();
        assert_eq!(snapshot.requests_processed, 2);
        assert_eq!(snapshot.requests_blocked, 1);
        assert!(snapshot.active);
    }
}
