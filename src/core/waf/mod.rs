//! Score-based request inspection.
//!
//! Rules (`MainRule` / `BasicRule`) are compiled once per location into a
//! [`RuleStore`], each rule referenced from every zone collection it
//! targets. Requests are then matched zone by zone; every non-whitelisted
//! match adds the rule's scores to per-tag totals, and the location's
//! `CheckRule` thresholds turn those totals into a block or allow verdict.
//!
//! - [`compiler`] / [`check_rule`]: directive grammar
//! - [`store`] / [`scope`] / [`location`]: per-location configuration
//! - [`context`] / [`evaluator`] / [`decision`]: per-request evaluation
//! - [`engine`]: the host-facing entry point

pub mod check_rule;
pub mod compiler;
pub mod context;
pub mod decision;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod location;
pub mod matcher;
pub mod request;
pub mod rule;
pub mod scope;
pub mod store;

pub use check_rule::{CheckAction, CheckRule, CheckRuleParser, Comparator};
pub use compiler::{Collection, RuleCompiler};
pub use context::{Disposition, EvalState, Event, MatchRecord, RequestContext, Verdict};
pub use decision::{Decision, DecisionEngine};
pub use engine::WafEngine;
pub use error::{ConfigError, ConfigErrorKind, ScopeError, SourcePos};
pub use evaluator::Evaluator;
pub use location::{LocationTable, normalize_path};
pub use matcher::{DefaultMatcher, PatternMatcher};
pub use request::RequestView;
pub use rule::{Rule, RuleId, Zone};
pub use scope::{LocationScope, ScopeBuilder, ScopeSnapshot};
pub use store::RuleStore;
