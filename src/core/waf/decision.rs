//! Threshold evaluation over accumulated scores.

use std::collections::HashMap;

use tracing::debug;

use super::check_rule::{CheckAction, CheckRule};

/// Outcome of applying a scope's check rules to one request's scores.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Decision {
    pub block: bool,
    /// Index of the check rule that settled the outcome, if any
    pub decided_by: Option<usize>,
    /// Indexes of `LOG` rules that fired before the outcome was settled
    pub logged: Vec<usize>,
}

pub struct DecisionEngine;

impl DecisionEngine {
    /// Walk `check_rules` in order. The first firing `BLOCK` or `ALLOW`
    /// settles the outcome; firing `LOG` rules are recorded and the walk
    /// continues. Tags absent from `scores` count as 0. Nothing decisive
    /// means allow.
    pub fn decide(scores: &HashMap<String, i64>, check_rules: &[CheckRule]) -> Decision {
        let mut decision = Decision::default();

        for (idx, rule) in check_rules.iter().enumerate() {
            let score = scores.get(&rule.tag).copied().unwrap_or(0);
            if !rule.fires(score) {
                continue;
            }
            debug!(check_rule = %rule, score, "check rule fired");
            match rule.action {
                CheckAction::Log => decision.logged.push(idx),
                CheckAction::Block => {
                    decision.block = true;
                    decision.decided_by = Some(idx);
                    break;
                }
                CheckAction::Allow => {
                    decision.decided_by = Some(idx);
                    break;
                }
            }
        }

        decision
    }
}
