//! Per-scope rule storage.
//!
//! Rules live once in an arena; every collection is an ordered list of
//! [`RuleRef`]s into it. The store is filled during configuration load and
//! only read afterwards, so it is shared between requests without locking.

use std::collections::HashMap;

use super::{
    check_rule::CheckRule,
    compiler::{Collection, Route, RuleCompiler},
    rule::{Rule, RuleId, Zone},
};

/// Index of a rule in the store's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RuleIdx(u32);

impl RuleIdx {
    pub fn get(&self) -> usize {
        self.0 as usize
    }
}

/// A collection entry: which rule, and why it was routed here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleRef {
    pub rule: RuleIdx,
    pub route: Route,
}

/// Returned when the arena cannot index another rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaFull {
    pub len: usize,
}

#[derive(Debug, Default)]
pub struct RuleStore {
    rules: Vec<Rule>,
    whitelist: Vec<RuleIdx>,
    whitelist_index: HashMap<RuleId, Vec<RuleIdx>>,
    header: Vec<RuleRef>,
    body: Vec<RuleRef>,
    url: Vec<RuleRef>,
    args: Vec<RuleRef>,
    check_rules: Vec<CheckRule>,
}

impl RuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `rule` and reference it from every collection
    /// [`RuleCompiler::classify`] selects.
    pub fn insert(&mut self, rule: Rule) -> Result<RuleIdx, ArenaFull> {
        let idx = u32::try_from(self.rules.len())
            .map(RuleIdx)
            .map_err(|_| ArenaFull {
                len: self.rules.len(),
            })?;

        for (collection, route) in RuleCompiler::classify(&rule) {
            let entry = RuleRef { rule: idx, route };
            match collection {
                Collection::Whitelist => {
                    self.whitelist.push(idx);
                    for id in &rule.whitelist {
                        self.whitelist_index.entry(*id).or_default().push(idx);
                    }
                }
                Collection::Header => self.header.push(entry),
                Collection::Body => self.body.push(entry),
                Collection::Url => self.url.push(entry),
                Collection::Args => self.args.push(entry),
            }
        }

        self.rules.push(rule);
        Ok(idx)
    }

    pub fn push_check_rule(&mut self, rule: CheckRule) {
        self.check_rules.push(rule);
    }

    pub fn rule(&self, idx: RuleIdx) -> &Rule {
        &self.rules[idx.get()]
    }

    /// All stored rules, whitelists included, in insertion order.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn collection(&self, collection: Collection) -> &[RuleRef] {
        match collection {
            Collection::Header => &self.header,
            Collection::Body => &self.body,
            Collection::Url => &self.url,
            Collection::Args => &self.args,
            Collection::Whitelist => &[],
        }
    }

    /// Ordered rules applicable to one evaluation phase.
    pub fn for_zone(&self, zone: Zone) -> impl Iterator<Item = (&Rule, RuleRef)> + '_ {
        let entries = match zone {
            Zone::Url => &self.url,
            Zone::Args => &self.args,
            Zone::Headers => &self.header,
            Zone::Body => &self.body,
        };
        entries.iter().map(|entry| (self.rule(entry.rule), *entry))
    }

    pub fn whitelist(&self) -> impl Iterator<Item = &Rule> + '_ {
        self.whitelist.iter().map(|idx| self.rule(*idx))
    }

    /// Whether a match of `rule_id` in `zone` / variable `name` is
    /// suppressed by a whitelist rule.
    pub fn is_whitelisted(&self, rule_id: RuleId, zone: Zone, name: Option<&str>) -> bool {
        self.whitelist_index.get(&rule_id).is_some_and(|candidates| {
            candidates
                .iter()
                .any(|idx| self.rule(*idx).suppresses(rule_id, zone, name))
        })
    }

    pub fn check_rules(&self) -> &[CheckRule] {
        &self.check_rules
    }

    /// Collections holding a reference to `idx`, one entry per reference.
    pub fn collections_of(&self, idx: RuleIdx) -> Vec<Collection> {
        let mut found = Vec::new();
        if self.whitelist.contains(&idx) {
            found.push(Collection::Whitelist);
        }
        for collection in [
            Collection::Header,
            Collection::Body,
            Collection::Url,
            Collection::Args,
        ] {
            let refs = self
                .collection(collection)
                .iter()
                .filter(|entry| entry.rule == idx)
                .count();
            found.extend(std::iter::repeat_n(collection, refs));
        }
        found
    }

    /// Reference counts per collection, for load summaries.
    pub fn summary(&self) -> StoreSummary {
        StoreSummary {
            rules: self.rules.len(),
            whitelist: self.whitelist.len(),
            header: self.header.len(),
            body: self.body.len(),
            url: self.url.len(),
            args: self.args.len(),
            check_rules: self.check_rules.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct StoreSummary {
    pub rules: usize,
    pub whitelist: usize,
    pub header: usize,
    pub body: usize,
    pub url: usize,
    pub args: usize,
    pub check_rules: usize,
}
