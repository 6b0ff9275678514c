//! Per-request evaluation state.

use std::collections::HashMap;

use super::{
    decision::Decision,
    rule::{RuleId, Score, Zone},
};

/// Lifecycle of one request's evaluation. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EvalState {
    Init,
    AwaitingBody,
    Ready,
    Evaluated,
    Done,
}

/// What the host reports when it (re-)invokes the evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event<'a> {
    /// The request reached the inspection phase of the pipeline
    Enter,
    BodyChunk(&'a [u8]),
    BodyComplete,
    /// The client went away before the body arrived
    Aborted,
}

/// Instruction returned to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Not inspected (or not yet decidable); let the request proceed
    Continue,
    /// Waiting for the body; invoke again with further events
    Suspend,
    Finish(Verdict),
}

/// Surfaced outcome for the host to enact.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Verdict {
    pub block: bool,
    pub denied_url: Option<String>,
}

/// A rule that matched and was not whitelisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchRecord {
    pub rule_id: RuleId,
    pub zone: Zone,
    pub name: Option<String>,
}

/// Mutable state owned by one in-flight request.
#[derive(Debug)]
pub struct RequestContext {
    state: EvalState,
    scores: HashMap<String, i64>,
    body: Vec<u8>,
    body_truncated: bool,
    max_body_size: usize,
    matches: Vec<MatchRecord>,
    decision: Option<Decision>,
    verdict: Option<Verdict>,
}

impl RequestContext {
    pub fn new(max_body_size: usize) -> Self {
        Self {
            state: EvalState::Init,
            scores: HashMap::new(),
            body: Vec::new(),
            body_truncated: false,
            max_body_size,
            matches: Vec::new(),
            decision: None,
            verdict: None,
        }
    }

    pub fn state(&self) -> EvalState {
        self.state
    }

    pub fn scores(&self) -> &HashMap<String, i64> {
        &self.scores
    }

    /// Accumulated score for `tag`, 0 when nothing contributed to it.
    pub fn score(&self, tag: &str) -> i64 {
        self.scores.get(tag).copied().unwrap_or(0)
    }

    pub fn matches(&self) -> &[MatchRecord] {
        &self.matches
    }

    /// The computed decision, before learning mode is applied.
    pub fn decision(&self) -> Option<&Decision> {
        self.decision.as_ref()
    }

    pub fn verdict(&self) -> Option<&Verdict> {
        self.verdict.as_ref()
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn is_body_truncated(&self) -> bool {
        self.body_truncated
    }

    pub(crate) fn advance(&mut self, state: EvalState) {
        debug_assert!(state >= self.state);
        self.state = state;
    }

    /// Buffer a body chunk, keeping at most `max_body_size` bytes.
    pub(crate) fn append_body(&mut self, chunk: &[u8]) {
        let room = self.max_body_size.saturating_sub(self.body.len());
        if chunk.len() > room {
            self.body_truncated = true;
        }
        self.body.extend_from_slice(&chunk[..chunk.len().min(room)]);
    }

    pub(crate) fn add_score(&mut self, tag: &str, value: i64) {
        let entry = self.scores.entry(tag.to_string()).or_insert(0);
        *entry = entry.saturating_add(value);
    }

    pub(crate) fn record_match(&mut self, record: MatchRecord, scores: &[Score]) {
        for score in scores {
            self.add_score(&score.tag, score.value);
        }
        self.matches.push(record);
    }

    pub(crate) fn finish(&mut self, decision: Decision, verdict: Verdict) -> Verdict {
        self.decision = Some(decision);
        self.verdict = Some(verdict.clone());
        self.advance(EvalState::Done);
        verdict
    }
}
