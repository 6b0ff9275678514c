//! Re-entrant request evaluation.
//!
//! The host calls [`Evaluator::resume`] whenever something happens to a
//! request (pipeline entry, body data, body completion, abort). The
//! evaluator advances the request's [`RequestContext`] through
//! `Init -> AwaitingBody -> Ready -> Evaluated -> Done`, matching rules only
//! once the full request is available, and caches the verdict so later
//! invocations return it unchanged.

use std::{collections::HashSet, sync::Arc};

use tracing::{debug, info, warn};

use super::{
    compiler::Route,
    context::{Disposition, EvalState, Event, MatchRecord, RequestContext, Verdict},
    decision::DecisionEngine,
    matcher::{DefaultMatcher, PatternMatcher},
    request::{Field, RequestView},
    rule::{INTERNAL_RULE_ID, Score, Zone},
    scope::LocationScope,
    store::RuleIdx,
};

/// Score tag raised when a body exceeds the inspection limit.
pub const BODY_LIMIT_TAG: &str = "$BODY_LIMIT";

#[derive(Clone)]
pub struct Evaluator {
    matcher: Arc<dyn PatternMatcher>,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new(Arc::new(DefaultMatcher))
    }
}

impl std::fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Evaluator")
            .field("matcher", &self.matcher.name())
            .finish()
    }
}

impl Evaluator {
    pub fn new(matcher: Arc<dyn PatternMatcher>) -> Self {
        Self { matcher }
    }

    /// Advance `ctx` in response to `event`.
    ///
    /// Inactive scopes and internal requests are declined with
    /// [`Disposition::Continue`] before any state is touched. Once a verdict
    /// exists it is returned as-is and nothing is recomputed.
    pub fn resume(
        &self,
        scope: &LocationScope,
        ctx: &mut RequestContext,
        request: &RequestView,
        event: Event<'_>,
    ) -> Disposition {
        if let Some(verdict) = ctx.verdict() {
            return Disposition::Finish(verdict.clone());
        }
        if !scope.is_active() || request.internal {
            return Disposition::Continue;
        }

        match (ctx.state(), event) {
            (_, Event::Aborted) => return Disposition::Continue,
            (EvalState::Init, Event::Enter) => {
                if request.expects_body() {
                    ctx.advance(EvalState::AwaitingBody);
                    return Disposition::Suspend;
                }
                ctx.advance(EvalState::Ready);
            }
            (EvalState::Init | EvalState::AwaitingBody, Event::BodyChunk(chunk)) => {
                ctx.append_body(chunk);
                ctx.advance(EvalState::AwaitingBody);
                return Disposition::Suspend;
            }
            (EvalState::AwaitingBody, Event::Enter) => return Disposition::Suspend,
            (EvalState::Init | EvalState::AwaitingBody, Event::BodyComplete) => {
                ctx.advance(EvalState::Ready);
            }
            // Data arriving after readiness does not change what is inspected
            (EvalState::Ready | EvalState::Evaluated | EvalState::Done, _) => {}
        }

        if ctx.state() == EvalState::Ready {
            self.inspect(scope, ctx, request);
            ctx.advance(EvalState::Evaluated);
        }

        Disposition::Finish(self.conclude(scope, ctx, request))
    }

    fn inspect(&self, scope: &LocationScope, ctx: &mut RequestContext, request: &RequestView) {
        self.inspect_zone(scope, ctx, Zone::Url, &request.url_fields());
        self.inspect_zone(scope, ctx, Zone::Headers, &request.header_fields());
        self.inspect_zone(scope, ctx, Zone::Args, &request.arg_fields());

        let body_fields = request.body_fields(ctx.body());
        self.inspect_zone(scope, ctx, Zone::Body, &body_fields);

        if ctx.is_body_truncated() {
            warn!(
                scope = %scope.name,
                limit = ctx.body().len(),
                "request body exceeds inspection limit"
            );
            ctx.record_match(
                MatchRecord {
                    rule_id: INTERNAL_RULE_ID,
                    zone: Zone::Body,
                    name: None,
                },
                &[Score::new(BODY_LIMIT_TAG, 1)],
            );
        }
    }

    fn inspect_zone(
        &self,
        scope: &LocationScope,
        ctx: &mut RequestContext,
        zone: Zone,
        fields: &[Field],
    ) {
        let store = &scope.store;
        let match_names = matches!(zone, Zone::Args | Zone::Body);
        let mut seen: HashSet<(RuleIdx, usize)> = HashSet::new();

        for (rule, entry) in store.for_zone(zone) {
            let Some(pattern) = rule.pattern.as_ref() else {
                continue;
            };

            for (field_idx, field) in fields.iter().enumerate() {
                let name = field.name.as_deref();
                if let Route::Variable(loc) = entry.route {
                    let named = rule
                        .targets
                        .custom_locations
                        .get(loc)
                        .zip(name)
                        .is_some_and(|(location, name)| location.names(name));
                    if !named {
                        continue;
                    }
                }
                if seen.contains(&(entry.rule, field_idx)) {
                    continue;
                }

                let hit = self.matcher.is_match(pattern, &field.value)
                    || (match_names && name.is_some_and(|n| self.matcher.is_match(pattern, n)));
                if !hit {
                    continue;
                }
                seen.insert((entry.rule, field_idx));

                if store.is_whitelisted(rule.id, zone, name) {
                    debug!(rule_id = rule.id, zone = %zone, name, "match whitelisted");
                    continue;
                }

                debug!(
                    rule_id = rule.id,
                    zone = %zone,
                    name,
                    msg = rule.msg.as_deref().unwrap_or_default(),
                    "rule matched"
                );
                ctx.record_match(
                    MatchRecord {
                        rule_id: rule.id,
                        zone,
                        name: field.name.clone(),
                    },
                    &rule.scores,
                );
            }
        }
    }

    fn conclude(
        &self,
        scope: &LocationScope,
        ctx: &mut RequestContext,
        request: &RequestView,
    ) -> Verdict {
        let decision = DecisionEngine::decide(ctx.scores(), scope.store.check_rules());

        scope.counters.record_processed();
        if decision.block {
            scope.counters.record_blocked();
            if scope.learning {
                info!(
                    scope = %scope.name,
                    method = %request.method,
                    path = request.uri.path(),
                    scores = ?ctx.scores(),
                    "learning mode: request would have been blocked"
                );
            } else {
                warn!(
                    scope = %scope.name,
                    method = %request.method,
                    path = request.uri.path(),
                    scores = ?ctx.scores(),
                    "request blocked"
                );
            }
        }

        let verdict = Verdict {
            block: decision.block && !scope.learning,
            denied_url: scope.denied_url.clone(),
        };
        ctx.finish(decision, verdict)
    }
}
