// End-to-end evaluation through WafEngine: body delivery, idempotence,
// learning mode and threshold decisions
#[cfg(test)]
mod test {
    use std::collections::HashMap;

    use http::{HeaderMap, Method};
    use scorewall::{
        WafEngine,
        config::parse_directives,
        core::waf::{
            CheckRuleParser, DecisionEngine, Disposition, EvalState, Event, LocationTable,
            RequestView, ScopeBuilder, scope::compile_main_rules,
        },
    };

    const MAIN: &str = r#"
        MainRule "str:union select" "msg:sql union" "mz:ARGS|BODY" "s:$SQL:8" id:1000;
        MainRule "str:<script" "msg:script tag" "mz:ARGS|BODY" "s:$XSS:8" id:1100;
    "#;

    fn engine(location: &str) -> WafEngine {
        let main = compile_main_rules(&parse_directives("main", MAIN).unwrap()).unwrap();
        let directives = parse_directives("location", location).unwrap();
        let scope = ScopeBuilder::new("/", &main)
            .unwrap()
            .apply_all(&directives)
            .unwrap()
            .build();
        let mut table = LocationTable::new();
        table.insert("/", scope);
        WafEngine::new(table, 4096)
    }

    fn post(uri: &str) -> RequestView {
        RequestView::new(Method::POST, uri.parse().unwrap(), HeaderMap::new())
    }

    const ENFORCING: &str = r#"SecRulesEnabled; CheckRule "$SQL >= 8" BLOCK;"#;

    #[test]
    fn test_two_chunk_body_is_matched_once_after_completion() {
        let engine = engine(ENFORCING);
        let scope = engine.scope_for("/login").unwrap().clone();
        let request = post("/login");
        let mut ctx = engine.new_context();

        assert_eq!(
            engine.resume(&scope, &mut ctx, &request, Event::Enter),
            Disposition::Suspend
        );
        assert_eq!(ctx.state(), EvalState::AwaitingBody);

        assert_eq!(
            engine.resume(&scope, &mut ctx, &request, Event::BodyChunk(b"user=x' uni")),
            Disposition::Suspend
        );
        assert!(ctx.matches().is_empty());
        assert_eq!(
            engine.resume(&scope, &mut ctx, &request, Event::BodyChunk(b"on select 1")),
            Disposition::Suspend
        );
        assert!(ctx.matches().is_empty());
        assert_eq!(ctx.score("$SQL"), 0);

        let disposition = engine.resume(&scope, &mut ctx, &request, Event::BodyComplete);
        assert!(matches!(disposition, Disposition::Finish(ref v) if v.block));
        assert_eq!(ctx.matches().len(), 1);
        assert_eq!(ctx.matches()[0].rule_id, 1000);
        assert_eq!(ctx.score("$SQL"), 8);
        assert_eq!(ctx.state(), EvalState::Done);
    }

    #[test]
    fn test_reinvoking_done_changes_nothing() {
        let engine = engine(ENFORCING);
        let scope = engine.scope_for("/").unwrap().clone();
        let request = RequestView::new(
            Method::GET,
            "/search?q=union+select".parse().unwrap(),
            HeaderMap::new(),
        );
        let mut ctx = engine.new_context();

        let first = engine.resume(&scope, &mut ctx, &request, Event::Enter);
        let scores = ctx.scores().clone();
        let snapshot = scope.snapshot();

        for event in [
            Event::Enter,
            Event::BodyChunk(b"union select"),
            Event::BodyComplete,
            Event::Aborted,
        ] {
            assert_eq!(engine.resume(&scope, &mut ctx, &request, event), first);
        }
        assert_eq!(ctx.scores(), &scores);
        assert_eq!(ctx.matches().len(), 1);

        let after = scope.snapshot();
        assert_eq!(after.requests_processed, snapshot.requests_processed);
        assert_eq!(after.requests_blocked, snapshot.requests_blocked);
        assert_eq!(after.requests_processed, 1);
    }

    #[test]
    fn test_learning_mode_computes_but_allows() {
        let engine = engine(&format!("{ENFORCING} LearningMode;"));
        let scope = engine.scope_for("/").unwrap().clone();
        let request = RequestView::new(
            Method::GET,
            "/search?q=union+select".parse().unwrap(),
            HeaderMap::new(),
        );
        let mut ctx = engine.new_context();

        let disposition = engine.resume(&scope, &mut ctx, &request, Event::Enter);
        assert!(matches!(disposition, Disposition::Finish(ref v) if !v.block));
        assert_eq!(ctx.score("$SQL"), 8);
        assert!(ctx.decision().unwrap().block);

        let snapshot = scope.snapshot();
        assert!(snapshot.learning);
        assert_eq!(snapshot.requests_processed, 1);
        assert_eq!(snapshot.requests_blocked, 1);
    }

    #[test]
    fn test_aborted_body_declines_without_counting() {
        let engine = engine(ENFORCING);
        let scope = engine.scope_for("/").unwrap().clone();
        let request = post("/upload");
        let mut ctx = engine.new_context();

        engine.resume(&scope, &mut ctx, &request, Event::Enter);
        engine.resume(&scope, &mut ctx, &request, Event::BodyChunk(b"union"));
        assert_eq!(
            engine.resume(&scope, &mut ctx, &request, Event::Aborted),
            Disposition::Continue
        );
        assert!(ctx.verdict().is_none());
        assert_eq!(scope.snapshot().requests_processed, 0);
    }

    #[test]
    fn test_upload_threshold() {
        let check_rules = vec![CheckRuleParser::parse("$UPLOAD > 5", "BLOCK").unwrap()];

        let scores = HashMap::from([("$UPLOAD".to_string(), 10)]);
        assert!(DecisionEngine::decide(&scores, &check_rules).block);

        let scores = HashMap::from([("$UPLOAD".to_string(), 3)]);
        assert!(!DecisionEngine::decide(&scores, &check_rules).block);
    }

    #[test]
    fn test_longest_location_prefix_governs() {
        let main = compile_main_rules(&parse_directives("main", MAIN).unwrap()).unwrap();
        let mut table = LocationTable::new();
        for (prefix, directives) in [("/", ENFORCING), ("/public", "SecRulesDisabled;")] {
            let scope = ScopeBuilder::new(prefix, &main)
                .unwrap()
                .apply_all(&parse_directives(prefix, directives).unwrap())
                .unwrap()
                .build();
            table.insert(prefix, scope);
        }
        let engine = WafEngine::new(table, 4096);

        let request = RequestView::new(
            Method::GET,
            "/public/search?q=union+select".parse().unwrap(),
            HeaderMap::new(),
        );
        let scope = engine.scope_for(request.uri.path()).unwrap().clone();
        assert_eq!(scope.name, "/public");

        let mut ctx = engine.new_context();
        assert_eq!(
            engine.resume(&scope, &mut ctx, &request, Event::Enter),
            Disposition::Continue
        );
    }

    #[test]
    fn test_encoded_path_cannot_escape_its_location() {
        let main = compile_main_rules(&parse_directives("main", MAIN).unwrap()).unwrap();
        let mut table = LocationTable::new();
        for (prefix, directives) in [("/", "SecRulesDisabled;"), ("/admin", ENFORCING)] {
            let scope = ScopeBuilder::new(prefix, &main)
                .unwrap()
                .apply_all(&parse_directives(prefix, directives).unwrap())
                .unwrap()
                .build();
            table.insert(prefix, scope);
        }
        let engine = WafEngine::new(table, 4096);

        for uri in [
            "/%61dmin?q=union+select",
            "/x/../admin?q=union+select",
            "/public/%2e%2e/admin/users?q=union+select",
        ] {
            let request = RequestView::new(Method::GET, uri.parse().unwrap(), HeaderMap::new());
            let scope = engine.scope_for(request.uri.path()).unwrap().clone();
            assert_eq!(scope.name, "/admin", "{uri}");

            let mut ctx = engine.new_context();
            let disposition = engine.resume(&scope, &mut ctx, &request, Event::Enter);
            assert!(matches!(disposition, Disposition::Finish(ref v) if v.block), "{uri}");
        }
    }
}
