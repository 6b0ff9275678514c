// The reference host's router: config file to engine to HTTP responses
#[cfg(test)]
mod test {
    use std::{io::Write, sync::Arc};

    use axum::{
        Router,
        body::Body,
        http::{Request, StatusCode, header},
    };
    use http_body_util::BodyExt;
    use scorewall::{
        HttpHandler, WafEngine,
        adapters::STATUS_PATH,
        config::{LocationConfig, ServerConfig, ServerConfigValidator},
    };
    use tempfile::NamedTempFile;
    use tower::ServiceExt; // for oneshot

    fn rules_file() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"MainRule "str:union select" "mz:ARGS|BODY" "s:$SQL:8" id:1000;"#
        )
        .unwrap();
        writeln!(
            file,
            r#"MainRule "str:<script" "mz:ARGS|BODY" "s:$XSS:8" id:1100;"#
        )
        .unwrap();
        file
    }

    fn app(rules: &NamedTempFile) -> (Router, Arc<WafEngine>) {
        app_with_limit(rules, 1024 * 1024)
    }

    fn app_with_limit(rules: &NamedTempFile, max_body_size: usize) -> (Router, Arc<WafEngine>) {
        let config = ServerConfig::builder()
            .max_body_size(max_body_size)
            .main_rules(rules.path().to_str().unwrap())
            .location(
                LocationConfig::new("/")
                    .directive("SecRulesEnabled")
                    .directive(r#"CheckRule "$SQL >= 8" BLOCK"#)
                    .directive(r#"CheckRule "$XSS >= 8" BLOCK"#)
                    .directive(r#"CheckRule "$BODY_LIMIT > 0" BLOCK"#),
            )
            .location(
                LocationConfig::new("/shop")
                    .directive("SecRulesEnabled")
                    .directive("DeniedUrl /denied")
                    .directive(r#"CheckRule "$SQL >= 8" BLOCK"#)
                    .directive("BasicRule wl:1100 \"mz:$ARGS_VAR:comment\""),
            )
            .build()
            .unwrap();
        ServerConfigValidator::validate(&config).unwrap();

        let engine = Arc::new(WafEngine::from_config(&config).unwrap());
        (HttpHandler::new(engine.clone(), None).router(), engine)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_clean_request_passes() {
        let rules = rules_file();
        let (app, _) = app(&rules);
        let response = app.oneshot(get("/hello?name=world")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("X-Request-ID"));
    }

    #[tokio::test]
    async fn test_attack_is_forbidden() {
        let rules = rules_file();
        let (app, _) = app(&rules);
        let response = app
            .oneshot(get("/search?q=1+union+select+password"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_location_redirects_and_whitelists() {
        let rules = rules_file();
        let (app, _) = app(&rules);

        let response = app
            .clone()
            .oneshot(get("/shop/item?id=1+union+select+1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers().get(header::LOCATION).unwrap(), "/denied");

        // rule 1100 is whitelisted for the comment argument only
        let response = app
            .oneshot(get("/shop/item?comment=%3Cscript%3E"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_form_body_is_inspected() {
        let rules = rules_file();
        let (app, _) = app(&rules);
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/login")
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from("user=admin&pass=x%27+union+select+1"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_encoded_and_dot_segment_paths_use_their_location() {
        let rules = rules_file();
        let (app, engine) = app(&rules);

        for uri in [
            "/%73hop/item?id=1+union+select+1",
            "/x/../shop/item?id=1+union+select+1",
            "/shop/./item?id=1+union+select+1",
        ] {
            let response = app.clone().oneshot(get(uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::FOUND, "{uri}");
            assert_eq!(response.headers().get(header::LOCATION).unwrap(), "/denied");
        }
        assert_eq!(engine.snapshots()[0].requests_processed, 0);
        assert_eq!(engine.snapshots()[1].requests_blocked, 3);
    }

    #[tokio::test]
    async fn test_body_over_limit_is_blocked() {
        let rules = rules_file();
        let (app, engine) = app_with_limit(&rules, 64);
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/upload")
                    .body(Body::from(vec![b'a'; 8 * 1024 * 1024]))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(engine.snapshots()[0].requests_blocked, 1);
    }

    #[tokio::test]
    async fn test_status_reports_counters() {
        let rules = rules_file();
        let (app, engine) = app(&rules);

        app.clone()
            .oneshot(get("/search?q=union+select"))
            .await
            .unwrap();
        app.clone().oneshot(get("/search?q=hello")).await.unwrap();

        let response = app.oneshot(get(STATUS_PATH)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        let root = &json["locations"][0];
        assert_eq!(root["name"], "/");
        assert_eq!(root["requests_blocked"], 1);
        // the status request itself is inspected too
        assert_eq!(root["requests_processed"], 3);
        assert_eq!(engine.snapshots()[1].requests_processed, 0);
    }
}
