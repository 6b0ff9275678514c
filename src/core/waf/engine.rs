//! WAF engine tying configured locations to the evaluator

use std::sync::Arc;

use eyre::{Context, Result};
use tracing::{debug, info};

use super::{
    context::{Disposition, Event, RequestContext},
    evaluator::Evaluator,
    location::LocationTable,
    matcher::PatternMatcher,
    request::RequestView,
    rule::Rule,
    scope::{LocationScope, ScopeBuilder, ScopeSnapshot, compile_main_rules},
};
use crate::config::{
    ServerConfig,
    directives::{Directive, parse_directives},
    loader::load_directive_file,
    models::LocationConfig,
};

/// Compiled locations plus the evaluator that inspects requests against them
#[derive(Debug)]
pub struct WafEngine {
    locations: LocationTable,
    evaluator: Evaluator,
    max_body_size: usize,
}

impl WafEngine {
    /// Create a new WAF engine from configuration
    ///
    /// Reads every referenced directive file, compiles main rules once and
    /// builds one scope per location. Any malformed directive aborts the
    /// whole load.
    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        let mut main_directives = Vec::new();
        for path in &config.main_rules {
            main_directives.extend(load_directive_file(path)?);
        }
        let main_rules =
            compile_main_rules(&main_directives).wrap_err("Failed to compile main rules")?;
        info!(count = main_rules.len(), "compiled main rules");

        let mut locations = LocationTable::new();
        for location in &config.locations {
            let scope = Self::build_scope(location, &main_rules)
                .wrap_err_with(|| format!("Invalid location '{}'", location.prefix))?;
            info!(
                location = %location.prefix,
                active = scope.is_active(),
                learning = scope.learning,
                rules = scope.store.rules().len(),
                check_rules = scope.store.check_rules().len(),
                "location scope ready"
            );
            locations.insert(location.prefix.clone(), scope);
        }

        Ok(Self::new(locations, config.max_body_size))
    }

    pub fn new(locations: LocationTable, max_body_size: usize) -> Self {
        Self {
            locations,
            evaluator: Evaluator::default(),
            max_body_size,
        }
    }

    /// Replace the pattern matching implementation
    pub fn with_matcher(mut self, matcher: Arc<dyn PatternMatcher>) -> Self {
        self.evaluator = Evaluator::new(matcher);
        self
    }

    fn build_scope(location: &LocationConfig, main_rules: &[Rule]) -> Result<LocationScope> {
        let mut directives: Vec<Directive> = Vec::new();
        for path in &location.rules_files {
            directives.extend(load_directive_file(path)?);
        }
        for (i, text) in location.directives.iter().enumerate() {
            let origin = format!("location '{}' directive {}", location.prefix, i + 1);
            directives.extend(parse_directives(&origin, text)?);
        }
        debug!(location = %location.prefix, count = directives.len(), "applying directives");

        Ok(ScopeBuilder::new(location.prefix.clone(), main_rules)?
            .apply_all(&directives)?
            .build())
    }

    /// Scope governing `path`, by longest prefix of its normalized form.
    pub fn scope_for(&self, path: &str) -> Option<&Arc<LocationScope>> {
        self.locations.find(path)
    }

    pub fn new_context(&self) -> RequestContext {
        RequestContext::new(self.max_body_size)
    }

    pub fn resume(
        &self,
        scope: &LocationScope,
        ctx: &mut RequestContext,
        request: &RequestView,
        event: Event<'_>,
    ) -> Disposition {
        self.evaluator.resume(scope, ctx, request, event)
    }

    pub fn locations(&self) -> &LocationTable {
        &self.locations
    }

    pub fn max_body_size(&self) -> usize {
        self.max_body_size
    }

    /// Counter snapshots of every location, in configuration order
    pub fn snapshots(&self) -> Vec<ScopeSnapshot> {
        self.locations
            .iter()
            .map(|(_, scope)| scope.snapshot())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use http::{HeaderMap, Method};
    use tempfile::NamedTempFile;

    use super::*;
    use crate::config::models::LocationConfig;

    fn rules_file(text: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{text}").unwrap();
        file
    }

    #[test]
    fn test_from_config_builds_each_location() {
        let main = rules_file(r#"MainRule "str:union select" "mz:ARGS" "s:$SQL:8" id:1000;"#);
        let config = ServerConfig::builder()
            .main_rules(main.path().to_str().unwrap())
            .location(
                LocationConfig::new("/")
                    .directive("SecRulesEnabled")
                    .directive(r#"CheckRule "$SQL >= 8" BLOCK"#),
            )
            .location(LocationConfig::new("/static"))
            .build()
            .unwrap();

        let engine = WafEngine::from_config(&config).unwrap();
        assert_eq!(engine.locations().len(), 2);

        let root = engine.scope_for("/search").unwrap();
        assert!(root.is_active());
        assert_eq!(root.store.rules().len(), 1);
        assert!(!engine.scope_for("/static/app.js").unwrap().is_active());

        let request = RequestView::new(
            Method::GET,
            "/search?q=union+select".parse().unwrap(),
            HeaderMap::new(),
        );
        let mut ctx = engine.new_context();
        let disposition = engine.resume(root, &mut ctx, &request, Event::Enter);
        assert!(matches!(disposition, Disposition::Finish(v) if v.block));
        assert_eq!(engine.snapshots()[0].requests_blocked, 1);
    }

    #[test]
    fn test_location_rules_file_applies_before_inline_directives() {
        let location_rules = rules_file("SecRulesEnabled;\nDeniedUrl /from-file;");
        let config = ServerConfig::builder()
            .location(
                LocationConfig::new("/")
                    .rules_file(location_rules.path().to_str().unwrap())
                    .directive("DeniedUrl /inline"),
            )
            .build()
            .unwrap();

        let engine = WafEngine::from_config(&config).unwrap();
        let scope = engine.scope_for("/").unwrap();
        assert!(scope.is_active());
        assert_eq!(scope.denied_url.as_deref(), Some("/inline"));
    }

    #[test]
    fn test_malformed_directive_fails_whole_load() {
        let config = ServerConfig::builder()
            .location(LocationConfig::new("/ok").directive("SecRulesEnabled"))
            .location(LocationConfig::new("/bad").directive(r#"CheckRule "$SQL >= 8" BLOCKED"#))
            .build()
            .unwrap();

        let err = WafEngine::from_config(&config).unwrap_err();
        let chain = format!("{err:?}");
        assert!(chain.contains("Invalid location '/bad'"), "{chain}");
    }

    #[test]
    fn test_main_rule_file_rejects_location_directives() {
        let main = rules_file("SecRulesEnabled;");
        let config = ServerConfig::builder()
            .main_rules(main.path().to_str().unwrap())
            .location(LocationConfig::new("/"))
            .build()
            .unwrap();
        assert!(WafEngine::from_config(&config).is_err());
    }
}
