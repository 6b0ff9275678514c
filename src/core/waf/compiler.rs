//! Rule compilation and target classification.
//!
//! A rule directive is an ordered list of `key:value` tokens:
//!
//! ```text
//! MainRule "rx:select.+from" "msg:sql select" "mz:ARGS|$HEADERS_VAR:cookie" "s:$SQL:8" id:1000;
//! BasicRule wl:1000 "mz:$ARGS_VAR:query";
//! ```
//!
//! [`RuleCompiler::compile`] turns the tokens into a [`Rule`] and
//! [`RuleCompiler::classify`] decides which collections of a
//! [`RuleStore`](super::store::RuleStore) must reference it.

use regex::RegexBuilder;

use super::{
    error::{ConfigError, ConfigErrorKind},
    rule::{CustomLocation, Pattern, Rule, RuleId, Score, Targets},
};

/// Collections a rule can be routed into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Whitelist,
    Header,
    Body,
    /// Generic rules, matched against the URL
    Url,
    /// GET argument rules
    Args,
}

/// Why a rule sits in a collection: the zone-wide flag, or one of its custom
/// locations (by index into `Targets::custom_locations`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Zone,
    Variable(usize),
}

/// Parses rule directives and classifies the result.
pub struct RuleCompiler;

impl RuleCompiler {
    /// Compile the arguments of a `MainRule`/`BasicRule` directive (keyword
    /// excluded).
    pub fn compile(args: &[String]) -> Result<Rule, ConfigError> {
        let mut id: Option<RuleId> = None;
        let mut msg = None;
        let mut pattern = None;
        let mut scores = Vec::new();
        let mut targets: Option<Targets> = None;
        let mut whitelist = Vec::new();

        for token in args {
            let (key, value) = token
                .split_once(':')
                .ok_or_else(|| ConfigError::new(ConfigErrorKind::UnknownField, token))?;

            match key {
                "id" => {
                    id = Some(
                        value
                            .parse()
                            .map_err(|_| ConfigError::new(ConfigErrorKind::InvalidId, token))?,
                    );
                }
                "msg" => msg = Some(value.to_string()),
                "str" => {
                    if value.is_empty() {
                        return Err(ConfigError::new(
                            ConfigErrorKind::InvalidPattern("empty literal".to_string()),
                            token,
                        ));
                    }
                    pattern = Some(Pattern::literal(value));
                }
                "rx" => {
                    let regex = RegexBuilder::new(value)
                        .case_insensitive(true)
                        .build()
                        .map_err(|e| {
                            ConfigError::new(ConfigErrorKind::InvalidPattern(e.to_string()), token)
                        })?;
                    pattern = Some(Pattern::Regex(regex));
                }
                "s" => scores = Self::parse_scores(value, token)?,
                "mz" => targets = Some(Self::parse_zones(value, token)?),
                "wl" => whitelist = Self::parse_whitelist(value, token)?,
                _ => return Err(ConfigError::new(ConfigErrorKind::UnknownField, token)),
            }
        }

        let directive = args.join(" ");
        if !whitelist.is_empty() {
            return Ok(Rule {
                id: id.unwrap_or_default(),
                msg,
                pattern,
                scores,
                targets: targets.unwrap_or_default(),
                whitelist,
            });
        }

        let id = id.ok_or_else(|| ConfigError::new(ConfigErrorKind::MissingField("id"), &directive))?;
        let pattern = pattern
            .ok_or_else(|| ConfigError::new(ConfigErrorKind::MissingField("str|rx"), &directive))?;
        let targets =
            targets.ok_or_else(|| ConfigError::new(ConfigErrorKind::MissingField("mz"), &directive))?;
        if scores.is_empty() {
            return Err(ConfigError::new(ConfigErrorKind::MissingField("s"), &directive));
        }

        Ok(Rule {
            id,
            msg,
            pattern: Some(pattern),
            scores,
            targets,
            whitelist,
        })
    }

    /// Every `(collection, route)` pair the rule must be inserted under, in
    /// insertion order. Whitelist rules go to the whitelist collection only,
    /// whatever their targets say.
    pub fn classify(rule: &Rule) -> Vec<(Collection, Route)> {
        if rule.is_whitelist() {
            return vec![(Collection::Whitelist, Route::Zone)];
        }

        let targets = &rule.targets;
        let mut routes = Vec::new();
        if targets.headers {
            routes.push((Collection::Header, Route::Zone));
        }
        if targets.body {
            routes.push((Collection::Body, Route::Zone));
        }
        if targets.url {
            routes.push((Collection::Url, Route::Zone));
        }
        if targets.args {
            routes.push((Collection::Args, Route::Zone));
        }
        for (idx, location) in targets.custom_locations.iter().enumerate() {
            if location.args_var {
                routes.push((Collection::Args, Route::Variable(idx)));
            }
            if location.body_var {
                routes.push((Collection::Body, Route::Variable(idx)));
            }
            if location.headers_var {
                routes.push((Collection::Header, Route::Variable(idx)));
            }
        }
        routes
    }

    fn parse_zones(value: &str, token: &str) -> Result<Targets, ConfigError> {
        let mut targets = Targets::default();
        for zone in value.split('|') {
            let unknown = || ConfigError::new(ConfigErrorKind::UnknownZone, token);
            match zone {
                "ARGS" => targets.args = true,
                "HEADERS" => targets.headers = true,
                "BODY" => targets.body = true,
                "URL" => targets.url = true,
                _ => {
                    let (kind, name) = zone.split_once(':').ok_or_else(unknown)?;
                    if name.is_empty() {
                        return Err(unknown());
                    }
                    let location = match kind {
                        "$ARGS_VAR" => CustomLocation::args(name),
                        "$BODY_VAR" => CustomLocation::body(name),
                        "$HEADERS_VAR" => CustomLocation::headers(name),
                        _ => return Err(unknown()),
                    };
                    targets.custom_locations.push(location);
                }
            }
        }
        Ok(targets)
    }

    fn parse_scores(value: &str, token: &str) -> Result<Vec<Score>, ConfigError> {
        value
            .split(',')
            .map(|entry| {
                let invalid = || ConfigError::new(ConfigErrorKind::InvalidScore, token);
                let (tag, score) = entry.rsplit_once(':').ok_or_else(invalid)?;
                if !tag.starts_with('$') || tag.len() < 2 {
                    return Err(invalid());
                }
                let score = score.parse::<i64>().map_err(|_| invalid())?;
                Ok(Score::new(tag, score))
            })
            .collect()
    }

    fn parse_whitelist(value: &str, token: &str) -> Result<Vec<RuleId>, ConfigError> {
        value
            .split(',')
            .map(|id| match id.parse::<RuleId>() {
                Ok(id) if id != 0 => Ok(id),
                _ => Err(ConfigError::new(ConfigErrorKind::InvalidWhitelist, token)),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::waf::rule::Zone;

    fn tokens(line: &[&str]) -> Vec<String> {
        line.iter().map(|t| t.to_string()).collect()
    }

    fn collections(rule: &Rule) -> Vec<Collection> {
        RuleCompiler::classify(rule)
            .into_iter()
            .map(|(collection, _)| collection)
            .collect()
    }

    #[test]
    fn test_compile_full_rule() {
        let rule = RuleCompiler::compile(&tokens(&[
            "str:<script",
            "msg:html open tag",
            "mz:ARGS|URL",
            "s:$XSS:8,$ATTACK:2",
            "id:1302",
        ]))
        .unwrap();

        assert_eq!(rule.id, 1302);
        assert_eq!(rule.msg.as_deref(), Some("html open tag"));
        assert!(rule.targets.args && rule.targets.url);
        assert_eq!(
            rule.scores,
            vec![Score::new("$XSS", 8), Score::new("$ATTACK", 2)]
        );
        assert!(!rule.is_whitelist());
    }

    #[test]
    fn test_single_flag_rule_lands_in_one_collection() {
        let rule =
            RuleCompiler::compile(&tokens(&["str:../", "mz:URL", "s:$TRAVERSAL:4", "id:1200"]))
                .unwrap();
        assert_eq!(collections(&rule), vec![Collection::Url]);
    }

    #[test]
    fn test_multi_flag_rule_lands_in_every_collection() {
        let rule = RuleCompiler::compile(&tokens(&[
            "rx:select.+from",
            "mz:ARGS|BODY|URL|HEADERS",
            "s:$SQL:8",
            "id:1000",
        ]))
        .unwrap();
        assert_eq!(
            collections(&rule),
            vec![
                Collection::Header,
                Collection::Body,
                Collection::Url,
                Collection::Args
            ]
        );
    }

    #[test]
    fn test_custom_locations_route_like_global_flags() {
        let rule = RuleCompiler::compile(&tokens(&[
            "str:0x",
            "mz:$ARGS_VAR:id|$BODY_VAR:id|$HEADERS_VAR:cookie",
            "s:$SQL:2",
            "id:1002",
        ]))
        .unwrap();
        assert_eq!(
            RuleCompiler::classify(&rule),
            vec![
                (Collection::Args, Route::Variable(0)),
                (Collection::Body, Route::Variable(1)),
                (Collection::Header, Route::Variable(2)),
            ]
        );
    }

    #[test]
    fn test_global_flag_and_custom_location_are_not_deduplicated() {
        let rule = RuleCompiler::compile(&tokens(&[
            "str:eval(",
            "mz:ARGS|$ARGS_VAR:cmd",
            "s:$RCE:8",
            "id:1500",
        ]))
        .unwrap();
        assert_eq!(
            RuleCompiler::classify(&rule),
            vec![
                (Collection::Args, Route::Zone),
                (Collection::Args, Route::Variable(0)),
            ]
        );
    }

    #[test]
    fn test_whitelist_overrides_targets() {
        let rule = RuleCompiler::compile(&tokens(&["wl:1000,1001", "mz:ARGS|BODY|HEADERS"])).unwrap();
        assert!(rule.is_whitelist());
        assert_eq!(rule.whitelist, vec![1000, 1001]);
        assert_eq!(collections(&rule), vec![Collection::Whitelist]);
        assert!(rule.suppresses(1001, Zone::Body, None));
    }

    #[test]
    fn test_whitelist_id_zero_is_rejected() {
        let err = RuleCompiler::compile(&tokens(&["wl:0"])).unwrap_err();
        assert_eq!(err.kind, ConfigErrorKind::InvalidWhitelist);
        assert_eq!(err.token, "wl:0");
    }

    #[test]
    fn test_missing_required_fields() {
        let err = RuleCompiler::compile(&tokens(&["str:x", "mz:URL", "s:$A:1"])).unwrap_err();
        assert_eq!(err.kind, ConfigErrorKind::MissingField("id"));

        let err = RuleCompiler::compile(&tokens(&["mz:URL", "s:$A:1", "id:5"])).unwrap_err();
        assert_eq!(err.kind, ConfigErrorKind::MissingField("str|rx"));

        let err = RuleCompiler::compile(&tokens(&["str:x", "s:$A:1", "id:5"])).unwrap_err();
        assert_eq!(err.kind, ConfigErrorKind::MissingField("mz"));

        let err = RuleCompiler::compile(&tokens(&["str:x", "mz:URL", "id:5"])).unwrap_err();
        assert_eq!(err.kind, ConfigErrorKind::MissingField("s"));
    }

    #[test]
    fn test_unknown_zone_names_token() {
        let err =
            RuleCompiler::compile(&tokens(&["str:x", "mz:ARGS|COOKIES", "s:$A:1", "id:5"]))
                .unwrap_err();
        assert_eq!(err.kind, ConfigErrorKind::UnknownZone);
        assert_eq!(err.token, "mz:ARGS|COOKIES");
    }

    #[test]
    fn test_unknown_field_and_bad_regex() {
        let err = RuleCompiler::compile(&tokens(&["negative", "id:1"])).unwrap_err();
        assert_eq!(err.kind, ConfigErrorKind::UnknownField);

        let err = RuleCompiler::compile(&tokens(&["rx:(unclosed", "mz:URL", "s:$A:1", "id:5"]))
            .unwrap_err();
        assert!(matches!(err.kind, ConfigErrorKind::InvalidPattern(_)));
        assert_eq!(err.token, "rx:(unclosed");
    }

    #[test]
    fn test_invalid_score_shapes() {
        for bad in ["s:SQL:8", "s:$:8", "s:$SQL", "s:$SQL:eight"] {
            let err = RuleCompiler::compile(&tokens(&["str:x", "mz:URL", bad, "id:5"]))
                .unwrap_err();
            assert_eq!(err.kind, ConfigErrorKind::InvalidScore, "{bad}");
        }
    }

    #[test]
    fn test_negative_score_is_allowed() {
        let rule =
            RuleCompiler::compile(&tokens(&["str:x", "mz:URL", "s:$TRUST:-5", "id:9"])).unwrap();
        assert_eq!(rule.scores, vec![Score::new("$TRUST", -5)]);
    }
}
