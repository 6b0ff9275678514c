//! Prefix lookup from request path to location scope.

use std::{borrow::Cow, sync::Arc};

use super::scope::LocationScope;

/// Location scopes keyed by path prefix; lookups pick the longest prefix.
#[derive(Debug, Default, Clone)]
pub struct LocationTable {
    entries: Vec<(String, Arc<LocationScope>)>,
}

impl LocationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `scope` under `prefix`, replacing any scope already there.
    pub fn insert(&mut self, prefix: impl Into<String>, scope: LocationScope) {
        let prefix = prefix.into();
        let scope = Arc::new(scope);
        match self.entries.iter_mut().find(|(p, _)| *p == prefix) {
            Some(entry) => entry.1 = scope,
            None => self.entries.push((prefix, scope)),
        }
    }

    /// Scope for `path`, matched after [`normalize_path`].
    pub fn find(&self, path: &str) -> Option<&Arc<LocationScope>> {
        let path = normalize_path(path);
        self.entries
            .iter()
            .filter(|(prefix, _)| path.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, scope)| scope)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<LocationScope>)> {
        self.entries
            .iter()
            .map(|(prefix, scope)| (prefix.as_str(), scope))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Percent-decode `path`, merge repeated slashes and resolve `.` and `..`
/// segments. `..` never climbs above the root.
pub fn normalize_path(path: &str) -> String {
    let decoded = match urlencoding::decode_binary(path.as_bytes()) {
        Cow::Borrowed(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        Cow::Owned(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
    };

    let mut segments: Vec<&str> = Vec::new();
    for segment in decoded.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            segment => segments.push(segment),
        }
    }

    let trailing = decoded.ends_with('/') || decoded.ends_with("/.") || decoded.ends_with("/..");
    let mut normalized = String::with_capacity(decoded.len() + 1);
    for segment in &segments {
        normalized.push('/');
        normalized.push_str(segment);
    }
    if trailing || segments.is_empty() {
        normalized.push('/');
    }
    normalized
}
