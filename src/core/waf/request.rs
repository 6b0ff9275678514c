//! Host-supplied request data and per-zone field extraction.

use std::borrow::Cow;

use http::{HeaderMap, Method, Uri, header, request::Parts};
use url::form_urlencoded;

/// One inspectable value, with its variable name where the zone has names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: Option<String>,
    pub value: String,
}

impl Field {
    fn named(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            value: value.into(),
        }
    }

    fn unnamed(value: impl Into<String>) -> Self {
        Self {
            name: None,
            value: value.into(),
        }
    }
}

/// The request as the evaluator sees it. The body is delivered separately
/// through evaluation events.
#[derive(Debug, Clone)]
pub struct RequestView {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    /// Subrequests and other host-generated requests are never inspected
    pub internal: bool,
}

impl RequestView {
    pub fn new(method: Method, uri: Uri, headers: HeaderMap) -> Self {
        Self {
            method,
            uri,
            headers,
            internal: false,
        }
    }

    pub fn from_parts(parts: &Parts) -> Self {
        Self::new(parts.method.clone(), parts.uri.clone(), parts.headers.clone())
    }

    pub fn internal(mut self, internal: bool) -> Self {
        self.internal = internal;
        self
    }

    /// POST and PUT requests are evaluated only once their body is in.
    pub fn expects_body(&self) -> bool {
        self.method == Method::POST || self.method == Method::PUT
    }

    /// Percent-decoded request path.
    pub fn url_fields(&self) -> Vec<Field> {
        vec![Field::unnamed(percent_decode(self.uri.path()))]
    }

    /// Query string arguments, form-decoded.
    pub fn arg_fields(&self) -> Vec<Field> {
        self.uri
            .query()
            .map(|query| form_fields(query.as_bytes()))
            .unwrap_or_default()
    }

    pub fn header_fields(&self) -> Vec<Field> {
        self.headers
            .iter()
            .map(|(name, value)| {
                Field::named(name.as_str(), String::from_utf8_lossy(value.as_bytes()))
            })
            .collect()
    }

    /// Body fields: name/value pairs for urlencoded forms, otherwise the
    /// whole body as one unnamed value.
    pub fn body_fields(&self, body: &[u8]) -> Vec<Field> {
        if body.is_empty() {
            return Vec::new();
        }
        if self.is_form_encoded() {
            form_fields(body)
        } else {
            vec![Field::unnamed(String::from_utf8_lossy(body))]
        }
    }

    fn is_form_encoded(&self) -> bool {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(';').next())
            .is_some_and(|mime| {
                mime.trim()
                    .eq_ignore_ascii_case("application/x-www-form-urlencoded")
            })
    }
}

fn percent_decode(input: &str) -> String {
    match urlencoding::decode_binary(input.as_bytes()) {
        Cow::Borrowed(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        Cow::Owned(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
    }
}

fn form_fields(input: &[u8]) -> Vec<Field> {
    form_urlencoded::parse(input)
        .map(|(name, value)| Field::named(name, value))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(method: Method, uri: &str) -> RequestView {
        RequestView::new(method, uri.parse().unwrap(), HeaderMap::new())
    }

    #[test]
    fn test_expects_body() {
        assert!(view(Method::POST, "/").expects_body());
        assert!(view(Method::PUT, "/").expects_body());
        assert!(!view(Method::GET, "/").expects_body());
        assert!(!view(Method::DELETE, "/").expects_body());
    }

    #[test]
    fn test_url_is_percent_decoded() {
        let fields = view(Method::GET, "/a%20b/%2e%2e/c").url_fields();
        assert_eq!(fields, vec![Field::unnamed("/a b/../c")]);
    }

    #[test]
    fn test_args_are_form_decoded() {
        let fields = view(Method::GET, "/search?q=union+select&page=2&flag").arg_fields();
        assert_eq!(
            fields,
            vec![
                Field::named("q", "union select"),
                Field::named("page", "2"),
                Field::named("flag", ""),
            ]
        );
        assert!(view(Method::GET, "/").arg_fields().is_empty());
    }

    #[test]
    fn test_header_values_are_lossy() {
        let mut headers = HeaderMap::new();
        headers.insert("x-test", http::HeaderValue::from_bytes(b"a\xffb").unwrap());
        let view = RequestView::new(Method::GET, Uri::from_static("/"), headers);
        assert_eq!(view.header_fields(), vec![Field::named("x-test", "a\u{fffd}b")]);
    }

    #[test]
    fn test_form_body_and_raw_body() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            http::HeaderValue::from_static("application/x-www-form-urlencoded; charset=utf-8"),
        );
        let form = RequestView::new(Method::POST, Uri::from_static("/"), headers);
        assert_eq!(
            form.body_fields(b"comment=%3Cscript%3E&id=1"),
            vec![Field::named("comment", "<script>"), Field::named("id", "1")]
        );

        let raw = view(Method::POST, "/");
        assert_eq!(
            raw.body_fields(br#"{"a":"b"}"#),
            vec![Field::unnamed(r#"{"a":"b"}"#)]
        );
        assert!(raw.body_fields(b"").is_empty());
    }
}
