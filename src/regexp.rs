use regex::{Regex, RegexBuilder};

/// AUTH_PARAM_REGEXP matches a single `key="value"` parameter of a
/// `WWW-Authenticate` challenge. Values are taken verbatim between the quotes.
pub const AUTH_PARAM_REGEXP: &str = r#"([A-Za-z0-9_]+)="([^"]*)""#;

pub fn must_compile(r: &str) -> Regex {
    RegexBuilder::new(r)
        .size_limit(10 * (1 << 21))
        .build()
        .unwrap()
}
