//! Path-template matching.
//!
//! A template like `/users/:id/orders` is compiled into an anchored regex in
//! which each `:name` segment accepts one or more characters from the
//! URL-safe token set. Literal segments match verbatim. Query strings are the
//! caller's problem; only paths come through here.

use regex::Regex;

/// Characters a path variable segment may match.
const PATH_VAR_FRAGMENT: &str = "[a-zA-Z0-9_+\\-.~:!$&'()*+,=@]+";

/// Returns true when `inbound_path` satisfies `template`.
///
/// Pure function over its inputs; safe to call from any number of concurrent
/// resolutions. A template that fails to compile matches nothing.
pub fn matches(inbound_path: &str, template: &str) -> bool {
    match compile(template) {
        Ok(re) => re.is_match(inbound_path),
        Err(_) => false,
    }
}

/// Compile a path template into an anchored matcher.
///
/// A template with no variable segments degenerates to an exact-match regex.
pub fn compile(template: &str) -> Result<Regex, regex::Error> {
    let mut pattern = String::with_capacity(template.len() + 16);
    pattern.push('^');

    for (i, segment) in template.split('/').enumerate() {
        if i > 0 {
            pattern.push('/');
        }
        if segment.len() > 1 && segment.starts_with(':') {
            pattern.push_str(PATH_VAR_FRAGMENT);
        } else {
            pattern.push_str(&regex::escape(segment));
        }
    }

    pattern.push('$');
    Regex::new(&pattern)
}
