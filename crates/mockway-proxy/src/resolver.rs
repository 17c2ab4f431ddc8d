//! Mock resolution over a registry snapshot.
//!
//! Resolution is two-phase: collect every mock whose path template accepts
//! the inbound path (preserving registration order), then take the first of
//! those whose method matches case-insensitively. Overlapping templates are
//! not disambiguated by specificity; first-registered wins.

use crate::matcher;
use crate::registry::ActiveMock;

/// All mocks whose path template accepts `inbound_path`, in registry order.
pub fn find_path_matches<'a>(
    inbound_path: &str,
    mocks: &'a [ActiveMock],
) -> Vec<&'a ActiveMock> {
    mocks
        .iter()
        .filter(|m| matcher::matches(inbound_path, &m.path))
        .collect()
}

/// First path match whose method equals `inbound_method`, case-insensitively.
///
/// Path matches without a method match are a miss, not a partial hit.
pub fn find_method_match<'a>(
    inbound_method: &str,
    path_matches: &[&'a ActiveMock],
) -> Option<&'a ActiveMock> {
    path_matches
        .iter()
        .copied()
        .find(|m| m.method.matches(inbound_method))
}

/// Resolve an inbound method + path against a registry snapshot.
pub fn resolve<'a>(
    inbound_method: &str,
    inbound_path: &str,
    mocks: &'a [ActiveMock],
) -> Option<&'a ActiveMock> {
    let path_matches = find_path_matches(inbound_path, mocks);
    find_method_match(inbound_method, &path_matches)
}
