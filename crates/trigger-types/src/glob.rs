use wildmatch::WildMatch;

/// Match `context_key` against a set of `*`-wildcard patterns.
///
/// An empty pattern list means "match all" — rules that don't scope
/// themselves to particular context keys apply everywhere.
pub fn glob_match_context_key(patterns: &[String], context_key: &str) -> bool {
    if patterns.is_empty() {
        return true;
    }
    patterns
        .iter()
        .any(|pattern| WildMatch::new(pattern).matches(context_key))
}
