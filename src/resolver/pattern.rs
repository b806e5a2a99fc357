use crate::inventory::TextMatch;
use crate::rules::ConditionOp;

/// Positive text predicate for a condition. Negated operators map to the
/// same predicate as their positive form; the caller takes the complement.
pub fn text_match(op: ConditionOp, value: &str) -> TextMatch {
    match op {
        ConditionOp::Contains | ConditionOp::DoesNotContain => TextMatch::Contains(value.to_string()),
        _ => TextMatch::Exact(value.to_string()),
    }
}

/// Predicate for address-like values: `|` separates alternatives and each
/// alternative may carry `*` wildcards.
pub fn address_match(op: ConditionOp, value: &str) -> TextMatch {
    let contains = matches!(op, ConditionOp::Contains | ConditionOp::DoesNotContain);
    let mut candidates: Vec<TextMatch> = value
        .split('|')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(|c| match (c.contains('*'), contains) {
            (true, true) => TextMatch::Wildcard(format!("*{c}*")),
            (true, false) => TextMatch::Wildcard(c.to_string()),
            (false, true) => TextMatch::Contains(c.to_string()),
            (false, false) => TextMatch::Exact(c.to_string()),
        })
        .collect();

    if candidates.len() == 1 {
        candidates.remove(0)
    } else {
        TextMatch::AnyOf(candidates)
    }
}

/// Match `text` against `pattern` where `*` matches any (possibly empty) run
/// of characters.
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    let mut parts = pattern.split('*');
    let first = parts.next().unwrap_or_default();
    let Some(mut rest) = text.strip_prefix(first) else {
        return false;
    };

    let tail: Vec<&str> = parts.collect();
    let Some((last, middle)) = tail.split_last() else {
        // no `*` at all
        return rest.is_empty();
    };

    for part in middle {
        match rest.find(part) {
            Some(pos) => rest = &rest[pos + part.len()..],
            None => return false,
        }
    }
    rest.len() >= last.len() && rest.ends_with(last)
}
