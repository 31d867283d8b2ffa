//! Regex-to-literal downgrade for `CMP_Regex` match strings.
//!
//! A pattern whose only metacharacters are escaped (plus an optional `^`
//! and `$` anchor) is equivalent to a plain string test, which the engine
//! runs without touching the regex machinery.

use crate::tokens::CompareOp;

const REGEX_SPECIAL: [char; 15] = [
    '.', '*', '+', '?', '|', '$', '^', '(', ')', '[', ']', '{', '}', '-', '\\',
];

/// Unescape `pattern` if it contains no bare metacharacters.
///
/// Returns `None` when any special character appears unescaped, or when a
/// backslash escapes something that is not special (`\d` is a class, not
/// the letter `d`).
///
/// ```rust
/// use config_rules::compiler::literal::try_literalize;
///
/// assert_eq!(try_literalize("abc").as_deref(), Some("abc"));
/// assert_eq!(try_literalize("a.b"), None);
/// assert_eq!(try_literalize(r"a\.b").as_deref(), Some("a.b"));
/// ```
pub fn try_literalize(pattern: &str) -> Option<String> {
    let mut literal = String::with_capacity(pattern.len());
    let mut chars = pattern.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.next() {
                Some(escaped) if REGEX_SPECIAL.contains(&escaped) => literal.push(escaped),
                _ => return None,
            }
        } else if REGEX_SPECIAL.contains(&ch) {
            return None;
        } else {
            literal.push(ch);
        }
    }
    Some(literal)
}

/// Reclassify an anchored-literal regex as a plain string comparison.
///
/// `^x$` becomes `Equal`, `^x` `StartsWith`, `x$` `EndsWith` and `x`
/// `Contains`. `None` means the pattern must stay a regex.
pub fn optimize_regex(pattern: &str) -> Option<(CompareOp, String)> {
    let (anchored_start, rest) = match pattern.strip_prefix('^') {
        Some(rest) => (true, rest),
        None => (false, pattern),
    };
    let (anchored_end, body) = if ends_with_anchor(rest) {
        (true, &rest[..rest.len() - 1])
    } else {
        (false, rest)
    };

    let literal = try_literalize(body)?;
    let op = match (anchored_start, anchored_end) {
        (true, true) => CompareOp::Equal,
        (true, false) => CompareOp::StartsWith,
        (false, true) => CompareOp::EndsWith,
        (false, false) => CompareOp::Contains,
    };
    Some((op, literal))
}

/// A trailing `$` preceded by an even run of backslashes.
fn ends_with_anchor(pattern: &str) -> bool {
    match pattern.strip_suffix('$') {
        Some(head) => head.chars().rev().take_while(|&c| c == '\\').count() % 2 == 0,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_literalize() {
        assert_eq!(try_literalize("abc").as_deref(), Some("abc"));
        assert_eq!(try_literalize("a.b"), None);
        assert_eq!(try_literalize("a\\.b").as_deref(), Some("a.b"));
        assert_eq!(try_literalize("").as_deref(), Some(""));
    }

    #[test]
    fn test_every_special_char_blocks_when_bare() {
        for special in REGEX_SPECIAL {
            let pattern = format!("x{special}y");
            if special == '\\' {
                // `\y` escapes a non-special character.
                assert_eq!(try_literalize(&pattern), None);
            } else {
                assert_eq!(try_literalize(&pattern), None, "{pattern}");
                let escaped = format!("x\\{special}y");
                assert_eq!(
                    try_literalize(&escaped),
                    Some(format!("x{special}y")),
                    "{escaped}"
                );
            }
        }
        assert_eq!(try_literalize("a\\\\b").as_deref(), Some("a\\b"));
    }

    #[test]
    fn test_non_special_escapes_are_not_literal() {
        assert_eq!(try_literalize("\\d+"), None);
        assert_eq!(try_literalize("\\w"), None);
        assert_eq!(try_literalize("trailing\\"), None);
    }

    #[test]
    fn test_optimize_regex_anchors() {
        assert_eq!(
            optimize_regex("^Adreno"),
            Some((CompareOp::StartsWith, "Adreno".to_string()))
        );
        assert_eq!(
            optimize_regex("\\(TM\\)$"),
            Some((CompareOp::EndsWith, "(TM)".to_string()))
        );
        assert_eq!(
            optimize_regex("Mali"),
            Some((CompareOp::Contains, "Mali".to_string()))
        );
        assert_eq!(
            optimize_regex("^SM\\-G9\\.1$"),
            Some((CompareOp::Equal, "SM-G9.1".to_string()))
        );
    }

    #[test]
    fn test_optimize_regex_escaped_dollar_is_not_anchor() {
        assert_eq!(
            optimize_regex("^price\\$"),
            Some((CompareOp::StartsWith, "price$".to_string()))
        );
        // Escaped backslash followed by a real anchor.
        assert_eq!(
            optimize_regex("dir\\\\$"),
            Some((CompareOp::EndsWith, "dir\\".to_string()))
        );
    }

    #[test]
    fn test_optimize_regex_keeps_real_patterns() {
        assert_eq!(optimize_regex("^Mali-G7[0-9]"), None);
        assert_eq!(optimize_regex("^(Adreno|Mali)"), None);
        assert_eq!(optimize_regex(".*"), None);
    }
}
