//! Nesting-aware splitting of directive arguments.
//!
//! Delimiter pairs are given as two parallel strings: `entry[i]` opens a
//! region closed by `exit[i]`. A pair whose open and close characters are
//! equal (quotes) is opaque: nothing inside it opens a new region.

/// Split `input` at top-level occurrences of `separator`.
///
/// A backslash escapes the following character, which is then never
/// treated as a separator or delimiter. The backslash itself is kept in
/// the output. Delimiters still open at the end of input are ignored.
/// Each segment is trimmed; an all-whitespace input yields no segments.
///
/// Quoted regions are opaque: brackets and separators inside them neither
/// open nor close anything, so a `(` inside a string value does not
/// swallow the rest of the list.
///
/// # Examples
///
/// ```rust
/// use config_rules::compiler::segments::split;
///
/// assert_eq!(split("a,(b,c),d", ',', "(", ")"), vec!["a", "(b,c)", "d"]);
/// assert_eq!(split(r"a\,b,c", ',', "", ""), vec![r"a\,b", "c"]);
/// assert_eq!(split("K=\"(\",L=1", ',', "(\"", ")\""), vec!["K=\"(\"", "L=1"]);
/// ```
pub fn split<'a>(input: &'a str, separator: char, entry: &str, exit: &str) -> Vec<&'a str> {
    if input.trim().is_empty() {
        return Vec::new();
    }

    let entry: Vec<char> = entry.chars().collect();
    let exit: Vec<char> = exit.chars().collect();
    let mut stack: Vec<usize> = Vec::new();
    let mut segments = Vec::new();
    let mut start = 0;

    let mut chars = input.char_indices();
    while let Some((pos, ch)) = chars.next() {
        if ch == '\\' {
            chars.next();
            continue;
        }

        if let Some(&top) = stack.last() {
            if exit.get(top) == Some(&ch) {
                stack.pop();
                continue;
            }
            if entry.get(top) == exit.get(top) {
                // Inside quotes.
                continue;
            }
        }

        if let Some(pair) = entry.iter().position(|&open| open == ch) {
            if pair < exit.len() {
                stack.push(pair);
                continue;
            }
        }

        if ch == separator && stack.is_empty() {
            segments.push(input[start..pos].trim());
            start = pos + ch.len_utf8();
        }
    }

    segments.push(input[start..].trim());
    segments
}

/// Remove one matching pair of surrounding delimiters, if present.
///
/// Every pair is checked, not just the first.
///
/// ```rust
/// use config_rules::compiler::segments::strip_surrounding;
///
/// assert_eq!(strip_surrounding("(a,b)", "(\"", ")\""), "a,b");
/// assert_eq!(strip_surrounding("\"hello\"", "(\"", ")\""), "hello");
/// assert_eq!(strip_surrounding("abc", "(\"", ")\""), "abc");
/// ```
pub fn strip_surrounding<'a>(input: &'a str, entry: &str, exit: &str) -> &'a str {
    let mut chars = input.chars();
    let (Some(first), Some(last)) = (chars.next(), chars.next_back()) else {
        return input;
    };

    for (open, close) in entry.chars().zip(exit.chars()) {
        if first == open && last == close {
            return &input[open.len_utf8()..input.len() - close.len_utf8()];
        }
    }
    input
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENTRY: &str = "(\"";
    const EXIT: &str = ")\"";

    #[test]
    fn test_split_respects_nesting() {
        assert_eq!(split("a,(b,c),d", ',', "(", ")"), vec!["a", "(b,c)", "d"]);
        assert_eq!(
            split("((x,y),(z)),w", ',', "(", ")"),
            vec!["((x,y),(z))", "w"]
        );
    }

    #[test]
    fn test_split_keeps_escapes_verbatim() {
        assert_eq!(split("a\\,b,c", ',', "", ""), vec!["a\\,b", "c"]);
        assert_eq!(split("a\\(,b", ',', "(", ")"), vec!["a\\(", "b"]);
    }

    #[test]
    fn test_split_quotes_are_opaque() {
        assert_eq!(
            split("K=\"a,b\",L=\"(c\"", ',', ENTRY, EXIT),
            vec!["K=\"a,b\"", "L=\"(c\""]
        );
    }

    #[test]
    fn test_split_trims_segments() {
        assert_eq!(split(" a , b ,c ", ',', "", ""), vec!["a", "b", "c"]);
        assert_eq!(split("a,,b", ',', "", ""), vec!["a", "", "b"]);
    }

    #[test]
    fn test_split_tolerates_unbalanced_delimiters() {
        assert_eq!(split("a,(b,c", ',', "(", ")"), vec!["a", "(b,c"]);
        assert_eq!(split("a),b", ',', "(", ")"), vec!["a)", "b"]);
    }

    #[test]
    fn test_split_empty_input() {
        assert!(split("", ',', ENTRY, EXIT).is_empty());
        assert!(split("   ", ',', ENTRY, EXIT).is_empty());
    }

    #[test]
    fn test_strip_surrounding() {
        assert_eq!(strip_surrounding("\"hello\"", "\"", "\""), "hello");
        assert_eq!(strip_surrounding("hello", "\"", "\""), "hello");
        assert_eq!(strip_surrounding("(a,b)", ENTRY, EXIT), "a,b");
        assert_eq!(strip_surrounding("((a))", ENTRY, EXIT), "(a)");
        assert_eq!(strip_surrounding("\"\"", ENTRY, EXIT), "");
    }

    #[test]
    fn test_strip_surrounding_needs_matching_pair() {
        assert_eq!(strip_surrounding("(a\"", ENTRY, EXIT), "(a\"");
        assert_eq!(strip_surrounding("\"", "\"", "\""), "\"");
        assert_eq!(strip_surrounding("", "\"", "\""), "");
    }
}
