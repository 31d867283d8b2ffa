//! Argument parsing for individual rule directives.
//!
//! Every function here receives the text after `command:` and turns it into
//! IR records, interning strings as it goes. Strings are interned in the
//! order they appear on the line, so the table layout is a pure function of
//! the source text.

use super::literal::optimize_regex;
use super::segments::{split, strip_surrounding};
use crate::error::CompileErrorKind;
use crate::ir::{fold_hardware_case, Assignment, ChipsetRecord, ConditionRecord, MAX_LIST_ENTRIES};
use crate::strings::{StringIndex, StringTable};
use crate::tokens::{CompareOp, CompareType, ConditionKey, SourceType};

/// Opening delimiters: parentheses nest, double quotes are opaque.
pub(crate) const ENTRY: &str = "(\"";
pub(crate) const EXIT: &str = ")\"";

/// Key prefix that turns an assignment into a concatenation.
pub const APPEND_PREFIX: &str = "APPEND_";

pub(crate) type ParseResult<T> = std::result::Result<T, CompileErrorKind>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ListKind {
    Set,
    Clear,
    Conditions,
}

impl ListKind {
    fn name(self) -> &'static str {
        match self {
            ListKind::Set => "set",
            ListKind::Clear => "clear",
            ListKind::Conditions => "condition",
        }
    }

    fn entries(self) -> &'static str {
        match self {
            ListKind::Set => "set entries",
            ListKind::Clear => "clear keys",
            ListKind::Conditions => "conditions",
        }
    }
}

/// Drop one pair of surrounding double quotes.
pub(crate) fn unquote(text: &str) -> &str {
    strip_surrounding(text.trim(), "\"", "\"")
}

fn check_count(count: usize, kind: ListKind, allow_empty: bool) -> ParseResult<()> {
    if count == 0 && !allow_empty {
        return Err(CompileErrorKind::EmptyList(kind.name()));
    }
    if count > MAX_LIST_ENTRIES {
        return Err(CompileErrorKind::TooManyEntries {
            what: kind.entries(),
            count,
        });
    }
    Ok(())
}

/// Contents of a parenthesised list such as `(a,b,c)`.
fn list_items(text: &str) -> Vec<&str> {
    split(strip_surrounding(text.trim(), ENTRY, EXIT), ',', ENTRY, EXIT)
}

/// Parse `(k1=v1,APPEND_k2=v2,...)`.
pub(crate) fn parse_assignments(
    text: &str,
    strings: &mut StringTable,
    allow_empty: bool,
) -> ParseResult<Vec<Assignment>> {
    let items = list_items(text);
    check_count(items.len(), ListKind::Set, allow_empty)?;

    let mut assignments = Vec::with_capacity(items.len());
    for item in items {
        let (raw_key, raw_value) = item
            .split_once('=')
            .ok_or_else(|| CompileErrorKind::MissingAssignment(item.to_string()))?;

        let mut key = unquote(raw_key);
        let append = match key.strip_prefix(APPEND_PREFIX) {
            Some(stripped) => {
                key = stripped;
                true
            }
            None => false,
        };
        if key.is_empty() {
            return Err(CompileErrorKind::EmptyKey);
        }
        let value = unquote(raw_value);

        assignments.push(Assignment {
            append,
            expand: value.contains("$("),
            key: strings.intern(key)?,
            value: strings.intern(value)?,
        });
    }
    Ok(assignments)
}

/// Parse `(k1,k2,...)`.
pub(crate) fn parse_keys(
    text: &str,
    strings: &mut StringTable,
    allow_empty: bool,
) -> ParseResult<Vec<StringIndex>> {
    let items = list_items(text);
    check_count(items.len(), ListKind::Clear, allow_empty)?;

    items
        .into_iter()
        .map(|item| {
            let key = unquote(item);
            if key.is_empty() {
                return Err(CompileErrorKind::EmptyKey);
            }
            strings.intern(key)
        })
        .collect()
}

/// Parse the seven fields of a `chipset:` line.
pub(crate) fn parse_chipset(rest: &str, strings: &mut StringTable) -> ParseResult<ChipsetRecord> {
    let fields = split(rest, ',', ENTRY, EXIT);
    if fields.len() != 7 {
        return Err(CompileErrorKind::SegmentCount {
            expected: "7",
            found: fields.len(),
        });
    }

    let (hardware, deltas) = fold_hardware_case(unquote(fields[0]));
    Ok(ChipsetRecord {
        hardware: strings.intern(&hardware)?,
        case_deltas: strings.intern(&deltas)?,
        use_affinity: strings.intern(unquote(fields[1]))?,
        chipset: strings.intern(unquote(fields[2]))?,
        cpu: strings.intern(unquote(fields[3]))?,
        processor_count: strings.intern(unquote(fields[4]))?,
        big_core_mask: strings.intern(unquote(fields[5]))?,
        little_core_mask: strings.intern(unquote(fields[6]))?,
    })
}

/// Parse `((cond),(cond),...)`, the argument of `if`/`elseif` and the first
/// segment of `condition`.
pub(crate) fn parse_condition_group(
    text: &str,
    strings: &mut StringTable,
) -> ParseResult<Vec<ConditionRecord>> {
    let items = list_items(text);
    check_count(items.len(), ListKind::Conditions, false)?;
    items
        .into_iter()
        .map(|item| parse_condition(item, strings))
        .collect()
}

/// Parse one `(SourceType=..,CompareType=..,MatchString=..)` in any key order.
pub(crate) fn parse_condition(
    text: &str,
    strings: &mut StringTable,
) -> ParseResult<ConditionRecord> {
    let mut found = 0u8;
    let mut source_text = "";
    let mut compare_text = "";
    let mut match_text = "";

    for pair in list_items(text) {
        let (raw_key, raw_value) = pair
            .split_once('=')
            .ok_or_else(|| CompileErrorKind::MissingAssignment(pair.to_string()))?;
        let key = ConditionKey::from_keyword(raw_key.trim())
            .ok_or_else(|| CompileErrorKind::UnknownConditionKey(raw_key.trim().to_string()))?;
        if found & key.mask() != 0 {
            return Err(CompileErrorKind::DuplicateConditionKey(key.keyword()));
        }
        found |= key.mask();

        let value = unquote(raw_value);
        match key {
            ConditionKey::SourceType => source_text = value,
            ConditionKey::CompareType => compare_text = value,
            ConditionKey::MatchString => match_text = value,
        }
    }

    if let Some(missing) = ConditionKey::first_missing(found) {
        return Err(CompileErrorKind::MissingConditionKey(missing.keyword()));
    }

    let source = SourceType::from_keyword(source_text);
    let mut compare = CompareType::from_keyword(compare_text)
        .ok_or_else(|| CompileErrorKind::UnknownCompareType(compare_text.to_string()))?;

    let mut match_string = if compare.ignore_case {
        match_text.to_lowercase()
    } else {
        match_text.to_string()
    };
    if compare == CompareType::sensitive(CompareOp::Regex) {
        if let Some((op, literal)) = optimize_regex(&match_string) {
            compare = CompareType::sensitive(op);
            match_string = literal;
        }
    }

    Ok(ConditionRecord {
        source,
        source_string: strings.intern(source_text)?,
        compare,
        match_string: strings.intern(&match_string)?,
    })
}

/// A `condition:` line: `(conditions), (sets)[, (clears)]`.
pub(crate) type ConditionDirective = (Vec<ConditionRecord>, Vec<Assignment>, Vec<StringIndex>);

pub(crate) fn parse_condition_directive(
    rest: &str,
    strings: &mut StringTable,
) -> ParseResult<ConditionDirective> {
    let segments = split(rest, ',', ENTRY, EXIT);
    if !(2..=3).contains(&segments.len()) {
        return Err(CompileErrorKind::SegmentCount {
            expected: "2 or 3",
            found: segments.len(),
        });
    }

    let conditions = parse_condition_group(segments[0], strings)?;
    let sets = parse_assignments(segments[1], strings, true)?;
    let clears = match segments.get(2) {
        Some(segment) => parse_keys(segment, strings, true)?,
        None => Vec::new(),
    };
    Ok((conditions, sets, clears))
}
