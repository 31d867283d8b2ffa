//! Value comparisons used by condition records.

use crate::tokens::CompareOp;
use std::cmp::Ordering;

/// Numeric comparison. Either side failing to parse makes the test false.
pub fn compare_numeric(op: CompareOp, lhs: &str, rhs: &str) -> bool {
    let (Ok(lhs), Ok(rhs)) = (lhs.trim().parse::<f64>(), rhs.trim().parse::<f64>()) else {
        return false;
    };
    match op {
        CompareOp::Less => lhs < rhs,
        CompareOp::LessEqual => lhs <= rhs,
        CompareOp::Greater => lhs > rhs,
        CompareOp::GreaterEqual => lhs >= rhs,
        _ => false,
    }
}

/// Dotted version comparison for the `CMP_Version*` family.
pub fn compare_version_op(op: CompareOp, lhs: &str, rhs: &str) -> bool {
    let ordering = compare_versions(lhs, rhs);
    match op {
        CompareOp::VersionLess => ordering == Ordering::Less,
        CompareOp::VersionLessEqual => ordering != Ordering::Greater,
        CompareOp::VersionGreater => ordering == Ordering::Greater,
        CompareOp::VersionGreaterEqual => ordering != Ordering::Less,
        _ => false,
    }
}

/// Compare two dotted versions component by component.
///
/// Missing components count as zero, so `"12"` equals `"12.0.0"`. Each
/// component contributes its leading digits; `"3b"` reads as 3.
///
/// ```rust
/// use config_rules::engine::compare::compare_versions;
/// use std::cmp::Ordering;
///
/// assert_eq!(compare_versions("1.10", "1.9"), Ordering::Greater);
/// assert_eq!(compare_versions("12", "12.0.0"), Ordering::Equal);
/// ```
pub fn compare_versions(lhs: &str, rhs: &str) -> Ordering {
    let lhs = version_components(lhs);
    let rhs = version_components(rhs);
    let len = lhs.len().max(rhs.len());
    for i in 0..len {
        let a = lhs.get(i).copied().unwrap_or(0);
        let b = rhs.get(i).copied().unwrap_or(0);
        match a.cmp(&b) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

fn version_components(version: &str) -> Vec<u64> {
    version
        .trim()
        .split('.')
        .map(|part| {
            let digits: String = part.trim().chars().take_while(char::is_ascii_digit).collect();
            digits.parse().unwrap_or(0)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric() {
        assert!(compare_numeric(CompareOp::Less, "3", "4"));
        assert!(compare_numeric(CompareOp::GreaterEqual, "5.5", " 5.5 "));
        assert!(!compare_numeric(CompareOp::Greater, "abc", "1"));
        assert!(!compare_numeric(CompareOp::Less, "1", ""));
    }

    #[test]
    fn test_versions() {
        assert_eq!(compare_versions("1.2.3", "1.2.3"), Ordering::Equal);
        assert_eq!(compare_versions("1.2", "1.2.1"), Ordering::Less);
        assert_eq!(compare_versions("10.0", "9.9.9"), Ordering::Greater);
        assert_eq!(compare_versions("3b.1", "3.1"), Ordering::Equal);

        assert!(compare_version_op(CompareOp::VersionLess, "11", "12.1"));
        assert!(compare_version_op(CompareOp::VersionLessEqual, "12.0", "12"));
        assert!(!compare_version_op(CompareOp::VersionGreater, "12.0", "12"));
        assert!(compare_version_op(CompareOp::VersionGreaterEqual, "3.2", "3.1.9"));
    }
}
