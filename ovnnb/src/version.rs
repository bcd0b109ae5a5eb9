//! Release version comparison.

use std::cmp::Ordering;

/// Compares dotted release versions such as `v1.14.3` and `1.15.0`.
///
/// A leading `v` and any pre-release or build suffix are ignored, missing
/// components count as zero, and non-numeric components compare as zero.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let a = components(a);
    let b = components(b);
    let len = a.len().max(b.len());
    for i in 0..len {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        match x.cmp(&y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

fn components(version: &str) -> Vec<u64> {
    let version = version.trim().trim_start_matches(['v', 'V']);
    let release = version.split(['-', '+']).next().unwrap_or_default();
    release
        .split('.')
        .map(|part| {
            let digits: String = part.chars().take_while(char::is_ascii_digit).collect();
            digits.parse().unwrap_or(0)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compare_versions() {
        assert_eq!(compare_versions("v1.14.3", "1.15.0"), Ordering::Less);
        assert_eq!(compare_versions("v1.15.0", "1.15.0"), Ordering::Equal);
        assert_eq!(compare_versions("1.15", "1.15.0"), Ordering::Equal);
        assert_eq!(compare_versions("v1.16.0", "1.15.0"), Ordering::Greater);
        assert_eq!(compare_versions("1.9.0", "1.10.0"), Ordering::Less);
    }

    #[test]
    fn test_suffixes_are_ignored() {
        assert_eq!(compare_versions("v1.15.0-rc1", "1.15.0"), Ordering::Equal);
        assert_eq!(compare_versions("1.15.0+build.7", "1.15.0"), Ordering::Equal);
        assert_eq!(compare_versions("1.x", "1.0"), Ordering::Equal);
    }
}
