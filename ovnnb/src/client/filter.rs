//! External-ID predicates.

use crate::model::{ExternalIdMap, ExternalIds};

/// Whether `ids` satisfies `filter`.
///
/// Every filter key must be present. A filter value of `""` only requires
/// the key to carry some non-empty value; any other value must match
/// exactly. A record with fewer external IDs than the filter never matches.
pub fn match_external_ids(ids: &ExternalIdMap, filter: &ExternalIdMap) -> bool {
    if ids.len() < filter.len() {
        return false;
    }
    filter.iter().all(|(key, wanted)| match ids.get(key) {
        Some(value) if wanted.is_empty() => !value.is_empty(),
        Some(value) => value == wanted,
        None => false,
    })
}

/// Predicate form of [`match_external_ids`] for any record with external IDs.
pub fn external_ids_filter<T: ExternalIds>(filter: &ExternalIdMap) -> impl Fn(&T) -> bool + '_ {
    move |record| match_external_ids(record.external_ids(), filter)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(pairs: &[(&str, &str)]) -> ExternalIdMap {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        assert!(match_external_ids(&ids(&[]), &ids(&[])));
        assert!(match_external_ids(&ids(&[("vendor", "kube-ovn")]), &ids(&[])));
    }

    #[test]
    fn test_exact_and_presence_matching() {
        let record = ids(&[("sg", "web"), ("vendor", "kube-ovn"), ("direction", "")]);

        assert!(match_external_ids(&record, &ids(&[("sg", "web")])));
        assert!(!match_external_ids(&record, &ids(&[("sg", "db")])));

        // Presence requires a non-empty value.
        assert!(match_external_ids(&record, &ids(&[("sg", "")])));
        assert!(!match_external_ids(&record, &ids(&[("direction", "")])));
        assert!(!match_external_ids(&record, &ids(&[("missing", "")])));
    }

    #[test]
    fn test_record_smaller_than_filter_never_matches() {
        let record = ids(&[("sg", "web")]);
        assert!(!match_external_ids(&record, &ids(&[("sg", "web"), ("vendor", "")])));
    }
}
