//! Schema diffing (§4.H): an optional diagnostic that compares the metric
//! lists of two chunks and reports added, removed, or type-changed keys.
//!
//! This is a supplement to the distilled spec's Open Question on
//! cross-chunk schema compatibility (§9): it never affects core decoding,
//! only the `info --diff-previous` CLI diagnostic.

use std::collections::BTreeMap;

use crate::record::{Metric, OriginalType};

/// Whether two original types are considered compatible for schema-diff
/// purposes. `BOOL` is never compatible with a numeric type; `I32`/`I64`/
/// `F64` are mutually compatible with each other and with themselves (§9).
fn types_compatible(a: OriginalType, b: OriginalType) -> bool {
    use OriginalType::*;
    if a == b {
        return true;
    }
    matches!(
        (a, b),
        (F64, I32) | (I32, F64) | (F64, I64) | (I64, F64) | (I32, I64) | (I64, I32)
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeChange {
    pub key: String,
    pub from: OriginalType,
    pub to: OriginalType,
}

#[derive(Debug, Clone, Default)]
pub struct SchemaDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub type_changed: Vec<TypeChange>,
}

impl SchemaDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.type_changed.is_empty()
    }
}

/// Compares the metric list of `previous` against `current`, reporting keys
/// present in one but not the other, and keys present in both whose
/// original type changed in an incompatible way.
pub fn diff_schema(previous: &[Metric], current: &[Metric]) -> SchemaDiff {
    let prev_map: BTreeMap<String, OriginalType> = previous
        .iter()
        .map(|m| (m.dotted_key(), m.original_type))
        .collect();
    let curr_map: BTreeMap<String, OriginalType> = current
        .iter()
        .map(|m| (m.dotted_key(), m.original_type))
        .collect();

    let mut diff = SchemaDiff::default();

    for (key, curr_type) in &curr_map {
        match prev_map.get(key) {
            None => diff.added.push(key.clone()),
            Some(prev_type) => {
                if !types_compatible(*prev_type, *curr_type) {
                    diff.type_changed.push(TypeChange {
                        key: key.clone(),
                        from: *prev_type,
                        to: *curr_type,
                    });
                }
            }
        }
    }

    for key in prev_map.keys() {
        if !curr_map.contains_key(key) {
            diff.removed.push(key.clone());
        }
    }

    diff
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metric(parent: &[&str], name: &str, ty: OriginalType) -> Metric {
        let parent_path: Vec<String> = parent.iter().map(|s| s.to_string()).collect();
        Metric::new(&parent_path, name, 0, ty)
    }

    #[test]
    fn detects_added_and_removed_keys() {
        let previous = vec![metric(&[], "a", OriginalType::I32)];
        let current = vec![
            metric(&[], "a", OriginalType::I32),
            metric(&[], "b", OriginalType::I32),
        ];
        let diff = diff_schema(&previous, &current);
        assert_eq!(diff.added, vec!["b".to_string()]);
        assert!(diff.removed.is_empty());
    }

    #[test]
    fn numeric_type_widening_is_compatible() {
        let previous = vec![metric(&[], "a", OriginalType::I32)];
        let current = vec![metric(&[], "a", OriginalType::I64)];
        let diff = diff_schema(&previous, &current);
        assert!(diff.is_empty());
    }

    #[test]
    fn bool_to_numeric_is_an_incompatible_type_change() {
        let previous = vec![metric(&[], "flag", OriginalType::Bool)];
        let current = vec![metric(&[], "flag", OriginalType::I32)];
        let diff = diff_schema(&previous, &current);
        assert_eq!(diff.type_changed.len(), 1);
        assert_eq!(diff.type_changed[0].key, "flag");
    }

    #[test]
    fn identical_schemas_produce_no_diff() {
        let previous = vec![
            metric(&[], "a", OriginalType::I32),
            metric(&["srv"], "conns", OriginalType::F64),
        ];
        let current = previous.clone();
        assert!(diff_schema(&previous, &current).is_empty());
    }
}
