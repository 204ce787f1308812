//! Display-label lookups.
//!
//! Two read-only tables drive every human-readable string in a report:
//!
//! - [`DimensionDict`]: per-field map from raw code to display label
//! - [`ColumnLabels`]: map from field to its display name
//!
//! Both follow a "map or pass through" contract: an unknown code or field
//! comes back unchanged instead of failing.

use std::collections::HashMap;

use crate::field::{codes, Code, Field};

/// Per-field code → label maps
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DimensionDict {
    maps: HashMap<Field, HashMap<Code, String>>,
}

impl DimensionDict {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) the label for one code
    pub fn insert(&mut self, field: Field, code: Code, label: impl Into<String>) {
        self.maps
            .entry(field)
            .or_default()
            .insert(code, label.into());
    }

    /// Builder-style [`insert`](Self::insert)
    pub fn with(mut self, field: Field, code: &str, label: &str) -> Self {
        self.insert(field, Code::from(code), label);
        self
    }

    /// The code map for `field`; prior-status fields fall back to the map
    /// of their current-status counterpart
    pub fn map_for(&self, field: Field) -> Option<&HashMap<Code, String>> {
        self.maps
            .get(&field)
            .or_else(|| self.maps.get(&field.dictionary_field()))
    }

    /// Whether a map exists for `field`
    pub fn contains(&self, field: Field) -> bool {
        self.map_for(field).is_some()
    }

    /// Whether the map for `field` is marked as already human-readable
    pub fn is_pass_through(&self, field: Field) -> bool {
        self.map_for(field)
            .is_some_and(|m| m.contains_key(codes::PASS_THROUGH))
    }

    /// Whether `field` has a map whose values should be substituted
    pub fn translates(&self, field: Field) -> bool {
        self.contains(field) && !self.is_pass_through(field)
    }

    /// Label for `code`, if the dictionary knows it
    pub fn lookup(&self, field: Field, code: &str) -> Option<&str> {
        self.map_for(field)
            .and_then(|m| m.get(code))
            .map(String::as_str)
    }

    /// Label for `code`, or `code` itself when unmapped
    pub fn label<'a>(&'a self, field: Field, code: &'a str) -> &'a str {
        self.lookup(field, code).unwrap_or(code)
    }

    /// All `(code, label)` entries for `field`, sorted by code
    pub fn entries(&self, field: Field) -> Vec<(&Code, &str)> {
        let mut entries: Vec<_> = self
            .map_for(field)
            .map(|m| m.iter().map(|(c, l)| (c, l.as_str())).collect())
            .unwrap_or_default();
        entries.sort();
        entries
    }

    /// Number of fields with a map
    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    /// Total number of code entries across all fields
    pub fn entry_count(&self) -> usize {
        self.maps.values().map(HashMap::len).sum()
    }
}

/// Field → display name
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ColumnLabels {
    labels: HashMap<Field, String>,
}

impl ColumnLabels {
    /// Empty lookup: every field passes through under its column name
    pub fn new() -> Self {
        Self::default()
    }

    /// Lookup pre-filled with [`Field::default_label`] for every field
    pub fn english() -> Self {
        Self {
            labels: Field::ALL
                .iter()
                .map(|f| (*f, f.default_label().to_string()))
                .collect(),
        }
    }

    pub fn set(&mut self, field: Field, label: impl Into<String>) {
        self.labels.insert(field, label.into());
    }

    pub fn with(mut self, field: Field, label: &str) -> Self {
        self.set(field, label);
        self
    }

    pub fn lookup(&self, field: Field) -> Option<&str> {
        self.labels.get(&field).map(String::as_str)
    }

    /// Display name for `field`, or its column name when unmapped
    pub fn display(&self, field: Field) -> &str {
        self.lookup(field).unwrap_or_else(|| field.column())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provinces() -> DimensionDict {
        DimensionDict::new()
            .with(Field::Province, "3502", "Xiamen")
            .with(Field::Province, "3501", "Fuzhou")
            .with(Field::Status3, "1", "delinquent")
    }

    #[test]
    fn label_maps_or_passes_through() {
        let dict = provinces();
        assert_eq!(dict.label(Field::Province, "3502"), "Xiamen");
        assert_eq!(dict.label(Field::Province, "9911"), "9911");
        assert_eq!(dict.label(Field::Stage, "A"), "A");
    }

    #[test]
    fn prior_status_uses_current_map() {
        let dict = provinces();
        assert_eq!(dict.label(Field::Status3Prior, "1"), "delinquent");
        assert!(dict.contains(Field::Status3Prior));
    }

    #[test]
    fn sentinel_marks_pass_through() {
        let dict = provinces()
            .with(Field::RiskLight, "9999", "-")
            .with(Field::RiskLight, "red", "red");
        assert!(dict.is_pass_through(Field::RiskLight));
        assert!(!dict.translates(Field::RiskLight));
        assert!(dict.translates(Field::Province));
    }

    #[test]
    fn entries_sorted_by_code() {
        let dict = provinces();
        let entries = dict.entries(Field::Province);
        assert_eq!(entries[0].0.as_str(), "3501");
        assert_eq!(entries[1].1, "Xiamen");
        assert_eq!(dict.entry_count(), 3);
    }

    #[test]
    fn column_labels_fallback() {
        let labels = ColumnLabels::new().with(Field::Province, "Region");
        assert_eq!(labels.display(Field::Province), "Region");
        assert_eq!(labels.display(Field::Stage), "stage");
        assert_eq!(ColumnLabels::english().display(Field::Stage), "Stage");
    }
}
