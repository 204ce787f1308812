//! Dimension translation.
//!
//! Two modes:
//! - [`Translator::translate`] relabels a finished table: coded values of
//!   field-named levels become dictionary labels, then field-named levels
//!   and field keys become display names.
//! - [`Translator::translate_values`] replaces the codes carried by raw
//!   snapshot rows before they are pivoted.
//!
//! A dictionary holding the pass-through code leaves values untouched in
//! both modes. Unmapped codes and fields pass through unchanged.

use loanrisk_core::{Code, ColumnLabels, DimensionDict, Field, Key, Level, LoanSnapshot, Table};

/// Code and field-name translation
#[derive(Clone, Debug, Default)]
pub struct Translator {
    dims: DimensionDict,
    labels: ColumnLabels,
}

impl Translator {
    pub fn new(dims: DimensionDict, labels: ColumnLabels) -> Self {
        Self { dims, labels }
    }

    pub fn dims(&self) -> &DimensionDict {
        &self.dims
    }

    pub fn labels(&self) -> &ColumnLabels {
        &self.labels
    }

    /// Display text for one code of `field`
    pub fn value_label<'a>(&'a self, field: Field, code: &'a str) -> &'a str {
        if self.dims.translates(field) {
            self.dims.label(field, code)
        } else {
            code
        }
    }

    /// Display name of `field`
    pub fn field_label(&self, field: Field) -> &str {
        self.labels.display(field)
    }

    /// Copy of `table` with codes, level names and field keys relabeled.
    ///
    /// Translating an already translated table is a no-op: translated
    /// levels are no longer named by a field.
    pub fn translate(&self, table: &Table) -> Table {
        let mut out = table.clone();

        for (i, level) in table.index_levels().iter().enumerate() {
            if let Some(field) = level.field() {
                if self.dims.translates(field) {
                    out.map_index_keys(i, |k| self.translate_key(field, k));
                }
                if let Some(name) = self.labels.lookup(field) {
                    out.set_index_level(i, Level::Name(name.to_string()));
                }
            }
            out.map_index_keys(i, |k| self.field_key(k));
        }

        for (i, level) in table.column_levels().iter().enumerate() {
            if let Some(field) = level.field() {
                if self.dims.translates(field) {
                    out.map_column_keys(i, |k| self.translate_key(field, k));
                }
                if let Some(name) = self.labels.lookup(field) {
                    out.set_column_level(i, Level::Name(name.to_string()));
                }
            }
            out.map_column_keys(i, |k| self.field_key(k));
        }

        out
    }

    fn translate_key(&self, field: Field, key: &Key) -> Key {
        match key {
            Key::Text(code) => Key::Text(self.dims.label(field, code).to_string()),
            other => other.clone(),
        }
    }

    fn field_key(&self, key: &Key) -> Key {
        match key {
            Key::Field(field) => match self.labels.lookup(*field) {
                Some(name) => Key::Text(name.to_string()),
                None => key.clone(),
            },
            other => other.clone(),
        }
    }

    /// Copies of `rows` with every dictionary-backed code replaced by its label
    pub fn translate_values(&self, rows: &[LoanSnapshot]) -> Vec<LoanSnapshot> {
        rows.iter()
            .map(|row| {
                let mut row = row.clone();
                for (field, code) in &mut row.codes {
                    if self.dims.translates(*field) {
                        if let Some(label) = self.dims.lookup(*field, code.as_str()) {
                            *code = Code::new(label);
                        }
                    }
                }
                row
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use loanrisk_core::ValueKind;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    fn translator() -> Translator {
        let dims = DimensionDict::new()
            .with(Field::Province, "3502", "Xiamen")
            .with(Field::Status3, "1", "delinquent")
            .with(Field::RiskLight, "9999", "-")
            .with(Field::RiskLight, "red", "RED");
        let labels = ColumnLabels::new()
            .with(Field::Province, "Province")
            .with(Field::RiskLight, "Light")
            .with(Field::Count, "Loans");
        Translator::new(dims, labels)
    }

    fn table() -> Table {
        let mut t = Table::keyed_by(&[Field::Province, Field::RiskLight]);
        let c = t.add_column(vec![Key::Field(Field::Count)], ValueKind::Amount).unwrap();
        let c2 = t.add_column(vec![Key::Field(Field::Stage)], ValueKind::Amount).unwrap();
        for (prov, light) in [("3502", "red"), ("9911", "green")] {
            let r = t.ensure_row(vec![Key::text(prov), Key::text(light)]).unwrap();
            t.set(r, c, Some(dec!(1)));
            t.set(r, c2, Some(dec!(2)));
        }
        t
    }

    #[test]
    fn labels_mode_relabels_codes_and_names() {
        let out = translator().translate(&table());
        assert_eq!(
            out.index_levels(),
            &[Level::Name("Province".into()), Level::Name("Light".into())]
        );
        assert_eq!(
            out.rows().to_vec(),
            vec![
                // unmapped province passes through
                vec![Key::text("Xiamen"), Key::text("red")],
                vec![Key::text("9911"), Key::text("green")],
            ]
        );
        assert_eq!(out.columns()[0].key, vec![Key::text("Loans")]);
        // no label configured: field key kept
        assert_eq!(out.columns()[1].key, vec![Key::Field(Field::Stage)]);
    }

    #[test]
    fn translate_is_idempotent() {
        let t = translator();
        let once = t.translate(&table());
        assert_eq!(t.translate(&once), once);
    }

    #[test]
    fn values_mode_skips_pass_through_maps() {
        let date = NaiveDate::from_ymd_opt(2016, 1, 31).unwrap();
        let rows = vec![LoanSnapshot::new(date, date)
            .with_code(Field::Province, "3502")
            .with_code(Field::Status3Prior, "1")
            .with_code(Field::RiskLight, "red")
            .with_code(Field::Stage, "A")];
        let out = translator().translate_values(&rows);
        assert_eq!(out[0].code(Field::Province).unwrap().as_str(), "Xiamen");
        assert_eq!(out[0].code(Field::Status3Prior).unwrap().as_str(), "delinquent");
        assert_eq!(out[0].code(Field::RiskLight).unwrap().as_str(), "red");
        assert_eq!(out[0].code(Field::Stage).unwrap().as_str(), "A");
        // input untouched
        assert_eq!(rows[0].code(Field::Province).unwrap().as_str(), "3502");
    }

    #[test]
    fn value_label_respects_pass_through() {
        let t = translator();
        assert_eq!(t.value_label(Field::Province, "3502"), "Xiamen");
        assert_eq!(t.value_label(Field::RiskLight, "red"), "red");
        assert_eq!(t.value_label(Field::Stage, "A"), "A");
    }
}
