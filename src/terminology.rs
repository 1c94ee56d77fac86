//! Region taxonomy indexed by annotation value and by abbreviation.

use std::collections::{BTreeSet, HashMap};

use crate::error::{AnnotationError, RegionKey};
use crate::table::{Table, Value};

pub const ANNOTATION_VALUE: &str = "annotation_value";
pub const ABBREVIATION: &str = "abbreviation";
pub const NAME: &str = "name";
pub const DESCENDANT_VALUES: &str = "descendant_annotation_values";

const REQUIRED_COLUMNS: [&str; 4] = [ANNOTATION_VALUE, ABBREVIATION, NAME, DESCENDANT_VALUES];

#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    pub annotation_value: u32,
    pub abbreviation: String,
    pub name: String,
    /// Descendant field as found in the source table; parsed on demand so a
    /// malformed entry only fails the request that needs it.
    pub raw_descendants: Value,
}

impl Region {
    /// Parse the descendant annotation values of this region.
    pub fn descendant_values(&self) -> Result<BTreeSet<u32>, AnnotationError> {
        parse_descendant_values(&self.raw_descendants).ok_or_else(|| {
            AnnotationError::DescendantParse {
                abbreviation: self.abbreviation.clone(),
                raw: format!("{:?}", self.raw_descendants),
            }
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct Terminology {
    regions: Vec<Region>,
    by_value: HashMap<u32, usize>,
    by_abbreviation: HashMap<String, usize>,
}

impl Terminology {
    /// Index the rows of a terminology table by value and by abbreviation.
    ///
    /// # Errors
    ///
    /// Returns [`AnnotationError::Schema`] if a required column is absent,
    /// a cell has the wrong type, or either key is repeated.
    pub fn load(table: &Table) -> Result<Self, AnnotationError> {
        let missing = table.missing_columns(&REQUIRED_COLUMNS);
        if !missing.is_empty() {
            return Err(AnnotationError::Schema(format!(
                "terminology table is missing columns {missing:?}"
            )));
        }
        let [value_col, abbreviation_col, name_col, descendants_col] =
            REQUIRED_COLUMNS.map(|c| table.column_index(c).unwrap_or_default());

        let mut terminology = Terminology::default();
        for (row_index, row) in table.rows().iter().enumerate() {
            let annotation_value = row[value_col]
                .as_i64()
                .and_then(|v| u32::try_from(v).ok())
                .ok_or_else(|| {
                    AnnotationError::Schema(format!(
                        "row {row_index}: {ANNOTATION_VALUE} must be a non-negative integer, got {:?}",
                        row[value_col]
                    ))
                })?;
            let abbreviation = text_cell(&row[abbreviation_col]).ok_or_else(|| {
                AnnotationError::Schema(format!(
                    "row {row_index}: {ABBREVIATION} must be a string, got {:?}",
                    row[abbreviation_col]
                ))
            })?;
            let name = match &row[name_col] {
                Value::Null => String::new(),
                other => text_cell(other).ok_or_else(|| {
                    AnnotationError::Schema(format!(
                        "row {row_index}: {NAME} must be a string, got {other:?}"
                    ))
                })?,
            };

            terminology.insert(Region {
                annotation_value,
                abbreviation,
                name,
                raw_descendants: row[descendants_col].clone(),
            })?;
        }

        Ok(terminology)
    }

    fn insert(&mut self, region: Region) -> Result<(), AnnotationError> {
        if self.by_value.contains_key(&region.annotation_value) {
            return Err(AnnotationError::Schema(format!(
                "duplicate {ANNOTATION_VALUE} {}",
                region.annotation_value
            )));
        }
        if self.by_abbreviation.contains_key(&region.abbreviation) {
            return Err(AnnotationError::Schema(format!(
                "duplicate {ABBREVIATION} {:?}",
                region.abbreviation
            )));
        }
        let index = self.regions.len();
        self.by_value.insert(region.annotation_value, index);
        self.by_abbreviation.insert(region.abbreviation.clone(), index);
        self.regions.push(region);
        Ok(())
    }

    pub fn lookup_by_value(&self, value: u32) -> Result<&Region, AnnotationError> {
        self.get_by_value(value)
            .ok_or(AnnotationError::UnknownRegion(RegionKey::Value(value)))
    }

    pub fn lookup_by_abbreviation(&self, abbreviation: &str) -> Result<&Region, AnnotationError> {
        self.by_abbreviation
            .get(abbreviation)
            .map(|&i| &self.regions[i])
            .ok_or_else(|| {
                AnnotationError::UnknownRegion(RegionKey::Abbreviation(abbreviation.to_string()))
            })
    }

    /// Non-failing lookup, used by batch labeling.
    pub fn get_by_value(&self, value: u32) -> Option<&Region> {
        self.by_value.get(&value).map(|&i| &self.regions[i])
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

fn text_cell(value: &Value) -> Option<String> {
    match value {
        Value::Str(s) => Some(s.clone()),
        Value::Int(v) => Some(v.to_string()),
        _ => None,
    }
}

/// Parse a descendant-values cell into a canonical set.
///
/// Collections and scalars are taken as they are. Strings go through three
/// stages, first success wins:
///
/// 1. a bracketed literal such as `[1, 2, 3]`, `(1, 2)` or `{4}`;
/// 2. a comma-separated list such as `1,2,3` (blank tokens skipped);
/// 3. a single integer, or the empty set for a blank string.
///
/// Returns `None` for anything else, including negative values.
pub fn parse_descendant_values(raw: &Value) -> Option<BTreeSet<u32>> {
    match raw {
        Value::Null => Some(BTreeSet::new()),
        Value::Int(_) | Value::Float(_) => to_annotation_value(raw).map(|v| BTreeSet::from([v])),
        Value::List(items) => items.iter().map(to_annotation_value).collect(),
        Value::Str(s) => parse_literal(s)
            .or_else(|| parse_comma_separated(s))
            .or_else(|| parse_scalar(s)),
    }
}

fn to_annotation_value(value: &Value) -> Option<u32> {
    value.as_i64().and_then(|v| u32::try_from(v).ok())
}

fn parse_token(token: &str) -> Option<u32> {
    token.trim().parse::<u32>().ok()
}

fn parse_literal(s: &str) -> Option<BTreeSet<u32>> {
    let trimmed = s.trim();
    let inner = [('[', ']'), ('(', ')'), ('{', '}')]
        .iter()
        .find_map(|&(open, close)| trimmed.strip_prefix(open)?.strip_suffix(close))?;
    if inner.trim().is_empty() {
        return Some(BTreeSet::new());
    }
    // a single trailing comma is valid literal syntax, e.g. "(5,)"
    let inner = inner.trim_end().strip_suffix(',').unwrap_or(inner);
    inner.split(',').map(parse_token).collect()
}

fn parse_comma_separated(s: &str) -> Option<BTreeSet<u32>> {
    if !s.contains(',') {
        return None;
    }
    s.split(',')
        .filter(|token| !token.trim().is_empty())
        .map(parse_token)
        .collect()
}

fn parse_scalar(s: &str) -> Option<BTreeSet<u32>> {
    if s.trim().is_empty() {
        return Some(BTreeSet::new());
    }
    parse_token(s).map(|v| BTreeSet::from([v]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(values: &[u32]) -> BTreeSet<u32> {
        values.iter().copied().collect()
    }

    fn terminology_table() -> Table {
        let mut table = Table::new(REQUIRED_COLUMNS).unwrap();
        table
            .push_row(vec![
                Value::Int(1),
                "BR".into(),
                "Brain".into(),
                vec![1i64, 2, 3].into(),
            ])
            .unwrap();
        table
            .push_row(vec![Value::Int(2), "CTX".into(), "Cortex".into(), "2".into()])
            .unwrap();
        table
            .push_row(vec![Value::Int(3), "HY".into(), Value::Null, "oops".into()])
            .unwrap();
        table
    }

    #[test]
    fn string_forms_parse_to_the_same_sets() {
        let cases = [
            ("[1,2,3]", set(&[1, 2, 3])),
            ("1,2,3", set(&[1, 2, 3])),
            ("5", set(&[5])),
            ("", set(&[])),
        ];
        for (raw, expected) in cases {
            assert_eq!(parse_descendant_values(&raw.into()), Some(expected), "{raw:?}");
        }
    }

    #[test]
    fn literal_variants_parse() {
        assert_eq!(parse_descendant_values(&"(4, 5,)".into()), Some(set(&[4, 5])));
        assert_eq!(parse_descendant_values(&"{7}".into()), Some(set(&[7])));
        assert_eq!(parse_descendant_values(&" [ ] ".into()), Some(set(&[])));
        assert_eq!(parse_descendant_values(&" 1, ,2, ".into()), Some(set(&[1, 2])));
    }

    #[test]
    fn structured_cells_parse() {
        assert_eq!(parse_descendant_values(&Value::Int(9)), Some(set(&[9])));
        assert_eq!(parse_descendant_values(&Value::Float(9.0)), Some(set(&[9])));
        assert_eq!(parse_descendant_values(&Value::Null), Some(set(&[])));
        assert_eq!(
            parse_descendant_values(&vec![3i64, 1, 3].into()),
            Some(set(&[1, 3]))
        );
    }

    #[test]
    fn malformed_cells_fail() {
        for raw in ["abc", "[1, x]", "1;2", "-4", "1.5"] {
            assert_eq!(parse_descendant_values(&raw.into()), None, "{raw:?}");
        }
        assert_eq!(parse_descendant_values(&Value::Int(-1)), None);
        assert_eq!(parse_descendant_values(&vec!["a"].into()), None);
    }

    #[test]
    fn lookups_use_both_keys() {
        let terminology = Terminology::load(&terminology_table()).unwrap();
        assert_eq!(terminology.len(), 3);
        assert_eq!(terminology.lookup_by_value(2).unwrap().abbreviation, "CTX");
        assert_eq!(terminology.lookup_by_abbreviation("BR").unwrap().name, "Brain");
        assert_eq!(terminology.lookup_by_value(3).unwrap().name, "");
    }

    #[test]
    fn unknown_keys_report_the_key() {
        let terminology = Terminology::load(&terminology_table()).unwrap();
        assert!(matches!(
            terminology.lookup_by_value(42),
            Err(AnnotationError::UnknownRegion(RegionKey::Value(42)))
        ));
        assert!(matches!(
            terminology.lookup_by_abbreviation("XX"),
            Err(AnnotationError::UnknownRegion(RegionKey::Abbreviation(a))) if a == "XX"
        ));
    }

    #[test]
    fn descendant_errors_are_deferred_to_the_region() {
        let terminology = Terminology::load(&terminology_table()).unwrap();
        let region = terminology.lookup_by_abbreviation("HY").unwrap();
        assert!(matches!(
            region.descendant_values(),
            Err(AnnotationError::DescendantParse { abbreviation, .. }) if abbreviation == "HY"
        ));
        let region = terminology.lookup_by_abbreviation("BR").unwrap();
        assert_eq!(region.descendant_values().unwrap(), set(&[1, 2, 3]));
    }

    #[test]
    fn missing_columns_are_a_schema_error() {
        let table = Table::new([ANNOTATION_VALUE, ABBREVIATION]).unwrap();
        assert!(matches!(
            Terminology::load(&table),
            Err(AnnotationError::Schema(_))
        ));
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let mut table = terminology_table();
        table
            .push_row(vec![Value::Int(2), "DUP".into(), "Dup".into(), Value::Null])
            .unwrap();
        assert!(matches!(
            Terminology::load(&table),
            Err(AnnotationError::Schema(_))
        ));

        let mut table = terminology_table();
        table
            .push_row(vec![Value::Int(8), "BR".into(), "Dup".into(), Value::Null])
            .unwrap();
        assert!(Terminology::load(&table).is_err());
    }

    #[test]
    fn negative_annotation_value_is_rejected() {
        let mut table = Table::new(REQUIRED_COLUMNS).unwrap();
        table
            .push_row(vec![Value::Int(-1), "NEG".into(), "Neg".into(), Value::Null])
            .unwrap();
        assert!(Terminology::load(&table).is_err());
    }
}
