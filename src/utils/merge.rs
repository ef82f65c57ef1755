use crate::error::{Error, Result};
use crate::models::{MergedRecord, RawDataset, WorkUnit};
use crate::utils::schema::{canonical_name, MergeSchema};
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

type RowKey = Vec<String>;

fn key_indices(ds: &RawDataset, key: &[&str], side: &'static str) -> Result<Vec<usize>> {
    key.iter()
        .map(|column| {
            ds.column_index(column).ok_or_else(|| Error::JoinKeyMissing {
                side,
                column: column.to_string(),
            })
        })
        .collect()
}

// JSON text keeps 1 and "1" apart
fn row_key(row: &[Value], indices: &[usize]) -> RowKey {
    indices
        .iter()
        .map(|&i| row.get(i).unwrap_or(&Value::Null).to_string())
        .collect()
}

/// First row index for each key value
fn index_rows(ds: &RawDataset, indices: &[usize]) -> HashMap<RowKey, usize> {
    let mut lookup = HashMap::new();
    for (i, row) in ds.rows.iter().enumerate() {
        lookup.entry(row_key(row, indices)).or_insert(i);
    }
    lookup
}

fn pick(row: Option<&Vec<Value>>, idx: Option<usize>) -> Value {
    row.and_then(|r| r.get(idx?))
        .cloned()
        .unwrap_or(Value::Null)
}

/// Join one unit's advanced and traditional box scores.
///
/// Every traditional row survives, in order. Each picks up the first advanced
/// row with the same join key; without one its advanced columns are null.
/// Only allow-listed columns are kept and traditional ones are renamed to
/// their canonical names. A missing join column on either side is a
/// `JoinKeyMissing` error for this unit.
pub fn merge(
    unit: &WorkUnit,
    advanced: &RawDataset,
    traditional: &RawDataset,
    schema: &MergeSchema,
) -> Result<Vec<MergedRecord>> {
    let trad_key = key_indices(traditional, schema.join_key, "traditional")?;
    let adv_key = key_indices(advanced, schema.join_key, "advanced")?;
    let lookup = index_rows(advanced, &adv_key);

    let trad_cols: Vec<(&str, Option<usize>)> = schema
        .traditional_columns()
        .map(|c| (canonical_name(c), traditional.column_index(c)))
        .collect();
    let adv_cols: Vec<(&str, Option<usize>)> = schema
        .advanced_columns()
        .map(|c| (c, advanced.column_index(c)))
        .collect();

    let mut matched = 0;
    let records: Vec<MergedRecord> = traditional
        .rows
        .iter()
        .map(|row| {
            let adv_row = lookup
                .get(&row_key(row, &trad_key))
                .map(|&i| &advanced.rows[i]);
            if adv_row.is_some() {
                matched += 1;
            }

            let fields = trad_cols
                .iter()
                .map(|&(name, idx)| (name.to_string(), pick(Some(row), idx)))
                .chain(
                    adv_cols
                        .iter()
                        .map(|&(name, idx)| (name.to_string(), pick(adv_row, idx))),
                )
                .collect();

            MergedRecord {
                work_unit: unit.clone(),
                fields,
            }
        })
        .collect();

    debug!(
        %unit,
        schema = schema.name,
        rows = records.len(),
        matched,
        "merged box scores"
    );

    Ok(records)
}

/// Plain left join of two datasets on paired key columns.
///
/// Output columns are all of `left` followed by all of `right`; a right
/// column whose name already exists on the left gets `suffix` appended.
/// Unmatched left rows get nulls for the right side.
pub fn left_join(
    left: &RawDataset,
    right: &RawDataset,
    left_on: &[&str],
    right_on: &[&str],
    suffix: &str,
) -> Result<RawDataset> {
    let left_key = key_indices(left, left_on, "left")?;
    let right_key = key_indices(right, right_on, "right")?;
    let lookup = index_rows(right, &right_key);

    let mut columns = left.columns.clone();
    for c in &right.columns {
        if left.columns.contains(c) {
            columns.push(format!("{}{}", c, suffix));
        } else {
            columns.push(c.clone());
        }
    }

    let rows = left
        .rows
        .iter()
        .map(|row| {
            let matched = lookup.get(&row_key(row, &left_key)).map(|&i| &right.rows[i]);
            (0..left.columns.len())
                .map(|i| pick(Some(row), Some(i)))
                .chain((0..right.columns.len()).map(|i| pick(matched, Some(i))))
                .collect()
        })
        .collect();

    Ok(RawDataset { columns, rows })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::schema::{PLAYER_SCHEMA, TEAM_SCHEMA};
    use serde_json::json;

    fn traditional() -> RawDataset {
        RawDataset::new(
            vec![
                "gameId".into(),
                "teamId".into(),
                "personId".into(),
                "firstName".into(),
                "points".into(),
                "comment".into(),
            ],
            vec![
                vec![json!("0022400010"), json!(10), json!(201), json!("Ann"), json!(31), json!("")],
                vec![json!("0022400010"), json!(10), json!(202), json!("Bo"), json!(4), json!("DNP")],
                vec![json!("0022400010"), json!(11), json!(301), json!("Cy"), json!(18), json!("")],
            ],
        )
    }

    fn advanced() -> RawDataset {
        RawDataset::new(
            vec![
                "gameId".into(),
                "teamId".into(),
                "personId".into(),
                "offensiveRating".into(),
                "PIE".into(),
            ],
            vec![
                vec![json!("0022400010"), json!(11), json!(301), json!(112.5), json!(0.14)],
                vec![json!("0022400010"), json!(10), json!(201), json!(121.0), json!(0.21)],
            ],
        )
    }

    #[test]
    fn test_left_join_keeps_every_traditional_row() {
        let records = merge(&WorkUnit::from("g"), &advanced(), &traditional(), &PLAYER_SCHEMA).unwrap();
        assert_eq!(records.len(), 3);

        let ids: Vec<&Value> = records.iter().map(|r| r.get("PLAYER_ID").unwrap()).collect();
        assert_eq!(ids, vec![&json!(201), &json!(202), &json!(301)]);

        assert_eq!(records[0].get("offensiveRating"), Some(&json!(121.0)));
        assert_eq!(records[1].get("offensiveRating"), Some(&Value::Null));
        assert_eq!(records[2].get("PIE"), Some(&json!(0.14)));
    }

    #[test]
    fn test_columns_filtered_and_renamed() {
        let records = merge(&WorkUnit::from("g"), &advanced(), &traditional(), &PLAYER_SCHEMA).unwrap();
        let first = &records[0];

        assert_eq!(first.get("PTS"), Some(&json!(31)));
        assert_eq!(first.get("FIRST_NAME"), Some(&json!("Ann")));
        assert_eq!(first.get("points"), None);
        assert_eq!(first.get("comment"), None);

        // allow-listed but absent upstream: present and empty
        assert_eq!(first.get("AST"), Some(&Value::Null));
        assert_eq!(first.get("pace"), Some(&Value::Null));

        for canonical in PLAYER_SCHEMA.canonical_columns() {
            assert!(first.get(&canonical).is_some(), "missing {}", canonical);
        }
    }

    #[test]
    fn test_composite_team_key() {
        let trad = RawDataset::new(
            vec!["gameId".into(), "teamId".into(), "teamName".into(), "points".into()],
            vec![
                vec![json!("0022400010"), json!(10), json!("Hawks"), json!(110)],
                vec![json!("0022400010"), json!(11), json!("Celtics"), json!(104)],
            ],
        );
        let adv = RawDataset::new(
            vec!["gameId".into(), "teamId".into(), "pace".into()],
            vec![
                vec![json!("0022400099"), json!(10), json!(90.0)],
                vec![json!("0022400010"), json!(11), json!(99.5)],
            ],
        );

        let records = merge(&WorkUnit::from("0022400010"), &adv, &trad, &TEAM_SCHEMA).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("TEAM_NAME"), Some(&json!("Hawks")));
        assert_eq!(records[0].get("pace"), Some(&Value::Null));
        assert_eq!(records[1].get("pace"), Some(&json!(99.5)));
        assert_eq!(records[1].get("PLAYER_ID"), None);
    }

    #[test]
    fn test_missing_join_key_is_reported() {
        let mut adv = advanced();
        adv.columns[2] = "playerId".into();

        let err = merge(&WorkUnit::from("g"), &adv, &traditional(), &PLAYER_SCHEMA).unwrap_err();
        match err {
            Error::JoinKeyMissing { side, column } => {
                assert_eq!(side, "advanced");
                assert_eq!(column, "personId");
            }
            other => panic!("unexpected error {:?}", other),
        }

        let err = merge(&WorkUnit::from("g"), &advanced(), &RawDataset::default(), &PLAYER_SCHEMA)
            .unwrap_err();
        assert!(err.is_unit_skip());
    }

    #[test]
    fn test_merge_is_idempotent() {
        let adv = advanced();
        let trad = traditional();
        let once = merge(&WorkUnit::from("g"), &adv, &trad, &PLAYER_SCHEMA).unwrap();
        let twice = merge(&WorkUnit::from("g"), &adv, &trad, &PLAYER_SCHEMA).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_duplicate_advanced_rows_use_first() {
        let mut adv = advanced();
        adv.rows
            .push(vec![json!("0022400010"), json!(10), json!(201), json!(1.0), json!(0.0)]);

        let records = merge(&WorkUnit::from("g"), &adv, &traditional(), &PLAYER_SCHEMA).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].get("offensiveRating"), Some(&json!(121.0)));
    }

    #[test]
    fn test_generic_left_join_suffixes_collisions() {
        let left = RawDataset::new(
            vec!["id".into(), "type".into(), "player_ref".into()],
            vec![
                vec![json!("p1"), json!("projection"), json!("9")],
                vec![json!("p2"), json!("projection"), json!("404")],
            ],
        );
        let right = RawDataset::new(
            vec!["id".into(), "type".into(), "name".into()],
            vec![vec![json!("9"), json!("new_player"), json!("Jalen")]],
        );

        let joined = left_join(&left, &right, &["player_ref"], &["id"], "_new_player").unwrap();
        assert_eq!(
            joined.columns,
            vec!["id", "type", "player_ref", "id_new_player", "type_new_player", "name"]
        );
        assert_eq!(joined.cell(0, "name"), Some(&json!("Jalen")));
        assert_eq!(joined.cell(1, "name"), Some(&Value::Null));
        assert_eq!(joined.len(), 2);

        assert!(left_join(&left, &right, &["missing"], &["id"], "_x").is_err());
    }
}
