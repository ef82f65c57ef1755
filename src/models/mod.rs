use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;

/// One fetchable resource (a game id, a date, or a projections page)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkUnit(String);

impl WorkUnit {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorkUnit {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for WorkUnit {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Box score flavour served by the stats API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Advanced,
    Traditional,
}

impl ResourceKind {
    pub fn endpoint(&self) -> &'static str {
        match self {
            ResourceKind::Advanced => "boxscoreadvancedv3",
            ResourceKind::Traditional => "boxscoretraditionalv3",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ResourceKind::Advanced => "advanced",
            ResourceKind::Traditional => "traditional",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Whether a box score is broken down per player or per team
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityScope {
    Player,
    Team,
}

impl EntityScope {
    pub fn label(&self) -> &'static str {
        match self {
            EntityScope::Player => "player",
            EntityScope::Team => "team",
        }
    }
}

/// Column names plus row values, as returned by an upstream source for a
/// single work unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawDataset {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl RawDataset {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    /// Pull a dataset out of a stats API document.
    ///
    /// Accepts either a top-level `{"headers": [...], "data": [[...]]}` or the
    /// older `{"resultSets": [{"headers": [...], "rowSet": [[...]]}]}` layout,
    /// in which case the first result set is used. The error string names the
    /// missing piece.
    pub fn from_document(doc: &Value) -> Result<Self, String> {
        let obj = doc
            .as_object()
            .ok_or_else(|| "response is not a JSON object".to_string())?;

        let (headers, rows) = if obj.contains_key("headers") || obj.contains_key("data") {
            (
                obj.get("headers").ok_or("missing 'headers'")?,
                obj.get("data").ok_or("missing 'data'")?,
            )
        } else if let Some(sets) = obj.get("resultSets") {
            let first = sets
                .as_array()
                .and_then(|s| s.first())
                .ok_or("'resultSets' is empty")?;
            (
                first.get("headers").ok_or("missing 'headers' in result set")?,
                first.get("rowSet").ok_or("missing 'rowSet' in result set")?,
            )
        } else {
            return Err("missing 'headers' and 'data'".to_string());
        };

        let columns = headers
            .as_array()
            .ok_or("'headers' is not a list")?
            .iter()
            .map(|h| h.as_str().map(str::to_string))
            .collect::<Option<Vec<_>>>()
            .ok_or("'headers' contains a non-string entry")?;

        let rows = rows
            .as_array()
            .ok_or("'data' is not a list")?
            .iter()
            .map(|row| row.as_array().cloned())
            .collect::<Option<Vec<_>>>()
            .ok_or("'data' contains a row that is not a list")?;

        Ok(Self { columns, rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Value at `row` for `column`; `None` if either is out of range.
    pub fn cell(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.get(idx)
    }

    /// Stack datasets vertically. Columns are the union in first-seen order;
    /// cells a dataset doesn't have become null.
    pub fn concat(datasets: Vec<RawDataset>) -> RawDataset {
        let mut columns: Vec<String> = Vec::new();
        for ds in &datasets {
            for c in &ds.columns {
                if !columns.contains(c) {
                    columns.push(c.clone());
                }
            }
        }

        let mut rows = Vec::new();
        for ds in datasets {
            let mapping: Vec<Option<usize>> =
                columns.iter().map(|c| ds.column_index(c)).collect();
            for row in ds.rows {
                rows.push(
                    mapping
                        .iter()
                        .map(|idx| idx.and_then(|i| row.get(i).cloned()).unwrap_or(Value::Null))
                        .collect(),
                );
            }
        }

        RawDataset { columns, rows }
    }
}

/// One row of canonical output, tagged with the unit it came from
#[derive(Debug, Clone, PartialEq)]
pub struct MergedRecord {
    pub work_unit: WorkUnit,
    pub fields: Vec<(String, Value)>,
}

impl MergedRecord {
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, v)| v)
    }
}

/// Append-only accumulation of merged rows, in work-unit order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultTable {
    columns: Vec<String>,
    records: Vec<MergedRecord>,
}

impl ResultTable {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            records: Vec::new(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn records(&self) -> &[MergedRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn append(&mut self, records: Vec<MergedRecord>) {
        self.records.extend(records);
    }

    /// Units that already contributed at least one row
    pub fn processed_units(&self) -> HashSet<WorkUnit> {
        self.records.iter().map(|r| r.work_unit.clone()).collect()
    }
}
