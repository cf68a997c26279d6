//! Patient records loaded from per-list CSV files.
//!
//! Each `<list>.csv` under the records directory holds one patient list. Rows
//! are arbitrary field maps keyed by the CSV header; the only required field
//! is `id`. Records are read-only at runtime and replaced wholesale by
//! [`RecordStore::reload`].

use crate::constants::RECORD_ID_FIELD;
use crate::validation::validate_list_name;
use crate::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// One patient row: field name to string value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatientRecord(BTreeMap<String, String>);

impl PatientRecord {
    /// Builds a record, requiring a non-empty `id` field.
    pub fn from_fields(fields: BTreeMap<String, String>) -> CoreResult<Self> {
        match fields.get(RECORD_ID_FIELD) {
            Some(id) if !id.trim().is_empty() => Ok(Self(fields)),
            _ => Err(CoreError::InvalidInput(format!(
                "record has no '{RECORD_ID_FIELD}' field"
            ))),
        }
    }

    pub fn id(&self) -> &str {
        self.0.get(RECORD_ID_FIELD).map(String::as_str).unwrap_or_default()
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.0
    }

    pub fn into_fields(self) -> BTreeMap<String, String> {
        self.0
    }
}

/// Sort order for [`sort`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl std::str::FromStr for SortDirection {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "asc" => Ok(SortDirection::Asc),
            "desc" => Ok(SortDirection::Desc),
            other => Err(CoreError::InvalidInput(format!(
                "sort direction must be asc or desc, got '{other}'"
            ))),
        }
    }
}

/// Case-insensitive substring search across every field value.
///
/// Blank search text returns the records unchanged.
pub fn search(records: Vec<PatientRecord>, text: &str) -> Vec<PatientRecord> {
    let needle = text.trim().to_lowercase();
    if needle.is_empty() {
        return records;
    }

    records
        .into_iter()
        .filter(|r| r.0.values().any(|v| v.to_lowercase().contains(&needle)))
        .collect()
}

/// Stable sort by one field.
///
/// Values that parse as finite numbers sort numerically and ahead of all
/// text; text compares ignoring case first. A missing field sorts as empty
/// text.
pub fn sort(
    mut records: Vec<PatientRecord>,
    field: &str,
    direction: SortDirection,
) -> Vec<PatientRecord> {
    records.sort_by(|a, b| {
        let ordering =
            SortKey::of(a.get(field).unwrap_or("")).cmp(&SortKey::of(b.get(field).unwrap_or("")));
        match direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    });
    records
}

/// Total order over cell values: every number before every text value.
#[derive(Debug, Clone)]
enum SortKey {
    Number(f64),
    Text { folded: String, raw: String },
}

impl SortKey {
    fn of(value: &str) -> Self {
        match value.trim().parse::<f64>() {
            Ok(n) if n.is_finite() => SortKey::Number(n),
            _ => SortKey::Text {
                folded: value.to_lowercase(),
                raw: value.to_string(),
            },
        }
    }
}

impl PartialEq for SortKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SortKey {}

impl PartialOrd for SortKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SortKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (SortKey::Number(a), SortKey::Number(b)) => a.total_cmp(b),
            (SortKey::Number(_), SortKey::Text { .. }) => Ordering::Less,
            (SortKey::Text { .. }, SortKey::Number(_)) => Ordering::Greater,
            (
                SortKey::Text { folded: a, raw: ra },
                SortKey::Text { folded: b, raw: rb },
            ) => a.cmp(b).then_with(|| ra.cmp(rb)),
        }
    }
}

/// All patient lists, keyed by list name.
#[derive(Debug, Default)]
pub struct RecordStore {
    dir: PathBuf,
    lists: BTreeMap<String, Vec<PatientRecord>>,
}

impl RecordStore {
    /// Loads every `<list>.csv` in `dir`.
    ///
    /// A missing directory yields an empty store with a warning, so the
    /// consent service can run without any patient lists deployed.
    pub fn load_dir(dir: &Path) -> CoreResult<Self> {
        let mut lists = BTreeMap::new();

        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("records directory {} unavailable: {}", dir.display(), e);
                return Ok(Self {
                    dir: dir.to_path_buf(),
                    lists,
                });
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("csv") {
                continue;
            }
            let Some(list) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if validate_list_name(list).is_err() {
                tracing::warn!("skipping records file with unsafe name: {}", path.display());
                continue;
            }

            let records = match load_list(&path) {
                Ok(records) => records,
                Err(e) => {
                    tracing::warn!("skipping unreadable records file {}: {}", path.display(), e);
                    continue;
                }
            };
            tracing::info!("loaded {} records for list {}", records.len(), list);
            lists.insert(list.to_string(), records);
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            lists,
        })
    }

    /// Re-reads the directory. Returns the total number of records.
    pub fn reload(&mut self) -> CoreResult<usize> {
        *self = Self::load_dir(&self.dir.clone())?;
        Ok(self.total())
    }

    /// Records of one list; unknown lists are empty.
    pub fn records_for(&self, list: &str) -> Vec<PatientRecord> {
        self.lists.get(list).cloned().unwrap_or_default()
    }

    /// Records of every list, in list-name order.
    pub fn all_records(&self) -> Vec<PatientRecord> {
        self.lists.values().flatten().cloned().collect()
    }

    /// Source files of every loaded list, for backup exports.
    pub fn csv_files(&self) -> Vec<PathBuf> {
        self.lists
            .keys()
            .map(|list| self.dir.join(format!("{list}.csv")))
            .collect()
    }

    pub fn total(&self) -> usize {
        self.lists.values().map(Vec::len).sum()
    }
}

fn load_list(path: &Path) -> CoreResult<Vec<PatientRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)?;

    let mut records = Vec::new();
    for (index, row) in reader.deserialize::<BTreeMap<String, String>>().enumerate() {
        let record = row
            .map_err(CoreError::from)
            .and_then(PatientRecord::from_fields);
        match record {
            Ok(record) => records.push(record),
            Err(e) => tracing::warn!("{} row {}: {}; skipped", path.display(), index + 2, e),
        }
    }
    Ok(records)
}
