use crate::key::ItemTime;
use crate::traits::{ColumnMap, ColumnReader, ColumnWriter, EncodingError, StorableRow};
use serde::{Deserialize, Serialize};

/// One metadata record pulled from a harvest source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarvestedRecord {
    pub identifier: String,
    pub datestamp: i64, // seconds since epoch
    pub title: Option<String>,
    pub creators: Vec<String>,
    pub subjects: Vec<String>,
    pub sets: Vec<String>, // set memberships reported by the source
    pub deleted: bool,
}

impl HarvestedRecord {
    pub fn new(identifier: impl Into<String>, datestamp: i64) -> Self {
        Self {
            identifier: identifier.into(),
            datestamp,
            title: None,
            creators: Vec::new(),
            subjects: Vec::new(),
            sets: Vec::new(),
            deleted: false,
        }
    }

    pub fn from_columns(columns: &ColumnMap) -> Result<Self, EncodingError> {
        let reader = ColumnReader::new(columns);
        let identifier = reader
            .get_str("id")?
            .ok_or_else(|| missing("id"))?
            .to_string();
        let datestamp = reader.get_i64("datestamp")?.ok_or_else(|| missing("datestamp"))?;

        Ok(Self {
            identifier,
            datestamp,
            title: reader.get_str("title")?.map(str::to_string),
            creators: reader.get_json("creators")?.unwrap_or_default(),
            subjects: reader.get_json("subjects")?.unwrap_or_default(),
            sets: reader.get_json("sets")?.unwrap_or_default(),
            deleted: reader.get_bool("deleted")?.unwrap_or(false),
        })
    }
}

impl StorableRow for HarvestedRecord {
    fn encode_columns(&self, columns: &mut ColumnWriter) -> Result<(), EncodingError> {
        if self.identifier.is_empty() {
            return Err(EncodingError::InvalidValue {
                column: "id".to_string(),
                reason: "record identifier is empty".to_string(),
            });
        }
        columns.put_str("id", &self.identifier)?;
        columns.put_i64("datestamp", self.datestamp)?;
        columns.put_opt_str("title", self.title.as_deref())?;
        columns.put_json("creators", &self.creators)?;
        columns.put_json("subjects", &self.subjects)?;
        columns.put_json("sets", &self.sets)?;
        columns.put_bool("deleted", self.deleted)?;
        Ok(())
    }

    fn row_key(&self) -> Vec<u8> {
        self.identifier.as_bytes().to_vec()
    }
}

/// Usage counters for one item within one time bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopularityStat {
    pub key: ItemTime,
    pub views: u64,
    pub downloads: u64,
}

impl PopularityStat {
    pub fn new(key: ItemTime) -> Self {
        Self {
            key,
            views: 0,
            downloads: 0,
        }
    }

    /// Adds counters already stored for the same key, for append-style rollups.
    pub fn accumulate(&self, stored: &ColumnMap) -> Result<Self, EncodingError> {
        let reader = ColumnReader::new(stored);
        Ok(Self {
            key: self.key.clone(),
            views: self
                .views
                .saturating_add(reader.get_u64("views")?.unwrap_or(0)),
            downloads: self
                .downloads
                .saturating_add(reader.get_u64("downloads")?.unwrap_or(0)),
        })
    }
}

impl StorableRow for PopularityStat {
    fn encode_columns(&self, columns: &mut ColumnWriter) -> Result<(), EncodingError> {
        columns.put_u64("views", self.views)?;
        columns.put_u64("downloads", self.downloads)?;
        Ok(())
    }

    fn row_key(&self) -> Vec<u8> {
        self.key.to_key_bytes()
    }
}

fn missing(column: &str) -> EncodingError {
    EncodingError::InvalidValue {
        column: column.to_string(),
        reason: "column missing".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> HarvestedRecord {
        HarvestedRecord {
            identifier: "oai:repo:42".to_string(),
            datestamp: 1_600_000_000,
            title: Some("On Harvesting".to_string()),
            creators: vec!["Doe, J.".to_string()],
            subjects: vec!["metadata".to_string(), "archives".to_string()],
            sets: vec!["theses".to_string()],
            deleted: false,
        }
    }

    #[test]
    fn test_record_row_is_stable() {
        let rec = record();
        assert_eq!(rec.row_key(), b"oai:repo:42".to_vec());
        assert_eq!(rec.to_map().unwrap(), rec.to_map().unwrap());
    }

    #[test]
    fn test_record_columns_decode() {
        let rec = record();
        let decoded = HarvestedRecord::from_columns(&rec.to_map().unwrap()).unwrap();
        assert_eq!(decoded, rec);
    }

    #[test]
    fn test_record_without_title_omits_column() {
        let rec = HarvestedRecord::new("id-1", 0);
        let columns = rec.to_map().unwrap();
        assert!(!columns.contains_key(b"title".as_slice()));
        assert!(columns.contains_key(b"id".as_slice()));
    }

    #[test]
    fn test_empty_identifier_fails_encoding() {
        let rec = HarvestedRecord::new("", 0);
        assert!(matches!(
            rec.to_map(),
            Err(EncodingError::InvalidValue { ref column, .. }) if column == "id"
        ));
    }

    #[test]
    fn test_stat_merges_into_record_row() {
        let stat = PopularityStat {
            key: ItemTime::new(42, "web", 1_600_000_000),
            views: 3,
            downloads: 1,
        };
        let shared = record().to_map().unwrap();
        let width = shared.len();
        let shared = stat.merge_into(shared).unwrap();
        assert_eq!(shared.len(), width + 2);
    }

    #[test]
    fn test_stat_accumulates_stored_counters() {
        let stored = PopularityStat {
            key: ItemTime::new(1, "web", 3600),
            views: 10,
            downloads: 2,
        }
        .to_map()
        .unwrap();

        let fresh = PopularityStat {
            key: ItemTime::new(1, "web", 3600),
            views: 1,
            downloads: 0,
        };
        let total = fresh.accumulate(&stored).unwrap();
        assert_eq!(total.views, 11);
        assert_eq!(total.downloads, 2);
        assert_eq!(total.row_key(), fresh.row_key());
    }
}
