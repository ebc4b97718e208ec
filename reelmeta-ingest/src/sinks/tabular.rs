//! Fixed column layout for tabular rows
//!
//! Each platform's layout is derived once from the field vocabulary: the
//! bookkeeping columns, then every field that applies to the platform in
//! canonical order, then the classification columns.

use super::SinkError;
use crate::types::CanonicalRecord;
use reelmeta_common::{FieldName, Platform};
use std::sync::LazyLock;

static SCHEMAS: LazyLock<Vec<TabularSchema>> =
    LazyLock::new(|| Platform::ALL.iter().map(|p| TabularSchema::derive(*p)).collect());

/// One tabular column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    RecordKey,
    Url,
    Platform,
    CollectedAt,
    Field(FieldName),
    Classification,
    Tags,
}

impl Column {
    pub fn name(&self) -> &'static str {
        match self {
            Column::RecordKey => "record_key",
            Column::Url => "url",
            Column::Platform => "platform",
            Column::CollectedAt => "collected_at",
            Column::Field(field) => field.column_name(),
            Column::Classification => "classification",
            Column::Tags => "tags",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabularSchema {
    platform: Platform,
    columns: Vec<Column>,
}

impl TabularSchema {
    fn derive(platform: Platform) -> Self {
        let mut columns = vec![Column::RecordKey, Column::Url, Column::Platform, Column::CollectedAt];
        columns.extend(
            FieldName::ALL
                .iter()
                .copied()
                .filter(|f| f.applies_to(platform))
                .map(Column::Field),
        );
        columns.push(Column::Classification);
        columns.push(Column::Tags);
        Self { platform, columns }
    }

    /// Shared layout for `platform`
    pub fn for_platform(platform: Platform) -> &'static TabularSchema {
        let idx = Platform::ALL.iter().position(|p| *p == platform).unwrap_or(0);
        &SCHEMAS[idx]
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&'static str> {
        self.columns.iter().map(Column::name).collect()
    }

    /// Table name for SQL-backed storage
    pub fn table_name(&self) -> String {
        format!("rows_{}", self.platform.slug())
    }
}

/// One row in a platform's fixed layout; empty cells are absent values
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabularRow {
    platform: Platform,
    cells: Vec<String>,
}

impl TabularRow {
    /// Flatten a record into its platform's layout
    ///
    /// Fields outside the platform's layout are dropped.
    pub fn from_record(record: &CanonicalRecord) -> Self {
        let schema = TabularSchema::for_platform(record.platform());
        let classification = record.classification();

        let cells = schema
            .columns()
            .iter()
            .map(|column| match column {
                Column::RecordKey => record.key().to_string(),
                Column::Url => record.url().to_string(),
                Column::Platform => record.platform().as_str().to_string(),
                Column::CollectedAt => record.created_at().to_rfc3339(),
                Column::Field(field) => record.get(*field).map(|v| v.to_cell()).unwrap_or_default(),
                Column::Classification => classification.map(|c| c.category.clone()).unwrap_or_default(),
                Column::Tags => classification.map(|c| c.tags.join(", ")).unwrap_or_default(),
            })
            .collect();

        Self {
            platform: record.platform(),
            cells,
        }
    }

    /// Row from raw cells, checked against the platform layout
    pub fn from_cells(platform: Platform, cells: Vec<String>) -> Result<Self, SinkError> {
        let expected = TabularSchema::for_platform(platform).columns().len();
        if cells.len() != expected {
            return Err(SinkError::Schema(format!(
                "{} row has {} cells, layout has {}",
                platform,
                cells.len(),
                expected
            )));
        }
        Ok(Self { platform, cells })
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn schema(&self) -> &'static TabularSchema {
        TabularSchema::for_platform(self.platform)
    }

    pub fn cells(&self) -> &[String] {
        &self.cells
    }

    pub fn cell(&self, column: &str) -> Option<&str> {
        self.schema()
            .columns()
            .iter()
            .position(|c| c.name() == column)
            .and_then(|idx| self.cells.get(idx))
            .map(String::as_str)
    }

    pub fn record_key(&self) -> &str {
        self.cell(Column::RecordKey.name()).unwrap_or_default()
    }
}
