//! Result-row models for driver metadata and ad-hoc queries.
//!
//! All fields are plain text as delivered by the driver's text buffers;
//! `None` marks a NULL cell.

use serde::{Deserialize, Serialize};

/// One row of the driver's table catalog (`SQLTables`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInfo {
    /// Catalog the table lives in, if the driver reports one.
    pub catalog: Option<String>,
    /// Schema the table lives in, if the driver reports one.
    pub schema: Option<String>,
    /// Table name.
    pub name: String,
    /// Driver table type, e.g. `TABLE` or `VIEW`.
    pub table_type: Option<String>,
}

impl TableInfo {
    /// Three-part rendering used for log lines: `[catalog].[schema].[name]`.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        format!(
            "[{}].[{}].[{}]",
            self.catalog.as_deref().unwrap_or(""),
            self.schema.as_deref().unwrap_or(""),
            self.name
        )
    }
}

/// One non-null cell of a column-metadata result row, paired with the
/// result-set field name it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataField {
    /// Result-set column name, e.g. `type_name`.
    pub name: String,
    /// Cell value as text.
    pub value: String,
}

/// One row of the driver's column catalog (`SQLColumns`): the column name
/// plus every non-null field the driver returned for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescription {
    /// Name of the described column.
    pub column_name: String,
    /// Non-null metadata fields for the column.
    pub fields: Vec<MetadataField>,
}

/// Optional filters for a column-metadata lookup. Empty filters match
/// everything the driver will show.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnFilter {
    /// Catalog filter.
    pub catalog: Option<String>,
    /// Schema filter.
    pub schema: Option<String>,
    /// Table name filter.
    pub table: Option<String>,
    /// Column name filter.
    pub column: Option<String>,
}

impl std::fmt::Display for ColumnFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}, {}, {}, {}",
            self.catalog.as_deref().unwrap_or("<any>"),
            self.schema.as_deref().unwrap_or("<any>"),
            self.table.as_deref().unwrap_or("<any>"),
            self.column.as_deref().unwrap_or("<any>")
        )
    }
}

/// Text snapshot of an ad-hoc query result set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryOutcome {
    /// Result-set column names, in select order.
    pub columns: Vec<String>,
    /// Rows as text cells; `None` marks NULL.
    pub rows: Vec<Vec<Option<String>>>,
}

impl QueryOutcome {
    /// Number of fetched rows.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualified_name_includes_all_parts() {
        let table = TableInfo {
            catalog: Some("AdventureWorks2022".to_string()),
            schema: Some("Person".to_string()),
            name: "Person".to_string(),
            table_type: Some("TABLE".to_string()),
        };
        assert_eq!(
            table.qualified_name(),
            "[AdventureWorks2022].[Person].[Person]"
        );
    }

    #[test]
    fn test_qualified_name_tolerates_null_parts() {
        let table = TableInfo {
            catalog: None,
            schema: None,
            name: "#HelloTable".to_string(),
            table_type: None,
        };
        assert_eq!(table.qualified_name(), "[].[].[#HelloTable]");
    }

    #[test]
    fn test_column_filter_display_marks_wildcards() {
        let filter = ColumnFilter {
            table: Some("Person".to_string()),
            column: Some("Banana".to_string()),
            ..Default::default()
        };
        assert_eq!(filter.to_string(), "<any>, <any>, Person, Banana");
    }

    #[test]
    fn test_query_outcome_row_count() {
        let outcome = QueryOutcome {
            columns: vec!["id".to_string()],
            rows: vec![vec![Some("1".to_string())], vec![None]],
        };
        assert_eq!(outcome.row_count(), 2);
    }
}
