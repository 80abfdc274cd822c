//! Tabular data: CSV tables and labeled datasets

use crate::core::error::PipelineError;
use std::path::Path;

/// A row-oriented table with a header row
///
/// Cells are kept as text so that a table can pass through preprocessing
/// without any change to its values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Result<Self, PipelineError> {
        let table = Self { columns, rows };
        table.check_shape()?;
        Ok(table)
    }

    /// Parse CSV text. The first non-empty line is the header.
    pub fn from_csv(text: &str) -> Result<Self, PipelineError> {
        let mut lines = text
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty());

        let (_, header) = lines
            .next()
            .ok_or_else(|| PipelineError::InvalidData("CSV input has no header row".to_string()))?;
        let columns = split_record(header, 1)?;

        let mut rows = Vec::new();
        for (idx, line) in lines {
            let row = split_record(line, idx + 1)?;
            if row.len() != columns.len() {
                return Err(PipelineError::InvalidData(format!(
                    "line {}: expected {} fields, found {}",
                    idx + 1,
                    columns.len(),
                    row.len()
                )));
            }
            rows.push(row);
        }

        Table::new(columns, rows)
    }

    pub fn to_csv(&self) -> String {
        let mut out = String::new();
        out.push_str(&join_record(&self.columns));
        out.push('\n');
        for row in &self.rows {
            out.push_str(&join_record(row));
            out.push('\n');
        }
        out
    }

    pub async fn read(path: &Path) -> Result<Self, PipelineError> {
        let text = tokio::fs::read_to_string(path).await.map_err(|e| {
            PipelineError::InvalidData(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_csv(&text)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn check_shape(&self) -> Result<(), PipelineError> {
        if self.columns.is_empty() {
            return Err(PipelineError::InvalidData("table has no columns".to_string()));
        }
        let mut seen = std::collections::HashSet::new();
        for col in &self.columns {
            if col.is_empty() {
                return Err(PipelineError::InvalidData("empty column name".to_string()));
            }
            if !seen.insert(col) {
                return Err(PipelineError::InvalidData(format!("duplicate column '{}'", col)));
            }
        }
        if let Some((i, row)) = self.rows.iter().enumerate().find(|(_, r)| r.len() != self.columns.len()) {
            return Err(PipelineError::InvalidData(format!(
                "row {}: expected {} fields, found {}",
                i + 1,
                self.columns.len(),
                row.len()
            )));
        }
        Ok(())
    }
}

/// Split one CSV record, honoring double-quoted fields with `""` escapes
fn split_record(line: &str, line_no: usize) -> Result<Vec<String>, PipelineError> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut chars = line.chars().peekable();
    let mut quoted = false;
    let mut was_quoted = false;

    while let Some(c) = chars.next() {
        match (quoted, c) {
            (true, '"') if chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            (true, '"') => quoted = false,
            (true, c) => field.push(c),
            (false, '"') if !was_quoted && field.trim().is_empty() => {
                field.clear();
                quoted = true;
                was_quoted = true;
            }
            (false, ',') => {
                fields.push(finish_field(&mut field, was_quoted));
                was_quoted = false;
            }
            // padding after a closing quote is not part of the value
            (false, c) if was_quoted && c.is_whitespace() => {}
            (false, c) => field.push(c),
        }
    }

    if quoted {
        return Err(PipelineError::InvalidData(format!(
            "line {}: unterminated quoted field",
            line_no
        )));
    }
    fields.push(finish_field(&mut field, was_quoted));
    Ok(fields)
}

fn finish_field(field: &mut String, was_quoted: bool) -> String {
    let value = if was_quoted {
        std::mem::take(field)
    } else {
        field.trim().to_string()
    };
    field.clear();
    value
}

fn join_record(fields: &[String]) -> String {
    fields
        .iter()
        .map(|f| {
            if f.contains(',') || f.contains('"') || f.starts_with(' ') || f.ends_with(' ') {
                format!("\"{}\"", f.replace('"', "\"\""))
            } else {
                f.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// A table split into numeric features and one label column
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub feature_columns: Vec<String>,
    pub label_column: String,
    pub features: Vec<Vec<f64>>,
    pub labels: Vec<String>,
}

impl Dataset {
    /// Build a dataset, keeping the table's feature column order
    pub fn from_table(table: &Table, label_column: &str) -> Result<Self, PipelineError> {
        let feature_columns: Vec<String> = table
            .columns
            .iter()
            .filter(|c| c.as_str() != label_column)
            .cloned()
            .collect();
        Self::with_feature_order(table, label_column, &feature_columns)
    }

    /// Build a dataset whose features follow `feature_columns` exactly
    ///
    /// The table must contain exactly those feature columns plus the label.
    pub fn with_feature_order(
        table: &Table,
        label_column: &str,
        feature_columns: &[String],
    ) -> Result<Self, PipelineError> {
        let label_idx = table.column_index(label_column).ok_or_else(|| {
            PipelineError::InvalidData(format!("label column '{}' not found", label_column))
        })?;

        let mut found: Vec<String> = table
            .columns
            .iter()
            .filter(|c| c.as_str() != label_column)
            .cloned()
            .collect();
        let mut expected = feature_columns.to_vec();
        found.sort();
        expected.sort();
        if found != expected {
            return Err(PipelineError::SchemaMismatch {
                expected: feature_columns.to_vec(),
                found: table
                    .columns
                    .iter()
                    .filter(|c| c.as_str() != label_column)
                    .cloned()
                    .collect(),
            });
        }
        if feature_columns.is_empty() {
            return Err(PipelineError::InvalidData("dataset has no feature columns".to_string()));
        }

        let indices: Vec<usize> = feature_columns
            .iter()
            .filter_map(|c| table.column_index(c))
            .collect();

        let mut features = Vec::with_capacity(table.len());
        let mut labels = Vec::with_capacity(table.len());
        for (row_no, row) in table.rows.iter().enumerate() {
            let label = &row[label_idx];
            if label.is_empty() {
                return Err(PipelineError::InvalidData(format!(
                    "row {}: empty label in column '{}'",
                    row_no + 1,
                    label_column
                )));
            }
            let mut values = Vec::with_capacity(indices.len());
            for &i in &indices {
                let value: f64 = row[i].parse().map_err(|_| {
                    PipelineError::InvalidData(format!(
                        "row {}: column '{}' is not numeric: '{}'",
                        row_no + 1,
                        table.columns[i],
                        row[i]
                    ))
                })?;
                if !value.is_finite() {
                    return Err(PipelineError::InvalidData(format!(
                        "row {}: column '{}' is not finite",
                        row_no + 1,
                        table.columns[i]
                    )));
                }
                values.push(value);
            }
            features.push(values);
            labels.push(label.clone());
        }

        Ok(Self {
            feature_columns: feature_columns.to_vec(),
            label_column: label_column.to_string(),
            features,
            labels,
        })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}
