//! Ingest: load and validate the raw dataset

use crate::core::{Dataset, PipelineError, Table};
use crate::store::StagedArtifact;
use tracing::info;

/// Parse a staged raw file and check it is a usable labeled dataset
pub async fn ingest(raw: &StagedArtifact, label_column: &str) -> Result<Table, PipelineError> {
    let table = Table::read(&raw.path).await?;
    if table.is_empty() {
        return Err(PipelineError::InvalidData(format!("{} has no data rows", raw.key)));
    }
    Dataset::from_table(&table, label_column)?;
    info!(
        "Ingested {}: {} rows, {} columns",
        raw.key,
        table.len(),
        table.columns.len()
    );
    Ok(table)
}
