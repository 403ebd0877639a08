//! Artifact table for `binsmith list`

use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{Cell, CellAlignment, ContentArrangement, Table};

use binsmith_schema::ArtifactRecord;

use super::{format_millis, format_size};

/// Render one page of records
pub fn artifact_table(records: &[ArtifactRecord]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            "ID",
            "Name",
            "Version",
            "Ecosystem",
            "OS",
            "Size",
            "Downloads",
            "Updated",
        ]);

    for record in records {
        table.add_row(vec![
            Cell::new(record.id).set_alignment(CellAlignment::Right),
            Cell::new(record.name.as_str()),
            Cell::new(record.version.as_str()),
            Cell::new(record.ecosystem),
            Cell::new(record.target),
            Cell::new(format_size(record.file_size)).set_alignment(CellAlignment::Right),
            Cell::new(record.downloads).set_alignment(CellAlignment::Right),
            Cell::new(format_millis(record.updated_at)),
        ]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use binsmith_schema::{BuildTarget, Ecosystem};

    fn record(id: i64, name: &str) -> ArtifactRecord {
        ArtifactRecord {
            id,
            name: name.into(),
            description: "demo".to_string(),
            tags: vec![],
            downloads: 7,
            version: "1.2.3".into(),
            ecosystem: Ecosystem::Npm,
            target: BuildTarget::Linux,
            file_name: format!("{name}-1.2.3-linux"),
            file_size: 4096,
            score: None,
            security_rating: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn test_table_has_row_per_record() {
        let table = artifact_table(&[record(1, "cowsay"), record(2, "left-pad")]);
        assert_eq!(table.row_iter().count(), 2);
        let rendered = table.to_string();
        assert!(rendered.contains("cowsay"));
        assert!(rendered.contains("left-pad"));
        assert!(rendered.contains("4.0 KB"));
    }
}
