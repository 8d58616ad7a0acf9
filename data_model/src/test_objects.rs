pub mod tests {
    use crate::{BlobKind, BlobProperties, BlobRecord, ContentSettings, Hierarchy};

    pub const TEST_CONTAINER: &str = "assets";

    pub fn mock_properties(name: &str, size: u64) -> BlobProperties {
        BlobProperties {
            name: name.to_string(),
            size,
            kind: BlobKind::Block,
            deleted: false,
            metadata: vec![
                ("owner".to_string(), "ops".to_string()),
                ("tier".to_string(), "hot".to_string()),
            ],
            content_settings: ContentSettings {
                content_type: Some("application/octet-stream".to_string()),
                content_md5: Some("9e107d9d372bb6826bd81d3542a419d6".to_string()),
                ..Default::default()
            },
        }
    }

    pub fn mock_record(name: &str, size: u64) -> BlobRecord {
        BlobRecord::new(mock_properties(name, size))
    }

    /// Two containers, one with a nested blob name, none transferred yet.
    pub fn mock_hierarchy() -> Hierarchy {
        let mut hierarchy = Hierarchy::new();
        hierarchy.insert_blob(TEST_CONTAINER, mock_record("a.txt", 10));
        hierarchy.insert_blob(TEST_CONTAINER, mock_record("nested/b.bin", 2048));
        hierarchy.insert_blob("logs", mock_record("2026/08/app.log", 512));
        hierarchy
    }
}
