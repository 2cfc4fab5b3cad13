// Timeline persistence
// ZIP container holding manifest.json and timeline.ron

pub mod manager;
pub mod migration;
pub mod serialization;
pub mod types;

pub use manager::ProjectManager;
pub use migration::{CompatibilityInfo, DocumentMigrator, MigrationResult};
pub use types::{DocumentMetadata, DocumentVersion, TimelineBody, TimelineDocument};

pub const MANIFEST_FILE: &str = "manifest.json";
pub const TIMELINE_FILE: &str = "timeline.ron";

/// Project error types
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("RON error: {0}")]
    Ron(#[from] ron::Error),

    #[error("RON parse error: {0}")]
    Parse(#[from] ron::error::SpannedError),

    #[error("Missing required file in document: {0}")]
    MissingFile(String),

    #[error("Invalid document structure: {0}")]
    InvalidStructure(String),

    #[error("Unsupported document format version {0}")]
    InvalidVersion(String),
}

/// Checks that cannot be expressed in the types themselves
pub fn validate_document(document: &TimelineDocument) -> Result<(), ProjectError> {
    let name = document.metadata.name.trim();
    if name.is_empty() {
        return Err(ProjectError::InvalidStructure(
            "Document name cannot be empty".to_string(),
        ));
    }
    if name.len() > 255 {
        return Err(ProjectError::InvalidStructure(
            "Document name cannot exceed 255 characters".to_string(),
        ));
    }

    if !document.timeline.is_consistent() {
        return Err(ProjectError::InvalidStructure(
            "Tempo map is inconsistent".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequencer::groove::GrooveSettings;
    use crate::sequencer::tempo_map::TempoMap;

    fn document() -> TimelineDocument {
        TimelineDocument::new(
            "Valid",
            TempoMap::new(48000.0).unwrap(),
            GrooveSettings::straight(),
            false,
            None,
        )
    }

    #[test]
    fn test_valid_document() {
        assert!(validate_document(&document()).is_ok());
    }

    #[test]
    fn test_loop_enabled_before_region_is_valid() {
        // A loop toggled on before a region is set waits for the region
        let mut document = document();
        document.loop_enabled = true;
        assert!(validate_document(&document).is_ok());
    }

    #[test]
    fn test_long_name() {
        let mut document = document();
        document.metadata.name = "x".repeat(300);
        assert!(validate_document(&document).is_err());
    }
}
