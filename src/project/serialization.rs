// Serialization helpers for the document container

use super::types::{DocumentMetadata, TimelineBody};
use super::ProjectError;

/// Timeline body as pretty RON
pub fn body_to_ron(body: &TimelineBody) -> Result<String, ProjectError> {
    Ok(ron::ser::to_string_pretty(
        body,
        ron::ser::PrettyConfig::default(),
    )?)
}

/// Parse a timeline body; tempo map and groove are re-validated on the way in
pub fn body_from_ron(text: &str) -> Result<TimelineBody, ProjectError> {
    Ok(ron::from_str(text)?)
}

pub fn metadata_to_json(metadata: &DocumentMetadata) -> Result<String, ProjectError> {
    Ok(serde_json::to_string_pretty(metadata)?)
}

pub fn metadata_from_json(text: &str) -> Result<DocumentMetadata, ProjectError> {
    Ok(serde_json::from_str(text)?)
}
