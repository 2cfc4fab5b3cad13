// Types for timeline persistence

use crate::sequencer::groove::GrooveSettings;
use crate::sequencer::playhead::LoopRegion;
use crate::sequencer::tempo_map::TempoMap;
use serde::{Deserialize, Serialize};

/// Document format version
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct DocumentVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl DocumentVersion {
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// 1.1 added groove settings
    pub fn current() -> Self {
        Self::new(1, 1, 0)
    }
}

impl std::fmt::Display for DocumentVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Contents of `manifest.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub name: String,
    pub version: DocumentVersion,
    /// RFC 3339
    pub created: String,
    /// RFC 3339
    pub modified: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
}

impl DocumentMetadata {
    pub fn new(name: &str) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            name: name.to_string(),
            version: DocumentVersion::current(),
            created: now.clone(),
            modified: now,
            author: None,
        }
    }

    /// Stamp the modification time
    pub fn touch(&mut self) {
        self.modified = chrono::Utc::now().to_rfc3339();
    }
}

/// Everything needed to rebuild the transport's timeline state
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineDocument {
    pub metadata: DocumentMetadata,
    pub timeline: TempoMap,
    pub groove: GrooveSettings,
    pub loop_enabled: bool,
    pub loop_region: Option<LoopRegion>,
}

impl TimelineDocument {
    pub fn new(
        name: &str,
        timeline: TempoMap,
        groove: GrooveSettings,
        loop_enabled: bool,
        loop_region: Option<LoopRegion>,
    ) -> Self {
        Self {
            metadata: DocumentMetadata::new(name),
            timeline,
            groove,
            loop_enabled,
            loop_region,
        }
    }

    pub fn sample_rate(&self) -> f64 {
        self.timeline.sample_rate()
    }
}

/// Contents of `timeline.ron`
///
/// `groove` is absent in 1.0 documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineBody {
    pub timeline: TempoMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groove: Option<GrooveSettings>,
    #[serde(default)]
    pub loop_enabled: bool,
    #[serde(default)]
    pub loop_region: Option<LoopRegion>,
}

impl From<&TimelineDocument> for TimelineBody {
    fn from(document: &TimelineDocument) -> Self {
        Self {
            timeline: document.timeline.clone(),
            groove: Some(document.groove.clone()),
            loop_enabled: document.loop_enabled,
            loop_region: document.loop_region,
        }
    }
}
