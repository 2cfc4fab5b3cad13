// Document format migration
// Upgrades older timeline documents to the current format version

use super::types::{DocumentMetadata, DocumentVersion, TimelineBody, TimelineDocument};
use super::ProjectError;
use crate::sequencer::groove::GrooveSettings;

/// Migration result
#[derive(Debug, Clone)]
pub struct MigrationResult {
    pub document: TimelineDocument,
    pub migrated: bool,
    pub messages: Vec<String>,
}

/// Whether a stored version can be opened
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompatibilityInfo {
    pub can_load: bool,
    pub needs_migration: bool,
    pub warning: Option<String>,
}

pub struct DocumentMigrator;

impl DocumentMigrator {
    pub fn check_compatibility(version: DocumentVersion) -> CompatibilityInfo {
        let current = DocumentVersion::current();

        if version.major == 0 || version.major > current.major {
            return CompatibilityInfo {
                can_load: false,
                needs_migration: false,
                warning: Some(format!(
                    "Document version v{} is not supported (current v{})",
                    version, current
                )),
            };
        }

        if version >= current {
            // Newer minors only add optional fields
            let warning = (version > current).then(|| {
                format!(
                    "Document version v{} is newer than v{}, unknown fields are ignored",
                    version, current
                )
            });
            return CompatibilityInfo {
                can_load: true,
                needs_migration: false,
                warning,
            };
        }

        CompatibilityInfo {
            can_load: true,
            needs_migration: true,
            warning: Some(format!(
                "Document version v{} will be migrated to v{}",
                version, current
            )),
        }
    }

    /// Assemble a document from its parts, upgrading older formats
    pub fn migrate_to_current(
        mut metadata: DocumentMetadata,
        body: TimelineBody,
    ) -> Result<MigrationResult, ProjectError> {
        let info = Self::check_compatibility(metadata.version);
        if !info.can_load {
            return Err(ProjectError::InvalidVersion(metadata.version.to_string()));
        }

        let mut messages = Vec::new();
        let mut groove = body.groove;

        if info.needs_migration && metadata.version.minor < 1 {
            messages.push("Migrating from v1.0 to v1.1: adding default groove".to_string());
            groove.get_or_insert_with(GrooveSettings::straight);
        }

        let groove = groove.ok_or_else(|| {
            ProjectError::InvalidStructure(format!(
                "v{} document is missing groove settings",
                metadata.version
            ))
        })?;

        if info.needs_migration {
            metadata.version = DocumentVersion::current();
            messages.push(format!("Migrated to v{}", metadata.version));
        }

        Ok(MigrationResult {
            document: TimelineDocument {
                metadata,
                timeline: body.timeline,
                groove,
                loop_enabled: body.loop_enabled,
                loop_region: body.loop_region,
            },
            migrated: info.needs_migration,
            messages,
        })
    }
}
