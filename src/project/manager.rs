// Document manager - saving and loading timeline documents

use super::migration::DocumentMigrator;
use super::serialization::{body_from_ron, body_to_ron, metadata_from_json, metadata_to_json};
use super::types::{TimelineBody, TimelineDocument};
use super::{validate_document, ProjectError, MANIFEST_FILE, TIMELINE_FILE};
use crate::sequencer::groove::GrooveSettings;
use crate::sequencer::tempo_map::TempoMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use zip::{ZipArchive, ZipWriter};

/// Saves and loads timeline documents as ZIP containers
pub struct ProjectManager {
    default_sample_rate: f64,
}

impl ProjectManager {
    pub fn new(default_sample_rate: f64) -> Self {
        Self {
            default_sample_rate,
        }
    }

    pub fn default_sample_rate(&self) -> f64 {
        self.default_sample_rate
    }

    /// Empty document: 120 BPM, 4/4, straight groove, no loop
    pub fn create_new_document(&self, name: &str) -> Result<TimelineDocument, ProjectError> {
        let timeline = TempoMap::new(self.default_sample_rate)
            .map_err(|e| ProjectError::InvalidStructure(e.to_string()))?;
        Ok(TimelineDocument::new(
            name,
            timeline,
            GrooveSettings::straight(),
            false,
            None,
        ))
    }

    /// Write the document to `path`, updating its modification time
    ///
    /// The archive is written next to the target and renamed over it, so a
    /// failed save leaves the previous file intact.
    pub fn save_document<P: AsRef<Path>>(
        &self,
        document: &mut TimelineDocument,
        path: P,
    ) -> Result<(), ProjectError> {
        let path = path.as_ref();
        validate_document(document)?;
        document.metadata.touch();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let manifest = metadata_to_json(&document.metadata)?;
        let body = body_to_ron(&TimelineBody::from(&*document))?;

        let temp_path = path.with_extension("tmp");
        {
            let file = File::create(&temp_path)?;
            let mut zip_writer = ZipWriter::new(file);
            let options: zip::write::FileOptions<()> = zip::write::FileOptions::default();

            zip_writer.start_file(MANIFEST_FILE, options)?;
            zip_writer.write_all(manifest.as_bytes())?;
            zip_writer.start_file(TIMELINE_FILE, options)?;
            zip_writer.write_all(body.as_bytes())?;
            zip_writer.finish()?;
        }
        std::fs::rename(&temp_path, path)?;

        log::info!(
            "Saved '{}' ({} tempo events, {} time signature events) to {}",
            document.metadata.name,
            document.timeline.tempo_events().len(),
            document.timeline.time_signature_events().len(),
            path.display()
        );
        Ok(())
    }

    /// Read, migrate and validate a document
    pub fn load_document<P: AsRef<Path>>(&self, path: P) -> Result<TimelineDocument, ProjectError> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let mut archive = ZipArchive::new(file)?;

        let metadata = metadata_from_json(&read_entry(&mut archive, MANIFEST_FILE)?)?;
        let body = body_from_ron(&read_entry(&mut archive, TIMELINE_FILE)?)?;

        let result = DocumentMigrator::migrate_to_current(metadata, body)?;
        if result.migrated {
            for message in &result.messages {
                log::info!("Migration: {}", message);
            }
        }

        let document = result.document;
        validate_document(&document)?;
        log::info!("Loaded '{}' from {}", document.metadata.name, path.display());
        Ok(document)
    }
}

fn read_entry(archive: &mut ZipArchive<File>, name: &str) -> Result<String, ProjectError> {
    let mut entry = archive.by_name(name).map_err(|e| match e {
        zip::result::ZipError::FileNotFound => ProjectError::MissingFile(name.to_string()),
        other => ProjectError::Zip(other),
    })?;
    let mut text = String::new();
    entry.read_to_string(&mut text)?;
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequencer::groove::Accent;
    use crate::sequencer::playhead::LoopRegion;
    use crate::sequencer::tempo_map::TempoEvent;
    use crate::sequencer::timeline::TimeSignature;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_load_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("songs").join("groove.dawt");
        let manager = ProjectManager::new(48000.0);

        let mut document = manager.create_new_document("Groove").unwrap();
        document
            .timeline
            .insert_tempo(TempoEvent::new(96000, 140.0).unwrap());
        document
            .timeline
            .insert_time_signature(200_000, TimeSignature::three_four())
            .unwrap();
        document.groove =
            GrooveSettings::new(0.5, vec![Accent::new(0, 1.25).unwrap()]).unwrap();
        document.loop_enabled = true;
        document.loop_region = Some(LoopRegion::new(0, 96000).unwrap());

        manager.save_document(&mut document, &path).unwrap();
        let loaded = manager.load_document(&path).unwrap();

        assert_eq!(loaded.timeline, document.timeline);
        assert_eq!(loaded.groove, document.groove);
        assert_eq!(loaded.loop_region, document.loop_region);
        assert!(loaded.loop_enabled);
        assert_eq!(loaded.metadata, document.metadata);
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_missing_manifest() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bare.dawt");
        {
            let mut zip_writer = ZipWriter::new(File::create(&path).unwrap());
            let options: zip::write::FileOptions<()> = zip::write::FileOptions::default();
            zip_writer.start_file(TIMELINE_FILE, options).unwrap();
            zip_writer.write_all(b"()").unwrap();
            zip_writer.finish().unwrap();
        }

        let result = ProjectManager::new(48000.0).load_document(&path);
        assert!(matches!(result, Err(ProjectError::MissingFile(name)) if name == MANIFEST_FILE));
    }

    #[test]
    fn test_not_a_zip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("junk.dawt");
        std::fs::write(&path, b"not a zip archive").unwrap();

        let result = ProjectManager::new(48000.0).load_document(&path);
        assert!(matches!(result, Err(ProjectError::Zip(_))));
    }

    #[test]
    fn test_empty_name_not_saved() {
        let temp_dir = TempDir::new().unwrap();
        let manager = ProjectManager::new(48000.0);
        let mut document = manager.create_new_document("  ").unwrap();
        let result = manager.save_document(&mut document, temp_dir.path().join("x.dawt"));
        assert!(matches!(result, Err(ProjectError::InvalidStructure(_))));
    }
}
