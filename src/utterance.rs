//! Utterance records and their persisted metadata.
//!
//! An [`UtteranceRecord`] is created by segmentation and then extended by every
//! later stage. Fields only ever accumulate: a stage may fill or refine a field
//! but never clear one that an earlier stage wrote. [`check_no_field_loss`]
//! enforces that between stages.

use crate::defaults::{UTTERANCE_METADATA_FILE_NAME, language_suffix};
use crate::error::{DubError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Coarse voice gender used to pick a synthesizer voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SsmlGender {
    Male,
    Female,
}

impl SsmlGender {
    pub fn as_str(&self) -> &'static str {
        match self {
            SsmlGender::Male => "Male",
            SsmlGender::Female => "Female",
        }
    }

    /// Case-insensitive comparison against a gender label from a voice list.
    pub fn matches(&self, label: &str) -> bool {
        self.as_str().eq_ignore_ascii_case(label.trim())
    }
}

impl std::fmt::Display for SsmlGender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SsmlGender {
    type Err = DubError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "male" => Ok(SsmlGender::Male),
            "female" => Ok(SsmlGender::Female),
            other => Err(DubError::Other(format!("Unknown SSML gender '{}'", other))),
        }
    }
}

/// One detected speech segment and everything learnt about it so far.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UtteranceRecord {
    /// Segment start in seconds from the beginning of the media.
    pub start: f64,
    /// Segment end in seconds (exclusive).
    pub end: f64,
    /// Audio chunk covering `[start, end)`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speaker_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssml_gender: Option<SsmlGender>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    pub for_dubbing: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translated_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_voice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pitch: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_gain_db: Option<f64>,
    /// Chunk size in milliseconds, set when the time-domain speed-up ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dubbed_path: Option<PathBuf>,
}

impl UtteranceRecord {
    pub fn new(start: f64, end: f64) -> Self {
        Self {
            start,
            end,
            ..Default::default()
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_speaker(mut self, speaker_id: impl Into<String>, gender: SsmlGender) -> Self {
        self.speaker_id = Some(speaker_id.into());
        self.ssml_gender = Some(gender);
        self
    }

    /// Sets `text` and derives `for_dubbing` from it.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        self.for_dubbing = !text.trim().is_empty();
        self.text = Some(text);
        self
    }

    /// Length of the original speech window: the time budget for the dub.
    pub fn reference_length(&self) -> f64 {
        self.end - self.start
    }

    /// Names of the optional fields that currently hold a value.
    pub fn present_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.path.is_some() {
            fields.push("path");
        }
        if self.speaker_id.is_some() {
            fields.push("speaker_id");
        }
        if self.ssml_gender.is_some() {
            fields.push("ssml_gender");
        }
        if self.text.is_some() {
            fields.push("text");
        }
        if self.translated_text.is_some() {
            fields.push("translated_text");
        }
        if self.assigned_voice.is_some() {
            fields.push("assigned_voice");
        }
        if self.pitch.is_some() {
            fields.push("pitch");
        }
        if self.speed.is_some() {
            fields.push("speed");
        }
        if self.volume_gain_db.is_some() {
            fields.push("volume_gain_db");
        }
        if self.chunk_size.is_some() {
            fields.push("chunk_size");
        }
        if self.dubbed_path.is_some() {
            fields.push("dubbed_path");
        }
        fields
    }
}

/// Verify that a stage kept every record and every field it was given.
///
/// Records are compared positionally; the span `[start, end)` must be
/// unchanged and no optional field may go from set to unset.
pub fn check_no_field_loss(
    stage: &str,
    before: &[UtteranceRecord],
    after: &[UtteranceRecord],
) -> Result<()> {
    if before.len() != after.len() {
        return Err(DubError::StageLengthMismatch {
            stage: stage.to_string(),
            expected: before.len(),
            actual: after.len(),
        });
    }

    for (index, (old, new)) in before.iter().zip(after).enumerate() {
        if old.start != new.start || old.end != new.end {
            return Err(DubError::FieldDropped {
                stage: stage.to_string(),
                index,
                field: "start/end".to_string(),
            });
        }
        let kept = new.present_fields();
        if let Some(field) = old
            .present_fields()
            .into_iter()
            .find(|field| !kept.contains(field))
        {
            return Err(DubError::FieldDropped {
                stage: stage.to_string(),
                index,
                field: field.to_string(),
            });
        }
    }
    Ok(())
}

/// `utterance_metadata_<lang>.json`
pub fn metadata_file_name(target_language: &str) -> String {
    format!(
        "{}{}.json",
        UTTERANCE_METADATA_FILE_NAME,
        language_suffix(target_language)
    )
}

/// Write the records as a pretty JSON array to
/// `<output_dir>/utterance_metadata_<lang>.json`.
///
/// The JSON is written to a temporary file, flushed and synced, then copied
/// over the destination, so a crash never leaves a half-written file behind.
pub fn save_utterance_metadata(
    output_dir: &Path,
    target_language: &str,
    records: &[UtteranceRecord],
) -> Result<PathBuf> {
    let destination = output_dir.join(metadata_file_name(target_language));
    let json = serde_json::to_string_pretty(records)?;

    let mut temp = tempfile::NamedTempFile::new()?;
    temp.write_all(json.as_bytes())?;
    temp.flush()?;
    temp.as_file().sync_all()?;

    fs::create_dir_all(output_dir)?;
    fs::copy(temp.path(), &destination)?;
    temp.close()?;

    tracing::debug!(
        path = %destination.display(),
        records = records.len(),
        "Saved utterance metadata"
    );
    Ok(destination)
}

pub fn load_utterance_metadata(path: &Path) -> Result<Vec<UtteranceRecord>> {
    let contents = fs::read_to_string(path)?;
    let records = serde_json::from_str(&contents)?;
    Ok(records)
}
