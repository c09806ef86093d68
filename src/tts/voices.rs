//! Voice assignment and default synthesis properties.
//!
//! Every speaker gets exactly one voice for the whole run. The choice is made
//! the first time a speaker is seen and memoised; voices already present on
//! the records seed the memo, so running assignment twice changes nothing.

use crate::defaults;
use crate::tts::Voice;
use crate::utterance::{SsmlGender, UtteranceRecord};
use std::collections::{BTreeMap, HashMap};

/// Pick a voice for a gender, preferring `region`.
///
/// Candidates are the voices whose gender matches case-insensitively (all
/// voices when the gender is unknown). Voices of the preferred region are
/// moved to the front but others stay eligible. When no voice has the
/// requested gender, the first voice of any gender is used.
pub fn select_voice(
    voices: &[Voice],
    gender: Option<SsmlGender>,
    region: Option<&str>,
) -> Option<String> {
    let mut candidates: Vec<&Voice> = voices
        .iter()
        .filter(|voice| gender.is_none_or(|g| g.matches(&voice.gender)))
        .collect();

    if candidates.is_empty() {
        let first = voices.first()?;
        tracing::warn!(
            gender = ?gender,
            voice = %first.name,
            "No voice of the requested gender, using first available"
        );
        return Some(first.name.clone());
    }

    if let Some(region) = region.filter(|r| !r.is_empty()) {
        // Stable: keeps the synthesizer's own order within each group.
        candidates.sort_by_key(|voice| {
            !voice
                .region
                .as_deref()
                .is_some_and(|r| r.eq_ignore_ascii_case(region))
        });
    }

    candidates.first().map(|voice| voice.name.clone())
}

fn speaker_key(record: &UtteranceRecord) -> String {
    record
        .speaker_id
        .clone()
        .unwrap_or_else(|| defaults::DEFAULT_SPEAKER_ID.to_string())
}

/// Assign `assigned_voice` on every record, one voice per speaker.
///
/// With no voices at all, every speaker gets [`defaults::FALLBACK_VOICE`].
pub fn assign_voices(
    records: &[UtteranceRecord],
    voices: &[Voice],
    region: Option<&str>,
) -> Vec<UtteranceRecord> {
    let mut memo: HashMap<String, String> = HashMap::new();
    for record in records {
        if let Some(voice) = &record.assigned_voice {
            memo.entry(speaker_key(record))
                .or_insert_with(|| voice.clone());
        }
    }

    if voices.is_empty() {
        tracing::warn!(
            fallback = defaults::FALLBACK_VOICE,
            "Synthesizer offers no voices for the target language"
        );
    }

    records
        .iter()
        .map(|record| {
            let speaker = speaker_key(record);
            let voice = memo
                .entry(speaker.clone())
                .or_insert_with(|| {
                    let voice = select_voice(voices, record.ssml_gender, region)
                        .unwrap_or_else(|| defaults::FALLBACK_VOICE.to_string());
                    tracing::info!(speaker = %speaker, voice = %voice, "Assigned voice");
                    voice
                })
                .clone();
            let mut record = record.clone();
            record.assigned_voice = Some(voice);
            record
        })
        .collect()
}

/// Speaker → voice mapping present on the records.
pub fn speaker_voice_map(records: &[UtteranceRecord]) -> BTreeMap<String, String> {
    records
        .iter()
        .filter_map(|record| {
            record
                .assigned_voice
                .as_ref()
                .map(|voice| (speaker_key(record), voice.clone()))
        })
        .collect()
}

/// Fill pitch, speed and volume with defaults where they are missing.
///
/// Values already present are kept, so a raised speed is never reset.
pub fn apply_voice_properties(records: &[UtteranceRecord]) -> Vec<UtteranceRecord> {
    records
        .iter()
        .map(|record| {
            let mut record = record.clone();
            record.pitch.get_or_insert(defaults::DEFAULT_PITCH);
            record.speed.get_or_insert(defaults::DEFAULT_SPEED);
            record
                .volume_gain_db
                .get_or_insert(defaults::DEFAULT_VOLUME_GAIN_DB);
            record
        })
        .collect()
}
