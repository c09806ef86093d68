//! Postprocessing and cleanup: assemble the dubbed track and remove
//! intermediate files.

use crate::audio::mix::{merge_tracks, overlay};
use crate::audio::wav::AudioClip;
use crate::defaults;
use crate::error::Result;
use crate::media::{MediaTool, Stems};
use crate::pipeline::context::RunSettings;
use crate::utterance::UtteranceRecord;
use std::path::{Path, PathBuf};

/// Files written by postprocessing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DubbedOutputs {
    pub vocals: PathBuf,
    pub audio: PathBuf,
    pub video: Option<PathBuf>,
}

/// Lay every `dubbed_path` onto a silent track at its record's `start`.
pub fn insert_vocals(
    records: &[UtteranceRecord],
    duration_secs: f64,
    sample_rate: u32,
) -> Result<AudioClip> {
    let mut track = AudioClip::silent(duration_secs, sample_rate);
    for record in records {
        let Some(path) = record.dubbed_path.as_deref() else {
            continue;
        };
        let clip = AudioClip::load(path)?.resampled(sample_rate);
        overlay(&mut track, &clip, record.start)?;
    }
    Ok(track)
}

pub fn dubbed_audio_path(settings: &RunSettings) -> PathBuf {
    settings.output_dir.join(format!(
        "{}{}.wav",
        defaults::DUBBED_AUDIO_FILE,
        defaults::language_suffix(&settings.target_language)
    ))
}

pub fn dubbed_video_path(settings: &RunSettings) -> PathBuf {
    settings.output_dir.join(format!(
        "{}{}.mp4",
        defaults::DUBBED_VIDEO_FILE,
        defaults::language_suffix(&settings.target_language)
    ))
}

/// Build the dubbed vocals, mix them with the background and mux the video.
///
/// `video` is the silent video stream; without it only audio is produced.
pub fn assemble(
    records: &[UtteranceRecord],
    stems: &Stems,
    video: Option<&Path>,
    media: &dyn MediaTool,
    settings: &RunSettings,
) -> Result<DubbedOutputs> {
    let background = AudioClip::load(&stems.background)?;
    let vocals = insert_vocals(records, background.duration_secs(), background.sample_rate)?;

    let vocals_path = settings.output_dir.join(defaults::DUBBED_VOCALS_FILE);
    vocals.save(&vocals_path)?;

    let mixed = merge_tracks(
        &background,
        &vocals,
        settings.background_volume_adjustment,
        settings.vocals_volume_adjustment,
        defaults::NORMALIZE_HEADROOM_DB,
    )?;
    let audio_path = dubbed_audio_path(settings);
    mixed.save(&audio_path)?;
    tracing::info!(path = %audio_path.display(), "Wrote dubbed audio");

    let video_path = match video {
        Some(video) => {
            let output = dubbed_video_path(settings);
            media.combine(video, &audio_path, &output)?;
            tracing::info!(path = %output.display(), "Wrote dubbed video");
            Some(output)
        }
        None => None,
    };

    Ok(DubbedOutputs {
        vocals: vocals_path,
        audio: audio_path,
        video: video_path,
    })
}

/// Delete the chunk and dub files referenced by `records`.
///
/// Missing files are skipped, so running it twice is harmless. Returns the
/// number of files removed.
pub fn cleanup(records: &[UtteranceRecord]) -> usize {
    let mut removed = 0;
    let paths = records
        .iter()
        .flat_map(|r| [r.path.as_deref(), r.dubbed_path.as_deref()])
        .flatten();
    for path in paths {
        if !path.exists() {
            continue;
        }
        match std::fs::remove_file(path) {
            Ok(()) => removed += 1,
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to remove file"),
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{SplitMedia, Stems};
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingMedia {
        combined: Mutex<Vec<PathBuf>>,
    }

    impl MediaTool for RecordingMedia {
        fn duration_secs(&self, _input: &Path) -> Result<f64> {
            Ok(0.0)
        }

        fn split(&self, _input: &Path, _output_dir: &Path, _stem: &str) -> Result<SplitMedia> {
            unreachable!("not used by postprocessing")
        }

        fn combine(&self, _video: &Path, _audio: &Path, output: &Path) -> Result<()> {
            self.combined.lock().unwrap().push(output.to_path_buf());
            Ok(())
        }
    }

    fn write(dir: &Path, name: &str, clip: &AudioClip) -> PathBuf {
        let path = dir.join(name);
        clip.save(&path).unwrap();
        path
    }

    #[test]
    fn test_vocals_are_placed_at_record_start() {
        let dir = TempDir::new().unwrap();
        let dub = write(dir.path(), "d.wav", &AudioClip::new(vec![500; 100], 1000));
        let mut record = UtteranceRecord::new(1.0, 1.1);
        record.dubbed_path = Some(dub);

        let track = insert_vocals(&[record], 2.0, 1000).unwrap();
        assert_eq!(track.samples.len(), 2000);
        assert_eq!(track.samples[999], 0);
        assert_eq!(track.samples[1000], 500);
        assert_eq!(track.samples[1099], 500);
        assert_eq!(track.samples[1100], 0);
    }

    #[test]
    fn test_dubs_are_resampled_to_track_rate() {
        let dir = TempDir::new().unwrap();
        let dub = write(dir.path(), "d.wav", &AudioClip::new(vec![500; 100], 500));
        let mut record = UtteranceRecord::new(0.0, 0.2);
        record.dubbed_path = Some(dub);

        let track = insert_vocals(&[record], 1.0, 1000).unwrap();
        assert_eq!(track.samples[150], 500);
    }

    #[test]
    fn test_assemble_writes_vocals_audio_and_video() {
        let dir = TempDir::new().unwrap();
        let background = write(dir.path(), "bg.wav", &AudioClip::new(vec![100; 2000], 1000));
        let dub = write(dir.path(), "d.wav", &AudioClip::new(vec![800; 500], 1000));
        let mut record = UtteranceRecord::new(0.5, 1.0);
        record.dubbed_path = Some(dub);

        let settings =
            RunSettings::new("in.mp4", "eng", "pt-BR").with_output_dir(dir.path().to_path_buf());
        let stems = Stems {
            vocals: background.clone(),
            background,
        };
        let media = RecordingMedia::default();
        let outputs = assemble(
            &[record],
            &stems,
            Some(&dir.path().join("video.mp4")),
            &media,
            &settings,
        )
        .unwrap();

        assert!(outputs.vocals.exists());
        assert_eq!(outputs.audio, dir.path().join("dubbed_audio_pt_br.wav"));
        assert_eq!(
            AudioClip::load(&outputs.audio).unwrap().samples.len(),
            2000
        );
        assert_eq!(outputs.video, Some(dir.path().join("dubbed_video_pt_br.mp4")));
        assert_eq!(media.combined.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_cleanup_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let chunk = write(dir.path(), "c.wav", &AudioClip::new(vec![0; 10], 1000));
        let dub = write(dir.path(), "d.wav", &AudioClip::new(vec![0; 10], 1000));
        let mut dubbed = UtteranceRecord::new(0.0, 1.0).with_path(chunk.clone());
        dubbed.dubbed_path = Some(dub.clone());
        let mut passthrough = UtteranceRecord::new(1.0, 2.0).with_path(chunk.clone());
        passthrough.dubbed_path = Some(chunk.clone());
        let records = vec![dubbed, passthrough];

        assert_eq!(cleanup(&records), 2);
        assert!(!chunk.exists() && !dub.exists());
        assert_eq!(cleanup(&records), 0);
    }
}
