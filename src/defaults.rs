//! Default configuration constants for opendub.
//!
//! Shared by the config types, the pipeline stages and the CLI so that the
//! same numbers are used everywhere.

/// Delimiter placed between utterance texts in a translation script.
///
/// Chosen because it does not occur in natural text; translators are called
/// once per delimited part so the marker itself is never translated.
pub const BREAK_MARKER: &str = "<BREAK>";

/// Playback speed every utterance starts with.
pub const DEFAULT_SPEED: f64 = 1.0;

/// Default pitch adjustment passed to synthesizers.
pub const DEFAULT_PITCH: f64 = 0.0;

/// Default volume gain in dB passed to synthesizers.
pub const DEFAULT_VOLUME_GAIN_DB: f64 = 16.0;

/// Maximum compression applied to a dubbed utterance.
///
/// Beyond 1.3x the pitch and intelligibility distortion of the speed-up is
/// audible enough that overlapping speech is the lesser evil.
pub const MAX_SPEED: f64 = 1.3;

/// Chunk size in milliseconds for the time-domain speed-up.
pub const DEFAULT_CHUNK_SIZE_MS: u32 = 150;

/// Voice used when the synthesizer offers no voices for the target language.
pub const FALLBACK_VOICE: &str = "ona";

/// Speaker identifier used by single-speaker diarization.
pub const DEFAULT_SPEAKER_ID: &str = "speaker_01";

/// Sample rate used by transcription models.
pub const STT_SAMPLE_RATE: u32 = 16000;

/// Sample rate the audio track is extracted at and mixed in.
pub const MIX_SAMPLE_RATE: u32 = 44100;

/// Default RMS threshold for the energy segmenter.
pub const SEGMENT_THRESHOLD: f32 = 0.02;

/// Silence needed to close a speech segment, in milliseconds.
pub const MIN_SILENCE_MS: u32 = 500;

/// Segments shorter than this are discarded, in milliseconds.
pub const MIN_SPEECH_MS: u32 = 300;

/// Padding added around each detected segment, in milliseconds.
pub const SEGMENT_PADDING_MS: u32 = 100;

/// Frame length used by the energy segmenter, in milliseconds.
pub const SEGMENT_FRAME_MS: u32 = 30;

/// Median fundamental frequency below which a voice is labelled Male.
pub const GENDER_PITCH_SPLIT_HZ: f32 = 165.0;

/// Longest sample fed to the gender classifier, in seconds.
pub const GENDER_SAMPLE_MAX_SECS: f64 = 10.0;

/// Gain applied to dubbed vocals before mixing, in dB.
pub const VOCALS_VOLUME_ADJUSTMENT: f64 = 5.0;

/// Gain applied to the background track before mixing, in dB.
pub const BACKGROUND_VOLUME_ADJUSTMENT: f64 = 0.0;

/// Headroom left by peak normalisation, in dB.
pub const NORMALIZE_HEADROOM_DB: f64 = 0.1;

/// Base name of the persisted utterance metadata file.
pub const UTTERANCE_METADATA_FILE_NAME: &str = "utterance_metadata";

/// File name of the dubbed vocals track.
pub const DUBBED_VOCALS_FILE: &str = "dubbed_vocals.wav";

/// Base name of the mixed dubbed audio file.
pub const DUBBED_AUDIO_FILE: &str = "dubbed_audio";

/// Base name of the dubbed video file.
pub const DUBBED_VIDEO_FILE: &str = "dubbed_video";

/// Default output directory.
pub const OUTPUT_DIRECTORY: &str = "output";

/// Number of parallel synthesis workers.
pub const SYNTHESIS_WORKERS: usize = 1;

/// Video containers accepted as input.
pub const ACCEPTED_VIDEO_FORMATS: &[&str] = &["mp4", "mkv", "mov", "webm"];

/// File name suffix for a target language: `cat` → `_cat`, `pt-BR` → `_pt_br`.
pub fn language_suffix(language: &str) -> String {
    format!("_{}", language.replace('-', "_").to_lowercase())
}

/// Report the GPU backend compiled into this build.
///
/// Returns a human-readable name based on the compile-time feature flags.
/// Only one GPU backend can be active at a time; if none is enabled, returns "CPU".
pub fn gpu_backend() -> &'static str {
    if cfg!(feature = "cuda") {
        "CUDA"
    } else if cfg!(feature = "vulkan") {
        "Vulkan"
    } else if cfg!(feature = "hipblas") {
        "HipBLAS (AMD)"
    } else if cfg!(feature = "openblas") {
        "OpenBLAS"
    } else {
        "CPU"
    }
}
