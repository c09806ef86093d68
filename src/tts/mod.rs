//! Text-to-speech: synthesizer interface, voice assignment, speed
//! reconciliation and the synthesis stage.

pub mod command;
pub mod dubbing;
pub mod speed;
pub mod voices;

use crate::audio::wav::AudioClip;
use crate::error::{DubError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// A voice offered by a synthesizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voice {
    pub name: String,
    /// Free-form label, compared case-insensitively (`"Male"`, `"female"`).
    pub gender: String,
    /// Regional variant such as `ES` or `valencia`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

impl Voice {
    pub fn new(name: &str, gender: &str) -> Self {
        Self {
            name: name.to_string(),
            gender: gender.to_string(),
            region: None,
        }
    }

    pub fn with_region(mut self, region: &str) -> Self {
        self.region = Some(region.to_string());
        self
    }
}

/// Everything needed to render one utterance.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisRequest {
    pub text: String,
    pub voice: String,
    pub language: String,
    pub speed: f64,
    pub pitch: f64,
    pub volume_gain_db: f64,
    /// Where the rendered WAV must be written.
    pub output_path: PathBuf,
}

/// Speech synthesis backend.
///
/// Calls are blocking; backends that talk to async services wrap them
/// behind this synchronous boundary.
pub trait Synthesizer: Send + Sync {
    fn name(&self) -> &str;

    /// ISO 639-3 codes with at least one voice.
    fn languages(&self) -> Result<Vec<String>>;

    fn available_voices(&self, language: &str) -> Result<Vec<Voice>>;

    /// Render `request.text` and return the path of the WAV written.
    fn synthesize(&self, request: &SynthesisRequest) -> Result<PathBuf>;

    /// True if `speed` is honoured natively, so compression can re-render
    /// instead of post-processing the audio.
    fn supports_variable_rate(&self) -> bool {
        false
    }

    /// False if two requests in flight could clobber each other's output.
    fn supports_concurrent_requests(&self) -> bool {
        true
    }
}

impl<T: Synthesizer + ?Sized> Synthesizer for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn languages(&self) -> Result<Vec<String>> {
        (**self).languages()
    }

    fn available_voices(&self, language: &str) -> Result<Vec<Voice>> {
        (**self).available_voices(language)
    }

    fn synthesize(&self, request: &SynthesisRequest) -> Result<PathBuf> {
        (**self).synthesize(request)
    }

    fn supports_variable_rate(&self) -> bool {
        (**self).supports_variable_rate()
    }

    fn supports_concurrent_requests(&self) -> bool {
        (**self).supports_concurrent_requests()
    }
}

/// Mock synthesizer for testing.
///
/// Writes a constant-level WAV whose length is `seconds_per_char` times the
/// text length, divided by the requested speed.
#[derive(Debug, Clone)]
pub struct MockSynthesizer {
    voices: Vec<Voice>,
    language: String,
    seconds_per_char: f64,
    durations: Vec<(String, f64)>,
    sample_rate: u32,
    variable_rate: bool,
    sequential: bool,
    should_fail: bool,
    requests: Arc<Mutex<Vec<SynthesisRequest>>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl MockSynthesizer {
    pub fn new(language: &str) -> Self {
        Self {
            voices: Vec::new(),
            language: language.to_string(),
            seconds_per_char: 0.05,
            durations: Vec::new(),
            sample_rate: 16000,
            variable_rate: false,
            sequential: false,
            should_fail: false,
            requests: Arc::new(Mutex::new(Vec::new())),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_voice(mut self, voice: Voice) -> Self {
        self.voices.push(voice);
        self
    }

    pub fn with_seconds_per_char(mut self, seconds: f64) -> Self {
        self.seconds_per_char = seconds;
        self
    }

    /// Fixed duration at speed 1.0 for an exact text.
    pub fn with_duration(mut self, text: &str, seconds: f64) -> Self {
        self.durations.push((text.to_string(), seconds));
        self
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn with_variable_rate(mut self) -> Self {
        self.variable_rate = true;
        self
    }

    /// Declare that requests must not overlap. Each call then lingers a
    /// little so any overlap shows up in [`Self::max_in_flight`].
    pub fn with_sequential_requests(mut self) -> Self {
        self.sequential = true;
        self
    }

    /// Most requests ever handled at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    /// Requests received so far, in completion order.
    pub fn requests(&self) -> Vec<SynthesisRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    fn base_duration(&self, text: &str) -> f64 {
        self.durations
            .iter()
            .find(|(t, _)| t == text)
            .map(|(_, seconds)| *seconds)
            .unwrap_or(text.chars().count() as f64 * self.seconds_per_char)
    }

    fn render(&self, request: &SynthesisRequest) -> Result<PathBuf> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        if self.should_fail {
            return Err(DubError::Synthesis {
                message: "mock synthesis failure".to_string(),
            });
        }
        let speed = if self.variable_rate {
            request.speed.max(f64::MIN_POSITIVE)
        } else {
            1.0
        };
        let seconds = self.base_duration(&request.text) / speed;
        let len = (seconds * self.sample_rate as f64).round() as usize;
        write_clip(
            &AudioClip::new(vec![1000; len], self.sample_rate),
            &request.output_path,
        )?;
        Ok(request.output_path.clone())
    }
}

impl Synthesizer for MockSynthesizer {
    fn name(&self) -> &str {
        "mock"
    }

    fn languages(&self) -> Result<Vec<String>> {
        Ok(vec![self.language.clone()])
    }

    fn available_voices(&self, language: &str) -> Result<Vec<Voice>> {
        if language == self.language {
            Ok(self.voices.clone())
        } else {
            Ok(Vec::new())
        }
    }

    fn synthesize(&self, request: &SynthesisRequest) -> Result<PathBuf> {
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        let result = self.render(request);
        if self.sequential {
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn supports_variable_rate(&self) -> bool {
        self.variable_rate
    }

    fn supports_concurrent_requests(&self) -> bool {
        !self.sequential
    }
}

fn write_clip(clip: &AudioClip, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    clip.save(path)
}
