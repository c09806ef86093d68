use crate::error::{DubError, Result};
use std::sync::Arc;

/// Trait for speech-to-text transcription.
///
/// This trait allows swapping implementations (real Whisper vs mock).
pub trait Transcriber: Send + Sync {
    /// Transcribe one utterance.
    ///
    /// # Arguments
    /// * `audio` - Audio samples as 16-bit PCM at 16kHz mono
    /// * `language` - ISO 639-3 code of the spoken language
    ///
    /// # Returns
    /// Transcribed text (possibly empty) or error
    fn transcribe(&self, audio: &[i16], language: &str) -> Result<String>;

    /// Get the name of the loaded model
    fn model_name(&self) -> &str;

    /// Check if the transcriber is ready
    fn is_ready(&self) -> bool;

    /// ISO 639-3 codes this transcriber accepts, or `None` if it does not say.
    fn supported_languages(&self) -> Option<Vec<String>> {
        None
    }
}

/// Implement Transcriber for Arc<T> so one model can serve several runs.
impl<T: Transcriber + ?Sized> Transcriber for Arc<T> {
    fn transcribe(&self, audio: &[i16], language: &str) -> Result<String> {
        (**self).transcribe(audio, language)
    }

    fn model_name(&self) -> &str {
        (**self).model_name()
    }

    fn is_ready(&self) -> bool {
        (**self).is_ready()
    }

    fn supported_languages(&self) -> Option<Vec<String>> {
        (**self).supported_languages()
    }
}

/// Mock transcriber for testing
#[derive(Debug, Clone)]
pub struct MockTranscriber {
    model_name: String,
    responses: Vec<String>,
    fail_on: Vec<usize>,
    languages: Option<Vec<String>>,
    calls: Arc<std::sync::atomic::AtomicUsize>,
}

impl MockTranscriber {
    /// Create a new mock transcriber with default settings
    pub fn new(model_name: &str) -> Self {
        Self {
            model_name: model_name.to_string(),
            responses: vec!["mock transcription".to_string()],
            fail_on: Vec::new(),
            languages: None,
            calls: Arc::new(std::sync::atomic::AtomicUsize::new(0)),
        }
    }

    /// Configure the mock to return a specific response for every call
    pub fn with_response(mut self, response: &str) -> Self {
        self.responses = vec![response.to_string()];
        self
    }

    /// Return `responses` in call order, repeating the last one.
    pub fn with_responses(mut self, responses: &[&str]) -> Self {
        self.responses = responses.iter().map(|r| r.to_string()).collect();
        self
    }

    /// Configure the mock to fail on every transcribe call
    pub fn with_failure(mut self) -> Self {
        self.fail_on = vec![usize::MAX];
        self
    }

    /// Fail only on the given zero-based call.
    pub fn with_failure_on(mut self, call: usize) -> Self {
        self.fail_on.push(call);
        self
    }

    pub fn with_languages(mut self, languages: &[&str]) -> Self {
        self.languages = Some(languages.iter().map(|l| l.to_string()).collect());
        self
    }

    /// Number of transcribe calls made so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

impl Transcriber for MockTranscriber {
    fn transcribe(&self, _audio: &[i16], _language: &str) -> Result<String> {
        let call = self
            .calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if self.fail_on.contains(&usize::MAX) || self.fail_on.contains(&call) {
            return Err(DubError::Transcription {
                message: "mock transcription failure".to_string(),
            });
        }
        let response = self
            .responses
            .get(call)
            .or_else(|| self.responses.last())
            .cloned()
            .unwrap_or_default();
        Ok(response)
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn is_ready(&self) -> bool {
        !self.fail_on.contains(&usize::MAX)
    }

    fn supported_languages(&self) -> Option<Vec<String>> {
        self.languages.clone()
    }
}
