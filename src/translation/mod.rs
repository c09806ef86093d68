//! Translation of utterance texts.
//!
//! All utterance texts are joined into one script, wrapped and separated by
//! [`BREAK_MARKER`]:
//!
//! ```text
//! <BREAK>t1<BREAK>t2<BREAK>...<BREAK>tN<BREAK>
//! ```
//!
//! The translator is then called once per marker-separated part, so the
//! markers themselves never pass through a model and the result splits back
//! into exactly one text per utterance. Blank parts are not sent at all.

#[cfg(feature = "apertium")]
pub mod apertium;

use crate::defaults::BREAK_MARKER;
use crate::error::{DubError, Result};
use crate::utterance::UtteranceRecord;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Machine translation backend.
pub trait Translator: Send + Sync {
    /// Translate one piece of text between ISO 639-3 languages.
    fn translate(&self, text: &str, source_language: &str, target_language: &str)
    -> Result<String>;

    /// `(source, target)` pairs this backend can translate.
    fn language_pairs(&self) -> Result<Vec<(String, String)>>;

    fn name(&self) -> &str;
}

impl<T: Translator + ?Sized> Translator for Arc<T> {
    fn translate(
        &self,
        text: &str,
        source_language: &str,
        target_language: &str,
    ) -> Result<String> {
        (**self).translate(text, source_language, target_language)
    }

    fn language_pairs(&self) -> Result<Vec<(String, String)>> {
        (**self).language_pairs()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Join texts into a marker-wrapped script.
///
/// `["a", ""]` becomes `<BREAK>a<BREAK><BREAK>`; an empty list becomes
/// `<BREAK><BREAK>`.
pub fn join_script<S: AsRef<str>>(texts: &[S]) -> String {
    let mut script = String::from(BREAK_MARKER);
    for (index, text) in texts.iter().enumerate() {
        if index > 0 {
            script.push_str(BREAK_MARKER);
        }
        script.push_str(text.as_ref());
    }
    script.push_str(BREAK_MARKER);
    script
}

/// Script for a record list: trimmed texts, missing text as empty.
pub fn generate_script(records: &[UtteranceRecord]) -> String {
    let texts: Vec<&str> = records
        .iter()
        .map(|record| record.text.as_deref().unwrap_or("").trim())
        .collect();
    join_script(&texts)
}

/// Drop exactly one protecting marker at each end.
fn strip_outer_markers(script: &str) -> &str {
    let body = script.strip_prefix(BREAK_MARKER).unwrap_or(script);
    body.strip_suffix(BREAK_MARKER).unwrap_or(body)
}

/// Inverse of [`join_script`].
pub fn split_script(script: &str) -> Vec<String> {
    strip_outer_markers(script)
        .split(BREAK_MARKER)
        .map(str::to_string)
        .collect()
}

/// Translate every marker-separated part of `script`, leaving blank parts
/// untouched, and join the results with the marker again.
pub fn translate_script(
    translator: &dyn Translator,
    script: &str,
    source_language: &str,
    target_language: &str,
) -> Result<String> {
    let mut parts = Vec::new();
    for part in script.split(BREAK_MARKER) {
        if part.trim().is_empty() {
            parts.push(part.to_string());
        } else {
            parts.push(translator.translate(part, source_language, target_language)?);
        }
    }
    Ok(parts.join(BREAK_MARKER))
}

/// Fills `translated_text` for every record marked for dubbing.
pub struct TranslationEngine<'a> {
    translator: &'a dyn Translator,
}

impl<'a> TranslationEngine<'a> {
    pub fn new(translator: &'a dyn Translator) -> Self {
        Self { translator }
    }

    /// Translate the whole record list in one script.
    ///
    /// Returns a list of the same length. Fails with
    /// [`DubError::SegmentCountMismatch`] if the translated script does not
    /// split back into one part per record.
    pub fn translate_utterances(
        &self,
        records: &[UtteranceRecord],
        source_language: &str,
        target_language: &str,
    ) -> Result<Vec<UtteranceRecord>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let script = generate_script(records);
        let translated = translate_script(
            self.translator,
            &script,
            source_language,
            target_language,
        )?;
        let segments = split_script(&translated);

        if segments.len() != records.len() {
            return Err(DubError::SegmentCountMismatch {
                expected: records.len(),
                actual: segments.len(),
            });
        }

        tracing::debug!(
            translator = self.translator.name(),
            segments = segments.len(),
            "Translated script"
        );

        Ok(records
            .iter()
            .zip(segments)
            .map(|(record, segment)| {
                let mut record = record.clone();
                if record.for_dubbing {
                    record.translated_text = Some(segment.trim().to_string());
                }
                record
            })
            .collect())
    }
}

/// Whether `translator` lists the `(source, target)` pair.
pub fn supports_pair(
    translator: &dyn Translator,
    source_language: &str,
    target_language: &str,
) -> Result<bool> {
    Ok(translator
        .language_pairs()?
        .iter()
        .any(|(source, target)| source == source_language && target == target_language))
}

/// Mock translator for testing.
///
/// Translates by dictionary lookup, falling back to `"<target>:<text>"`.
#[derive(Debug, Clone, Default)]
pub struct MockTranslator {
    dictionary: HashMap<String, String>,
    pairs: Vec<(String, String)>,
    should_fail: bool,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_translation(mut self, text: &str, translation: &str) -> Self {
        self.dictionary
            .insert(text.to_string(), translation.to_string());
        self
    }

    pub fn with_pair(mut self, source: &str, target: &str) -> Self {
        self.pairs.push((source.to_string(), target.to_string()));
        self
    }

    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    /// Texts passed to `translate`, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl Translator for MockTranslator {
    fn translate(
        &self,
        text: &str,
        _source_language: &str,
        target_language: &str,
    ) -> Result<String> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(text.to_string());
        }
        if self.should_fail {
            return Err(DubError::Translation {
                message: "mock translation failure".to_string(),
            });
        }
        Ok(self
            .dictionary
            .get(text)
            .cloned()
            .unwrap_or_else(|| format!("{}:{}", target_language, text)))
    }

    fn language_pairs(&self) -> Result<Vec<(String, String)>> {
        Ok(self.pairs.clone())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records(texts: &[&str]) -> Vec<UtteranceRecord> {
        texts
            .iter()
            .enumerate()
            .map(|(i, text)| UtteranceRecord::new(i as f64, i as f64 + 1.0).with_text(*text))
            .collect()
    }

    #[test]
    fn test_script_generation_examples() {
        assert_eq!(join_script(&["Hello, world!"]), "<BREAK>Hello, world!<BREAK>");
        assert_eq!(join_script::<&str>(&[]), "<BREAK><BREAK>");
        assert_eq!(join_script(&["a", ""]), "<BREAK>a<BREAK><BREAK>");
    }

    #[test]
    fn test_generate_script_trims_and_fills_missing_text() {
        let mut list = records(&["  Hello  ", "world"]);
        list.push(UtteranceRecord::new(5.0, 6.0));
        assert_eq!(generate_script(&list), "<BREAK>Hello<BREAK>world<BREAK><BREAK>");
    }

    #[test]
    fn test_split_inverts_join() {
        let cases: Vec<Vec<&str>> = vec![
            vec!["Hello, world!"],
            vec!["a", ""],
            vec![""],
            vec!["", ""],
            vec!["", "b", ""],
            vec!["one", "two", "three"],
        ];
        for texts in cases {
            assert_eq!(split_script(&join_script(&texts)), texts, "texts: {texts:?}");
        }
    }

    #[test]
    fn test_split_keeps_whitespace_of_edge_parts() {
        let cases: Vec<Vec<&str>> = vec![
            vec!["a", " b "],
            vec!["a", " "],
            vec![" ", "a"],
            vec!["\tx\n"],
        ];
        for texts in cases {
            assert_eq!(split_script(&join_script(&texts)), texts, "texts: {texts:?}");
        }
    }

    #[test]
    fn test_split_strips_only_one_marker_per_end() {
        assert_eq!(split_script("<BREAK><BREAK>a<BREAK>"), vec!["", "a"]);
    }

    #[test]
    fn test_translate_script_skips_blank_parts() {
        let translator = MockTranslator::new();
        let translated =
            translate_script(&translator, "<BREAK>a<BREAK> <BREAK>b<BREAK>", "eng", "cat")
                .unwrap();
        assert_eq!(translated, "<BREAK>cat:a<BREAK> <BREAK>cat:b<BREAK>");
        assert_eq!(translator.calls(), vec!["a", "b"]);
    }

    #[test]
    fn test_engine_fills_translated_text_for_dubbed_records_only() {
        let translator = MockTranslator::new()
            .with_translation("Hello", "Hola")
            .with_translation("Bye", "Adéu");
        let mut input = records(&["Hello", "", "Bye"]);
        input[2].for_dubbing = false;

        let output = TranslationEngine::new(&translator)
            .translate_utterances(&input, "eng", "cat")
            .unwrap();

        assert_eq!(output.len(), 3);
        assert_eq!(output[0].translated_text.as_deref(), Some("Hola"));
        assert_eq!(output[1].translated_text, None);
        assert_eq!(output[2].translated_text, None);
        assert_eq!(output[0].text.as_deref(), Some("Hello"));
    }

    #[test]
    fn test_engine_calls_translator_once_per_non_empty_text() {
        let translator = MockTranslator::new();
        let input = records(&["a", "", "b", "  "]);
        TranslationEngine::new(&translator)
            .translate_utterances(&input, "eng", "cat")
            .unwrap();
        assert_eq!(translator.calls(), vec!["a", "b"]);
    }

    #[test]
    fn test_engine_on_empty_list_does_not_call_translator() {
        let translator = MockTranslator::new();
        let output = TranslationEngine::new(&translator)
            .translate_utterances(&[], "eng", "cat")
            .unwrap();
        assert!(output.is_empty());
        assert!(translator.calls().is_empty());
    }

    #[test]
    fn test_engine_rejects_translator_that_adds_a_break() {
        let translator = MockTranslator::new().with_translation("a", "x<BREAK>y");
        let input = records(&["a", "b"]);
        match TranslationEngine::new(&translator).translate_utterances(&input, "eng", "cat") {
            Err(DubError::SegmentCountMismatch { expected, actual }) => {
                assert_eq!(expected, 2);
                assert_eq!(actual, 3);
            }
            other => panic!("expected SegmentCountMismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_engine_propagates_translator_failure() {
        let translator = MockTranslator::new().with_failure();
        let result =
            TranslationEngine::new(&translator).translate_utterances(&records(&["a"]), "eng", "cat");
        assert!(matches!(result, Err(DubError::Translation { .. })));
    }

    #[test]
    fn test_supports_pair_checks_listing() {
        let translator = MockTranslator::new().with_pair("eng", "cat");
        assert!(supports_pair(&translator, "eng", "cat").unwrap());
        assert!(!supports_pair(&translator, "cat", "eng").unwrap());
    }
}
