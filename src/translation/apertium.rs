//! Apertium-compatible HTTP translation server (APy).
//!
//! Endpoints used:
//! - `GET {server}/translate?q=..&langpair=src|tgt&markUnknown=no`
//! - `GET {server}/listPairs`

use crate::error::{DubError, Result};
use crate::translation::Translator;
use serde::Deserialize;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TranslateResponse {
    response_data: TranslatedText,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TranslatedText {
    translated_text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListPairsResponse {
    response_data: Vec<LanguagePair>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LanguagePair {
    source_language: String,
    target_language: String,
}

pub struct ApertiumTranslator {
    server: String,
    client: reqwest::blocking::Client,
}

impl std::fmt::Debug for ApertiumTranslator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApertiumTranslator")
            .field("server", &self.server)
            .finish()
    }
}

impl ApertiumTranslator {
    pub fn new(server: &str) -> Result<Self> {
        let server = server.trim().trim_end_matches('/').to_string();
        if server.is_empty() {
            return Err(DubError::ConfigInvalidValue {
                key: "translation.apertium_server".to_string(),
                message: "an Apertium server URL is required".to_string(),
            });
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| DubError::Translation {
                message: format!("Failed to build HTTP client: {e}"),
            })?;
        Ok(Self { server, client })
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    fn endpoint(&self, path: &str, params: &[(&str, &str)]) -> Result<reqwest::Url> {
        let base = format!("{}/{}", self.server, path);
        let parsed = if params.is_empty() {
            reqwest::Url::parse(&base)
        } else {
            reqwest::Url::parse_with_params(&base, params)
        };
        parsed.map_err(|e| {
            DubError::ConfigInvalidValue {
                key: "translation.apertium_server".to_string(),
                message: format!("invalid URL '{base}': {e}"),
            }
        })
    }

    fn get(&self, url: reqwest::Url) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| DubError::Translation {
                message: format!("Apertium request failed: {e}"),
            })?;

        if !response.status().is_success() {
            return Err(DubError::Translation {
                message: format!("Apertium server returned status {}", response.status()),
            });
        }

        response.text().map_err(|e| DubError::Translation {
            message: format!("Failed to read Apertium response: {e}"),
        })
    }
}

fn parse_translation(body: &str) -> Result<String> {
    let parsed: TranslateResponse =
        serde_json::from_str(body).map_err(|e| DubError::Translation {
            message: format!("Failed to parse Apertium response: {e}"),
        })?;
    Ok(parsed.response_data.translated_text.trim_end().to_string())
}

/// Pairs with three-letter codes on both sides; variants like `cat_valencia`
/// are dropped.
fn parse_pairs(body: &str) -> Result<Vec<(String, String)>> {
    let parsed: ListPairsResponse =
        serde_json::from_str(body).map_err(|e| DubError::Translation {
            message: format!("Failed to parse Apertium pair list: {e}"),
        })?;
    Ok(parsed
        .response_data
        .into_iter()
        .filter(|pair| pair.source_language.len() == 3 && pair.target_language.len() == 3)
        .map(|pair| (pair.source_language, pair.target_language))
        .collect())
}

impl Translator for ApertiumTranslator {
    fn translate(
        &self,
        text: &str,
        source_language: &str,
        target_language: &str,
    ) -> Result<String> {
        let langpair = format!("{source_language}|{target_language}");
        let url = self.endpoint(
            "translate",
            &[("q", text), ("langpair", langpair.as_str()), ("markUnknown", "no")],
        )?;
        parse_translation(&self.get(url)?)
    }

    fn language_pairs(&self) -> Result<Vec<(String, String)>> {
        let url = self.endpoint("listPairs", &[])?;
        parse_pairs(&self.get(url)?)
    }

    fn name(&self) -> &str {
        "apertium"
    }
}
