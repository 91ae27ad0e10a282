use crate::config::{Config, TranslationModel};
use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};

/// A batch sentence whose synthesized speech came back over-speed and needs
/// a shorter translation.
#[derive(Debug, Clone, Serialize)]
pub struct FastSentence {
    pub sequence: i32,
    pub original_text: String,
    pub translated_text: String,
    pub speed: f64,
}

/// The five escalating-aggressiveness rewrites an LLM returns for one
/// sentence, keyed by level name.
#[derive(Debug, Clone, Deserialize)]
pub struct SimplificationCandidates {
    pub sequence: i32,
    pub minimal: Option<String>,
    pub slight: Option<String>,
    pub moderate: Option<String>,
    pub significant: Option<String>,
    pub extreme: Option<String>,
}

impl SimplificationCandidates {
    /// All non-empty candidates, in escalating order.
    pub fn ordered(&self) -> Vec<&str> {
        [
            &self.minimal,
            &self.slight,
            &self.moderate,
            &self.significant,
            &self.extreme,
        ]
        .into_iter()
        .filter_map(|c| c.as_deref())
        .filter(|s| !s.is_empty())
        .collect()
    }
}

#[derive(Deserialize)]
struct SimplifyResponse {
    candidates: Vec<SimplificationCandidates>,
}

/// One reqwest-based backend per LLM provider, selected once at startup by
/// `TRANSLATION_MODEL`. Generalizes the teacher's single `AiCurator::call_claude`
/// helper (JSON POST, auth header, strip ```json fences, parse typed JSON) to
/// four providers instead of one.
pub enum Simplifier {
    Deepseek { client: reqwest::Client, api_key: String },
    Gemini { client: reqwest::Client, api_key: String },
    Grok { client: reqwest::Client, api_key: String },
    Groq { client: reqwest::Client, api_key: String },
}

impl Simplifier {
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("failed to build simplifier reqwest client");

        let backend = match config.translation_model {
            TranslationModel::Deepseek => Simplifier::Deepseek {
                client,
                api_key: config
                    .deepseek_api_key
                    .clone()
                    .ok_or_else(|| missing_key("DEEPSEEK_API_KEY"))?,
            },
            TranslationModel::Gemini => Simplifier::Gemini {
                client,
                api_key: config
                    .gemini_api_key
                    .clone()
                    .ok_or_else(|| missing_key("GEMINI_API_KEY"))?,
            },
            TranslationModel::Grok => Simplifier::Grok {
                client,
                api_key: config
                    .grok_api_key
                    .clone()
                    .ok_or_else(|| missing_key("GROK_API_KEY"))?,
            },
            TranslationModel::Groq => Simplifier::Groq {
                client,
                api_key: config
                    .groq_api_key
                    .clone()
                    .ok_or_else(|| missing_key("GROQ_API_KEY"))?,
            },
        };

        Ok(backend)
    }

    pub async fn simplify(
        &self,
        sentences: &[FastSentence],
    ) -> Result<Vec<SimplificationCandidates>> {
        if sentences.is_empty() {
            return Ok(Vec::new());
        }

        let prompt = build_prompt(sentences);

        let (url, client, headers): (&str, &reqwest::Client, Vec<(&str, String)>) = match self {
            Simplifier::Deepseek { client, api_key } => (
                "https://api.deepseek.com/chat/completions",
                client,
                vec![("Authorization", format!("Bearer {api_key}"))],
            ),
            Simplifier::Gemini { client, api_key } => (
                "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash:generateContent",
                client,
                vec![("x-goog-api-key", api_key.clone())],
            ),
            Simplifier::Grok { client, api_key } => (
                "https://api.x.ai/v1/chat/completions",
                client,
                vec![("Authorization", format!("Bearer {api_key}"))],
            ),
            Simplifier::Groq { client, api_key } => (
                "https://api.groq.com/openai/v1/chat/completions",
                client,
                vec![("Authorization", format!("Bearer {api_key}"))],
            ),
        };

        let body = serde_json::json!({
            "model": default_model_name(self),
            "messages": [{ "role": "user", "content": prompt }],
            "max_tokens": 4096,
        });

        let mut request = client.post(url).json(&body);
        for (name, value) in headers {
            request = request.header(name, value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AppError::SimplificationFailed(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::SimplificationFailed(format!(
                "{status}: {text}"
            )));
        }

        let raw: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AppError::SimplificationFailed(format!("bad response body: {e}")))?;

        let content_text = extract_content(&raw).ok_or_else(|| {
            AppError::SimplificationFailed("no text content in LLM response".to_string())
        })?;

        let json_text = content_text
            .trim()
            .strip_prefix("```json")
            .or_else(|| content_text.trim().strip_prefix("```"))
            .map(|s| s.strip_suffix("```").unwrap_or(s))
            .unwrap_or(content_text)
            .trim();

        let parsed: SimplifyResponse = serde_json::from_str(json_text).map_err(|e| {
            AppError::SimplificationFailed(format!(
                "failed to parse simplifier JSON: {e} | body was: {json_text}"
            ))
        })?;

        Ok(parsed.candidates)
    }
}

fn default_model_name(backend: &Simplifier) -> &'static str {
    match backend {
        Simplifier::Deepseek { .. } => "deepseek-chat",
        Simplifier::Gemini { .. } => "gemini-1.5-flash",
        Simplifier::Grok { .. } => "grok-2-latest",
        Simplifier::Groq { .. } => "llama-3.3-70b-versatile",
    }
}

fn extract_content(raw: &serde_json::Value) -> Option<&str> {
    raw["choices"][0]["message"]["content"]
        .as_str()
        .or_else(|| raw["candidates"][0]["content"]["parts"][0]["text"].as_str())
}

fn build_prompt(sentences: &[FastSentence]) -> String {
    let listing: String = sentences
        .iter()
        .map(|s| {
            format!(
                "sequence {}: speed {:.2}x, text: \"{}\"",
                s.sequence, s.speed, s.translated_text
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"These translated sentences are spoken too fast once synthesized. For each one, produce five progressively shorter rewrites that preserve meaning: minimal, slight, moderate, significant, extreme. Keep the same language and speaker intent.

SENTENCES:
{listing}

Respond with ONLY a JSON object:
{{
  "candidates": [
    {{"sequence": 0, "minimal": "...", "slight": "...", "moderate": "...", "significant": "...", "extreme": "..."}}
  ]
}}"#
    )
}

fn missing_key(name: &str) -> AppError {
    AppError::SimplificationFailed(format!("{name} is required for the selected TRANSLATION_MODEL"))
}
