use crate::error::{AppError, Result};
use async_trait::async_trait;
use serde::Deserialize;

/// HTTP client for the speech-synthesis model. Analogous in shape to the
/// teacher's `NavidromeClient`: one endpoint, one API key, a `reqwest::Client`
/// with an explicit timeout.
#[async_trait]
pub trait TtsClient: Send + Sync {
    /// Synthesize `text` cloning the voice in `prompt_audio` (WAV bytes).
    /// Returns int16 PCM and the sample rate it was produced at.
    async fn speech_synth(&self, prompt_audio: &[u8], text: &str) -> Result<(Vec<i16>, u32)>;
}

pub struct HttpTtsClient {
    endpoint: String,
    api_key: String,
    client: reqwest::Client,
}

impl HttpTtsClient {
    pub fn new(endpoint: String, api_key: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .expect("failed to build TTS reqwest client");
        Self { endpoint, api_key, client }
    }
}

#[derive(Deserialize)]
struct SynthResponse {
    sample_rate: u32,
    /// Base64-encoded little-endian int16 PCM.
    pcm_base64: String,
}

#[async_trait]
impl TtsClient for HttpTtsClient {
    async fn speech_synth(&self, prompt_audio: &[u8], text: &str) -> Result<(Vec<i16>, u32)> {
        use base64::Engine as _;

        let form = reqwest::multipart::Form::new()
            .text("text", text.to_string())
            .part(
                "prompt_audio",
                reqwest::multipart::Part::bytes(prompt_audio.to_vec())
                    .file_name("prompt.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| AppError::SynthesisFailed(0, e.to_string()))?,
            );

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| AppError::SynthesisFailed(0, format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::SynthesisFailed(
                status.as_u16() as i32,
                body,
            ));
        }

        let parsed: SynthResponse = response
            .json()
            .await
            .map_err(|e| AppError::SynthesisFailed(0, format!("bad response body: {e}")))?;

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(parsed.pcm_base64)
            .map_err(|e| AppError::SynthesisFailed(0, format!("bad pcm encoding: {e}")))?;

        let samples = bytes
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect();

        Ok((samples, parsed.sample_rate))
    }
}
