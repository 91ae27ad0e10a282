use crate::error::{AppError, Result};
use async_trait::async_trait;
use serde::Deserialize;

/// HTTP client for the vocal-separation model. Same shape as `TtsClient`:
/// one endpoint, one key, a scoped `reqwest::Client`.
#[async_trait]
pub trait SeparatorClient: Send + Sync {
    /// Split `audio` (WAV bytes) into (vocals, instrumental) WAV bytes.
    async fn separate(&self, audio: &[u8]) -> Result<(Vec<u8>, Vec<u8>)>;
}

pub struct HttpSeparatorClient {
    endpoint: String,
    api_key: String,
    client: reqwest::Client,
}

impl HttpSeparatorClient {
    pub fn new(endpoint: String, api_key: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .expect("failed to build separator reqwest client");
        Self { endpoint, api_key, client }
    }
}

#[derive(Deserialize)]
struct SeparateResponse {
    vocals_base64: String,
    instrumental_base64: String,
}

#[async_trait]
impl SeparatorClient for HttpSeparatorClient {
    async fn separate(&self, audio: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
        use base64::Engine as _;

        let form = reqwest::multipart::Form::new().part(
            "audio",
            reqwest::multipart::Part::bytes(audio.to_vec())
                .file_name("audio.wav")
                .mime_str("audio/wav")
                .map_err(|e| AppError::SeparationFailed(e.to_string()))?,
        );

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| AppError::SeparationFailed(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::SeparationFailed(format!(
                "separator returned {status}: {body}"
            )));
        }

        let parsed: SeparateResponse = response
            .json()
            .await
            .map_err(|e| AppError::SeparationFailed(format!("bad response body: {e}")))?;

        let vocals = base64::engine::general_purpose::STANDARD
            .decode(parsed.vocals_base64)
            .map_err(|e| AppError::SeparationFailed(format!("bad vocals encoding: {e}")))?;
        let instrumental = base64::engine::general_purpose::STANDARD
            .decode(parsed.instrumental_base64)
            .map_err(|e| AppError::SeparationFailed(format!("bad instrumental encoding: {e}")))?;

        Ok((vocals, instrumental))
    }
}
