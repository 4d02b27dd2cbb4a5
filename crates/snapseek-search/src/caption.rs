//! Captioner implementations
//!
//! Vision-language model clients for Gemini and Ollama. Both send the image
//! inline as base64 and return the model's text. A failed call is reported
//! as a captioning error and never surfaces as caption text.
//!
//! Author: hephaex@gmail.com

use async_trait::async_trait;
use base64::Engine as _;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use snapseek_core::{CaptionProvider, Captioner, CaptioningConfig, Result, SnapError};
use std::sync::Arc;

fn http_client(config: &CaptioningConfig) -> Result<Client> {
    Client::builder()
        .timeout(config.timeout())
        .build()
        .map_err(|e| SnapError::Config(format!("Failed to build HTTP client: {e}")))
}

fn request_error(provider: &str, e: reqwest::Error) -> SnapError {
    if e.is_timeout() || e.is_connect() {
        SnapError::UpstreamUnavailable(format!("{provider} request failed: {e}"))
    } else {
        SnapError::Captioning(format!("{provider} request failed: {e}"))
    }
}

fn ensure_image(image: &[u8]) -> Result<()> {
    if image.is_empty() {
        return Err(SnapError::Validation("image is empty".to_string()));
    }
    Ok(())
}

/// Guess the MIME type from magic bytes
fn sniff_mime(image: &[u8]) -> &'static str {
    match image {
        [0x89, b'P', b'N', b'G', ..] => "image/png",
        [b'G', b'I', b'F', b'8', ..] => "image/gif",
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => "image/webp",
        _ => "image/jpeg",
    }
}

fn encode(image: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(image)
}

// ============================================================================
// Gemini Captioner
// ============================================================================

/// Google Gemini `generateContent` client
pub struct GeminiCaptioner {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    default_prompt: String,
}

#[derive(Debug, Serialize)]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
}

#[derive(Debug, Serialize)]
struct GeminiContent<'a> {
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum GeminiPart<'a> {
    Text { text: &'a str },
    Image { inline_data: InlineData },
}

#[derive(Debug, Serialize)]
struct InlineData {
    mime_type: &'static str,
    data: String,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiResponseContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponsePart {
    text: Option<String>,
}

impl GeminiResponse {
    fn into_text(self) -> Option<String> {
        let content = self.candidates.into_iter().next()?.content?;
        let text: String = content.parts.into_iter().filter_map(|p| p.text).collect();
        Some(text.trim().to_string())
    }
}

impl GeminiCaptioner {
    /// Create from config
    pub fn from_config(config: &CaptioningConfig) -> Result<Self> {
        let api_key = config
            .gemini_api_key
            .as_ref()
            .ok_or_else(|| SnapError::Config("Gemini API key required".to_string()))?;

        Ok(Self {
            client: http_client(config)?,
            api_key: api_key.clone(),
            base_url: config.gemini_base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            default_prompt: config.default_prompt.clone(),
        })
    }
}

#[async_trait]
impl Captioner for GeminiCaptioner {
    async fn caption(&self, image: &[u8], prompt: Option<&str>) -> Result<String> {
        ensure_image(image)?;

        let request = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![
                    GeminiPart::Text {
                        text: prompt.unwrap_or(&self.default_prompt),
                    },
                    GeminiPart::Image {
                        inline_data: InlineData {
                            mime_type: sniff_mime(image),
                            data: encode(image),
                        },
                    },
                ],
            }],
        };

        let response = self
            .client
            .post(format!(
                "{}/models/{}:generateContent",
                self.base_url, self.model
            ))
            .query(&[("key", &self.api_key)])
            .json(&request)
            .send()
            .await
            .map_err(|e| request_error("Gemini", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(SnapError::Captioning(format!(
                "Gemini error ({status}): {error_text}"
            )));
        }

        let result: GeminiResponse = response
            .json()
            .await
            .map_err(|e| SnapError::Captioning(format!("Failed to parse Gemini response: {e}")))?;

        result
            .into_text()
            .ok_or_else(|| SnapError::Captioning("Gemini returned no candidates".to_string()))
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Ollama Captioner
// ============================================================================

/// Ollama vision model client (llava and similar)
pub struct OllamaCaptioner {
    client: Client,
    base_url: String,
    model: String,
    default_prompt: String,
}

#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    images: Vec<String>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
}

impl OllamaCaptioner {
    /// Create from config
    pub fn from_config(config: &CaptioningConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(config)?,
            base_url: config.ollama_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            default_prompt: config.default_prompt.clone(),
        })
    }
}

#[async_trait]
impl Captioner for OllamaCaptioner {
    async fn caption(&self, image: &[u8], prompt: Option<&str>) -> Result<String> {
        ensure_image(image)?;

        let request = OllamaRequest {
            model: &self.model,
            prompt: prompt.unwrap_or(&self.default_prompt),
            images: vec![encode(image)],
            stream: false,
        };

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| request_error("Ollama", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(SnapError::Captioning(format!(
                "Ollama error ({status}): {error_text}"
            )));
        }

        let result: OllamaResponse = response
            .json()
            .await
            .map_err(|e| SnapError::Captioning(format!("Failed to parse Ollama response: {e}")))?;

        Ok(result.response.trim().to_string())
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Factory function
// ============================================================================

/// Create a captioner from config
pub fn create_captioner(config: &CaptioningConfig) -> Result<Arc<dyn Captioner>> {
    let captioner: Arc<dyn Captioner> = match config.provider {
        CaptionProvider::Gemini => Arc::new(GeminiCaptioner::from_config(config)?),
        CaptionProvider::Ollama => Arc::new(OllamaCaptioner::from_config(config)?),
    };
    tracing::info!(provider = ?config.provider, model = captioner.name(), "captioner ready");
    Ok(captioner)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Json, http::StatusCode, routing::post, Router};
    use serde_json::{json, Value};

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[test]
    fn test_sniff_mime() {
        assert_eq!(sniff_mime(&[0x89, b'P', b'N', b'G', 0x0d]), "image/png");
        assert_eq!(sniff_mime(b"GIF89a"), "image/gif");
        assert_eq!(sniff_mime(b"RIFF\0\0\0\0WEBPVP8 "), "image/webp");
        assert_eq!(sniff_mime(&[0xff, 0xd8, 0xff]), "image/jpeg");
    }

    #[test]
    fn test_gemini_request_shape() {
        let request = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![
                    GeminiPart::Text { text: "describe" },
                    GeminiPart::Image {
                        inline_data: InlineData {
                            mime_type: "image/png",
                            data: encode(b"abc"),
                        },
                    },
                ],
            }],
        };

        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"contents": [{"parts": [
                {"text": "describe"},
                {"inline_data": {"mime_type": "image/png", "data": "YWJj"}}
            ]}]})
        );
    }

    #[test]
    fn test_gemini_response_text() {
        let response: GeminiResponse = serde_json::from_value(json!({
            "candidates": [{"content": {"parts": [{"text": " A red car "}, {"text": "parked."}]}}]
        }))
        .unwrap();
        assert_eq!(response.into_text().as_deref(), Some("A red car parked."));

        let empty: GeminiResponse = serde_json::from_value(json!({})).unwrap();
        assert!(empty.into_text().is_none());
    }

    #[test]
    fn test_factory_requires_gemini_key() {
        let config = CaptioningConfig {
            provider: CaptionProvider::Gemini,
            ..Default::default()
        };
        assert!(matches!(
            create_captioner(&config).err().unwrap(),
            SnapError::Config(_)
        ));

        let config = CaptioningConfig::default();
        assert_eq!(create_captioner(&config).unwrap().name(), "llava");
    }

    #[tokio::test]
    async fn test_ollama_caption_uses_default_prompt() {
        let app = Router::new().route(
            "/api/generate",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["stream"], json!(false));
                assert_eq!(body["images"][0], json!("AQID"));
                Json(json!({"response": format!("  {}  ", body["prompt"].as_str().unwrap_or(""))}))
            }),
        );
        let config = CaptioningConfig {
            ollama_url: serve(app).await,
            default_prompt: "describe it".to_string(),
            ..Default::default()
        };
        let captioner = OllamaCaptioner::from_config(&config).unwrap();

        assert_eq!(captioner.caption(&[1, 2, 3], None).await.unwrap(), "describe it");
        assert_eq!(
            captioner.caption(&[1, 2, 3], Some("count cars")).await.unwrap(),
            "count cars"
        );
    }

    #[tokio::test]
    async fn test_model_failure_is_captioning_error() {
        let app = Router::new().route(
            "/api/generate",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "model crashed") }),
        );
        let config = CaptioningConfig {
            ollama_url: serve(app).await,
            ..Default::default()
        };
        let captioner = OllamaCaptioner::from_config(&config).unwrap();

        let err = captioner.caption(&[1], None).await.unwrap_err();
        assert!(matches!(err, SnapError::Captioning(_)));

        let err = captioner.caption(&[], None).await.unwrap_err();
        assert!(matches!(err, SnapError::Validation(_)));
    }
}
