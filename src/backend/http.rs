use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::BackendError;
use crate::config::BackendConfig;
use crate::dispatch::{ChatBackend, ChatReply, ChatRequest, ChatResponseBody, DispatchError};
use crate::registry::{AvailabilityProbe, ProbeError};
use crate::synthesis::{PremiumError, PremiumSynthesizer};
use crate::transcription::{Transcriber, TranscriptionError};

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    detail: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TranscribeResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct TtsRequest<'a> {
    text: &'a str,
    voice: &'a str,
}

#[derive(Debug, Deserialize)]
struct TtsResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    audio_base64: Option<String>,
    #[serde(default)]
    content_type: Option<String>,
    #[serde(default)]
    provider: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    #[serde(default)]
    voice_agent: Option<VoiceAgentStatus>,
}

#[derive(Debug, Deserialize)]
struct VoiceAgentStatus {
    #[serde(default)]
    available: bool,
}

// ---------------------------------------------------------------------------
// HttpBackend
// ---------------------------------------------------------------------------

/// `reqwest` client for the assistant backend.
///
/// Every call carries its own timeout from [`BackendConfig`]: chat and
/// premium synthesis use `request_timeout_secs`, uploads use
/// `transcription_timeout_secs`, and the status probe uses
/// `probe_timeout_secs`.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    voice: String,
    request_timeout: Duration,
    transcription_timeout: Duration,
    probe_timeout: Duration,
}

impl HttpBackend {
    pub fn from_config(config: &BackendConfig, voice: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            voice: voice.to_string(),
            request_timeout: config.request_timeout(),
            transcription_timeout: config.transcription_timeout(),
            probe_timeout: config.probe_timeout(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Turn a response into `T`, or into [`BackendError::Status`] carrying the
    /// backend's `detail` for non-success statuses.
    async fn read_json<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, BackendError> {
        let status = response.status();
        if !status.is_success() {
            let detail = response
                .json::<ErrorBody>()
                .await
                .ok()
                .and_then(|b| b.detail)
                .filter(|d| !d.trim().is_empty());
            return Err(BackendError::Status {
                status: status.as_u16(),
                detail,
            });
        }
        response
            .json::<T>()
            .await
            .map_err(|e| BackendError::Parse(e.to_string()))
    }
}

#[async_trait]
impl ChatBackend for HttpBackend {
    async fn chat(&self, request: ChatRequest) -> Result<ChatReply, DispatchError> {
        let response = self
            .client
            .post(self.url("/api/chat"))
            .timeout(self.request_timeout)
            .json(&request)
            .send()
            .await
            .map_err(BackendError::from)?;

        let body: ChatResponseBody = Self::read_json(response).await?;
        body.into_reply()
    }
}

#[async_trait]
impl Transcriber for HttpBackend {
    async fn transcribe(&self, wav: Vec<u8>) -> Result<String, TranscriptionError> {
        let part = Part::bytes(wav)
            .file_name("recording.wav")
            .mime_str("audio/wav")
            .map_err(|e| TranscriptionError::Failed(e.to_string()))?;
        let form = Form::new().part("audio", part);

        let response = self
            .client
            .post(self.url("/api/transcribe"))
            .timeout(self.transcription_timeout)
            .multipart(form)
            .send()
            .await
            .map_err(BackendError::from)?;

        let body: TranscribeResponse = Self::read_json(response).await?;
        if !body.success {
            let reason = body
                .error
                .unwrap_or_else(|| "the transcription service reported an error".into());
            log::warn!("backend: transcription rejected: {reason}");
            return Err(TranscriptionError::Failed(reason));
        }
        Ok(body.text.unwrap_or_default())
    }
}

#[async_trait]
impl PremiumSynthesizer for HttpBackend {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, PremiumError> {
        let response = self
            .client
            .post(self.url("/api/tts"))
            .timeout(self.request_timeout)
            .json(&TtsRequest {
                text,
                voice: &self.voice,
            })
            .send()
            .await
            .map_err(BackendError::from)?;

        let body: TtsResponse = Self::read_json(response).await?;
        if !body.success {
            return Err(PremiumError::Rejected(
                body.error.unwrap_or_else(|| "success: false".into()),
            ));
        }
        let encoded = body
            .audio_base64
            .filter(|a| !a.is_empty())
            .ok_or_else(|| PremiumError::Rejected("missing audio_base64".into()))?;
        let audio = base64::engine::general_purpose::STANDARD
            .decode(encoded.as_bytes())
            .map_err(|e| PremiumError::Rejected(format!("bad audio_base64: {e}")))?;

        log::debug!(
            "backend: premium audio {} bytes ({}, via {})",
            audio.len(),
            body.content_type.as_deref().unwrap_or("unknown type"),
            body.provider.as_deref().unwrap_or("unknown provider")
        );
        Ok(audio)
    }
}

#[async_trait]
impl AvailabilityProbe for HttpBackend {
    async fn premium_synthesis_available(&self) -> Result<bool, ProbeError> {
        let response = self
            .client
            .get(self.url("/api/status"))
            .timeout(self.probe_timeout)
            .send()
            .await
            .map_err(BackendError::from)?;

        let body: StatusResponse = Self::read_json(response).await?;
        Ok(body.voice_agent.map(|v| v.available).unwrap_or(false))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    /// Serve exactly one HTTP response and hand back the raw request.
    async fn respond_once(status: u16, body: &str) -> (String, oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let body = body.to_string();
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            let response = format!(
                "HTTP/1.1 {status} X\r\nContent-Type: application/json\r\n\
                 Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
            let _ = tx.send(request);
        });

        (format!("http://{addr}"), rx)
    }

    async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf).to_string();
            let Some(header_end) = text.find("\r\n\r\n") else {
                continue;
            };
            let headers = text[..header_end].to_lowercase();
            let body_len = buf.len() - (header_end + 4);
            if let Some(len) = headers
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
            {
                if body_len >= len {
                    break;
                }
            } else if !headers.contains("transfer-encoding: chunked") || text.ends_with("0\r\n\r\n")
            {
                break;
            }
        }
        String::from_utf8_lossy(&buf).to_string()
    }

    fn backend(base_url: &str) -> HttpBackend {
        let config = BackendConfig {
            base_url: base_url.to_string(),
            ..BackendConfig::default()
        };
        HttpBackend::from_config(&config, "josh")
    }

    #[tokio::test]
    async fn chat_posts_message_and_session() {
        let (url, request) =
            respond_once(200, r#"{"response":"Hi there","session_id":"abc"}"#).await;
        let reply = backend(&url)
            .chat(ChatRequest {
                message: "hello".into(),
                session_id: None,
            })
            .await
            .unwrap();

        assert_eq!(reply.text, "Hi there");
        assert_eq!(reply.session_id.as_deref(), Some("abc"));
        let raw = request.await.unwrap();
        assert!(raw.starts_with("POST /api/chat "));
        assert!(raw.contains(r#""message":"hello""#));
        assert!(raw.contains(r#""session_id":null"#));
    }

    #[tokio::test]
    async fn chat_error_carries_detail() {
        let (url, _request) = respond_once(
            429,
            r#"{"detail":"Rate limited: 1 message every 5 seconds per session."}"#,
        )
        .await;
        let err = backend(&url)
            .chat(ChatRequest {
                message: "hello".into(),
                session_id: Some("abc".into()),
            })
            .await
            .unwrap_err();
        assert_eq!(
            err.user_message(),
            "Rate limited: 1 message every 5 seconds per session."
        );
    }

    #[tokio::test]
    async fn chat_connection_refused_is_connectivity() {
        // Bind then drop to get a port nothing listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = backend(&format!("http://{addr}"))
            .chat(ChatRequest {
                message: "hello".into(),
                session_id: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Connectivity(_)), "{err:?}");
    }

    #[tokio::test]
    async fn transcribe_uploads_audio_field() {
        let (url, request) = respond_once(200, r#"{"success":true,"text":"hello"}"#).await;
        let text = backend(&url).transcribe(b"RIFF....WAVE".to_vec()).await.unwrap();

        assert_eq!(text, "hello");
        let raw = request.await.unwrap();
        assert!(raw.starts_with("POST /api/transcribe "));
        assert!(raw.contains(r#"name="audio""#));
        assert!(raw.contains(r#"filename="recording.wav""#));
    }

    #[tokio::test]
    async fn transcribe_failure_reports_error_text() {
        let (url, _request) =
            respond_once(200, r#"{"success":false,"error":"Groq API key not configured"}"#).await;
        let err = backend(&url).transcribe(vec![0; 8]).await.unwrap_err();
        assert_eq!(
            err,
            TranscriptionError::Failed("Groq API key not configured".into())
        );
    }

    #[tokio::test]
    async fn tts_decodes_base64_audio() {
        let (url, request) = respond_once(
            200,
            r#"{"success":true,"audio_base64":"SUQzBA==","content_type":"audio/mpeg","provider":"elevenlabs"}"#,
        )
        .await;
        let audio = backend(&url).synthesize("Hi there").await.unwrap();

        assert_eq!(audio, b"ID3\x04");
        let raw = request.await.unwrap();
        assert!(raw.starts_with("POST /api/tts "));
        assert!(raw.contains(r#""voice":"josh""#));
    }

    #[tokio::test]
    async fn tts_server_error_is_definitive() {
        let (url, _request) = respond_once(500, r#"{"detail":"TTS failed"}"#).await;
        let err = backend(&url).synthesize("Hi").await.unwrap_err();
        assert!(err.is_definitive());
    }

    #[tokio::test]
    async fn tts_unsuccessful_body_is_transient() {
        let (url, _request) = respond_once(200, r#"{"success":false}"#).await;
        let err = backend(&url).synthesize("Hi").await.unwrap_err();
        assert!(!err.is_definitive());
    }

    #[tokio::test]
    async fn tts_bad_base64_is_transient() {
        let (url, _request) =
            respond_once(200, r#"{"success":true,"audio_base64":"!!not base64!!"}"#).await;
        let err = backend(&url).synthesize("Hi").await.unwrap_err();
        assert!(matches!(err, PremiumError::Rejected(_)));
    }

    #[tokio::test]
    async fn status_reads_voice_agent_flag() {
        let (url, request) =
            respond_once(200, r#"{"status":"online","voice_agent":{"available":true}}"#).await;
        assert!(backend(&url).premium_synthesis_available().await.unwrap());
        assert!(request.await.unwrap().starts_with("GET /api/status "));
    }

    #[tokio::test]
    async fn null_voice_agent_is_unavailable() {
        let (url, _request) = respond_once(200, r#"{"status":"online","voice_agent":null}"#).await;
        assert!(!backend(&url).premium_synthesis_available().await.unwrap());
    }
}
