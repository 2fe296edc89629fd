use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Response};

use crate::config::InvokeConfig;
use crate::error::InvokeError;
use crate::events::{JsonReply, StreamPiece};
use crate::headers::build_headers;
use crate::payload::InvocationRequest;
use crate::response::unwrap_json;
use crate::sse::SseStreamParser;
use crate::url::invocations_url;

const EVENT_STREAM_MIME: &str = "text/event-stream";

#[derive(Debug, Clone)]
pub struct InvokeClient {
    http: Client,
    config: InvokeConfig,
}

/// Outcome of one successful invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvokeReply {
    /// Body was an event stream; pieces were delivered to the handler as they arrived.
    Streamed { pieces: usize },
    Document(JsonReply),
}

impl InvokeClient {
    pub fn new(config: InvokeConfig) -> Result<Self, InvokeError> {
        if !config.base_url.trim().is_empty()
            && !config.base_url.trim().starts_with("http://")
            && !config.base_url.trim().starts_with("https://")
        {
            return Err(InvokeError::InvalidBaseUrl(config.base_url.clone()));
        }

        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(InvokeError::from)?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &InvokeConfig {
        &self.config
    }

    pub fn session_id(&self) -> &str {
        &self.config.session_id
    }

    /// Replace the correlation id; later invocations start a fresh logical conversation.
    pub fn set_session_id(&mut self, session_id: impl Into<String>) {
        self.config.session_id = session_id.into();
    }

    pub fn endpoint(&self) -> String {
        invocations_url(&self.config.base_url)
    }

    pub fn build_headers(&self) -> Result<HeaderMap, InvokeError> {
        let headers = build_headers(&self.config)?;
        let mut out = HeaderMap::new();
        for (key, value) in headers {
            out.insert(
                HeaderName::from_bytes(key.as_bytes())
                    .map_err(|_| InvokeError::InvalidHeader(format!("invalid header key: {key}")))?,
                HeaderValue::from_str(&value).map_err(|_| {
                    InvokeError::InvalidHeader(format!("invalid header value for {key}"))
                })?,
            );
        }
        Ok(out)
    }

    pub fn build_request(
        &self,
        request: &InvocationRequest,
    ) -> Result<reqwest::RequestBuilder, InvokeError> {
        let headers = self.build_headers()?;
        Ok(self.http.post(self.endpoint()).headers(headers).json(request))
    }

    /// POST one prompt and deliver its reply.
    ///
    /// Event-stream bodies are parsed incrementally and each piece is handed to
    /// `on_piece` as soon as its frame completes. Any other body is read whole and
    /// unwrapped into a [`JsonReply`].
    pub async fn invoke<F>(
        &self,
        request: &InvocationRequest,
        mut on_piece: F,
    ) -> Result<InvokeReply, InvokeError>
    where
        F: FnMut(StreamPiece),
    {
        let endpoint = self.endpoint();
        tracing::debug!(
            endpoint = %endpoint,
            session_id = %self.config.session_id,
            "invoking workload"
        );

        let response = self
            .build_request(request)?
            .send()
            .await
            .map_err(|error| InvokeError::from_transport(error, &endpoint))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(InvokeError::Status(status, body));
        }

        if is_event_stream(&response) {
            let pieces = stream_pieces(response, &endpoint, &mut on_piece).await?;
            return Ok(InvokeReply::Streamed { pieces });
        }

        let body = response
            .text()
            .await
            .map_err(|error| InvokeError::from_transport(error, &endpoint))?;
        Ok(InvokeReply::Document(unwrap_json(&body)))
    }
}

fn is_event_stream(response: &Response) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.to_ascii_lowercase().contains(EVENT_STREAM_MIME))
}

async fn stream_pieces<F>(
    response: Response,
    endpoint: &str,
    on_piece: &mut F,
) -> Result<usize, InvokeError>
where
    F: FnMut(StreamPiece),
{
    let mut bytes = response.bytes_stream();
    let mut parser = SseStreamParser::default();
    let mut delivered = 0;

    while let Some(chunk) = bytes.next().await {
        let chunk = chunk.map_err(|error| InvokeError::from_transport(error, endpoint))?;
        for piece in parser.feed(&chunk) {
            delivered += 1;
            on_piece(piece);
        }
    }

    for piece in parser.finish() {
        delivered += 1;
        on_piece(piece);
    }

    Ok(delivered)
}
