//! src/platforms/messenger/client.rs
//!
//! JSON-over-WebSocket realtime channel. Each text frame carries either one
//! event object (`{"type": ...}`) or an error object (`{"error": ...}`).

use async_trait::async_trait;
use futures_util::StreamExt;
use http::HeaderMap;
use http::header::{COOKIE, HeaderValue, SET_COOKIE};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

use crate::Error;
use miraibot_common::models::{SessionCookie, SessionCredential, StreamError, StreamMessage};
use miraibot_common::traits::stream_traits::{RealtimeChannel, RealtimeConnector};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct WebSocketConnector {
    url: String,
}

impl WebSocketConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl RealtimeConnector for WebSocketConnector {
    async fn open(&self, session: &SessionCredential) -> Result<Box<dyn RealtimeChannel>, StreamError> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(transport_error)?;
        let cookie = HeaderValue::from_str(&session.cookie_header())
            .map_err(|e| StreamError::new(format!("invalid session cookie: {e}")).with_code("EINVAL"))?;
        request.headers_mut().insert(COOKIE, cookie);

        let (ws, response) = connect_async(request).await.map_err(transport_error)?;

        let mut refreshed = session.clone();
        let rotated = cookies_from_headers(response.headers());
        if !rotated.is_empty() {
            debug!("Handshake rotated {} session cookie(s)", rotated.len());
            refreshed.merge(rotated);
        }

        info!("[Realtime] connected → {}", self.url);
        Ok(Box::new(WebSocketChannel {
            ws: Some(ws),
            session: refreshed,
        }))
    }
}

pub struct WebSocketChannel {
    ws: Option<Socket>,
    session: SessionCredential,
}

#[async_trait]
impl RealtimeChannel for WebSocketChannel {
    async fn next_item(&mut self) -> Option<Result<StreamMessage, StreamError>> {
        loop {
            let ws = self.ws.as_mut()?;
            match ws.next().await {
                Some(Ok(Message::Text(txt))) => {
                    if let Some(item) = decode_frame(txt.as_str()) {
                        return Some(item);
                    }
                }
                Some(Ok(Message::Binary(bin))) => {
                    match std::str::from_utf8(&bin) {
                        Ok(txt) => {
                            if let Some(item) = decode_frame(txt) {
                                return Some(item);
                            }
                        }
                        Err(_) => debug!("[Realtime] dropping non-UTF8 binary frame, len={}", bin.len()),
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    info!("[Realtime] closed by server: {:?}", frame);
                    self.ws = None;
                    return None;
                }
                Some(Ok(_)) => {
                    // ping/pong are answered by tungstenite
                }
                Some(Err(e)) => {
                    self.ws = None;
                    return Some(Err(transport_error(e)));
                }
                None => {
                    self.ws = None;
                    return None;
                }
            }
        }
    }

    async fn close(&mut self) -> Result<(), Error> {
        if let Some(mut ws) = self.ws.take() {
            match ws.close(None).await {
                Ok(()) | Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => {}
                Err(e) => return Err(Error::Platform(format!("websocket close failed: {e}"))),
            }
        }
        Ok(())
    }

    fn session(&self) -> SessionCredential {
        self.session.clone()
    }
}

/// `None` for frames that are neither an event nor an error.
fn decode_frame(raw: &str) -> Option<Result<StreamMessage, StreamError>> {
    let value: serde_json::Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(_) => {
            debug!("[Realtime] unparseable frame: {}", raw);
            return None;
        }
    };
    if value.get("error").is_some_and(|e| !e.is_null()) {
        return Some(Err(StreamError::from_payload(value)));
    }
    match serde_json::from_value::<StreamMessage>(value) {
        Ok(msg) => Some(Ok(msg)),
        Err(_) => {
            debug!("[Realtime] unhandled frame: {}", raw);
            None
        }
    }
}

/// Maps transport failures onto the codes the classifier knows.
fn transport_error(err: WsError) -> StreamError {
    use std::io::ErrorKind;

    match err {
        WsError::Io(e)
            if matches!(
                e.kind(),
                ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::BrokenPipe
                    | ErrorKind::UnexpectedEof
            ) =>
        {
            StreamError::new(e.to_string()).with_code("ECONNRESET")
        }
        WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake)
        | WsError::ConnectionClosed
        | WsError::AlreadyClosed => StreamError::new(err.to_string()).with_code("ECONNRESET"),
        WsError::Http(resp) => {
            let status = resp.status().as_u16();
            let body = resp
                .body()
                .as_ref()
                .map(|b| String::from_utf8_lossy(b).into_owned())
                .unwrap_or_default();
            StreamError::new(format!("handshake rejected with HTTP {status}"))
                .with_code(format!("HTTP{status}"))
                .with_payload(serde_json::Value::String(body))
        }
        other => StreamError::new(other.to_string()).with_code("ETRANSPORT"),
    }
}

/// Extracts `Set-Cookie` headers as session cookies. Deleted cookies are
/// skipped.
fn cookies_from_headers(headers: &HeaderMap) -> Vec<SessionCookie> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(parse_set_cookie)
        .collect()
}

fn parse_set_cookie(raw: &str) -> Option<SessionCookie> {
    let mut parts = raw.split(';').map(str::trim);
    let (key, value) = parts.next()?.split_once('=')?;
    if key.is_empty() || value.is_empty() || value == "deleted" {
        return None;
    }

    let mut cookie = SessionCookie::new(key, value, "");
    for attr in parts {
        let (name, val) = attr.split_once('=').unwrap_or((attr, ""));
        match name.to_ascii_lowercase().as_str() {
            "domain" => cookie.domain = val.trim_start_matches('.').to_string(),
            "path" => cookie.path = val.to_string(),
            _ => {}
        }
    }
    Some(cookie)
}
