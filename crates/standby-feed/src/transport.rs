//! WebSocket 전송 계층.
//!
//! 연결 하나당 읽기/쓰기 태스크 두 개를 띄우고, 채널 태스크와는 mpsc 큐로만
//! 통신합니다. 채널 쪽에서 보면 전송은 텍스트 송수신과 종료 이벤트뿐입니다.

use crate::error::{FeedError, FeedResult};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 연결 대상.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// 전체 URL (예: `wss://host:443/WebSocket`)
    pub url: String,
    /// `Sec-WebSocket-Protocol` 값
    pub subprotocol: Option<String>,
    /// 연결 타임아웃
    pub connect_timeout: Duration,
}

/// 전송 계층에서 채널로 올라오는 이벤트.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// 텍스트 프레임
    Message(String),
    /// 정상/원격 종료 (사유)
    Closed(Option<String>),
    /// 송수신 에러
    Error(String),
}

/// 열린 연결 하나.
///
/// 세션이 drop되거나 `close()`가 호출되면 읽기/쓰기 태스크가 종료됩니다.
#[derive(Debug)]
pub struct TransportSession {
    outgoing: mpsc::UnboundedSender<String>,
    incoming: mpsc::UnboundedReceiver<TransportEvent>,
    closer: CancellationToken,
}

impl TransportSession {
    /// 큐와 종료 토큰으로 세션 생성.
    pub fn new(
        outgoing: mpsc::UnboundedSender<String>,
        incoming: mpsc::UnboundedReceiver<TransportEvent>,
        closer: CancellationToken,
    ) -> Self {
        Self {
            outgoing,
            incoming,
            closer,
        }
    }

    /// 텍스트 프레임 전송.
    ///
    /// # Errors
    /// 쓰기 태스크가 이미 종료되었으면 `FeedError::Disconnected`를 반환합니다.
    pub fn send(&self, text: String) -> FeedResult<()> {
        self.outgoing
            .send(text)
            .map_err(|_| FeedError::Disconnected("transport writer stopped".to_string()))
    }

    /// 다음 수신 이벤트. 큐가 닫히면 `Closed`로 간주합니다.
    pub async fn recv(&mut self) -> TransportEvent {
        self.incoming
            .recv()
            .await
            .unwrap_or(TransportEvent::Closed(None))
    }

    /// 연결 종료.
    pub fn close(&self) {
        self.closer.cancel();
    }
}

impl Drop for TransportSession {
    fn drop(&mut self) {
        self.closer.cancel();
    }
}

/// 전송 계층 추상화.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// 엔드포인트에 연결하고 세션을 반환합니다.
    async fn connect(&self, endpoint: &Endpoint) -> FeedResult<TransportSession>;
}

/// tokio-tungstenite 기반 WebSocket 전송.
#[derive(Debug, Clone, Default)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&self, endpoint: &Endpoint) -> FeedResult<TransportSession> {
        let mut request = endpoint.url.as_str().into_client_request()?;
        if let Some(protocol) = &endpoint.subprotocol {
            let value = HeaderValue::from_str(protocol)
                .map_err(|e| FeedError::Config(format!("invalid subprotocol {}: {}", protocol, e)))?;
            request.headers_mut().insert("Sec-WebSocket-Protocol", value);
        }

        info!(url = %endpoint.url, "WebSocket 연결 중");

        let (ws_stream, _response) = tokio::time::timeout(endpoint.connect_timeout, connect_async(request))
            .await
            .map_err(|_| {
                FeedError::Timeout(format!(
                    "connect to {} exceeded {:?}",
                    endpoint.url, endpoint.connect_timeout
                ))
            })?
            .map_err(|e| FeedError::Network(format!("WebSocket 연결 실패: {}", e)))?;

        let (mut write, mut read) = ws_stream.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let closer = CancellationToken::new();

        let writer_cancel = closer.clone();
        let writer_events = event_tx.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = writer_cancel.cancelled() => break,
                    next = out_rx.recv() => match next {
                        Some(text) => {
                            if let Err(e) = write.send(Message::Text(text)).await {
                                let _ = writer_events.send(TransportEvent::Error(e.to_string()));
                                writer_cancel.cancel();
                                return;
                            }
                        }
                        None => break,
                    },
                }
            }
            let _ = write.send(Message::Close(None)).await;
            debug!("WebSocket writer stopped");
        });

        let reader_cancel = closer.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = reader_cancel.cancelled() => break,
                    frame = read.next() => {
                        let event = match frame {
                            Some(Ok(Message::Text(text))) => TransportEvent::Message(text),
                            Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
                                Ok(text) => TransportEvent::Message(text),
                                Err(_) => {
                                    warn!("Dropping non UTF-8 binary frame");
                                    continue;
                                }
                            },
                            Some(Ok(Message::Close(frame))) => {
                                TransportEvent::Closed(frame.map(|f| f.reason.to_string()))
                            }
                            Some(Ok(_)) => continue,
                            Some(Err(e)) => TransportEvent::Error(e.to_string()),
                            None => TransportEvent::Closed(None),
                        };

                        let terminal = !matches!(event, TransportEvent::Message(_));
                        if event_tx.send(event).is_err() || terminal {
                            break;
                        }
                    }
                }
            }
            reader_cancel.cancel();
            debug!("WebSocket reader stopped");
        });

        info!(url = %endpoint.url, "WebSocket 연결 성공");
        Ok(TransportSession::new(out_tx, event_rx, closer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_session_send_and_close() {
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let closer = CancellationToken::new();
        let mut session = TransportSession::new(out_tx, event_rx, closer.clone());

        session.send("hello".to_string()).unwrap();
        assert_eq!(out_rx.recv().await.as_deref(), Some("hello"));

        event_tx.send(TransportEvent::Message("frame".into())).unwrap();
        assert_eq!(session.recv().await, TransportEvent::Message("frame".into()));

        drop(event_tx);
        assert_eq!(session.recv().await, TransportEvent::Closed(None));

        session.close();
        assert!(closer.is_cancelled());
    }

    #[tokio::test]
    async fn test_drop_cancels_session() {
        let (out_tx, _out_rx) = mpsc::unbounded_channel();
        let (_event_tx, event_rx) = mpsc::unbounded_channel();
        let closer = CancellationToken::new();
        drop(TransportSession::new(out_tx, event_rx, closer.clone()));
        assert!(closer.is_cancelled());
    }

    #[tokio::test]
    async fn test_connect_refused_is_network_error() {
        let endpoint = Endpoint {
            url: "ws://127.0.0.1:1/WebSocket".to_string(),
            subprotocol: Some("tr_json2".to_string()),
            connect_timeout: Duration::from_secs(2),
        };
        let err = WebSocketTransport::new().connect(&endpoint).await.unwrap_err();
        assert!(matches!(err, FeedError::Network(_) | FeedError::Timeout(_)));
    }
}
