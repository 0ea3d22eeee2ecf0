//! 채널 태스크.
//!
//! 채널마다 tokio 태스크 하나가 상태 기계와 전송 세션을 소유합니다.
//! 코디네이터 명령, 연결 시도 결과, 전송 이벤트를 한 곳에서 순차 처리하므로
//! 상태 기계에는 락이 필요 없습니다.

use super::{Channel, ChannelEventKind};
use crate::error::{FeedError, FeedResult};
use crate::transport::{Endpoint, Transport, TransportEvent, TransportSession};
use futures::future::BoxFuture;
use standby_core::{channel_span, Role, SubscriptionTemplate};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Instrument};

/// 코디네이터가 채널에 보내는 명령.
#[derive(Debug, Clone)]
pub enum ChannelCommand {
    /// 대기 후 연결 시작
    Connect { delay: Duration },
    /// 로그인 요청 전송
    Login { token: String, is_refresh: bool },
    /// 역할 변경
    SetRole(Role),
    /// 구독 템플릿 등록
    Subscribe(SubscriptionTemplate),
    /// 태스크 종료
    Shutdown,
}

/// 채널이 코디네이터에 보내는 이벤트.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelEvent {
    /// 설정 순서상의 채널 인덱스
    pub channel: usize,
    pub kind: ChannelEventKind,
}

/// 채널 태스크 명령 핸들.
#[derive(Debug, Clone)]
pub struct ChannelHandle {
    index: usize,
    name: String,
    commands: mpsc::UnboundedSender<ChannelCommand>,
}

impl ChannelHandle {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 연결 시작 (즉시 반환).
    pub fn connect(&self, delay: Duration) -> FeedResult<()> {
        self.send(ChannelCommand::Connect { delay })
    }

    pub fn login(&self, token: impl Into<String>, is_refresh: bool) -> FeedResult<()> {
        self.send(ChannelCommand::Login {
            token: token.into(),
            is_refresh,
        })
    }

    pub fn set_role(&self, role: Role) -> FeedResult<()> {
        self.send(ChannelCommand::SetRole(role))
    }

    pub fn subscribe(&self, template: SubscriptionTemplate) -> FeedResult<()> {
        self.send(ChannelCommand::Subscribe(template))
    }

    /// 태스크 종료 요청. 전송 세션도 함께 닫힙니다.
    pub fn close(&self) -> FeedResult<()> {
        self.send(ChannelCommand::Shutdown)
    }

    fn send(&self, command: ChannelCommand) -> FeedResult<()> {
        self.commands
            .send(command)
            .map_err(|_| FeedError::ChannelClosed(format!("channel {} task stopped", self.name)))
    }
}

type PendingConnect = BoxFuture<'static, FeedResult<TransportSession>>;

struct ChannelTask {
    index: usize,
    channel: Channel,
    endpoint: Endpoint,
    transport: Arc<dyn Transport>,
    events: mpsc::UnboundedSender<ChannelEvent>,
    session: Option<TransportSession>,
    pending: Option<PendingConnect>,
}

/// 채널 태스크를 띄우고 명령 핸들을 반환합니다.
pub fn spawn_channel(
    index: usize,
    channel: Channel,
    endpoint: Endpoint,
    transport: Arc<dyn Transport>,
    events: mpsc::UnboundedSender<ChannelEvent>,
) -> (ChannelHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = ChannelHandle {
        index,
        name: channel.name().to_string(),
        commands: tx,
    };

    let span = channel_span!(channel.name(), endpoint.url);
    let task = ChannelTask {
        index,
        channel,
        endpoint,
        transport,
        events,
        session: None,
        pending: None,
    };
    let join = tokio::spawn(task.run(rx).instrument(span));

    (handle, join)
}

impl ChannelTask {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<ChannelCommand>) {
        debug!("Channel task started");

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(ChannelCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                result = next_connect(&mut self.pending) => {
                    self.pending = None;
                    self.handle_connect_result(result);
                }
                event = next_transport_event(&mut self.session) => {
                    self.handle_transport_event(event);
                }
            }
            self.flush();
        }

        if let Some(session) = self.session.take() {
            session.close();
        }
        info!("Channel task stopped");
    }

    fn handle_command(&mut self, command: ChannelCommand) {
        match command {
            ChannelCommand::Connect { delay } => {
                if !self.channel.begin_connect() {
                    return;
                }
                info!(delay_ms = delay.as_millis() as u64, "Connecting");
                let transport = Arc::clone(&self.transport);
                let endpoint = self.endpoint.clone();
                self.pending = Some(Box::pin(async move {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    transport.connect(&endpoint).await
                }));
            }
            ChannelCommand::Login { token, is_refresh } => self.channel.login(&token, is_refresh),
            ChannelCommand::SetRole(role) => self.channel.set_role(role),
            ChannelCommand::Subscribe(template) => self.channel.subscribe(template),
            ChannelCommand::Shutdown => {}
        }
    }

    fn handle_connect_result(&mut self, result: FeedResult<TransportSession>) {
        match result {
            Ok(session) => {
                self.session = Some(session);
                let event = self.channel.on_open();
                self.emit(event);
            }
            Err(e) => {
                let event = self.channel.on_connect_failed(e.to_string());
                self.emit(event);
            }
        }
    }

    fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Message(text) => {
                for event in self.channel.on_text(&text) {
                    if matches!(event, ChannelEventKind::LoginFailed { .. }) {
                        self.drop_session();
                    }
                    self.emit(event);
                }
            }
            TransportEvent::Closed(reason) => {
                self.drop_session();
                let reason = reason.unwrap_or_else(|| "connection closed".to_string());
                if let Some(event) = self.channel.on_closed(reason) {
                    self.emit(event);
                }
            }
            TransportEvent::Error(reason) => {
                self.drop_session();
                if let Some(event) = self.channel.on_closed(reason) {
                    self.emit(event);
                }
            }
        }
    }

    fn flush(&mut self) {
        let frames = self.channel.take_outbox();
        let Some(session) = &self.session else {
            return;
        };
        for frame in frames {
            if let Err(e) = session.send(frame) {
                warn!("Send failed: {}", e);
                break;
            }
        }
    }

    fn drop_session(&mut self) {
        if let Some(session) = self.session.take() {
            session.close();
        }
    }

    fn emit(&self, kind: ChannelEventKind) {
        let event = ChannelEvent {
            channel: self.index,
            kind,
        };
        if self.events.send(event).is_err() {
            debug!("Coordinator gone, event dropped");
        }
    }
}

async fn next_connect(pending: &mut Option<PendingConnect>) -> FeedResult<TransportSession> {
    match pending {
        Some(connect) => connect.await,
        None => std::future::pending().await,
    }
}

async fn next_transport_event(session: &mut Option<TransportSession>) -> TransportEvent {
    match session {
        Some(session) => session.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::MessageCodec;
    use async_trait::async_trait;
    use tokio::sync::Mutex;
    use tokio_util::sync::CancellationToken;

    struct ServerSide {
        sent: mpsc::UnboundedReceiver<String>,
        inject: mpsc::UnboundedSender<TransportEvent>,
    }

    #[derive(Default)]
    struct LoopbackTransport {
        servers: Mutex<Vec<ServerSide>>,
    }

    #[async_trait]
    impl Transport for LoopbackTransport {
        async fn connect(&self, _endpoint: &Endpoint) -> FeedResult<TransportSession> {
            let (out_tx, out_rx) = mpsc::unbounded_channel();
            let (in_tx, in_rx) = mpsc::unbounded_channel();
            self.servers.lock().await.push(ServerSide {
                sent: out_rx,
                inject: in_tx,
            });
            Ok(TransportSession::new(out_tx, in_rx, CancellationToken::new()))
        }
    }

    fn endpoint() -> Endpoint {
        Endpoint {
            url: "ws://loopback/WebSocket".to_string(),
            subprotocol: None,
            connect_timeout: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn test_connect_login_and_ping() {
        let transport = Arc::new(LoopbackTransport::default());
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let channel = Channel::new("CH1", Role::Primary, MessageCodec::default());
        let (handle, join) = spawn_channel(0, channel, endpoint(), transport.clone(), event_tx);

        handle.connect(Duration::ZERO).unwrap();
        let up = event_rx.recv().await.unwrap();
        assert_eq!(up, ChannelEvent { channel: 0, kind: ChannelEventKind::Up });

        handle.login("tok", false).unwrap();
        let mut server = transport.servers.lock().await.pop().unwrap();
        let login: serde_json::Value = serde_json::from_str(&server.sent.recv().await.unwrap()).unwrap();
        assert_eq!(login["Key"]["Elements"]["AuthenticationToken"], "tok");

        server
            .inject
            .send(TransportEvent::Message(r#"{"Type":"Ping"}"#.to_string()))
            .unwrap();
        assert_eq!(server.sent.recv().await.unwrap(), r#"{"Type":"Pong"}"#);

        server.inject.send(TransportEvent::Closed(None)).unwrap();
        let down = event_rx.recv().await.unwrap();
        assert!(matches!(down.kind, ChannelEventKind::Down { .. }));

        handle.close().unwrap();
        join.await.unwrap();
        assert!(handle.connect(Duration::ZERO).is_err());
    }
}
