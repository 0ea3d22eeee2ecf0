//! 채널 상태 기계.
//!
//! 하나의 논리 연결에 대한 전송 수명 주기, 로그인 핸드셰이크, standby 모드
//! 협상, 구독 (재)발행을 담당합니다. 이 타입은 I/O를 직접 하지 않고 송신할
//! 프레임을 outbox에 쌓아 두며, 실제 전송은 [`actor`] 태스크가 처리합니다.

pub mod actor;

pub use actor::{spawn_channel, ChannelCommand, ChannelEvent, ChannelHandle};

use crate::error::FeedResult;
use crate::protocol::{decode_frame, InboundMessage, LoginState, MessageCodec, FIRST_REQUEST_ID};
use standby_core::{Role, SubscriptionTemplate};
use std::fmt;
use tracing::{debug, error, info, trace, warn};

/// 채널 연결 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelState {
    #[default]
    Disconnected,
    Connecting,
    ConnectedNotLoggedIn,
    LoggedIn,
}

impl ChannelState {
    /// 전송이 열려 있는지 확인.
    pub fn is_connected(self) -> bool {
        matches!(self, ChannelState::ConnectedNotLoggedIn | ChannelState::LoggedIn)
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChannelState::Disconnected => "disconnected",
            ChannelState::Connecting => "connecting",
            ChannelState::ConnectedNotLoggedIn => "connected",
            ChannelState::LoggedIn => "logged_in",
        };
        f.write_str(s)
    }
}

/// 채널이 코디네이터에 보고하는 이벤트.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEventKind {
    /// 전송 연결 성공
    Up,
    /// 로그인 성공
    LoggedIn { supports_standby: bool },
    /// 로그인 거부 (전송은 이미 끊긴 상태)
    LoginFailed { reason: String },
    /// 전송 종료 또는 연결 실패
    Down { reason: String },
}

/// 채널 상태 기계.
#[derive(Debug)]
pub struct Channel {
    name: String,
    codec: MessageCodec,
    role: Role,
    state: ChannelState,
    next_id: u64,
    templates: Vec<SubscriptionTemplate>,
    issued: usize,
    supports_standby: bool,
    outbox: Vec<String>,
}

impl Channel {
    /// 새 채널 생성.
    pub fn new(name: impl Into<String>, role: Role, codec: MessageCodec) -> Self {
        Self {
            name: name.into(),
            codec,
            role,
            state: ChannelState::Disconnected,
            next_id: FIRST_REQUEST_ID,
            templates: Vec::new(),
            issued: 0,
            supports_standby: false,
            outbox: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// 다음 구독 요청에 사용할 ID.
    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    /// 송신 대기 프레임을 꺼냅니다.
    pub fn take_outbox(&mut self) -> Vec<String> {
        std::mem::take(&mut self.outbox)
    }

    /// 연결 시작. 이미 연결 중이거나 연결되어 있으면 `false`.
    pub fn begin_connect(&mut self) -> bool {
        if self.state != ChannelState::Disconnected {
            debug!(channel = %self.name, state = %self.state, "Connect ignored");
            return false;
        }
        self.state = ChannelState::Connecting;
        true
    }

    /// 전송 연결 성공.
    pub fn on_open(&mut self) -> ChannelEventKind {
        info!(channel = %self.name, "Channel up");
        self.state = ChannelState::ConnectedNotLoggedIn;
        self.issued = 0;
        self.supports_standby = false;
        ChannelEventKind::Up
    }

    /// 전송 연결 실패.
    pub fn on_connect_failed(&mut self, reason: impl Into<String>) -> ChannelEventKind {
        let reason = reason.into();
        warn!(channel = %self.name, %reason, "Connect failed");
        self.reset_session();
        ChannelEventKind::Down { reason }
    }

    /// 전송 종료/에러. 이미 끊긴 상태면 이벤트 없음.
    pub fn on_closed(&mut self, reason: impl Into<String>) -> Option<ChannelEventKind> {
        if self.state == ChannelState::Disconnected {
            return None;
        }
        let reason = reason.into();
        warn!(channel = %self.name, %reason, "Channel down");
        self.reset_session();
        Some(ChannelEventKind::Down { reason })
    }

    /// 로그인 요청 전송. 연결되어 있지 않으면 무시합니다.
    pub fn login(&mut self, access_token: &str, is_refresh: bool) {
        if !self.state.is_connected() {
            debug!(channel = %self.name, state = %self.state, "Login skipped, not connected");
            return;
        }
        match self.codec.encode_login(access_token, is_refresh) {
            Ok(frame) => {
                debug!(channel = %self.name, is_refresh, "SENT login request");
                self.outbox.push(frame);
            }
            Err(e) => error!(channel = %self.name, "Failed to encode login: {}", e),
        }
    }

    /// 역할 변경.
    ///
    /// 로그인 상태이고 서버가 warm-standby를 지원할 때만 즉시 알리며,
    /// 그 외에는 다음 로그인 때 알립니다.
    pub fn set_role(&mut self, role: Role) {
        let previous = self.role;
        self.role = role;
        info!(channel = %self.name, from = %previous, to = %role, "Role set");

        if self.state == ChannelState::LoggedIn && self.supports_standby {
            self.announce_role();
        }
    }

    /// 구독 템플릿 등록. 로그인 상태면 즉시 발행합니다.
    pub fn subscribe(&mut self, template: SubscriptionTemplate) {
        self.templates.push(template);
        if self.state == ChannelState::LoggedIn {
            self.replay();
        }
    }

    /// 수신 프레임 처리.
    pub fn on_text(&mut self, text: &str) -> Vec<ChannelEventKind> {
        debug!(channel = %self.name, frame = %text, "RECEIVED");

        let messages = match decode_frame(text) {
            Ok(messages) => messages,
            Err(e) => {
                warn!(channel = %self.name, "Dropping malformed frame: {}", e);
                return Vec::new();
            }
        };

        let mut events = Vec::new();
        for message in messages {
            if !self.state.is_connected() {
                break;
            }
            match message {
                InboundMessage::Ping => {
                    trace!(channel = %self.name, "Ping received");
                    self.queue("pong", Ok(self.codec.encode_pong()));
                }
                InboundMessage::LoginRefresh(state) => {
                    if let Some(event) = self.on_login_response(state) {
                        events.push(event);
                    }
                }
                InboundMessage::LoginStatus(state) => {
                    if state.is_healthy() {
                        trace!(channel = %self.name, "Login status ok");
                    } else {
                        events.push(self.fail_login(&state));
                    }
                }
                InboundMessage::Ignored => {
                    trace!(channel = %self.name, "Envelope ignored");
                }
            }
        }
        events
    }

    fn on_login_response(&mut self, state: LoginState) -> Option<ChannelEventKind> {
        if !state.is_healthy() {
            return Some(self.fail_login(&state));
        }

        self.supports_standby = state.supports_standby;

        if self.state == ChannelState::LoggedIn {
            debug!(
                channel = %self.name,
                supports_standby = self.supports_standby,
                "Re-login accepted"
            );
            return None;
        }

        self.state = ChannelState::LoggedIn;
        info!(channel = %self.name, role = %self.role, "Logged in");

        if self.supports_standby {
            self.announce_role();
        } else {
            warn!(
                channel = %self.name,
                "Server does not support warm standby, running without role updates"
            );
        }

        self.replay();
        Some(ChannelEventKind::LoggedIn {
            supports_standby: self.supports_standby,
        })
    }

    fn fail_login(&mut self, state: &LoginState) -> ChannelEventKind {
        let reason = format!(
            "login rejected: stream={} data={} text={}",
            state.stream.as_deref().unwrap_or("-"),
            state.data.as_deref().unwrap_or("-"),
            state.text.as_deref().unwrap_or("-"),
        );
        error!(channel = %self.name, %reason, "Login failed");
        self.reset_session();
        ChannelEventKind::LoginFailed { reason }
    }

    fn announce_role(&mut self) {
        let frame = self.codec.encode_standby_mode(self.role);
        self.queue("standby_mode", frame);
    }

    fn replay(&mut self) {
        while self.issued < self.templates.len() {
            let id = self.next_id;
            let template = &self.templates[self.issued];
            let frame = self.codec.encode_subscription(id, template);
            self.next_id += template.ids_required();
            self.issued += 1;
            self.queue("subscription", frame);
        }
    }

    fn queue(&mut self, kind: &'static str, frame: FeedResult<String>) {
        match frame {
            Ok(text) => {
                debug!(channel = %self.name, kind, frame = %text, "SENT");
                self.outbox.push(text);
            }
            Err(e) => error!(channel = %self.name, kind, "Failed to encode frame: {}", e),
        }
    }

    fn reset_session(&mut self) {
        self.state = ChannelState::Disconnected;
        self.issued = 0;
        self.supports_standby = false;
        self.outbox.clear();
    }
}
