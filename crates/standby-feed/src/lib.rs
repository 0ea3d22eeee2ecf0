//! # Standby Feed
//!
//! 이중화된 WebSocket 채널로 시세 서버에 접속하고, PRIMARY 채널이 끊기면
//! STANDBY 채널로 역할을 넘기는 warm-standby 클라이언트입니다.
//!
//! - [`auth`]: OAuth 토큰 발급/갱신
//! - [`protocol`]: JSON 메시지 코덱
//! - [`registry`]: 구독 템플릿 목록
//! - [`channel`]: 채널 상태 기계와 채널 태스크
//! - [`transport`]: WebSocket 전송
//! - [`reconnect`]: 재연결 백오프
//! - [`coordinator`]: 장애 조치 및 토큰 갱신 주기

pub mod auth;
pub mod channel;
pub mod coordinator;
pub mod error;
pub mod protocol;
pub mod reconnect;
pub mod registry;
pub mod transport;

pub use auth::{AuthToken, AuthTokenManager, TokenProvider};
pub use channel::{Channel, ChannelCommand, ChannelEvent, ChannelEventKind, ChannelHandle, ChannelState};
pub use coordinator::{ChannelSpec, ChannelStatus, CoordinatorStatus, FailoverCoordinator};
pub use error::{FeedError, FeedResult};
pub use protocol::{decode_frame, InboundMessage, LoginState, MessageCodec};
pub use reconnect::ReconnectPolicy;
pub use registry::SubscriptionRegistry;
pub use transport::{Endpoint, Transport, TransportEvent, TransportSession, WebSocketTransport};
