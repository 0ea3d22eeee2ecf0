//! 장애 조치 코디네이터.
//!
//! 채널 집합을 소유하고 PRIMARY/STANDBY 역할을 배정합니다. 채널 이벤트
//! (up / logged-in / login-failed / down)에 반응해 역할을 넘기고 재연결을
//! 예약하며, 토큰 갱신 주기를 돌려 새 토큰을 모든 채널에 배포합니다.
//!
//! 토큰과 역할 상태는 코디네이터 태스크만 소유합니다. 채널과는 명령 큐와
//! 이벤트 큐로만 통신합니다.

use crate::auth::{AuthToken, TokenProvider};
use crate::channel::{spawn_channel, Channel, ChannelEvent, ChannelEventKind, ChannelHandle, ChannelState};
use crate::error::{FeedError, FeedResult};
use crate::protocol::MessageCodec;
use crate::reconnect::ReconnectPolicy;
use crate::registry::SubscriptionRegistry;
use crate::transport::{Endpoint, Transport};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use standby_core::{AppConfig, ChannelConfig, ReconnectConfig, RefreshConfig, Role, TransportConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// 채널 하나의 생성 정보.
#[derive(Debug, Clone)]
pub struct ChannelSpec {
    pub name: String,
    pub endpoint: Endpoint,
    /// 설정된 초기 역할 (시작 시 정규화됨)
    pub role: Role,
}

impl ChannelSpec {
    /// 채널 설정과 전송 설정으로 생성.
    pub fn from_config(channel: &ChannelConfig, transport: &TransportConfig) -> Self {
        Self {
            name: channel.name.clone(),
            endpoint: Endpoint {
                url: transport.endpoint_url(&channel.hostname),
                subprotocol: Some(transport.subprotocol.clone()).filter(|p| !p.is_empty()),
                connect_timeout: transport.connect_timeout(),
            },
            role: channel.role,
        }
    }
}

/// 채널별 상태 스냅샷.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelStatus {
    pub name: String,
    pub role: Role,
    pub state: ChannelState,
    /// 연속 재연결 시도 횟수
    pub reconnect_attempts: u32,
    /// 재시도 한도 소진 여부
    pub exhausted: bool,
}

/// 코디네이터 상태 스냅샷.
///
/// 이벤트 처리와 토큰 갱신이 끝날 때마다 `watch` 채널로 발행됩니다.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CoordinatorStatus {
    pub channels: Vec<ChannelStatus>,
    /// 현재 PRIMARY 채널 이름
    pub primary: Option<String>,
    /// 모든 채널이 끊긴 상태인지
    pub all_down: bool,
    /// 성공한 토큰 갱신 횟수
    pub refresh_count: u64,
    /// 실패한 토큰 갱신 횟수
    pub refresh_failures: u64,
    /// 현재 토큰 만료 시각
    pub token_expires_at: Option<DateTime<Utc>>,
}

/// 장애 조치 코디네이터.
pub struct FailoverCoordinator {
    specs: Vec<ChannelSpec>,
    codec: MessageCodec,
    registry: SubscriptionRegistry,
    transport: Arc<dyn Transport>,
    auth: Arc<dyn TokenProvider>,
    reconnect: ReconnectPolicy,
    refresh: RefreshConfig,
    status_tx: watch::Sender<CoordinatorStatus>,
}

impl FailoverCoordinator {
    /// 새 코디네이터 생성.
    ///
    /// # Errors
    /// 채널이 없으면 `FeedError::Config`를 반환합니다.
    pub fn new(
        specs: Vec<ChannelSpec>,
        codec: MessageCodec,
        registry: SubscriptionRegistry,
        transport: Arc<dyn Transport>,
        auth: Arc<dyn TokenProvider>,
        reconnect: ReconnectConfig,
        refresh: RefreshConfig,
    ) -> FeedResult<Self> {
        if specs.is_empty() {
            return Err(FeedError::Config("at least one channel is required".to_string()));
        }
        let (status_tx, _) = watch::channel(CoordinatorStatus::default());

        Ok(Self {
            specs,
            codec,
            registry,
            transport,
            auth,
            reconnect: ReconnectPolicy::new(reconnect),
            refresh,
            status_tx,
        })
    }

    /// 애플리케이션 설정으로 생성.
    pub fn from_config(
        config: &AppConfig,
        transport: Arc<dyn Transport>,
        auth: Arc<dyn TokenProvider>,
    ) -> FeedResult<Self> {
        let specs = config
            .channels
            .iter()
            .map(|c| ChannelSpec::from_config(c, &config.transport))
            .collect();
        let registry = SubscriptionRegistry::new(config.subscriptions.clone())?;

        Self::new(
            specs,
            MessageCodec::new(config.login.clone()),
            registry,
            transport,
            auth,
            config.reconnect.clone(),
            config.refresh.clone(),
        )
    }

    /// 상태 스냅샷 구독.
    pub fn status(&self) -> watch::Receiver<CoordinatorStatus> {
        self.status_tx.subscribe()
    }

    /// 코디네이터 실행.
    ///
    /// 최초 인증에 실패하면 채널을 만들지 않고 에러를 반환합니다. 이후의
    /// 모든 장애는 루프 안에서 처리되며, `shutdown`이 취소될 때만 반환합니다.
    pub async fn run(self, shutdown: CancellationToken) -> FeedResult<()> {
        info!(channels = self.specs.len(), "Requesting initial access token");
        let token = self.auth.authenticate(None).await?;

        let roles = normalize_roles(&self.specs.iter().map(|s| s.role).collect::<Vec<_>>());
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();

        let mut handles = Vec::with_capacity(self.specs.len());
        let mut joins = Vec::with_capacity(self.specs.len());
        let mut slots = Vec::with_capacity(self.specs.len());

        for (index, (spec, role)) in self.specs.iter().zip(roles).enumerate() {
            let channel = Channel::new(spec.name.clone(), role, self.codec.clone());
            let (handle, join) = spawn_channel(
                index,
                channel,
                spec.endpoint.clone(),
                Arc::clone(&self.transport),
                event_tx.clone(),
            );
            info!(channel = %spec.name, %role, url = %spec.endpoint.url, "Channel created");

            for template in self.registry.iter() {
                handle.subscribe(template.clone())?;
            }
            handles.push(handle);
            joins.push(join);
            slots.push(Slot::new(spec.name.clone(), role));
        }
        drop(event_tx);

        let mut state = RunState {
            refresh_at: Instant::now() + self.refresh.refresh_interval(token.expires_in),
            token,
            handles,
            slots,
            all_down: false,
            refresh_count: 0,
            refresh_failures: 0,
        };

        for (handle, slot) in state.handles.iter().zip(state.slots.iter_mut()) {
            slot.state = ChannelState::Connecting;
            handle.connect(Duration::ZERO)?;
        }
        self.publish(&state);

        let mut refresh: Option<PendingRefresh> = None;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Shutdown requested");
                    break;
                }
                event = event_rx.recv() => match event {
                    Some(event) => self.handle_event(&mut state, event),
                    None => {
                        warn!("All channel tasks stopped");
                        break;
                    }
                },
                _ = tokio::time::sleep_until(state.refresh_at), if refresh.is_none() => {
                    refresh = Some(self.start_refresh(state.token.refresh_token.clone()));
                }
                result = next_refresh(&mut refresh) => {
                    refresh = None;
                    self.apply_refresh(&mut state, result);
                }
            }
            self.publish(&state);
        }

        for handle in &state.handles {
            if let Err(e) = handle.close() {
                debug!(channel = %handle.name(), "Close skipped: {}", e);
            }
        }
        for join in joins {
            if let Err(e) = join.await {
                warn!("Channel task join failed: {}", e);
            }
        }
        info!("Coordinator stopped");
        Ok(())
    }

    fn handle_event(&self, state: &mut RunState, event: ChannelEvent) {
        let index = event.channel;
        let Some(handle) = state.handles.get(index).cloned() else {
            warn!(index, "Event from unknown channel");
            return;
        };

        match event.kind {
            ChannelEventKind::Up => {
                info!(channel = %handle.name(), "Channel up, sending login");
                state.slots[index].state = ChannelState::ConnectedNotLoggedIn;
                if let Err(e) = handle.login(state.token.access_token.clone(), false) {
                    warn!(channel = %handle.name(), "Login command failed: {}", e);
                }
                if state.all_down {
                    info!(channel = %handle.name(), "Connectivity restored");
                    state.all_down = false;
                }
            }
            ChannelEventKind::LoggedIn { supports_standby } => {
                let slot = &mut state.slots[index];
                slot.state = ChannelState::LoggedIn;
                slot.attempts = 0;
                info!(
                    channel = %handle.name(),
                    role = %slot.role,
                    supports_standby,
                    "Channel logged in"
                );

                // PRIMARY가 끊긴 채널에 남아 있으면 방금 로그인한 채널로 옮김
                let primary_live = state.slots.iter().any(|s| s.role.is_primary() && s.is_live());
                if !primary_live {
                    promote(state, index);
                }
            }
            ChannelEventKind::LoginFailed { reason } | ChannelEventKind::Down { reason } => {
                self.on_channel_lost(state, index, &reason);
            }
        }
    }

    fn on_channel_lost(&self, state: &mut RunState, index: usize, reason: &str) {
        let name = state.slots[index].name.clone();
        state.slots[index].state = ChannelState::Disconnected;
        warn!(channel = %name, %reason, "Channel lost");

        if state.slots[index].role.is_primary() {
            let views: Vec<ChannelState> = state.slots.iter().map(|s| s.state).collect();
            if let Some(successor) = select_successor(&views, index) {
                promote(state, successor);
            } else {
                debug!(channel = %name, "No other channel, role kept");
            }
        }

        self.schedule_reconnect(state, index);

        if state.slots.iter().all(|s| !s.state.is_connected()) && !state.all_down {
            state.all_down = true;
            error!(
                alert = "all_channels_down",
                channels = state.slots.len(),
                "All channels are down"
            );
        }
    }

    fn schedule_reconnect(&self, state: &mut RunState, index: usize) {
        let slot = &mut state.slots[index];
        slot.attempts = slot.attempts.saturating_add(1);

        if !self.reconnect.should_retry(slot.attempts) {
            slot.exhausted = true;
            error!(
                alert = "reconnect_exhausted",
                channel = %slot.name,
                attempts = slot.attempts - 1,
                "Reconnect attempts exhausted, channel stays down"
            );
            return;
        }

        let delay = self.reconnect.delay_for(slot.attempts);
        info!(
            channel = %slot.name,
            attempt = slot.attempts,
            delay_ms = delay.as_millis() as u64,
            "Scheduling reconnect"
        );
        slot.state = ChannelState::Connecting;
        if let Err(e) = state.handles[index].connect(delay) {
            warn!(channel = %slot.name, "Reconnect command failed: {}", e);
        }
    }

    /// 토큰 갱신 요청을 만듭니다. 결과는 이벤트 루프가 받아 적용합니다.
    fn start_refresh(&self, refresh_token: String) -> PendingRefresh {
        info!("Refreshing access token");
        let auth = Arc::clone(&self.auth);
        Box::pin(async move {
            match auth.authenticate(Some(&refresh_token)).await {
                Err(e) if e.is_invalid_grant() => {
                    warn!("Refresh token rejected, falling back to password grant");
                    auth.authenticate(None).await
                }
                other => other,
            }
        })
    }

    fn apply_refresh(&self, state: &mut RunState, result: FeedResult<AuthToken>) {
        match result {
            Ok(token) => {
                state.refresh_count += 1;
                state.refresh_at = Instant::now() + self.refresh.refresh_interval(token.expires_in);
                state.token = token;
                for handle in &state.handles {
                    if let Err(e) = handle.login(state.token.access_token.clone(), true) {
                        warn!(channel = %handle.name(), "Re-login command failed: {}", e);
                    }
                }
                info!(
                    refresh_count = state.refresh_count,
                    next_in_secs = self.refresh.refresh_interval(state.token.expires_in).as_secs(),
                    "Token refreshed, channels re-login"
                );
            }
            Err(e) => {
                state.refresh_failures += 1;
                state.refresh_at = Instant::now() + self.refresh.retry_delay();
                if e.is_retryable() {
                    warn!(
                        failures = state.refresh_failures,
                        retry_in_secs = self.refresh.retry_delay_secs,
                        "Token refresh failed: {}",
                        e
                    );
                } else {
                    error!(
                        alert = "token_refresh_rejected",
                        failures = state.refresh_failures,
                        retry_in_secs = self.refresh.retry_delay_secs,
                        "Token refresh rejected: {}",
                        e
                    );
                }
            }
        }
    }

    fn publish(&self, state: &RunState) {
        let status = CoordinatorStatus {
            channels: state
                .slots
                .iter()
                .map(|s| ChannelStatus {
                    name: s.name.clone(),
                    role: s.role,
                    state: s.state,
                    reconnect_attempts: s.attempts,
                    exhausted: s.exhausted,
                })
                .collect(),
            primary: state
                .slots
                .iter()
                .find(|s| s.role.is_primary())
                .map(|s| s.name.clone()),
            all_down: state.all_down,
            refresh_count: state.refresh_count,
            refresh_failures: state.refresh_failures,
            token_expires_at: Some(state.token.expires_at()),
        };
        self.status_tx.send_replace(status);
    }
}

type PendingRefresh = BoxFuture<'static, FeedResult<AuthToken>>;

async fn next_refresh(pending: &mut Option<PendingRefresh>) -> FeedResult<AuthToken> {
    match pending {
        Some(refresh) => refresh.await,
        None => std::future::pending().await,
    }
}

struct Slot {
    name: String,
    role: Role,
    state: ChannelState,
    attempts: u32,
    exhausted: bool,
}

impl Slot {
    fn new(name: String, role: Role) -> Self {
        Self {
            name,
            role,
            state: ChannelState::Disconnected,
            attempts: 0,
            exhausted: false,
        }
    }

    /// 연결되어 있거나 첫 연결을 기다리는 중.
    fn is_live(&self) -> bool {
        self.state.is_connected() || self.attempts == 0
    }
}

struct RunState {
    token: AuthToken,
    refresh_at: Instant,
    handles: Vec<ChannelHandle>,
    slots: Vec<Slot>,
    all_down: bool,
    refresh_count: u64,
    refresh_failures: u64,
}

/// 설정된 역할을 정규화합니다: 첫 PRIMARY만 남기고, 없으면 첫 채널을 PRIMARY로.
fn normalize_roles(configured: &[Role]) -> Vec<Role> {
    let primary = configured.iter().position(|r| r.is_primary()).unwrap_or(0);
    if configured.iter().filter(|r| r.is_primary()).count() != 1 {
        warn!(primary, "Configured roles normalized to a single PRIMARY");
    }
    (0..configured.len())
        .map(|i| if i == primary { Role::Primary } else { Role::Standby })
        .collect()
}

/// 실패한 PRIMARY의 후계자 선택.
///
/// 설정 순서에서 로그인된 채널, 연결된 채널, 그 외 채널 순으로 고릅니다.
fn select_successor(states: &[ChannelState], failed: usize) -> Option<usize> {
    let others = || (0..states.len()).filter(move |&i| i != failed);
    others()
        .find(|&i| states[i] == ChannelState::LoggedIn)
        .or_else(|| others().find(|&i| states[i].is_connected()))
        .or_else(|| others().next())
}

fn promote(state: &mut RunState, successor: usize) {
    for (index, slot) in state.slots.iter_mut().enumerate() {
        let role = if index == successor {
            Role::Primary
        } else {
            Role::Standby
        };
        if slot.role == role {
            continue;
        }
        slot.role = role;
        if let Err(e) = state.handles[index].set_role(role) {
            warn!(channel = %slot.name, "Role command failed: {}", e);
        }
    }
    info!(primary = %state.slots[successor].name, "Failover: new PRIMARY");
}
