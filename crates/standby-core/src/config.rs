//! 설정 관리.
//!
//! 설정은 TOML 파일에서 로드하고 `STANDBY__` 접두사 환경 변수로 덮어씁니다.
//! 시작 시 한 번 로드되며 이후 변경되지 않습니다.
//!
//! ```toml
//! [auth]
//! token_url = "https://api.example.com/auth/oauth2/v1/token"
//! username = "machine-id"
//! password = "secret"
//! client_id = "app-key"
//!
//! [[channels]]
//! name = "CH1"
//! hostname = "feed-1.example.com:443"
//! role = "primary"
//!
//! [[subscriptions]]
//! rics = ["IBM.N", "GE.N"]
//! service = "ELEKTRON_DD"
//! ```

use crate::types::{Role, SubscriptionTemplate};
use crate::{CoreError, CoreResult};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// 애플리케이션 설정.
#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// 로깅 설정
    #[serde(default)]
    pub logging: LoggingConfig,
    /// 인증 서버 설정
    pub auth: AuthConfig,
    /// 로그인 메시지 설정
    #[serde(default)]
    pub login: LoginConfig,
    /// WebSocket 전송 설정
    #[serde(default)]
    pub transport: TransportConfig,
    /// 재연결 백오프 설정
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    /// 토큰 갱신 설정
    #[serde(default)]
    pub refresh: RefreshConfig,
    /// 채널 목록 (설정 순서가 승격 우선순위)
    pub channels: Vec<ChannelConfig>,
    /// 구독 템플릿 목록
    #[serde(default)]
    pub subscriptions: Vec<SubscriptionTemplate>,
}

/// 로깅 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// 로그 레벨
    pub level: String,
    /// 로그 형식 (pretty, json, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// OAuth 인증 서버 설정.
#[derive(Debug, Deserialize)]
pub struct AuthConfig {
    /// 토큰 엔드포인트 URL
    pub token_url: String,
    /// 사용자 이름 (machine id)
    pub username: String,
    /// 비밀번호
    pub password: SecretString,
    /// 클라이언트 ID (basic auth 사용자)
    pub client_id: String,
    /// 클라이언트 시크릿 (기본값: 빈 문자열)
    #[serde(default = "empty_secret")]
    pub client_secret: SecretString,
    /// 요청 scope
    #[serde(default)]
    pub scope: String,
    /// 독점 로그인 제어 요청 여부
    #[serde(default = "default_true")]
    pub take_exclusive_sign_on: bool,
    /// 요청 타임아웃 (초)
    #[serde(default = "default_auth_timeout")]
    pub timeout_secs: u64,
}

fn empty_secret() -> SecretString {
    SecretString::from(String::new())
}
fn default_true() -> bool {
    true
}
fn default_auth_timeout() -> u64 {
    30
}

impl Clone for AuthConfig {
    fn clone(&self) -> Self {
        Self {
            token_url: self.token_url.clone(),
            username: self.username.clone(),
            password: SecretString::from(self.password.expose_secret().to_string()),
            client_id: self.client_id.clone(),
            client_secret: SecretString::from(self.client_secret.expose_secret().to_string()),
            scope: self.scope.clone(),
            take_exclusive_sign_on: self.take_exclusive_sign_on,
            timeout_secs: self.timeout_secs,
        }
    }
}

impl AuthConfig {
    /// 새 인증 설정 생성.
    pub fn new(
        token_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        client_id: impl Into<String>,
    ) -> Self {
        Self {
            token_url: token_url.into(),
            username: username.into(),
            password: SecretString::from(password.into()),
            client_id: client_id.into(),
            client_secret: empty_secret(),
            scope: String::new(),
            take_exclusive_sign_on: true,
            timeout_secs: default_auth_timeout(),
        }
    }

    /// scope 설정.
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    /// 요청 타임아웃 반환.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// 로그인 요청에 포함되는 클라이언트 식별 정보.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoginConfig {
    /// 애플리케이션 ID
    pub application_id: String,
    /// 클라이언트 위치 문자열
    pub position: String,
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self {
            application_id: "255".to_string(),
            position: "127.0.0.1/net".to_string(),
        }
    }
}

/// WebSocket 전송 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransportConfig {
    /// URL 스킴 (wss / ws)
    pub scheme: String,
    /// 업그레이드 경로
    pub path: String,
    /// 협상할 서브프로토콜
    pub subprotocol: String,
    /// 연결 타임아웃 (초)
    pub connect_timeout_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            scheme: "wss".to_string(),
            path: "/WebSocket".to_string(),
            subprotocol: "tr_json2".to_string(),
            connect_timeout_secs: 10,
        }
    }
}

impl TransportConfig {
    /// 호스트 이름으로 엔드포인트 URL 생성.
    pub fn endpoint_url(&self, hostname: &str) -> String {
        format!("{}://{}{}", self.scheme, hostname, self.path)
    }

    /// 연결 타임아웃 반환.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// 재연결 백오프 설정.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ReconnectConfig {
    /// 첫 재연결 대기 시간 (밀리초)
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// 최대 대기 시간 (밀리초)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// 지수 백오프 배수
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
    /// 최대 지터 (밀리초)
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,
    /// 최대 연속 재연결 시도 횟수 (None = 무제한)
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

fn default_initial_delay_ms() -> u64 {
    1_000
}
fn default_max_delay_ms() -> u64 {
    30_000
}
fn default_backoff_factor() -> f64 {
    2.0
}
fn default_jitter_ms() -> u64 {
    500
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_factor: default_backoff_factor(),
            jitter_ms: default_jitter_ms(),
            max_attempts: None,
        }
    }
}

/// 토큰 갱신 주기 설정.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RefreshConfig {
    /// 만료 시간 대비 갱신 시점 비율
    #[serde(default = "default_expiry_ratio")]
    pub expiry_ratio: f64,
    /// 갱신 실패 후 재시도 간격 (초)
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
    /// 갱신 최소 간격 (초)
    #[serde(default = "default_min_interval_secs")]
    pub min_interval_secs: u64,
}

fn default_expiry_ratio() -> f64 {
    0.9
}
fn default_retry_delay_secs() -> u64 {
    30
}
fn default_min_interval_secs() -> u64 {
    5
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            expiry_ratio: default_expiry_ratio(),
            retry_delay_secs: default_retry_delay_secs(),
            min_interval_secs: default_min_interval_secs(),
        }
    }
}

impl RefreshConfig {
    /// 토큰 유효 기간에서 다음 갱신까지의 간격 계산.
    pub fn refresh_interval(&self, expires_in: Duration) -> Duration {
        let interval = expires_in.mul_f64(self.expiry_ratio);
        interval.max(Duration::from_secs(self.min_interval_secs))
    }

    /// 갱신 실패 후 재시도 간격 반환.
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

/// 채널 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChannelConfig {
    /// 채널 이름
    pub name: String,
    /// 엔드포인트 호스트 (host:port)
    pub hostname: String,
    /// 초기 역할
    #[serde(default)]
    pub role: Role,
}

impl ChannelConfig {
    /// 새 채널 설정 생성.
    pub fn new(name: impl Into<String>, hostname: impl Into<String>, role: Role) -> Self {
        Self {
            name: name.into(),
            hostname: hostname.into(),
            role,
        }
    }
}

impl AppConfig {
    /// 파일과 환경 변수에서 설정을 로드합니다.
    pub fn load<P: AsRef<Path>>(path: P) -> CoreResult<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("STANDBY")
                    .separator("__")
                    .try_parsing(true),
            );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 로드합니다 (환경 변수 미적용).
    pub fn from_toml_str(text: &str) -> CoreResult<Self> {
        let config: Self = config::Config::builder()
            .add_source(config::File::from_str(text, config::FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// 기본 경로에서 설정을 로드합니다.
    pub fn load_default() -> CoreResult<Self> {
        Self::load("config/default.toml")
    }

    /// 설정 유효성 검증.
    ///
    /// # Errors
    /// 채널이 없거나, 채널 이름이 중복되거나, 비율/구독 값이 잘못되면
    /// `CoreError::Config`를 반환합니다.
    pub fn validate(&self) -> CoreResult<()> {
        if self.channels.is_empty() {
            return Err(CoreError::Config("at least one channel is required".to_string()));
        }

        let mut names = HashSet::new();
        for channel in &self.channels {
            if channel.name.trim().is_empty() || channel.hostname.trim().is_empty() {
                return Err(CoreError::Config(
                    "channel name and hostname must not be empty".to_string(),
                ));
            }
            if !names.insert(channel.name.as_str()) {
                return Err(CoreError::Config(format!(
                    "duplicate channel name: {}",
                    channel.name
                )));
            }
        }

        if !(self.refresh.expiry_ratio > 0.0 && self.refresh.expiry_ratio < 1.0) {
            return Err(CoreError::Config(format!(
                "refresh.expiry_ratio must be in (0, 1), got {}",
                self.refresh.expiry_ratio
            )));
        }

        if self.reconnect.backoff_factor < 1.0 {
            return Err(CoreError::Config(format!(
                "reconnect.backoff_factor must be >= 1.0, got {}",
                self.reconnect.backoff_factor
            )));
        }

        if self.auth.token_url.trim().is_empty() {
            return Err(CoreError::Config("auth.token_url must not be empty".to_string()));
        }

        for template in &self.subscriptions {
            template
                .validate()
                .map_err(|e| CoreError::Config(e.to_string()))?;
        }

        Ok(())
    }
}
