//! OAuth 토큰 발급 및 갱신.
//!
//! 처리 기능:
//! - password grant (최초 로그인, 갱신 토큰 거부 시 대체)
//! - refresh_token grant (주기적 갱신)
//!
//! 요청은 form body와 HTTP basic auth(client id / client secret)를 사용합니다.

use crate::error::{FeedError, FeedResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use secrecy::ExposeSecret;
use serde::{Deserialize, Deserializer};
use standby_core::AuthConfig;
use std::fmt;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// 발급된 토큰 쌍.
#[derive(Clone)]
pub struct AuthToken {
    /// 접근 토큰
    pub access_token: String,
    /// 갱신 토큰
    pub refresh_token: String,
    /// 유효 기간
    pub expires_in: Duration,
    /// 발급 시각
    pub issued_at: DateTime<Utc>,
}

impl AuthToken {
    /// 새 토큰 생성 (발급 시각 = 현재).
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_in: Duration,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expires_in,
            issued_at: Utc::now(),
        }
    }

    /// 만료 시각.
    pub fn expires_at(&self) -> DateTime<Utc> {
        let ttl = chrono::Duration::from_std(self.expires_in).unwrap_or(chrono::Duration::zero());
        self.issued_at + ttl
    }

    /// 로그 출력용 접근 토큰 앞부분.
    pub fn access_prefix(&self) -> String {
        self.access_token.chars().take(8).collect()
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthToken")
            .field("access_token", &format_args!("{}...", self.access_prefix()))
            .field("refresh_token", &"***")
            .field("expires_in", &self.expires_in)
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

/// 토큰 엔드포인트 응답.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(deserialize_with = "seconds_from_string_or_number")]
    expires_in: u64,
}

/// `expires_in`은 숫자 또는 숫자 문자열로 올 수 있습니다.
fn seconds_from_string_or_number<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) if n >= 0.0 => Ok(n as u64),
        Raw::Number(n) => Err(serde::de::Error::custom(format!("negative expires_in: {}", n))),
        Raw::Text(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|n| *n >= 0.0)
            .map(|n| n as u64)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid expires_in: {}", s))),
    }
}

/// 토큰 발급자.
///
/// 코디네이터는 이 트레이트를 통해서만 인증 서버와 통신합니다.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// 토큰 발급.
    ///
    /// `refresh_token`이 `None`이면 password grant, 아니면 refresh grant를
    /// 사용합니다. 갱신 토큰이 거부되면 `FeedError::InvalidGrant`를 반환합니다.
    async fn authenticate(&self, refresh_token: Option<&str>) -> FeedResult<AuthToken>;
}

/// OAuth 토큰 관리자.
///
/// 요청만 수행하며 토큰은 보관하지 않습니다. 현재 토큰은 코디네이터가 소유합니다.
pub struct AuthTokenManager {
    config: AuthConfig,
    client: Client,
}

impl AuthTokenManager {
    /// 새 토큰 관리자 생성.
    ///
    /// # Errors
    /// HTTP 클라이언트 생성에 실패하면 `FeedError::Network`를 반환합니다.
    pub fn new(config: AuthConfig) -> FeedResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| FeedError::Network(format!("HTTP client 생성 실패: {}", e)))?;

        Ok(Self { config, client })
    }

    fn grant_form(&self, refresh_token: Option<&str>) -> Vec<(&'static str, String)> {
        match refresh_token {
            None => vec![
                ("username", self.config.username.clone()),
                ("password", self.config.password.expose_secret().to_string()),
                ("grant_type", "password".to_string()),
                ("scope", self.config.scope.clone()),
                (
                    "takeExclusiveSignOnControl",
                    self.config.take_exclusive_sign_on.to_string(),
                ),
            ],
            Some(token) => vec![
                ("refresh_token", token.to_string()),
                ("grant_type", "refresh_token".to_string()),
            ],
        }
    }
}

#[async_trait]
impl TokenProvider for AuthTokenManager {
    async fn authenticate(&self, refresh_token: Option<&str>) -> FeedResult<AuthToken> {
        let grant = if refresh_token.is_some() {
            "refresh_token"
        } else {
            "password"
        };
        info!(grant, user = %self.config.username, "Requesting access token");

        let response = self
            .client
            .post(&self.config.token_url)
            .header("Accept", "application/json")
            .basic_auth(
                &self.config.client_id,
                Some(self.config.client_secret.expose_secret()),
            )
            .form(&self.grant_form(refresh_token))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if status == StatusCode::BAD_REQUEST && body.contains("invalid_grant") {
            warn!(grant, "Token endpoint rejected the grant: {}", body);
            return Err(FeedError::InvalidGrant(body));
        }

        if status != StatusCode::OK {
            error!(grant, "Token request failed: {} - {}", status, body);
            return Err(FeedError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| FeedError::Parse(format!("Failed to parse token response: {}", e)))?;

        let token = AuthToken::new(
            parsed.access_token,
            parsed.refresh_token,
            Duration::from_secs(parsed.expires_in),
        );

        info!(
            grant,
            expires_in_secs = parsed.expires_in,
            "Access token obtained ({}...)",
            token.access_prefix()
        );
        debug!(expires_at = %token.expires_at(), "Token expiry");

        Ok(token)
    }
}
