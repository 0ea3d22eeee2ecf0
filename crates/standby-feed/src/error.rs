//! 피드 에러 타입.

use standby_core::CoreError;
use thiserror::Error;

/// 인증, 전송, 프로토콜 처리 중 발생하는 에러.
#[derive(Debug, Error)]
pub enum FeedError {
    /// 네트워크/연결 에러
    #[error("Network error: {0}")]
    Network(String),

    /// 연결 끊김
    #[error("Disconnected: {0}")]
    Disconnected(String),

    /// WebSocket 에러
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// 갱신 토큰 거부 (HTTP 400 invalid_grant)
    #[error("Invalid grant: {0}")]
    InvalidGrant(String),

    /// 예상하지 못한 HTTP 상태
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// 파싱/역직렬화 에러
    #[error("Parse error: {0}")]
    Parse(String),

    /// 타임아웃
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// 설정 에러
    #[error("Config error: {0}")]
    Config(String),

    /// 채널 태스크나 명령 큐가 닫힘
    #[error("Channel closed: {0}")]
    ChannelClosed(String),
}

/// 피드 Result 타입.
pub type FeedResult<T> = Result<T, FeedError>;

impl FeedError {
    /// 재시도 가능한 에러인지 확인.
    pub fn is_retryable(&self) -> bool {
        match self {
            FeedError::Network(_)
            | FeedError::Disconnected(_)
            | FeedError::WebSocket(_)
            | FeedError::Timeout(_) => true,
            FeedError::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// 갱신 토큰이 거부되었는지 확인.
    pub fn is_invalid_grant(&self) -> bool {
        matches!(self, FeedError::InvalidGrant(_))
    }
}

impl From<reqwest::Error> for FeedError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FeedError::Timeout(err.to_string())
        } else if err.is_decode() {
            FeedError::Parse(err.to_string())
        } else {
            FeedError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(err: serde_json::Error) -> Self {
        FeedError::Parse(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for FeedError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        FeedError::WebSocket(err.to_string())
    }
}

impl From<CoreError> for FeedError {
    fn from(err: CoreError) -> Self {
        FeedError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(FeedError::Network("reset".into()).is_retryable());
        assert!(FeedError::Timeout("auth".into()).is_retryable());
        assert!(FeedError::Http {
            status: 503,
            body: String::new()
        }
        .is_retryable());
        assert!(!FeedError::Http {
            status: 401,
            body: String::new()
        }
        .is_retryable());
        assert!(!FeedError::InvalidGrant("expired".into()).is_retryable());
    }

    #[test]
    fn test_invalid_grant_flag() {
        assert!(FeedError::InvalidGrant("x".into()).is_invalid_grant());
        assert!(!FeedError::Http {
            status: 400,
            body: "invalid_request".into()
        }
        .is_invalid_grant());
    }

    #[test]
    fn test_from_core_error() {
        let err: FeedError = CoreError::Config("no channels".into()).into();
        assert!(matches!(err, FeedError::Config(msg) if msg.contains("no channels")));
    }
}
