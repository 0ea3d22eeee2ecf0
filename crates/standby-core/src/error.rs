//! 공통 에러 타입.

use thiserror::Error;

/// 설정 및 도메인 검증 에러.
#[derive(Debug, Error)]
pub enum CoreError {
    /// 설정 에러
    #[error("설정 에러: {0}")]
    Config(String),

    /// 잘못된 입력
    #[error("잘못된 입력: {0}")]
    InvalidInput(String),
}

/// 공통 Result 타입.
pub type CoreResult<T> = Result<T, CoreError>;

impl From<config::ConfigError> for CoreError {
    fn from(err: config::ConfigError) -> Self {
        CoreError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::Config("channels 비어 있음".to_string());
        assert_eq!(err.to_string(), "설정 에러: channels 비어 있음");
    }

    #[test]
    fn test_from_config_error() {
        let err: CoreError = config::ConfigError::NotFound("auth.token_url".to_string()).into();
        assert!(matches!(err, CoreError::Config(ref msg) if msg.contains("auth.token_url")));
    }
}
