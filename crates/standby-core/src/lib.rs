//! # Standby Core
//!
//! warm-standby 시세 클라이언트의 공통 기반을 제공합니다.
//!
//! - 설정 관리 (파일 + 환경 변수)
//! - 로깅 인프라
//! - 공통 에러 타입
//! - 채널 역할 및 구독 템플릿 타입

pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use config::*;
pub use error::*;
pub use logging::*;
pub use types::*;
