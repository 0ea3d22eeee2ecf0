//! 채널 역할 (PRIMARY / STANDBY).

use serde::{Deserialize, Serialize};
use std::fmt;

/// 채널 역할.
///
/// 하나의 코디네이터에 속한 채널 중 정확히 하나만 `Primary`를 가집니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// 활성 채널 - 소비자가 신뢰하는 데이터
    #[serde(alias = "PRIMARY", alias = "Primary")]
    Primary,
    /// 대기 채널 - 로그인/구독은 유지하되 비활성
    #[default]
    #[serde(alias = "STANDBY", alias = "Standby")]
    Standby,
}

impl Role {
    /// 서버에 알리는 `WarmStandbyMode` 값 (0: 활성, 1: 대기).
    pub fn warm_standby_mode(self) -> u8 {
        match self {
            Role::Primary => 0,
            Role::Standby => 1,
        }
    }

    /// PRIMARY 여부.
    pub fn is_primary(self) -> bool {
        matches!(self, Role::Primary)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Primary => write!(f, "PRIMARY"),
            Role::Standby => write!(f, "STANDBY"),
        }
    }
}
