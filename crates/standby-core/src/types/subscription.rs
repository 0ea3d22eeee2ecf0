//! 구독 템플릿.
//!
//! 템플릿은 시작 시 한 번 설정되고 이후 모든 채널이 읽기 전용으로 공유합니다.

use crate::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};

/// 구독 대상 종목 (단일 또는 배치).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Instruments {
    /// 단일 종목 (예: "TD.TO")
    Single(String),
    /// 배치 요청 (예: ["IBM.N", "GE.N"])
    Batch(Vec<String>),
}

impl Instruments {
    /// 종목 수.
    pub fn len(&self) -> usize {
        match self {
            Instruments::Single(_) => 1,
            Instruments::Batch(names) => names.len(),
        }
    }

    /// 종목이 비어 있는지 확인.
    pub fn is_empty(&self) -> bool {
        match self {
            Instruments::Single(name) => name.trim().is_empty(),
            Instruments::Batch(names) => names.is_empty(),
        }
    }

    /// 요청 한 번에 소비되는 스트림 ID 수.
    ///
    /// 배치 요청은 요청 자체의 ID와 종목별 ID를 모두 예약합니다.
    pub fn ids_required(&self) -> u64 {
        match self {
            Instruments::Single(_) => 1,
            Instruments::Batch(names) => names.len() as u64 + 1,
        }
    }

    /// 종목 이름 순회.
    pub fn names(&self) -> Box<dyn Iterator<Item = &str> + '_> {
        match self {
            Instruments::Single(name) => Box::new(std::iter::once(name.as_str())),
            Instruments::Batch(names) => Box::new(names.iter().map(String::as_str)),
        }
    }
}

/// 구독 템플릿.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionTemplate {
    /// 종목 식별자
    #[serde(alias = "rics")]
    pub instruments: Instruments,
    /// 서비스 이름 (예: "ELEKTRON_DD")
    pub service: String,
    /// 반환 필드 제한 (None = 전체 필드)
    #[serde(default)]
    pub fields: Option<Vec<String>>,
}

impl SubscriptionTemplate {
    /// 단일 종목 템플릿 생성.
    pub fn single(name: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            instruments: Instruments::Single(name.into()),
            service: service.into(),
            fields: None,
        }
    }

    /// 배치 템플릿 생성.
    pub fn batch<I, S>(names: I, service: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            instruments: Instruments::Batch(names.into_iter().map(Into::into).collect()),
            service: service.into(),
            fields: None,
        }
    }

    /// 필드 뷰 설정.
    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// 요청 한 번에 소비되는 스트림 ID 수.
    pub fn ids_required(&self) -> u64 {
        self.instruments.ids_required()
    }

    /// 템플릿 유효성 검증.
    ///
    /// # Errors
    /// 서비스 이름이나 종목이 비어 있으면 `CoreError::InvalidInput`을 반환합니다.
    pub fn validate(&self) -> CoreResult<()> {
        if self.service.trim().is_empty() {
            return Err(CoreError::InvalidInput(
                "subscription service must not be empty".to_string(),
            ));
        }
        if self.instruments.is_empty() || self.instruments.names().any(|n| n.trim().is_empty()) {
            return Err(CoreError::InvalidInput(format!(
                "subscription for service {} has an empty instrument name",
                self.service
            )));
        }
        if let Some(fields) = &self.fields {
            if fields.iter().any(|f| f.trim().is_empty()) {
                return Err(CoreError::InvalidInput(format!(
                    "subscription for service {} has an empty view field",
                    self.service
                )));
            }
        }
        Ok(())
    }
}
