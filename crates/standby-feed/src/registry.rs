//! 구독 템플릿 레지스트리.

use crate::error::FeedResult;
use standby_core::SubscriptionTemplate;
use std::sync::Arc;

/// 시작 시 설정된 구독 템플릿 목록.
///
/// 생성 후에는 읽기 전용이며 모든 채널이 같은 목록을 공유합니다.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionRegistry {
    templates: Arc<[SubscriptionTemplate]>,
}

impl SubscriptionRegistry {
    /// 템플릿을 검증하고 레지스트리 생성.
    pub fn new(templates: Vec<SubscriptionTemplate>) -> FeedResult<Self> {
        for template in &templates {
            template.validate()?;
        }
        Ok(Self {
            templates: templates.into(),
        })
    }

    /// 등록 순서대로 템플릿 순회.
    pub fn iter(&self) -> impl Iterator<Item = &SubscriptionTemplate> {
        self.templates.iter()
    }
}
