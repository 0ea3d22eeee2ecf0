//! 설정 검증 명령.

use standby_core::AppConfig;
use std::path::Path;
use tracing::info;

/// 로드된 설정 요약 출력.
///
/// 비밀번호와 시크릿은 출력하지 않습니다.
pub fn print_summary(config: &AppConfig, path: &Path) {
    info!(path = %path.display(), "Configuration is valid");
    info!(
        token_url = %config.auth.token_url,
        user = %config.auth.username,
        client_id = %config.auth.client_id,
        "Auth"
    );

    for channel in &config.channels {
        info!(
            channel = %channel.name,
            role = %channel.role,
            url = %config.transport.endpoint_url(&channel.hostname),
            "Channel"
        );
    }

    for template in &config.subscriptions {
        let names: Vec<&str> = template.instruments.names().collect();
        info!(
            service = %template.service,
            instruments = ?names,
            fields = ?template.fields,
            "Subscription"
        );
    }

    info!(
        initial_delay_ms = config.reconnect.initial_delay_ms,
        max_delay_ms = config.reconnect.max_delay_ms,
        max_attempts = ?config.reconnect.max_attempts,
        expiry_ratio = config.refresh.expiry_ratio,
        "Reconnect / refresh"
    );
}
