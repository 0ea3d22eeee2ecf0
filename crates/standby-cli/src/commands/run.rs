//! 실행 명령.

use anyhow::Context;
use standby_core::AppConfig;
use standby_feed::{AuthTokenManager, CoordinatorStatus, FailoverCoordinator, WebSocketTransport};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// 코디네이터를 실행하고 Ctrl+C가 들어오면 종료합니다.
pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    info!(channels = config.channels.len(), "Warm-standby client 시작");

    let auth = AuthTokenManager::new(config.auth.clone()).context("auth client 생성 실패")?;
    let coordinator = FailoverCoordinator::from_config(
        &config,
        Arc::new(WebSocketTransport::new()),
        Arc::new(auth),
    )?;

    let mut status = coordinator.status();
    let shutdown = CancellationToken::new();
    let mut task = tokio::spawn(coordinator.run(shutdown.clone()));
    let mut tracker = StatusTracker::default();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("종료 신호 수신, 채널 종료 중...");
                shutdown.cancel();
                break;
            }
            result = &mut task => {
                return result.context("coordinator task panicked")?.map_err(Into::into);
            }
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = status.borrow_and_update().clone();
                for change in tracker.observe(&snapshot) {
                    match change {
                        StatusChange::Primary(primary) => info!(primary = ?primary, "PRIMARY changed"),
                        StatusChange::AllDown(true) => warn!("No channel connected"),
                        StatusChange::AllDown(false) => info!("Connectivity restored"),
                    }
                }
            }
        }
    }

    task.await.context("coordinator task panicked")??;
    info!("Warm-standby client 종료");
    Ok(())
}

/// 운영자에게 알릴 상태 변화.
#[derive(Debug, Clone, PartialEq, Eq)]
enum StatusChange {
    Primary(Option<String>),
    AllDown(bool),
}

/// 직전 스냅샷과 비교해 바뀐 항목만 돌려줍니다.
#[derive(Debug, Default)]
struct StatusTracker {
    primary: Option<String>,
    all_down: bool,
}

impl StatusTracker {
    fn observe(&mut self, snapshot: &CoordinatorStatus) -> Vec<StatusChange> {
        let mut changes = Vec::new();
        if snapshot.primary != self.primary {
            self.primary = snapshot.primary.clone();
            changes.push(StatusChange::Primary(self.primary.clone()));
        }
        if snapshot.all_down != self.all_down {
            self.all_down = snapshot.all_down;
            changes.push(StatusChange::AllDown(self.all_down));
        }
        changes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(primary: &str, all_down: bool) -> CoordinatorStatus {
        CoordinatorStatus {
            primary: Some(primary.to_string()),
            all_down,
            ..Default::default()
        }
    }

    #[test]
    fn test_all_down_reported_once_per_transition() {
        let mut tracker = StatusTracker::default();
        assert_eq!(
            tracker.observe(&snapshot("CH1", false)),
            vec![StatusChange::Primary(Some("CH1".to_string()))]
        );

        assert_eq!(tracker.observe(&snapshot("CH1", true)), vec![StatusChange::AllDown(true)]);
        assert!(tracker.observe(&snapshot("CH1", true)).is_empty());
        assert!(tracker.observe(&snapshot("CH1", true)).is_empty());

        assert_eq!(tracker.observe(&snapshot("CH1", false)), vec![StatusChange::AllDown(false)]);
    }

    #[test]
    fn test_primary_change_reported() {
        let mut tracker = StatusTracker::default();
        tracker.observe(&snapshot("CH1", false));
        assert_eq!(
            tracker.observe(&snapshot("CH2", false)),
            vec![StatusChange::Primary(Some("CH2".to_string()))]
        );
        assert!(tracker.observe(&snapshot("CH2", false)).is_empty());
    }
}
