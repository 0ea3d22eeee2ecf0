//! 재연결 백오프 정책.
//!
//! `delay(n) = min(initial * factor^(n-1), max) + jitter`, jitter는 `[0, jitter_ms]`
//! 구간의 균등 분포입니다. 정상 세션 이후 첫 재연결은 `n = 1`입니다.

use rand::Rng;
use standby_core::ReconnectConfig;
use std::time::Duration;

/// 지수 백오프 재연결 정책.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
}

impl ReconnectPolicy {
    pub fn new(config: ReconnectConfig) -> Self {
        Self { config }
    }

    /// 지터를 제외한 대기 시간 (밀리초).
    pub fn base_delay_ms(&self, attempt: u32) -> u64 {
        let exponent = attempt.saturating_sub(1).min(63) as i32;
        let delay = self.config.initial_delay_ms as f64 * self.config.backoff_factor.powi(exponent);
        if delay.is_finite() {
            delay.min(self.config.max_delay_ms as f64) as u64
        } else {
            self.config.max_delay_ms
        }
    }

    /// `attempt`번째 재연결 전 대기 시간.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let jitter = if self.config.jitter_ms > 0 {
            rand::thread_rng().gen_range(0..=self.config.jitter_ms)
        } else {
            0
        };
        Duration::from_millis(self.base_delay_ms(attempt).saturating_add(jitter))
    }

    /// 재시도 허용 여부 (`max_attempts`가 없으면 무제한).
    pub fn should_retry(&self, attempt: u32) -> bool {
        self.config.max_attempts.map_or(true, |max| attempt <= max)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(ReconnectConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_default_progression() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.base_delay_ms(1), 1_000);
        assert_eq!(policy.base_delay_ms(2), 2_000);
        assert_eq!(policy.base_delay_ms(3), 4_000);
        assert_eq!(policy.base_delay_ms(5), 16_000);
        assert_eq!(policy.base_delay_ms(6), 30_000);
        assert_eq!(policy.base_delay_ms(100), 30_000);
    }

    #[test]
    fn test_zero_jitter_is_exact() {
        let policy = ReconnectPolicy::new(ReconnectConfig {
            jitter_ms: 0,
            ..Default::default()
        });
        assert_eq!(policy.delay_for(2), Duration::from_millis(2_000));
    }

    #[test]
    fn test_should_retry_limits() {
        let unlimited = ReconnectPolicy::default();
        assert!(unlimited.should_retry(u32::MAX));

        let capped = ReconnectPolicy::new(ReconnectConfig {
            max_attempts: Some(3),
            ..Default::default()
        });
        assert!(capped.should_retry(1));
        assert!(capped.should_retry(3));
        assert!(!capped.should_retry(4));
    }

    proptest! {
        #[test]
        fn delay_stays_within_bounds(
            initial in 1u64..5_000,
            max in 5_000u64..120_000,
            factor in 1.0f64..4.0,
            jitter in 0u64..2_000,
            attempt in 1u32..200,
        ) {
            let policy = ReconnectPolicy::new(ReconnectConfig {
                initial_delay_ms: initial,
                max_delay_ms: max,
                backoff_factor: factor,
                jitter_ms: jitter,
                max_attempts: None,
            });
            let delay = policy.delay_for(attempt).as_millis() as u64;
            let base = policy.base_delay_ms(attempt);

            prop_assert!(base <= max);
            prop_assert!(base >= initial.min(max));
            prop_assert!(delay >= base);
            prop_assert!(delay <= base + jitter);
        }

        #[test]
        fn base_delay_is_monotonic(attempt in 1u32..100) {
            let policy = ReconnectPolicy::default();
            prop_assert!(policy.base_delay_ms(attempt) <= policy.base_delay_ms(attempt + 1));
        }
    }
}
