//! Weekly trigger and retry policy.
//!
//! Runs fire every Monday at 10:00 UTC. Each stage of a run gets one retry
//! after a one-minute delay; stages that already succeeded are not repeated.
//! Slots missed while the process was down are not caught
//! up, and a new run never starts before the previous one has finished.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Datelike, Days, NaiveTime, Utc, Weekday};
use tracing::{error, info, warn};

use crate::error::Result;
use crate::output::{LedgerRow, append_run};
use crate::pipeline::{PipelineContext, RunReport, run_with_policy};

pub const RUN_WEEKDAY: Weekday = Weekday::Mon;
pub const RUN_HOUR: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first failure.
    pub retries: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    /// A single attempt, no retries.
    pub const fn none() -> Self {
        Self {
            retries: 0,
            delay: Duration::ZERO,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 1,
            delay: Duration::from_secs(60),
        }
    }
}

/// The first scheduled slot strictly after `now`.
pub fn next_run_after(now: DateTime<Utc>) -> DateTime<Utc> {
    let slot_time = NaiveTime::from_hms_opt(RUN_HOUR, 0, 0).unwrap_or(NaiveTime::MIN);
    let today = now.date_naive();
    let days_ahead = (7 + RUN_WEEKDAY.num_days_from_monday()
        - today.weekday().num_days_from_monday())
        % 7;

    let candidate = (today + Days::new(u64::from(days_ahead)))
        .and_time(slot_time)
        .and_utc();
    if candidate > now {
        candidate
    } else {
        candidate + Days::new(7)
    }
}

/// Calls `attempt` until it succeeds or the policy is exhausted.
///
/// Returns the final result together with the number of attempts made.
pub async fn run_with_retry<T, F, Fut>(policy: RetryPolicy, mut attempt: F) -> (Result<T>, u32)
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempts = 0;
    loop {
        attempts += 1;
        match attempt(attempts).await {
            Ok(value) => return (Ok(value), attempts),
            Err(err) if attempts <= policy.retries => {
                warn!(
                    attempt = attempts,
                    kind = err.kind(),
                    error = %err,
                    delay_secs = policy.delay.as_secs(),
                    "Attempt failed, retrying"
                );
                tokio::time::sleep(policy.delay).await;
            }
            Err(err) => return (Err(err), attempts),
        }
    }
}

/// Runs the pipeline with per-stage retries and appends the outcome to the
/// run ledger.
pub async fn run_and_record(ctx: &PipelineContext, policy: RetryPolicy) -> Result<RunReport> {
    let (result, attempts) = run_with_policy(ctx, policy).await;

    let row = match &result {
        Ok(report) => LedgerRow::from_report(report, attempts),
        Err(err) => LedgerRow::from_error(ctx.run_date, err, attempts),
    };
    if let Err(e) = append_run(&ctx.config.run_ledger_path, &row) {
        error!(error = %e, "Failed to append run ledger");
    }

    result
}

fn slot_delay(now: DateTime<Utc>, next: DateTime<Utc>) -> Duration {
    (next - now).to_std().unwrap_or(Duration::ZERO)
}

/// Sleeps until each weekly slot and runs the pipeline, forever.
pub async fn run_scheduled(base: PipelineContext, policy: RetryPolicy) -> ! {
    loop {
        let now = Utc::now();
        let next = next_run_after(now);
        info!(next_run = %next, "Waiting for next scheduled run");
        tokio::time::sleep(slot_delay(now, next)).await;

        let ctx = base.for_date(Utc::now().date_naive());
        match run_and_record(&ctx, policy).await {
            Ok(report) => info!(
                run_date = %report.run_date,
                rows = report.rows,
                output_key = %report.output_key,
                "Scheduled run succeeded"
            ),
            Err(err) => error!(kind = err.kind(), error = %err, "Scheduled run failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn test_next_run_from_midweek() {
        // Wednesday
        assert_eq!(next_run_after(utc(2025, 4, 30, 12, 0)), utc(2025, 5, 5, 10, 0));
    }

    #[test]
    fn test_next_run_same_monday_before_slot() {
        assert_eq!(next_run_after(utc(2025, 5, 5, 9, 59)), utc(2025, 5, 5, 10, 0));
    }

    #[test]
    fn test_next_run_exactly_at_slot_skips_a_week() {
        assert_eq!(next_run_after(utc(2025, 5, 5, 10, 0)), utc(2025, 5, 12, 10, 0));
        assert_eq!(next_run_after(utc(2025, 5, 5, 11, 0)), utc(2025, 5, 12, 10, 0));
    }

    #[test]
    fn test_next_run_from_sunday() {
        assert_eq!(next_run_after(utc(2025, 5, 11, 23, 0)), utc(2025, 5, 12, 10, 0));
    }

    #[test]
    fn test_slot_delay_never_negative() {
        let now = utc(2025, 5, 5, 10, 0);
        assert_eq!(slot_delay(now, utc(2025, 5, 5, 9, 0)), Duration::ZERO);
        assert_eq!(slot_delay(now, utc(2025, 5, 5, 10, 1)), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_retry_once_then_succeed() {
        let policy = RetryPolicy {
            retries: 1,
            delay: Duration::ZERO,
        };
        let (result, attempts) = run_with_retry(policy, |n| async move {
            if n == 1 {
                Err(PipelineError::Transport("flaky".into()))
            } else {
                Ok(n)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(attempts, 2);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_policy() {
        let policy = RetryPolicy {
            retries: 1,
            delay: Duration::ZERO,
        };
        let (result, attempts) = run_with_retry(policy, |_| async {
            Err::<(), _>(PipelineError::NotFound("No CSV".into()))
        })
        .await;
        assert!(matches!(result, Err(PipelineError::NotFound(_))));
        assert_eq!(attempts, 2);
    }

    #[test]
    fn test_none_policy_makes_one_attempt() {
        assert_eq!(RetryPolicy::none().retries, 0);
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.retries, 1);
        assert_eq!(policy.delay, Duration::from_secs(60));
    }
}
