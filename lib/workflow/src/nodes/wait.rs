//! Wait-delay node: immediate, scheduled, and business-hours waits.
//!
//! Caps: immediate waits are clamped to 24 hours, scheduled and
//! business-hours waits to 30 days. A non-positive or already-elapsed
//! delay completes without sleeping.

use crate::context::ExecutionContext;
use crate::node::NodeSpec;
use crate::processor::{parse_config, NodeOutcome, NodeProcessor, ProcessorError};
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, FixedOffset, TimeZone, Timelike, Utc};
use serde::Deserialize;
use serde_json::json;

const MAX_IMMEDIATE_SECS: i64 = 24 * 60 * 60;
const MAX_SCHEDULED_SECS: i64 = 30 * 24 * 60 * 60;

/// What the node waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitMode {
    /// A fixed number of seconds.
    #[default]
    Immediate,
    /// Until an absolute datetime.
    Scheduled,
    /// Until the next configured business-hours window.
    BusinessHours,
}

/// A weekly business-hours window in a fixed UTC offset.
#[derive(Debug, Clone, Deserialize)]
pub struct BusinessHoursConfig {
    /// ISO weekday numbers (1 = Monday .. 7 = Sunday).
    pub days: Vec<u32>,
    /// Window start hour (0-23), inclusive.
    pub start_hour: u32,
    /// Window end hour (0-23), exclusive.
    pub end_hour: u32,
    /// Offset from UTC in minutes (e.g. -300 for UTC-5).
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

#[derive(Debug, Deserialize)]
struct WaitConfig {
    #[serde(default)]
    mode: WaitMode,
    #[serde(default)]
    delay_seconds: Option<i64>,
    #[serde(default)]
    until: Option<DateTime<Utc>>,
    #[serde(default)]
    business_hours: Option<BusinessHoursConfig>,
}

/// Seconds until the next business-hours window opens; zero inside one.
///
/// Searches day by day, so a config whose `days` never matches gives up
/// after two weeks and returns `None`.
fn secs_until_business_hours(now: DateTime<Utc>, cfg: &BusinessHoursConfig) -> Option<i64> {
    let offset = FixedOffset::east_opt(cfg.utc_offset_minutes * 60)?;
    let local = now.with_timezone(&offset);

    if cfg.days.contains(&local.weekday().number_from_monday())
        && local.hour() >= cfg.start_hour
        && local.hour() < cfg.end_hour
    {
        return Some(0);
    }

    for ahead in 0..14 {
        let candidate_day = local.date_naive() + Duration::days(ahead);
        if !cfg
            .days
            .contains(&candidate_day.weekday().number_from_monday())
        {
            continue;
        }
        let opens = offset
            .with_ymd_and_hms(
                candidate_day.year(),
                candidate_day.month(),
                candidate_day.day(),
                cfg.start_hour,
                0,
                0,
            )
            .single()?;
        if opens > local {
            return Some((opens.with_timezone(&Utc) - now).num_seconds());
        }
    }
    None
}

/// Processor for [`crate::node::NodeType::WaitDelay`].
#[derive(Debug, Default)]
pub struct WaitDelayProcessor;

impl WaitDelayProcessor {
    fn planned_wait(config: &WaitConfig, now: DateTime<Utc>) -> Result<i64, ProcessorError> {
        match config.mode {
            WaitMode::Immediate => {
                let secs = config.delay_seconds.unwrap_or(0);
                Ok(secs.clamp(0, MAX_IMMEDIATE_SECS))
            }
            WaitMode::Scheduled => {
                let until = config.until.ok_or_else(|| {
                    ProcessorError::validation("scheduled wait requires `until`")
                })?;
                Ok((until - now).num_seconds().clamp(0, MAX_SCHEDULED_SECS))
            }
            WaitMode::BusinessHours => {
                let cfg = config.business_hours.as_ref().ok_or_else(|| {
                    ProcessorError::validation("business_hours wait requires a window config")
                })?;
                if cfg.days.is_empty() || cfg.start_hour >= cfg.end_hour || cfg.end_hour > 24 {
                    return Err(ProcessorError::validation(
                        "business hours window is empty or inverted",
                    ));
                }
                let secs = secs_until_business_hours(now, cfg).ok_or_else(|| {
                    ProcessorError::validation("business hours window never opens")
                })?;
                Ok(secs.min(MAX_SCHEDULED_SECS))
            }
        }
    }
}

#[async_trait]
impl NodeProcessor for WaitDelayProcessor {
    async fn process(
        &self,
        node: &NodeSpec,
        _ctx: &mut ExecutionContext,
    ) -> Result<NodeOutcome, ProcessorError> {
        let config: WaitConfig = parse_config(node)?;
        let secs = Self::planned_wait(&config, Utc::now())?;
        if secs > 0 {
            tracing::debug!(node_id = %node.id, secs, "waiting");
            tokio::time::sleep(std::time::Duration::from_secs(secs as u64)).await;
        }
        Ok(NodeOutcome::Completed(json!({
            "success": true,
            "actual_delay_seconds": secs,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeType;
    use relaycrm_core::{ExecutionId, WorkflowId};
    use serde_json::Value as JsonValue;

    fn ctx() -> ExecutionContext {
        ExecutionContext::seed(json!({}), "t", ExecutionId::new(), WorkflowId::new())
    }

    async fn run(config: JsonValue) -> JsonValue {
        let node = NodeSpec::new("wait", NodeType::WaitDelay, config);
        let NodeOutcome::Completed(result) = WaitDelayProcessor
            .process(&node, &mut ctx())
            .await
            .expect("process")
        else {
            panic!("expected completion");
        };
        result
    }

    #[tokio::test(start_paused = true)]
    async fn immediate_wait_sleeps_the_configured_seconds() {
        let before = tokio::time::Instant::now();
        let result = run(json!({"delay_seconds": 90})).await;
        assert_eq!(result["actual_delay_seconds"], json!(90));
        assert!(before.elapsed() >= std::time::Duration::from_secs(90));
    }

    #[tokio::test]
    async fn non_positive_delay_completes_without_sleeping() {
        let result = run(json!({"delay_seconds": -5})).await;
        assert_eq!(result["actual_delay_seconds"], json!(0));
        let result = run(json!({})).await;
        assert_eq!(result["actual_delay_seconds"], json!(0));
    }

    #[tokio::test(start_paused = true)]
    async fn immediate_wait_is_capped_at_a_day() {
        let result = run(json!({"delay_seconds": 1_000_000})).await;
        assert_eq!(result["actual_delay_seconds"], json!(MAX_IMMEDIATE_SECS));
    }

    #[tokio::test]
    async fn scheduled_wait_in_the_past_completes_immediately() {
        let result = run(json!({
            "mode": "scheduled",
            "until": "2020-01-01T00:00:00Z"
        }))
        .await;
        assert_eq!(result["actual_delay_seconds"], json!(0));
    }

    #[tokio::test]
    async fn scheduled_wait_requires_until() {
        let node = NodeSpec::new("wait", NodeType::WaitDelay, json!({"mode": "scheduled"}));
        let result = WaitDelayProcessor.process(&node, &mut ctx()).await;
        assert!(matches!(result, Err(ProcessorError::Validation { .. })));
    }

    #[test]
    fn inside_business_hours_means_no_wait() {
        // Monday 2026-08-24 15:00 UTC.
        let now = Utc.with_ymd_and_hms(2026, 8, 24, 15, 0, 0).single().expect("ts");
        let cfg = BusinessHoursConfig {
            days: vec![1, 2, 3, 4, 5],
            start_hour: 9,
            end_hour: 17,
            utc_offset_minutes: 0,
        };
        assert_eq!(secs_until_business_hours(now, &cfg), Some(0));
    }

    #[test]
    fn after_hours_waits_until_next_morning() {
        // Monday 18:00 UTC; window opens Tuesday 09:00.
        let now = Utc.with_ymd_and_hms(2026, 8, 24, 18, 0, 0).single().expect("ts");
        let cfg = BusinessHoursConfig {
            days: vec![1, 2, 3, 4, 5],
            start_hour: 9,
            end_hour: 17,
            utc_offset_minutes: 0,
        };
        assert_eq!(secs_until_business_hours(now, &cfg), Some(15 * 60 * 60));
    }

    #[test]
    fn weekend_waits_until_monday() {
        // Saturday 2026-08-29 10:00 UTC; Monday 09:00 is in 47 hours.
        let now = Utc.with_ymd_and_hms(2026, 8, 29, 10, 0, 0).single().expect("ts");
        let cfg = BusinessHoursConfig {
            days: vec![1, 2, 3, 4, 5],
            start_hour: 9,
            end_hour: 17,
            utc_offset_minutes: 0,
        };
        assert_eq!(secs_until_business_hours(now, &cfg), Some(47 * 60 * 60));
    }

    #[test]
    fn offset_shifts_the_window() {
        // 13:00 UTC is 08:00 at UTC-5, one hour before opening.
        let now = Utc.with_ymd_and_hms(2026, 8, 24, 13, 0, 0).single().expect("ts");
        let cfg = BusinessHoursConfig {
            days: vec![1, 2, 3, 4, 5],
            start_hour: 9,
            end_hour: 17,
            utc_offset_minutes: -300,
        };
        assert_eq!(secs_until_business_hours(now, &cfg), Some(60 * 60));
    }

    #[tokio::test]
    async fn inverted_business_window_is_rejected() {
        let node = NodeSpec::new(
            "wait",
            NodeType::WaitDelay,
            json!({
                "mode": "business_hours",
                "business_hours": {"days": [1], "start_hour": 17, "end_hour": 9}
            }),
        );
        let result = WaitDelayProcessor.process(&node, &mut ctx()).await;
        assert!(matches!(result, Err(ProcessorError::Validation { .. })));
    }
}
