// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Metrics handlers: SLIs, budgets, rollups, cleanup.

use super::ListenCtx;
use crate::protocol::Response;
use kokino_engine::EngineError;
use kokino_storage::Slo;
use std::sync::Arc;

/// Shadow stats window for the dashboard and performance views.
const SHADOW_WINDOW_MS: i64 = 24 * 60 * 60 * 1000;

pub(super) fn dashboard(ctx: &Arc<ListenCtx>) -> Result<Response, EngineError> {
    let availability = ctx.telemetry_store.availability(24)?;
    let p95 = ctx.telemetry_store.latency_percentile(95, 24)?;
    let shadow = ctx.shadow.stats(SHADOW_WINDOW_MS)?;
    let mut budgets = serde_json::Map::new();
    for slo in [Slo::Availability, Slo::Latency, Slo::Correctness, Slo::Integrity] {
        let budget = ctx.telemetry_store.error_budget(slo, 24)?;
        budgets.insert(
            format!("{:?}", slo).to_lowercase(),
            serde_json::to_value(&budget).map_err(|e| EngineError::Internal(e.to_string()))?,
        );
    }
    let unresolved = ctx.monitoring.unresolved_errors(50)?;

    Ok(Response::Dashboard {
        body: serde_json::json!({
            "availability": availability,
            "p95_ms": p95,
            "shadow": shadow,
            "budgets": budgets,
            "unresolved_errors": unresolved.len(),
            "subscribers": ctx.stream.subscriber_count(),
            "active_executions": ctx.sessions.active_count(),
        }),
    })
}

pub(super) fn performance(ctx: &Arc<ListenCtx>, window_hours: i64) -> Result<Response, EngineError> {
    validate_window(window_hours)?;
    Ok(Response::Performance {
        availability: ctx.telemetry_store.availability(window_hours)?,
        p50_ms: ctx.telemetry_store.latency_percentile(50, window_hours)?,
        p95_ms: ctx.telemetry_store.latency_percentile(95, window_hours)?,
        p99_ms: ctx.telemetry_store.latency_percentile(99, window_hours)?,
        shadow: ctx.shadow.stats(SHADOW_WINDOW_MS)?,
    })
}

pub(super) fn endpoints(ctx: &Arc<ListenCtx>, window_hours: i64) -> Result<Response, EngineError> {
    validate_window(window_hours)?;
    Ok(Response::Endpoints {
        endpoints: ctx.telemetry_store.endpoint_percentiles(window_hours)?,
    })
}

pub(super) fn slo(
    ctx: &Arc<ListenCtx>,
    sli: &str,
    window_hours: i64,
) -> Result<Response, EngineError> {
    validate_window(window_hours)?;
    let slo: Slo = sli
        .parse()
        .map_err(|e: String| EngineError::Validation(e))?;
    Ok(Response::Slo {
        budget: ctx.telemetry_store.error_budget(slo, window_hours)?,
    })
}

pub(super) fn errors(ctx: &Arc<ListenCtx>, window_hours: i64) -> Result<Response, EngineError> {
    validate_window(window_hours)?;
    Ok(Response::Failures {
        failures: ctx.telemetry_store.recent_failures(window_hours, 100)?,
    })
}

pub(super) fn rate(ctx: &Arc<ListenCtx>, window_hours: i64) -> Result<Response, EngineError> {
    validate_window(window_hours)?;
    Ok(Response::Rate {
        buckets: ctx.telemetry_store.execution_rate(window_hours)?,
    })
}

pub(super) fn cleanup(
    ctx: &Arc<ListenCtx>,
    retention_days: Option<i64>,
) -> Result<Response, EngineError> {
    let retention = retention_days.unwrap_or(ctx.config.telemetry_retention_days);
    if retention <= 0 {
        return Err(EngineError::Validation(
            "retention days must be positive".into(),
        ));
    }
    Ok(Response::CleanupResult {
        deleted: ctx.telemetry_store.cleanup(retention)?,
    })
}

fn validate_window(window_hours: i64) -> Result<(), EngineError> {
    if window_hours <= 0 {
        return Err(EngineError::Validation(
            "window hours must be positive".into(),
        ));
    }
    Ok(())
}
