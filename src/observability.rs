//! Structured observability (C10, spec §4.10).
//!
//! A thin wrapper over `tracing` spans/events carrying the
//! `domain`/`event_category`/`event_name` fields as structured fields —
//! generalizes the teacher's `middleware/logging.rs` request-span
//! pattern (which already attaches method/route/status as fields) to
//! the four logical streams the spec calls out. Writes never cause
//! business-path failures: every call here is synchronous but
//! infallible.

use std::time::Instant;

use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    Auth,
    Http,
    Db,
    Business,
    System,
    Security,
    Ai,
    Realtime,
}

impl Domain {
    fn as_str(&self) -> &'static str {
        match self {
            Domain::Auth => "auth",
            Domain::Http => "http",
            Domain::Db => "db",
            Domain::Business => "business",
            Domain::System => "system",
            Domain::Security => "security",
            Domain::Ai => "ai",
            Domain::Realtime => "realtime",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventCategory {
    Authentication,
    Authorization,
    Change,
    Error,
    Availability,
    SecurityIncident,
    Performance,
}

impl EventCategory {
    fn as_str(&self) -> &'static str {
        match self {
            EventCategory::Authentication => "authentication",
            EventCategory::Authorization => "authorization",
            EventCategory::Change => "change",
            EventCategory::Error => "error",
            EventCategory::Availability => "availability",
            EventCategory::SecurityIncident => "security_incident",
            EventCategory::Performance => "performance",
        }
    }
}

#[derive(Debug, Default)]
pub struct EventContext<'a> {
    pub user_id: Option<Uuid>,
    pub role: Option<&'a str>,
    pub ip: Option<&'a str>,
    pub method: Option<&'a str>,
    pub route: Option<&'a str>,
    pub request_id: Option<Uuid>,
}

/// Emits one structured event on the matching `tracing` level (spec
/// §4.10: info/warn/error).
pub fn emit(
    level: tracing::Level,
    domain: Domain,
    category: EventCategory,
    event_name: &str,
    ctx: &EventContext,
    metadata: Option<serde_json::Value>,
) {
    let user_id = ctx.user_id.map(|u| u.to_string()).unwrap_or_default();
    let request_id = ctx.request_id.map(|u| u.to_string()).unwrap_or_default();
    let metadata = metadata.map(|m| m.to_string()).unwrap_or_default();

    match level {
        tracing::Level::ERROR => tracing::error!(
            domain = domain.as_str(),
            event_category = category.as_str(),
            event_name,
            user_id,
            role = ctx.role.unwrap_or_default(),
            ip = ctx.ip.unwrap_or_default(),
            method = ctx.method.unwrap_or_default(),
            route = ctx.route.unwrap_or_default(),
            request_id,
            metadata,
        ),
        tracing::Level::WARN => tracing::warn!(
            domain = domain.as_str(),
            event_category = category.as_str(),
            event_name,
            user_id,
            role = ctx.role.unwrap_or_default(),
            ip = ctx.ip.unwrap_or_default(),
            method = ctx.method.unwrap_or_default(),
            route = ctx.route.unwrap_or_default(),
            request_id,
            metadata,
        ),
        _ => tracing::info!(
            domain = domain.as_str(),
            event_category = category.as_str(),
            event_name,
            user_id,
            role = ctx.role.unwrap_or_default(),
            ip = ctx.ip.unwrap_or_default(),
            method = ctx.method.unwrap_or_default(),
            route = ctx.route.unwrap_or_default(),
            request_id,
            metadata,
        ),
    }
}

pub fn brute_force_detected(user_id: Uuid, ip: Option<&str>) {
    emit(
        tracing::Level::WARN,
        Domain::Security,
        EventCategory::SecurityIncident,
        "BRUTE_FORCE_DETECTED",
        &EventContext {
            user_id: Some(user_id),
            ip,
            ..Default::default()
        },
        None,
    );
}

#[derive(Debug, Serialize)]
struct MemorySnapshot {
    rss_kb: u64,
}

/// `/proc/self/status` RSS sampling with no extra crate — the teacher
/// carries no process-metrics dependency, and adding `sysinfo` for one
/// gauge was judged not worth a new dependency (see DESIGN.md).
fn read_rss_kb() -> Option<u64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    for line in status.lines() {
        if let Some(rest) = line.strip_prefix("VmRSS:") {
            return rest.trim().trim_end_matches(" kB").trim().parse().ok();
        }
    }
    None
}

/// Periodic availability monitor, started at boot (spec §4.10). Runs
/// until the returned `JoinHandle` is aborted at shutdown.
pub fn spawn_availability_monitor(
    interval: std::time::Duration,
    rss_warning_kb: u64,
) -> tokio::task::JoinHandle<()> {
    let start = Instant::now();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let uptime_secs = start.elapsed().as_secs();
            let rss_kb = read_rss_kb();

            emit(
                tracing::Level::INFO,
                Domain::System,
                EventCategory::Availability,
                "HEALTH_CHECK_PASS",
                &EventContext::default(),
                Some(serde_json::json!({ "uptimeSecs": uptime_secs, "rssKb": rss_kb })),
            );

            if let Some(rss_kb) = rss_kb {
                if rss_kb > rss_warning_kb {
                    emit(
                        tracing::Level::WARN,
                        Domain::System,
                        EventCategory::Availability,
                        "MEMORY_WARNING",
                        &EventContext::default(),
                        Some(serde_json::json!({ "rssKb": rss_kb, "thresholdKb": rss_warning_kb })),
                    );
                }
            }
        }
    })
}
