//! API and status page
//!
//! Routes, all under `ROOT_URL`:
//!
//! - `GET /`: HTML table of records
//! - `GET /update`: force an update of every record
//! - `GET /api/records`: records as JSON
//! - `GET /api/json`: records plus the last successful update

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Json};
use axum::routing::get;
use chrono::{DateTime, Utc};
use ddns_core::config::format_duration;
use ddns_core::models::{IpVersion, Record, Status};
use ddns_core::{ForceHandle, RecordStore};
use serde::Serialize;
use std::fmt::Write;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;

#[derive(Clone)]
struct AppState {
    records: Arc<RecordStore>,
    force: ForceHandle,
}

/// Build the router, nested under `root_url`
pub fn router(root_url: &str, records: Arc<RecordStore>, force: ForceHandle) -> Router {
    let routes = Router::new()
        .route("/", get(index))
        .route("/update", get(update))
        .route("/api/records", get(api_records))
        .route("/api/json", get(api_json))
        .with_state(AppState { records, force });

    match root_url.trim_end_matches('/') {
        "" => routes,
        prefix => Router::new().nest(prefix, routes),
    }
}

/// A record as shown by the API
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordView {
    pub domain: String,
    pub owner: String,
    pub provider: String,
    pub ip_version: IpVersion,
    pub status: Status,
    pub message: String,
    pub current_ip: Option<IpAddr>,
    pub previous_ips: Vec<IpAddr>,
    pub total_ips_in_history: usize,
    pub last_update: Option<DateTime<Utc>>,
    pub success_time: Option<DateTime<Utc>>,
    pub duration_since_success: Option<String>,
}

impl RecordView {
    pub fn new(record: &Record, now: DateTime<Utc>) -> Self {
        let provider = &record.provider;
        Self {
            domain: provider.domain().to_string(),
            owner: provider.owner().to_string(),
            provider: provider.name().to_string(),
            ip_version: provider.ip_version(),
            status: record.status,
            message: record.message.clone(),
            current_ip: record.history.current_ip(),
            previous_ips: record.history.previous_ips(),
            total_ips_in_history: record.history.len(),
            last_update: record.time,
            success_time: record.history.success_time(),
            duration_since_success: record.history.duration_since_success(now),
        }
    }
}

#[derive(Debug, Serialize)]
struct Overview {
    records: Vec<RecordView>,
    time: DateTime<Utc>,
    last_success_time: Option<DateTime<Utc>>,
    last_success_ip: Option<IpAddr>,
}

impl Overview {
    fn new(records: Vec<RecordView>, now: DateTime<Utc>) -> Self {
        let last_success = records
            .iter()
            .filter_map(|r| r.success_time.zip(r.current_ip))
            .max_by_key(|(time, _)| *time);
        Self {
            last_success_time: last_success.map(|(time, _)| time),
            last_success_ip: last_success.map(|(_, ip)| ip),
            records,
            time: now,
        }
    }
}

async fn views(state: &AppState) -> Vec<RecordView> {
    let now = Utc::now();
    state
        .records
        .select_all()
        .await
        .iter()
        .map(|record| RecordView::new(record, now))
        .collect()
}

async fn api_records(State(state): State<AppState>) -> Json<Vec<RecordView>> {
    Json(views(&state).await)
}

async fn api_json(State(state): State<AppState>) -> Json<Overview> {
    let records = views(&state).await;
    Json(Overview::new(records, Utc::now()))
}

async fn update(State(state): State<AppState>) -> impl IntoResponse {
    let start = Instant::now();
    let errors = state.force.force_update().await;
    if errors.is_empty() {
        let message = format!(
            "All records updated successfully in {}",
            format_duration(start.elapsed())
        );
        return (StatusCode::ACCEPTED, message);
    }

    let errors: Vec<String> = errors.iter().map(ToString::to_string).collect();
    (StatusCode::INTERNAL_SERVER_ERROR, errors.join(", "))
}

async fn index(State(state): State<AppState>) -> impl IntoResponse {
    let page = render_page(&views(&state).await);
    ([(header::CACHE_CONTROL, "no-cache")], Html(page))
}

fn render_page(records: &[RecordView]) -> String {
    let mut rows = String::new();
    for record in records {
        let domain = escape(&ddns_core::provider::utils::build_domain_name(
            &record.owner,
            &record.domain,
        ));
        let current_ip = record
            .current_ip
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| "N/A".to_string());
        let previous_ips = record
            .previous_ips
            .iter()
            .rev()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        let time = record
            .last_update
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default();

        let _ = write!(
            rows,
            "<tr><td><a href=\"http://{domain}\">{domain}</a></td><td>{}</td><td>{}</td>\
             <td>{}</td><td class=\"{}\">{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            escape(&record.owner),
            escape(&record.provider),
            record.ip_version,
            status_class(record.status),
            record.status,
            escape(&record.message),
            time,
            current_ip,
            previous_ips,
        );
    }

    format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>DDNS Updater</title></head>\
         <body><table><thead><tr><th>Domain</th><th>Owner</th><th>Provider</th>\
         <th>IP Version</th><th>Update Status</th><th>Message</th><th>Last Update</th>\
         <th>Current IP</th><th>Previous IPs</th></tr></thead><tbody>{rows}</tbody></table>\
         </body></html>\n"
    )
}

fn status_class(status: Status) -> &'static str {
    match status {
        Status::Success => "success",
        Status::Fail => "error",
        Status::UpToDate => "uptodate",
        Status::Updating => "updating",
        Status::Unset => "unset",
    }
}

fn escape(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpService;
    use crate::testing::{StaticProvider, records_with};
    use ddns_core::lifecycle::Service;
    use ddns_core::models::{History, HistoryEvent};
    use chrono::TimeZone;

    fn event(ip: &str, hour: u32) -> HistoryEvent {
        HistoryEvent::new(
            ip.parse().unwrap(),
            Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap(),
        )
    }

    #[test]
    fn record_view_fields() {
        let mut record = Record::new(
            Arc::new(StaticProvider::new("www")),
            History::new(vec![event("198.51.100.1", 10), event("203.0.113.5", 11)]),
        );
        record.status = Status::UpToDate;
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 14, 0, 0).unwrap();

        let view = RecordView::new(&record, now);
        assert_eq!(view.domain, "example.com");
        assert_eq!(view.owner, "www");
        assert_eq!(view.current_ip, Some("203.0.113.5".parse().unwrap()));
        assert_eq!(view.previous_ips, vec!["198.51.100.1".parse::<IpAddr>().unwrap()]);
        assert_eq!(view.total_ips_in_history, 2);
        assert_eq!(view.duration_since_success.as_deref(), Some("3h"));

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["status"], "up to date");
        assert_eq!(json["ip_version"], "ipv4");
    }

    #[test]
    fn overview_picks_latest_success() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 14, 0, 0).unwrap();
        let older = Record::new(
            Arc::new(StaticProvider::new("a")),
            History::new(vec![event("198.51.100.1", 9)]),
        );
        let newer = Record::new(
            Arc::new(StaticProvider::new("b")),
            History::new(vec![event("203.0.113.5", 12)]),
        );
        let empty = Record::new(Arc::new(StaticProvider::new("c")), History::default());

        let overview = Overview::new(
            [older, newer, empty].iter().map(|r| RecordView::new(r, now)).collect(),
            now,
        );
        assert_eq!(overview.last_success_ip, Some("203.0.113.5".parse().unwrap()));
        assert_eq!(overview.last_success_time, Some(event("203.0.113.5", 12).time));
    }

    #[test]
    fn page_escapes_messages() {
        let mut record = Record::new(Arc::new(StaticProvider::new("@")), History::default());
        record.message = "<script>".to_string();
        let page = render_page(&[RecordView::new(&record, Utc::now())]);
        assert!(page.contains("&lt;script&gt;"));
        assert!(!page.contains("<script>"));
    }

    #[tokio::test]
    async fn routes_under_root_url() {
        let (records, force) = records_with(vec![StaticProvider::new("www")]);
        let mut server = HttpService::new("server", "127.0.0.1:0", router("/ddns/", records, force));
        server.start().await.unwrap();
        let base = format!("http://{}/ddns", server.local_addr().unwrap());

        let views: Vec<serde_json::Value> = reqwest::get(format!("{base}/api/records"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0]["owner"], "www");
        assert_eq!(views[0]["status"], "unset");

        let overview: serde_json::Value = reqwest::get(format!("{base}/api/json"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert!(overview["last_success_ip"].is_null());

        // The engine is not running: forcing an update is cancelled
        let response = reqwest::get(format!("{base}/update")).await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.text().await.unwrap(), "operation cancelled");

        server.stop().await.unwrap();
    }
}
