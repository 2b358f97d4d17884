//! PostgREST backend over blocking HTTP
//!
//! Every table lives under `<url>/rest/v1/<table>`. Filters use the
//! PostgREST query dialect (`eq.`, `gt.`, `ilike.`). Updates ask for
//! `Prefer: return=representation` so the number of affected rows can be
//! read from the returned array; an update that matches nothing is how a
//! row-level policy silently drops a write.

use super::{CommandQueue, HeartbeatSink, RemoteCommand};
use crate::config::BackendConfig;
use crate::error::{Error, Result};
use crate::presence::{PlaySession, PlaySessionSink, StatusSink, TagStatus};
use chrono::{DateTime, SecondsFormat};
use serde_json::{Map, Value, json};
use std::time::Duration;
use ureq::ErrorKind;

const PENDING: &str = "PENDING";

pub struct RestBackend {
    agent: ureq::Agent,
    config: BackendConfig,
}

impl RestBackend {
    pub fn new(config: &BackendConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_millis(config.connect_timeout_ms))
            .timeout_read(Duration::from_millis(config.read_timeout_ms))
            .timeout_write(Duration::from_millis(config.read_timeout_ms))
            .build();
        Self {
            agent,
            config: config.clone(),
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.config.url.trim_end_matches('/'), table)
    }

    fn bearer(&self) -> &str {
        if self.config.device_jwt.is_empty() {
            &self.config.anon_key
        } else {
            &self.config.device_jwt
        }
    }

    fn request(&self, method: &str, url: &str) -> ureq::Request {
        self.agent
            .request(method, url)
            .set("apikey", &self.config.anon_key)
            .set("Authorization", &format!("Bearer {}", self.bearer()))
            .set("Content-Type", "application/json")
    }

    fn commands_request(&self, method: &str) -> ureq::Request {
        self.request(method, &self.table_url(&self.config.commands_table))
    }

    fn fetch_rows(&self, request: ureq::Request, what: &str) -> Result<Vec<Value>> {
        let url = request.url().to_string();
        log::debug!("GET {}", url);
        let response = request
            .call()
            .map_err(|err| format_http_error(what, &url, err))?;
        read_rows(response, what)
    }

    /// PATCH with a JSON body, returns the number of rows changed
    fn patch_rows(&self, request: ureq::Request, body: &Value, what: &str) -> Result<usize> {
        let url = request.url().to_string();
        log::debug!("PATCH {} {}", url, body);
        let response = request
            .set("Prefer", "return=representation")
            .send_string(&body.to_string())
            .map_err(|err| format_http_error(what, &url, err))?;
        Ok(read_rows(response, what)?.len())
    }

    fn post_row(&self, table: &str, body: &Value, what: &str) -> Result<()> {
        let url = self.table_url(table);
        log::debug!("POST {} {}", url, body);
        self.request("POST", &url)
            .set("Prefer", "return=minimal")
            .send_string(&body.to_string())
            .map_err(|err| format_http_error(what, &url, err))?;
        Ok(())
    }

    fn patch_tag_status(&self, filter: &str, body: &Value) -> Result<usize> {
        let request = self
            .request("PATCH", &self.table_url(&self.config.tags_table))
            .query(&self.config.tag_epc_column, filter);
        self.patch_rows(request, body, "status update failed")
    }
}

impl CommandQueue for RestBackend {
    fn latest_command_id(&mut self) -> Result<Option<i64>> {
        let request = self
            .commands_request("GET")
            .query("device_id", &format!("eq.{}", self.config.device_id))
            .query("select", "id")
            .query("order", "id.desc")
            .query("limit", "1");
        let rows = self.fetch_rows(request, "latest command query failed")?;
        Ok(rows.first().and_then(|row| row.get("id")).and_then(Value::as_i64))
    }

    fn pending_after(&mut self, after: i64, limit: u32) -> Result<Vec<RemoteCommand>> {
        let cfg = &self.config;
        let request = self
            .commands_request("GET")
            .query("device_id", &format!("eq.{}", cfg.device_id))
            .query(&cfg.command_status_column, &format!("eq.{}", PENDING))
            .query("id", &format!("gt.{}", after))
            .query("select", &format!("id,{}", cfg.command_text_column))
            .query("order", "id.asc")
            .query("limit", &limit.to_string());
        let rows = self.fetch_rows(request, "pending command query failed")?;
        Ok(parse_commands(&rows, &cfg.command_text_column))
    }

    fn mark_result(&mut self, id: i64, result: &str, debug: &str) -> Result<usize> {
        let mut body = Map::new();
        body.insert(self.config.command_status_column.clone(), json!(result));
        body.insert(self.config.command_text_column.clone(), json!(debug));
        let request = self
            .commands_request("PATCH")
            .query("id", &format!("eq.{}", id));
        self.patch_rows(request, &Value::Object(body), "result update failed")
    }

    fn mark_skipped(&mut self, id: i64, reason: &str) -> Result<usize> {
        let mut body = Map::new();
        body.insert(self.config.command_status_column.clone(), json!(reason));
        let request = self
            .commands_request("PATCH")
            .query("id", &format!("eq.{}", id));
        self.patch_rows(request, &Value::Object(body), "skip update failed")
    }

    fn insert_result(&mut self, reference_id: i64, result: &str, debug: &str) -> Result<()> {
        let cfg = &self.config;
        let mut body = Map::new();
        body.insert("device_id".to_string(), json!(cfg.device_id));
        body.insert(cfg.command_status_column.clone(), json!(result));
        body.insert(cfg.command_text_column.clone(), json!(debug));
        body.insert(cfg.command_reference_column.clone(), json!(reference_id));
        self.post_row(&cfg.commands_table, &Value::Object(body), "result insert failed")
    }
}

impl StatusSink for RestBackend {
    fn set_status(&mut self, epc: &str, status: TagStatus) -> Result<()> {
        let body = json!({ "status": status.as_str() });
        if self.patch_tag_status(&format!("eq.{}", epc), &body)? > 0 {
            return Ok(());
        }
        log::debug!("No exact match for {}, retrying case-insensitive", epc);
        if self.patch_tag_status(&format!("ilike.{}", epc), &body)? > 0 {
            return Ok(());
        }
        Err(Error::Remote(format!("no tag row matches EPC {}", epc)))
    }
}

impl PlaySessionSink for RestBackend {
    fn record_play_session(&mut self, session: &PlaySession) -> Result<()> {
        let (Some(start), Some(end)) = (rfc3339(session.started_at), rfc3339(session.ended_at)) else {
            return Err(Error::InvalidParameter(format!(
                "play session timestamps out of range: {}..{}",
                session.started_at, session.ended_at
            )));
        };
        let mut body = Map::new();
        body.insert(self.config.tag_epc_column.clone(), json!(session.epc));
        body.insert("device_id".to_string(), json!(self.config.device_id));
        body.insert("start_time".to_string(), json!(start));
        body.insert("end_time".to_string(), json!(end));
        self.post_row(
            &self.config.sessions_table,
            &Value::Object(body),
            "play session insert failed",
        )
    }
}

impl HeartbeatSink for RestBackend {
    fn heartbeat(&mut self, unix_time: Option<u64>) -> Result<()> {
        let mut body = Map::new();
        body.insert("fw_version".to_string(), json!(self.config.fw_version));
        if let Some(now) = unix_time.and_then(rfc3339) {
            body.insert("last_seen".to_string(), json!(now));
        }
        let request = self
            .request("PATCH", &self.table_url(&self.config.devices_table))
            .query("device_id", &format!("eq.{}", self.config.device_id));
        match self.patch_rows(request, &Value::Object(body), "heartbeat failed")? {
            0 => Err(Error::Remote(format!(
                "no device row for {}",
                self.config.device_id
            ))),
            _ => Ok(()),
        }
    }
}

/// Rows with a numeric id become commands; a missing text column reads as empty
fn parse_commands(rows: &[Value], text_column: &str) -> Vec<RemoteCommand> {
    rows.iter()
        .filter_map(|row| {
            let id = row.get("id").and_then(Value::as_i64)?;
            let text = row
                .get(text_column)
                .and_then(Value::as_str)
                .unwrap_or_default();
            Some(RemoteCommand::new(id, text))
        })
        .collect()
}

/// Unix seconds as `2024-05-01T12:00:00Z`
fn rfc3339(unix_secs: u64) -> Option<String> {
    let secs = i64::try_from(unix_secs).ok()?;
    DateTime::from_timestamp(secs, 0).map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
}

fn read_rows(response: ureq::Response, what: &str) -> Result<Vec<Value>> {
    let body = response.into_string()?;
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }
    match serde_json::from_str::<Value>(&body)? {
        Value::Array(rows) => Ok(rows),
        other => Err(Error::Remote(format!(
            "{}: expected a JSON array, got {}",
            what, other
        ))),
    }
}

fn format_http_error(prefix: &str, url: &str, err: ureq::Error) -> Error {
    match err {
        ureq::Error::Status(code, response) => {
            let detail = response.into_string().unwrap_or_default();
            Error::Remote(format!("{}: http status {} from {} {}", prefix, code, url, detail.trim()))
        }
        ureq::Error::Transport(transport) => {
            let category = match transport.kind() {
                ErrorKind::ConnectionFailed => "connection refused or host unavailable",
                ErrorKind::Dns => "dns lookup failed",
                ErrorKind::Io => "network i/o error",
                ErrorKind::InvalidUrl => "invalid backend url",
                ErrorKind::UnknownScheme => "unsupported url scheme",
                _ => "transport error",
            };
            match transport.message() {
                Some(message) => Error::Remote(format!("{}: {} ({})", prefix, category, message)),
                None => Error::Remote(format!("{}: {}", prefix, category)),
            }
        }
    }
}
