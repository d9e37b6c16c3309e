//! JSON rendering for reports

use crate::models::ProcessRecord;
use crate::report::Report;
use serde::Serialize;
use serde_json::Value;

/// Render the report as a JSON value
pub fn render_json(report: &Report) -> serde_json::Result<Value> {
    serde_json::to_value(report)
}

/// Render the report as a pretty-printed JSON string
pub fn render_json_string(report: &Report) -> serde_json::Result<String> {
    serde_json::to_string_pretty(report)
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct EnvView<'a> {
    command: &'a str,
    env: &'a [String],
}

/// `{"Command": ..., "Env": [...]}` for the env-only view
pub fn render_env_json(record: &ProcessRecord) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&EnvView {
        command: &record.cmdline,
        env: &record.environment,
    })
}
