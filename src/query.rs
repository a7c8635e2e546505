use anyhow::{bail, Result};
use log::{debug, info};
use serde_json::Value;

use crate::config::FieldsConfig;
use crate::model::row::SourceRow;
use crate::providers::{IssueTracker, RemoteIssue, Transition};

pub const MY_ISSUES_JQL: &str =
    "assignee = currentUser() OR reporter = currentUser() ORDER BY updated DESC";

/// Every issue matching `jql` as a row of the import CSV, with its key in `Created Issue ID`.
/// The output feeds straight back into `transition` and `update`.
pub async fn export_rows(
    tracker: &dyn IssueTracker,
    jql: &str,
    fields: &FieldsConfig,
) -> Result<Vec<SourceRow>> {
    let mut extra = fields.story_points.clone();
    for id in &fields.start_date {
        if !extra.contains(id) {
            extra.push(id.clone());
        }
    }
    let issues = tracker.search_issues(jql, &extra).await?;
    info!("Exporting {} issue(s)", issues.len());
    for issue in &issues {
        debug!(
            "{} [{}] {}",
            issue.key,
            issue.status.as_deref().unwrap_or("?"),
            issue.summary
        );
    }
    Ok(issues.iter().map(|issue| to_row(issue, fields)).collect())
}

fn to_row(issue: &RemoteIssue, fields: &FieldsConfig) -> SourceRow {
    SourceRow {
        project: issue.project.clone(),
        summary: issue.summary.clone(),
        issue_type: issue.issue_type.clone(),
        parent: issue.parent.clone().unwrap_or_default(),
        start_date: first_value(issue, &fields.start_date),
        story_points: first_value(issue, &fields.story_points),
        original_estimate: issue.original_estimate.map(format_seconds).unwrap_or_default(),
        time_spent: issue.time_spent.map(format_seconds).unwrap_or_default(),
        priority: issue.priority.clone().unwrap_or_default(),
        created_issue_id: issue.key.clone(),
    }
}

fn first_value(issue: &RemoteIssue, ids: &[String]) -> String {
    ids.iter()
        .find_map(|id| issue.extra.get(id))
        .map(cell_text)
        .unwrap_or_default()
}

/// Option objects show their name, key or value; lists are comma-joined.
fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => (f as i64).to_string(),
            _ => n.to_string(),
        },
        Value::Array(items) => items.iter().map(cell_text).collect::<Vec<_>>().join(", "),
        Value::Object(map) => ["name", "key", "value", "summary"]
            .iter()
            .find_map(|k| map.get(*k))
            .map(cell_text)
            .unwrap_or_else(|| value.to_string()),
        Value::Bool(b) => b.to_string(),
    }
}

/// Seconds as a Jira duration (`1h 30m`). Zero is empty, anything under a minute rounds up.
pub fn format_seconds(seconds: u64) -> String {
    if seconds == 0 {
        return String::new();
    }
    match (seconds / 3600, seconds % 3600 / 60) {
        (0, 0) => "1m".to_string(),
        (h, 0) => format!("{h}h"),
        (0, m) => format!("{m}m"),
        (h, m) => format!("{h}h {m}m"),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransitionListing {
    pub key: String,
    pub status: Option<String>,
    pub transitions: Vec<Transition>,
}

impl TransitionListing {
    pub fn lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!("Issue: {}", self.key),
            format!(
                "Current status: {}",
                self.status.as_deref().unwrap_or("Unknown")
            ),
        ];
        if self.transitions.is_empty() {
            lines.push("No transitions available".to_string());
        }
        for (i, t) in self.transitions.iter().enumerate() {
            let to = if t.to_status.is_empty() {
                "Unknown"
            } else {
                t.to_status.as_str()
            };
            let done = if t.closing { "  (done)" } else { "" };
            lines.push(format!("  {}. {} -> {to}{done}", i + 1, t.name));
        }
        lines
    }
}

pub async fn list_transitions(tracker: &dyn IssueTracker, key: &str) -> Result<TransitionListing> {
    let key = key.trim().to_uppercase();
    let Some(issue) = tracker.get_issue(&key).await? else {
        bail!("Issue {key} not found");
    };
    let transitions = tracker.transitions(&issue.key).await?;
    Ok(TransitionListing {
        key: issue.key,
        status: issue.status,
        transitions,
    })
}
