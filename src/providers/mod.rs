pub mod jira;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::model::field::{FieldSet, FieldValue, RefAttr};

#[derive(Debug, Clone, PartialEq)]
pub struct CreatedIssue {
    pub id: String,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IssueInfo {
    pub key: String,
    pub summary: String,
    pub status: Option<String>,
}

/// A JQL search hit with the fields a CSV export needs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteIssue {
    pub key: String,
    pub project: String,
    pub summary: String,
    pub issue_type: String,
    pub status: Option<String>,
    pub parent: Option<String>,
    pub priority: Option<String>,
    /// Seconds.
    pub original_estimate: Option<u64>,
    /// Seconds.
    pub time_spent: Option<u64>,
    /// Extra fields asked for by id, as Jira returned them. Null values are left out.
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub id: String,
    pub name: String,
    /// Destination status name.
    pub to_status: String,
    /// Destination status sits in Jira's "done" category.
    pub closing: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldInfo {
    #[serde(rename = "Field ID")]
    pub id: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Custom")]
    pub custom: bool,
    #[serde(rename = "Type")]
    pub schema_type: String,
}

/// Field ids an issue currently accepts writes for, with the names of their allowed values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EditableFieldSet {
    fields: BTreeMap<String, Vec<String>>,
}

impl EditableFieldSet {
    pub fn insert(&mut self, field_id: impl Into<String>, allowed: Vec<String>) {
        self.fields.insert(field_id.into(), allowed);
    }

    pub fn contains(&self, field_id: &str) -> bool {
        self.fields.contains_key(field_id)
    }

    pub fn allowed_values(&self, field_id: &str) -> &[String] {
        self.fields.get(field_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for EditableFieldSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = EditableFieldSet::default();
        for id in iter {
            set.insert(id, Vec::new());
        }
        set
    }
}

/// The remote issue-tracking service as the importer sees it.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    async fn create_issue(&self, fields: &FieldSet) -> Result<CreatedIssue>;
    /// `None` when the issue does not exist.
    async fn get_issue(&self, key: &str) -> Result<Option<IssueInfo>>;
    /// Exact, case-insensitive summary match within a project.
    async fn find_issue_by_summary(&self, project: &str, summary: &str)
        -> Result<Option<IssueInfo>>;
    /// Every issue matching `jql`, across all result pages.
    async fn search_issues(&self, jql: &str, extra_fields: &[String]) -> Result<Vec<RemoteIssue>>;
    async fn editable_fields(&self, key: &str) -> Result<EditableFieldSet>;
    async fn update_fields(&self, key: &str, fields: &FieldSet) -> Result<()>;
    async fn transitions(&self, key: &str) -> Result<Vec<Transition>>;
    async fn execute_transition(&self, key: &str, transition_id: &str) -> Result<()>;
    async fn resolutions(&self) -> Result<Vec<String>>;
    async fn set_resolution(&self, key: &str, name: &str) -> Result<()> {
        let value = FieldValue::OptionRef(RefAttr::Name, name.to_string());
        self.update_fields(key, &FieldSet::single("resolution", &value))
            .await
    }
    async fn log_work(&self, key: &str, time_spent: &str) -> Result<()>;
    async fn list_fields(&self) -> Result<Vec<FieldInfo>>;
}

#[cfg(test)]
pub mod tests;
