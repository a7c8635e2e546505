use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;

use super::{
    CreatedIssue, EditableFieldSet, FieldInfo, IssueInfo, IssueTracker, RemoteIssue, Transition,
};
use crate::error::JiraError;
use crate::model::field::FieldSet;

/// Every remote call the mock received, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Create(FieldSet),
    GetIssue(String),
    FindBySummary(String, String),
    Search(String, Vec<String>),
    EditableFields(String),
    Update(String, FieldSet),
    Transitions(String),
    Transition(String, String),
    Resolutions,
    LogWork(String, String),
    ListFields,
}

#[derive(Default)]
struct MockState {
    next_number: u32,
    issues: HashMap<String, IssueInfo>,
    editable: Vec<String>,
    resolution_values: Vec<String>,
    global_resolutions: Vec<String>,
    transitions: Vec<Transition>,
    search_results: Vec<RemoteIssue>,
    failing_creates: HashSet<String>,
    failing_updates: HashSet<String>,
    calls: Vec<Call>,
}

/// In-memory stand-in for Jira that records calls and can be told to fail.
pub struct MockTracker {
    state: Mutex<MockState>,
}

pub fn transition(id: &str, name: &str, to: &str, closing: bool) -> Transition {
    Transition {
        id: id.into(),
        name: name.into(),
        to_status: to.into(),
        closing,
    }
}

impl MockTracker {
    pub fn new() -> Self {
        let state = MockState {
            next_number: 100,
            transitions: vec![
                transition("11", "Start Progress", "In Progress", false),
                transition("31", "Done", "Done", true),
            ],
            ..Default::default()
        };
        Self {
            state: Mutex::new(state),
        }
    }

    pub fn with_editable(self, ids: &[&str]) -> Self {
        self.state.lock().unwrap().editable = ids.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Makes `resolution` editable with these allowed values.
    pub fn with_resolution_values(self, names: &[&str]) -> Self {
        self.state.lock().unwrap().resolution_values =
            names.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_global_resolutions(self, names: &[&str]) -> Self {
        self.state.lock().unwrap().global_resolutions =
            names.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_transitions(self, transitions: Vec<Transition>) -> Self {
        self.state.lock().unwrap().transitions = transitions;
        self
    }

    pub fn with_search_results(self, issues: Vec<RemoteIssue>) -> Self {
        self.state.lock().unwrap().search_results = issues;
        self
    }

    pub fn with_existing(self, key: &str, summary: &str, status: &str) -> Self {
        self.state.lock().unwrap().issues.insert(
            key.to_string(),
            IssueInfo {
                key: key.into(),
                summary: summary.into(),
                status: Some(status.into()),
            },
        );
        self
    }

    pub fn failing_create(self, summary: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .failing_creates
            .insert(summary.to_string());
        self
    }

    pub fn failing_update(self, field_id: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .failing_updates
            .insert(field_id.to_string());
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn created_payloads(&self) -> Vec<FieldSet> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Create(fields) => Some(fields),
                _ => None,
            })
            .collect()
    }

    /// Field ids written to `key` after creation, in call order.
    pub fn updated_fields(&self, key: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Update(k, fields) if k == key => {
                    Some(fields.field_ids().map(String::from).collect::<Vec<_>>())
                }
                _ => None,
            })
            .flatten()
            .collect()
    }

    pub fn update_value(&self, key: &str, field_id: &str) -> Option<serde_json::Value> {
        self.calls().into_iter().rev().find_map(|c| match c {
            Call::Update(k, fields) if k == key => fields.get(field_id).cloned(),
            _ => None,
        })
    }

    pub fn status_of(&self, key: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .issues
            .get(key)
            .and_then(|i| i.status.clone())
    }

    fn record(&self, call: Call) {
        self.state.lock().unwrap().calls.push(call);
    }
}

fn rejected(body: &str) -> anyhow::Error {
    JiraError {
        status: 400,
        body: body.to_string(),
    }
    .into()
}

#[async_trait]
impl IssueTracker for MockTracker {
    async fn create_issue(&self, fields: &FieldSet) -> Result<CreatedIssue> {
        self.record(Call::Create(fields.clone()));
        let summary = fields
            .get("summary")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let project = fields
            .get("project")
            .and_then(|v| v.get("key"))
            .and_then(|v| v.as_str())
            .unwrap_or("MOCK")
            .to_string();
        let mut state = self.state.lock().unwrap();
        if state.failing_creates.contains(&summary) {
            return Err(rejected("summary rejected"));
        }
        state.next_number += 1;
        let key = format!("{project}-{}", state.next_number);
        state.issues.insert(
            key.clone(),
            IssueInfo {
                key: key.clone(),
                summary,
                status: Some("To Do".into()),
            },
        );
        Ok(CreatedIssue {
            id: state.next_number.to_string(),
            key,
        })
    }

    async fn get_issue(&self, key: &str) -> Result<Option<IssueInfo>> {
        self.record(Call::GetIssue(key.to_string()));
        Ok(self.state.lock().unwrap().issues.get(key).cloned())
    }

    async fn find_issue_by_summary(
        &self,
        project: &str,
        summary: &str,
    ) -> Result<Option<IssueInfo>> {
        self.record(Call::FindBySummary(project.to_string(), summary.to_string()));
        let state = self.state.lock().unwrap();
        Ok(state
            .issues
            .values()
            .find(|i| {
                i.key.starts_with(&format!("{project}-"))
                    && i.summary.eq_ignore_ascii_case(summary)
            })
            .cloned())
    }

    async fn search_issues(&self, jql: &str, extra_fields: &[String]) -> Result<Vec<RemoteIssue>> {
        self.record(Call::Search(jql.to_string(), extra_fields.to_vec()));
        Ok(self.state.lock().unwrap().search_results.clone())
    }

    async fn editable_fields(&self, key: &str) -> Result<EditableFieldSet> {
        self.record(Call::EditableFields(key.to_string()));
        let state = self.state.lock().unwrap();
        let mut set: EditableFieldSet = state.editable.iter().cloned().collect();
        if !state.resolution_values.is_empty() {
            set.insert("resolution", state.resolution_values.clone());
        }
        Ok(set)
    }

    async fn update_fields(&self, key: &str, fields: &FieldSet) -> Result<()> {
        self.record(Call::Update(key.to_string(), fields.clone()));
        let state = self.state.lock().unwrap();
        if fields.field_ids().any(|id| state.failing_updates.contains(id)) {
            return Err(rejected("field cannot be set"));
        }
        Ok(())
    }

    async fn transitions(&self, key: &str) -> Result<Vec<Transition>> {
        self.record(Call::Transitions(key.to_string()));
        Ok(self.state.lock().unwrap().transitions.clone())
    }

    async fn execute_transition(&self, key: &str, transition_id: &str) -> Result<()> {
        self.record(Call::Transition(key.to_string(), transition_id.to_string()));
        let mut state = self.state.lock().unwrap();
        let to = state
            .transitions
            .iter()
            .find(|t| t.id == transition_id)
            .map(|t| t.to_status.clone());
        match (to, state.issues.get_mut(key)) {
            (Some(to), Some(issue)) => {
                issue.status = Some(to);
                Ok(())
            }
            _ => Err(rejected("invalid transition")),
        }
    }

    async fn resolutions(&self) -> Result<Vec<String>> {
        self.record(Call::Resolutions);
        Ok(self.state.lock().unwrap().global_resolutions.clone())
    }

    async fn log_work(&self, key: &str, time_spent: &str) -> Result<()> {
        self.record(Call::LogWork(key.to_string(), time_spent.to_string()));
        Ok(())
    }

    async fn list_fields(&self) -> Result<Vec<FieldInfo>> {
        self.record(Call::ListFields);
        Ok(vec![FieldInfo {
            id: "customfield_10016".into(),
            name: "Story Points".into(),
            custom: true,
            schema_type: "number".into(),
        }])
    }
}

#[tokio::test]
async fn mock_assigns_sequential_keys_per_project() {
    use crate::model::field::{FieldValue, RefAttr};

    let tracker = MockTracker::new();
    let mut fields = FieldSet::new();
    fields.set("project", &FieldValue::OptionRef(RefAttr::Key, "PROJ".into()));
    fields.set("summary", &FieldValue::text("First"));

    let first = tracker.create_issue(&fields).await.unwrap();
    let second = tracker.create_issue(&fields).await.unwrap();
    assert_eq!(first.key, "PROJ-101");
    assert_eq!(second.key, "PROJ-102");
    assert_eq!(tracker.status_of("PROJ-101").as_deref(), Some("To Do"));
}

#[tokio::test]
async fn default_set_resolution_writes_named_reference() {
    let tracker = MockTracker::new();
    tracker.set_resolution("PROJ-1", "Done").await.unwrap();
    assert_eq!(
        tracker.update_value("PROJ-1", "resolution"),
        Some(serde_json::json!({"name": "Done"}))
    );
}

#[tokio::test]
async fn failing_update_propagates_api_error() {
    use crate::model::field::FieldValue;

    let tracker = MockTracker::new().failing_update("customfield_1");
    let err = tracker
        .update_fields("PROJ-1", &FieldSet::single("customfield_1", &FieldValue::text("x")))
        .await
        .unwrap_err();
    assert!(err.downcast_ref::<JiraError>().is_some());
    assert!(err.to_string().contains("400"));
}

#[tokio::test]
async fn missing_issue_is_none() {
    let tracker = MockTracker::new().with_existing("PROJ-5", "Parent", "To Do");
    assert!(tracker.get_issue("PROJ-6").await.unwrap().is_none());
    assert_eq!(
        tracker.get_issue("PROJ-5").await.unwrap().unwrap().summary,
        "Parent"
    );
}
