use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use log::{debug, error, info};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;

use super::{
    CreatedIssue, EditableFieldSet, FieldInfo, IssueInfo, IssueTracker, RemoteIssue, Transition,
};
use crate::error::JiraError;
use crate::model::field::FieldSet;

const PAGE_SIZE: usize = 100;
const SEARCH_FIELDS: &str =
    "summary,status,project,issuetype,parent,priority,timeoriginalestimate,timespent";

pub struct JiraProvider {
    base_url: String,
    auth_header: String,
    client: reqwest::Client,
}

impl JiraProvider {
    pub fn new(base_url: String, email: String, api_token: String) -> Self {
        let creds = format!("{email}:{api_token}");
        let encoded = base64::engine::general_purpose::STANDARD.encode(creds);
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_header: format!("Basic {encoded}"),
            client: reqwest::Client::new(),
        }
    }

    fn api(&self, path: &str) -> String {
        format!("{}/rest/api/3/{}", self.base_url, path)
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("Authorization", &self.auth_header)
            .header("Accept", "application/json")
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        debug!("GET {url}");
        let resp = self
            .request(reqwest::Method::GET, url)
            .send()
            .await
            .with_context(|| format!("Jira request failed: GET {url}"))?;
        let resp = check(resp).await?;
        resp.json()
            .await
            .with_context(|| format!("Failed to parse Jira response from {url}"))
    }

    async fn send_json(&self, method: reqwest::Method, url: &str, body: &Value) -> Result<String> {
        debug!("{method} {url} payload: {body}");
        let resp = self
            .request(method.clone(), url)
            .json(body)
            .send()
            .await
            .with_context(|| format!("Jira request failed: {method} {url}"))?;
        let resp = check(resp).await?;
        let text = resp.text().await.unwrap_or_default();
        debug!("{method} {url} response: {text}");
        Ok(text)
    }

    fn search_url(
        &self,
        jql: &str,
        fields: &str,
        max_results: usize,
        page_token: Option<&str>,
    ) -> String {
        let mut url = self.api(&format!(
            "search/jql?jql={}&maxResults={max_results}&fields={}",
            urlencoding::encode(jql),
            urlencoding::encode(fields)
        ));
        if let Some(token) = page_token {
            url.push_str(&format!("&nextPageToken={}", urlencoding::encode(token)));
        }
        url
    }

    async fn search_page(
        &self,
        jql: &str,
        fields: &str,
        max_results: usize,
        page_token: Option<&str>,
    ) -> Result<SearchResponse> {
        let url = self.search_url(jql, fields, max_results, page_token);
        self.get_json(&url).await
    }
}

async fn check(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    error!("Jira API error: {} {}", status.as_u16(), body);
    Err(JiraError {
        status: status.as_u16(),
        body,
    }
    .into())
}

#[derive(Deserialize)]
struct CreateResponse {
    id: String,
    key: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    #[serde(default)]
    issues: Vec<JiraIssue>,
    next_page_token: Option<String>,
    #[serde(default)]
    is_last: bool,
}

#[derive(Deserialize)]
struct JiraIssue {
    key: String,
    fields: IssueFields,
}

#[derive(Deserialize)]
struct IssueFields {
    summary: Option<String>,
    status: Option<NamedRef>,
    project: Option<KeyRef>,
    issuetype: Option<NamedRef>,
    parent: Option<KeyRef>,
    priority: Option<NamedRef>,
    timeoriginalestimate: Option<u64>,
    timespent: Option<u64>,
    #[serde(flatten)]
    rest: HashMap<String, Value>,
}

#[derive(Deserialize)]
struct NamedRef {
    name: String,
}

#[derive(Deserialize)]
struct KeyRef {
    key: String,
}

impl From<JiraIssue> for IssueInfo {
    fn from(issue: JiraIssue) -> Self {
        IssueInfo {
            key: issue.key,
            summary: issue.fields.summary.unwrap_or_default(),
            status: issue.fields.status.map(|s| s.name),
        }
    }
}

fn remote_issue(issue: JiraIssue, extra_fields: &[String]) -> RemoteIssue {
    let mut fields = issue.fields;
    let extra = extra_fields
        .iter()
        .filter_map(|id| {
            fields
                .rest
                .remove(id)
                .filter(|v| !v.is_null())
                .map(|v| (id.clone(), v))
        })
        .collect();
    RemoteIssue {
        key: issue.key,
        project: fields.project.map(|p| p.key).unwrap_or_default(),
        summary: fields.summary.unwrap_or_default(),
        issue_type: fields.issuetype.map(|t| t.name).unwrap_or_default(),
        status: fields.status.map(|s| s.name),
        parent: fields.parent.map(|p| p.key),
        priority: fields.priority.map(|p| p.name),
        original_estimate: fields.timeoriginalestimate,
        time_spent: fields.timespent,
        extra,
    }
}

#[derive(Deserialize)]
struct EditMeta {
    #[serde(default)]
    fields: HashMap<String, EditMetaField>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EditMetaField {
    #[serde(default)]
    allowed_values: Vec<AllowedValue>,
}

#[derive(Deserialize)]
struct AllowedValue {
    name: Option<String>,
    value: Option<String>,
}

#[derive(Deserialize)]
struct TransitionsResponse {
    #[serde(default)]
    transitions: Vec<JiraTransition>,
}

#[derive(Deserialize)]
struct JiraTransition {
    id: String,
    name: String,
    to: Option<TransitionTarget>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransitionTarget {
    name: String,
    status_category: Option<StatusCategory>,
}

#[derive(Deserialize)]
struct StatusCategory {
    key: String,
}

#[derive(Deserialize)]
struct JiraField {
    id: String,
    name: String,
    #[serde(default)]
    custom: bool,
    schema: Option<FieldSchema>,
}

#[derive(Deserialize)]
struct FieldSchema {
    #[serde(rename = "type")]
    kind: Option<String>,
}

/// JQL string literal: quotes and backslashes escaped.
fn jql_quote(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

#[async_trait]
impl IssueTracker for JiraProvider {
    async fn create_issue(&self, fields: &FieldSet) -> Result<CreatedIssue> {
        let text = self
            .send_json(reqwest::Method::POST, &self.api("issue"), &fields.to_payload())
            .await?;
        let created: CreateResponse =
            serde_json::from_str(&text).context("Failed to parse Jira create response")?;
        debug!("Created issue {} (id {})", created.key, created.id);
        Ok(CreatedIssue {
            id: created.id,
            key: created.key,
        })
    }

    async fn get_issue(&self, key: &str) -> Result<Option<IssueInfo>> {
        let url = self.api(&format!(
            "issue/{}?fields=summary,status",
            urlencoding::encode(key)
        ));
        match self.get_json::<JiraIssue>(&url).await {
            Ok(issue) => Ok(Some(issue.into())),
            Err(e) => match e.downcast_ref::<JiraError>() {
                Some(api) if api.status == 404 => Ok(None),
                _ => Err(e),
            },
        }
    }

    async fn find_issue_by_summary(
        &self,
        project: &str,
        summary: &str,
    ) -> Result<Option<IssueInfo>> {
        let jql = format!(
            "project = {} AND summary ~ {}",
            jql_quote(project),
            jql_quote(summary)
        );
        let search = self.search_page(&jql, "summary,status", 50, None).await?;
        // `~` is a fuzzy text match, so keep only exact summaries.
        let found = search
            .issues
            .into_iter()
            .map(IssueInfo::from)
            .find(|issue| issue.summary.trim().eq_ignore_ascii_case(summary.trim()));
        Ok(found)
    }

    async fn search_issues(&self, jql: &str, extra_fields: &[String]) -> Result<Vec<RemoteIssue>> {
        let mut fields = SEARCH_FIELDS.to_string();
        for id in extra_fields {
            fields.push(',');
            fields.push_str(id);
        }

        let mut issues = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let page = self
                .search_page(jql, &fields, PAGE_SIZE, token.as_deref())
                .await?;
            let count = page.issues.len();
            issues.extend(page.issues.into_iter().map(|i| remote_issue(i, extra_fields)));
            info!("Fetched {} issue(s)", issues.len());
            match page.next_page_token {
                Some(next) if !page.is_last && count > 0 => token = Some(next),
                _ => break,
            }
        }
        Ok(issues)
    }

    async fn editable_fields(&self, key: &str) -> Result<EditableFieldSet> {
        let url = self.api(&format!("issue/{}/editmeta", urlencoding::encode(key)));
        let meta: EditMeta = self.get_json(&url).await?;
        let mut set = EditableFieldSet::default();
        for (id, field) in meta.fields {
            let allowed = field
                .allowed_values
                .into_iter()
                .filter_map(|v| v.name.or(v.value))
                .collect();
            set.insert(id, allowed);
        }
        debug!(
            "Editable fields for {key}: {:?}",
            set.ids().collect::<Vec<_>>()
        );
        Ok(set)
    }

    async fn update_fields(&self, key: &str, fields: &FieldSet) -> Result<()> {
        let url = self.api(&format!("issue/{}", urlencoding::encode(key)));
        debug!("Updating {key}: {:?}", fields.field_ids().collect::<Vec<_>>());
        self.send_json(reqwest::Method::PUT, &url, &fields.to_payload())
            .await?;
        Ok(())
    }

    async fn transitions(&self, key: &str) -> Result<Vec<Transition>> {
        let url = self.api(&format!("issue/{}/transitions", urlencoding::encode(key)));
        let resp: TransitionsResponse = self.get_json(&url).await?;
        Ok(resp
            .transitions
            .into_iter()
            .map(|t| {
                let (to_status, closing) = match t.to {
                    Some(to) => {
                        let closing = to
                            .status_category
                            .map(|c| c.key.eq_ignore_ascii_case("done"))
                            .unwrap_or(false);
                        (to.name, closing)
                    }
                    None => (String::new(), false),
                };
                Transition {
                    id: t.id,
                    name: t.name,
                    to_status,
                    closing,
                }
            })
            .collect())
    }

    async fn execute_transition(&self, key: &str, transition_id: &str) -> Result<()> {
        let url = self.api(&format!("issue/{}/transitions", urlencoding::encode(key)));
        let body = json!({ "transition": { "id": transition_id } });
        self.send_json(reqwest::Method::POST, &url, &body).await?;
        Ok(())
    }

    async fn resolutions(&self) -> Result<Vec<String>> {
        let all: Vec<NamedRef> = self.get_json(&self.api("resolution")).await?;
        Ok(all.into_iter().map(|r| r.name).collect())
    }

    async fn log_work(&self, key: &str, time_spent: &str) -> Result<()> {
        let url = self.api(&format!("issue/{}/worklog", urlencoding::encode(key)));
        let body = json!({ "timeSpent": time_spent });
        self.send_json(reqwest::Method::POST, &url, &body).await?;
        info!("Logged {time_spent} on {key}");
        Ok(())
    }

    async fn list_fields(&self) -> Result<Vec<FieldInfo>> {
        let fields: Vec<JiraField> = self.get_json(&self.api("field")).await?;
        Ok(fields
            .into_iter()
            .map(|f| FieldInfo {
                id: f.id,
                name: f.name,
                custom: f.custom,
                schema_type: f.schema.and_then(|s| s.kind).unwrap_or_default(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_jql_literals() {
        assert_eq!(jql_quote("Sync"), "\"Sync\"");
        assert_eq!(jql_quote("say \"hi\""), "\"say \\\"hi\\\"\"");
    }

    #[test]
    fn parses_editmeta_allowed_values() {
        let meta: EditMeta = serde_json::from_value(json!({
            "fields": {
                "resolution": {
                    "allowedValues": [{"id": "1", "name": "Done"}, {"id": "2", "name": "Fixed"}]
                },
                "customfield_10255": {"allowedValues": [{"value": "Engineering"}]},
                "customfield_10016": {"required": false}
            }
        }))
        .unwrap();
        assert_eq!(meta.fields.len(), 3);
        assert_eq!(meta.fields["resolution"].allowed_values.len(), 2);
        assert!(meta.fields["customfield_10016"].allowed_values.is_empty());
    }

    #[test]
    fn maps_search_hits_with_requested_extras() {
        let page: SearchResponse = serde_json::from_value(json!({
            "issues": [{
                "key": "PROJ-7",
                "fields": {
                    "summary": "Write docs",
                    "status": {"name": "In Progress"},
                    "project": {"key": "PROJ", "name": "Project"},
                    "issuetype": {"name": "Sub-task"},
                    "parent": {"key": "PROJ-5"},
                    "priority": {"name": "High"},
                    "timeoriginalestimate": 5400,
                    "timespent": null,
                    "customfield_10016": 3.0,
                    "customfield_10008": null,
                    "labels": ["x"]
                }
            }],
            "nextPageToken": "abc"
        }))
        .unwrap();
        assert_eq!(page.next_page_token.as_deref(), Some("abc"));
        assert!(!page.is_last);

        let extra = vec!["customfield_10016".to_string(), "customfield_10008".to_string()];
        let issue = remote_issue(page.issues.into_iter().next().unwrap(), &extra);
        assert_eq!(issue.key, "PROJ-7");
        assert_eq!(issue.project, "PROJ");
        assert_eq!(issue.issue_type, "Sub-task");
        assert_eq!(issue.parent.as_deref(), Some("PROJ-5"));
        assert_eq!(issue.priority.as_deref(), Some("High"));
        assert_eq!(issue.original_estimate, Some(5400));
        assert_eq!(issue.time_spent, None);
        assert_eq!(issue.extra.len(), 1);
        assert_eq!(issue.extra["customfield_10016"], json!(3.0));
    }

    #[test]
    fn search_uses_jql_endpoint_with_page_token() {
        let jira = JiraProvider::new(
            "https://acme.atlassian.net/".into(),
            "me@acme.test".into(),
            "token".into(),
        );
        assert_eq!(
            jira.search_url("project = PROJ", "summary,status", 100, None),
            "https://acme.atlassian.net/rest/api/3/search/jql?jql=project%20%3D%20PROJ&maxResults=100&fields=summary%2Cstatus"
        );
        assert!(jira
            .search_url("project = PROJ", "summary", 100, Some("a/b"))
            .ends_with("&nextPageToken=a%2Fb"));
    }

    #[test]
    fn last_search_page_has_no_token() {
        let page: SearchResponse =
            serde_json::from_value(json!({"issues": [], "isLast": true})).unwrap();
        assert!(page.is_last);
        assert!(page.next_page_token.is_none());
    }

    #[test]
    fn parses_field_catalogue() {
        let fields: Vec<JiraField> = serde_json::from_value(json!([
            {"id": "summary", "name": "Summary", "custom": false, "schema": {"type": "string"}},
            {"id": "customfield_10016", "name": "Story Points", "custom": true},
            {"id": "issuekey", "name": "Key"}
        ]))
        .unwrap();
        assert_eq!(fields.len(), 3);
        assert_eq!(fields[0].schema.as_ref().and_then(|s| s.kind.as_deref()), Some("string"));
        assert!(fields[1].custom && fields[1].schema.is_none());
        assert!(!fields[2].custom);
    }

    #[test]
    fn transition_target_category_marks_closing() {
        let resp: TransitionsResponse = serde_json::from_value(json!({
            "transitions": [
                {"id": "31", "name": "Done", "to": {"name": "Done", "statusCategory": {"key": "done"}}},
                {"id": "11", "name": "Start", "to": {"name": "In Progress", "statusCategory": {"key": "indeterminate"}}}
            ]
        }))
        .unwrap();
        let keys: Vec<String> = resp
            .transitions
            .iter()
            .filter_map(|t| t.to.as_ref()?.status_category.as_ref().map(|c| c.key.clone()))
            .collect();
        assert_eq!(keys, vec!["done", "indeterminate"]);
    }

    #[test]
    fn base_url_is_normalized() {
        let provider = JiraProvider::new("https://acme.atlassian.net/".into(), "a".into(), "b".into());
        assert_eq!(
            provider.api("issue"),
            "https://acme.atlassian.net/rest/api/3/issue"
        );
        assert!(provider.auth_header.starts_with("Basic "));
    }
}
