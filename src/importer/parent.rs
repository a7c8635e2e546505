use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};

use crate::error::ImportError;
use crate::model::row::{IssueKind, SourceRow};
use crate::providers::IssueTracker;

static ISSUE_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?i)[a-z][a-z0-9_]*-\d+$").expect("valid issue key pattern"));

pub fn is_issue_key(reference: &str) -> bool {
    ISSUE_KEY.is_match(reference.trim())
}

/// Keys and summaries of parent-capable issues known in the current batch.
#[derive(Debug, Default)]
pub struct ParentIndex {
    keys: HashSet<String>,
    by_summary: HashMap<String, String>,
}

impl ParentIndex {
    /// Seed from rows that were imported by an earlier run.
    pub fn from_rows(rows: &[SourceRow]) -> Self {
        let mut index = Self::default();
        for row in rows.iter().filter(|r| r.is_imported()) {
            index.register(row.kind(), row.created_issue_id.trim(), row.summary());
        }
        index
    }

    /// Sub-tasks cannot be parents, so they are never registered.
    pub fn register(&mut self, kind: IssueKind, key: &str, summary: &str) {
        if kind == IssueKind::SubTask {
            return;
        }
        let key = key.to_uppercase();
        self.by_summary
            .entry(summary.trim().to_lowercase())
            .or_insert_with(|| key.clone());
        self.keys.insert(key);
    }

    /// Resolve the row's parent reference to an issue key.
    ///
    /// Known keys match first. A reference shaped like an issue key is only ever
    /// treated as a key and confirmed remotely; anything else is matched against
    /// batch summaries, then searched for in the row's project.
    pub async fn resolve(
        &self,
        tracker: &dyn IssueTracker,
        row: &SourceRow,
    ) -> Result<String, ImportError> {
        let reference = row.parent_ref().unwrap_or_default();
        let not_found = || ImportError::ParentNotFound {
            parent: reference.to_string(),
        };
        if reference.is_empty() {
            return Err(not_found());
        }

        let upper = reference.to_uppercase();
        if self.keys.contains(&upper) {
            return Ok(upper);
        }

        if is_issue_key(reference) {
            return match tracker.get_issue(&upper).await {
                Ok(Some(issue)) => {
                    debug!("Found existing Jira parent {} for '{}'", issue.key, row.summary());
                    Ok(issue.key)
                }
                Ok(None) => Err(not_found()),
                Err(e) => {
                    warn!("Looking up parent {upper} failed: {e:#}");
                    Err(not_found())
                }
            };
        }

        if let Some(key) = self.by_summary.get(&reference.to_lowercase()) {
            return Ok(key.clone());
        }

        match tracker.find_issue_by_summary(row.project(), reference).await {
            Ok(Some(issue)) => {
                debug!("Found existing Jira parent {} for '{}'", issue.key, row.summary());
                Ok(issue.key)
            }
            Ok(None) => Err(not_found()),
            Err(e) => {
                warn!("Searching for parent '{reference}' failed: {e:#}");
                Err(not_found())
            }
        }
    }
}
