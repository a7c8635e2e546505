mod fields;
mod parent;
mod settings;
mod transition;

pub use settings::ImportSettings;
pub use transition::Closure;

use log::{info, warn};
use serde::Serialize;

use crate::error::ImportError;
use crate::model::plan::TransitionPlan;
use crate::model::row::SourceRow;
use crate::providers::IssueTracker;
use fields::Pass;
use parent::ParentIndex;

/// A logical field and the Jira field id that accepted it.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedField {
    pub name: &'static str,
    pub field_id: String,
}

#[derive(Debug, Clone)]
pub struct CreatedRow {
    /// Position in the input rows.
    pub index: usize,
    pub key: String,
    pub summary: String,
    pub fields: Vec<AppliedField>,
    pub worklog: bool,
    pub closure: Option<Closure>,
}

#[derive(Debug, Clone)]
pub struct SkippedRow {
    pub index: usize,
    pub summary: String,
    pub reason: String,
}

#[derive(Debug)]
pub struct FailedRow {
    pub index: usize,
    pub summary: String,
    pub error: ImportError,
}

#[derive(Debug, Default)]
pub struct ImportResult {
    pub created: Vec<CreatedRow>,
    pub skipped: Vec<SkippedRow>,
    pub failed: Vec<FailedRow>,
}

impl ImportResult {
    /// Rows that gained an issue key during this run, in input order.
    pub fn new_ledger_rows(&self, rows: &[SourceRow]) -> Vec<SourceRow> {
        let mut indices: Vec<usize> = self.created.iter().map(|c| c.index).collect();
        indices.sort_unstable();
        indices
            .into_iter()
            .filter_map(|i| rows.get(i))
            .filter(|r| r.is_imported())
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct UpdatedRow {
    pub index: usize,
    pub key: String,
    pub fields: Vec<AppliedField>,
}

#[derive(Debug, Default)]
pub struct UpdateResult {
    pub updated: Vec<UpdatedRow>,
    pub skipped: Vec<SkippedRow>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransitionOutcome {
    Transitioned {
        status: String,
        resolution: Option<String>,
    },
    AlreadyInStatus,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct TransitionEntry {
    pub key: String,
    pub summary: String,
    pub issue_type: String,
    pub target: String,
    pub outcome: TransitionOutcome,
}

/// One line of the bulk transition report CSV.
#[derive(Debug, Serialize)]
pub struct TransitionReportRow<'a> {
    #[serde(rename = "Issue Key")]
    pub key: &'a str,
    #[serde(rename = "Summary")]
    pub summary: &'a str,
    #[serde(rename = "Issue Type")]
    pub issue_type: &'a str,
    #[serde(rename = "Target Status")]
    pub target: &'a str,
    #[serde(rename = "Result")]
    pub result: &'static str,
    #[serde(rename = "Message")]
    pub message: String,
}

impl TransitionEntry {
    pub fn report_row(&self) -> TransitionReportRow<'_> {
        let (result, message) = match &self.outcome {
            TransitionOutcome::Transitioned { status, resolution } => (
                "Success",
                match resolution {
                    Some(r) => format!("Transitioned to {status}, resolution {r}"),
                    None => format!("Transitioned to {status}"),
                },
            ),
            TransitionOutcome::AlreadyInStatus => {
                ("Skipped", format!("Already in {} status", self.target))
            }
            TransitionOutcome::Failed(reason) => ("Failed", reason.clone()),
        };
        TransitionReportRow {
            key: &self.key,
            summary: &self.summary,
            issue_type: &self.issue_type,
            target: &self.target,
            result,
            message,
        }
    }
}

/// Reconciles CSV rows against Jira. Creates what is missing, fills in the fields
/// each issue's screens accept, and optionally closes the result.
pub struct Importer<'a> {
    tracker: &'a dyn IssueTracker,
    settings: &'a ImportSettings,
}

impl<'a> Importer<'a> {
    pub fn new(tracker: &'a dyn IssueTracker, settings: &'a ImportSettings) -> Self {
        Self { tracker, settings }
    }

    /// Create an issue for every row without a `Created Issue ID`, writing the new key
    /// back into the row. A failing row never stops the batch.
    pub async fn import(
        &self,
        rows: &mut [SourceRow],
        plan: Option<&TransitionPlan>,
    ) -> ImportResult {
        let mut result = ImportResult::default();
        let mut parents = ParentIndex::from_rows(rows);

        let mut order = Vec::new();
        for (index, row) in rows.iter().enumerate() {
            if row.is_imported() {
                result.skipped.push(SkippedRow {
                    index,
                    summary: row.summary().to_string(),
                    reason: format!("already imported as {}", row.created_issue_id.trim()),
                });
            } else {
                order.push(index);
            }
        }
        // Parents first: epics, then stories and tasks, then sub-tasks.
        order.sort_by_key(|&i| rows[i].kind().rank());

        info!("Importing {} row(s), {} already imported", order.len(), result.skipped.len());
        for index in order {
            match self.import_row(index, &rows[index], &parents, plan).await {
                Ok(created) => {
                    let row = &mut rows[index];
                    row.created_issue_id = created.key.clone();
                    parents.register(row.kind(), &created.key, row.summary());
                    result.created.push(created);
                }
                Err(error) => {
                    warn!("Row {} '{}' failed: {error}", index + 1, rows[index].summary());
                    result.failed.push(FailedRow {
                        index,
                        summary: rows[index].summary().to_string(),
                        error,
                    });
                }
            }
        }
        result
    }

    async fn import_row(
        &self,
        index: usize,
        row: &SourceRow,
        parents: &ParentIndex,
        plan: Option<&TransitionPlan>,
    ) -> Result<CreatedRow, ImportError> {
        let parent = if row.needs_parent() {
            Some(parents.resolve(self.tracker, row).await?)
        } else {
            None
        };

        let payload = self.create_fields(row, parent.as_deref());
        let created = self
            .tracker
            .create_issue(&payload)
            .await
            .map_err(|e| ImportError::CreateIssue {
                summary: row.summary().to_string(),
                reason: format!("{e:#}"),
            })?;
        match &parent {
            Some(parent) => info!(
                "Created {} {} under {parent}: {}",
                row.issue_type_name(),
                created.key,
                row.summary()
            ),
            None => info!(
                "Created {} {}: {}",
                row.issue_type_name(),
                created.key,
                row.summary()
            ),
        }

        let fields = self
            .apply_updates(&created.key, self.row_updates(row, Pass::Created))
            .await;
        let worklog = self.log_time_spent(&created.key, row).await;
        let closure = match plan {
            Some(plan) => Some(
                self.close(&created.key, plan.target_status(row.kind()), plan)
                    .await,
            ),
            None => None,
        };

        Ok(CreatedRow {
            index,
            key: created.key,
            summary: row.summary().to_string(),
            fields,
            worklog,
            closure,
        })
    }

    /// Refresh fields of issues created by an earlier run.
    pub async fn update_existing(&self, rows: &[SourceRow]) -> UpdateResult {
        let mut result = UpdateResult::default();
        for (index, row) in rows.iter().enumerate() {
            if !row.is_imported() {
                result.skipped.push(SkippedRow {
                    index,
                    summary: row.summary().to_string(),
                    reason: "no Created Issue ID".into(),
                });
                continue;
            }
            let key = row.created_issue_id.trim().to_string();
            let fields = self
                .apply_updates(&key, self.row_updates(row, Pass::Existing))
                .await;
            info!("Updated {} field(s) on {key}", fields.len());
            result.updated.push(UpdatedRow { index, key, fields });
        }
        result
    }

    /// Move issues created by an earlier run to their closing status.
    pub async fn transition_existing(
        &self,
        rows: &[SourceRow],
        plan: &TransitionPlan,
    ) -> Vec<TransitionEntry> {
        let mut entries = Vec::new();
        for row in rows.iter().filter(|r| r.is_imported()) {
            let key = row.created_issue_id.trim().to_string();
            let target = plan.target_status(row.kind()).to_string();
            let outcome = self.transition_one(&key, &target, plan).await;
            if let TransitionOutcome::Failed(reason) = &outcome {
                warn!("{key}: {reason}");
            }
            entries.push(TransitionEntry {
                key,
                summary: row.summary().to_string(),
                issue_type: row.issue_type.trim().to_string(),
                target,
                outcome,
            });
        }
        entries
    }

    async fn transition_one(&self, key: &str, target: &str, plan: &TransitionPlan) -> TransitionOutcome {
        match self.tracker.get_issue(key).await {
            Ok(Some(issue)) => {
                let current = issue.status.unwrap_or_default();
                if current.trim().eq_ignore_ascii_case(target.trim()) {
                    info!("{key} already {current}");
                    return TransitionOutcome::AlreadyInStatus;
                }
            }
            Ok(None) => return TransitionOutcome::Failed(format!("{key} not found")),
            Err(e) => return TransitionOutcome::Failed(format!("{e:#}")),
        }

        match self.transition_to(key, target, plan).await {
            Ok(status) => TransitionOutcome::Transitioned {
                status,
                resolution: self.settle_resolution(key, plan).await,
            },
            Err(e) => TransitionOutcome::Failed(e.to_string()),
        }
    }
}
