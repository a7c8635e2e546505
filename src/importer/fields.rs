use log::{debug, info, warn};
use serde_json::json;

use super::{AppliedField, Importer};
use crate::error::ImportError;
use crate::model::field::{FieldSet, FieldValue, RefAttr};
use crate::model::row::{cell, IssueKind, SourceRow};
use crate::providers::EditableFieldSet;
use crate::util::time::{duration_seconds, normalize_date};

/// Which pass the field updates belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Pass {
    /// Right after creation: assignee included, priority already sent on create.
    Created,
    /// Refreshing an issue created by an earlier run.
    Existing,
}

/// One logical field and the ways it can be written, in preference order.
#[derive(Debug, Clone)]
pub(super) struct FieldUpdate {
    pub name: &'static str,
    pub candidates: Vec<(String, FieldValue)>,
}

fn estimate_value(field_id: &str, raw: &str) -> Option<FieldValue> {
    match field_id {
        "timetracking" => Some(FieldValue::OptionRef(
            RefAttr::OriginalEstimate,
            raw.to_string(),
        )),
        "timeoriginalestimate" => duration_seconds(raw).map(|s| FieldValue::Scalar(json!(s))),
        _ => Some(FieldValue::text(raw)),
    }
}

impl Importer<'_> {
    /// Create payload: defaults, then the row's own fields, then explicit overrides.
    pub(super) fn create_fields(&self, row: &SourceRow, parent: Option<&str>) -> FieldSet {
        let mut fields = FieldSet::new();
        for default in &self.settings.defaults {
            fields.set(&default.field_id, &default.value);
        }

        fields.set(
            "project",
            &FieldValue::OptionRef(RefAttr::Key, row.project().to_string()),
        );
        fields.set("summary", &FieldValue::text(row.summary()));
        fields.set(
            "issuetype",
            &FieldValue::OptionRef(RefAttr::Name, row.issue_type_name().to_string()),
        );
        if let Some(parent) = parent {
            fields.set("parent", &FieldValue::OptionRef(RefAttr::Key, parent.to_string()));
        }
        if let Some(priority) = cell(&row.priority) {
            fields.set(
                "priority",
                &FieldValue::OptionRef(RefAttr::Name, priority.to_string()),
            );
        }

        for field in &self.settings.overrides {
            debug!("Override {} on {}", field.name, field.field_id);
            fields.set(&field.field_id, &field.value);
        }
        fields
    }

    pub(super) fn row_updates(&self, row: &SourceRow, pass: Pass) -> Vec<FieldUpdate> {
        let mut updates = Vec::new();
        let summary = row.summary();

        if pass == Pass::Existing {
            if let Some(priority) = cell(&row.priority) {
                updates.push(FieldUpdate {
                    name: "Priority",
                    candidates: vec![(
                        "priority".to_string(),
                        FieldValue::OptionRef(RefAttr::Name, priority.to_string()),
                    )],
                });
            }
        }

        if let Some(raw) = cell(&row.story_points) {
            match raw.parse::<f64>() {
                Ok(points) => updates.push(FieldUpdate {
                    name: "Story Points",
                    candidates: self
                        .settings
                        .story_points_fields
                        .iter()
                        .map(|id| (id.clone(), FieldValue::Scalar(json!(points))))
                        .collect(),
                }),
                Err(_) => warn!("Story Points '{raw}' on '{summary}' is not a number. Skipping"),
            }
        }

        if let Some(raw) = cell(&row.start_date) {
            match normalize_date(raw) {
                Some(date) => updates.push(FieldUpdate {
                    name: "Start Date",
                    candidates: self
                        .settings
                        .start_date_fields
                        .iter()
                        .map(|id| (id.clone(), FieldValue::text(date.clone())))
                        .collect(),
                }),
                None => warn!("Start Date '{raw}' on '{summary}' is not YYYY-MM-DD. Skipping"),
            }
        }

        // Sub-task screens do not carry time tracking.
        if row.kind() != IssueKind::SubTask {
            if let Some(raw) = cell(&row.original_estimate) {
                updates.push(FieldUpdate {
                    name: "Original Estimate",
                    candidates: self
                        .settings
                        .estimate_fields
                        .iter()
                        .filter_map(|id| estimate_value(id, raw).map(|v| (id.clone(), v)))
                        .collect(),
                });
            }
        }

        if pass == Pass::Created {
            if let Some(assignee) = &self.settings.assignee {
                updates.push(FieldUpdate {
                    name: "Assignee",
                    candidates: vec![("assignee".to_string(), assignee.value())],
                });
            }
        }

        updates
    }

    /// Apply updates against one editable-field snapshot of the issue.
    /// A failed snapshot fetch leaves every field unapplied.
    pub(super) async fn apply_updates(
        &self,
        key: &str,
        updates: Vec<FieldUpdate>,
    ) -> Vec<AppliedField> {
        if updates.is_empty() {
            return Vec::new();
        }
        let editable = match self.tracker.editable_fields(key).await {
            Ok(set) => set,
            Err(e) => {
                warn!("Could not fetch editable fields for {key}: {e:#}");
                EditableFieldSet::default()
            }
        };

        let mut applied = Vec::new();
        for update in &updates {
            match self.apply_first(key, &editable, update).await {
                Some(field_id) => applied.push(AppliedField {
                    name: update.name,
                    field_id,
                }),
                None => debug!("{} not applied to {key}", update.name),
            }
        }
        applied
    }

    /// First candidate that is editable and accepted wins.
    async fn apply_first(
        &self,
        key: &str,
        editable: &EditableFieldSet,
        update: &FieldUpdate,
    ) -> Option<String> {
        for (field_id, value) in &update.candidates {
            if !editable.contains(field_id) {
                let skipped = ImportError::FieldNotEditable {
                    key: key.to_string(),
                    field: field_id.clone(),
                };
                debug!("{skipped}, skipping {}", update.name);
                continue;
            }
            let fields = FieldSet::single(field_id, value);
            match self.tracker.update_fields(key, &fields).await {
                Ok(()) => {
                    info!("Set {} on {key} via {field_id}", update.name);
                    return Some(field_id.clone());
                }
                Err(e) => warn!("Setting {} on {key} via {field_id} failed: {e:#}", update.name),
            }
        }
        None
    }

    pub(super) async fn log_time_spent(&self, key: &str, row: &SourceRow) -> bool {
        let Some(spent) = cell(&row.time_spent) else {
            return false;
        };
        match self.tracker.log_work(key, spent).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to log work for {key}: {e:#}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_shapes_per_field() {
        assert_eq!(
            estimate_value("timetracking", "1h").unwrap().to_json(),
            json!({"originalEstimate": "1h"})
        );
        assert_eq!(
            estimate_value("timeoriginalestimate", "1h 30m").unwrap().to_json(),
            json!(5400)
        );
        assert!(estimate_value("timeoriginalestimate", "later").is_none());
        assert_eq!(
            estimate_value("customfield_1", "2h").unwrap().to_json(),
            json!("2h")
        );
    }
}
