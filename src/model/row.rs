use serde::{Deserialize, Serialize};

/// Columns every input CSV must carry. The remaining columns are optional.
pub const REQUIRED_COLUMNS: [&str; 3] = ["Project", "Summary", "IssueType"];
pub const ID_COLUMN: &str = "Created Issue ID";

/// One record of the input CSV, also the shape of a tracker ledger record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceRow {
    #[serde(rename = "Project")]
    pub project: String,
    #[serde(rename = "Summary")]
    pub summary: String,
    #[serde(rename = "IssueType")]
    pub issue_type: String,
    #[serde(rename = "Parent", default)]
    pub parent: String,
    #[serde(rename = "Start Date", default)]
    pub start_date: String,
    #[serde(rename = "Story Points", default)]
    pub story_points: String,
    #[serde(rename = "Original Estimate", default)]
    pub original_estimate: String,
    #[serde(rename = "Time spent", default)]
    pub time_spent: String,
    #[serde(rename = "Priority", default)]
    pub priority: String,
    #[serde(rename = "Created Issue ID", default)]
    pub created_issue_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueKind {
    Epic,
    Story,
    Task,
    SubTask,
    Other,
}

impl IssueKind {
    pub fn parse(raw: &str) -> Self {
        let normalized: String = raw
            .trim()
            .to_lowercase()
            .chars()
            .filter(|c| !matches!(c, '-' | ' ' | '_'))
            .collect();
        match normalized.as_str() {
            "epic" => IssueKind::Epic,
            "story" => IssueKind::Story,
            "task" => IssueKind::Task,
            "subtask" => IssueKind::SubTask,
            _ => IssueKind::Other,
        }
    }

    /// Creation order within a batch: parents before children.
    pub fn rank(&self) -> u8 {
        match self {
            IssueKind::Epic => 0,
            IssueKind::Story | IssueKind::Task | IssueKind::Other => 1,
            IssueKind::SubTask => 2,
        }
    }
}

impl SourceRow {
    pub fn kind(&self) -> IssueKind {
        IssueKind::parse(&self.issue_type)
    }

    /// Issue type name sent to Jira. Empty cells default to Story.
    pub fn issue_type_name(&self) -> &str {
        match self.issue_type.trim() {
            "" => "Story",
            t if IssueKind::parse(t) == IssueKind::SubTask => "Sub-task",
            t => t,
        }
    }

    pub fn is_imported(&self) -> bool {
        !self.created_issue_id.trim().is_empty()
    }

    pub fn summary(&self) -> &str {
        self.summary.trim()
    }

    pub fn parent_ref(&self) -> Option<&str> {
        Some(self.parent.trim()).filter(|p| !p.is_empty())
    }

    pub fn needs_parent(&self) -> bool {
        self.kind() == IssueKind::SubTask || self.parent_ref().is_some()
    }

    pub fn project(&self) -> &str {
        self.project.trim()
    }
}

/// A non-empty trimmed cell, `None` also for the literal "none" exports sometimes carry.
pub fn cell(value: &str) -> Option<&str> {
    let v = value.trim();
    if v.is_empty() || v.eq_ignore_ascii_case("none") {
        None
    } else {
        Some(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_issue_kinds() {
        assert_eq!(IssueKind::parse("Sub-task"), IssueKind::SubTask);
        assert_eq!(IssueKind::parse("subtask"), IssueKind::SubTask);
        assert_eq!(IssueKind::parse(" Sub Task "), IssueKind::SubTask);
        assert_eq!(IssueKind::parse("EPIC"), IssueKind::Epic);
        assert_eq!(IssueKind::parse("Story"), IssueKind::Story);
        assert_eq!(IssueKind::parse("Bug"), IssueKind::Other);
    }

    #[test]
    fn issue_type_name_defaults_to_story() {
        let row = SourceRow::default();
        assert_eq!(row.issue_type_name(), "Story");

        let row = SourceRow {
            issue_type: "subtask".into(),
            ..Default::default()
        };
        assert_eq!(row.issue_type_name(), "Sub-task");
    }

    #[test]
    fn sub_task_needs_parent_even_without_reference() {
        let row = SourceRow {
            issue_type: "Sub-task".into(),
            ..Default::default()
        };
        assert!(row.needs_parent());
        assert_eq!(row.parent_ref(), None);
    }

    #[test]
    fn cell_treats_none_as_empty() {
        assert_eq!(cell("  "), None);
        assert_eq!(cell("None"), None);
        assert_eq!(cell(" 3 "), Some("3"));
    }
}
