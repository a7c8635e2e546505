use serde::Deserialize;

use super::row::IssueKind;

pub const DEFAULT_TRANSITION_NAMES: [&str; 5] = ["Done", "Closed", "Resolve", "Complete", "Finished"];
pub const DEFAULT_RESOLUTION_NAMES: [&str; 4] = ["Done", "Completed", "Fixed", "Resolved"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// Epics and stories.
    Closed,
    /// Tasks, sub-tasks and anything else.
    Done,
}

impl StatusClass {
    pub fn of(kind: IssueKind) -> Self {
        match kind {
            IssueKind::Epic | IssueKind::Story => StatusClass::Closed,
            _ => StatusClass::Done,
        }
    }
}

/// Where created or existing issues should end up, resolved before a batch starts.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TransitionPlan {
    pub epic_story_status: String,
    pub task_status: String,
    /// Transition names accepted when no transition matches the target exactly.
    pub transition_names: Vec<String>,
    pub resolution_names: Vec<String>,
    /// Replaces the per-type target for every issue.
    #[serde(skip)]
    pub force_status: Option<String>,
}

impl Default for TransitionPlan {
    fn default() -> Self {
        Self {
            epic_story_status: "Closed".into(),
            task_status: "Done".into(),
            transition_names: DEFAULT_TRANSITION_NAMES.iter().map(|s| s.to_string()).collect(),
            resolution_names: DEFAULT_RESOLUTION_NAMES.iter().map(|s| s.to_string()).collect(),
            force_status: None,
        }
    }
}

impl TransitionPlan {
    pub fn with_force_status(mut self, status: Option<String>) -> Self {
        self.force_status = status.filter(|s| !s.trim().is_empty());
        self
    }

    pub fn target_status(&self, kind: IssueKind) -> &str {
        if let Some(status) = &self.force_status {
            return status;
        }
        match StatusClass::of(kind) {
            StatusClass::Closed => &self.epic_story_status,
            StatusClass::Done => &self.task_status,
        }
    }
}
