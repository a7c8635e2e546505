use log::{info, warn};

use super::Importer;
use crate::error::ImportError;
use crate::model::plan::TransitionPlan;
use crate::providers::Transition;

fn same_name(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

fn leads_to(t: &Transition, name: &str) -> bool {
    same_name(&t.name, name) || same_name(&t.to_status, name)
}

/// Exact target match, then aliases in order, then the first transition into a done-category status.
pub fn choose_transition<'t>(
    transitions: &'t [Transition],
    target: &str,
    aliases: &[String],
) -> Option<&'t Transition> {
    transitions
        .iter()
        .find(|t| leads_to(t, target))
        .or_else(|| {
            aliases
                .iter()
                .find_map(|alias| transitions.iter().find(|t| leads_to(t, alias)))
        })
        .or_else(|| transitions.iter().find(|t| t.closing))
}

/// First preferred name that is allowed, else the first allowed value.
pub fn choose_resolution<'r>(allowed: &'r [String], preferred: &[String]) -> Option<&'r str> {
    preferred
        .iter()
        .find_map(|p| allowed.iter().find(|a| same_name(a, p)))
        .or_else(|| allowed.first())
        .map(String::as_str)
}

/// Status and resolution an issue ended up with after closing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Closure {
    pub status: Option<String>,
    pub resolution: Option<String>,
}

impl Importer<'_> {
    /// Transition, then set the resolution whether or not the transition happened.
    pub(super) async fn close(&self, key: &str, target: &str, plan: &TransitionPlan) -> Closure {
        let status = match self.transition_to(key, target, plan).await {
            Ok(status) => Some(status),
            Err(e) => {
                warn!("{e}; status left unchanged");
                None
            }
        };
        let resolution = self.settle_resolution(key, plan).await;
        Closure { status, resolution }
    }

    pub(super) async fn transition_to(
        &self,
        key: &str,
        target: &str,
        plan: &TransitionPlan,
    ) -> Result<String, ImportError> {
        let transitions = self
            .tracker
            .transitions(key)
            .await
            .map_err(|e| ImportError::remote(&e))?;
        let Some(chosen) = choose_transition(&transitions, target, &plan.transition_names) else {
            return Err(ImportError::TransitionNotAvailable {
                key: key.to_string(),
                target: target.to_string(),
                available: transitions.iter().map(|t| t.name.clone()).collect(),
            });
        };
        self.tracker
            .execute_transition(key, &chosen.id)
            .await
            .map_err(|e| ImportError::remote(&e))?;
        let status = if chosen.to_status.is_empty() {
            chosen.name.clone()
        } else {
            chosen.to_status.clone()
        };
        info!("Transitioned {key} via '{}' to {status}", chosen.name);
        Ok(status)
    }

    pub(super) async fn settle_resolution(&self, key: &str, plan: &TransitionPlan) -> Option<String> {
        match self.set_resolution(key, plan).await {
            Ok(name) => Some(name),
            Err(e @ ImportError::ResolutionNotSettable { .. }) => {
                info!("{e}: the workflow does not expose it, continuing");
                None
            }
            Err(e) => {
                warn!("Setting resolution on {key} failed: {e}");
                None
            }
        }
    }

    async fn set_resolution(&self, key: &str, plan: &TransitionPlan) -> Result<String, ImportError> {
        let not_settable = || ImportError::ResolutionNotSettable {
            key: key.to_string(),
        };
        // Editability changes with the status, so take a fresh snapshot.
        let editable = self
            .tracker
            .editable_fields(key)
            .await
            .map_err(|e| ImportError::remote(&e))?;
        if !editable.contains("resolution") {
            return Err(not_settable());
        }

        let mut allowed = editable.allowed_values("resolution").to_vec();
        if allowed.is_empty() {
            allowed = self
                .tracker
                .resolutions()
                .await
                .map_err(|e| ImportError::remote(&e))?;
        }
        let name = choose_resolution(&allowed, &plan.resolution_names)
            .ok_or_else(not_settable)?
            .to_string();

        self.tracker
            .set_resolution(key, &name)
            .await
            .map_err(|e| ImportError::remote(&e))?;
        info!("Set resolution of {key} to {name}");
        Ok(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::plan::DEFAULT_RESOLUTION_NAMES;
    use crate::providers::tests::transition;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn exact_target_beats_alias() {
        let transitions = vec![
            transition("1", "Done", "Done", true),
            transition("2", "Close Issue", "Closed", true),
        ];
        let aliases = names(&["Done", "Closed"]);
        let chosen = choose_transition(&transitions, "Closed", &aliases).unwrap();
        assert_eq!(chosen.id, "2");
    }

    #[test]
    fn aliases_are_tried_in_order() {
        let transitions = vec![
            transition("1", "Finished", "Finished", true),
            transition("2", "Resolve", "Resolved", true),
        ];
        let aliases = names(&["Done", "Closed", "Resolve", "Complete", "Finished"]);
        let chosen = choose_transition(&transitions, "Closed", &aliases).unwrap();
        assert_eq!(chosen.id, "2");
    }

    #[test]
    fn falls_back_to_closing_category() {
        let transitions = vec![
            transition("1", "Start", "In Progress", false),
            transition("2", "Ship it", "Released", true),
        ];
        let chosen = choose_transition(&transitions, "Closed", &names(&["Done"])).unwrap();
        assert_eq!(chosen.id, "2");

        let open_only = vec![transition("1", "Start", "In Progress", false)];
        assert!(choose_transition(&open_only, "Closed", &names(&["Done"])).is_none());
    }

    #[test]
    fn resolution_follows_preference_case_insensitively() {
        let preferred: Vec<String> = DEFAULT_RESOLUTION_NAMES.iter().map(|s| s.to_string()).collect();
        let allowed = names(&["Won't Do", "fixed", "Completed"]);
        assert_eq!(choose_resolution(&allowed, &preferred), Some("Completed"));

        let allowed = names(&["Won't Do", "Duplicate"]);
        assert_eq!(choose_resolution(&allowed, &preferred), Some("Won't Do"));

        assert_eq!(choose_resolution(&[], &preferred), None);
    }
}
