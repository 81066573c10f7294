use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use validator::Validate;

use crate::services::ControlError;

/// Raw inbound action request. Parameter values are always strings; any
/// other shape fails deserialization before the policy layer runs.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ActionRequest {
    #[validate(length(min = 1, message = "org must not be empty"))]
    pub org: String,
    #[serde(default)]
    pub repo: Option<String>,
    #[validate(length(min = 1, message = "action must not be empty"))]
    pub action: String,
    #[serde(default)]
    pub parameters: HashMap<String, String>,
}

/// The closed set of supported platform actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    CreateRepo,
    DeleteRepo,
    ReplaceSecret,
    DeleteSecret,
    AddUserToTeam,
    RemoveUserFromTeam,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::CreateRepo => "create_repo",
            ActionKind::DeleteRepo => "delete_repo",
            ActionKind::ReplaceSecret => "replace_secret",
            ActionKind::DeleteSecret => "delete_secret",
            ActionKind::AddUserToTeam => "add_user_to_team",
            ActionKind::RemoveUserFromTeam => "remove_user_from_team",
        }
    }

    /// Whether the action targets a single repository rather than the org.
    pub fn is_repo_scoped(&self) -> bool {
        matches!(self, ActionKind::ReplaceSecret | ActionKind::DeleteSecret)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create_repo" => Ok(ActionKind::CreateRepo),
            "delete_repo" => Ok(ActionKind::DeleteRepo),
            "replace_secret" => Ok(ActionKind::ReplaceSecret),
            "delete_secret" => Ok(ActionKind::DeleteSecret),
            "add_user_to_team" => Ok(ActionKind::AddUserToTeam),
            "remove_user_from_team" => Ok(ActionKind::RemoveUserFromTeam),
            other => Err(ControlError::UnknownAction(other.to_string())),
        }
    }
}

/// Typed, policy-normalized parameters for each action kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionParams {
    CreateRepo {
        name: String,
        private: bool,
        description: String,
    },
    DeleteRepo {
        name: String,
    },
    ReplaceSecret {
        name: String,
        value: String,
    },
    DeleteSecret {
        name: String,
    },
    AddUserToTeam {
        username: String,
    },
    RemoveUserFromTeam {
        username: String,
    },
}

/// Action request after policy normalization: closed kind, typed parameters,
/// and the team whose membership authorizes the action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedAction {
    pub org: String,
    pub repo: Option<String>,
    pub kind: ActionKind,
    pub team: String,
    pub params: ActionParams,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_kinds_parse_from_their_wire_names() {
        assert_eq!(
            "create_repo".parse::<ActionKind>().unwrap(),
            ActionKind::CreateRepo
        );
        assert_eq!(
            "remove_user_from_team".parse::<ActionKind>().unwrap(),
            ActionKind::RemoveUserFromTeam
        );
    }

    #[test]
    fn unknown_action_names_are_a_distinct_error() {
        let err = "merge_pull_request".parse::<ActionKind>().unwrap_err();
        assert!(matches!(err, ControlError::UnknownAction(name) if name == "merge_pull_request"));
    }

    #[test]
    fn only_secret_actions_are_repo_scoped() {
        assert!(ActionKind::ReplaceSecret.is_repo_scoped());
        assert!(ActionKind::DeleteSecret.is_repo_scoped());
        assert!(!ActionKind::CreateRepo.is_repo_scoped());
        assert!(!ActionKind::AddUserToTeam.is_repo_scoped());
    }
}
