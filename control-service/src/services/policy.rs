use std::collections::HashMap;

use crate::config::PolicyConfig;
use crate::models::{ActionKind, ActionParams, ActionRequest, Identity, NormalizedAction};

use super::error::ControlError;

/// Applies organizational defaults to raw requests before authorization.
///
/// Normalization is deterministic and idempotent: prefixes are added only
/// when absent and defaults only when a field is missing, so re-normalizing
/// an already-normalized request changes nothing.
#[derive(Debug, Clone)]
pub struct PolicyService {
    config: PolicyConfig,
}

impl PolicyService {
    pub fn new(config: PolicyConfig) -> Self {
        Self { config }
    }

    pub fn normalize(
        &self,
        kind: ActionKind,
        request: &ActionRequest,
        identity: &Identity,
    ) -> Result<NormalizedAction, ControlError> {
        let params = &request.parameters;

        if kind.is_repo_scoped() && request.repo.as_deref().map_or(true, str::is_empty) {
            return Err(ControlError::Validation(format!(
                "`repo` is required for {kind}"
            )));
        }

        let team = params
            .get("team")
            .filter(|team| !team.is_empty())
            .cloned()
            .unwrap_or_else(|| self.config.default_team.clone());

        let typed = match kind {
            ActionKind::CreateRepo => {
                let name = require(params, "name", kind)?;
                let private = match params.get("private") {
                    None => true,
                    Some(value) => parse_bool("private", value)?,
                };
                let description = match params.get("description") {
                    Some(description) if !description.is_empty() => description.clone(),
                    _ => format!("Repository created by {} via MCP", identity.username()),
                };
                ActionParams::CreateRepo {
                    name: with_prefix(&name, &self.config.repo_prefix),
                    private,
                    description,
                }
            }
            ActionKind::DeleteRepo => ActionParams::DeleteRepo {
                name: require(params, "name", kind)?,
            },
            ActionKind::ReplaceSecret => ActionParams::ReplaceSecret {
                name: with_prefix(&require(params, "name", kind)?, &self.config.secret_prefix),
                value: require(params, "value", kind)?,
            },
            ActionKind::DeleteSecret => ActionParams::DeleteSecret {
                name: require(params, "name", kind)?,
            },
            ActionKind::AddUserToTeam => ActionParams::AddUserToTeam {
                username: require(params, "username", kind)?,
            },
            ActionKind::RemoveUserFromTeam => ActionParams::RemoveUserFromTeam {
                username: require(params, "username", kind)?,
            },
        };

        Ok(NormalizedAction {
            org: request.org.clone(),
            repo: request.repo.clone(),
            kind,
            team,
            params: typed,
        })
    }
}

fn with_prefix(name: &str, prefix: &str) -> String {
    if name.starts_with(prefix) {
        name.to_string()
    } else {
        format!("{prefix}{name}")
    }
}

fn require(
    params: &HashMap<String, String>,
    field: &str,
    kind: ActionKind,
) -> Result<String, ControlError> {
    params
        .get(field)
        .filter(|value| !value.is_empty())
        .cloned()
        .ok_or_else(|| ControlError::Validation(format!("`{field}` is required for {kind}")))
}

fn parse_bool(field: &str, value: &str) -> Result<bool, ControlError> {
    match value {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        other => Err(ControlError::Validation(format!(
            "`{field}` must be a boolean, got `{other}`"
        ))),
    }
}
