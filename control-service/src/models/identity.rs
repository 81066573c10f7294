use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Authenticated operator identity, decoded from the session token minted by
/// the login collaborator. Immutable for the duration of a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub subject: String,
    pub email: String,
    pub name: String,
    pub expiry: DateTime<Utc>,
}

impl Identity {
    /// Platform username derived from the email local part.
    pub fn username(&self) -> &str {
        self.email.split('@').next().unwrap_or(&self.email)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_is_the_email_local_part() {
        let identity = Identity {
            subject: "sub-1".to_string(),
            email: "alice@example.com".to_string(),
            name: "Alice".to_string(),
            expiry: Utc::now(),
        };
        assert_eq!(identity.username(), "alice");
    }
}
