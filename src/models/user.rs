//! User model: workflow submitters and notification recipients.

use secrecy::SecretString;
use uuid::Uuid;

use super::periodic_builds::PeriodicBuildSettings;

/// A registered user.
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: Option<String>,
    /// Token presented when acting as this user towards external services
    pub api_token: Option<SecretString>,
    /// Global integration settings (periodic-build fallback)
    pub settings: Option<PeriodicBuildSettings>,
}

impl User {
    pub fn new(username: &str) -> Self {
        User {
            id: Uuid::now_v7(),
            username: username.to_string(),
            email: None,
            api_token: None,
            settings: None,
        }
    }
}

impl std::fmt::Display for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "User '{}' ({})", self.username, self.id)
    }
}
