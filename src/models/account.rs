use serde::{Deserialize, Serialize};

/// Whether an account may log in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    #[default]
    Active,
    Blocked,
}

/// One entry of the credential file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub status: AccountStatus,
    #[serde(default)]
    pub score: i64,
}

impl Account {
    /// A fresh, active account with a zero score.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            status: AccountStatus::Active,
            score: 0,
        }
    }

    pub fn is_blocked(&self) -> bool {
        self.status == AccountStatus::Blocked
    }
}
