//! Account storage.
//!
//! The credential file is a JSON array of accounts. Every mutation rewrites
//! the whole file before the call returns.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use crate::error::{AuthError, StoreError};
use crate::models::{Account, AccountStatus};

/// Account lookup and score bookkeeping used by the login flow and the round engine.
///
/// Implementations guard their own state; callers may hold a session or room
/// lock while calling in, never the other way around.
pub trait CredentialStore: Send + Sync {
    /// Check a username/password pair. Blocked accounts are rejected before the
    /// password is looked at.
    fn verify(&self, username: &str, password: &str) -> Result<Account, AuthError>;

    /// Append a new active account with a zero score.
    fn create_account(&self, username: &str, password: &str) -> Result<(), AuthError>;

    /// Mark an account as blocked. Returns `false` if no such account exists.
    fn block(&self, username: &str) -> Result<bool, StoreError>;

    /// Stored score, or `None` for an unknown user.
    fn score(&self, username: &str) -> Option<i64>;

    fn set_score(&self, username: &str, score: i64) -> Result<(), StoreError>;

    fn reset_score(&self, username: &str) -> Result<(), StoreError> {
        self.set_score(username, 0)
    }
}

/// [`CredentialStore`] backed by an in-memory list, optionally mirrored to a file.
pub struct AccountStore {
    accounts: Mutex<Vec<Account>>,
    path: Option<PathBuf>,
}

impl AccountStore {
    /// Open the credential file, creating it with a default account if missing.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();

        let accounts = if path.exists() {
            let content = fs::read_to_string(&path)?;
            serde_json::from_str(&content)?
        } else {
            let defaults = vec![Account::new("dung", "123")];
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            write_accounts(&path, &defaults)?;
            info!(path = %path.display(), "created default credential file");
            defaults
        };

        let store = Self {
            accounts: Mutex::new(accounts),
            path: Some(path),
        };
        info!(count = store.lock().len(), "loaded accounts");
        Ok(store)
    }

    /// A store that never touches the filesystem.
    pub fn in_memory(accounts: Vec<Account>) -> Self {
        Self {
            accounts: Mutex::new(accounts),
            path: None,
        }
    }

    /// Snapshot of one account.
    pub fn account(&self, username: &str) -> Option<Account> {
        self.lock().iter().find(|a| a.username == username).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Account>> {
        self.accounts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Must be called with the accounts lock held.
    fn persist(&self, accounts: &[Account]) -> Result<(), StoreError> {
        match &self.path {
            Some(path) => write_accounts(path, accounts),
            None => Ok(()),
        }
    }
}

fn write_accounts(path: &Path, accounts: &[Account]) -> Result<(), StoreError> {
    let json = serde_json::to_string_pretty(accounts)?;
    fs::write(path, json)?;
    Ok(())
}

impl CredentialStore for AccountStore {
    fn verify(&self, username: &str, password: &str) -> Result<Account, AuthError> {
        let accounts = self.lock();
        let account = accounts
            .iter()
            .find(|a| a.username == username)
            .ok_or(AuthError::UnknownUser)?;

        if account.is_blocked() {
            return Err(AuthError::Blocked);
        }
        if account.password != password {
            return Err(AuthError::WrongPassword);
        }
        Ok(account.clone())
    }

    fn create_account(&self, username: &str, password: &str) -> Result<(), AuthError> {
        let mut accounts = self.lock();
        if accounts.iter().any(|a| a.username == username) {
            return Err(AuthError::UsernameTaken);
        }

        accounts.push(Account::new(username, password));
        if let Err(e) = self.persist(&accounts) {
            accounts.pop();
            return Err(e.into());
        }
        info!(user = %username, "account created");
        Ok(())
    }

    fn block(&self, username: &str) -> Result<bool, StoreError> {
        let mut accounts = self.lock();
        let Some(account) = accounts.iter_mut().find(|a| a.username == username) else {
            return Ok(false);
        };
        account.status = AccountStatus::Blocked;
        self.persist(&accounts)?;
        warn!(user = %username, "account blocked");
        Ok(true)
    }

    fn score(&self, username: &str) -> Option<i64> {
        self.lock()
            .iter()
            .find(|a| a.username == username)
            .map(|a| a.score)
    }

    fn set_score(&self, username: &str, score: i64) -> Result<(), StoreError> {
        let mut accounts = self.lock();
        let Some(account) = accounts.iter_mut().find(|a| a.username == username) else {
            debug!(user = %username, "score update for unknown user ignored");
            return Ok(());
        };
        account.score = score;
        self.persist(&accounts)?;
        debug!(user = %username, score, "score updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path() -> PathBuf {
        std::env::temp_dir().join(format!("quiz-arena-{}.json", uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_verify_outcomes() {
        let store = AccountStore::in_memory(vec![
            Account::new("alice", "pw"),
            Account {
                status: AccountStatus::Blocked,
                ..Account::new("bob", "pw")
            },
        ]);

        assert_eq!(store.verify("alice", "pw").unwrap().username, "alice");
        assert!(matches!(store.verify("alice", "nope"), Err(AuthError::WrongPassword)));
        assert!(matches!(store.verify("carol", "pw"), Err(AuthError::UnknownUser)));
        assert!(matches!(store.verify("bob", "pw"), Err(AuthError::Blocked)));
    }

    #[test]
    fn test_create_account_rejects_duplicates() {
        let store = AccountStore::in_memory(vec![Account::new("alice", "pw")]);
        assert!(matches!(
            store.create_account("alice", "other"),
            Err(AuthError::UsernameTaken)
        ));
        store.create_account("bob", "secret").unwrap();
        assert_eq!(store.score("bob"), Some(0));
        assert!(store.verify("bob", "secret").is_ok());
    }

    #[test]
    fn test_block_unknown_user() {
        let store = AccountStore::in_memory(vec![]);
        assert!(!store.block("ghost").unwrap());
    }

    #[test]
    fn test_file_is_rewritten_on_every_mutation() {
        let path = temp_path();
        let store = AccountStore::open(&path).unwrap();
        assert!(store.account("dung").is_some());

        store.create_account("alice", "pw").unwrap();
        store.set_score("alice", 7).unwrap();
        store.block("dung").unwrap();

        let reopened = AccountStore::open(&path).unwrap();
        assert_eq!(reopened.score("alice"), Some(7));
        assert!(matches!(reopened.verify("dung", "123"), Err(AuthError::Blocked)));

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_reset_score() {
        let store = AccountStore::in_memory(vec![Account {
            score: 12,
            ..Account::new("alice", "pw")
        }]);
        store.reset_score("alice").unwrap();
        assert_eq!(store.score("alice"), Some(0));
    }
}
