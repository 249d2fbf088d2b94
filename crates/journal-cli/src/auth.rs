//! Firebase session persistence in the OS keychain.

#[cfg(test)]
use std::collections::HashMap;
#[cfg(test)]
use std::sync::{Mutex, OnceLock};

pub use journal_core::auth::{AuthError, AuthSession};
use journal_core::auth::{AuthResult, FirebaseAuthClient, SessionPersistence};

#[cfg(not(test))]
const KEYRING_SERVICE_NAME: &str = "journal-cli";

/// Keychain slot for one Firebase project's session, stored as JSON.
#[derive(Clone)]
pub struct KeychainSessions {
    username: String,
}

impl KeychainSessions {
    pub fn new(project_id: &str) -> Self {
        Self {
            username: format!("firebase_session:{project_id}"),
        }
    }
}

fn secure_storage(error: impl std::fmt::Display) -> AuthError {
    AuthError::SecureStorage(error.to_string())
}

#[cfg(not(test))]
impl KeychainSessions {
    fn entry(&self) -> AuthResult<keyring::Entry> {
        keyring::Entry::new(KEYRING_SERVICE_NAME, &self.username).map_err(secure_storage)
    }

    fn read_secret(&self) -> AuthResult<Option<String>> {
        match self.entry()?.get_password() {
            Ok(raw) => Ok(Some(raw)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(error) => Err(secure_storage(error)),
        }
    }

    fn write_secret(&self, raw: &str) -> AuthResult<()> {
        self.entry()?.set_password(raw).map_err(secure_storage)
    }

    fn delete_secret(&self) -> AuthResult<()> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(error) => Err(secure_storage(error)),
        }
    }
}

/// Process-local stand-in for the OS keychain.
#[cfg(test)]
impl KeychainSessions {
    fn slots() -> AuthResult<std::sync::MutexGuard<'static, HashMap<String, String>>> {
        static SLOTS: OnceLock<Mutex<HashMap<String, String>>> = OnceLock::new();
        SLOTS
            .get_or_init(|| Mutex::new(HashMap::new()))
            .lock()
            .map_err(secure_storage)
    }

    fn read_secret(&self) -> AuthResult<Option<String>> {
        Ok(Self::slots()?.get(&self.username).cloned())
    }

    fn write_secret(&self, raw: &str) -> AuthResult<()> {
        Self::slots()?.insert(self.username.clone(), raw.to_string());
        Ok(())
    }

    fn delete_secret(&self) -> AuthResult<()> {
        Self::slots()?.remove(&self.username);
        Ok(())
    }
}

impl SessionPersistence for KeychainSessions {
    fn load_session(&self) -> AuthResult<Option<AuthSession>> {
        match self.read_secret()? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    fn save_session(&self, session: &AuthSession) -> AuthResult<()> {
        self.write_secret(&serde_json::to_string(session)?)
    }

    fn clear_session(&self) -> AuthResult<()> {
        self.delete_secret()
    }
}

pub type JournalAuthClient = FirebaseAuthClient<KeychainSessions>;

pub fn auth_client(api_key: &str, project_id: &str) -> AuthResult<JournalAuthClient> {
    FirebaseAuthClient::new(api_key, KeychainSessions::new(project_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(user_id: &str) -> AuthSession {
        AuthSession {
            id_token: "secret-id-token".to_string(),
            refresh_token: "secret-refresh-token".to_string(),
            expires_at: 1_700_000_000,
            user_id: user_id.to_string(),
        }
    }

    #[test]
    fn sessions_are_scoped_per_project() {
        let first = KeychainSessions::new("project-a");
        let second = KeychainSessions::new("project-b");

        first.save_session(&session("user-a")).unwrap();

        assert_eq!(
            first.load_session().unwrap().map(|stored| stored.user_id),
            Some("user-a".to_string())
        );
        assert!(second.load_session().unwrap().is_none());

        first.clear_session().unwrap();
        assert!(first.load_session().unwrap().is_none());
    }

    #[test]
    fn unreadable_stored_session_is_an_error() {
        let sessions = KeychainSessions::new("project-corrupt");
        sessions.write_secret("not json").unwrap();

        assert!(sessions.load_session().is_err());
        sessions.clear_session().unwrap();
        assert!(sessions.load_session().unwrap().is_none());
    }

    #[test]
    fn clearing_a_missing_session_succeeds() {
        assert!(KeychainSessions::new("never-saved").clear_session().is_ok());
    }

    #[test]
    fn auth_client_rejects_blank_api_key() {
        assert!(auth_client("  ", "project").is_err());
    }

    #[test]
    fn session_debug_redacts_tokens() {
        let rendered = format!("{:?}", session("user"));
        assert!(!rendered.contains("secret-id-token"));
        assert!(!rendered.contains("secret-refresh-token"));
        assert!(rendered.contains("[REDACTED]"));
    }
}
