//! Shared-password authentication with bcrypt.
//!
//! The shop has one password. Its bcrypt hash lives in the credential store
//! (key `password_hash`). Successful logins receive a bearer token; sessions
//! are kept in memory and expire on inactivity or after a fixed maximum.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{info, warn};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::error::{CrmError, CrmResult};
use crate::storage::{CredentialStore, KEY_PASSWORD_HASH};

const MAX_FAILED_ATTEMPTS: u32 = 5;
const LOCKOUT_MINUTES: i64 = 15;
const SESSION_INACTIVITY_MINUTES: i64 = 30;
const SESSION_MAX_DURATION_HOURS: i64 = 8;
pub const MIN_PASSWORD_LEN: usize = 6;

/// Public view of a live session.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SessionInfo {
    pub token: String,
    pub login_time: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
struct Session {
    token: String,
    login_time: DateTime<Utc>,
    last_activity: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl Session {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
            || now - self.last_activity > Duration::minutes(SESSION_INACTIVITY_MINUTES)
    }

    fn info(&self) -> SessionInfo {
        SessionInfo {
            token: self.token.clone(),
            login_time: self.login_time,
            last_activity: self.last_activity,
            expires_at: self.expires_at,
        }
    }
}

struct LockoutEntry {
    attempts: u32,
    last_attempt: DateTime<Utc>,
}

pub struct AuthState {
    credentials: Arc<dyn CredentialStore>,
    sessions: Mutex<HashMap<String, Session>>,
    lockout: Mutex<LockoutEntry>,
    bcrypt_cost: u32,
}

fn lock<T>(mutex: &Mutex<T>) -> CrmResult<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| CrmError::Internal("auth state lock poisoned".into()))
}

impl AuthState {
    pub fn new(credentials: Arc<dyn CredentialStore>) -> Self {
        Self {
            credentials,
            sessions: Mutex::new(HashMap::new()),
            lockout: Mutex::new(LockoutEntry {
                attempts: 0,
                last_attempt: Utc::now(),
            }),
            bcrypt_cost: bcrypt::DEFAULT_COST,
        }
    }

    /// Lower the hashing cost. Only sensible in tests.
    pub fn with_bcrypt_cost(mut self, cost: u32) -> Self {
        self.bcrypt_cost = cost;
        self
    }

    /// Whether a shop password has been set.
    pub fn is_configured(&self) -> bool {
        self.credentials.has(KEY_PASSWORD_HASH)
    }

    /// Set the initial password. Refused once a password exists.
    pub fn setup_password(&self, password: Zeroizing<String>) -> CrmResult<()> {
        if self.is_configured() {
            return Err(CrmError::Conflict("A password is already configured".into()));
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(CrmError::Validation(format!(
                "Password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        let hash = bcrypt::hash(password.as_str(), self.bcrypt_cost)
            .map_err(|e| CrmError::Internal(format!("Failed to hash password: {e}")))?;
        self.credentials.set(KEY_PASSWORD_HASH, &hash)?;
        info!("shop password configured");
        Ok(())
    }

    pub fn login(&self, password: Zeroizing<String>) -> CrmResult<SessionInfo> {
        self.login_at(password, Utc::now())
    }

    fn login_at(&self, password: Zeroizing<String>, now: DateTime<Utc>) -> CrmResult<SessionInfo> {
        if password.is_empty() {
            return Err(CrmError::Validation("Password is required".into()));
        }
        let hash = self
            .credentials
            .get(KEY_PASSWORD_HASH)
            .ok_or_else(|| CrmError::Unauthorized("No password configured yet".into()))?;

        let mut lockout = lock(&self.lockout)?;
        check_lockout(&mut lockout, now)?;

        if !bcrypt::verify(password.as_str(), hash.as_str()).unwrap_or(false) {
            lockout.attempts += 1;
            lockout.last_attempt = now;
            warn!(attempts = lockout.attempts, "failed login attempt");
            return Err(CrmError::Unauthorized("Invalid password".into()));
        }
        lockout.attempts = 0;
        lockout.last_attempt = now;
        drop(lockout);

        let session = Session {
            token: Uuid::new_v4().to_string(),
            login_time: now,
            last_activity: now,
            expires_at: now + Duration::hours(SESSION_MAX_DURATION_HOURS),
        };
        let info = session.info();
        let mut sessions = lock(&self.sessions)?;
        sessions.retain(|_, s| !s.is_expired(now));
        sessions.insert(session.token.clone(), session);
        info!(sessions = sessions.len(), "login successful");
        Ok(info)
    }

    /// Drop a session. Returns whether it existed.
    pub fn logout(&self, token: &str) -> CrmResult<bool> {
        let removed = lock(&self.sessions)?.remove(token).is_some();
        if removed {
            info!("session logged out");
        }
        Ok(removed)
    }

    /// Check a bearer token and refresh its inactivity timer.
    pub fn validate(&self, token: &str) -> CrmResult<SessionInfo> {
        self.validate_at(token, Utc::now())
    }

    fn validate_at(&self, token: &str, now: DateTime<Utc>) -> CrmResult<SessionInfo> {
        let mut sessions = lock(&self.sessions)?;
        match sessions.get_mut(token) {
            None => return Err(CrmError::Unauthorized("Not logged in".into())),
            Some(session) if !session.is_expired(now) => {
                session.last_activity = now;
                return Ok(session.info());
            }
            Some(_) => {}
        }
        sessions.remove(token);
        Err(CrmError::Unauthorized("Session expired".into()))
    }

    pub fn active_sessions(&self) -> usize {
        let now = Utc::now();
        self.sessions
            .lock()
            .map(|s| s.values().filter(|s| !s.is_expired(now)).count())
            .unwrap_or(0)
    }
}

fn check_lockout(lockout: &mut LockoutEntry, now: DateTime<Utc>) -> CrmResult<()> {
    if lockout.attempts < MAX_FAILED_ATTEMPTS {
        return Ok(());
    }
    let elapsed = now - lockout.last_attempt;
    if elapsed < Duration::minutes(LOCKOUT_MINUTES) {
        let remaining = (LOCKOUT_MINUTES - elapsed.num_minutes()).max(1);
        return Err(CrmError::Locked(format!(
            "Too many failed attempts. Try again in {remaining} minute(s)."
        )));
    }
    lockout.attempts = 0;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryCredentials;

    fn pw(s: &str) -> Zeroizing<String> {
        Zeroizing::new(s.to_string())
    }

    fn configured() -> AuthState {
        let auth = AuthState::new(Arc::new(MemoryCredentials::new())).with_bcrypt_cost(4);
        auth.setup_password(pw("service123")).expect("setup");
        auth
    }

    #[test]
    fn setup_only_once_and_enforces_length() {
        let auth = AuthState::new(Arc::new(MemoryCredentials::new())).with_bcrypt_cost(4);
        assert!(!auth.is_configured());
        assert!(matches!(
            auth.setup_password(pw("abc")),
            Err(CrmError::Validation(_))
        ));
        auth.setup_password(pw("service123")).expect("setup");
        assert!(auth.is_configured());
        assert!(matches!(
            auth.setup_password(pw("another-one")),
            Err(CrmError::Conflict(_))
        ));
    }

    #[test]
    fn login_before_setup_is_unauthorized() {
        let auth = AuthState::new(Arc::new(MemoryCredentials::new())).with_bcrypt_cost(4);
        assert!(matches!(auth.login(pw("whatever")), Err(CrmError::Unauthorized(_))));
    }

    #[test]
    fn login_issues_token_that_validates() {
        let auth = configured();
        let session = auth.login(pw("service123")).expect("login");
        let checked = auth.validate(&session.token).expect("valid");
        assert_eq!(checked.token, session.token);
        assert!(auth.logout(&session.token).expect("logout"));
        assert!(matches!(auth.validate(&session.token), Err(CrmError::Unauthorized(_))));
    }

    #[test]
    fn wrong_password_locks_after_five_attempts() {
        let auth = configured();
        let start = Utc::now();
        for _ in 0..MAX_FAILED_ATTEMPTS {
            let err = auth.login_at(pw("nope-nope"), start).unwrap_err();
            assert!(matches!(err, CrmError::Unauthorized(_)));
        }
        // Even the right password is refused while locked.
        let err = auth.login_at(pw("service123"), start).unwrap_err();
        assert!(matches!(err, CrmError::Locked(_)), "got {err:?}");

        let later = start + Duration::minutes(LOCKOUT_MINUTES + 1);
        auth.login_at(pw("service123"), later).expect("lock expired");
    }

    #[test]
    fn sessions_expire_on_inactivity_and_max_age() {
        let auth = configured();
        let start = Utc::now();
        let idle = auth.login_at(pw("service123"), start).expect("login");
        let busy = auth.login_at(pw("service123"), start).expect("login");

        let idle_limit = start + Duration::minutes(SESSION_INACTIVITY_MINUTES + 1);
        assert!(auth.validate_at(&idle.token, idle_limit).is_err());

        // Keep `busy` active every 20 minutes until the absolute limit.
        let mut t = start;
        while t < start + Duration::hours(SESSION_MAX_DURATION_HOURS) - Duration::minutes(20) {
            t += Duration::minutes(20);
            auth.validate_at(&busy.token, t).expect("still active");
        }
        let past_max = start + Duration::hours(SESSION_MAX_DURATION_HOURS);
        assert!(auth.validate_at(&busy.token, past_max).is_err());
    }
}
