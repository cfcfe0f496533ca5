//! Operator directory and the login / refresh / logout lifecycle.
//!
//! Accounts are loaded once from a JSON file. Each account carries its own
//! lockout state behind a `tokio::sync::Mutex` that stays held while the
//! password is verified on the blocking pool, so attempts against one account
//! are evaluated one at a time and the failure count is always current.
//! Refresh credentials are tracked by `jti` so they can be rotated and revoked
//! individually.

use std::path::Path;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::auth::credentials::{CredentialVerifier, MintedToken, TokenIssuer};
use crate::permissions::{Permission, Role};

/// Consecutive failed logins that lock an account.
pub const MAX_FAILED_LOGINS: u32 = 5;

#[derive(Debug, Error)]
pub enum LoginError {
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("Invalid or expired refresh token")]
    InvalidRefreshToken,
    #[error("Account locked until {until}")]
    Locked { until: DateTime<Utc> },
    #[error("{0}")]
    Internal(String),
}

impl LoginError {
    pub fn code(&self) -> &'static str {
        match self {
            LoginError::InvalidCredentials => "invalid_credentials",
            LoginError::InvalidRefreshToken => "invalid_refresh_token",
            LoginError::Locked { .. } => "account_locked",
            LoginError::Internal(_) => "internal",
        }
    }
}

/// An operator account as stored in the operators file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorAccount {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub role: Role,
    /// Overrides the role's default permissions when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Vec<Permission>>,
    /// Argon2id PHC string.
    pub password_hash: String,
}

impl OperatorAccount {
    pub fn effective_permissions(&self) -> Vec<Permission> {
        self.permissions
            .clone()
            .unwrap_or_else(|| self.role.default_permissions())
    }
}

/// Read operator accounts from a JSON array file.
pub fn load_accounts(path: &Path) -> Result<Vec<OperatorAccount>, LoginError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| LoginError::Internal(format!("reading {}: {e}", path.display())))?;
    serde_json::from_str(&raw).map_err(|e| LoginError::Internal(format!("parsing {}: {e}", path.display())))
}

/// Hash a password using Argon2id with a random salt.
pub fn hash_password(password: &str) -> Result<String, LoginError> {
    use argon2::Argon2;
    use password_hash::rand_core::OsRng;
    use password_hash::{PasswordHasher, SaltString};

    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| LoginError::Internal(format!("password hashing failed: {e}")))
}

/// Hash checked when the email is unknown, so a miss costs the same as a
/// wrong password.
fn dummy_hash() -> Option<&'static str> {
    static DUMMY: OnceLock<Option<String>> = OnceLock::new();
    DUMMY
        .get_or_init(|| hash_password("warden-unknown-operator").ok())
        .as_deref()
}

/// Verify a password against an Argon2id hash.
fn verify_password(password: &str, hash: &str) -> Result<bool, LoginError> {
    use argon2::Argon2;
    use password_hash::{PasswordHash, PasswordVerifier};

    let parsed = PasswordHash::new(hash).map_err(|_| LoginError::Internal("invalid hash format".to_string()))?;
    Ok(Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok())
}

#[derive(Debug, Default)]
struct LockoutState {
    failed_attempts: u32,
    locked_until: Option<DateTime<Utc>>,
}

struct AccountEntry {
    account: OperatorAccount,
    lockout: Mutex<LockoutState>,
}

#[derive(Debug, Clone)]
struct RefreshRecord {
    operator_id: String,
    /// Unix seconds.
    expires_at: i64,
}

/// A freshly issued access + refresh pair.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access: MintedToken,
    pub refresh: MintedToken,
}

pub struct LoginService {
    /// Lower-cased email -> account.
    accounts: DashMap<String, Arc<AccountEntry>>,
    /// Operator id -> lower-cased email.
    ids: DashMap<String, String>,
    /// Refresh `jti` -> record.
    refresh_tokens: DashMap<String, RefreshRecord>,
    issuer: Arc<TokenIssuer>,
    verifier: Arc<CredentialVerifier>,
    lockout_secs: i64,
}

impl LoginService {
    pub fn new(
        accounts: Vec<OperatorAccount>,
        issuer: Arc<TokenIssuer>,
        verifier: Arc<CredentialVerifier>,
        lockout: Duration,
    ) -> Self {
        let service = Self {
            accounts: DashMap::new(),
            ids: DashMap::new(),
            refresh_tokens: DashMap::new(),
            issuer,
            verifier,
            lockout_secs: lockout.as_secs() as i64,
        };
        for account in accounts {
            let email = account.email.to_lowercase();
            service.ids.insert(account.id.clone(), email.clone());
            service.accounts.insert(
                email,
                Arc::new(AccountEntry {
                    account,
                    lockout: Mutex::new(LockoutState::default()),
                }),
            );
        }
        service
    }

    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }

    /// Password login. The lockout is checked before the password.
    pub async fn login(&self, email: &str, password: &str) -> Result<(OperatorAccount, TokenPair), LoginError> {
        let entry = self.accounts.get(&email.to_lowercase()).map(|e| e.value().clone());
        let Some(entry) = entry else {
            let password = password.to_string();
            let _ = tokio::task::spawn_blocking(move || {
                dummy_hash().map(|hash| verify_password(&password, hash))
            })
            .await;
            return Err(LoginError::InvalidCredentials);
        };

        // Held across verification: concurrent guesses queue here instead of
        // all passing the lockout check before any failure is counted.
        let mut lockout = entry.lockout.lock().await;
        match lockout.locked_until {
            Some(until) if until > Utc::now() => return Err(LoginError::Locked { until }),
            Some(_) => *lockout = LockoutState::default(),
            None => {}
        }

        let hash = entry.account.password_hash.clone();
        let password = password.to_string();
        let matches = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
            .await
            .map_err(|e| LoginError::Internal(format!("password verification task failed: {e}")))??;

        if !matches {
            lockout.failed_attempts += 1;
            if lockout.failed_attempts >= MAX_FAILED_LOGINS {
                let until = Utc::now() + chrono::Duration::seconds(self.lockout_secs);
                lockout.failed_attempts = 0;
                lockout.locked_until = Some(until);
                tracing::warn!(operator_id = %entry.account.id, %until, "account locked after failed logins");
            }
            return Err(LoginError::InvalidCredentials);
        }

        *lockout = LockoutState::default();
        drop(lockout);
        self.prune_expired_refresh_tokens();

        let pair = self.issue_pair(&entry.account)?;
        tracing::info!(operator_id = %entry.account.id, "operator logged in");
        Ok((entry.account.clone(), pair))
    }

    /// Exchange a refresh credential for a new pair. The old refresh
    /// credential is consumed.
    pub fn refresh(&self, refresh_token: &str) -> Result<(OperatorAccount, TokenPair), LoginError> {
        let claims = self
            .verifier
            .decode_refresh(refresh_token)
            .map_err(|_| LoginError::InvalidRefreshToken)?;

        let (_, record) = self
            .refresh_tokens
            .remove(&claims.jti)
            .ok_or(LoginError::InvalidRefreshToken)?;

        let account = self
            .ids
            .get(&record.operator_id)
            .and_then(|email| self.accounts.get(email.value()).map(|e| e.account.clone()))
            .ok_or(LoginError::InvalidRefreshToken)?;

        let pair = self.issue_pair(&account)?;
        Ok((account, pair))
    }

    /// Revoke a refresh credential. Unknown but well-signed credentials are
    /// accepted so logout stays idempotent.
    pub fn logout(&self, refresh_token: &str) -> Result<(), LoginError> {
        let claims = self
            .verifier
            .decode_refresh(refresh_token)
            .map_err(|_| LoginError::InvalidRefreshToken)?;
        if self.refresh_tokens.remove(&claims.jti).is_some() {
            tracing::info!(operator_id = %claims.sub, "operator logged out");
        }
        Ok(())
    }

    fn issue_pair(&self, account: &OperatorAccount) -> Result<TokenPair, LoginError> {
        let access = self
            .issuer
            .mint_access(&account.id, account.role, &account.effective_permissions())
            .map_err(|e| LoginError::Internal(e.to_string()))?;
        let refresh = self
            .issuer
            .mint_refresh(&account.id, account.role)
            .map_err(|e| LoginError::Internal(e.to_string()))?;

        self.refresh_tokens.insert(
            refresh.jti.clone(),
            RefreshRecord {
                operator_id: account.id.clone(),
                expires_at: refresh.expires_at,
            },
        );
        Ok(TokenPair { access, refresh })
    }

    fn prune_expired_refresh_tokens(&self) {
        let now = Utc::now().timestamp();
        self.refresh_tokens.retain(|_, record| record.expires_at > now);
    }
}
