//! Signed operator credentials: minting, verification, and revocation.
//!
//! Access and refresh credentials are EdDSA JWTs signed with separate keys.
//! Verification is local (signature, expiry, issuer, audience) plus a
//! revocation lookup in the key-value store, never a network call.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, Header, Validation};
use serde::{Deserialize, Serialize};
use warden_common::id::{prefix, prefixed_ulid};

use crate::auth::keys::SigningKeys;
use crate::config::Config;
use crate::db::kv::KeyValueStore;
use crate::gateway::error::AuthError;
use crate::permissions::{Permission, Role};

/// Access credential TTL in seconds (15 minutes).
pub const ACCESS_TTL_SECS: i64 = 15 * 60;

/// Refresh credential TTL in seconds (7 days).
pub const REFRESH_TTL_SECS: i64 = 7 * 24 * 3600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Claims embedded in every credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialClaims {
    pub iss: String,
    pub aud: String,
    /// Operator or user ID.
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
    pub jti: String,
    pub role: Role,
    #[serde(default)]
    pub permissions: Vec<String>,
    pub typ: TokenKind,
}

/// The verified identity behind an access credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorIdentity {
    pub operator_id: String,
    pub role: Role,
    pub permissions: HashSet<Permission>,
    /// `jti` of the credential, used to revoke it individually.
    pub credential_id: String,
    /// Unix seconds.
    pub expires_at: i64,
}

impl OperatorIdentity {
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }

    fn from_claims(claims: CredentialClaims) -> Self {
        Self {
            permissions: Permission::parse_all(&claims.permissions),
            operator_id: claims.sub,
            credential_id: claims.jti,
            role: claims.role,
            expires_at: claims.exp,
        }
    }
}

/// A freshly minted credential.
#[derive(Debug, Clone)]
pub struct MintedToken {
    pub token: String,
    pub jti: String,
    /// Unix seconds.
    pub expires_at: i64,
}

/// Key material and claim expectations shared by issuer and verifier.
pub struct CredentialKeys {
    access: SigningKeys,
    refresh: SigningKeys,
    issuer: String,
    audience: String,
}

impl CredentialKeys {
    pub fn from_config(config: &Config) -> Self {
        Self {
            access: SigningKeys::from_seed(&config.access_key_seed, "acc"),
            refresh: SigningKeys::from_seed(&config.refresh_key_seed, "ref"),
            issuer: config.token_issuer.clone(),
            audience: config.token_audience.clone(),
        }
    }

    fn keys(&self, kind: TokenKind) -> &SigningKeys {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }

    fn decode(&self, kind: TokenKind, token: &str) -> Result<CredentialClaims, AuthError> {
        let mut validation = Validation::new(Algorithm::EdDSA);
        validation.set_audience(&[&self.audience]);
        validation.set_issuer(&[&self.issuer]);

        let data = jsonwebtoken::decode::<CredentialClaims>(token, &self.keys(kind).decoding, &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::InvalidCredential("credential expired"),
                _ => {
                    tracing::debug!(?e, "credential decode failed");
                    AuthError::InvalidCredential("credential could not be verified")
                }
            })?;

        if data.claims.typ != kind {
            return Err(AuthError::InvalidCredential("wrong credential type"));
        }
        Ok(data.claims)
    }
}

// ---------------------------------------------------------------------------
// Issuer
// ---------------------------------------------------------------------------

/// Mints access and refresh credentials.
pub struct TokenIssuer {
    keys: Arc<CredentialKeys>,
}

impl TokenIssuer {
    pub fn new(keys: Arc<CredentialKeys>) -> Self {
        Self { keys }
    }

    pub fn mint_access(
        &self,
        subject: &str,
        role: Role,
        permissions: &[Permission],
    ) -> Result<MintedToken, AuthError> {
        let permissions = permissions.iter().map(|p| p.as_str().to_string()).collect();
        self.mint(TokenKind::Access, subject, role, permissions, ACCESS_TTL_SECS)
    }

    pub fn mint_refresh(&self, subject: &str, role: Role) -> Result<MintedToken, AuthError> {
        self.mint(TokenKind::Refresh, subject, role, Vec::new(), REFRESH_TTL_SECS)
    }

    /// Mint a credential with an explicit lifetime; negative values produce
    /// an already-expired credential.
    pub fn mint_with_ttl(
        &self,
        kind: TokenKind,
        subject: &str,
        role: Role,
        permissions: &[Permission],
        ttl_secs: i64,
    ) -> Result<MintedToken, AuthError> {
        let permissions = permissions.iter().map(|p| p.as_str().to_string()).collect();
        self.mint(kind, subject, role, permissions, ttl_secs)
    }

    fn mint(
        &self,
        kind: TokenKind,
        subject: &str,
        role: Role,
        permissions: Vec<String>,
        ttl_secs: i64,
    ) -> Result<MintedToken, AuthError> {
        let now = Utc::now();
        let jti = prefixed_ulid(match kind {
            TokenKind::Access => prefix::ACCESS_TOKEN,
            TokenKind::Refresh => prefix::REFRESH_TOKEN,
        });
        let claims = CredentialClaims {
            iss: self.keys.issuer.clone(),
            aud: self.keys.audience.clone(),
            sub: subject.to_string(),
            exp: (now + Duration::seconds(ttl_secs)).timestamp(),
            iat: now.timestamp(),
            jti: jti.clone(),
            role,
            permissions,
            typ: kind,
        };

        let keys = self.keys.keys(kind);
        let mut header = Header::new(Algorithm::EdDSA);
        header.kid = Some(keys.kid.clone());

        let token = jsonwebtoken::encode(&header, &claims, &keys.encoding).map_err(|e| {
            tracing::error!(?e, "failed to sign credential");
            AuthError::InvalidCredential("credential signing failed")
        })?;

        Ok(MintedToken {
            token,
            jti,
            expires_at: claims.exp,
        })
    }
}

// ---------------------------------------------------------------------------
// Verifier
// ---------------------------------------------------------------------------

/// Validates bearer credentials and tracks revocations.
pub struct CredentialVerifier {
    keys: Arc<CredentialKeys>,
    revocations: Arc<dyn KeyValueStore>,
}

impl CredentialVerifier {
    pub fn new(keys: Arc<CredentialKeys>, revocations: Arc<dyn KeyValueStore>) -> Self {
        Self { keys, revocations }
    }

    /// Verify an access credential, including revocation of the token itself
    /// and of every session of its subject.
    pub async fn verify(&self, token: &str) -> Result<OperatorIdentity, AuthError> {
        let claims = self.keys.decode(TokenKind::Access, token)?;

        if self.lookup(&jti_key(&claims.jti)).await?.is_some() {
            return Err(AuthError::InvalidCredential("credential revoked"));
        }

        if let Some(revoked_at) = self.lookup(&subject_key(&claims.sub)).await? {
            let revoked_at: i64 = revoked_at.parse().unwrap_or(i64::MAX);
            if claims.iat <= revoked_at {
                return Err(AuthError::InvalidCredential("session invalidated"));
            }
        }

        Ok(OperatorIdentity::from_claims(claims))
    }

    /// Verify signature, expiry, issuer, and audience only.
    ///
    /// Used by the change feed, which must keep serving a subject whose
    /// sessions were invalidated by a ban so the client can learn about it.
    pub fn verify_signature(&self, token: &str) -> Result<OperatorIdentity, AuthError> {
        self.keys
            .decode(TokenKind::Access, token)
            .map(OperatorIdentity::from_claims)
    }

    /// Decode a refresh credential. Whether it is still on record is the
    /// login service's concern.
    pub fn decode_refresh(&self, token: &str) -> Result<CredentialClaims, AuthError> {
        self.keys.decode(TokenKind::Refresh, token)
    }

    /// Revoke a single access credential until it would have expired anyway.
    pub async fn revoke_token(&self, jti: &str, expires_at: i64) -> Result<(), AuthError> {
        let ttl = (expires_at - Utc::now().timestamp()).max(1) as u64;
        self.revocations
            .set_ex(&jti_key(jti), "1", ttl)
            .await
            .map_err(|_| AuthError::RevocationUnavailable)
    }

    /// Invalidate every credential issued to `subject` up to now.
    pub async fn revoke_subject(&self, subject: &str) -> Result<(), AuthError> {
        let now = Utc::now().timestamp();
        self.revocations
            .set_ex(&subject_key(subject), &now.to_string(), REFRESH_TTL_SECS as u64)
            .await
            .map_err(|_| AuthError::RevocationUnavailable)
    }

    async fn lookup(&self, key: &str) -> Result<Option<String>, AuthError> {
        self.revocations
            .get(key)
            .await
            .map_err(|_| AuthError::RevocationUnavailable)
    }
}

fn jti_key(jti: &str) -> String {
    format!("warden:revoked_jti:{jti}")
}

fn subject_key(subject: &str) -> String {
    format!("warden:revoked_sub:{subject}")
}
