use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{Role, User, UserId};

type HmacSha256 = Hmac<Sha256>;

const TOKEN_VERSION: &str = "v1";
const PASSWORD_ROUNDS: u32 = 10_000;
const PASSWORD_SPECIALS: &str = "!@#$%^&*";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("token signing secret must not be empty")]
    EmptySecret,

    #[error("malformed token")]
    Malformed,

    #[error("invalid token signature")]
    BadSignature,

    #[error("token expired")]
    Expired,
}

/// Identity carried by a verified bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    pub user_id: UserId,
    pub role: Role,
    pub expires_at: DateTime<Utc>,
}

/// Issues and verifies `v1.<user>.<role>.<expiry>.<hmac>` bearer tokens.
#[derive(Clone)]
pub struct TokenSigner {
    mac: HmacSha256,
    ttl: Duration,
}

impl TokenSigner {
    pub fn new(secret: &[u8], ttl: Duration) -> Result<Self, AuthError> {
        if secret.is_empty() {
            return Err(AuthError::EmptySecret);
        }
        let mac = HmacSha256::new_from_slice(secret).map_err(|_| AuthError::EmptySecret)?;
        Ok(Self { mac, ttl })
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(&self, user: &User, now: DateTime<Utc>) -> String {
        let expires_at = now + self.ttl;
        let payload = format!(
            "{}.{}.{}.{}",
            TOKEN_VERSION,
            user.id.simple(),
            user.role.as_str(),
            expires_at.timestamp()
        );
        let signature = self.sign(&payload);
        format!("{}.{}", payload, signature)
    }

    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<TokenClaims, AuthError> {
        let (payload, signature) = token.rsplit_once('.').ok_or(AuthError::Malformed)?;
        let signature = hex::decode(signature).map_err(|_| AuthError::Malformed)?;

        let mut mac = self.mac.clone();
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| AuthError::BadSignature)?;

        let parts: Vec<&str> = payload.split('.').collect();
        let [version, user_id, role, expiry] = parts.as_slice() else {
            return Err(AuthError::Malformed);
        };
        if *version != TOKEN_VERSION {
            return Err(AuthError::Malformed);
        }

        let user_id = Uuid::parse_str(user_id).map_err(|_| AuthError::Malformed)?;
        let role = Role::from_str(role).ok_or(AuthError::Malformed)?;
        let expires_at = expiry
            .parse::<i64>()
            .ok()
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
            .ok_or(AuthError::Malformed)?;

        if expires_at <= now {
            return Err(AuthError::Expired);
        }

        Ok(TokenClaims {
            user_id,
            role,
            expires_at,
        })
    }

    fn sign(&self, payload: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

/// Salted, iterated SHA-256. Stored as `<salt>$<hex digest>`.
pub fn hash_password(password: &str) -> String {
    let salt = Uuid::new_v4().simple().to_string();
    let digest = password_digest(&salt, password);
    format!("{}${}", salt, digest)
}

pub fn verify_password(password: &str, stored: &str) -> bool {
    let Some((salt, expected)) = stored.split_once('$') else {
        return false;
    };
    let actual = password_digest(salt, password);
    constant_time_eq(actual.as_bytes(), expected.as_bytes())
}

fn password_digest(salt: &str, password: &str) -> String {
    let mut state = Sha256::new()
        .chain_update(salt.as_bytes())
        .chain_update(password.as_bytes())
        .finalize();
    for _ in 1..PASSWORD_ROUNDS {
        state = Sha256::new()
            .chain_update(salt.as_bytes())
            .chain_update(state)
            .finalize();
    }
    hex::encode(state)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// At least 8 characters with upper, lower, digit and one of `!@#$%^&*`.
pub fn validate_password(password: &str) -> Result<(), String> {
    if password.chars().count() < 8 {
        return Err("Password must be at least 8 characters".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err("Password must contain at least one uppercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return Err("Password must contain at least one lowercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err("Password must contain at least one number".to_string());
    }
    if !password.chars().any(|c| PASSWORD_SPECIALS.contains(c)) {
        return Err(format!(
            "Password must contain at least one special character ({})",
            PASSWORD_SPECIALS
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> TokenSigner {
        TokenSigner::new(b"test-secret", Duration::hours(1)).unwrap()
    }

    fn sample_user(role: Role) -> User {
        User::new("Meera", "meera@example.com", "9123456780", role, String::new())
    }

    #[test]
    fn test_token_roundtrip() {
        let signer = signer();
        let user = sample_user(Role::Admin);
        let now = Utc::now();

        let token = signer.issue(&user, now);
        let claims = signer.verify(&token, now).unwrap();

        assert_eq!(claims.user_id, user.id);
        assert_eq!(claims.role, Role::Admin);
    }

    #[test]
    fn test_token_expires() {
        let signer = signer();
        let now = Utc::now();
        let token = signer.issue(&sample_user(Role::User), now);

        assert_eq!(
            signer.verify(&token, now + Duration::hours(2)),
            Err(AuthError::Expired)
        );
    }

    #[test]
    fn test_tampered_token_is_rejected() {
        let signer = signer();
        let now = Utc::now();
        let token = signer.issue(&sample_user(Role::User), now);
        let forged = token.replacen(".user.", ".admin.", 1);

        assert_eq!(signer.verify(&forged, now), Err(AuthError::BadSignature));
    }

    #[test]
    fn test_token_from_other_secret_is_rejected() {
        let now = Utc::now();
        let token = signer().issue(&sample_user(Role::User), now);
        let other = TokenSigner::new(b"another-secret", Duration::hours(1)).unwrap();

        assert_eq!(other.verify(&token, now), Err(AuthError::BadSignature));
    }

    #[test]
    fn test_garbage_token_is_malformed() {
        let signer = signer();
        assert_eq!(signer.verify("not-a-token", Utc::now()), Err(AuthError::Malformed));
        assert_eq!(signer.verify("a.b.zz", Utc::now()), Err(AuthError::Malformed));
    }

    #[test]
    fn test_empty_secret_is_refused() {
        assert!(matches!(
            TokenSigner::new(b"", Duration::hours(1)),
            Err(AuthError::EmptySecret)
        ));
    }

    #[test]
    fn test_password_hash_and_verify() {
        let stored = hash_password("Str0ng!pass");
        assert!(verify_password("Str0ng!pass", &stored));
        assert!(!verify_password("Str0ng!Pass", &stored));
        assert!(!verify_password("Str0ng!pass", "no-separator"));
    }

    #[test]
    fn test_password_hashes_are_salted() {
        assert_ne!(hash_password("Str0ng!pass"), hash_password("Str0ng!pass"));
    }

    #[test]
    fn test_password_rules() {
        assert!(validate_password("Str0ng!pass").is_ok());
        assert!(validate_password("Sh0rt!").is_err());
        assert!(validate_password("alllower1!").is_err());
        assert!(validate_password("ALLUPPER1!").is_err());
        assert!(validate_password("NoDigits!!").is_err());
        assert!(validate_password("NoSpecial11").is_err());
    }
}
