//! Password and one-time token lifecycle of a [`User`].
//!
//! Every check takes `now` explicitly. Verification tokens live 24 hours,
//! reset tokens one hour, both counted from issuance, and both are cleared
//! after their first successful use. Failures collapse to `false`; the
//! reason only reaches the log.

use time::{Duration, OffsetDateTime};
use tracing::{debug, error};

use super::repo_types::User;
use crate::auth::{
    password::{hash_password, verify_password},
    services::random_alphanumeric,
};

pub const TOKEN_LEN: usize = 32;
pub const EMAIL_VERIFICATION_TTL: Duration = Duration::hours(24);
pub const PASSWORD_RESET_TTL: Duration = Duration::hours(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenRejection {
    NotIssued,
    Mismatch,
    Expired,
}

fn check_token(
    stored: Option<&str>,
    issued_at: Option<OffsetDateTime>,
    presented: &str,
    ttl: Duration,
    now: OffsetDateTime,
) -> Result<(), TokenRejection> {
    let stored = stored.ok_or(TokenRejection::NotIssued)?;
    if !constant_time_eq(stored.as_bytes(), presented.as_bytes()) {
        return Err(TokenRejection::Mismatch);
    }
    // a token without an issuance stamp cannot prove its age
    let issued_at = issued_at.ok_or(TokenRejection::Expired)?;
    if now - issued_at > ttl {
        return Err(TokenRejection::Expired);
    }
    Ok(())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

impl User {
    pub fn set_password(&mut self, plain: &str, now: OffsetDateTime) -> anyhow::Result<()> {
        self.password_hash = hash_password(plain)?;
        self.updated_at = now;
        Ok(())
    }

    /// A malformed stored hash counts as a mismatch.
    pub fn check_password(&self, plain: &str) -> bool {
        match verify_password(plain, &self.password_hash) {
            Ok(ok) => ok,
            Err(e) => {
                error!(user_id = %self.id, error = %e, "stored password hash unreadable");
                false
            }
        }
    }

    /// Replaces any outstanding verification token.
    pub fn generate_verification_token(&mut self, now: OffsetDateTime) -> String {
        let token = random_alphanumeric(TOKEN_LEN);
        self.email_verification_token = Some(token.clone());
        self.email_verification_sent_at = Some(now);
        token
    }

    pub fn verify_email(&mut self, token: &str, now: OffsetDateTime) -> bool {
        let checked = check_token(
            self.email_verification_token.as_deref(),
            self.email_verification_sent_at,
            token,
            EMAIL_VERIFICATION_TTL,
            now,
        );
        if let Err(reason) = checked {
            debug!(user_id = %self.id, ?reason, "email verification rejected");
            return false;
        }
        self.is_verified = true;
        self.email_verification_token = None;
        self.email_verification_sent_at = None;
        self.updated_at = now;
        true
    }

    /// Replaces any outstanding reset token.
    pub fn generate_password_reset_token(&mut self, now: OffsetDateTime) -> String {
        let token = random_alphanumeric(TOKEN_LEN);
        self.password_reset_token = Some(token.clone());
        self.password_reset_sent_at = Some(now);
        token
    }

    /// `Ok(false)` on a bad or stale token; `Err` only if hashing fails.
    pub fn reset_password(
        &mut self,
        token: &str,
        new_password: &str,
        now: OffsetDateTime,
    ) -> anyhow::Result<bool> {
        let checked = check_token(
            self.password_reset_token.as_deref(),
            self.password_reset_sent_at,
            token,
            PASSWORD_RESET_TTL,
            now,
        );
        if let Err(reason) = checked {
            debug!(user_id = %self.id, ?reason, "password reset rejected");
            return Ok(false);
        }
        self.set_password(new_password, now)?;
        self.password_reset_token = None;
        self.password_reset_sent_at = None;
        Ok(true)
    }

    pub fn update_last_login(&mut self, now: OffsetDateTime) {
        self.last_login = Some(now);
    }
}
