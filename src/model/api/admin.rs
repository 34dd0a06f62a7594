use argon2::Config;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::db::admin::{AdminRole, NewAdmin};

pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Hash a password with a fresh random salt.
pub(crate) fn hash_password(password: &str) -> Result<String> {
    // 16 bytes is recommended for password hashing:
    //  https://en.wikipedia.org/wiki/Argon2
    let mut salt = [0_u8; 16];
    rand::thread_rng().fill(&mut salt);
    Ok(argon2::hash_encoded(
        password.as_bytes(),
        &salt,
        &Config::default(),
    )?)
}

/// Raw admin credentials, received from a user. These are never stored directly,
/// since the password is in plaintext.
#[derive(Clone, Deserialize, Serialize)]
pub struct AdminCredentials {
    pub username: String,
    pub password: String,
}

impl AdminCredentials {
    /// Convert to a new admin with the given role by hashing the password.
    /// This enforces that the username is non-empty, and the password meets minimum length.
    pub fn into_admin(self, role: AdminRole) -> Result<NewAdmin> {
        if self.username.trim().is_empty() {
            return Err(Error::Validation("Username must not be empty".to_string()));
        }
        if self.password.len() < MIN_PASSWORD_LENGTH {
            return Err(Error::Validation(format!(
                "Password must be at least {MIN_PASSWORD_LENGTH} characters"
            )));
        }
        Ok(NewAdmin {
            password_hash: hash_password(&self.password)?,
            username: self.username,
            role,
        })
    }
}

/// A request to create a new admin account.
#[derive(Clone, Deserialize, Serialize)]
pub struct NewAdminRequest {
    #[serde(flatten)]
    pub credentials: AdminCredentials,
    pub role: AdminRole,
}

/// What other admins can see about an admin.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AdminDescription {
    pub username: String,
    pub role: AdminRole,
}

#[cfg(test)]
mod examples {
    use super::*;

    impl AdminCredentials {
        pub fn example1() -> Self {
            Self {
                username: "coordinator".into(),
                password: "ballotbox2026".into(),
            }
        }

        pub fn example2() -> Self {
            Self {
                username: "returning-officer".into(),
                password: "totallysecurepassword".into(),
            }
        }

        pub fn supervisor_example() -> Self {
            Self {
                username: "chief-supervisor".into(),
                password: "supervise-all-the-things".into(),
            }
        }
    }
}
