use std::fmt::Display;
use std::ops::{Deref, DerefMut};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{
    api::admin::AdminCredentials,
    mongodb::{Coll, Id},
};

/// Username of the supervisor account created on first launch.
pub const DEFAULT_ADMIN_USERNAME: &str = "admin";

/// What an admin is allowed to do.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminRole {
    /// Manages candidates, voters and the election lifecycle.
    Officer,
    /// Everything an officer can do, plus managing admins and candidate flags.
    Supervisor,
}

impl Display for AdminRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Officer => write!(f, "officer"),
            Self::Supervisor => write!(f, "supervisor"),
        }
    }
}

/// Core admin user data.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminCore {
    pub username: String,
    pub password_hash: String,
    pub role: AdminRole,
}

impl AdminCore {
    /// Check whether the given password is correct.
    pub fn verify_password<T: AsRef<[u8]>>(&self, password: T) -> bool {
        argon2::verify_encoded(&self.password_hash, password.as_ref()).unwrap_or(false)
    }
}

/// An admin without an ID.
pub type NewAdmin = AdminCore;

/// An admin user from the database, with its unique ID.
#[derive(Debug, Serialize, Deserialize)]
pub struct Admin {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub admin: AdminCore,
}

impl Deref for Admin {
    type Target = AdminCore;

    fn deref(&self) -> &Self::Target {
        &self.admin
    }
}

impl DerefMut for Admin {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.admin
    }
}

/// Make sure somebody can log in to administer a fresh database, by creating
/// a supervisor with the configured password if there are no admins at all.
pub async fn ensure_admin_exists(admins: &Coll<NewAdmin>, password: Option<String>) -> Result<()> {
    let count = admins.count_documents(None, None).await?;
    if count > 0 {
        return Ok(());
    }
    let password = match password {
        Some(password) => password,
        None => {
            warn!("No admins exist and no `default_admin_password` is set; nobody can log in");
            return Ok(());
        }
    };
    let credentials = AdminCredentials {
        username: DEFAULT_ADMIN_USERNAME.to_string(),
        password,
    };
    let admin = credentials.into_admin(AdminRole::Supervisor)?;
    admins.insert_one(admin, None).await?;
    warn!("Created default supervisor '{DEFAULT_ADMIN_USERNAME}', change its password");
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_verification() {
        let admin = NewAdmin::example();
        assert!(admin.verify_password(AdminCredentials::example1().password));
        assert!(!admin.verify_password("wrong password"));

        let garbled = NewAdmin {
            password_hash: "not a hash".to_string(),
            ..NewAdmin::example()
        };
        assert!(!garbled.verify_password(AdminCredentials::example1().password));
    }
}
