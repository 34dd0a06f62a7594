use std::marker::PhantomData;

use chrono::{serde::ts_seconds, DateTime, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, TokenData, Validation};
use mongodb::Database;
use rocket::{
    http::{Cookie, SameSite, Status},
    request::{FromRequest, Outcome},
    time::Duration,
    Request,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::{
    db::admin::{Admin, AdminRole},
    mongodb::{Coll, Id},
};

use super::user::{Rights, User};

pub const AUTH_TOKEN_COOKIE: &str = "auth_token";

/// An authentication token representing a specific user with specific rights.
#[derive(Serialize, Deserialize)]
pub struct AuthToken<U> {
    pub id: Id,
    #[serde(rename = "rgt")]
    pub rights: Rights,
    #[serde(skip)]
    phantom: PhantomData<U>,
}

impl<U> AuthToken<U> {
    /// Does this token permit the given rights?
    pub fn permits(&self, target: Rights) -> bool {
        self.rights == target
    }
}

impl<U> AuthToken<U>
where
    U: User + DeserializeOwned + Unpin + Send + Sync,
{
    /// Create a new [`AuthToken`] for the given user, with the correct rights for that user type.
    pub fn new(user: &U) -> Self {
        Self {
            id: user.id(),
            rights: U::RIGHTS,
            phantom: PhantomData,
        }
    }

    /// Serialize this token into a cookie.
    pub fn into_cookie(self, config: &Config) -> Result<Cookie<'static>> {
        let claims = Claims {
            token: self,
            expire_at: Utc::now() + config.auth_ttl(),
        };

        let token = jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.jwt_secret()),
        )?;

        Ok(Cookie::build((AUTH_TOKEN_COOKIE, token))
            .max_age(Duration::seconds(config.auth_ttl().num_seconds()))
            .http_only(true)
            .same_site(SameSite::Strict)
            .build())
    }

    /// Deserialize a token from a cookie.
    pub fn from_cookie(cookie: &Cookie<'static>, config: &Config) -> Result<Self> {
        let token = jsonwebtoken::decode(
            cookie.value(),
            &DecodingKey::from_secret(config.jwt_secret()),
            &Validation::default(),
        )
        .map(|claims: TokenData<Claims<U>>| claims.claims.token)?;
        Ok(token)
    }

    /// Load the user this token belongs to.
    pub async fn user(&self, users: &Coll<U>) -> Result<U> {
        users
            .find_one(self.id.as_doc(), None)
            .await?
            .ok_or_else(|| Error::not_found(format!("{} {}", U::RIGHTS, self.id)))
    }
}

/// Cookie claims: the token itself plus an expiry datetime.
#[derive(Serialize, Deserialize)]
struct Claims<U> {
    #[serde(flatten, bound = "")]
    token: AuthToken<U>,
    #[serde(rename = "exp", with = "ts_seconds")]
    expire_at: DateTime<Utc>,
}

fn unauthorized(msg: &str) -> (Status, Error) {
    (
        Status::Unauthorized,
        Error::Status(Status::Unauthorized, msg.to_string()),
    )
}

#[rocket::async_trait]
impl<'r, U> FromRequest<'r> for AuthToken<U>
where
    U: User + DeserializeOwned + Unpin + Send + Sync,
{
    type Error = Error;

    /// Get an [`AuthToken`] from the cookie and verify that it has the correct rights for this user
    /// type, and that the user still exists.
    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let (config, db) = match (req.rocket().state::<Config>(), req.rocket().state::<Database>()) {
            (Some(config), Some(db)) => (config, db),
            _ => {
                let msg = "Config or database missing from managed state";
                error!("{msg}");
                let status = Status::InternalServerError;
                return Outcome::Error((status, Error::Status(status, msg.to_string())));
            }
        };

        let cookie = match req.cookies().get(AUTH_TOKEN_COOKIE) {
            Some(cookie) => cookie,
            None => return Outcome::Error(unauthorized("Not logged in")),
        };
        let token: Self = match Self::from_cookie(cookie, config) {
            Ok(token) => token,
            Err(_) => return Outcome::Error(unauthorized("Invalid or expired login")),
        };

        // Check it represents the correct rights.
        if !token.permits(U::RIGHTS) {
            let msg = format!("This action requires {} rights", U::RIGHTS);
            return Outcome::Error((Status::Forbidden, Error::Status(Status::Forbidden, msg)));
        }

        // Check the user actually exists.
        match token.user(&Coll::<U>::from_db(db)).await {
            Ok(_) => Outcome::Success(token),
            Err(Error::NotFound(_)) => Outcome::Error(unauthorized("User no longer exists")),
            Err(e) => Outcome::Error((Status::InternalServerError, e)),
        }
    }
}

/// A logged-in admin holding the supervisor role.
pub struct Supervisor(pub Admin);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Supervisor {
    type Error = Error;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let token = match req.guard::<AuthToken<Admin>>().await {
            Outcome::Success(token) => token,
            Outcome::Error(e) => return Outcome::Error(e),
            Outcome::Forward(status) => return Outcome::Forward(status),
        };
        let admins = match req.guard::<Coll<Admin>>().await {
            Outcome::Success(admins) => admins,
            _ => {
                let status = Status::InternalServerError;
                let err = Error::Status(status, "Database unavailable".to_string());
                return Outcome::Error((status, err));
            }
        };
        match token.user(&admins).await {
            Ok(admin) if admin.role == AdminRole::Supervisor => Outcome::Success(Supervisor(admin)),
            Ok(admin) => {
                warn!(
                    "Admin '{}' with role {} attempted a supervisor action",
                    admin.username, admin.role
                );
                let msg = "This action requires the supervisor role".to_string();
                Outcome::Error((Status::Forbidden, Error::Status(Status::Forbidden, msg)))
            }
            Err(e) => Outcome::Error((e.status(), e)),
        }
    }
}
