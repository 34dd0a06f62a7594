use mongodb::bson::doc;
use rocket::{
    http::{Cookie, CookieJar, Status},
    serde::json::Json,
    Route, State,
};

use crate::{
    error::{Error, Result},
    model::{
        api::{
            admin::AdminCredentials,
            auth::{AuthToken, AUTH_TOKEN_COOKIE},
            voter::VoterCredentials,
        },
        db::{admin::Admin, voter::Voter},
        mongodb::Coll,
    },
    Config,
};

pub fn routes() -> Vec<Route> {
    routes![authenticate_admin, authenticate_voter, logout]
}

#[post("/auth/admin", data = "<credentials>", format = "json")]
pub async fn authenticate_admin(
    cookies: &CookieJar<'_>,
    credentials: Json<AdminCredentials>,
    admins: Coll<Admin>,
    config: &State<Config>,
) -> Result<()> {
    let with_username = doc! {
        "username": &credentials.username
    };

    let admin = admins
        .find_one(with_username, None)
        .await?
        .filter(|admin| admin.verify_password(&credentials.password))
        .ok_or_else(|| {
            Error::Status(
                Status::Unauthorized,
                "No admin found with the provided username and password combination.".to_string(),
            )
        })?;

    let token = AuthToken::new(&admin);
    cookies.add(token.into_cookie(config)?);
    info!("Admin {} ({}) logged in", admin.username, admin.role);

    Ok(())
}

#[post("/auth/voter", data = "<credentials>", format = "json")]
pub async fn authenticate_voter(
    cookies: &CookieJar<'_>,
    credentials: Json<VoterCredentials>,
    voters: Coll<Voter>,
    config: &State<Config>,
) -> Result<()> {
    let with_student_id = doc! {
        "student_id": &credentials.student_id
    };

    let voter = voters
        .find_one(with_student_id, None)
        .await?
        .filter(|voter| voter.verify_password(&credentials.password))
        .ok_or_else(|| {
            Error::Status(
                Status::Unauthorized,
                "No voter found with the provided student ID and password combination."
                    .to_string(),
            )
        })?;

    let token = AuthToken::new(&voter);
    cookies.add(token.into_cookie(config)?);

    Ok(())
}

#[delete("/auth")]
pub async fn logout(cookies: &CookieJar<'_>) {
    cookies.remove(Cookie::from(AUTH_TOKEN_COOKIE));
}

#[cfg(test)]
mod tests {
    use mongodb::Database;
    use rocket::{http::ContentType, local::asynchronous::Client, serde::json::serde_json};

    use crate::model::db::{admin::NewAdmin, voter::NewVoter};

    use super::*;

    #[backend_test]
    async fn admin_login(client: Client, db: Database) {
        Coll::<NewAdmin>::from_db(&db)
            .insert_one(NewAdmin::example(), None)
            .await
            .unwrap();

        let wrong = AdminCredentials {
            password: "not the password".to_string(),
            ..AdminCredentials::example1()
        };
        let response = client
            .post(uri!(authenticate_admin))
            .header(ContentType::JSON)
            .body(serde_json::to_string(&wrong).unwrap())
            .dispatch()
            .await;
        assert_eq!(Status::Unauthorized, response.status());
        assert!(response.cookies().get(AUTH_TOKEN_COOKIE).is_none());

        let response = client
            .post(uri!(authenticate_admin))
            .header(ContentType::JSON)
            .body(serde_json::to_string(&AdminCredentials::example1()).unwrap())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        assert!(response.cookies().get(AUTH_TOKEN_COOKIE).is_some());

        let response = client.delete(uri!(logout)).dispatch().await;
        assert_eq!(Status::Ok, response.status());
        assert!(client.cookies().get(AUTH_TOKEN_COOKIE).is_none());
    }

    #[backend_test]
    async fn voter_login(client: Client, db: Database) {
        Coll::<NewVoter>::from_db(&db)
            .insert_one(NewVoter::example(), None)
            .await
            .unwrap();

        let response = client
            .post(uri!(authenticate_voter))
            .header(ContentType::JSON)
            .body(serde_json::to_string(&VoterCredentials::example2()).unwrap())
            .dispatch()
            .await;
        assert_eq!(Status::Unauthorized, response.status());

        let response = client
            .post(uri!(authenticate_voter))
            .header(ContentType::JSON)
            .body(serde_json::to_string(&VoterCredentials::example()).unwrap())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        assert!(response.cookies().get(AUTH_TOKEN_COOKIE).is_some());
    }
}
