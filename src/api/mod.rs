use rocket::{http::Status, serde::json::Json, Catcher, Request, Route};

use crate::error::ErrorBody;

mod admin;
mod audit;
pub(crate) mod auth;
mod election;
mod rigging;
mod voting;

pub fn routes() -> Vec<Route> {
    let mut routes = Vec::new();
    routes.extend(auth::routes());
    routes.extend(admin::routes());
    routes.extend(election::routes());
    routes.extend(rigging::routes());
    routes.extend(audit::routes());
    routes.extend(voting::routes());
    routes
}

pub fn catchers() -> Vec<Catcher> {
    catchers![
        bad_request,
        unauthorized,
        forbidden,
        not_found,
        conflict,
        unprocessable,
        internal_error
    ]
}

fn error_body(status: Status, error: &str, req: &Request<'_>) -> Json<ErrorBody> {
    Json(ErrorBody {
        error: error.to_string(),
        message: format!("{} {}: {}", req.method(), req.uri(), status.reason_lossy()),
    })
}

#[catch(400)]
fn bad_request(req: &Request<'_>) -> Json<ErrorBody> {
    error_body(Status::BadRequest, "bad_request", req)
}

#[catch(401)]
fn unauthorized(req: &Request<'_>) -> Json<ErrorBody> {
    error_body(Status::Unauthorized, "unauthorized", req)
}

#[catch(403)]
fn forbidden(req: &Request<'_>) -> Json<ErrorBody> {
    error_body(Status::Forbidden, "forbidden", req)
}

#[catch(404)]
fn not_found(req: &Request<'_>) -> Json<ErrorBody> {
    error_body(Status::NotFound, "not_found", req)
}

#[catch(409)]
fn conflict(req: &Request<'_>) -> Json<ErrorBody> {
    error_body(Status::Conflict, "conflict", req)
}

#[catch(422)]
fn unprocessable(req: &Request<'_>) -> Json<ErrorBody> {
    error_body(Status::UnprocessableEntity, "validation", req)
}

#[catch(500)]
fn internal_error(req: &Request<'_>) -> Json<ErrorBody> {
    error_body(Status::InternalServerError, "unexpected", req)
}
