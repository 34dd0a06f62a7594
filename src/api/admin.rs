use mongodb::bson::doc;
use rocket::{
    futures::TryStreamExt, http::Status, response::status::Created, serde::json::Json, Route,
};

use crate::{
    error::{Error, Result},
    model::{
        api::{
            admin::{AdminDescription, NewAdminRequest},
            auth::{AuthToken, Supervisor},
            candidate::{CandidateDescription, CandidateSpec},
            voter::{VoterDescription, VoterSpec},
        },
        db::{
            admin::{Admin, NewAdmin},
            candidate::{Candidate, NewCandidate},
            voter::{NewVoter, Voter},
        },
        mongodb::{is_duplicate_key_error, Coll},
    },
};

pub fn routes() -> Vec<Route> {
    routes![
        get_admins,
        create_admin,
        get_candidates,
        create_candidate,
        get_voters,
        create_voter,
    ]
}

#[get("/admin/admins")]
async fn get_admins(
    _token: AuthToken<Admin>,
    admins: Coll<Admin>,
) -> Result<Json<Vec<AdminDescription>>> {
    let mut admin_list: Vec<Admin> = admins.find(None, None).await?.try_collect().await?;
    admin_list.sort_by(|a, b| a.username.cmp(&b.username));
    let descriptions = admin_list
        .into_iter()
        .map(|admin| AdminDescription {
            username: admin.admin.username,
            role: admin.admin.role,
        })
        .collect();
    Ok(Json(descriptions))
}

/// Only supervisors may create admins.
#[post("/admin/admins", data = "<request>", format = "json")]
async fn create_admin(
    supervisor: Supervisor,
    request: Json<NewAdminRequest>,
    admins: Coll<NewAdmin>,
) -> Result<Created<Json<AdminDescription>>> {
    let request = request.into_inner();
    let admin = request.credentials.into_admin(request.role)?;
    let description = AdminDescription {
        username: admin.username.clone(),
        role: admin.role,
    };
    admins.insert_one(&admin, None).await.map_err(|e| {
        if is_duplicate_key_error(&e) {
            Error::Status(
                Status::Conflict,
                format!("Admin username already in use: {}", admin.username),
            )
        } else {
            e.into()
        }
    })?;
    info!(
        "Supervisor {} created {} {}",
        supervisor.0.username, description.role, description.username
    );
    Ok(Created::new("/admin/admins").body(Json(description)))
}

/// All candidates, as they appear on the ballot.
#[get("/admin/candidates")]
async fn get_candidates(
    _token: AuthToken<Admin>,
    candidates: Coll<Candidate>,
) -> Result<Json<Vec<CandidateDescription>>> {
    let all = Candidate::all(&candidates).await?;
    Ok(Json(all.into_iter().map(Into::into).collect()))
}

#[post("/admin/candidates", data = "<spec>", format = "json")]
async fn create_candidate(
    _token: AuthToken<Admin>,
    spec: Json<CandidateSpec>,
    new_candidates: Coll<NewCandidate>,
) -> Result<Created<Json<CandidateDescription>>> {
    let candidate: NewCandidate = spec.into_inner().try_into()?;
    let id = new_candidates
        .insert_one(&candidate, None)
        .await?
        .inserted_id
        .as_object_id()
        .ok_or_else(|| {
            Error::Status(
                Status::InternalServerError,
                "Inserted ID is not an ObjectId".to_string(),
            )
        })?
        .into();
    let candidate = Candidate { id, candidate };
    info!(
        "Added candidate {} ({}) for {}",
        candidate.id, candidate.name, candidate.position
    );
    Ok(Created::new("/admin/candidates").body(Json(candidate.into())))
}

#[get("/admin/voters")]
async fn get_voters(
    _token: AuthToken<Admin>,
    voters: Coll<Voter>,
) -> Result<Json<Vec<VoterDescription>>> {
    let mut all: Vec<Voter> = voters.find(None, None).await?.try_collect().await?;
    all.sort_by(|a, b| a.student_id.cmp(&b.student_id));
    Ok(Json(all.into_iter().map(Into::into).collect()))
}

#[post("/admin/voters", data = "<spec>", format = "json")]
async fn create_voter(
    _token: AuthToken<Admin>,
    spec: Json<VoterSpec>,
    new_voters: Coll<NewVoter>,
    voters: Coll<Voter>,
) -> Result<Created<Json<VoterDescription>>> {
    let voter: NewVoter = spec.into_inner().try_into()?;
    let student_id = voter.student_id.clone();
    new_voters.insert_one(&voter, None).await.map_err(|e| {
        if is_duplicate_key_error(&e) {
            Error::Status(
                Status::Conflict,
                format!("Student ID already registered: {student_id}"),
            )
        } else {
            e.into()
        }
    })?;
    let voter = voters
        .find_one(doc! { "student_id": &student_id }, None)
        .await?
        .ok_or_else(|| Error::not_found(format!("Voter {student_id}")))?;
    Ok(Created::new("/admin/voters").body(Json(voter.into())))
}
