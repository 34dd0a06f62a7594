use argon2::Error as Argon2Error;
use jsonwebtoken::errors::{Error as JwtError, ErrorKind as JwtErrorKind};
use mongodb::error::Error as DbError;
use rocket::{
    http::Status,
    response::{self, status::Custom, Responder},
    serde::json::Json,
    Request,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::common::election::TransitionError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    BsonSer(#[from] mongodb::bson::ser::Error),
    #[error(transparent)]
    Jwt(#[from] JwtError),
    #[error(transparent)]
    Argon2(#[from] Argon2Error),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    /// A malformed or incomplete ballot, or other invalid input.
    #[error("Validation failed: {0}")]
    Validation(String),
    /// The voter has already submitted their ballot for this election.
    #[error("Voter {0} has already voted in this election")]
    AlreadyVoted(String),
    #[error("Not found: {0}")]
    NotFound(String),
    /// Voting attempted while no election is accepting votes.
    #[error("Election is not accepting votes: {0}")]
    ElectionNotActive(String),
    #[error("{1}")]
    Status(Status, String),
}

impl Error {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// The HTTP status this error is reported with.
    pub fn status(&self) -> Status {
        match self {
            Self::Db(_) | Self::BsonSer(_) | Self::Argon2(_) => Status::InternalServerError,
            Self::Jwt(err) => match err.kind() {
                JwtErrorKind::ExpiredSignature | JwtErrorKind::ImmatureSignature => {
                    Status::Unauthorized
                }
                _ => Status::BadRequest,
            },
            Self::Transition(TransitionError::InvalidWindow { .. }) => Status::BadRequest,
            Self::Transition(_) => Status::Conflict,
            Self::Validation(_) => Status::BadRequest,
            Self::AlreadyVoted(_) => Status::Conflict,
            Self::NotFound(_) => Status::NotFound,
            Self::ElectionNotActive(_) => Status::Forbidden,
            Self::Status(status, _) => *status,
        }
    }

    /// A short machine-readable name for the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::AlreadyVoted(_) => "already_voted",
            Self::NotFound(_) => "not_found",
            Self::ElectionNotActive(_) => "election_not_active",
            Self::Transition(_) => "invalid_transition",
            Self::Jwt(_) => "unauthorized",
            Self::Status(status, _) if status.code == 401 => "unauthorized",
            Self::Status(status, _) if status.code == 403 => "forbidden",
            Self::Status(status, _) if status.code < 500 => "bad_request",
            Self::Db(_) | Self::BsonSer(_) | Self::Argon2(_) | Self::Status(..) => "unexpected",
        }
    }
}

/// The JSON body of every error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'o> {
        let status = self.status();
        // Internal details stay in the logs.
        let message = if status.code >= 500 {
            error!("Unexpected error: {self}");
            "An unexpected error occurred".to_string()
        } else {
            debug!("Request failed: {self}");
            self.to_string()
        };
        let body = ErrorBody {
            error: self.kind().to_string(),
            message,
        };
        Custom(status, Json(body)).respond_to(req)
    }
}
