use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    api::{admin::hash_password, id::ApiId},
    db::voter::{NewVoter, Voter},
};

/// Credentials a voter logs in with.
#[derive(Clone, Deserialize, Serialize)]
pub struct VoterCredentials {
    pub student_id: String,
    pub password: String,
}

/// An admin's request to register a voter.
#[derive(Clone, Deserialize, Serialize)]
pub struct VoterSpec {
    pub student_id: String,
    pub name: String,
    pub password: String,
}

impl TryFrom<VoterSpec> for NewVoter {
    type Error = Error;

    fn try_from(spec: VoterSpec) -> Result<Self> {
        if spec.student_id.trim().is_empty() || spec.name.trim().is_empty() {
            return Err(Error::Validation(
                "Student ID and name must not be empty".to_string(),
            ));
        }
        if spec.password.len() < super::admin::MIN_PASSWORD_LENGTH {
            return Err(Error::Validation(format!(
                "Password must be at least {} characters",
                super::admin::MIN_PASSWORD_LENGTH
            )));
        }
        Ok(NewVoter {
            student_id: spec.student_id,
            name: spec.name,
            password_hash: hash_password(&spec.password)?,
            voted_positions: Default::default(),
        })
    }
}

/// A registered voter, as shown to admins.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct VoterDescription {
    pub id: ApiId,
    pub student_id: String,
    pub name: String,
}

impl From<Voter> for VoterDescription {
    fn from(voter: Voter) -> Self {
        Self {
            id: voter.id.into(),
            student_id: voter.voter.student_id,
            name: voter.voter.name,
        }
    }
}

#[cfg(test)]
mod examples {
    use super::*;

    impl VoterSpec {
        pub fn example() -> Self {
            Self {
                student_id: "s1234567".into(),
                name: "Sam Student".into(),
                password: "correct horse battery".into(),
            }
        }

        pub fn example2() -> Self {
            Self {
                student_id: "s7654321".into(),
                name: "Riley Reader".into(),
                password: "staple paperclip".into(),
            }
        }
    }

    impl VoterCredentials {
        pub fn example() -> Self {
            let spec = VoterSpec::example();
            Self {
                student_id: spec.student_id,
                password: spec.password,
            }
        }

        pub fn example2() -> Self {
            let spec = VoterSpec::example2();
            Self {
                student_id: spec.student_id,
                password: spec.password,
            }
        }
    }
}
