mod token;
mod user;

pub use token::{AuthToken, Supervisor, AUTH_TOKEN_COOKIE};
pub use user::{Rights, User};
