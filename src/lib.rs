#[macro_use]
extern crate rocket;

#[macro_use]
extern crate log;

#[cfg(test)]
#[macro_use]
extern crate backend_test;

use rocket::{Build, Rocket};

use crate::config::{ConfigFairing, DatabaseFairing, NotifierFairing};
use crate::lifecycle::LifecycleCheckerFairing;
use crate::logging::LoggerFairing;

pub mod api;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod model;
pub mod notifier;

pub use config::Config;

/// Assemble the full server: configuration, database, notifications,
/// the background lifecycle checker, and all routes.
pub fn build() -> Rocket<Build> {
    rocket::build()
        .attach(LoggerFairing)
        .attach(ConfigFairing)
        .attach(DatabaseFairing)
        .attach(NotifierFairing)
        .attach(LifecycleCheckerFairing)
        .mount("/", api::routes())
        .register("/", api::catchers())
}

/// Get a handle on the database client configured for the tests.
#[cfg(test)]
async fn db_client() -> mongodb::Client {
    let db_uri = rocket::Config::figment()
        .extract_inner::<String>("db_uri")
        .expect("`db_uri` not set");
    mongodb::Client::with_uri_str(db_uri).await.unwrap()
}

/// A fresh database name per test, so tests can run in parallel.
#[cfg(test)]
fn database() -> String {
    let random: u32 = rand::random();
    format!("test{random}")
}

/// A server instance for tests, using the given database and no background
/// checker or notification dispatch.
#[cfg(test)]
async fn rocket_for_db(client: mongodb::Client, db_name: &str) -> Rocket<Build> {
    logging::init_test_logging();

    let db = client.database(db_name);
    model::mongodb::ensure_indexes_exist(&db).await.unwrap();

    rocket::build()
        .attach(ConfigFairing)
        .manage(client)
        .manage(db)
        .manage(notifier::Notifier::disabled())
        .mount("/", api::routes())
        .register("/", api::catchers())
}
