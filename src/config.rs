use chrono::Duration;
use mongodb::Client as MongoClient;
use rocket::{
    fairing::{Fairing, Info, Kind},
    Build, Rocket,
};
use serde::Deserialize;

use crate::model::{
    db::admin::ensure_admin_exists,
    mongodb::{ensure_indexes_exist, Coll},
};
use crate::notifier::Notifier;

/// Default seconds between background election status checks.
const DEFAULT_LIFECYCLE_CHECK_INTERVAL: u32 = 30;

/// Application configuration, derived from `Rocket.toml` and `ROCKET_*`
/// environment variables. This struct becomes managed state and can be
/// inspected by any endpoint.
#[derive(Deserialize)]
pub struct Config {
    // non-secrets
    auth_ttl: u32,
    #[serde(default = "default_lifecycle_check_interval")]
    lifecycle_check_interval: u32,
    // secrets
    jwt_secret: String,
    default_admin_password: Option<String>,
}

fn default_lifecycle_check_interval() -> u32 {
    DEFAULT_LIFECYCLE_CHECK_INTERVAL
}

impl Config {
    /// Valid lifetime of auth token cookies in seconds.
    pub fn auth_ttl(&self) -> Duration {
        Duration::seconds(self.auth_ttl.into())
    }

    /// Time between two runs of the background lifecycle checker.
    pub fn lifecycle_check_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.lifecycle_check_interval.max(1).into())
    }

    /// Secret key used to encrypt JWTs.
    pub fn jwt_secret(&self) -> &[u8] {
        self.jwt_secret.as_bytes()
    }

    /// Password given to the bootstrap supervisor account, if no admins exist yet.
    pub fn default_admin_password(&self) -> Option<&str> {
        self.default_admin_password.as_deref()
    }
}

/// A fairing that loads the application config and puts it in managed state.
/// This could easily be achieved using `AdHoc::config`, but is written out
/// explicitly for symmetry with the other fairings and control over error
/// messages.
pub struct ConfigFairing;

#[rocket::async_trait]
impl Fairing for ConfigFairing {
    fn info(&self) -> Info {
        Info {
            name: "Config",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<Config>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load application config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };

        // Manage the state.
        rocket = rocket.manage(config);
        Ok(rocket)
    }
}

/// Configuration for the database.
#[derive(Deserialize)]
struct DbConfig {
    // secrets
    db_uri: String,
}

/// A fairing that loads the MongoDB config, connects to the database,
/// performs any setup necessary, and places both a `Client` and a `Database`
/// into managed state.
/// This fairing depends on the `Config` being available in managed state,
/// and so must be attached after the `ConfigFairing`.
pub struct DatabaseFairing;

#[rocket::async_trait]
impl Fairing for DatabaseFairing {
    fn info(&self) -> Info {
        Info {
            name: "MongoDB",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<DbConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load database config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        info!("Loaded database config, connecting...");
        // Construct the connection.
        let client = match MongoClient::with_uri_str(config.db_uri).await {
            Ok(client) => client,
            Err(e) => {
                error!("Failed to connect to database: {e}");
                return Err(rocket);
            }
        };
        let db = client.database("unielect");

        // Ensure the required indexes exist.
        if let Err(e) = ensure_indexes_exist(&db).await {
            error!("Failed to create database indexes: {e}");
            return Err(rocket);
        }

        // Ensure there is at least one supervisor who can log in.
        let default_password = rocket
            .state::<Config>()
            .and_then(|config| config.default_admin_password())
            .map(str::to_string);
        if let Err(e) = ensure_admin_exists(&Coll::from_db(&db), default_password).await {
            error!("Failed to bootstrap the admin account: {e}");
            return Err(rocket);
        }
        info!("...database connection online!");

        // Manage the state.
        rocket = rocket.manage(client).manage(db);
        Ok(rocket)
    }
}

/// Configuration for completion notices.
#[derive(Deserialize)]
struct NotifierConfig {
    // non-secrets
    notify_webhook_url: Option<String>,
}

/// A fairing that loads the notification config and places a `Notifier`
/// into managed state. Without a webhook URL, notices are disabled.
pub struct NotifierFairing;

#[rocket::async_trait]
impl Fairing for NotifierFairing {
    fn info(&self) -> Info {
        Info {
            name: "Notifier",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        let config = match rocket.figment().extract::<NotifierConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load notifier config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        let notifier = match config.notify_webhook_url {
            Some(url) => {
                info!("Completion notices will be sent to {url}");
                Notifier::webhook(url)
            }
            None => {
                info!("No notification webhook configured, completion notices disabled");
                Notifier::disabled()
            }
        };

        rocket = rocket.manage(notifier);
        Ok(rocket)
    }
}
