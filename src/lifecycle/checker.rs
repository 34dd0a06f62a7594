use chrono::Utc;
use mongodb::Database;
use rocket::{
    fairing::{Fairing, Info, Kind},
    tokio::{self, time::MissedTickBehavior},
    Orbit, Rocket,
};

use crate::error::Result;
use crate::model::{
    db::{
        election::{ActiveElection, Election},
        election_log::Actor,
    },
    mongodb::Coll,
};
use crate::notifier::Notifier;
use crate::Config;

use super::apply_transition;

/// Apply whatever transition is due on the active election right now.
///
/// Returns the updated election if this call changed it. Safe to run
/// concurrently: at most one caller applies any given transition.
pub async fn check_once(db: &Database, notifier: &Notifier) -> Result<Option<Election>> {
    let election = match ActiveElection::load(&Coll::from_db(db), &Coll::from_db(db)).await? {
        Some(election) => election,
        None => {
            trace!("No active election to check");
            return Ok(None);
        }
    };
    let transition = match election.schedule.due_transition(Utc::now()) {
        Some(transition) => transition,
        None => return Ok(None),
    };
    debug!("Election {} is due to {transition}", election.id);
    apply_transition(db, &election, transition, &Actor::system(), notifier).await
}

/// A fairing that starts the background lifecycle checker once the server
/// is running, and stops it on shutdown.
///
/// This fairing depends on the `Config`, `Database` and `Notifier` being in
/// managed state.
pub struct LifecycleCheckerFairing;

#[rocket::async_trait]
impl Fairing for LifecycleCheckerFairing {
    fn info(&self) -> Info {
        Info {
            name: "Lifecycle checker",
            kind: Kind::Liftoff,
        }
    }

    async fn on_liftoff(&self, rocket: &Rocket<Orbit>) {
        let (interval, db, notifier) = match (
            rocket.state::<Config>(),
            rocket.state::<Database>(),
            rocket.state::<Notifier>(),
        ) {
            (Some(config), Some(db), Some(notifier)) => (
                config.lifecycle_check_interval(),
                db.clone(),
                notifier.clone(),
            ),
            _ => {
                error!("Lifecycle checker is missing managed state; elections will not advance on their own");
                return;
            }
        };
        let mut shutdown = rocket.shutdown();

        tokio::spawn(async move {
            info!("Checking election status every {}s", interval.as_secs());
            let mut ticks = tokio::time::interval(interval);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticks.tick() => {
                        if let Err(e) = check_once(&db, &notifier).await {
                            error!("Election status check failed, will retry: {e}");
                        }
                    }
                    _ = &mut shutdown => {
                        debug!("Lifecycle checker stopped");
                        break;
                    }
                }
            }
        });
    }
}
