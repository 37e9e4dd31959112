#[macro_use]
extern crate rocket;

#[cfg(test)]
#[macro_use]
extern crate backend_test;

use rocket::{Build, Rocket};

pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;

pub use config::Config;

use config::{ConfigFairing, LedgerFairing};
use logging::LoggerFairing;
use model::ledger::Ledger;

/// Assemble the server: config, then the ledger rebuilt from its store.
pub fn build() -> Rocket<Build> {
    rocket::build()
        .mount("/", api::routes())
        .attach(LoggerFairing)
        .attach(ConfigFairing)
        .attach(LedgerFairing)
}

/// Assemble the server around an already-open ledger.
pub fn rocket_for_ledger(rocket: Rocket<Build>, ledger: Ledger) -> Rocket<Build> {
    rocket
        .mount("/", api::routes())
        .attach(LoggerFairing)
        .attach(ConfigFairing)
        .manage(ledger)
}
