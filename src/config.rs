use chrono::Duration;
use mongodb::Client as MongoClient;
use rocket::{
    fairing::{Fairing, Info, Kind},
    Build, Rocket,
};
use serde::Deserialize;

use crate::model::{
    guard::{Authority, Identity, SystemClock},
    ledger::Ledger,
    store::{EventStore, MemoryEventStore, MongoEventStore},
};

/// Application configuration, derived from `Rocket.toml` and `ROCKET_*`
/// environment variables. This struct becomes managed state and can be
/// inspected by any endpoint.
#[derive(Deserialize)]
pub struct Config {
    // non-secrets
    administrator: String,
    auth_ttl: u32,
    // secrets
    jwt_secret: String,
}

impl Config {
    /// Identity of the election administrator.
    pub fn administrator(&self) -> Identity {
        Identity::new(self.administrator.as_str())
    }

    /// Valid lifetime of auth token cookies in seconds.
    pub fn auth_ttl(&self) -> Duration {
        Duration::seconds(self.auth_ttl.into())
    }

    /// Secret key used to sign and verify JWTs.
    pub fn jwt_secret(&self) -> &[u8] {
        self.jwt_secret.as_bytes()
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
        if config.administrator().is_empty() {
            error!("The `administrator` identity must not be empty");
            return Err(rocket);
        }

        // Manage the state.
        rocket = rocket.manage(config);
        Ok(rocket)
    }
}

/// Where the event log lives.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    Memory,
    MongoDb,
}

/// Configuration for the event store.
#[derive(Deserialize)]
struct StoreConfig {
    #[serde(default)]
    ledger_store: StoreKind,
    // secrets
    db_uri: Option<String>,
    #[serde(default = "default_db_name")]
    db_name: String,
}

fn default_db_name() -> String {
    "ballot_ledger".to_string()
}

/// A fairing that loads the store config, connects to the event store,
/// rebuilds the ledger from it, and places the `Ledger` into managed state.
///
/// Must be attached after [`ConfigFairing`].
pub struct LedgerFairing;

impl LedgerFairing {
    async fn connect(config: StoreConfig) -> Result<Box<dyn EventStore>, String> {
        match config.ledger_store {
            StoreKind::Memory => {
                warn!("Using an in-memory event store; the ledger will not survive a restart");
                Ok(Box::new(MemoryEventStore::new()))
            }
            StoreKind::MongoDb => {
                let db_uri = config
                    .db_uri
                    .ok_or_else(|| "`db_uri` is required for the mongodb store".to_string())?;
                info!("Loaded database config, connecting...");
                let client = MongoClient::with_uri_str(db_uri)
                    .await
                    .map_err(|e| format!("Failed to connect to database: {e}"))?;
                let db = client.database(&config.db_name);
                let store = MongoEventStore::new(&db)
                    .await
                    .map_err(|e| format!("Failed to connect to database: {e}"))?;
                info!("...database connection online!");
                Ok(Box::new(store))
            }
        }
    }
}

#[rocket::async_trait]
impl Fairing for LedgerFairing {
    fn info(&self) -> Info {
        Info {
            name: "Ledger",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<StoreConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load event store config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        let Some(administrator) = rocket.state::<Config>().map(Config::administrator) else {
            error!("The ledger needs the application config to be loaded first");
            return Err(rocket);
        };

        let store = match Self::connect(config).await {
            Ok(store) => store,
            Err(e) => {
                error!("{e}");
                return Err(rocket);
            }
        };
        let ledger = match Ledger::open(
            store,
            Box::new(SystemClock),
            Authority::new(administrator),
        )
        .await
        {
            Ok(ledger) => ledger,
            Err(e) => {
                error!("Failed to rebuild the ledger: {e}");
                return Err(rocket);
            }
        };

        // Manage the state.
        rocket = rocket.manage(ledger);
        Ok(rocket)
    }
}
