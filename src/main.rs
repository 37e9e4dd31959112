use log::{error, info, LevelFilter};
use rocket::Error as RocketError;
use thiserror::Error;

/// Errors that are critical to the entire server.
#[derive(Debug, Error)]
enum Error {
    #[error("Failed to initialise logging: {0}")]
    Logging(String),
    #[error(transparent)]
    Rocket(#[from] RocketError),
}

async fn run() -> Result<(), Error> {
    info!("Rebuilding the ledger and configuring the server...");
    let rocket = ballot_ledger::build().ignite().await?;
    info!("...server configured!");
    // Liftoff is logged by the logger fairing. Rocket's own logging is too
    // chatty to keep from here on.
    log4rs_dynamic_filters::DynamicLevelFilter::set("rocket", LevelFilter::Off);
    let _ = rocket.launch().await?;
    Ok(())
}

#[rocket::main]
async fn main() {
    let result = match log4rs::init_file(
        "log4rs.yaml",
        log4rs_dynamic_filters::default_deserializers(),
    ) {
        Ok(()) => {
            info!("Initialised logging");
            run().await
        }
        Err(err) => Err(Error::Logging(err.to_string())),
    };

    if let Err(err) = result {
        // Logging may be the thing that failed.
        eprintln!("{err}");
        error!("{err}");
        error!("Critical failure, shutting down");
        std::process::exit(1)
    }
}
