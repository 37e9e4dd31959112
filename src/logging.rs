//! Request logging. Every request gets a sequential ID that ties its log lines
//! together, and is logged with the identity it claims to act for.

use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicUsize, Ordering};

use rocket::{
    fairing::{Fairing, Info, Kind},
    http::StatusClass,
    request::{FromRequest, Outcome},
    Data, Orbit, Request, Response, Rocket,
};

use crate::model::{auth::AuthToken, auth::AUTH_TOKEN_COOKIE, ledger::Ledger};
use crate::Config;

/// A unique identifier for a particular request.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
pub struct RequestId(pub usize);

impl Display for RequestId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl RequestId {
    /// The ID of `req`, assigned on first use. Wraps around after `usize::MAX`.
    pub fn of(req: &Request<'_>) -> RequestId {
        static NEXT: AtomicUsize = AtomicUsize::new(0);
        *req.local_cache(|| RequestId(NEXT.fetch_add(1, Ordering::Relaxed)))
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for RequestId {
    type Error = std::convert::Infallible;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        Outcome::Success(RequestId::of(req))
    }
}

/// Who a request claims to be, for the log only. Routes still verify the
/// token through [`AuthToken`].
fn claimed_identity(req: &Request<'_>) -> String {
    let Some(cookie) = req.cookies().get(AUTH_TOKEN_COOKIE) else {
        return "anonymous".to_string();
    };
    match req.rocket().state::<Config>() {
        Some(config) => match AuthToken::from_cookie(cookie, config) {
            Ok(token) => token.identity().to_string(),
            Err(_) => "invalid token".to_string(),
        },
        None => "unknown".to_string(),
    }
}

/// The matched route as `name (uri)`.
fn route_description(req: &Request<'_>) -> String {
    match req.route() {
        Some(route) => match &route.name {
            Some(name) => format!("{name} ({})", route.uri),
            None => route.uri.to_string(),
        },
        None => "UNKNOWN ROUTE".to_string(),
    }
}

/// A rocket fairing that logs every request and response, plus the state of
/// the ledger at liftoff.
#[derive(Debug, Copy, Clone)]
pub struct LoggerFairing;

#[rocket::async_trait]
impl Fairing for LoggerFairing {
    fn info(&self) -> Info {
        Info {
            name: "Logger",
            kind: Kind::Liftoff | Kind::Request | Kind::Response | Kind::Shutdown,
        }
    }

    async fn on_liftoff(&self, rocket: &Rocket<Orbit>) {
        let config = rocket.config();
        let protocol = if config.tls_enabled() { "https" } else { "http" };
        info!(
            "Server launched on {protocol}://{}:{}",
            config.address, config.port
        );
        match rocket.state::<Ledger>() {
            Some(ledger) => {
                let head = ledger.head().await;
                info!(
                    "Serving a ledger of {} events with head {}",
                    head.length, head.digest
                );
            }
            None => warn!("Launched without a ledger"),
        }
    }

    async fn on_request(&self, req: &mut Request<'_>, _data: &mut Data<'_>) {
        let id = RequestId::of(req);
        info!(
            "->req{id} {} {} as {}",
            req.method(),
            req.uri(),
            claimed_identity(req)
        );
    }

    async fn on_response<'r>(&self, req: &'r Request<'_>, res: &mut Response<'r>) {
        let id = RequestId::of(req);
        let status = res.status();
        let msg = format!("<-rsp{id} {status} {}", route_description(req));
        match status.class() {
            StatusClass::ServerError => error!("{msg}"),
            StatusClass::ClientError => warn!("{msg}"),
            _ => info!("{msg}"),
        }
    }

    async fn on_shutdown(&self, rocket: &Rocket<Orbit>) {
        warn!("Shutdown requested, stopping gracefully...");
        if let Some(ledger) = rocket.state::<Ledger>() {
            info!("Ledger head at shutdown: {}", ledger.head().await.digest);
        }
    }
}
