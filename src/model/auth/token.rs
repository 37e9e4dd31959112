use chrono::{serde::ts_seconds, DateTime, Utc};
use jsonwebtoken::{
    errors::Error as JwtError, DecodingKey, EncodingKey, Header, TokenData, Validation,
};
use rocket::{
    http::{Cookie, SameSite, Status},
    request::{self, FromRequest},
    time, Request,
};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::model::guard::{Caller, Identity};
use crate::Config;

pub const AUTH_TOKEN_COOKIE: &str = "auth_token";

/// A verified identity token. The token only says who the caller is; what they
/// may do is decided by the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthToken {
    caller: Caller,
}

impl AuthToken {
    pub fn caller(&self) -> &Caller {
        &self.caller
    }

    pub fn identity(&self) -> &Identity {
        &self.caller.identity
    }

    /// Mint a token for `identity`, as the authentication service would.
    pub fn issue(identity: &Identity, config: &Config) -> Result<Cookie<'static>, JwtError> {
        let claims = Claims {
            subject: identity.clone(),
            expire_at: Utc::now() + config.auth_ttl(),
        };

        let token = jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.jwt_secret()),
        )?;

        Ok(Cookie::build((AUTH_TOKEN_COOKIE, token))
            .max_age(time::Duration::seconds(config.auth_ttl().num_seconds()))
            .same_site(SameSite::Strict)
            .build())
    }

    /// Verify a token taken from a cookie.
    pub fn from_cookie(cookie: &Cookie<'_>, config: &Config) -> Result<Self, JwtError> {
        jsonwebtoken::decode(
            cookie.value(),
            &DecodingKey::from_secret(config.jwt_secret()),
            &Validation::default(),
        )
        .map(|data: TokenData<Claims>| Self {
            caller: Caller::new(data.claims.subject),
        })
    }
}

/// Cookie claims: the caller's identity plus an expiry datetime.
#[derive(Serialize, Deserialize)]
struct Claims {
    #[serde(rename = "sub")]
    subject: Identity,
    #[serde(rename = "exp", with = "ts_seconds")]
    expire_at: DateTime<Utc>,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthToken {
    type Error = Error;

    /// Get an AuthToken from the cookie. A missing cookie forwards, an invalid
    /// one fails.
    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let Some(config) = req.rocket().state::<Config>() else {
            return request::Outcome::Error((
                Status::InternalServerError,
                Error::Status(Status::InternalServerError, "No config".to_string()),
            ));
        };
        let Some(cookie) = req.cookies().get(AUTH_TOKEN_COOKIE) else {
            return request::Outcome::Forward(Status::Unauthorized);
        };

        match Self::from_cookie(cookie, config) {
            Ok(token) if !token.identity().is_empty() => request::Outcome::Success(token),
            Ok(_) => request::Outcome::Error((
                Status::Unauthorized,
                Error::Status(Status::Unauthorized, "Empty identity".to_string()),
            )),
            Err(err) => {
                debug!("Rejected auth token: {err}");
                request::Outcome::Error((Status::Unauthorized, err.into()))
            }
        }
    }
}
