use std::sync::Arc;

use http::header::{AUTHORIZATION, HeaderName};
use tracing::debug;

use super::Interceptor;
use crate::auth::{AuthError, TokenAuthenticator};
use crate::config::{AuthConfig, ConfigError};
use crate::error::Error;
use crate::request::Request;
use crate::response::Response;

const BEARER: &str = "Bearer ";

/// Token guard.
///
/// Reads the token from a header (`Authorization` by default, with or
/// without a `Bearer ` prefix), verifies it and stores the verified
/// [`Claims`](crate::auth::Claims) in the request extensions, where the
/// handler picks them up with `req.extensions().get::<Claims>()`.
#[derive(Debug, Clone)]
pub struct AuthInterceptor {
    authenticator: Arc<TokenAuthenticator>,
    header: HeaderName,
}

impl AuthInterceptor {
    pub fn new(authenticator: Arc<TokenAuthenticator>) -> Self {
        Self { authenticator, header: AUTHORIZATION }
    }

    pub fn from_config(authenticator: Arc<TokenAuthenticator>, config: &AuthConfig) -> Result<Self, ConfigError> {
        let header = HeaderName::try_from(config.header.as_str())
            .map_err(|_| ConfigError::invalid(format!("auth.header `{}` is not a header name", config.header)))?;
        Ok(Self::new(authenticator).header(header))
    }

    pub fn header(mut self, header: HeaderName) -> Self {
        self.header = header;
        self
    }
}

impl Interceptor for AuthInterceptor {
    fn pre_handle(&self, req: &mut Request, _res: &mut Response) -> Result<bool, Error> {
        let raw = req.header(self.header.as_str()).ok_or(AuthError::Missing)?;
        let token = raw.strip_prefix(BEARER).unwrap_or(raw).trim();
        let claims = self.authenticator.verify(token)?;
        debug!(subject = claims.subject(), "token accepted");
        req.extensions_mut().insert(claims);
        Ok(true)
    }
}
