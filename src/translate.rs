//! Maps the error taxonomy onto outcomes.
//!
//! This is the only place that decides what a client sees for a failure.
//! The match is exhaustive on purpose; the full cause is logged here, once,
//! and the outcome carries only what is safe to show.

use std::error::Error as StdError;

use http::StatusCode;
use tracing::{error, warn};

use crate::error::{Error, SystemError};
use crate::outcome::{Outcome, codes};

const MSG_AUTH_FAILED: &str = "authentication failed";
const MSG_SYSTEM_FAILURE: &str = "system error";
const MSG_MISSING_REFERENCE: &str = "missing reference";

#[derive(Debug, Clone, Default)]
pub struct ErrorTranslator {
    expose_system_details: bool,
}

impl ErrorTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Puts the system error's own message into the outcome instead of the
    /// generic one. Useful in development, leaky in production.
    pub fn expose_system_details(mut self, expose: bool) -> Self {
        self.expose_system_details = expose;
        self
    }

    pub fn translate(&self, err: &Error) -> Outcome {
        match err {
            Error::Validation(e) => {
                warn!(violations = e.violations().len(), "{e}");
                Outcome::business_failure(codes::VALIDATION_FAILED, e.to_string())
                    .with_status(StatusCode::BAD_REQUEST)
            }
            Error::Auth(e) => {
                warn!(reason = e.reason(), "authentication failed: {e}");
                Outcome::business_failure(codes::AUTH_FAILED, MSG_AUTH_FAILED)
                    .with_status(StatusCode::UNAUTHORIZED)
            }
            Error::Business { code, message } => {
                warn!(code = %code, "business failure: {message}");
                Outcome::business_failure(code.as_str(), message.as_str())
            }
            Error::System(e) => {
                error!(cause = %cause_chain(e), "system failure");
                let message = match e {
                    SystemError::MissingReference(_) => MSG_MISSING_REFERENCE.to_owned(),
                    _ if self.expose_system_details => e.to_string(),
                    _ => MSG_SYSTEM_FAILURE.to_owned(),
                };
                Outcome::system_failure(codes::SYSTEM_FAILURE, message)
            }
        }
    }
}

fn cause_chain(err: &dyn StdError) -> String {
    let mut chain = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        chain.push_str(": ");
        chain.push_str(&cause.to_string());
        source = cause.source();
    }
    chain
}
