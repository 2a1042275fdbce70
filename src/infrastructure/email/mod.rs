#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;

pub mod http;
pub mod noop;
pub mod resend;

use std::sync::Arc;

use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::EmailBox;

#[derive(Debug, PartialEq, Eq)]
enum Transport {
    Resend,
    Http,
    Noop,
}

fn pick_transport(resend_token: &str, email_url: &str) -> Transport {
    if !resend_token.is_empty() {
        return Transport::Resend;
    }
    if !email_url.is_empty() {
        return Transport::Http;
    }
    return Transport::Noop;
}

pub struct EmailManager {}

impl EmailManager {
    pub fn get() -> EmailBox {
        let transport = pick_transport(
            &Config::get(ConfigKey::ResendToken),
            &Config::get(ConfigKey::EmailURL),
        );
        tracing::debug!(transport = ?transport, "Selected email transport");

        return match transport {
            Transport::Resend => Arc::new(resend::ResendEmail::default()),
            Transport::Http => Arc::new(http::HttpEmail::default()),
            Transport::Noop => Arc::new(noop::NoopEmail {}),
        };
    }
}
