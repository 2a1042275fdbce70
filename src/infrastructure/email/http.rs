#[cfg(test)]
#[path = "http_test.rs"]
mod tests;

use async_trait::async_trait;
use serde::Serialize;

use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::EmailPayload;
use crate::domain::models::EmailTransport;

#[derive(Debug, Serialize)]
struct RelayRequest<'a> {
    name: &'a str,
    email: &'a str,
    message: &'a str,
    to: &'a str,
}

/// Posts contact form submissions to a relay endpoint that does the sending.
pub struct HttpEmail {
    url: String,
    to: String,
}

impl Default for HttpEmail {
    fn default() -> HttpEmail {
        return HttpEmail {
            url: Config::get(ConfigKey::EmailURL),
            to: Config::get(ConfigKey::OwnerEmail),
        };
    }
}

#[async_trait]
impl EmailTransport for HttpEmail {
    #[allow(clippy::implicit_return)]
    async fn send(&self, payload: &EmailPayload) -> bool {
        let req = RelayRequest {
            name: &payload.name,
            email: &payload.email,
            message: &payload.message,
            to: &self.to,
        };

        let res = reqwest::Client::new().post(&self.url).json(&req).send().await;
        return match res {
            Ok(res) if res.status().is_success() => {
                tracing::info!(name = %payload.name, "Contact message relayed");
                true
            }
            Ok(res) => {
                tracing::error!(status = res.status().as_u16(), "Email relay rejected the message");
                false
            }
            Err(err) => {
                tracing::error!(error = ?err, "Email relay is not reachable");
                false
            }
        };
    }
}
