#[cfg(test)]
#[path = "resend_test.rs"]
mod tests;

use async_trait::async_trait;
use serde::Serialize;

use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::EmailPayload;
use crate::domain::models::EmailTransport;

const RESEND_URL: &str = "https://api.resend.com";
const SENDER: &str = "Portfolio Contact <onboarding@resend.dev>";

#[derive(Debug, Serialize)]
struct SendEmailRequest {
    from: String,
    to: Vec<String>,
    subject: String,
    html: String,
}

fn render_html(payload: &EmailPayload) -> String {
    return format!(
        r#"<h2>New Message from Your Portfolio</h2>
<p><strong>Name:</strong> {name}</p>
<p><strong>Email:</strong> {email}</p>
<p><strong>Message:</strong></p>
<blockquote style="background: #f9f9f9; padding: 10px; border-left: 5px solid #ccc;">{message}</blockquote>"#,
        name = escape_html(&payload.name),
        email = escape_html(&payload.email),
        message = escape_html(&payload.message),
    );
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    return out;
}

/// Sends contact form submissions straight through the Resend API.
pub struct ResendEmail {
    url: String,
    token: String,
    to: String,
}

impl Default for ResendEmail {
    fn default() -> ResendEmail {
        return ResendEmail {
            url: RESEND_URL.to_string(),
            token: Config::get(ConfigKey::ResendToken),
            to: Config::get(ConfigKey::OwnerEmail),
        };
    }
}

#[async_trait]
impl EmailTransport for ResendEmail {
    #[allow(clippy::implicit_return)]
    async fn send(&self, payload: &EmailPayload) -> bool {
        if self.to.is_empty() {
            tracing::error!("Owner email is not defined, cannot address the message");
            return false;
        }

        let req = SendEmailRequest {
            from: SENDER.to_string(),
            to: vec![self.to.to_string()],
            subject: format!("New Contact Form Submission from {}", payload.name),
            html: render_html(payload),
        };
        tracing::debug!(subject = %req.subject, "Sending email through Resend");

        let res = reqwest::Client::new()
            .post(format!("{url}/emails", url = self.url))
            .header("Authorization", format!("Bearer {}", self.token))
            .json(&req)
            .send()
            .await;

        return match res {
            Ok(res) if res.status().is_success() => true,
            Ok(res) => {
                let status = res.status().as_u16();
                let body = res.text().await.unwrap_or_default();
                tracing::error!(status = status, body = %body, "Resend rejected the message");
                false
            }
            Err(err) => {
                tracing::error!(error = ?err, "Resend is not reachable");
                false
            }
        };
    }
}
