#[cfg(test)]
#[path = "error_test.rs"]
mod tests;

use serde::Deserialize;
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum ErrorKind {
    RateLimited,
    Overloaded,
    NetworkUnavailable,
    AuthConfigError,
    MalformedRequest,
    Timeout,
    PermissionDenied,
    DeviceUnavailable,
    UnknownTool,
    ToolExecutionFailed,
    Unknown,
}

impl ErrorKind {
    /// Whether the text completion cascade may move on to the next provider.
    pub fn is_retryable(&self) -> bool {
        return matches!(self, ErrorKind::RateLimited | ErrorKind::Overloaded);
    }

    /// Whether the voice UI should offer a retry button. Only missing or
    /// denied hardware needs the user to act first.
    pub fn is_voice_retryable(&self) -> bool {
        return !matches!(
            self,
            ErrorKind::PermissionDenied | ErrorKind::DeviceUnavailable
        );
    }

    /// Markdown shown in place of an assistant reply when a text turn fails.
    pub fn chat_message(&self) -> &'static str {
        return match self {
            ErrorKind::RateLimited => {
                "**Rate limit reached.** Every configured model is out of quota right now. Wait a minute and ask again."
            }
            ErrorKind::Overloaded => {
                "**High demand.** The AI models are overloaded at the moment. Please try again in a few seconds."
            }
            ErrorKind::NetworkUnavailable => {
                "**Network connection issue.** Check your internet connection and send the message again."
            }
            ErrorKind::AuthConfigError => {
                "**Authentication error.** No AI provider accepted the configured API keys. Check the tokens in your config file."
            }
            ErrorKind::MalformedRequest => {
                "**Request rejected.** The AI provider could not process this message. Try rephrasing it or start a new chat."
            }
            ErrorKind::Timeout => {
                "**Request timeout.** The AI took too long to answer. Please try again."
            }
            _ => "**Something went wrong.** An unexpected error occurred. Please try again.",
        };
    }

    /// Short sentence shown by the voice panel.
    pub fn voice_message(&self) -> &'static str {
        return match self {
            ErrorKind::Overloaded => {
                "The AI is experiencing high demand. Please try again in a moment."
            }
            ErrorKind::RateLimited => "Rate limit reached. Please wait a few seconds and try again.",
            ErrorKind::PermissionDenied => {
                "Microphone access was denied. Please enable microphone permissions."
            }
            ErrorKind::DeviceUnavailable => {
                "No microphone found. Please connect a microphone and try again."
            }
            ErrorKind::NetworkUnavailable => {
                "Network connection issue. Please check your internet connection."
            }
            ErrorKind::AuthConfigError => {
                "The voice service rejected the API key. Please check your configuration."
            }
            ErrorKind::Timeout => "The voice service took too long to answer. Please try again.",
            _ => "An unexpected error occurred. Please try again.",
        };
    }

    /// Best effort classification of free-form provider text. Numbers only
    /// count when written as a status, like `"code": 429` or `status: 503`.
    pub fn from_text(text: &str) -> Option<ErrorKind> {
        let lower = text.to_lowercase();
        let codes = status_codes(&lower);
        let has = |needles: &[&str]| {
            return needles.iter().any(|needle| return lower.contains(needle));
        };
        let has_code = |wanted: &[u16]| {
            return codes.iter().any(|code| return wanted.contains(code));
        };

        if has_code(&[429]) || has(&["quota", "resource_exhausted", "rate limit", "too many requests"]) {
            return Some(ErrorKind::RateLimited);
        }
        if has_code(&[503, 529]) || has(&["unavailable", "overloaded", "high demand"]) {
            return Some(ErrorKind::Overloaded);
        }
        if has_code(&[401, 403])
            || has(&["api key", "api_key", "unauthenticated", "unauthorized", "permission_denied"])
        {
            return Some(ErrorKind::AuthConfigError);
        }
        if has(&["timeout", "timed out", "deadline_exceeded", "deadline exceeded"]) {
            return Some(ErrorKind::Timeout);
        }
        if has(&["failed to fetch", "network", "connection refused", "connection reset", "dns error", "econnrefused"]) {
            return Some(ErrorKind::NetworkUnavailable);
        }

        return None;
    }
}

const STATUS_MARKERS: [&str; 5] = ["\"code\"", "status code", "status", "http error", "error code"];

/// Three digit numbers that directly follow a status marker in lowercased
/// text. Separators between marker and number are limited to `:`, `=` and
/// whitespace.
fn status_codes(lower: &str) -> Vec<u16> {
    let mut codes = vec![];
    for marker in STATUS_MARKERS {
        for (idx, _) in lower.match_indices(marker) {
            let rest = lower[idx + marker.len()..]
                .trim_start_matches(|c: char| return c.is_whitespace() || c == ':' || c == '=');
            let digits = rest
                .chars()
                .take_while(|c| return c.is_ascii_digit())
                .collect::<String>();
            if digits.len() != 3 {
                continue;
            }
            if let Ok(code) = digits.parse::<u16>() {
                codes.push(code);
            }
        }
    }
    return codes;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Classification {
    pub retryable: bool,
}

pub fn classify(err: &ProviderError) -> Classification {
    return Classification {
        retryable: err.kind.is_retryable(),
    };
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ProviderError {
    pub kind: ErrorKind,
    pub status: Option<u16>,
    pub message: String,
}

impl ProviderError {
    pub fn new(kind: ErrorKind, message: &str) -> ProviderError {
        return ProviderError {
            kind,
            status: None,
            message: message.to_string(),
        };
    }

    pub fn from_status(status: u16, body: &str) -> ProviderError {
        let kind = match status {
            429 => ErrorKind::RateLimited,
            503 | 529 => ErrorKind::Overloaded,
            401 | 403 => ErrorKind::AuthConfigError,
            408 | 504 => ErrorKind::Timeout,
            // Gemini reports bad keys as a 400.
            400 | 404 | 422 => match ErrorKind::from_text(body) {
                Some(ErrorKind::AuthConfigError) => ErrorKind::AuthConfigError,
                _ => ErrorKind::MalformedRequest,
            },
            _ => ErrorKind::from_text(body).unwrap_or(ErrorKind::Unknown),
        };

        let mut message: String = body.trim().chars().take(500).collect();
        if message.is_empty() {
            message = format!("HTTP status {status}");
        }

        return ProviderError {
            kind,
            status: Some(status),
            message,
        };
    }

    pub fn from_message(message: &str) -> ProviderError {
        return ProviderError::new(
            ErrorKind::from_text(message).unwrap_or(ErrorKind::Unknown),
            message,
        );
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> ProviderError {
        if let Some(status) = err.status() {
            return ProviderError::from_status(status.as_u16(), &err.to_string());
        }

        let kind = if err.is_timeout() {
            ErrorKind::Timeout
        } else if err.is_connect() {
            ErrorKind::NetworkUnavailable
        } else {
            ErrorKind::from_text(&err.to_string()).unwrap_or(ErrorKind::Unknown)
        };

        return ProviderError::new(kind, &err.to_string());
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> ProviderError {
        return ProviderError::new(ErrorKind::Unknown, &format!("Invalid provider payload: {err}"));
    }
}

impl From<std::io::Error> for ProviderError {
    fn from(err: std::io::Error) -> ProviderError {
        return ProviderError::from_message(&err.to_string());
    }
}
