#[cfg(test)]
#[path = "titles_test.rs"]
mod tests;

use crate::domain::models::BackendBox;
use crate::domain::models::ErrorKind;

pub fn title_prompt(first_message: &str) -> String {
    return format!(
        "Generate a short, concise title (max 5-6 words) for a chat session that starts with this user message: \"{first_message}\". Return ONLY the title text. Do not use quotes."
    );
}

fn clean_title(raw: &str) -> Option<String> {
    let line = raw.trim().lines().next()?.trim();
    let title = line
        .trim_matches(|c: char| return c == '"' || c == '\'' || c == '*')
        .trim();
    if title.is_empty() {
        return None;
    }

    return Some(title.to_string());
}

/// Names sessions after their first message using a lightweight model.
pub struct TitleGenerator {
    primary: Option<BackendBox>,
    fallback: Option<BackendBox>,
}

impl TitleGenerator {
    pub fn new(primary: Option<BackendBox>, fallback: Option<BackendBox>) -> TitleGenerator {
        return TitleGenerator { primary, fallback };
    }

    /// Returns None on any failure, the provisional title stays in place.
    pub async fn generate(&self, first_message: &str) -> Option<String> {
        let primary = self.primary.as_ref()?;
        let prompt = title_prompt(first_message);

        let res = match primary.generate_text(&prompt).await {
            Err(err) if err.kind == ErrorKind::RateLimited => match &self.fallback {
                Some(fallback) => {
                    tracing::info!(model = %fallback.model(), "Title model rate limited, retrying");
                    fallback.generate_text(&prompt).await
                }
                None => Err(err),
            },
            res => res,
        };

        return match res {
            Ok(raw) => clean_title(&raw),
            Err(err) => {
                tracing::warn!(error = %err, "Failed to generate session title");
                None
            }
        };
    }
}
