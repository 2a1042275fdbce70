#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;

pub mod gemini;
pub mod openai;

use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::BackendBox;
use crate::domain::models::BackendName;
use crate::domain::services::TitleGenerator;

/// Order of the fallback cascade. OpenAI only takes part once it has a token,
/// Gemini models follow in their configured order.
fn cascade_plan(
    primary: Option<BackendName>,
    openai_model: Option<String>,
    gemini_models: Vec<String>,
) -> Vec<(BackendName, String)> {
    let mut plan = vec![];

    if primary == Some(BackendName::OpenAI) {
        if let Some(model) = openai_model {
            plan.push((BackendName::OpenAI, model));
        }
    }

    for model in gemini_models {
        plan.push((BackendName::Gemini, model));
    }

    return plan;
}

pub struct BackendManager {}

impl BackendManager {
    pub fn get(name: BackendName, model: &str) -> BackendBox {
        return match name {
            BackendName::OpenAI => {
                let mut backend = openai::OpenAI::default();
                if !model.is_empty() {
                    backend = backend.with_model(model);
                }
                Box::new(backend)
            }
            BackendName::Gemini => Box::new(gemini::Gemini::with_model(model)),
        };
    }

    pub fn cascade() -> Vec<BackendBox> {
        let openai = openai::OpenAI::default();
        let openai_model = if openai.is_configured() {
            Some(Config::get(ConfigKey::OpenAiModel))
        } else {
            None
        };

        let mut gemini_models = vec![];
        if !Config::get(ConfigKey::GeminiToken).is_empty() {
            gemini_models = Config::get_list(ConfigKey::GeminiModels);
        }

        let plan = cascade_plan(
            BackendName::parse(&Config::get(ConfigKey::PrimaryBackend)),
            openai_model,
            gemini_models,
        );
        tracing::info!(plan = ?plan, "Completion cascade");

        return plan
            .iter()
            .map(|(name, model)| return BackendManager::get(*name, model))
            .collect();
    }

    /// Titles come from a small Gemini model, falling back to the last model
    /// of the cascade when rate limited.
    pub fn title_generator() -> TitleGenerator {
        if Config::get(ConfigKey::GeminiToken).is_empty() {
            return TitleGenerator::new(None, None);
        }

        let primary = BackendManager::get(BackendName::Gemini, &Config::get(ConfigKey::TitleModel));
        let fallback = Config::get_list(ConfigKey::GeminiModels)
            .last()
            .map(|model| return BackendManager::get(BackendName::Gemini, model));

        return TitleGenerator::new(Some(primary), fallback);
    }
}
