use super::cascade_plan;
use crate::domain::models::BackendName;

fn models() -> Vec<String> {
    return vec!["gemini-2.5-flash".to_string(), "gemma-3-27b-it".to_string()];
}

#[test]
fn it_puts_openai_first_when_configured() {
    let plan = cascade_plan(
        Some(BackendName::OpenAI),
        Some("gpt-4o-mini".to_string()),
        models(),
    );

    assert_eq!(
        plan,
        vec![
            (BackendName::OpenAI, "gpt-4o-mini".to_string()),
            (BackendName::Gemini, "gemini-2.5-flash".to_string()),
            (BackendName::Gemini, "gemma-3-27b-it".to_string()),
        ]
    );
}

#[test]
fn it_skips_openai_without_a_token() {
    let plan = cascade_plan(Some(BackendName::OpenAI), None, models());
    assert_eq!(plan.len(), 2);
    assert_eq!(plan[0], (BackendName::Gemini, "gemini-2.5-flash".to_string()));
}

#[test]
fn it_skips_openai_when_gemini_is_primary() {
    let plan = cascade_plan(
        Some(BackendName::Gemini),
        Some("gpt-4o-mini".to_string()),
        models(),
    );
    assert!(plan.iter().all(|(name, _)| return *name == BackendName::Gemini));
}

#[test]
fn it_plans_nothing_without_credentials() {
    assert!(cascade_plan(Some(BackendName::OpenAI), None, vec![]).is_empty());
}
