use crate::config::LLMConfig;

/// 超过该长度的prompt直接交给高质量模型
const EFFICIENT_PROMPT_LIMIT: usize = 32 * 1024;

/// 根据prompt长度选择模型，返回 (首选模型, 兜底模型)
pub fn evaluate_befitting_model(llm_config: &LLMConfig, prompt: &str) -> (String, Option<String>) {
    if prompt.len() <= EFFICIENT_PROMPT_LIMIT {
        return (
            llm_config.model_efficient.clone(),
            Some(llm_config.model_powerful.clone()),
        );
    }
    (llm_config.model_powerful.clone(), None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_prompt_prefers_efficient_model() {
        let config = LLMConfig::default();
        let (model, fallback) = evaluate_befitting_model(&config, "short prompt");
        assert_eq!(model, config.model_efficient);
        assert_eq!(fallback, Some(config.model_powerful.clone()));
    }

    #[test]
    fn test_long_prompt_uses_powerful_model_without_fallback() {
        let config = LLMConfig::default();
        let prompt = "x".repeat(EFFICIENT_PROMPT_LIMIT + 1);
        let (model, fallback) = evaluate_befitting_model(&config, &prompt);
        assert_eq!(model, config.model_powerful);
        assert!(fallback.is_none());
    }
}
