//! LLM客户端 - 提供统一的LLM服务接口

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::cache::CacheManager;
use crate::config::Config;
use crate::llm::client::utils::evaluate_befitting_model;

mod providers;
pub mod react;
pub mod react_executor;
pub mod summary_reasoner;
pub mod utils;

pub use react::{AgentStep, ReActConfig, ReActResponse, StopReason};
pub use react_executor::ReActExecutor;

use providers::ProviderClient;

/// 所有Agent共用的系统提示
const SYSTEM_PREAMBLE: &str =
    "You are a meticulous research assistant. Follow the requested output format exactly.";

/// 缓存分类
const COMPLETION_CACHE_CATEGORY: &str = "completion";

/// 文本补全能力，Pipeline中所有阶段只依赖该接口
#[async_trait]
pub trait CompletionModel: Send + Sync {
    /// 以完整prompt请求一次补全，返回模型输出文本
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// 补全缓存键，由prompt和首选模型决定
fn completion_cache_key(befitting_model: &str, prompt: &str) -> String {
    format!("{}\n{}", befitting_model, prompt)
}

/// LLM客户端 - 提供统一的LLM服务接口
#[derive(Clone)]
pub struct LLMClient {
    config: Config,
    client: ProviderClient,
    cache_manager: Arc<CacheManager>,
}

impl LLMClient {
    /// 创建新的LLM客户端
    pub fn new(config: Config) -> Result<Self> {
        let client = ProviderClient::new(&config.llm)?;
        let cache_manager = Arc::new(CacheManager::new(config.cache.clone()));
        Ok(Self {
            client,
            config,
            cache_manager,
        })
    }

    /// 检查模型连接和功能是否正常
    pub async fn check_connection(&self) -> Result<()> {
        info!("🔄 正在检查模型连接...");
        match self.prompt_model(&self.config.llm.model_efficient, "Hello").await {
            Ok(_) => {
                info!("✅ 模型连接正常");
                Ok(())
            }
            Err(e) => {
                warn!("❌ 模型连接失败: {}", e);
                Err(e)
            }
        }
    }

    /// 通用重试逻辑，用于处理异步操作的重试机制
    async fn retry_with_backoff<T, F, Fut>(&self, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, anyhow::Error>>,
    {
        let llm_config = &self.config.llm;
        let max_retries = llm_config.retry_attempts.max(1);
        let retry_delay_ms = llm_config.retry_delay_ms;
        let mut retries = 0;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(err) => {
                    retries += 1;
                    warn!(
                        "❌ 调用模型服务出错，重试中 (第 {} / {}次尝试): {}",
                        retries, max_retries, err
                    );
                    if retries >= max_retries {
                        return Err(err);
                    }
                    tokio::time::sleep(Duration::from_millis(retry_delay_ms)).await;
                }
            }
        }
    }

    /// 单次调用指定模型，受超时约束
    async fn prompt_model(&self, model: &str, prompt: &str) -> Result<String> {
        let agent = self
            .client
            .create_agent(model, SYSTEM_PREAMBLE, &self.config.llm)?;
        let timeout = Duration::from_secs(self.config.llm.timeout_seconds);
        match tokio::time::timeout(timeout, agent.prompt(prompt)).await {
            Ok(result) => result,
            Err(_) => Err(anyhow!(
                "{} model {} did not respond within {}s",
                agent.provider_name(),
                model,
                self.config.llm.timeout_seconds
            )),
        }
    }

    /// 缓存写入失败只记录警告
    async fn store_completion(&self, cache_key: &str, model: &str, text: &str) {
        if let Err(e) = self
            .cache_manager
            .set(
                COMPLETION_CACHE_CATEGORY,
                cache_key,
                text.to_string(),
                Some(model.to_string()),
            )
            .await
        {
            warn!("⚠️ 写入缓存失败: {}", e);
        }
    }

    /// 调用模型，成功结果按首选模型的缓存键保存，备选模型的结果同样命中
    async fn complete_inner(
        &self,
        prompt: &str,
        cache_key: &str,
        befitting_model: String,
        fallover_model: Option<String>,
    ) -> Result<String> {
        let result = self
            .retry_with_backoff(|| self.prompt_model(&befitting_model, prompt))
            .await;

        match (result, fallover_model) {
            (Ok(text), _) => {
                self.store_completion(cache_key, &befitting_model, &text)
                    .await;
                Ok(text)
            }
            (Err(e), Some(model)) if model != befitting_model => {
                warn!(
                    "❌ 调用模型服务出错，尝试 {} 次均失败，尝试使用备选模型{}...{}",
                    self.config.llm.retry_attempts, model, e
                );
                Box::pin(self.complete_inner(prompt, cache_key, model, None)).await
            }
            (Err(e), _) => {
                warn!(
                    "❌ 调用模型服务出错，尝试 {} 次均失败...{}",
                    self.config.llm.retry_attempts, e
                );
                Err(e)
            }
        }
    }
}

#[async_trait]
impl CompletionModel for LLMClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let (befitting_model, fallover_model) =
            evaluate_befitting_model(&self.config.llm, prompt);

        let cache_key = completion_cache_key(&befitting_model, prompt);
        if let Some(cached) = self
            .cache_manager
            .get::<String>(COMPLETION_CACHE_CATEGORY, &cache_key)
            .await?
        {
            return Ok(cached);
        }

        self.complete_inner(prompt, &cache_key, befitting_model, fallover_model)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LLMProvider;
    use tempfile::TempDir;

    fn offline_client(cache_dir: &TempDir) -> LLMClient {
        let mut config = Config::default();
        config.llm.provider = LLMProvider::Ollama;
        config.cache.enabled = true;
        config.cache.cache_dir = cache_dir.path().to_path_buf();
        LLMClient::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_fallback_completion_is_served_from_cache() {
        let cache_dir = TempDir::new().unwrap();
        let client = offline_client(&cache_dir);
        let prompt = "List labeler codes for Eli Lilly";

        let (befitting, fallback) = evaluate_befitting_model(&client.config.llm, prompt);
        let fallback = fallback.unwrap();
        let cache_key = completion_cache_key(&befitting, prompt);
        client
            .store_completion(&cache_key, &fallback, "Labeler Code: 00002")
            .await;

        assert_eq!(client.complete(prompt).await.unwrap(), "Labeler Code: 00002");
    }
}
