use crate::config::{Config, LLMProvider};
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

/// 默认配置文件名，位于当前工作目录
pub const DEFAULT_CONFIG_FILE: &str = "labelscout.toml";

/// LabelScout - 由LLM驱动的FDA标签代码研究Pipeline
#[derive(Parser, Debug)]
#[command(name = "labelscout")]
#[command(
    about = "LLM-driven research pipeline: plans a web research strategy, browses FDA.gov for labeler codes, downloads referenced files and consolidates the findings into a report."
)]
#[command(version)]
pub struct Args {
    /// 研究主题
    pub title: String,

    /// 配置文件路径
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// 检查点会话ID
    #[arg(long)]
    pub thread_id: Option<String>,

    /// 报告输出目录
    #[arg(short, long)]
    pub output_path: Option<PathBuf>,

    /// 执行阶段的文件下载目录
    #[arg(long)]
    pub download_dir: Option<PathBuf>,

    /// 研究Agent最大迭代次数
    #[arg(long)]
    pub max_iterations: Option<usize>,

    /// 研究Agent最长执行时间（秒）
    #[arg(long)]
    pub max_execution_secs: Option<u64>,

    /// 记录数量硬上限（按不同代码计）
    #[arg(long)]
    pub max_records: Option<usize>,

    /// LLM Provider (openai, moonshot, deepseek, mistral, openrouter, anthropic, gemini, ollama)
    #[arg(long)]
    pub llm_provider: Option<String>,

    /// LLM API KEY
    #[arg(long)]
    pub llm_api_key: Option<String>,

    /// LLM API基地址
    #[arg(long)]
    pub llm_api_base_url: Option<String>,

    /// 高能效模型，用于常规推理任务
    #[arg(long)]
    pub model_efficient: Option<String>,

    /// 高质量模型，用于长上下文任务以及efficient失效时的兜底
    #[arg(long)]
    pub model_powerful: Option<String>,

    /// 最大tokens数
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// 温度参数
    #[arg(long)]
    pub temperature: Option<f64>,

    /// 执行阶段使用带浏览器工具的复核Agent
    #[arg(long)]
    pub agentic_review: bool,

    /// 是否禁用缓存
    #[arg(long)]
    pub no_cache: bool,

    /// 跳过启动时的模型连接检查
    #[arg(long)]
    pub skip_connection_check: bool,

    /// 是否启用详细日志
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// 加载配置文件：显式路径优先，其次是当前目录下的默认文件
    fn load_base_config(&self) -> Result<Config> {
        if let Some(config_path) = &self.config {
            return Config::from_file(config_path)
                .context(format!("无法读取配置文件 {:?}", config_path));
        }

        let default_config_path = std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(DEFAULT_CONFIG_FILE);
        if default_config_path.exists() {
            Config::from_file(&default_config_path)
                .context(format!("无法读取默认配置文件 {:?}", default_config_path))
        } else {
            Ok(Config::default())
        }
    }

    /// 将CLI参数转换为配置，命令行参数覆盖配置文件
    pub fn into_config(self) -> Result<Config> {
        let mut config = self.load_base_config()?;

        if let Some(thread_id) = self.thread_id {
            config.thread_id = thread_id;
        }
        if let Some(output_path) = self.output_path {
            config.output_path = Some(output_path);
        }
        if let Some(download_dir) = self.download_dir {
            config.download.directory = download_dir;
        }

        // 研究阶段
        if let Some(max_iterations) = self.max_iterations {
            config.research.max_iterations = max_iterations;
        }
        if let Some(max_execution_secs) = self.max_execution_secs {
            config.research.max_execution_secs = max_execution_secs;
        }
        if let Some(max_records) = self.max_records {
            config.research.max_records = Some(max_records);
        }

        // 覆盖LLM配置
        if let Some(provider_str) = self.llm_provider {
            config.llm.provider = provider_str
                .parse::<LLMProvider>()
                .map_err(anyhow::Error::msg)
                .context("无效的 --llm-provider 参数")?;
        }
        if let Some(llm_api_base_url) = self.llm_api_base_url {
            config.llm.api_base_url = llm_api_base_url;
        }
        if let Some(llm_api_key) = self.llm_api_key {
            config.llm.api_key = llm_api_key;
        }
        if let Some(model_efficient) = self.model_efficient {
            config.llm.model_efficient = model_efficient;
        }
        if let Some(model_powerful) = self.model_powerful {
            config.llm.model_powerful = model_powerful;
        }
        if let Some(max_tokens) = self.max_tokens {
            config.llm.max_tokens = max_tokens;
        }
        if let Some(temperature) = self.temperature {
            config.llm.temperature = temperature;
        }

        if self.agentic_review {
            config.executor.agentic_review = true;
        }
        if self.no_cache {
            config.cache.enabled = false;
        }
        if self.skip_connection_check {
            config.skip_connection_check = true;
        }
        if self.verbose {
            config.verbose = true;
        }

        Ok(config)
    }
}

// Include tests
#[cfg(test)]
mod tests;
