use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;

/// LLM Provider类型
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub enum LLMProvider {
    #[serde(rename = "openai")]
    OpenAI,
    #[serde(rename = "moonshot")]
    Moonshot,
    #[serde(rename = "deepseek")]
    DeepSeek,
    #[serde(rename = "mistral")]
    Mistral,
    #[serde(rename = "openrouter")]
    OpenRouter,
    #[serde(rename = "anthropic")]
    Anthropic,
    #[serde(rename = "gemini")]
    #[default]
    Gemini,
    #[serde(rename = "ollama")]
    Ollama,
}

impl std::fmt::Display for LLMProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LLMProvider::OpenAI => write!(f, "openai"),
            LLMProvider::Moonshot => write!(f, "moonshot"),
            LLMProvider::DeepSeek => write!(f, "deepseek"),
            LLMProvider::Mistral => write!(f, "mistral"),
            LLMProvider::OpenRouter => write!(f, "openrouter"),
            LLMProvider::Anthropic => write!(f, "anthropic"),
            LLMProvider::Gemini => write!(f, "gemini"),
            LLMProvider::Ollama => write!(f, "ollama"),
        }
    }
}

impl std::str::FromStr for LLMProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(LLMProvider::OpenAI),
            "moonshot" => Ok(LLMProvider::Moonshot),
            "deepseek" => Ok(LLMProvider::DeepSeek),
            "mistral" => Ok(LLMProvider::Mistral),
            "openrouter" => Ok(LLMProvider::OpenRouter),
            "anthropic" => Ok(LLMProvider::Anthropic),
            "gemini" => Ok(LLMProvider::Gemini),
            "ollama" => Ok(LLMProvider::Ollama),
            _ => Err(format!("Unknown provider: {}", s)),
        }
    }
}

/// 应用程序配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct Config {
    /// 检查点会话标识，同一会话的多次运行共享检查点
    pub thread_id: String,

    /// 报告输出目录，为空时只在终端输出报告
    pub output_path: Option<PathBuf>,

    /// 单次运行允许执行的最大阶段数，防止反馈回环失控
    pub recursion_limit: usize,

    /// LLM模型配置
    pub llm: LLMConfig,

    /// 调研阶段（Agent循环）配置
    pub research: ResearchConfig,

    /// 浏览器自动化工具配置
    pub browser: BrowserConfig,

    /// 文件下载配置
    pub download: DownloadConfig,

    /// 执行阶段配置
    pub executor: ExecutorConfig,

    /// 缓存配置
    pub cache: CacheConfig,

    /// 启动时是否跳过模型连接检查
    pub skip_connection_check: bool,

    /// 是否启用详细日志
    pub verbose: bool,
}

/// LLM模型配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct LLMConfig {
    /// LLM Provider类型
    pub provider: LLMProvider,

    /// LLM API KEY
    pub api_key: String,

    /// LLM API基地址
    pub api_base_url: String,

    /// 高能效模型，用于常规推理任务
    pub model_efficient: String,

    /// 高质量模型，用于长上下文任务，以及作为efficient失效情况下的兜底
    pub model_powerful: String,

    /// 最大tokens
    pub max_tokens: u32,

    /// 温度
    pub temperature: f64,

    /// 重试次数
    pub retry_attempts: u32,

    /// 重试间隔（毫秒）
    pub retry_delay_ms: u64,

    /// 单次调用超时时间（秒）
    pub timeout_seconds: u64,
}

/// 调研阶段配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ResearchConfig {
    /// Agent循环最大迭代次数
    pub max_iterations: usize,

    /// Agent循环最长执行时间（秒）
    pub max_execution_secs: u64,

    /// 记录数量硬上限；None时仅由提示词约束（软上限）
    pub max_records: Option<usize>,

    /// 达到迭代/时间上限后，是否追加一次无工具的总结推理
    pub enable_summary_reasoning: bool,

    /// 是否输出Agent循环的详细过程
    pub verbose: bool,
}

/// 浏览器自动化工具配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct BrowserConfig {
    /// 请求使用的User-Agent
    pub user_agent: String,

    /// 页面加载超时（毫秒）
    pub page_load_timeout_ms: u64,

    /// wait_for选择器等待超时（毫秒）
    pub wait_timeout_ms: u64,

    /// click / fill_form 等元素级操作的等待超时（毫秒）
    pub action_timeout_ms: u64,

    /// download_file 动作的默认保存目录
    pub download_path: PathBuf,

    /// search 动作返回的结果页预览长度（字符）
    pub search_preview_chars: usize,

    /// extract_table 动作每个表格的预览行数
    pub table_preview_rows: usize,
}

/// 文件下载配置（执行阶段使用）
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct DownloadConfig {
    /// 下载目录
    pub directory: PathBuf,

    /// 单个文件下载超时（秒）
    pub timeout_secs: u64,
}

/// 执行阶段配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ExecutorConfig {
    /// 是否使用带工具的Agent循环进行复核整理
    pub agentic_review: bool,

    /// 复核Agent循环中每条记录允许的迭代次数
    pub review_iterations_per_record: usize,
}

/// 缓存配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct CacheConfig {
    /// 是否启用缓存
    pub enabled: bool,

    /// 缓存目录
    pub cache_dir: PathBuf,

    /// 缓存过期时间（小时）
    pub expire_hours: u64,
}

impl Config {
    /// 从文件加载配置
    pub fn from_file(path: &PathBuf) -> Result<Self> {
        let mut file =
            File::open(path).context(format!("Failed to open config file: {:?}", path))?;
        let mut content = String::new();
        file.read_to_string(&mut content)
            .context("Failed to read config file")?;

        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            thread_id: String::from("1"),
            output_path: None,
            recursion_limit: 25,
            llm: LLMConfig::default(),
            research: ResearchConfig::default(),
            browser: BrowserConfig::default(),
            download: DownloadConfig::default(),
            executor: ExecutorConfig::default(),
            cache: CacheConfig::default(),
            skip_connection_check: false,
            verbose: false,
        }
    }
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            provider: LLMProvider::default(),
            api_key: std::env::var("LABELSCOUT_LLM_API_KEY").unwrap_or_default(),
            api_base_url: String::from("https://generativelanguage.googleapis.com"),
            model_efficient: String::from("gemini-2.0-flash"),
            model_powerful: String::from("gemini-2.5-pro"),
            max_tokens: 8192,
            temperature: 0.1,
            retry_attempts: 3,
            retry_delay_ms: 3000,
            timeout_seconds: 120,
        }
    }
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            max_iterations: 30,
            max_execution_secs: 600,
            max_records: None,
            enable_summary_reasoning: false,
            verbose: true,
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            user_agent: String::from(
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
            ),
            page_load_timeout_ms: 30_000,
            wait_timeout_ms: 10_000,
            action_timeout_ms: 5_000,
            download_path: PathBuf::from("downloads"),
            search_preview_chars: 1500,
            table_preview_rows: 5,
        }
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("downloaded_files"),
            timeout_secs: 15,
        }
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            agentic_review: false,
            review_iterations_per_record: 3,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cache_dir: PathBuf::from(".labelscout/cache"),
            expire_hours: 24,
        }
    }
}
