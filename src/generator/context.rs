use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use crate::config::Config;
use crate::llm::client::{CompletionModel, LLMClient, ReActConfig};
use crate::llm::tools::ToolRegistry;
use crate::llm::tools::browser::{BrowserAutomationTool, HttpBrowserDriver};
use crate::utils::download::{FileDownloader, HttpFileDownloader};

/// 各阶段共享的协作者与配置
#[derive(Clone)]
pub struct PipelineContext {
    /// 文本补全服务
    pub llm: Arc<dyn CompletionModel>,
    /// 研究阶段可用的工具
    pub tools: ToolRegistry,
    /// 执行阶段的文件下载
    pub downloader: Arc<dyn FileDownloader>,
    pub config: Config,
}

impl PipelineContext {
    /// 使用默认协作者创建上下文
    pub fn new(config: Config) -> Result<Self> {
        let llm_client = LLMClient::new(config.clone())?;
        Self::from_client(config, llm_client)
    }

    /// 使用已创建的LLM客户端，其余协作者按配置创建
    pub fn from_client(config: Config, llm_client: LLMClient) -> Result<Self> {
        let driver = Arc::new(HttpBrowserDriver::new(&config.browser)?);
        let browser_tool = BrowserAutomationTool::new(driver, config.browser.clone());
        let tools = ToolRegistry::new().with_tool(Arc::new(browser_tool));
        let downloader = Arc::new(HttpFileDownloader::new(&config.download)?);

        Ok(Self::with_collaborators(
            config,
            Arc::new(llm_client),
            tools,
            downloader,
        ))
    }

    pub fn with_collaborators(
        config: Config,
        llm: Arc<dyn CompletionModel>,
        tools: ToolRegistry,
        downloader: Arc<dyn FileDownloader>,
    ) -> Self {
        Self {
            llm,
            tools,
            downloader,
            config,
        }
    }

    /// 研究阶段Agent循环的边界
    pub fn react_config(&self) -> ReActConfig {
        let research = &self.config.research;
        ReActConfig {
            max_iterations: research.max_iterations,
            max_execution_time: Duration::from_secs(research.max_execution_secs),
            verbose: research.verbose,
            enable_summary_reasoning: research.enable_summary_reasoning,
        }
    }
}
