//! Agent可调用的工具

use async_trait::async_trait;
use std::sync::Arc;

pub mod browser;

/// Agent工具：输入输出均为文本，任何失败都以文本形式返回
#[async_trait]
pub trait AgentTool: Send + Sync {
    /// 工具名称，ReAct输出中的 `Action:` 按该名称分发
    fn name(&self) -> &str;

    /// 提供给模型的工具说明
    fn description(&self) -> String;

    /// 执行一次调用
    async fn invoke(&self, input: &str) -> String;
}

/// 工具注册表
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn AgentTool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册工具，同名工具会被替换
    pub fn register(&mut self, tool: Arc<dyn AgentTool>) {
        self.tools.retain(|t| t.name() != tool.name());
        self.tools.push(tool);
    }

    pub fn with_tool(mut self, tool: Arc<dyn AgentTool>) -> Self {
        self.register(tool);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn AgentTool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// 逗号分隔的工具名称列表
    pub fn tool_names(&self) -> String {
        self.tools
            .iter()
            .map(|t| t.name().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// 每行一个 `name: description` 的工具目录
    pub fn render_catalog(&self) -> String {
        self.tools
            .iter()
            .map(|t| format!("{}: {}", t.name(), t.description()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// 按名称分发调用；名称无效时返回可供模型纠正的提示
    pub async fn invoke(&self, name: &str, input: &str) -> String {
        match self.get(name) {
            Some(tool) => tool.invoke(input).await,
            None => format!(
                "{} is not a valid tool, try one of [{}].",
                name,
                self.tool_names()
            ),
        }
    }
}
