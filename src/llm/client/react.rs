//! ReAct文本协议：配置、单步解析与执行结果

use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

const FINAL_ANSWER_ACTION: &str = "Final Answer:";

static ACTION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)Action\s*\d*\s*:[\s]*(.*?)[\s]*Action\s*\d*\s*Input\s*\d*\s*:[\s]*(.*)")
        .expect("static regex")
});

static ACTION_ONLY_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)Action\s*\d*\s*:[\s]*(.*?)").expect("static regex"));

/// 模型漏写 Action 时回填给模型的提示
pub const MISSING_ACTION_MESSAGE: &str = "Invalid Format: Missing 'Action:' after 'Thought:'";
/// 模型漏写 Action Input 时回填给模型的提示
pub const MISSING_ACTION_INPUT_MESSAGE: &str =
    "Invalid Format: Missing 'Action Input:' after 'Action:'";
/// 同时给出 Action 与 Final Answer 时回填给模型的提示
pub const ACTION_AND_ANSWER_MESSAGE: &str =
    "Parsing LLM output produced both a final answer and a parse-able action. Provide exactly one of them.";

/// ReAct循环配置
#[derive(Debug, Clone)]
pub struct ReActConfig {
    /// 最大迭代次数（每次模型决策计一次）
    pub max_iterations: usize,
    /// 整个循环允许的最长执行时间
    pub max_execution_time: Duration,
    /// 是否输出每一步的详细过程
    pub verbose: bool,
    /// 达到上限后是否追加一次总结推理
    pub enable_summary_reasoning: bool,
}

impl Default for ReActConfig {
    fn default() -> Self {
        Self {
            max_iterations: 30,
            max_execution_time: Duration::from_secs(600),
            verbose: true,
            enable_summary_reasoning: false,
        }
    }
}

/// 循环被中断的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    IterationLimit,
    TimeLimit,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::IterationLimit => write!(f, "iteration limit"),
            StopReason::TimeLimit => write!(f, "time limit"),
        }
    }
}

/// 模型单步输出的解析结果
#[derive(Debug, Clone, PartialEq)]
pub enum AgentStep {
    /// 最终答案
    FinalAnswer(String),
    /// 调用工具
    Action { tool: String, input: String },
    /// 无法解析，携带回填给模型的提示
    Malformed(String),
}

impl AgentStep {
    /// 按ReAct单输入协议解析一段模型输出
    pub fn parse(text: &str) -> Self {
        let includes_answer = text.contains(FINAL_ANSWER_ACTION);

        if let Some(caps) = ACTION_PATTERN.captures(text) {
            if includes_answer {
                return AgentStep::Malformed(ACTION_AND_ANSWER_MESSAGE.to_string());
            }
            let tool = caps.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
            let input = caps
                .get(2)
                .map(|m| m.as_str().trim().trim_matches('"'))
                .unwrap_or_default();
            return AgentStep::Action {
                tool: tool.to_string(),
                input: input.to_string(),
            };
        }

        if includes_answer {
            let answer = text
                .split_once(FINAL_ANSWER_ACTION)
                .map(|(_, rest)| rest.trim())
                .unwrap_or_default();
            return AgentStep::FinalAnswer(answer.to_string());
        }

        if ACTION_ONLY_PATTERN.is_match(text) {
            AgentStep::Malformed(MISSING_ACTION_INPUT_MESSAGE.to_string())
        } else {
            AgentStep::Malformed(MISSING_ACTION_MESSAGE.to_string())
        }
    }
}

/// 截断模型自行编造的 Observation 段
pub fn truncate_at_observation(text: &str) -> &str {
    match text.find("\nObservation:") {
        Some(index) => &text[..index],
        None => text,
    }
}

/// ReAct执行结果
#[derive(Debug, Clone)]
pub struct ReActResponse {
    /// 最终内容（完成时为Final Answer，中断时为最后一次模型输出或总结推理结果）
    pub content: String,
    /// 实际使用的迭代次数
    pub iterations_used: usize,
    /// 中断原因，正常完成时为None
    pub stopped_by: Option<StopReason>,
    /// 工具调用记录，形如 `tool(input)`
    pub tool_calls_history: Vec<String>,
    /// 完整的思考/行动/观察记录
    pub transcript: String,
}

impl ReActResponse {
    /// 正常完成
    pub fn success(
        content: String,
        iterations_used: usize,
        tool_calls_history: Vec<String>,
        transcript: String,
    ) -> Self {
        Self {
            content,
            iterations_used,
            stopped_by: None,
            tool_calls_history,
            transcript,
        }
    }

    /// 达到迭代或时间上限，返回部分结果
    pub fn stopped(
        reason: StopReason,
        content: String,
        iterations_used: usize,
        tool_calls_history: Vec<String>,
        transcript: String,
    ) -> Self {
        Self {
            content,
            iterations_used,
            stopped_by: Some(reason),
            tool_calls_history,
            transcript,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.stopped_by.is_none()
    }
}
