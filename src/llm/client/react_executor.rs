//! ReAct执行器 - 有界的 思考 → 工具调用 → 观察 循环

use anyhow::Result;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::react::{AgentStep, ReActConfig, ReActResponse, StopReason, truncate_at_observation};
use super::summary_reasoner::SummaryReasoner;
use super::CompletionModel;
use crate::llm::tools::ToolRegistry;

/// 中断且没有任何模型输出时返回的内容
const STOPPED_WITHOUT_OUTPUT: &str = "Agent stopped due to iteration limit or time limit.";

/// ReAct执行器
pub struct ReActExecutor;

impl ReActExecutor {
    /// 执行ReAct循环
    ///
    /// `prompt` 为已填充的完整提示词（以 `Question: ...` 结尾），每轮在其后追加草稿区。
    /// 迭代次数与执行时间在每轮开始前检查，模型与工具调用还受剩余时间约束。
    /// 达到上限时返回部分结果，不会报错；只有模型调用本身失败才返回 `Err`。
    pub async fn execute(
        llm: &dyn CompletionModel,
        tools: &ToolRegistry,
        prompt: &str,
        config: &ReActConfig,
    ) -> Result<ReActResponse> {
        if config.verbose {
            info!(
                "   ♻️ 激活ReAct Agent模式，最大迭代次数: {}，最长执行时间: {}秒",
                config.max_iterations,
                config.max_execution_time.as_secs()
            );
        }

        let deadline = Instant::now() + config.max_execution_time;
        let mut scratchpad = String::new();
        let mut tool_calls_history = Vec::new();
        let mut last_output: Option<String> = None;
        let mut iterations = 0usize;

        let stop_reason = loop {
            if iterations >= config.max_iterations {
                break StopReason::IterationLimit;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break StopReason::TimeLimit;
            }

            let full_prompt = format!("{}{}", prompt, scratchpad);
            let output = match tokio::time::timeout(remaining, llm.complete(&full_prompt)).await {
                Ok(result) => result?,
                Err(_) => break StopReason::TimeLimit,
            };
            iterations += 1;

            let output = truncate_at_observation(&output).trim_end().to_string();
            if config.verbose {
                debug!("   🤔 [{}] {}", iterations, output);
            }

            let observation = match AgentStep::parse(&output) {
                AgentStep::FinalAnswer(answer) => {
                    if config.verbose {
                        info!("   ✅ ReAct Agent任务完成，迭代次数: {}", iterations);
                    }
                    scratchpad.push_str(&output);
                    return Ok(ReActResponse::success(
                        answer,
                        iterations,
                        tool_calls_history,
                        scratchpad,
                    ));
                }
                AgentStep::Action { tool, input } => {
                    tool_calls_history.push(format!("{}({})", tool, input));
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    match tokio::time::timeout(remaining, tools.invoke(&tool, &input)).await {
                        Ok(observation) => observation,
                        Err(_) => {
                            scratchpad.push_str(&output);
                            last_output = Some(output);
                            break StopReason::TimeLimit;
                        }
                    }
                }
                AgentStep::Malformed(hint) => {
                    if config.verbose {
                        warn!("   ⚠️ 模型输出无法解析: {}", hint);
                    }
                    hint
                }
            };

            if config.verbose {
                debug!("   👀 Observation: {}", observation);
            }
            scratchpad.push_str(&format!(
                "{}\nObservation: {}\nThought: ",
                output, observation
            ));
            last_output = Some(output);
        };

        if config.verbose {
            warn!(
                "   ⚠️ 达到{} ({}次迭代), 触发中断",
                stop_reason, iterations
            );
        }

        let partial = last_output.unwrap_or_else(|| STOPPED_WITHOUT_OUTPUT.to_string());
        let response = ReActResponse::stopped(
            stop_reason,
            partial,
            iterations,
            tool_calls_history,
            scratchpad,
        );

        if !config.enable_summary_reasoning {
            return Ok(response);
        }

        if config.verbose {
            info!("🔄 启动ReAct Agent总结转直接推理模式...");
        }
        match SummaryReasoner::summarize_and_reason(llm, prompt, &response).await {
            Ok(summary) => {
                if config.verbose {
                    info!("✅ 总结推理完成");
                }
                Ok(ReActResponse {
                    content: summary,
                    ..response
                })
            }
            Err(e) => {
                warn!("⚠️  总结推理失败，返回原始部分结果...{}", e);
                Ok(response)
            }
        }
    }
}
