//! 总结推理模块 - 当ReAct循环达到上限时的fallover机制

use anyhow::Result;

use super::CompletionModel;
use super::react::ReActResponse;

/// 总结推理器
pub struct SummaryReasoner;

impl SummaryReasoner {
    /// 基于ReAct记录和工具调用历史，做一次不带工具的推理
    pub async fn summarize_and_reason(
        llm: &dyn CompletionModel,
        original_prompt: &str,
        partial: &ReActResponse,
    ) -> Result<String> {
        let summary_prompt = Self::build_summary_prompt(
            original_prompt,
            &partial.transcript,
            &partial.tool_calls_history,
        );
        llm.complete(&summary_prompt).await
    }

    /// 构建总结推理的提示词
    fn build_summary_prompt(
        original_prompt: &str,
        transcript: &str,
        tool_calls_history: &[String],
    ) -> String {
        let mut prompt = String::new();

        prompt.push_str("# Original Task\n");
        prompt.push_str(original_prompt.trim_end());
        prompt.push_str("\n\n");

        if !tool_calls_history.is_empty() {
            prompt.push_str("# Tool Calls Already Executed\n");
            for (index, tool_call) in tool_calls_history.iter().enumerate() {
                prompt.push_str(&format!("{}. {}\n", index + 1, tool_call));
            }
            prompt.push('\n');
        }

        if !transcript.trim().is_empty() {
            prompt.push_str("# Reasoning Trace And Observations\n");
            prompt.push_str(transcript.trim());
            prompt.push_str("\n\n");
        }

        prompt.push_str("# Summary Task\n");
        prompt.push_str("The research loop above was cut off before it produced a final answer. ");
        prompt.push_str("Using only the observations gathered so far, produce the final answer the original task asks for.\n\n");
        prompt.push_str("Notes:\n");
        prompt.push_str("1. Do not invent data that does not appear in the observations\n");
        prompt.push_str("2. If information is incomplete, include what is known and leave unknown fields empty\n");
        prompt.push_str("3. Reply with the final answer content only, in the format the original task requires\n");

        prompt
    }
}
