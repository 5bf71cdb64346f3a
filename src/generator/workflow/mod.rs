use crate::config::Config;
use crate::generator::context::PipelineContext;
use crate::generator::executor::ExecutorStage;
use crate::generator::planner::PlannerStage;
use crate::generator::researcher::ResearcherStage;
use crate::generator::state::{PipelineError, PipelineState, StageUpdate};
use crate::generator::types::{GraphNode, PipelineStage, route_after_executor};
use crate::llm::client::LLMClient;
use crate::memory::{Checkpoint, Checkpointer, MemoryCheckpointer};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// 时间跟踪作用域
pub struct TimingScope {
    start_time: Instant,
    phase_start_times: HashMap<String, Instant>,
    phase_durations: Vec<(String, Duration)>,
}

impl Default for TimingScope {
    fn default() -> Self {
        Self::new()
    }
}

impl TimingScope {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            phase_start_times: HashMap::new(),
            phase_durations: Vec::new(),
        }
    }

    /// 开始一个新的阶段计时
    pub fn start_phase(&mut self, phase_name: &str) {
        self.phase_start_times
            .insert(phase_name.to_string(), Instant::now());
    }

    /// 结束一个阶段的计时；同一阶段多次执行时分别记录
    pub fn end_phase(&mut self, phase_name: &str) -> Option<Duration> {
        let start_time = self.phase_start_times.remove(phase_name)?;
        let duration = start_time.elapsed();
        self.phase_durations
            .push((phase_name.to_string(), duration));
        Some(duration)
    }

    pub fn get_total_duration(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn get_phase_durations(&self) -> &[(String, Duration)] {
        &self.phase_durations
    }

    /// 获取格式化的执行时间报告
    pub fn generate_timing_report(&self) -> String {
        let mut report = format!(
            "总执行时间: {:.2}秒\n",
            self.get_total_duration().as_secs_f64()
        );

        if !self.phase_durations.is_empty() {
            report.push_str("\n各阶段执行时间:\n");
            for (phase, duration) in &self.phase_durations {
                report.push_str(&format!("- {}: {:.3}秒\n", phase, duration.as_secs_f64()));
            }
        }

        report
    }
}

/// Executor之后的人工复核钩子，返回的文本写入 `human_analyst_feedback`
#[async_trait]
pub trait AnalystReview: Send + Sync {
    async fn review(&self, state: &PipelineState) -> Result<Option<String>>;
}

/// 固定拓扑的研究Pipeline：Planner → Researcher → Executor → {Researcher | Done}
pub struct ResearchPipeline {
    context: PipelineContext,
    checkpointer: Arc<dyn Checkpointer>,
    analyst_review: Option<Arc<dyn AnalystReview>>,
}

impl ResearchPipeline {
    /// 构建Pipeline，默认使用进程内检查点
    pub fn build(context: PipelineContext) -> Self {
        Self {
            context,
            checkpointer: Arc::new(MemoryCheckpointer::new()),
            analyst_review: None,
        }
    }

    pub fn with_checkpointer(mut self, checkpointer: Arc<dyn Checkpointer>) -> Self {
        self.checkpointer = checkpointer;
        self
    }

    pub fn with_analyst_review(mut self, review: Arc<dyn AnalystReview>) -> Self {
        self.analyst_review = Some(review);
        self
    }

    pub fn context(&self) -> &PipelineContext {
        &self.context
    }

    /// 以配置中的会话ID运行，返回最终报告
    pub async fn run(&self, title: &str) -> Result<String> {
        let state = self
            .invoke(PipelineState::new(title), &self.context.config.thread_id)
            .await?;
        final_report(&state)
    }

    /// 从入口节点开始运行到终止
    pub async fn invoke(&self, state: PipelineState, thread_id: &str) -> Result<PipelineState> {
        let step = self.last_step(thread_id).await?;
        self.run_from(state, GraphNode::START, thread_id, step).await
    }

    /// 把分析师反馈写入最新检查点，并从Executor的条件边继续
    pub async fn submit_feedback(&self, thread_id: &str, feedback: &str) -> Result<PipelineState> {
        let checkpoint = self.checkpointer.latest(thread_id).await?.ok_or_else(|| {
            PipelineError::CheckpointNotFound {
                thread_id: thread_id.to_string(),
            }
        })?;

        let mut state = checkpoint.state;
        state.human_analyst_feedback = Some(feedback.to_string());
        let next = route_after_executor(&state);
        info!("📝 收到会话 {} 的分析师反馈，从 {} 继续", thread_id, next);

        self.run_from(state, next, thread_id, checkpoint.step).await
    }

    /// 会话最新的检查点
    pub async fn get_state(&self, thread_id: &str) -> Result<Option<Checkpoint>> {
        Ok(self.checkpointer.latest(thread_id).await?)
    }

    async fn last_step(&self, thread_id: &str) -> Result<usize> {
        Ok(self
            .checkpointer
            .latest(thread_id)
            .await?
            .map(|c| c.step)
            .unwrap_or(0))
    }

    async fn execute_node(&self, node: GraphNode, state: &PipelineState) -> Result<StageUpdate> {
        match node {
            GraphNode::Planner => PlannerStage.execute(&self.context, state).await,
            GraphNode::Researcher => ResearcherStage.execute(&self.context, state).await,
            GraphNode::Executor => ExecutorStage.execute(&self.context, state).await,
            GraphNode::Done => Err(anyhow!("the terminal node has no stage to execute")),
        }
    }

    async fn run_from(
        &self,
        mut state: PipelineState,
        start: GraphNode,
        thread_id: &str,
        base_step: usize,
    ) -> Result<PipelineState> {
        let limit = self.context.config.recursion_limit;
        let mut timing = TimingScope::new();
        let mut executed = 0usize;
        let mut node = start;

        while node != GraphNode::Done {
            if executed >= limit {
                return Err(PipelineError::RecursionLimit { limit }.into());
            }

            info!("🚀 进入阶段: {}", node);
            timing.start_phase(node.as_str());
            let update = self.execute_node(node, &state).await?;
            state.apply(update);
            if let Some(duration) = timing.end_phase(node.as_str()) {
                debug!("stage {} finished in {:.2}s", node, duration.as_secs_f64());
            }
            executed += 1;

            if node == GraphNode::Researcher {
                // 反馈在一次研究中被消费
                state.human_analyst_feedback = None;
            }
            if node == GraphNode::Executor
                && let Some(review) = &self.analyst_review
                && let Some(feedback) = review.review(&state).await?
            {
                state.human_analyst_feedback = Some(feedback);
            }

            let next = node.transition(&state);
            self.checkpointer
                .put(Checkpoint::new(
                    thread_id,
                    state.clone(),
                    next,
                    base_step + executed,
                ))
                .await?;
            node = next;
        }

        info!("⏱️ Pipeline执行完成\n{}", timing.generate_timing_report());
        Ok(state)
    }
}

fn final_report(state: &PipelineState) -> Result<String> {
    state.executor_response.clone().ok_or_else(|| {
        PipelineError::MissingField {
            stage: GraphNode::Done,
            field: "executorResponse",
        }
        .into()
    })
}

/// 启动研究工作流，返回最终报告
pub async fn launch(title: &str, config: &Config) -> Result<String> {
    let llm_client = LLMClient::new(config.clone())?;

    // 启动时检查模型连接
    if !config.skip_connection_check {
        llm_client.check_connection().await?;
    }

    let context = PipelineContext::from_client(config.clone(), llm_client)?;
    let pipeline = ResearchPipeline::build(context);
    let state = pipeline.invoke(PipelineState::new(title), &config.thread_id).await?;

    if let Some(output_path) = &config.output_path {
        crate::generator::outlet::save(&state, output_path).await?;
    }

    final_report(&state)
}

// Include tests
#[cfg(test)]
mod tests;
