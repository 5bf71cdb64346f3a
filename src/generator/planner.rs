use anyhow::Result;
use tracing::{debug, info};

use crate::generator::context::PipelineContext;
use crate::generator::prompts::{PLANNER_PROMPT, render};
use crate::generator::state::{PipelineError, PipelineState, PlannerResponse, StageUpdate};
use crate::generator::types::{GraphNode, PipelineStage};
use crate::llm::decoder::StructuredResponseDecoder;

/// 规划阶段：根据标题生成研究计划
#[derive(Debug, Default, Clone, Copy)]
pub struct PlannerStage;

impl PipelineStage for PlannerStage {
    const NODE: GraphNode = GraphNode::Planner;

    async fn execute(&self, context: &PipelineContext, state: &PipelineState) -> Result<StageUpdate> {
        let title = state.require_title(Self::NODE)?;
        info!("🧭 正在规划研究策略: {}", title);

        let prompt = render(PLANNER_PROMPT, &[("input", title)]);
        let response = context.llm.complete(&prompt).await?;
        debug!("planner response: {}", response);

        let plan: PlannerResponse =
            StructuredResponseDecoder::decode(&response).map_err(PipelineError::PlanParse)?;

        info!(
            "✅ 研究计划已生成，检索词: {}",
            plan.primary_search_terms.join(", ")
        );
        Ok(StageUpdate::Planned(plan))
    }
}
