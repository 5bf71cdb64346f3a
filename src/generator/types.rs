use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::generator::context::PipelineContext;
use crate::generator::state::{PipelineState, StageUpdate};

/// Pipeline图中的节点
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphNode {
    Planner,
    Researcher,
    Executor,
    Done,
}

impl GraphNode {
    /// 图的入口节点
    pub const START: GraphNode = GraphNode::Planner;

    pub fn as_str(&self) -> &'static str {
        match self {
            GraphNode::Planner => "planner",
            GraphNode::Researcher => "researcher",
            GraphNode::Executor => "executor",
            GraphNode::Done => "done",
        }
    }

    /// 固定的边：Planner → Researcher → Executor → {Researcher | Done}
    pub fn transition(self, state: &PipelineState) -> GraphNode {
        match self {
            GraphNode::Planner => GraphNode::Researcher,
            GraphNode::Researcher => GraphNode::Executor,
            GraphNode::Executor => route_after_executor(state),
            GraphNode::Done => GraphNode::Done,
        }
    }
}

impl fmt::Display for GraphNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Executor之后的条件边：有分析师反馈则回到Researcher
pub fn route_after_executor(state: &PipelineState) -> GraphNode {
    if state.has_feedback() {
        GraphNode::Researcher
    } else {
        GraphNode::Done
    }
}

/// Pipeline阶段：读取状态，返回只包含本阶段字段的产出
#[allow(async_fn_in_trait)]
pub trait PipelineStage {
    const NODE: GraphNode;

    async fn execute(&self, context: &PipelineContext, state: &PipelineState)
    -> Result<StageUpdate>;
}
