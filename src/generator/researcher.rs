use anyhow::Result;
use serde_json::{Map, Value};
use std::collections::HashSet;
use tracing::{info, warn};

use crate::generator::context::PipelineContext;
use crate::generator::prompts::{FEEDBACK_SECTION, RESEARCH_PROMPT, render};
use crate::generator::state::{
    PipelineError, PipelineState, ResearchRecord, StageUpdate, value_to_text,
};
use crate::generator::types::{GraphNode, PipelineStage};
use crate::llm::client::ReActExecutor;
use crate::llm::decoder::StructuredResponseDecoder;

/// 研究阶段：驱动带浏览器工具的Agent循环，产出记录列表
#[derive(Debug, Default, Clone, Copy)]
pub struct ResearcherStage;

impl ResearcherStage {
    /// 使用研究计划与工具目录填充提示词
    pub fn build_prompt(context: &PipelineContext, state: &PipelineState) -> Result<String> {
        let title = state.require_title(Self::NODE)?;
        let plan = state.require_plan(Self::NODE)?;

        let feedback = match state.human_analyst_feedback.as_deref() {
            Some(feedback) if !feedback.trim().is_empty() => {
                render(FEEDBACK_SECTION, &[("feedback", feedback.trim())])
            }
            _ => String::new(),
        };

        let tools = context.tools.render_catalog();
        let tool_names = context.tools.tool_names();
        let primary_search_terms = plan.primary_search_terms.join(", ");
        let target_locations = plan.target_locations.join(", ");
        let metadata_requirements = plan.metadata_requirements.join(", ");

        Ok(render(
            RESEARCH_PROMPT,
            &[
                ("primary_search_terms", primary_search_terms.as_str()),
                ("search_strategy", plan.search_strategy.as_str()),
                ("target_locations", target_locations.as_str()),
                ("data_extraction_format", plan.data_extraction_format.as_str()),
                ("verification_process", plan.verification_process.as_str()),
                ("metadata_requirements", metadata_requirements.as_str()),
                ("feedback", feedback.as_str()),
                ("tools", tools.as_str()),
                ("tool_names", tool_names.as_str()),
                ("input", title),
            ],
        ))
    }
}

impl PipelineStage for ResearcherStage {
    const NODE: GraphNode = GraphNode::Researcher;

    async fn execute(&self, context: &PipelineContext, state: &PipelineState) -> Result<StageUpdate> {
        let prompt = Self::build_prompt(context, state)?;
        info!("🔎 研究Agent开始检索: {}", state.title);

        let response = ReActExecutor::execute(
            context.llm.as_ref(),
            &context.tools,
            &prompt,
            &context.react_config(),
        )
        .await?;

        if let Some(reason) = response.stopped_by {
            warn!(
                "⚠️ 研究Agent因{}中断（{}次迭代），使用部分结果",
                reason, response.iterations_used
            );
        }

        let value: Value = StructuredResponseDecoder::decode(&response.content)
            .map_err(PipelineError::RecordsParse)?;
        let mut records = normalize_records(value)?;

        if let Some(limit) = context.config.research.max_records {
            records = cap_distinct(records, limit);
        }

        info!(
            "✅ 研究完成，发现{}条记录，工具调用{}次",
            records.len(),
            response.tool_calls_history.len()
        );
        Ok(StageUpdate::Researched(records))
    }
}

/// 包装对象中优先识别的记录数组键
const RECORD_ARRAY_KEYS: [&str; 4] = ["records", "results", "labeler_codes", "data"];

/// 将最终答案整理为记录列表
///
/// 数组按元素解析，标量元素视为代码。包装对象优先取已知键下的数组，
/// 否则取唯一的对象数组；存在多个候选数组时报错；其他对象视为单条记录。
pub fn normalize_records(value: Value) -> Result<Vec<ResearchRecord>, PipelineError> {
    match value {
        Value::Array(items) => Ok(records_from_items(items)),
        Value::Object(map) => match take_record_array(map)? {
            Ok(items) => Ok(records_from_items(items)),
            Err(map) => Ok(vec![record_from_object(map)?]),
        },
        other => Err(PipelineError::RecordsShape(format!(
            "expected an array or object, got {}",
            other
        ))),
    }
}

type Unwrapped = Result<Vec<Value>, Map<String, Value>>;

fn take_record_array(mut map: Map<String, Value>) -> Result<Unwrapped, PipelineError> {
    if let Some(key) = RECORD_ARRAY_KEYS
        .iter()
        .find(|key| map.get(**key).is_some_and(Value::is_array))
        && let Some(Value::Array(items)) = map.remove(*key)
    {
        return Ok(Ok(items));
    }

    let candidates: Vec<String> = map
        .iter()
        .filter(|(_, value)| {
            value
                .as_array()
                .is_some_and(|items| !items.is_empty() && items.iter().all(Value::is_object))
        })
        .map(|(key, _)| key.clone())
        .collect();

    match candidates.as_slice() {
        [] => Ok(Err(map)),
        [key] => match map.remove(key) {
            Some(Value::Array(items)) => Ok(Ok(items)),
            _ => Ok(Err(map)),
        },
        keys => Err(PipelineError::RecordsShape(format!(
            "ambiguous record arrays: {}",
            keys.join(", ")
        ))),
    }
}

fn records_from_items(items: Vec<Value>) -> Vec<ResearchRecord> {
    items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(map) => match record_from_object(map) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!("⚠️ 跳过无法解析的记录: {}", e);
                    None
                }
            },
            scalar @ (Value::String(_) | Value::Number(_)) => {
                let code = value_to_text(scalar);
                let code = code.trim();
                if code.is_empty() {
                    None
                } else {
                    Some(ResearchRecord::with_code(code))
                }
            }
            other => {
                warn!("⚠️ 跳过无法识别的记录: {}", other);
                None
            }
        })
        .collect()
}

fn record_from_object(map: Map<String, Value>) -> Result<ResearchRecord, PipelineError> {
    serde_json::from_value(Value::Object(map))
        .map_err(|e| PipelineError::RecordsShape(e.to_string()))
}

/// 保留前 `limit` 个不同代码的记录；没有代码的记录各自计为一个
pub fn cap_distinct(records: Vec<ResearchRecord>, limit: usize) -> Vec<ResearchRecord> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut distinct = 0usize;
    records
        .into_iter()
        .filter(|record| match &record.code {
            Some(code) if seen.contains(code) => true,
            Some(code) if distinct < limit => {
                seen.insert(code.clone());
                distinct += 1;
                true
            }
            None if distinct < limit => {
                distinct += 1;
                true
            }
            _ => false,
        })
        .collect()
}
