//! Pipeline共享状态：按阶段逐步填充的可选字段，以及各阶段的结构化产出

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;
use thiserror::Error;

use crate::generator::types::GraphNode;
use crate::llm::decoder::ResponseDecodeError;
use crate::memory::CheckpointError;

/// Pipeline运行中无法恢复的错误
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{stage} requires '{field}' but it has not been populated")]
    MissingField {
        stage: GraphNode,
        field: &'static str,
    },
    #[error("failed to decode the research plan")]
    PlanParse(#[source] ResponseDecodeError),
    #[error("failed to decode the research records")]
    RecordsParse(#[source] ResponseDecodeError),
    #[error("research answer has an unsupported shape: {0}")]
    RecordsShape(String),
    #[error("pipeline exceeded the recursion limit of {limit} stage executions")]
    RecursionLimit { limit: usize },
    #[error("no checkpoint found for thread '{thread_id}'")]
    CheckpointNotFound { thread_id: String },
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
}

/// 研究计划（规划阶段产出）
///
/// 模型一般输出snake_case键，同时接受camelCase。六个字段都是必填的；
/// 列表字段也接受单个字符串，自由文本字段也接受任意JSON值（转为文本保存）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannerResponse {
    #[serde(alias = "primary_search_terms", deserialize_with = "string_list")]
    pub primary_search_terms: Vec<String>,
    #[serde(alias = "search_strategy", deserialize_with = "free_text")]
    pub search_strategy: String,
    #[serde(alias = "target_locations", deserialize_with = "string_list")]
    pub target_locations: Vec<String>,
    #[serde(alias = "data_extraction_format", deserialize_with = "free_text")]
    pub data_extraction_format: String,
    #[serde(alias = "verification_process", deserialize_with = "free_text")]
    pub verification_process: String,
    #[serde(alias = "metadata_requirements", deserialize_with = "string_list")]
    pub metadata_requirements: Vec<String>,
}

/// 研究阶段发现的一条记录
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchRecord {
    /// 标识代码，例如labeler code
    #[serde(
        default,
        alias = "labeler_code",
        alias = "labelerCode",
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub code: Option<String>,

    #[serde(
        default,
        alias = "file_url",
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub file_url: Option<String>,

    #[serde(
        default,
        alias = "file_name",
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub file_name: Option<String>,

    /// 其余元数据原样保留
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

impl ResearchRecord {
    pub fn with_code(code: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            ..Default::default()
        }
    }

    /// 同时具备非空的 file_url 与 file_name 时返回二者
    pub fn file_reference(&self) -> Option<(&str, &str)> {
        let url = self.file_url.as_deref().map(str::trim)?;
        let name = self.file_name.as_deref().map(str::trim)?;
        if url.is_empty() || name.is_empty() {
            return None;
        }
        Some((url, name))
    }

    pub fn has_any_file_field(&self) -> bool {
        self.file_url.is_some() || self.file_name.is_some()
    }
}

/// 阶段产出，只包含该阶段拥有的字段
#[derive(Debug, Clone, PartialEq)]
pub enum StageUpdate {
    Planned(PlannerResponse),
    Researched(Vec<ResearchRecord>),
    Executed {
        executor_response: String,
        downloaded_files: Vec<PathBuf>,
    },
}

/// 在各阶段间传递的状态
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineState {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub planner_response: Option<PlannerResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher_response: Option<Vec<ResearchRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downloaded_files: Option<Vec<PathBuf>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executor_response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub human_analyst_feedback: Option<String>,
}

impl PipelineState {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// 写入阶段产出；每种产出只触及所属阶段的字段
    pub fn apply(&mut self, update: StageUpdate) {
        match update {
            StageUpdate::Planned(plan) => self.planner_response = Some(plan),
            StageUpdate::Researched(records) => self.publisher_response = Some(records),
            StageUpdate::Executed {
                executor_response,
                downloaded_files,
            } => {
                self.executor_response = Some(executor_response);
                self.downloaded_files = Some(downloaded_files);
            }
        }
    }

    pub fn require_title(&self, stage: GraphNode) -> Result<&str, PipelineError> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(PipelineError::MissingField {
                stage,
                field: "title",
            });
        }
        Ok(title)
    }

    pub fn require_plan(&self, stage: GraphNode) -> Result<&PlannerResponse, PipelineError> {
        self.planner_response
            .as_ref()
            .ok_or(PipelineError::MissingField {
                stage,
                field: "plannerResponse",
            })
    }

    pub fn require_records(&self, stage: GraphNode) -> Result<&[ResearchRecord], PipelineError> {
        self.publisher_response
            .as_deref()
            .ok_or(PipelineError::MissingField {
                stage,
                field: "publisherResponse",
            })
    }

    /// 反馈为非空文本时视为已设置
    pub fn has_feedback(&self) -> bool {
        self.human_analyst_feedback
            .as_deref()
            .is_some_and(|f| !f.trim().is_empty())
    }
}

pub(crate) fn value_to_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

fn free_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(value_to_text(Value::deserialize(deserializer)?))
}

fn string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items.into_iter().map(value_to_text).collect(),
        Value::Null => Vec::new(),
        other => vec![value_to_text(other)],
    })
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        other => Some(value_to_text(other)),
    })
}
