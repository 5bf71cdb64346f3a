use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::generator::context::PipelineContext;
use crate::generator::prompts::{REVIEWER_AGENT_PROMPT, REVIEWER_PROMPT, render};
use crate::generator::state::{PipelineState, ResearchRecord, StageUpdate};
use crate::generator::types::{GraphNode, PipelineStage};
use crate::llm::client::{ReActConfig, ReActExecutor};
use crate::utils::download::FileDownloader;

const REVIEW_QUESTION: &str = "Complete and consolidate the details of every labeler code in the records list";

/// 执行阶段：下载记录引用的文件，再由模型整理为最终报告
#[derive(Debug, Default, Clone, Copy)]
pub struct ExecutorStage;

/// 下载每条记录引用的文件
///
/// 只有一侧文件字段的记录记录警告后跳过，没有文件字段的记录直接跳过；同一路径只保留一次。
pub async fn download_referenced_files(
    downloader: &dyn FileDownloader,
    records: &[ResearchRecord],
    directory: &std::path::Path,
) -> Vec<PathBuf> {
    let mut downloaded: Vec<PathBuf> = Vec::new();

    for (index, record) in records.iter().enumerate() {
        let code = record.code.as_deref().unwrap_or("unknown");
        let Some((url, file_name)) = record.file_reference() else {
            if record.has_any_file_field() {
                warn!(
                    "⚠️ 记录 #{} ({}) 缺少 file_url 或 file_name，跳过下载",
                    index + 1,
                    code
                );
            } else {
                debug!("记录 #{} ({}) 没有引用文件", index + 1, code);
            }
            continue;
        };

        if let Some(path) = downloader.download(url, file_name, directory).await
            && !downloaded.contains(&path)
        {
            downloaded.push(path);
        }
    }

    downloaded
}

impl ExecutorStage {
    fn review_bound(context: &PipelineContext, record_count: usize) -> ReActConfig {
        let base = context.react_config();
        ReActConfig {
            max_iterations: context.config.executor.review_iterations_per_record
                * record_count.max(1),
            max_execution_time: Duration::from_secs(context.config.research.max_execution_secs),
            ..base
        }
    }

    async fn review(context: &PipelineContext, records: &[ResearchRecord]) -> Result<String> {
        let list = serde_json::to_string_pretty(records).context("Failed to serialize records")?;

        if !context.config.executor.agentic_review {
            let prompt = render(REVIEWER_PROMPT, &[("list", list.as_str())]);
            return context.llm.complete(&prompt).await;
        }

        let tools = context.tools.render_catalog();
        let tool_names = context.tools.tool_names();
        let prompt = render(
            REVIEWER_AGENT_PROMPT,
            &[
                ("list", list.as_str()),
                ("tools", tools.as_str()),
                ("tool_names", tool_names.as_str()),
                ("input", REVIEW_QUESTION),
            ],
        );
        let config = Self::review_bound(context, records.len());
        let response =
            ReActExecutor::execute(context.llm.as_ref(), &context.tools, &prompt, &config).await?;
        if let Some(reason) = response.stopped_by {
            warn!("⚠️ 复核Agent因{}中断，使用部分结果", reason);
        }
        Ok(response.content)
    }
}

impl PipelineStage for ExecutorStage {
    const NODE: GraphNode = GraphNode::Executor;

    async fn execute(&self, context: &PipelineContext, state: &PipelineState) -> Result<StageUpdate> {
        let records = state.require_records(Self::NODE)?;
        info!("📦 执行阶段开始，共{}条记录", records.len());

        let downloaded_files = download_referenced_files(
            context.downloader.as_ref(),
            records,
            &context.config.download.directory,
        )
        .await;
        info!("📥 已下载{}个文件", downloaded_files.len());

        let executor_response = Self::review(context, records).await?;
        info!("✅ 报告整理完成");

        Ok(StageUpdate::Executed {
            executor_response,
            downloaded_files,
        })
    }
}
