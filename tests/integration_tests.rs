use anyhow::Result;
use async_trait::async_trait;
use labelscout::config::Config;
use labelscout::generator::context::PipelineContext;
use labelscout::generator::executor::ExecutorStage;
use labelscout::generator::state::{PipelineError, PipelineState, ResearchRecord, StageUpdate};
use labelscout::generator::types::{GraphNode, PipelineStage, route_after_executor};
use labelscout::generator::workflow::{AnalystReview, ResearchPipeline};
use labelscout::llm::client::CompletionModel;
use labelscout::llm::tools::browser::TOOL_NAME;
use labelscout::llm::tools::{AgentTool, ToolRegistry};
use labelscout::utils::download::FileDownloader;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

const PLAN: &str = r#"```json
{
    "primary_search_terms": ["labeler code 00002", "national drug code directory"],
    "search_strategy": "Query the NDC directory for the labeler code and follow links to data files",
    "target_locations": ["https://www.fda.gov/drugs/drug-approvals-and-databases/national-drug-code-directory"],
    "data_extraction_format": "One JSON object per labeler code",
    "verification_process": "Confirm each code in the NDC database download",
    "metadata_requirements": ["company name", "status", "source url"]
}
```"#;

const EMPTY_REPORT: &str = "No labeler codes were found.";

/// 规划与复核按提示词分派，研究阶段按脚本依次回答
struct ScriptedModel {
    research_replies: Mutex<VecDeque<String>>,
    research_fallback: String,
    research_calls: AtomicUsize,
    review_prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    fn new(research_replies: &[&str], research_fallback: &str) -> Self {
        Self {
            research_replies: Mutex::new(research_replies.iter().map(|s| s.to_string()).collect()),
            research_fallback: research_fallback.to_string(),
            research_calls: AtomicUsize::new(0),
            review_prompts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl CompletionModel for ScriptedModel {
    async fn complete(&self, prompt: &str) -> Result<String> {
        if prompt.contains("strategic FDA data planner") {
            return Ok(PLAN.to_string());
        }
        if prompt.contains("regulatory data specialist") {
            self.research_calls.fetch_add(1, Ordering::SeqCst);
            let next = self.research_replies.lock().unwrap().pop_front();
            return Ok(next.unwrap_or_else(|| self.research_fallback.clone()));
        }
        self.review_prompts.lock().unwrap().push(prompt.to_string());
        if prompt.contains("\"code\"") {
            Ok("Labeler Code: 12345".to_string())
        } else {
            Ok(EMPTY_REPORT.to_string())
        }
    }
}

/// 模拟找不到任何结果的浏览器工具
struct EmptyResultsTool {
    calls: AtomicUsize,
}

#[async_trait]
impl AgentTool for EmptyResultsTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> String {
        "Browser automation stub".to_string()
    }

    async fn invoke(&self, _input: &str) -> String {
        self.calls.fetch_add(1, Ordering::SeqCst);
        "No links containing 'zip' found on the page.".to_string()
    }
}

struct StubDownloader;

#[async_trait]
impl FileDownloader for StubDownloader {
    async fn download(&self, _url: &str, file_name: &str, dir: &Path) -> Option<PathBuf> {
        Some(dir.join(file_name))
    }
}

struct OneShotReview {
    calls: AtomicUsize,
}

#[async_trait]
impl AnalystReview for OneShotReview {
    async fn review(&self, _state: &PipelineState) -> Result<Option<String>> {
        let first = self.calls.fetch_add(1, Ordering::SeqCst) == 0;
        Ok(first.then(|| "Check the archived directory as well".to_string()))
    }
}

fn create_context(
    model: Arc<ScriptedModel>,
    tool: Arc<EmptyResultsTool>,
    temp_dir: &TempDir,
) -> PipelineContext {
    let mut config = Config::default();
    config.research.verbose = false;
    config.download.directory = temp_dir.path().join("downloaded_files");
    PipelineContext::with_collaborators(
        config,
        model,
        ToolRegistry::new().with_tool(tool),
        Arc::new(StubDownloader),
    )
}

fn empty_tool() -> Arc<EmptyResultsTool> {
    Arc::new(EmptyResultsTool {
        calls: AtomicUsize::new(0),
    })
}

#[tokio::test]
async fn test_zero_results_produce_empty_report() {
    let temp_dir = TempDir::new().unwrap();
    let model = Arc::new(ScriptedModel::new(
        &[
            "Thought: look for data files\nAction: browser_web_tool\nAction Input: {\"url\": \"https://www.fda.gov\", \"action\": \"find_links\", \"file_type\": \"zip\"}",
            "Thought: nothing was found\nFinal Answer: []",
        ],
        "Final Answer: []",
    ));
    let tool = empty_tool();
    let pipeline = ResearchPipeline::build(create_context(model.clone(), tool.clone(), &temp_dir));

    let state = pipeline
        .invoke(PipelineState::new("Labeler code 00002"), "scenario-1")
        .await
        .unwrap();

    let plan = state.planner_response.as_ref().unwrap();
    assert!(!plan.primary_search_terms.is_empty());
    assert_eq!(state.publisher_response, Some(vec![]));
    assert_eq!(state.downloaded_files, Some(vec![]));
    assert_eq!(state.executor_response.as_deref(), Some(EMPTY_REPORT));
    assert_eq!(tool.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_executor_downloads_referenced_file() {
    let temp_dir = TempDir::new().unwrap();
    let model = Arc::new(ScriptedModel::new(&[], "Final Answer: []"));
    let context = create_context(model, empty_tool(), &temp_dir);

    let mut state = PipelineState::new("Labeler code 12345");
    state.publisher_response = Some(vec![ResearchRecord {
        file_url: Some("http://x/f.csv".to_string()),
        file_name: Some("f.csv".to_string()),
        ..ResearchRecord::with_code("12345")
    }]);

    let update = ExecutorStage.execute(&context, &state).await.unwrap();
    let StageUpdate::Executed {
        executor_response,
        downloaded_files,
    } = update
    else {
        panic!("executor must produce an Executed update");
    };

    assert_eq!(executor_response, "Labeler Code: 12345");
    assert_eq!(downloaded_files.len(), 1);
    assert!(downloaded_files[0].ends_with("f.csv"));
}

#[tokio::test]
async fn test_executor_skips_record_without_file_url() {
    let temp_dir = TempDir::new().unwrap();
    let model = Arc::new(ScriptedModel::new(&[], "Final Answer: []"));
    let context = create_context(model.clone(), empty_tool(), &temp_dir);

    let mut state = PipelineState::new("Labeler codes");
    state.publisher_response = Some(vec![
        ResearchRecord {
            file_name: Some("missing.csv".to_string()),
            ..ResearchRecord::with_code("11111")
        },
        ResearchRecord {
            file_url: Some("http://x/g.zip".to_string()),
            file_name: Some("g.zip".to_string()),
            ..ResearchRecord::with_code("22222")
        },
    ]);

    let update = ExecutorStage.execute(&context, &state).await.unwrap();
    state.apply(update);

    let files = state.downloaded_files.unwrap();
    assert_eq!(files.len(), 1);
    assert!(files[0].ends_with("g.zip"));

    let review_prompts = model.review_prompts.lock().unwrap();
    assert_eq!(review_prompts.len(), 1);
    assert!(review_prompts[0].contains("11111"));
}

#[tokio::test]
async fn test_feedback_routes_back_to_researcher() {
    let temp_dir = TempDir::new().unwrap();
    let model = Arc::new(ScriptedModel::new(&[], "Final Answer: []"));
    let pipeline = ResearchPipeline::build(create_context(model.clone(), empty_tool(), &temp_dir))
        .with_analyst_review(Arc::new(OneShotReview {
            calls: AtomicUsize::new(0),
        }));

    let state = pipeline
        .invoke(PipelineState::new("Labeler code 00002"), "loop")
        .await
        .unwrap();

    assert_eq!(model.research_calls.load(Ordering::SeqCst), 2);
    assert_eq!(state.executor_response.as_deref(), Some(EMPTY_REPORT));

    let mut without_feedback = state.clone();
    without_feedback.human_analyst_feedback = None;
    assert_eq!(route_after_executor(&without_feedback), GraphNode::Done);
    let mut with_feedback = state;
    with_feedback.human_analyst_feedback = Some("retry".to_string());
    assert_eq!(route_after_executor(&with_feedback), GraphNode::Researcher);
}

#[tokio::test]
async fn test_research_loop_is_bounded() {
    let temp_dir = TempDir::new().unwrap();
    let model = Arc::new(ScriptedModel::new(
        &[],
        "Thought: keep looking\nAction: browser_web_tool\nAction Input: {\"url\": \"https://www.fda.gov\", \"action\": \"find_links\"}",
    ));
    let tool = empty_tool();
    let mut context = create_context(model.clone(), tool.clone(), &temp_dir);
    context.config.research.max_iterations = 3;
    let pipeline = ResearchPipeline::build(context);

    let err = pipeline.run("Labeler code 00002").await.unwrap_err();

    assert_eq!(model.research_calls.load(Ordering::SeqCst), 3);
    assert_eq!(tool.calls.load(Ordering::SeqCst), 3);
    assert!(matches!(
        err.downcast_ref::<PipelineError>(),
        Some(PipelineError::RecordsParse(_))
    ));
}
