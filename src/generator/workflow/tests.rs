#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::generator::context::PipelineContext;
    use crate::generator::state::{PipelineError, PipelineState};
    use crate::generator::types::GraphNode;
    use crate::generator::workflow::{AnalystReview, ResearchPipeline, TimingScope};
    use crate::llm::client::CompletionModel;
    use crate::llm::tools::ToolRegistry;
    use crate::memory::{Checkpointer, MemoryCheckpointer};
    use crate::utils::download::FileDownloader;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    const PLAN: &str = r#"```json
{
    "primary_search_terms": ["labeler code 00002", "NDC directory"],
    "search_strategy": "Search the NDC directory, then download the database file",
    "target_locations": ["https://www.fda.gov/drugs"],
    "data_extraction_format": "JSON per code",
    "verification_process": "Cross-check against the NDC database",
    "metadata_requirements": ["company name", "status"]
}
```"#;

    const REPORT: &str = "Labeler Code: 00002\nCompany Name: Eli Lilly and Company";

    /// 按提示词内容分派回答的模型
    struct RouterModel {
        plan: String,
        research_answer: String,
        prompts: Mutex<Vec<String>>,
    }

    impl RouterModel {
        fn new(plan: &str, research_answer: &str) -> Self {
            Self {
                plan: plan.to_string(),
                research_answer: research_answer.to_string(),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn research_prompts(&self) -> Vec<String> {
            self.prompts
                .lock()
                .unwrap()
                .iter()
                .filter(|p| p.contains("regulatory data specialist"))
                .cloned()
                .collect()
        }
    }

    #[async_trait]
    impl CompletionModel for RouterModel {
        async fn complete(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            if prompt.contains("strategic FDA data planner") {
                Ok(self.plan.clone())
            } else if prompt.contains("regulatory data specialist") {
                Ok(format!(
                    "Thought: I have the codes\nFinal Answer: {}",
                    self.research_answer
                ))
            } else {
                Ok(REPORT.to_string())
            }
        }
    }

    struct StubDownloader;

    #[async_trait]
    impl FileDownloader for StubDownloader {
        async fn download(&self, _url: &str, file_name: &str, dir: &Path) -> Option<PathBuf> {
            Some(dir.join(file_name))
        }
    }

    /// 只在前 `times` 次复核时给出反馈
    struct CountingReview {
        times: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl AnalystReview for CountingReview {
        async fn review(&self, _state: &PipelineState) -> Result<Option<String>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok((call < self.times).then(|| "Also check archived NDC files".to_string()))
        }
    }

    fn create_test_pipeline(
        model: Arc<RouterModel>,
        temp_dir: &TempDir,
    ) -> (ResearchPipeline, Arc<MemoryCheckpointer>) {
        let mut config = Config::default();
        config.research.verbose = false;
        config.download.directory = temp_dir.path().join("downloaded_files");

        let context = PipelineContext::with_collaborators(
            config,
            model,
            ToolRegistry::new(),
            Arc::new(StubDownloader),
        );
        let checkpointer = Arc::new(MemoryCheckpointer::new());
        let pipeline = ResearchPipeline::build(context).with_checkpointer(checkpointer.clone());
        (pipeline, checkpointer)
    }

    #[tokio::test]
    async fn test_run_returns_executor_response() {
        let temp_dir = TempDir::new().unwrap();
        let model = Arc::new(RouterModel::new(
            PLAN,
            r#"[{"labeler_code": "00002", "file_url": "http://x/f.csv", "file_name": "f.csv"}]"#,
        ));
        let (pipeline, checkpointer) = create_test_pipeline(model.clone(), &temp_dir);

        let report = pipeline.run("Labeler code 00002").await.unwrap();
        assert_eq!(report, REPORT);

        let history = checkpointer.history("1").await.unwrap();
        let nodes: Vec<GraphNode> = history.iter().map(|c| c.next).collect();
        assert_eq!(
            nodes,
            vec![GraphNode::Researcher, GraphNode::Executor, GraphNode::Done]
        );

        let latest = pipeline.get_state("1").await.unwrap().unwrap();
        assert_eq!(latest.step, 3);
        let files = latest.state.downloaded_files.unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("f.csv"));
    }

    #[tokio::test]
    async fn test_analyst_feedback_loops_back_to_researcher() {
        let temp_dir = TempDir::new().unwrap();
        let model = Arc::new(RouterModel::new(PLAN, "[]"));
        let (pipeline, checkpointer) = create_test_pipeline(model.clone(), &temp_dir);
        let pipeline = pipeline.with_analyst_review(Arc::new(CountingReview {
            times: 1,
            calls: AtomicUsize::new(0),
        }));

        let state = pipeline
            .invoke(PipelineState::new("Labeler code 00002"), "loop")
            .await
            .unwrap();

        assert_eq!(state.executor_response.as_deref(), Some(REPORT));
        assert!(state.human_analyst_feedback.is_none());

        let research_prompts = model.research_prompts();
        assert_eq!(research_prompts.len(), 2);
        assert!(!research_prompts[0].contains("Also check archived NDC files"));
        assert!(research_prompts[1].contains("Also check archived NDC files"));

        let nodes: Vec<GraphNode> = checkpointer
            .history("loop")
            .await
            .unwrap()
            .iter()
            .map(|c| c.next)
            .collect();
        assert_eq!(
            nodes,
            vec![
                GraphNode::Researcher,
                GraphNode::Executor,
                GraphNode::Researcher,
                GraphNode::Executor,
                GraphNode::Done
            ]
        );
    }

    #[tokio::test]
    async fn test_recursion_limit_stops_runaway_loop() {
        let temp_dir = TempDir::new().unwrap();
        let model = Arc::new(RouterModel::new(PLAN, "[]"));
        let (pipeline, _) = create_test_pipeline(model, &temp_dir);
        let pipeline = pipeline.with_analyst_review(Arc::new(CountingReview {
            times: usize::MAX,
            calls: AtomicUsize::new(0),
        }));

        let err = pipeline.run("Labeler code 00002").await.unwrap_err();
        match err.downcast_ref::<PipelineError>() {
            Some(PipelineError::RecursionLimit { limit }) => assert_eq!(*limit, 25),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_submit_feedback_resumes_from_researcher() {
        let temp_dir = TempDir::new().unwrap();
        let model = Arc::new(RouterModel::new(PLAN, "[]"));
        let (pipeline, _) = create_test_pipeline(model.clone(), &temp_dir);

        pipeline.run("Labeler code 00002").await.unwrap();
        let state = pipeline
            .submit_feedback("1", "Focus on the NDC zip archive")
            .await
            .unwrap();

        assert_eq!(state.executor_response.as_deref(), Some(REPORT));
        assert!(state.human_analyst_feedback.is_none());
        assert_eq!(model.research_prompts().len(), 2);

        let latest = pipeline.get_state("1").await.unwrap().unwrap();
        assert_eq!(latest.step, 5);
        assert_eq!(latest.next, GraphNode::Done);
    }

    #[tokio::test]
    async fn test_submit_feedback_without_checkpoint() {
        let temp_dir = TempDir::new().unwrap();
        let model = Arc::new(RouterModel::new(PLAN, "[]"));
        let (pipeline, _) = create_test_pipeline(model, &temp_dir);

        let err = pipeline.submit_feedback("missing", "x").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::CheckpointNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_plan_parse_failure_aborts_run() {
        let temp_dir = TempDir::new().unwrap();
        let model = Arc::new(RouterModel::new("I could not produce a plan", "[]"));
        let (pipeline, checkpointer) = create_test_pipeline(model.clone(), &temp_dir);

        let err = pipeline.run("Labeler code 00002").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::PlanParse(_))
        ));
        assert!(model.research_prompts().is_empty());
        assert!(checkpointer.latest("1").await.unwrap().is_none());
    }

    #[test]
    fn test_timing_report() {
        let mut timing = TimingScope::new();
        timing.start_phase("planner");
        assert!(timing.end_phase("planner").is_some());
        assert!(timing.end_phase("researcher").is_none());

        let report = timing.generate_timing_report();
        assert!(report.contains("总执行时间"));
        assert!(report.contains("- planner:"));
        assert_eq!(timing.get_phase_durations().len(), 1);
    }
}
