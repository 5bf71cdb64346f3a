use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::generator::state::PipelineState;

pub const REPORT_FILE: &str = "report.md";
pub const RECORDS_FILE: &str = "records.json";
pub const PLAN_FILE: &str = "plan.json";

/// 保存运行结果
pub async fn save(state: &PipelineState, output_path: &Path) -> Result<()> {
    let outlet = DiskOutlet::new(output_path.to_path_buf());
    outlet.save(state).await
}

#[allow(async_fn_in_trait)]
pub trait Outlet {
    async fn save(&self, state: &PipelineState) -> Result<()>;
}

pub struct DiskOutlet {
    output_path: PathBuf,
}

impl DiskOutlet {
    pub fn new(output_path: PathBuf) -> Self {
        Self { output_path }
    }

    fn write_json<T: Serialize>(&self, file_name: &str, value: &T) -> Result<()> {
        let path = self.output_path.join(file_name);
        let content = serde_json::to_string_pretty(value)?;
        fs::write(&path, content).context(format!("Failed to write {}", path.display()))
    }
}

impl Outlet for DiskOutlet {
    async fn save(&self, state: &PipelineState) -> Result<()> {
        info!("🖊️ 保存运行结果到 {}", self.output_path.display());
        fs::create_dir_all(&self.output_path).context(format!(
            "Failed to create output directory: {}",
            self.output_path.display()
        ))?;

        if let Some(report) = &state.executor_response {
            let path = self.output_path.join(REPORT_FILE);
            let content = format!("# {}\n\n{}\n", state.title, report.trim_end());
            fs::write(&path, content).context(format!("Failed to write {}", path.display()))?;
        }
        if let Some(records) = &state.publisher_response {
            self.write_json(RECORDS_FILE, records)?;
        }
        if let Some(plan) = &state.planner_response {
            self.write_json(PLAN_FILE, plan)?;
        }

        info!("💾 运行结果已保存");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::state::ResearchRecord;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_save_writes_available_artifacts() {
        let temp_dir = TempDir::new().unwrap();
        let output = temp_dir.path().join("run");
        let mut state = PipelineState::new("Labeler code 00002");
        state.publisher_response = Some(vec![ResearchRecord::with_code("00002")]);
        state.executor_response = Some("Labeler Code: 00002\n".to_string());

        save(&state, &output).await.unwrap();

        let report = fs::read_to_string(output.join(REPORT_FILE)).unwrap();
        assert_eq!(report, "# Labeler code 00002\n\nLabeler Code: 00002\n");
        let records = fs::read_to_string(output.join(RECORDS_FILE)).unwrap();
        assert!(records.contains("\"code\": \"00002\""));
        assert!(!output.join(PLAN_FILE).exists());
    }
}
