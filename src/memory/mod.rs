//! 检查点存储：按会话(thread)保存每个阶段结束后的Pipeline状态

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::generator::state::PipelineState;
use crate::generator::types::GraphNode;

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint requires a non-empty thread id")]
    ThreadIdRequired,
    #[error("failed to (de)serialize checkpoint: {0}")]
    Serialization(String),
}

/// 一个阶段结束后的快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: Uuid,
    pub thread_id: String,
    pub state: PipelineState,
    /// 恢复时要执行的下一个节点
    pub next: GraphNode,
    /// 该会话累计执行的阶段数
    pub step: usize,
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(thread_id: &str, state: PipelineState, next: GraphNode, step: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            thread_id: thread_id.to_string(),
            state,
            next,
            step,
            updated_at: Utc::now(),
        }
    }
}

/// 检查点存储
#[async_trait]
pub trait Checkpointer: Send + Sync {
    async fn put(&self, checkpoint: Checkpoint) -> Result<(), CheckpointError>;

    /// 会话最新的检查点
    async fn latest(&self, thread_id: &str) -> Result<Option<Checkpoint>, CheckpointError>;

    /// 会话的全部检查点，按写入顺序
    async fn history(&self, thread_id: &str) -> Result<Vec<Checkpoint>, CheckpointError>;
}

/// 进程内检查点存储，快照以JSON值保存
#[derive(Debug, Default)]
pub struct MemoryCheckpointer {
    threads: RwLock<HashMap<String, Vec<Value>>>,
}

impl MemoryCheckpointer {
    pub fn new() -> Self {
        Self::default()
    }
}

fn decode(value: &Value) -> Result<Checkpoint, CheckpointError> {
    serde_json::from_value(value.clone()).map_err(|e| CheckpointError::Serialization(e.to_string()))
}

#[async_trait]
impl Checkpointer for MemoryCheckpointer {
    async fn put(&self, checkpoint: Checkpoint) -> Result<(), CheckpointError> {
        if checkpoint.thread_id.trim().is_empty() {
            return Err(CheckpointError::ThreadIdRequired);
        }
        let value = serde_json::to_value(&checkpoint)
            .map_err(|e| CheckpointError::Serialization(e.to_string()))?;

        let mut threads = self.threads.write().await;
        threads
            .entry(checkpoint.thread_id.clone())
            .or_default()
            .push(value);
        Ok(())
    }

    async fn latest(&self, thread_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        let threads = self.threads.read().await;
        threads
            .get(thread_id)
            .and_then(|entries| entries.last())
            .map(decode)
            .transpose()
    }

    async fn history(&self, thread_id: &str) -> Result<Vec<Checkpoint>, CheckpointError> {
        let threads = self.threads.read().await;
        threads
            .get(thread_id)
            .map(|entries| entries.iter().map(decode).collect())
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}
