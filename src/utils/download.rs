//! 文件下载：执行阶段按记录中的 file_url / file_name 下载数据文件

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::config::DownloadConfig;

/// 文件下载协作者，失败时返回 `None`，从不报错
#[async_trait]
pub trait FileDownloader: Send + Sync {
    async fn download(&self, url: &str, file_name: &str, dir: &Path) -> Option<PathBuf>;
}

/// 只保留文件名的最后一段，拒绝空名与 `.`/`..`
pub fn sanitize_file_name(file_name: &str) -> Option<String> {
    let normalized = file_name.trim().replace('\\', "/");
    let last = normalized.rsplit('/').next()?.trim();
    if last.is_empty() || last == "." || last == ".." {
        return None;
    }
    Some(last.to_string())
}

/// 将响应体流式写入文件；写入失败时删除不完整的文件
pub async fn stream_to_file(response: reqwest::Response, path: &Path) -> Result<u64> {
    let mut file = tokio::fs::File::create(path)
        .await
        .context(format!("Failed to create file: {}", path.display()))?;

    match write_body(response, &mut file).await {
        Ok(written) => Ok(written),
        Err(e) => {
            drop(file);
            if let Err(remove_err) = tokio::fs::remove_file(path).await {
                warn!("⚠️ 无法删除不完整的文件 '{}': {}", path.display(), remove_err);
            }
            Err(e)
        }
    }
}

async fn write_body(response: reqwest::Response, file: &mut tokio::fs::File) -> Result<u64> {
    let mut stream = response.bytes_stream();
    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.context("Failed to read response body")?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}

/// 基于reqwest的下载实现
pub struct HttpFileDownloader {
    client: reqwest::Client,
}

impl HttpFileDownloader {
    pub fn new(config: &DownloadConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build download client")?;
        Ok(Self { client })
    }

    async fn try_download(&self, url: &str, file_name: &str, dir: &Path) -> Result<PathBuf> {
        let file_name = sanitize_file_name(file_name)
            .ok_or_else(|| anyhow!("invalid file name '{}'", file_name))?;
        tokio::fs::create_dir_all(dir)
            .await
            .context(format!("Failed to create directory: {}", dir.display()))?;
        let path = dir.join(file_name);

        let response = self.client.get(url).send().await?.error_for_status()?;
        stream_to_file(response, &path).await?;
        Ok(path)
    }
}

#[async_trait]
impl FileDownloader for HttpFileDownloader {
    async fn download(&self, url: &str, file_name: &str, dir: &Path) -> Option<PathBuf> {
        match self.try_download(url, file_name, dir).await {
            Ok(path) => {
                info!("✅ 已下载 '{}' 到 '{}'", file_name, path.display());
                Some(path)
            }
            Err(e) => {
                warn!("❌ 下载失败 '{}': {:#}", url, e);
                None
            }
        }
    }
}
