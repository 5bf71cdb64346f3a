//! 结构化响应解码器 - 去除markdown代码块包裹后按JSON解析模型输出

use std::sync::LazyLock;

use regex::Regex;
use serde::de::DeserializeOwned;
use thiserror::Error;

static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```[A-Za-z]*[ \t]*\r?\n?|```").expect("static regex"));

/// 解码失败时保留的原文片段长度
const EXCERPT_CHARS: usize = 200;

/// 模型输出无法解码为结构化数据
#[derive(Debug, Error)]
pub enum ResponseDecodeError {
    #[error("model response is empty after removing code fences")]
    Empty,
    #[error("model response is not valid structured data: {source}; response starts with: {excerpt}")]
    Malformed {
        #[source]
        source: serde_json::Error,
        excerpt: String,
    },
}

/// 各阶段共用的结构化响应解码器
pub struct StructuredResponseDecoder;

impl StructuredResponseDecoder {
    /// 去除 ```json / ``` 包裹并裁剪空白
    pub fn strip_code_fences(text: &str) -> String {
        CODE_FENCE.replace_all(text, "").trim().to_string()
    }

    /// 去除代码块包裹后解析为目标类型
    pub fn decode<T: DeserializeOwned>(text: &str) -> Result<T, ResponseDecodeError> {
        let cleaned = Self::strip_code_fences(text);
        if cleaned.is_empty() {
            return Err(ResponseDecodeError::Empty);
        }
        serde_json::from_str(&cleaned).map_err(|source| ResponseDecodeError::Malformed {
            source,
            excerpt: cleaned.chars().take(EXCERPT_CHARS).collect(),
        })
    }
}
