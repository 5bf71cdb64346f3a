//! 浏览器工具的调用契约：参数结构与动作词表

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::llm::decoder::StructuredResponseDecoder;

pub const DEFAULT_ACTION: &str = "scrape_page";
pub const DEFAULT_DOWNLOAD_PATH: &str = "downloads";
pub const DEFAULT_TABLE_SELECTOR: &str = "table";

fn default_action() -> String {
    DEFAULT_ACTION.to_string()
}

fn default_download_path() -> String {
    DEFAULT_DOWNLOAD_PATH.to_string()
}

fn default_table_selector() -> String {
    DEFAULT_TABLE_SELECTOR.to_string()
}

/// 支持的动作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserAction {
    Navigate,
    ScrapePage,
    FindLinks,
    DownloadFile,
    Click,
    FillForm,
    Search,
    ExtractTable,
}

impl BrowserAction {
    pub const ALL: [BrowserAction; 8] = [
        BrowserAction::Navigate,
        BrowserAction::ScrapePage,
        BrowserAction::FindLinks,
        BrowserAction::DownloadFile,
        BrowserAction::Click,
        BrowserAction::FillForm,
        BrowserAction::Search,
        BrowserAction::ExtractTable,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BrowserAction::Navigate => "navigate",
            BrowserAction::ScrapePage => "scrape_page",
            BrowserAction::FindLinks => "find_links",
            BrowserAction::DownloadFile => "download_file",
            BrowserAction::Click => "click",
            BrowserAction::FillForm => "fill_form",
            BrowserAction::Search => "search",
            BrowserAction::ExtractTable => "extract_table",
        }
    }
}

impl fmt::Display for BrowserAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BrowserAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim();
        BrowserAction::ALL
            .iter()
            .find(|action| action.as_str() == normalized)
            .copied()
            .ok_or_else(|| format!("Unknown action: {}", s))
    }
}

/// 一次工具调用的参数
///
/// 字段名使用snake_case，同时接受camelCase别名。`action` 保持为字符串，
/// 未知动作在执行时以文本错误返回。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ToolInvocation {
    /// URL to navigate to
    pub url: String,

    /// Action to perform: navigate, scrape_page, find_links, download_file, click, fill_form, search, extract_table
    #[serde(default = "default_action")]
    pub action: String,

    /// CSS selector for targeting specific elements (click, fill_form, scrape_page, search)
    #[serde(default)]
    pub selector: String,

    /// Text to enter when using fill_form with a single selector
    #[serde(default, alias = "textToEnter")]
    pub text_to_enter: String,

    /// File type to look for with find_links (e.g. zip, csv, xlsx)
    #[serde(default, alias = "fileType")]
    pub file_type: String,

    /// Selector to wait for before performing the action
    #[serde(default, alias = "waitFor")]
    pub wait_for: String,

    /// Directory to save downloaded files
    #[serde(default = "default_download_path", alias = "downloadPath")]
    pub download_path: String,

    /// Map of form field selectors to values for fill_form
    #[serde(default, alias = "formData")]
    pub form_data: BTreeMap<String, String>,

    /// Term to search for with the search action
    #[serde(default, alias = "searchTerm")]
    pub search_term: String,

    /// CSS selector for tables with extract_table
    #[serde(default = "default_table_selector", alias = "tableSelector")]
    pub table_selector: String,
}

impl ToolInvocation {
    /// 只有URL的调用，动作为默认的 scrape_page
    pub fn for_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            action: default_action(),
            selector: String::new(),
            text_to_enter: String::new(),
            file_type: String::new(),
            wait_for: String::new(),
            download_path: default_download_path(),
            form_data: BTreeMap::new(),
            search_term: String::new(),
            table_selector: default_table_selector(),
        }
    }

    pub fn with_action(mut self, action: BrowserAction) -> Self {
        self.action = action.to_string();
        self
    }

    /// 解析原始文本：能按结构解析则使用，否则视为裸URL
    pub fn from_raw(raw: &str) -> Self {
        let cleaned = StructuredResponseDecoder::strip_code_fences(raw);
        match serde_json::from_str::<ToolInvocation>(&cleaned) {
            Ok(invocation) => invocation,
            Err(_) => Self::for_url(cleaned.trim().trim_matches(|c| c == '"' || c == '\'')),
        }
    }

    pub fn parsed_action(&self) -> Result<BrowserAction, String> {
        self.action.parse()
    }

    /// fill_form 要填写的字段：优先 form_data，否则使用 selector/text_to_enter
    pub fn form_fields(&self) -> Vec<(String, String)> {
        if self.form_data.is_empty() {
            vec![(self.selector.clone(), self.text_to_enter.clone())]
        } else {
            self.form_data
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        }
    }

    /// 该类型的JSON Schema，附在工具说明中
    pub fn json_schema() -> String {
        let schema = schemars::schema_for!(ToolInvocation);
        serde_json::to_string(&schema).unwrap_or_default()
    }
}

/// 工具输入：结构化对象或原始文本
#[derive(Debug, Clone, PartialEq)]
pub enum ToolInput {
    Structured(Value),
    Raw(String),
}

impl ToolInput {
    /// 转换为调用参数；结构化对象不符合约定时返回错误描述
    pub fn into_invocation(self) -> Result<ToolInvocation, String> {
        match self {
            ToolInput::Raw(raw) => Ok(ToolInvocation::from_raw(&raw)),
            ToolInput::Structured(Value::String(raw)) => Ok(ToolInvocation::from_raw(&raw)),
            ToolInput::Structured(value) => serde_json::from_value(value)
                .map_err(|e| format!("Invalid tool input: {}", e)),
        }
    }
}

impl From<&str> for ToolInput {
    fn from(raw: &str) -> Self {
        ToolInput::Raw(raw.to_string())
    }
}

impl From<Value> for ToolInput {
    fn from(value: Value) -> Self {
        ToolInput::Structured(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_action_vocabulary() {
        for action in BrowserAction::ALL {
            assert_eq!(action.as_str().parse::<BrowserAction>().unwrap(), action);
        }
        assert_eq!(
            "hover".parse::<BrowserAction>().unwrap_err(),
            "Unknown action: hover"
        );
    }

    #[test]
    fn test_defaults_from_minimal_json() {
        let invocation = ToolInvocation::from_raw(r#"{"url": "https://www.fda.gov"}"#);
        assert_eq!(invocation.url, "https://www.fda.gov");
        assert_eq!(invocation.action, "scrape_page");
        assert_eq!(invocation.download_path, "downloads");
        assert_eq!(invocation.table_selector, "table");
        assert!(invocation.form_data.is_empty());
    }

    #[test]
    fn test_snake_and_camel_case_fields() {
        let snake = ToolInvocation::from_raw(
            r#"{"url": "u", "action": "search", "search_term": "labeler code", "file_type": "zip"}"#,
        );
        let camel = ToolInvocation::from_raw(
            r#"{"url": "u", "action": "search", "searchTerm": "labeler code", "fileType": "zip"}"#,
        );
        assert_eq!(snake, camel);
        assert_eq!(snake.search_term, "labeler code");
    }

    #[test]
    fn test_fenced_json_input() {
        let invocation = ToolInvocation::from_raw(
            "```json\n{\"url\": \"https://x.test\", \"action\": \"find_links\", \"file_type\": \"csv\"}\n```",
        );
        assert_eq!(invocation.parsed_action(), Ok(BrowserAction::FindLinks));
        assert_eq!(invocation.file_type, "csv");
    }

    #[test]
    fn test_raw_url_falls_back_to_scrape() {
        let invocation = ToolInvocation::from_raw("  'https://www.fda.gov/drugs'  ");
        assert_eq!(invocation.url, "https://www.fda.gov/drugs");
        assert_eq!(invocation.parsed_action(), Ok(BrowserAction::ScrapePage));
    }

    #[test]
    fn test_structured_input_requires_url() {
        let err = ToolInput::from(json!({"action": "navigate"}))
            .into_invocation()
            .unwrap_err();
        assert!(err.starts_with("Invalid tool input"));

        let ok = ToolInput::from(json!({"url": "https://x.test", "action": "click", "selector": "#go"}))
            .into_invocation()
            .unwrap();
        assert_eq!(ok.selector, "#go");
    }

    #[test]
    fn test_form_fields_prefers_form_data() {
        let mut invocation = ToolInvocation::for_url("u");
        invocation.selector = "#q".into();
        invocation.text_to_enter = "aspirin".into();
        assert_eq!(
            invocation.form_fields(),
            vec![("#q".to_string(), "aspirin".to_string())]
        );

        invocation
            .form_data
            .insert("#name".into(), "Acme".into());
        assert_eq!(
            invocation.form_fields(),
            vec![("#name".to_string(), "Acme".to_string())]
        );
    }

    #[test]
    fn test_schema_mentions_fields() {
        let schema = ToolInvocation::json_schema();
        assert!(schema.contains("\"url\""));
        assert!(schema.contains("table_selector"));
    }
}
