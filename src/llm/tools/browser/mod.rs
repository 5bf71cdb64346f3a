//! 浏览器自动化工具：每次调用执行一个动作，所有失败都以文本返回给Agent

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::BrowserConfig;
use crate::llm::tools::AgentTool;
use crate::utils::text::{clean_lines, truncate_chars};

pub mod driver;
pub mod http_driver;
pub mod invocation;

pub use driver::{BrowserDriver, LinkKind, PageLink, PageSession, TableData};
pub use http_driver::HttpBrowserDriver;
pub use invocation::{BrowserAction, ToolInput, ToolInvocation};

pub const TOOL_NAME: &str = "browser_web_tool";

/// 未指定选择器时依次尝试的搜索框
pub const SEARCH_INPUT_SELECTORS: [&str; 7] = [
    "input[type='search']",
    "input[name='search']",
    "input[name='q']",
    "input[placeholder*='search' i]",
    "input[aria-label*='search' i]",
    ".search-input",
    "#search",
];

const TOOL_DESCRIPTION: &str = r#"Web interaction tool that can navigate websites, extract content, fill forms, click elements, find and download files, and extract tables. Each call opens a fresh page, performs one action and closes it.
Actions:
- 'navigate': Load a URL, optionally waiting for the 'wait_for' selector
- 'scrape_page': Extract readable text from the page, or from elements matching 'selector'
- 'find_links': Locate links whose URL or text contains 'file_type' (zip, csv, pdf, ...)
- 'download_file': Download the file at the URL into 'download_path'
- 'click': Click the element matching 'selector'
- 'fill_form': Fill 'form_data' (selector to value) or 'selector' with 'text_to_enter'
- 'search': Type 'search_term' into the page's search box and submit it
- 'extract_table': Extract rows from tables matching 'table_selector'
Usage examples:
{"url": "https://www.fda.gov", "action": "navigate"}
{"url": "https://www.fda.gov", "action": "search", "search_term": "labeler code", "selector": "input[name='q']"}
{"url": "https://www.fda.gov/drugs/drug-approvals-and-databases/national-drug-code-directory", "action": "find_links", "file_type": "zip"}
{"url": "https://www.accessdata.fda.gov/scripts/cder/ndc/", "action": "extract_table", "table_selector": "table"}"#;

/// 浏览器自动化工具
pub struct BrowserAutomationTool {
    driver: Arc<dyn BrowserDriver>,
    config: BrowserConfig,
}

impl BrowserAutomationTool {
    pub fn new(driver: Arc<dyn BrowserDriver>, config: BrowserConfig) -> Self {
        Self { driver, config }
    }

    fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.config.wait_timeout_ms)
    }

    fn action_timeout(&self) -> Duration {
        Duration::from_millis(self.config.action_timeout_ms)
    }

    /// 下载目录：只接受不含 `..` 的相对路径，否则使用配置的目录
    fn download_dir(&self, requested: &str) -> PathBuf {
        let requested = requested.trim();
        let path = Path::new(requested);
        let is_contained = !requested.is_empty()
            && path
                .components()
                .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if is_contained {
            path.to_path_buf()
        } else {
            self.config.download_path.clone()
        }
    }

    /// 执行一次结构化或文本形式的调用
    pub async fn invoke_input(&self, input: ToolInput) -> String {
        match input.into_invocation() {
            Ok(invocation) => self.run(&invocation).await,
            Err(message) => message,
        }
    }

    /// 执行一次调用：打开会话、执行动作、关闭会话
    pub async fn run(&self, invocation: &ToolInvocation) -> String {
        let action = match invocation.parsed_action() {
            Ok(action) => action,
            Err(message) => return message,
        };
        debug!("🌐 {} {}", action, invocation.url);

        let mut session = match self.driver.open_session().await {
            Ok(session) => session,
            Err(e) => return format!("Error during {}: {}", action, e),
        };

        let result = self.dispatch(session.as_mut(), action, invocation).await;

        if let Err(e) = session.close().await {
            warn!("⚠️ 关闭浏览器会话失败: {}", e);
        }
        result
    }

    async fn dispatch(
        &self,
        page: &mut dyn PageSession,
        action: BrowserAction,
        invocation: &ToolInvocation,
    ) -> String {
        let url = invocation.url.as_str();

        if action == BrowserAction::Navigate {
            return self.navigate(page, url, &invocation.wait_for).await;
        }

        // 其余动作先加载页面
        if let Err(e) = page.goto(url).await {
            return format!("Error during {}: {}", action, e);
        }
        if let Err(e) = page.wait_for_network_idle().await {
            return format!("Error during {}: {}", action, e);
        }
        if !invocation.wait_for.is_empty()
            && let Err(e) = page
                .wait_for_selector(&invocation.wait_for, self.wait_timeout(), false)
                .await
        {
            return format!(
                "Navigated to {} but failed to find element matching '{}': {}",
                url, invocation.wait_for, e
            );
        }

        match action {
            BrowserAction::Navigate => format!("Successfully navigated to {}", url),
            BrowserAction::ScrapePage => self.scrape_page(page, &invocation.selector).await,
            BrowserAction::FindLinks => self.find_links(page, &invocation.file_type).await,
            BrowserAction::DownloadFile => {
                self.download_file(page, url, &invocation.download_path)
                    .await
            }
            BrowserAction::Click => self.click(page, &invocation.selector).await,
            BrowserAction::FillForm => self.fill_form(page, &invocation.form_fields()).await,
            BrowserAction::Search => {
                self.search(page, &invocation.search_term, &invocation.selector)
                    .await
            }
            BrowserAction::ExtractTable => {
                self.extract_table(page, &invocation.table_selector).await
            }
        }
    }

    async fn navigate(&self, page: &mut dyn PageSession, url: &str, wait_for: &str) -> String {
        if let Err(e) = page.goto(url).await {
            return format!("Error navigating to {}: {}", url, e);
        }
        if let Err(e) = page.wait_for_network_idle().await {
            return format!("Error navigating to {}: {}", url, e);
        }
        if wait_for.is_empty() {
            return format!("Successfully navigated to {}", url);
        }
        match page
            .wait_for_selector(wait_for, self.wait_timeout(), false)
            .await
        {
            Ok(()) => format!(
                "Successfully navigated to {} and found element matching '{}'",
                url, wait_for
            ),
            Err(e) => format!(
                "Navigated to {} but could not find element matching '{}': {}",
                url, wait_for, e
            ),
        }
    }

    async fn scrape_page(&self, page: &mut dyn PageSession, selector: &str) -> String {
        if !selector.is_empty() && selector != "body" {
            return match page.texts_of(selector).await {
                Ok(texts) => texts
                    .into_iter()
                    .filter(|t| !t.is_empty())
                    .collect::<Vec<_>>()
                    .join("\n\n"),
                Err(e) => format!(
                    "Error extracting content with selector '{}': {}",
                    selector, e
                ),
            };
        }

        match page.visible_text().await {
            Ok(text) => clean_lines(&text),
            Err(e) => format!("Error extracting page content: {}", e),
        }
    }

    async fn find_links(&self, page: &mut dyn PageSession, file_type: &str) -> String {
        let candidates = match page.links().await {
            Ok(links) => links,
            Err(e) => return format!("Error finding links: {}", e),
        };

        let links = select_links(candidates, file_type);
        if links.is_empty() {
            return format!("No links containing '{}' found on the page.", file_type);
        }

        let mut result = format!(
            "Found {} links related to '{}':\n\n",
            links.len(),
            file_type
        );
        for (index, link) in links.iter().enumerate() {
            result.push_str(&format!("{}. {}: {}\n", index + 1, link.text, link.url));
        }
        result
    }

    async fn download_file(
        &self,
        page: &mut dyn PageSession,
        url: &str,
        download_path: &str,
    ) -> String {
        let dir = self.download_dir(download_path);

        if page.current_url() != url
            && let Err(e) = page.goto(url).await
        {
            debug!("download target is not a page: {}", e);
        }

        let via_control = match page.download_from_control(&dir).await {
            Ok(saved) => saved,
            Err(e) => {
                debug!("download control failed, requesting url directly: {}", e);
                None
            }
        };
        let saved = match via_control {
            Some(path) => Ok(path),
            None => page.download_url(url, &dir).await,
        };

        match saved {
            Ok(path) => format!("Successfully downloaded file to {}", path.display()),
            Err(e) => format!("Error initiating download: {}", e),
        }
    }

    async fn click(&self, page: &mut dyn PageSession, selector: &str) -> String {
        if selector.is_empty() {
            return "Error clicking element: no selector provided".to_string();
        }
        let outcome = async {
            page.wait_for_selector(selector, self.action_timeout(), true)
                .await?;
            page.click(selector).await?;
            page.wait_for_network_idle().await
        }
        .await;

        match outcome {
            Ok(()) => format!(
                "Successfully clicked element matching selector: '{}'",
                selector
            ),
            Err(e) => format!("Error clicking element: {}", e),
        }
    }

    async fn fill_form(&self, page: &mut dyn PageSession, fields: &[(String, String)]) -> String {
        let mut results = Vec::with_capacity(fields.len());
        for (selector, value) in fields {
            let outcome = async {
                page.wait_for_selector(selector, self.action_timeout(), true)
                    .await?;
                page.fill(selector, value).await
            }
            .await;
            match outcome {
                Ok(()) => results.push(format!("Filled '{}' with value: '{}'", selector, value)),
                Err(e) => results.push(format!("Error filling '{}': {}", selector, e)),
            }
        }
        results.join("\n")
    }

    async fn search(&self, page: &mut dyn PageSession, search_term: &str, selector: &str) -> String {
        let mut chosen = selector.to_string();
        if chosen.is_empty() {
            for candidate in SEARCH_INPUT_SELECTORS {
                if page.exists(candidate).await.unwrap_or(false) {
                    chosen = candidate.to_string();
                    break;
                }
            }
        }
        if chosen.is_empty() {
            return "Could not find a search input on the page.".to_string();
        }

        let outcome = async {
            page.fill(&chosen, search_term).await?;
            page.press_enter(&chosen).await?;
            page.wait_for_network_idle().await?;
            page.visible_text().await
        }
        .await;

        match outcome {
            Ok(text) => {
                let text = clean_lines(&text);
                format!(
                    "Searched for '{}' using selector '{}'. Current URL: {}\n\nSearch Results Preview:\n{}...",
                    search_term,
                    chosen,
                    page.current_url(),
                    truncate_chars(&text, self.config.search_preview_chars)
                )
            }
            Err(e) => format!("Error during search: {}", e),
        }
    }

    async fn extract_table(&self, page: &mut dyn PageSession, table_selector: &str) -> String {
        let tables = match page.tables(table_selector).await {
            Ok(tables) => tables,
            Err(e) => return format!("Error extracting tables: {}", e),
        };
        if tables.is_empty() {
            return "No tables found matching the selector.".to_string();
        }
        format_tables(&tables, self.config.table_preview_rows)
    }
}

/// 按文件类型筛选链接并按URL去重
pub fn select_links(candidates: Vec<PageLink>, file_type: &str) -> Vec<PageLink> {
    let needle = file_type.to_lowercase();
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|link| {
            let text = link.text.to_lowercase();
            match link.kind {
                LinkKind::Anchor => link.url.to_lowercase().contains(&needle) || text.contains(&needle),
                LinkKind::Interactive => {
                    text.contains("download") || (!needle.is_empty() && text.contains(&needle))
                }
            }
        })
        .filter(|link| seen.insert(link.url.clone()))
        .collect()
}

/// 首行作为表头，其余为数据行，每个表格只展示前几行
pub fn format_tables(tables: &[TableData], preview_rows: usize) -> String {
    let mut result = format!("Extracted {} table(s):\n\n", tables.len());
    for (index, table) in tables.iter().enumerate() {
        let headers = table.rows.first().cloned().unwrap_or_default();
        let body = if headers.is_empty() {
            &table.rows[..]
        } else {
            &table.rows[1..]
        };

        result.push_str(&format!("Table {}:\n", index + 1));
        if !headers.is_empty() {
            result.push_str(&format!("Headers: {}\n", json_row(&headers)));
        }
        result.push_str(&format!("Rows: {}\n", body.len()));
        result.push_str("Preview:\n");
        for row in body.iter().take(preview_rows) {
            result.push_str(&json_row(row));
            result.push('\n');
        }
        result.push('\n');
    }
    result
}

fn json_row(cells: &[String]) -> String {
    serde_json::to_string(cells).unwrap_or_default()
}

#[async_trait]
impl AgentTool for BrowserAutomationTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> String {
        format!(
            "{}\nInput must be a JSON object matching this schema (a bare URL is treated as scrape_page): {}",
            TOOL_DESCRIPTION,
            ToolInvocation::json_schema()
        )
    }

    async fn invoke(&self, input: &str) -> String {
        self.invoke_input(ToolInput::from(input)).await
    }
}
