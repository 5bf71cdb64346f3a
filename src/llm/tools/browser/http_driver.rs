//! 静态HTML浏览器驱动：用reqwest加载页面，用scraper解析DOM
//!
//! 不执行JavaScript。点击链接等价于跟随其href，按回车或点击提交按钮等价于提交所在表单。

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::driver::{BrowserDriver, PageLink, PageSession, TableData};
use crate::config::BrowserConfig;
use crate::utils::download::{sanitize_file_name, stream_to_file};

/// 下载文件名无法确定时使用的名称
const FALLBACK_FILE_NAME: &str = "download";

/// 基于HTTP请求的浏览器驱动
pub struct HttpBrowserDriver {
    client: reqwest::Client,
    page_load_timeout: Duration,
}

impl HttpBrowserDriver {
    pub fn new(config: &BrowserConfig) -> Result<Self> {
        let page_load_timeout = Duration::from_millis(config.page_load_timeout_ms);
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(page_load_timeout)
            .build()
            .context("Failed to build browser http client")?;
        Ok(Self {
            client,
            page_load_timeout,
        })
    }
}

#[async_trait]
impl BrowserDriver for HttpBrowserDriver {
    async fn open_session(&self) -> Result<Box<dyn PageSession>> {
        Ok(Box::new(HttpPageSession {
            client: self.client.clone(),
            page_load_timeout: self.page_load_timeout,
            url: None,
            html: String::new(),
            filled: Vec::new(),
        }))
    }
}

/// 已填写但尚未提交的表单字段
#[derive(Debug, Clone)]
struct FilledField {
    name: String,
    value: String,
    form: Option<usize>,
}

/// 单页面会话
pub struct HttpPageSession {
    client: reqwest::Client,
    page_load_timeout: Duration,
    url: Option<Url>,
    html: String,
    filled: Vec<FilledField>,
}

impl HttpPageSession {
    fn base_url(&self) -> Result<&Url> {
        self.url.as_ref().ok_or_else(|| anyhow!("no page has been loaded"))
    }

    fn resolve(&self, target: &str) -> Result<Url> {
        match Url::parse(target) {
            Ok(url) => Ok(url),
            Err(_) => {
                let base = self.base_url()?;
                base.join(target)
                    .context(format!("invalid url '{}'", target))
            }
        }
    }

    /// 将响应作为新页面载入；非文本内容不读取响应体
    async fn load(&mut self, response: reqwest::Response) -> Result<()> {
        let response = response.error_for_status()?;
        let final_url = response.url().clone();
        let is_document = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| {
                let v = v.to_ascii_lowercase();
                v.contains("html") || v.contains("xml") || v.starts_with("text/")
            })
            .unwrap_or(true);

        self.html = if is_document {
            response.text().await?
        } else {
            debug!("📦 {} 不是页面文档，跳过解析", final_url);
            String::new()
        };
        self.url = Some(final_url);
        self.filled.clear();
        Ok(())
    }

    async fn submit_form(&mut self, form_index: usize) -> Result<()> {
        let base = self.base_url()?.clone();
        let mut submission = dom::form_submission(&self.html, form_index, &base)?;
        for field in self.filled.iter().filter(|f| f.form == Some(form_index)) {
            match submission.fields.iter_mut().find(|(name, _)| *name == field.name) {
                Some(existing) => existing.1 = field.value.clone(),
                None => submission
                    .fields
                    .push((field.name.clone(), field.value.clone())),
            }
        }

        let request = if submission.post {
            self.client.post(submission.action).form(&submission.fields)
        } else {
            let mut url = submission.action;
            url.query_pairs_mut()
                .clear()
                .extend_pairs(submission.fields.iter().map(|(k, v)| (k.as_str(), v.as_str())));
            self.client.get(url)
        };
        let response = request.timeout(self.page_load_timeout).send().await?;
        self.load(response).await
    }
}

#[async_trait]
impl PageSession for HttpPageSession {
    async fn goto(&mut self, url: &str) -> Result<()> {
        let target = self.resolve(url)?;
        let response = self
            .client
            .get(target)
            .timeout(self.page_load_timeout)
            .send()
            .await?;
        self.load(response).await
    }

    async fn wait_for_network_idle(&mut self) -> Result<()> {
        // 静态页面加载完成即空闲
        Ok(())
    }

    async fn wait_for_selector(
        &mut self,
        selector: &str,
        timeout: Duration,
        visible: bool,
    ) -> Result<()> {
        if dom::count_matches(&self.html, selector, visible)? > 0 {
            Ok(())
        } else {
            Err(anyhow!(
                "Timeout {}ms exceeded waiting for selector '{}'",
                timeout.as_millis(),
                selector
            ))
        }
    }

    async fn exists(&mut self, selector: &str) -> Result<bool> {
        Ok(dom::count_matches(&self.html, selector, false)? > 0)
    }

    async fn visible_text(&mut self) -> Result<String> {
        dom::visible_text(&self.html)
    }

    async fn texts_of(&mut self, selector: &str) -> Result<Vec<String>> {
        dom::texts_of(&self.html, selector)
    }

    async fn links(&mut self) -> Result<Vec<PageLink>> {
        let base = self.base_url()?;
        Ok(dom::links(&self.html, base))
    }

    async fn click(&mut self, selector: &str) -> Result<()> {
        let element = dom::element_info(&self.html, selector)?
            .ok_or_else(|| anyhow!("no element matches selector '{}'", selector))?;

        if let Some(href) = element.href {
            return self.goto(&href).await;
        }
        if element.is_submit
            && let Some(form) = element.form
        {
            return self.submit_form(form).await;
        }
        debug!("🖱️ '{}' 在静态页面中没有导航效果", selector);
        Ok(())
    }

    async fn fill(&mut self, selector: &str, value: &str) -> Result<()> {
        let element = dom::element_info(&self.html, selector)?
            .ok_or_else(|| anyhow!("no element matches selector '{}'", selector))?;
        if !element.is_field {
            return Err(anyhow!(
                "Element is not an <input>, <textarea> or <select> element"
            ));
        }
        let name = element
            .name
            .ok_or_else(|| anyhow!("element '{}' has no name attribute", selector))?;

        self.filled
            .retain(|f| !(f.name == name && f.form == element.form));
        self.filled.push(FilledField {
            name,
            value: value.to_string(),
            form: element.form,
        });
        Ok(())
    }

    async fn press_enter(&mut self, selector: &str) -> Result<()> {
        let element = dom::element_info(&self.html, selector)?
            .ok_or_else(|| anyhow!("no element matches selector '{}'", selector))?;
        let form = element
            .form
            .ok_or_else(|| anyhow!("element '{}' is not inside a form", selector))?;
        self.submit_form(form).await
    }

    async fn tables(&mut self, selector: &str) -> Result<Vec<TableData>> {
        dom::tables(&self.html, selector)
    }

    async fn download_from_control(&mut self, dir: &Path) -> Result<Option<PathBuf>> {
        let base = self.base_url()?;
        match dom::download_control_href(&self.html, base) {
            Some(url) => self.download_url(url.as_str(), dir).await.map(Some),
            None => Ok(None),
        }
    }

    async fn download_url(&mut self, url: &str, dir: &Path) -> Result<PathBuf> {
        let target = self.resolve(url)?;
        let response = self
            .client
            .get(target.clone())
            .timeout(self.page_load_timeout)
            .send()
            .await?
            .error_for_status()?;

        let file_name = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(filename_from_disposition)
            .or_else(|| {
                target
                    .path_segments()
                    .and_then(|mut segments| segments.next_back().map(str::to_string))
            })
            .and_then(|name| sanitize_file_name(&name))
            .unwrap_or_else(|| FALLBACK_FILE_NAME.to_string());

        tokio::fs::create_dir_all(dir)
            .await
            .context(format!("Failed to create directory: {}", dir.display()))?;
        let path = dir.join(file_name);
        stream_to_file(response, &path).await?;
        Ok(path)
    }

    fn current_url(&self) -> String {
        self.url.as_ref().map(Url::to_string).unwrap_or_default()
    }

    async fn close(&mut self) -> Result<()> {
        self.url = None;
        self.html.clear();
        self.filled.clear();
        Ok(())
    }
}

/// 从 Content-Disposition 中取出文件名
pub fn filename_from_disposition(header: &str) -> Option<String> {
    let mut plain = None;
    for part in header.split(';').map(str::trim) {
        if let Some(value) = part.strip_prefix("filename*=") {
            let value = value.trim_matches('"');
            let name = value.split_once("''").map(|(_, n)| n).unwrap_or(value);
            if !name.is_empty() {
                return Some(name.to_string());
            }
        } else if let Some(value) = part.strip_prefix("filename=") {
            let value = value.trim_matches('"');
            if !value.is_empty() {
                plain = Some(value.to_string());
            }
        }
    }
    plain
}

/// DOM查询，均为同步函数，解析结果不跨越await
mod dom {
    use anyhow::{Result, anyhow};
    use scraper::{ElementRef, Html, Selector};
    use url::Url;

    use crate::llm::tools::browser::driver::{LinkKind, PageLink, TableData};
    use crate::utils::text::collapse_whitespace;

    const HIDDEN_TEXT_PARENTS: [&str; 5] = ["head", "script", "style", "noscript", "template"];

    const BLOCK_ELEMENTS: [&str; 30] = [
        "address", "article", "aside", "blockquote", "dd", "div", "dl", "dt", "fieldset",
        "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "li",
        "main", "nav", "ol", "p", "pre", "section", "table", "tr", "ul",
    ];

    pub struct ElementInfo {
        pub href: Option<String>,
        pub name: Option<String>,
        pub form: Option<usize>,
        pub is_field: bool,
        pub is_submit: bool,
    }

    pub struct FormSubmission {
        pub action: Url,
        pub post: bool,
        pub fields: Vec<(String, String)>,
    }

    pub fn parse_selector(selector: &str) -> Result<Selector> {
        Selector::parse(selector).map_err(|e| anyhow!("invalid selector '{}': {:?}", selector, e))
    }

    fn element_text(el: &ElementRef<'_>) -> String {
        collapse_whitespace(&el.text().collect::<String>())
    }

    fn hidden_self(el: &ElementRef<'_>) -> bool {
        let value = el.value();
        if value.attr("hidden").is_some() {
            return true;
        }
        if value.name() == "input"
            && value
                .attr("type")
                .is_some_and(|t| t.eq_ignore_ascii_case("hidden"))
        {
            return true;
        }
        value
            .attr("style")
            .map(|s| s.replace(' ', "").to_ascii_lowercase())
            .is_some_and(|s| s.contains("display:none") || s.contains("visibility:hidden"))
    }

    fn is_hidden(el: &ElementRef<'_>) -> bool {
        hidden_self(el)
            || el
                .ancestors()
                .filter_map(ElementRef::wrap)
                .any(|a| hidden_self(&a))
    }

    /// 元素自身或祖先中的 a[href]
    fn enclosing_href<'a>(el: &ElementRef<'a>) -> Option<&'a str> {
        std::iter::once(*el)
            .chain(el.ancestors().filter_map(ElementRef::wrap))
            .find(|e| e.value().name() == "a" && e.value().attr("href").is_some())
            .and_then(|a| a.value().attr("href"))
    }

    fn form_index(doc: &Html, el: &ElementRef<'_>) -> Result<Option<usize>> {
        let form_sel = parse_selector("form")?;
        let Some(form) = el
            .ancestors()
            .filter_map(ElementRef::wrap)
            .find(|a| a.value().name() == "form")
        else {
            return Ok(None);
        };
        let target = (*form).id();
        Ok(doc.select(&form_sel).position(|f| (*f).id() == target))
    }

    pub fn resolve_href(base: &Url, href: &str) -> Option<Url> {
        let href = href.trim();
        let lowered = href.to_ascii_lowercase();
        if href.is_empty() || lowered.starts_with("javascript:") || lowered.starts_with("mailto:")
        {
            return None;
        }
        Url::parse(href).ok().or_else(|| base.join(href).ok())
    }

    pub fn count_matches(html: &str, selector: &str, visible_only: bool) -> Result<usize> {
        let doc = Html::parse_document(html);
        let sel = parse_selector(selector)?;
        Ok(doc
            .select(&sel)
            .filter(|el| !visible_only || !is_hidden(el))
            .count())
    }

    pub fn visible_text(html: &str) -> Result<String> {
        let doc = Html::parse_document(html);
        let body_sel = parse_selector("body")?;
        let root = doc.select(&body_sel).next().unwrap_or(doc.root_element());

        let mut lines = Vec::new();
        let mut current = String::new();
        collect_text(root, &mut lines, &mut current);
        flush_line(&mut lines, &mut current);
        Ok(lines.join("\n"))
    }

    fn flush_line(lines: &mut Vec<String>, current: &mut String) {
        let line = collapse_whitespace(current);
        if !line.is_empty() {
            lines.push(line);
        }
        current.clear();
    }

    /// 行内文本拼接到当前行，块级元素前后换行，隐藏子树整体跳过
    fn collect_text(el: ElementRef<'_>, lines: &mut Vec<String>, current: &mut String) {
        for child in el.children() {
            if let Some(text) = child.value().as_text() {
                current.push_str(text);
                continue;
            }
            let Some(child_el) = ElementRef::wrap(child) else {
                continue;
            };
            let name = child_el.value().name();
            if HIDDEN_TEXT_PARENTS.contains(&name) || hidden_self(&child_el) {
                continue;
            }
            if name == "br" {
                flush_line(lines, current);
                continue;
            }

            let block = BLOCK_ELEMENTS.contains(&name);
            if block {
                flush_line(lines, current);
            }
            collect_text(child_el, lines, current);
            if block {
                flush_line(lines, current);
            } else if matches!(name, "td" | "th") {
                current.push(' ');
            }
        }
    }

    pub fn texts_of(html: &str, selector: &str) -> Result<Vec<String>> {
        let doc = Html::parse_document(html);
        let sel = parse_selector(selector)?;
        Ok(doc
            .select(&sel)
            .map(|el| el.text().collect::<String>().trim().to_string())
            .collect())
    }

    pub fn links(html: &str, base: &Url) -> Vec<PageLink> {
        let doc = Html::parse_document(html);
        let mut out = Vec::new();

        if let Ok(anchor_sel) = parse_selector("a[href]") {
            for el in doc.select(&anchor_sel) {
                let Some(url) = el.value().attr("href").and_then(|h| resolve_href(base, h))
                else {
                    continue;
                };
                let mut text = element_text(&el);
                if text.is_empty() {
                    text = url
                        .path_segments()
                        .and_then(|mut s| s.next_back().map(str::to_string))
                        .unwrap_or_default();
                }
                out.push(PageLink {
                    text,
                    url: url.to_string(),
                    kind: LinkKind::Anchor,
                });
            }
        }

        if let Ok(interactive_sel) = parse_selector("button, div, span, a") {
            for el in doc.select(&interactive_sel) {
                let Some(url) = enclosing_href(&el).and_then(|h| resolve_href(base, h)) else {
                    continue;
                };
                let text = element_text(&el);
                if text.is_empty() {
                    continue;
                }
                out.push(PageLink {
                    text,
                    url: url.to_string(),
                    kind: LinkKind::Interactive,
                });
            }
        }

        out
    }

    pub fn tables(html: &str, selector: &str) -> Result<Vec<TableData>> {
        let doc = Html::parse_document(html);
        let table_sel = parse_selector(selector)?;
        let row_sel = parse_selector("tr")?;
        let cell_sel = parse_selector("td, th")?;

        Ok(doc
            .select(&table_sel)
            .map(|table| TableData {
                rows: table
                    .select(&row_sel)
                    .map(|row| {
                        row.select(&cell_sel)
                            .map(|cell| element_text(&cell))
                            .collect()
                    })
                    .collect(),
            })
            .collect())
    }

    pub fn element_info(html: &str, selector: &str) -> Result<Option<ElementInfo>> {
        let doc = Html::parse_document(html);
        let sel = parse_selector(selector)?;
        let Some(el) = doc.select(&sel).next() else {
            return Ok(None);
        };

        let value = el.value();
        let tag = value.name();
        let input_type = value.attr("type").map(str::to_ascii_lowercase);
        let is_field = matches!(tag, "input" | "textarea" | "select");
        let is_submit = match tag {
            "button" => input_type.as_deref().is_none_or(|t| t == "submit"),
            "input" => matches!(input_type.as_deref(), Some("submit") | Some("image")),
            _ => false,
        };

        Ok(Some(ElementInfo {
            href: enclosing_href(&el).map(str::to_string),
            name: value.attr("name").map(str::to_string),
            form: form_index(&doc, &el)?,
            is_field,
            is_submit,
        }))
    }

    pub fn form_submission(html: &str, index: usize, base: &Url) -> Result<FormSubmission> {
        let doc = Html::parse_document(html);
        let form_sel = parse_selector("form")?;
        let form = doc
            .select(&form_sel)
            .nth(index)
            .ok_or_else(|| anyhow!("form #{} not found on the page", index))?;

        let action = form
            .value()
            .attr("action")
            .filter(|a| !a.trim().is_empty())
            .and_then(|a| resolve_href(base, a))
            .unwrap_or_else(|| base.clone());
        let post = form
            .value()
            .attr("method")
            .is_some_and(|m| m.eq_ignore_ascii_case("post"));

        let field_sel = parse_selector("input[name], textarea[name], select[name]")?;
        let option_sel = parse_selector("option")?;
        let mut fields = Vec::new();
        for field in form.select(&field_sel) {
            let value = field.value();
            let Some(name) = value.attr("name") else {
                continue;
            };
            match value.name() {
                "input" => {
                    let input_type = value.attr("type").unwrap_or("text").to_ascii_lowercase();
                    match input_type.as_str() {
                        "submit" | "button" | "image" | "reset" | "file" => {}
                        "checkbox" | "radio" => {
                            if value.attr("checked").is_some() {
                                fields.push((
                                    name.to_string(),
                                    value.attr("value").unwrap_or("on").to_string(),
                                ));
                            }
                        }
                        _ => fields.push((
                            name.to_string(),
                            value.attr("value").unwrap_or_default().to_string(),
                        )),
                    }
                }
                "textarea" => {
                    fields.push((name.to_string(), field.text().collect::<String>()));
                }
                _ => {
                    let options: Vec<ElementRef<'_>> = field.select(&option_sel).collect();
                    let chosen = options
                        .iter()
                        .find(|o| o.value().attr("selected").is_some())
                        .or_else(|| options.first());
                    if let Some(option) = chosen {
                        let option_value = option
                            .value()
                            .attr("value")
                            .map(str::to_string)
                            .unwrap_or_else(|| element_text(option));
                        fields.push((name.to_string(), option_value));
                    }
                }
            }
        }

        Ok(FormSubmission {
            action,
            post,
            fields,
        })
    }

    /// 页面上的下载控件对应的链接
    pub fn download_control_href(html: &str, base: &Url) -> Option<Url> {
        let doc = Html::parse_document(html);

        if let Ok(sel) = parse_selector("a[download][href]")
            && let Some(url) = doc
                .select(&sel)
                .filter_map(|a| a.value().attr("href").and_then(|h| resolve_href(base, h)))
                .next()
        {
            return Some(url);
        }

        let sel = parse_selector("a, button").ok()?;
        doc.select(&sel)
            .filter(|el| element_text(el).to_lowercase().contains("download"))
            .filter_map(|el| enclosing_href(&el).and_then(|h| resolve_href(base, h)))
            .next()
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        const PAGE: &str = r#"
            <html><head><style>.x{color:red}</style><script>var secret = 1;</script></head>
            <body>
              <h1>National Drug Code Directory</h1>
              <p>Labeler codes   are assigned by FDA.</p>
              <a href="/files/ndc.zip">NDC database file (zip)</a>
              <a href="https://other.test/list.csv#top"></a>
              <a href="javascript:void(0)">ignored</a>
              <a href="/get"><span>Download text file</span></a>
              <form action="/search" method="get">
                <input type="search" name="q" value="">
                <input type="hidden" name="lang" value="en">
                <input type="checkbox" name="exact" checked>
                <select name="scope"><option value="all">All</option><option value="drugs" selected>Drugs</option></select>
                <button>Go</button>
              </form>
              <table id="codes">
                <tr><th>Code</th><th>Company</th></tr>
                <tr><td>00002</td><td>Eli Lilly</td></tr>
              </table>
            </body></html>"#;

        fn base() -> Url {
            Url::parse("https://www.fda.gov/drugs/ndc").unwrap()
        }

        #[test]
        fn test_visible_text_skips_script_and_style() {
            let text = visible_text(PAGE).unwrap();
            assert!(text.contains("National Drug Code Directory"));
            assert!(text.contains("Labeler codes are assigned by FDA."));
            assert!(!text.contains("secret"));
            assert!(!text.contains("color:red"));
        }

        #[test]
        fn test_visible_text_joins_inline_and_skips_hidden() {
            let html = r#"<body>
                <p>Labeler <b>code</b> 00002</p>
                <div style="display: none"><p>secret row</p></div>
                <ul><li>One</li><li>Two<br>lines</li></ul>
                <table><tr><td>00006</td><td>Acme</td></tr></table>
            </body>"#;
            let text = visible_text(html).unwrap();
            assert_eq!(text, "Labeler code 00002\nOne\nTwo\nlines\n00006 Acme");
        }

        #[test]
        fn test_links_resolve_and_classify() {
            let links = links(PAGE, &base());
            let anchors: Vec<_> = links.iter().filter(|l| l.kind == LinkKind::Anchor).collect();
            assert_eq!(anchors.len(), 3);
            assert_eq!(anchors[0].url, "https://www.fda.gov/files/ndc.zip");
            assert_eq!(anchors[1].text, "list.csv");
            assert!(
                links
                    .iter()
                    .any(|l| l.kind == LinkKind::Interactive && l.text == "Download text file")
            );
        }

        #[test]
        fn test_tables_rows() {
            let tables = tables(PAGE, "table#codes").unwrap();
            assert_eq!(tables.len(), 1);
            assert_eq!(tables[0].rows[0], vec!["Code", "Company"]);
            assert_eq!(tables[0].rows[1], vec!["00002", "Eli Lilly"]);
        }

        #[test]
        fn test_count_matches_visibility() {
            assert_eq!(count_matches(PAGE, "input[name='lang']", false).unwrap(), 1);
            assert_eq!(count_matches(PAGE, "input[name='lang']", true).unwrap(), 0);
            assert!(count_matches(PAGE, "[[", false).is_err());
        }

        #[test]
        fn test_element_info_for_submit_button() {
            let info = element_info(PAGE, "form button").unwrap().unwrap();
            assert!(info.is_submit);
            assert_eq!(info.form, Some(0));
            assert!(info.href.is_none());

            let link = element_info(PAGE, "a span").unwrap().unwrap();
            assert_eq!(link.href.as_deref(), Some("/get"));
            assert!(element_info(PAGE, "#missing").unwrap().is_none());
        }

        #[test]
        fn test_form_submission_defaults() {
            let submission = form_submission(PAGE, 0, &base()).unwrap();
            assert_eq!(submission.action.as_str(), "https://www.fda.gov/search");
            assert!(!submission.post);
            assert_eq!(
                submission.fields,
                vec![
                    ("q".to_string(), "".to_string()),
                    ("lang".to_string(), "en".to_string()),
                    ("exact".to_string(), "on".to_string()),
                    ("scope".to_string(), "drugs".to_string()),
                ]
            );
        }

        #[test]
        fn test_download_control() {
            let url = download_control_href(PAGE, &base()).unwrap();
            assert_eq!(url.as_str(), "https://www.fda.gov/get");
            assert!(download_control_href("<p>nothing</p>", &base()).is_none());
        }
    }
}
