//! 浏览器驱动接口：每次工具调用打开一个新会话，调用结束后关闭

use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 页面中的链接候选
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLink {
    /// 可见文本
    pub text: String,
    /// 解析后的绝对URL
    pub url: String,
    pub kind: LinkKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    /// `a[href]` 本身
    Anchor,
    /// 位于链接内的按钮、span、div 等元素
    Interactive,
}

/// 表格内容，按行保存单元格文本
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableData {
    pub rows: Vec<Vec<String>>,
}

/// 浏览器驱动
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// 打开一个新的页面会话
    async fn open_session(&self) -> Result<Box<dyn PageSession>>;
}

/// 单页面会话，所有操作针对当前页面
#[async_trait]
pub trait PageSession: Send {
    /// 加载URL，超时由驱动的页面加载超时决定
    async fn goto(&mut self, url: &str) -> Result<()>;

    /// 等待网络空闲
    async fn wait_for_network_idle(&mut self) -> Result<()>;

    /// 等待选择器出现（`visible` 为真时要求可见）
    async fn wait_for_selector(
        &mut self,
        selector: &str,
        timeout: Duration,
        visible: bool,
    ) -> Result<()>;

    /// 选择器是否命中任意元素
    async fn exists(&mut self, selector: &str) -> Result<bool>;

    /// 页面可见文本（不含 script/style），按行返回
    async fn visible_text(&mut self) -> Result<String>;

    /// 每个命中元素的文本
    async fn texts_of(&mut self, selector: &str) -> Result<Vec<String>>;

    /// 页面中的全部链接候选，未过滤、未去重
    async fn links(&mut self) -> Result<Vec<PageLink>>;

    async fn click(&mut self, selector: &str) -> Result<()>;

    async fn fill(&mut self, selector: &str, value: &str) -> Result<()>;

    /// 在元素上按回车，通常会提交所在表单
    async fn press_enter(&mut self, selector: &str) -> Result<()>;

    /// 每个命中表格的行与单元格
    async fn tables(&mut self, selector: &str) -> Result<Vec<TableData>>;

    /// 通过页面上可见的下载控件触发下载；页面没有下载控件时返回 `None`
    async fn download_from_control(&mut self, dir: &Path) -> Result<Option<PathBuf>>;

    /// 直接请求URL并保存响应内容
    async fn download_url(&mut self, url: &str, dir: &Path) -> Result<PathBuf>;

    /// 当前页面URL，未加载页面时为空
    fn current_url(&self) -> String;

    async fn close(&mut self) -> Result<()>;
}
