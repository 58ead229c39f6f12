//! Browser tool category.
//!
//! Page-driving tools acquire the shared [`BrowserHost`]; `browser_search`
//! and `browser_fetch_content` are plain HTTP and work without a browser
//! installed.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use smith_tools::args::{opt_str, opt_u64, req_str, ArgKind, ArgSpec};
use smith_tools::guard::truncate_output;
use smith_tools::Tool;
use smith_types::{SmithError, ToolCategory, ToolContext};

use crate::host::BrowserHost;
use crate::search;

/// All browser tools bound to a shared host, in advertised order.
pub fn tools(host: Arc<BrowserHost>) -> Vec<Box<dyn Tool>> {
    vec![
        Box::new(Navigate { host: host.clone() }),
        Box::new(GetDom { host: host.clone() }),
        Box::new(Click { host: host.clone() }),
        Box::new(Fill { host: host.clone() }),
        Box::new(Search),
        Box::new(FetchContent),
        Box::new(Screenshot { host }),
    ]
}

// ---------------------------------------------------------------------------
// Page-driving tools
// ---------------------------------------------------------------------------

struct Navigate {
    host: Arc<BrowserHost>,
}

#[async_trait::async_trait]
impl Tool for Navigate {
    fn name(&self) -> &str {
        "browser_navigate"
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Browser
    }
    fn description(&self) -> &str {
        "Navigate the shared headless browser to a URL"
    }
    fn arg_specs(&self) -> &'static [ArgSpec] {
        const SPECS: &[ArgSpec] = &[ArgSpec::required("url", ArgKind::Str)];
        SPECS
    }

    async fn execute(&self, args: &Value, _ctx: &ToolContext) -> Result<Value, SmithError> {
        let url = req_str(args, "url")?;
        let lease = self.host.acquire().await?;
        lease.driver().navigate(url).await?;
        let current = lease.driver().current_url().await.unwrap_or_default();
        Ok(json!({ "url": current }))
    }
}

struct GetDom {
    host: Arc<BrowserHost>,
}

#[async_trait::async_trait]
impl Tool for GetDom {
    fn name(&self) -> &str {
        "browser_get_dom"
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Browser
    }
    fn description(&self) -> &str {
        "Return the page HTML, optionally scoped to a selector"
    }
    fn arg_specs(&self) -> &'static [ArgSpec] {
        const SPECS: &[ArgSpec] = &[ArgSpec::optional("selector", ArgKind::Str)];
        SPECS
    }

    async fn execute(&self, args: &Value, _ctx: &ToolContext) -> Result<Value, SmithError> {
        let lease = self.host.acquire().await?;
        let html = lease.driver().get_html(opt_str(args, "selector")).await?;
        Ok(json!({ "html": truncate_output(&html) }))
    }
}

struct Click {
    host: Arc<BrowserHost>,
}

#[async_trait::async_trait]
impl Tool for Click {
    fn name(&self) -> &str {
        "browser_click"
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Browser
    }
    fn description(&self) -> &str {
        "Click the first element matching a CSS selector"
    }
    fn arg_specs(&self) -> &'static [ArgSpec] {
        const SPECS: &[ArgSpec] = &[ArgSpec::required("selector", ArgKind::Str)];
        SPECS
    }

    async fn execute(&self, args: &Value, _ctx: &ToolContext) -> Result<Value, SmithError> {
        let selector = req_str(args, "selector")?;
        let lease = self.host.acquire().await?;
        lease.driver().click(selector).await?;
        Ok(json!({ "clicked": selector }))
    }
}

struct Fill {
    host: Arc<BrowserHost>,
}

#[async_trait::async_trait]
impl Tool for Fill {
    fn name(&self) -> &str {
        "browser_fill"
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Browser
    }
    fn description(&self) -> &str {
        "Fill an input matching a CSS selector with a value"
    }
    fn arg_specs(&self) -> &'static [ArgSpec] {
        const SPECS: &[ArgSpec] = &[
            ArgSpec::required("selector", ArgKind::Str),
            ArgSpec::required("value", ArgKind::Str),
        ];
        SPECS
    }

    async fn execute(&self, args: &Value, _ctx: &ToolContext) -> Result<Value, SmithError> {
        let selector = req_str(args, "selector")?;
        let value = req_str(args, "value")?;
        let lease = self.host.acquire().await?;
        lease.driver().fill(selector, value).await?;
        Ok(json!({ "filled": selector }))
    }
}

struct Screenshot {
    host: Arc<BrowserHost>,
}

#[async_trait::async_trait]
impl Tool for Screenshot {
    fn name(&self) -> &str {
        "browser_screenshot"
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Browser
    }
    fn description(&self) -> &str {
        "Capture the current page as a base64 PNG"
    }
    fn arg_specs(&self) -> &'static [ArgSpec] {
        &[]
    }

    async fn execute(&self, _args: &Value, _ctx: &ToolContext) -> Result<Value, SmithError> {
        let lease = self.host.acquire().await?;
        let png_base64 = lease.driver().screenshot().await?;
        Ok(json!({ "format": "png", "base64": png_base64 }))
    }
}

// ---------------------------------------------------------------------------
// HTTP-backed tools
// ---------------------------------------------------------------------------

struct Search;

#[async_trait::async_trait]
impl Tool for Search {
    fn name(&self) -> &str {
        "browser_search"
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Browser
    }
    fn description(&self) -> &str {
        "Web search with intent detection and ranked, deduplicated results"
    }
    fn arg_specs(&self) -> &'static [ArgSpec] {
        const SPECS: &[ArgSpec] = &[
            ArgSpec::required("query", ArgKind::Str),
            ArgSpec::optional("num_results", ArgKind::Int),
        ];
        SPECS
    }

    async fn execute(&self, args: &Value, _ctx: &ToolContext) -> Result<Value, SmithError> {
        let query = req_str(args, "query")?;
        let num_results =
            opt_u64(args, "num_results").unwrap_or(search::DEFAULT_RESULTS as u64) as usize;
        search::search(query, num_results).await
    }
}

struct FetchContent;

#[async_trait::async_trait]
impl Tool for FetchContent {
    fn name(&self) -> &str {
        "browser_fetch_content"
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Browser
    }
    fn description(&self) -> &str {
        "Fetch a URL and return its readable text content"
    }
    fn arg_specs(&self) -> &'static [ArgSpec] {
        const SPECS: &[ArgSpec] = &[ArgSpec::required("url", ArgKind::Str)];
        SPECS
    }

    async fn execute(&self, args: &Value, _ctx: &ToolContext) -> Result<Value, SmithError> {
        let url = req_str(args, "url")?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent("Mozilla/5.0 (compatible; smith-agent)")
            .build()
            .map_err(|e| SmithError::Internal(format!("http client build failed: {e}")))?;
        let response = client
            .get(url)
            .send()
            .await
            .map_err(|e| SmithError::ToolFailure(format!("fetch of {url} failed: {e}")))?;
        let status = response.status().as_u16();
        let html = response
            .text()
            .await
            .map_err(|e| SmithError::ToolFailure(format!("cannot read body: {e}")))?;

        Ok(json!({
            "url": url,
            "status": status,
            "text": truncate_output(&html_to_text(&html)),
        }))
    }
}

/// Reduce an HTML document to readable text: drop script/style blocks,
/// strip tags, collapse whitespace.
pub fn html_to_text(html: &str) -> String {
    let script_re = regex::Regex::new(r"(?is)<(script|style)[^>]*>.*?</(script|style)>")
        .expect("static regex");
    let tag_re = regex::Regex::new(r"<[^>]+>").expect("static regex");
    let without_blocks = script_re.replace_all(html, " ");
    let without_tags = tag_re.replace_all(&without_blocks, " ");
    let decoded = without_tags
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#x27;", "'")
        .replace("&nbsp;", " ");
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_to_text_strips_scripts_and_tags() {
        let html = r#"
            <html><head><style>body { color: red; }</style>
            <script>alert("no");</script></head>
            <body><h1>Title</h1><p>First &amp; second   paragraph.</p></body></html>
        "#;
        assert_eq!(html_to_text(html), "Title First & second paragraph.");
    }

    #[test]
    fn factory_produces_unique_names() {
        let tmp = tempfile::tempdir().unwrap();
        let host = Arc::new(BrowserHost::new(tmp.path().to_path_buf()));
        let tools = tools(host);
        let mut names: Vec<&str> = tools.iter().map(|t| t.name()).collect();
        assert_eq!(names.len(), 7);
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 7, "browser tool names must be unique");
        assert!(tools.iter().all(|t| t.category() == ToolCategory::Browser));
    }
}
