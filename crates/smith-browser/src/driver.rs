//! High-level page driver over the CDP client.

use serde_json::Value;

use crate::cdp::CdpClient;
use crate::error::BrowserError;

/// Ergonomic page-automation methods over one CDP target.
pub struct PageDriver {
    client: CdpClient,
}

impl PageDriver {
    /// Connect to a page target and enable the required domains.
    pub async fn connect(ws_url: &str) -> Result<Self, BrowserError> {
        let client = CdpClient::connect(ws_url).await?;
        client.enable_domain("Page").await?;
        client.enable_domain("Runtime").await?;
        Ok(Self { client })
    }

    /// Navigate and surface navigation-level errors
    /// (e.g. net::ERR_NAME_NOT_RESOLVED).
    pub async fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        let result = self
            .client
            .send_command("Page.navigate", serde_json::json!({ "url": url }))
            .await?;
        if let Some(error_text) = result.get("errorText").and_then(|v| v.as_str()) {
            if !error_text.is_empty() {
                return Err(BrowserError::Protocol(format!(
                    "navigation failed: {error_text}"
                )));
            }
        }
        Ok(())
    }

    /// Evaluate a JavaScript expression and return its JSON value.
    pub async fn evaluate(&self, expression: &str) -> Result<Value, BrowserError> {
        let result = self
            .client
            .send_command(
                "Runtime.evaluate",
                serde_json::json!({
                    "expression": expression,
                    "returnByValue": true,
                }),
            )
            .await?;
        if let Some(exception) = result.get("exceptionDetails") {
            let text = exception
                .get("exception")
                .and_then(|e| e.get("description"))
                .and_then(|v| v.as_str())
                .unwrap_or("script exception");
            return Err(BrowserError::Protocol(text.to_string()));
        }
        Ok(result
            .get("result")
            .and_then(|r| r.get("value"))
            .cloned()
            .unwrap_or(Value::Null))
    }

    /// Current page URL.
    pub async fn current_url(&self) -> Result<String, BrowserError> {
        let value = self.evaluate("window.location.href").await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    /// Outer HTML of the whole document or of the first selector match.
    pub async fn get_html(&self, selector: Option<&str>) -> Result<String, BrowserError> {
        let expression = match selector {
            Some(selector) => format!(
                "(document.querySelector({sel}) || {{outerHTML: ''}}).outerHTML",
                sel = js_string(selector)
            ),
            None => "document.documentElement.outerHTML".to_string(),
        };
        let value = self.evaluate(&expression).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    /// Click the first element matching a selector.
    pub async fn click(&self, selector: &str) -> Result<(), BrowserError> {
        let expression = format!(
            "(() => {{ const el = document.querySelector({sel}); if (!el) return false; el.click(); return true; }})()",
            sel = js_string(selector)
        );
        match self.evaluate(&expression).await? {
            Value::Bool(true) => Ok(()),
            _ => Err(BrowserError::Protocol(format!(
                "no element matches selector {selector:?}"
            ))),
        }
    }

    /// Set an input's value and fire an `input` event so frameworks notice.
    pub async fn fill(&self, selector: &str, value: &str) -> Result<(), BrowserError> {
        let expression = format!(
            "(() => {{ const el = document.querySelector({sel}); if (!el) return false; \
             el.value = {val}; el.dispatchEvent(new Event('input', {{bubbles: true}})); return true; }})()",
            sel = js_string(selector),
            val = js_string(value)
        );
        match self.evaluate(&expression).await? {
            Value::Bool(true) => Ok(()),
            _ => Err(BrowserError::Protocol(format!(
                "no element matches selector {selector:?}"
            ))),
        }
    }

    /// Capture a PNG screenshot; returns the base64 payload as CDP sends it.
    pub async fn screenshot(&self) -> Result<String, BrowserError> {
        let result = self
            .client
            .send_command(
                "Page.captureScreenshot",
                serde_json::json!({ "format": "png" }),
            )
            .await?;
        result
            .get("data")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| BrowserError::Protocol("screenshot returned no data".into()))
    }
}

/// Encode a Rust string as a JavaScript string literal.
fn js_string(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}
