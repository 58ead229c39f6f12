//! Network tool category: HTTP, TCP reachability, DNS, downloads.

use std::time::{Duration, Instant};

use serde_json::{json, Value};
use smith_types::{SmithError, ToolCategory, ToolContext};

use crate::args::{opt_str, opt_u64, req_str, req_u64, ArgKind, ArgSpec};
use crate::definition::Tool;
use crate::executor::effective_timeout_ms;
use crate::guard::{guarded_path, truncate_output};

/// Default HTTP timeout.
const HTTP_TIMEOUT_MS: u64 = 30_000;

/// Default TCP probe timeout.
const PROBE_TIMEOUT_MS: u64 = 5_000;

/// Default TCP ping port.
const PING_PORT: u16 = 80;

/// All network tools, in advertised order.
pub fn tools() -> Vec<Box<dyn Tool>> {
    vec![
        Box::new(HttpRequest),
        Box::new(PingHost),
        Box::new(PortCheck),
        Box::new(DnsLookup),
        Box::new(DownloadFile),
    ]
}

// ---------------------------------------------------------------------------
// http_request
// ---------------------------------------------------------------------------

struct HttpRequest;

#[async_trait::async_trait]
impl Tool for HttpRequest {
    fn name(&self) -> &str {
        "http_request"
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Network
    }
    fn description(&self) -> &str {
        "Perform an HTTP request and return status, headers, and body"
    }
    fn arg_specs(&self) -> &'static [ArgSpec] {
        const SPECS: &[ArgSpec] = &[
            ArgSpec::required("url", ArgKind::Str),
            ArgSpec::optional("method", ArgKind::Str),
            ArgSpec::optional("headers", ArgKind::Object),
            ArgSpec::optional("body", ArgKind::Str),
        ];
        SPECS
    }
    fn default_timeout_ms(&self) -> Option<u64> {
        Some(HTTP_TIMEOUT_MS)
    }

    async fn execute(&self, args: &Value, _ctx: &ToolContext) -> Result<Value, SmithError> {
        let url = req_str(args, "url")?;
        let method = opt_str(args, "method").unwrap_or("GET").to_uppercase();
        let timeout_ms = effective_timeout_ms(args, HTTP_TIMEOUT_MS);

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| SmithError::Internal(format!("http client build failed: {e}")))?;

        let method = reqwest::Method::from_bytes(method.as_bytes())
            .map_err(|_| SmithError::BadArguments(format!("invalid method: {method}")))?;
        let mut request = client.request(method, url);

        if let Some(headers) = args.get("headers").and_then(|v| v.as_object()) {
            for (name, value) in headers {
                if let Some(value) = value.as_str() {
                    request = request.header(name, value);
                }
            }
        }
        if let Some(body) = opt_str(args, "body") {
            request = request.body(body.to_string());
        }

        let start = Instant::now();
        let response = request
            .send()
            .await
            .map_err(|e| SmithError::ToolFailure(format!("request to {url} failed: {e}")))?;

        let status = response.status().as_u16();
        let headers: serde_json::Map<String, Value> = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.to_string(),
                    Value::String(value.to_str().unwrap_or("").to_string()),
                )
            })
            .collect();
        let body = response
            .text()
            .await
            .map_err(|e| SmithError::ToolFailure(format!("cannot read response body: {e}")))?;

        Ok(json!({
            "status": status,
            "headers": headers,
            "body": truncate_output(&body),
            "latency_ms": start.elapsed().as_millis() as u64,
        }))
    }
}

// ---------------------------------------------------------------------------
// ping (TCP connect) / port_check
// ---------------------------------------------------------------------------

async fn tcp_probe(host: &str, port: u16, timeout_ms: u64) -> (bool, u64) {
    let start = Instant::now();
    let connect = tokio::net::TcpStream::connect((host, port));
    let reachable = matches!(
        tokio::time::timeout(Duration::from_millis(timeout_ms), connect).await,
        Ok(Ok(_))
    );
    (reachable, start.elapsed().as_millis() as u64)
}

struct PingHost;

#[async_trait::async_trait]
impl Tool for PingHost {
    fn name(&self) -> &str {
        "ping"
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Network
    }
    fn description(&self) -> &str {
        "Probe host reachability with a TCP connect (default port 80)"
    }
    fn arg_specs(&self) -> &'static [ArgSpec] {
        const SPECS: &[ArgSpec] = &[
            ArgSpec::required("host", ArgKind::Str),
            ArgSpec::optional("port", ArgKind::Int),
        ];
        SPECS
    }
    fn default_timeout_ms(&self) -> Option<u64> {
        Some(PROBE_TIMEOUT_MS)
    }

    async fn execute(&self, args: &Value, _ctx: &ToolContext) -> Result<Value, SmithError> {
        let host = req_str(args, "host")?;
        let port = opt_u64(args, "port").unwrap_or(PING_PORT as u64) as u16;
        let timeout_ms = effective_timeout_ms(args, PROBE_TIMEOUT_MS);
        let (reachable, latency_ms) = tcp_probe(host, port, timeout_ms).await;
        Ok(json!({
            "host": host,
            "port": port,
            "reachable": reachable,
            "latency_ms": latency_ms,
        }))
    }
}

struct PortCheck;

#[async_trait::async_trait]
impl Tool for PortCheck {
    fn name(&self) -> &str {
        "port_check"
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Network
    }
    fn description(&self) -> &str {
        "Check whether a TCP port is accepting connections"
    }
    fn arg_specs(&self) -> &'static [ArgSpec] {
        const SPECS: &[ArgSpec] = &[
            ArgSpec::required("host", ArgKind::Str),
            ArgSpec::required("port", ArgKind::Int),
        ];
        SPECS
    }
    fn default_timeout_ms(&self) -> Option<u64> {
        Some(PROBE_TIMEOUT_MS)
    }

    async fn execute(&self, args: &Value, _ctx: &ToolContext) -> Result<Value, SmithError> {
        let host = req_str(args, "host")?;
        let port = req_u64(args, "port")? as u16;
        let timeout_ms = effective_timeout_ms(args, PROBE_TIMEOUT_MS);
        let (open, _) = tcp_probe(host, port, timeout_ms).await;
        Ok(json!({ "host": host, "port": port, "open": open }))
    }
}

// ---------------------------------------------------------------------------
// dns_lookup
// ---------------------------------------------------------------------------

struct DnsLookup;

#[async_trait::async_trait]
impl Tool for DnsLookup {
    fn name(&self) -> &str {
        "dns_lookup"
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Network
    }
    fn description(&self) -> &str {
        "Resolve a hostname to its addresses"
    }
    fn arg_specs(&self) -> &'static [ArgSpec] {
        const SPECS: &[ArgSpec] = &[ArgSpec::required("host", ArgKind::Str)];
        SPECS
    }

    async fn execute(&self, args: &Value, _ctx: &ToolContext) -> Result<Value, SmithError> {
        let host = req_str(args, "host")?;
        let addrs = tokio::net::lookup_host((host, 0))
            .await
            .map_err(|e| SmithError::ToolFailure(format!("cannot resolve {host}: {e}")))?;
        let mut seen = std::collections::BTreeSet::new();
        for addr in addrs {
            seen.insert(addr.ip().to_string());
        }
        Ok(json!({
            "host": host,
            "addresses": seen.into_iter().collect::<Vec<_>>(),
        }))
    }
}

// ---------------------------------------------------------------------------
// download_file
// ---------------------------------------------------------------------------

struct DownloadFile;

#[async_trait::async_trait]
impl Tool for DownloadFile {
    fn name(&self) -> &str {
        "download_file"
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Network
    }
    fn description(&self) -> &str {
        "Download a URL to a sandboxed destination path"
    }
    fn arg_specs(&self) -> &'static [ArgSpec] {
        const SPECS: &[ArgSpec] = &[
            ArgSpec::required("url", ArgKind::Str),
            ArgSpec::required("destination", ArgKind::Str),
        ];
        SPECS
    }
    fn default_timeout_ms(&self) -> Option<u64> {
        Some(HTTP_TIMEOUT_MS)
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<Value, SmithError> {
        let url = req_str(args, "url")?;
        let destination = guarded_path(ctx, req_str(args, "destination")?, Some("download_file"))?;
        let timeout_ms = effective_timeout_ms(args, HTTP_TIMEOUT_MS);

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| SmithError::Internal(format!("http client build failed: {e}")))?;

        let response = client
            .get(url)
            .send()
            .await
            .map_err(|e| SmithError::ToolFailure(format!("download of {url} failed: {e}")))?;
        if !response.status().is_success() {
            return Err(SmithError::ToolFailure(format!(
                "download of {url} failed: HTTP {}",
                response.status().as_u16()
            )));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| SmithError::ToolFailure(format!("cannot read download body: {e}")))?;

        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                SmithError::ToolFailure(format!("cannot create {}: {e}", parent.display()))
            })?;
        }
        std::fs::write(&destination, &bytes).map_err(|e| {
            SmithError::ToolFailure(format!("cannot write {}: {e}", destination.display()))
        })?;

        Ok(json!({
            "path": destination.display().to_string(),
            "bytes_written": bytes.len(),
        }))
    }
}
