//! Web access tools.
//!
//! Provides:
//! - `duckduckgo_search`: query the DuckDuckGo instant-answer API.
//! - `web_search`: engine-configurable search facade (DuckDuckGo only).
//! - `visit_webpage`: fetch a URL and return its readable content.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::{Client, Url};
use serde_json::{json, Value};
use tokio::net::lookup_host;

use crate::error::{InstantlyError, Result};
use crate::sandbox::SandboxContext;

use super::{Tool, ToolArgs, ToolMetadata};

const DUCKDUCKGO_API_URL: &str = "https://api.duckduckgo.com";
const WEB_USER_AGENT: &str = concat!("instantly/", env!("CARGO_PKG_VERSION"));
const DEFAULT_DDG_RESULTS: usize = 5;
const DEFAULT_SEARCH_RESULTS: usize = 10;
/// Engines accepted by [`WebSearchTool`].
pub const SUPPORTED_ENGINES: &[&str] = &["duckduckgo"];
const MAX_FETCH_BYTES: usize = 800_000;

fn http_client() -> Client {
    Client::builder()
        .redirect(reqwest::redirect::Policy::limited(5))
        .timeout(Duration::from_secs(30))
        .user_agent(WEB_USER_AGENT)
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Web search via the DuckDuckGo instant-answer API.
///
/// Returns the first `max_results` entries of the response's `RelatedTopics`.
pub struct DuckDuckGoSearchTool {
    client: Client,
    base_url: String,
    max_results: usize,
}

impl DuckDuckGoSearchTool {
    pub fn new() -> Self {
        Self::with_max_results(DEFAULT_DDG_RESULTS)
    }

    pub fn with_max_results(max_results: usize) -> Self {
        Self {
            client: http_client(),
            base_url: DUCKDUCKGO_API_URL.to_string(),
            max_results,
        }
    }

    pub fn max_results(&self) -> usize {
        self.max_results
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Value> {
        let response = self
            .client
            .get(&self.base_url)
            .header("Accept", "application/json")
            .query(&[("q", query), ("format", "json"), ("no_html", "1")])
            .send()
            .await
            .map_err(|e| InstantlyError::Api(format!("DuckDuckGo search failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(InstantlyError::Api(format!(
                "DuckDuckGo search failed: HTTP {}",
                response.status()
            )));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| InstantlyError::Api(format!("DuckDuckGo search failed: {}", e)))?;

        Ok(related_topics(&payload, limit))
    }
}

impl Default for DuckDuckGoSearchTool {
    fn default() -> Self {
        Self::new()
    }
}

/// First `limit` entries of `RelatedTopics`; empty when the field is absent.
fn related_topics(payload: &Value, limit: usize) -> Value {
    let topics = payload
        .get("RelatedTopics")
        .and_then(Value::as_array)
        .map(|items| items.iter().take(limit).cloned().collect::<Vec<_>>())
        .unwrap_or_default();
    Value::Array(topics)
}

fn require_query(args: &ToolArgs) -> Result<String> {
    let query = args.str_arg(0, "query")?;
    let query = query.trim();
    if query.is_empty() {
        return Err(InstantlyError::Validation(
            "Argument 'query' must not be empty".to_string(),
        ));
    }
    Ok(query.to_string())
}

#[async_trait]
impl Tool for DuckDuckGoSearchTool {
    fn describe(&self) -> ToolMetadata {
        ToolMetadata::new("duckduckgo_search", "Web search using DuckDuckGo engine")
            .with_tags(["search", "web"])
            .asynchronous()
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "Search query"}
            },
            "required": ["query"]
        })
    }

    async fn invoke(&self, args: ToolArgs, _ctx: &SandboxContext) -> Result<Value> {
        let query = require_query(&args)?;
        self.search(&query, self.max_results).await
    }
}

/// Engine-configurable web search.
pub struct WebSearchTool {
    engine: String,
    inner: DuckDuckGoSearchTool,
}

impl WebSearchTool {
    /// Create a search tool for `engine`.
    ///
    /// # Errors
    /// `Validation` for any engine other than `duckduckgo`.
    pub fn new(engine: &str, max_results: usize) -> Result<Self> {
        let engine = engine.trim().to_ascii_lowercase();
        if !SUPPORTED_ENGINES.contains(&engine.as_str()) {
            return Err(InstantlyError::Validation(format!(
                "Unsupported search engine: {}",
                engine
            )));
        }
        Ok(Self {
            engine,
            inner: DuckDuckGoSearchTool::with_max_results(max_results),
        })
    }

    pub fn engine(&self) -> &str {
        &self.engine
    }

    pub fn max_results(&self) -> usize {
        self.inner.max_results()
    }
}

impl Default for WebSearchTool {
    fn default() -> Self {
        Self {
            engine: "duckduckgo".to_string(),
            inner: DuckDuckGoSearchTool::with_max_results(DEFAULT_SEARCH_RESULTS),
        }
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn describe(&self) -> ToolMetadata {
        ToolMetadata::new(
            "web_search",
            "Configurable web search with different engines",
        )
        .with_tags(["search", "web"])
        .asynchronous()
    }

    fn parameters(&self) -> Value {
        self.inner.parameters()
    }

    async fn invoke(&self, args: ToolArgs, ctx: &SandboxContext) -> Result<Value> {
        self.inner.invoke(args, ctx).await
    }
}

/// Fetch a webpage and return its readable content.
pub struct VisitWebpageTool {
    client: Client,
    max_length: Option<usize>,
}

impl VisitWebpageTool {
    pub fn new(max_length: Option<usize>) -> Self {
        Self {
            client: http_client(),
            max_length,
        }
    }

    fn extract_title(&self, html: &str) -> Option<String> {
        let regex = Regex::new(r"(?is)<title[^>]*>(.*?)</title>").ok()?;
        let captures = regex.captures(html)?;
        let raw = captures.get(1)?.as_str();
        let title = normalize_whitespace(&decode_common_html_entities(raw));
        (!title.is_empty()).then_some(title)
    }

    fn extract_text(&self, html: &str) -> String {
        let without_scripts = strip_regex(html, r"(?is)<script[^>]*>.*?</script>", " ");
        let without_styles = strip_regex(&without_scripts, r"(?is)<style[^>]*>.*?</style>", " ");
        let without_tags = strip_regex(&without_styles, r"(?is)<[^>]+>", " ");
        normalize_whitespace(&decode_common_html_entities(&without_tags))
    }
}

impl Default for VisitWebpageTool {
    fn default() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl Tool for VisitWebpageTool {
    fn describe(&self) -> ToolMetadata {
        ToolMetadata::new("visit_webpage", "Fetch and process webpage content")
            .with_tags(["web", "content"])
            .asynchronous()
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": {"type": "string", "description": "http/https URL to fetch"}
            },
            "required": ["url"]
        })
    }

    async fn invoke(&self, args: ToolArgs, _ctx: &SandboxContext) -> Result<Value> {
        let url = args.str_arg(0, "url")?;
        let parsed = Url::parse(url.trim())
            .map_err(|e| InstantlyError::Validation(format!("Invalid URL '{}': {}", url, e)))?;

        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(InstantlyError::Validation(
                "Only http/https URLs are allowed".to_string(),
            ));
        }
        if is_blocked_host(&parsed) {
            return Err(InstantlyError::Validation(
                "Blocked URL host (local or private network)".to_string(),
            ));
        }
        resolve_and_check_host(&parsed).await?;

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| InstantlyError::Api(format!("Failed to fetch webpage: {}", e)))?;

        if is_blocked_host(response.url()) {
            return Err(InstantlyError::Validation(format!(
                "Redirect destination is blocked (local or private network): {}",
                response.url()
            )));
        }

        let status = response.status();
        if !status.is_success() {
            return Err(InstantlyError::Api(format!(
                "Failed to fetch webpage: HTTP {}",
                status
            )));
        }

        let is_html = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.contains("text/html"))
            .unwrap_or(false);

        let body = read_body_limited(response, MAX_FETCH_BYTES).await?;
        let content = if is_html || body.trim_start().starts_with('<') {
            match self.extract_title(&body) {
                Some(title) => format!("# {}\n\n{}", title, self.extract_text(&body)),
                None => self.extract_text(&body),
            }
        } else {
            body
        };

        Ok(Value::String(truncate_chars(content, self.max_length)))
    }
}

/// Truncates to at most `max` characters, never splitting a code point.
fn truncate_chars(text: String, max: Option<usize>) -> String {
    match max {
        Some(max) => match text.char_indices().nth(max) {
            Some((byte_idx, _)) => text[..byte_idx].to_string(),
            None => text,
        },
        None => text,
    }
}

fn strip_regex(input: &str, pattern: &str, replacement: &str) -> String {
    match Regex::new(pattern) {
        Ok(regex) => regex.replace_all(input, replacement).into_owned(),
        Err(_) => input.to_string(),
    }
}

fn normalize_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn decode_common_html_entities(input: &str) -> String {
    input
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// Read a response body in chunks, stopping at `max_bytes`.
pub(crate) async fn read_body_limited(
    mut response: reqwest::Response,
    max_bytes: usize,
) -> Result<String> {
    let mut buf: Vec<u8> = Vec::new();
    let mut truncated = false;

    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| InstantlyError::Api(format!("Failed to read response body: {}", e)))?
    {
        let remaining = max_bytes.saturating_sub(buf.len());
        buf.extend_from_slice(&chunk[..chunk.len().min(remaining)]);
        if buf.len() >= max_bytes {
            truncated = true;
            break;
        }
    }

    Ok(decode_body(buf, truncated))
}

/// Decodes a body lossily. A body cut at the byte limit first drops a
/// trailing partial code point.
fn decode_body(mut buf: Vec<u8>, truncated: bool) -> String {
    if truncated {
        if let Err(e) = std::str::from_utf8(&buf) {
            if e.error_len().is_none() {
                buf.truncate(e.valid_up_to());
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

fn is_blocked_host(url: &Url) -> bool {
    let Some(host_str) = url.host_str() else {
        return true;
    };

    let host = host_str.to_ascii_lowercase();
    if host == "localhost" || host.ends_with(".local") {
        return true;
    }

    // host_str() keeps the brackets around IPv6 literals
    let ip_str = host
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .unwrap_or(&host);
    match ip_str.parse::<IpAddr>() {
        Ok(ip) => is_private_or_local_ip(ip),
        Err(_) => false,
    }
}

/// Refuses hostnames whose DNS answers point at private or local addresses.
async fn resolve_and_check_host(url: &Url) -> Result<()> {
    let host = url
        .host_str()
        .ok_or_else(|| InstantlyError::Validation("URL has no host".to_string()))?;

    if host.trim_start_matches('[').trim_end_matches(']').parse::<IpAddr>().is_ok() {
        return Ok(());
    }

    let port = url.port_or_known_default().unwrap_or(443);
    let addrs = lookup_host(format!("{}:{}", host, port))
        .await
        .map_err(|e| InstantlyError::Api(format!("DNS lookup failed for '{}': {}", host, e)))?;

    for addr in addrs {
        if is_private_or_local_ip(addr.ip()) {
            return Err(InstantlyError::Validation(format!(
                "DNS for '{}' resolved to private/local IP {}",
                host,
                addr.ip()
            )));
        }
    }
    Ok(())
}

fn is_private_or_local_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(addr) => is_private_or_local_ipv4(addr),
        IpAddr::V6(addr) => is_private_or_local_ipv6(addr),
    }
}

fn is_private_or_local_ipv4(addr: Ipv4Addr) -> bool {
    addr.is_private()
        || addr.is_loopback()
        || addr.is_link_local()
        || addr.is_broadcast()
        || addr.is_documentation()
        || addr.is_unspecified()
        || addr.octets()[0] == 0
}

fn is_private_or_local_ipv6(addr: Ipv6Addr) -> bool {
    let first = addr.segments()[0];
    addr.is_loopback()
        || addr.is_unspecified()
        || (first & 0xfe00) == 0xfc00
        || (first & 0xffc0) == 0xfe80
        || (first & 0xff00) == 0xff00
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> SandboxContext {
        SandboxContext::new(std::env::temp_dir())
    }

    #[test]
    fn test_decode_body_cut_mid_code_point() {
        // "héllo" cut inside the two-byte 'é'
        let cut = "héllo".as_bytes()[..2].to_vec();
        assert_eq!(decode_body(cut.clone(), true), "h");
        assert!(!decode_body(cut, true).contains('\u{FFFD}'));

        // four-byte emoji cut after three bytes
        let mut emoji = b"ok ".to_vec();
        emoji.extend_from_slice(&"🦀".as_bytes()[..3]);
        assert_eq!(decode_body(emoji, true), "ok ");
    }

    #[test]
    fn test_decode_body_keeps_invalid_bytes_when_not_cut() {
        assert_eq!(decode_body(b"a\xffb".to_vec(), false), "a\u{FFFD}b");
        assert_eq!(decode_body(vec![b'h', 0xC3], false), "h\u{FFFD}");
        // an invalid byte in the middle is not a partial tail
        assert_eq!(decode_body(b"a\xffb".to_vec(), true), "a\u{FFFD}b");
    }

    #[test]
    fn test_search_tool_metadata() {
        let ddg = DuckDuckGoSearchTool::new();
        let meta = ddg.describe();
        assert_eq!(meta.name, "duckduckgo_search");
        assert!(meta.tags.contains("search"));
        assert_eq!(ddg.max_results(), 5);

        let web = WebSearchTool::default();
        assert_eq!(web.describe().name, "web_search");
        assert_eq!(web.max_results(), 10);
        assert_eq!(web.engine(), "duckduckgo");
    }

    #[test]
    fn test_unsupported_engine_rejected() {
        let err = WebSearchTool::new("bing", 3).err().unwrap();
        assert!(matches!(err, InstantlyError::Validation(ref m) if m.contains("bing")));
        assert!(WebSearchTool::new("DuckDuckGo", 3).is_ok());
    }

    #[test]
    fn test_related_topics_truncated() {
        let payload = json!({
            "RelatedTopics": [{"Text": "a"}, {"Text": "b"}, {"Text": "c"}]
        });
        assert_eq!(related_topics(&payload, 2), json!([{"Text": "a"}, {"Text": "b"}]));
        assert_eq!(related_topics(&json!({}), 5), json!([]));
    }

    #[tokio::test]
    async fn test_search_requires_query() {
        let tool = DuckDuckGoSearchTool::new();
        let err = tool.invoke(ToolArgs::new(), &ctx()).await.unwrap_err();
        assert!(matches!(err, InstantlyError::Validation(_)));

        let blank = ToolArgs::from_args(vec![json!("   ")]);
        let err = tool.invoke(blank, &ctx()).await.unwrap_err();
        assert!(matches!(err, InstantlyError::Validation(_)));
    }

    #[test]
    fn test_extract_title_and_text() {
        let tool = VisitWebpageTool::default();
        let html = "<html><head><title> Hello &amp; bye </title><style>p{}</style></head>\
                    <body><script>var x;</script><p>First</p><div>Second&nbsp;part</div></body></html>";
        assert_eq!(tool.extract_title(html).as_deref(), Some("Hello & bye"));
        let text = tool.extract_text(html);
        assert!(text.contains("First"));
        assert!(text.contains("Second part"));
        assert!(!text.contains("var x"));
        assert!(!text.contains("p{}"));
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("héllo".to_string(), Some(2)), "hé");
        assert_eq!(truncate_chars("short".to_string(), Some(50)), "short");
        assert_eq!(truncate_chars("keep".to_string(), None), "keep");
    }

    #[tokio::test]
    async fn test_visit_rejects_bad_urls() {
        let tool = VisitWebpageTool::default();
        for url in [
            "not a url",
            "ftp://example.com/file",
            "http://localhost:8080/",
            "http://10.0.0.5/",
            "http://[::1]/",
        ] {
            let err = tool
                .invoke(ToolArgs::from_args(vec![json!(url)]), &ctx())
                .await
                .unwrap_err();
            assert!(
                matches!(err, InstantlyError::Validation(_)),
                "{url} gave {err}"
            );
        }
    }

    #[test]
    fn test_blocked_hosts() {
        let blocked = [
            "http://printer.local/",
            "http://127.0.0.1/",
            "http://169.254.169.254/latest/meta-data",
            "http://192.168.1.1/",
            "http://[fe80::1]/",
        ];
        for url in blocked {
            assert!(is_blocked_host(&Url::parse(url).unwrap()), "{url}");
        }
        assert!(!is_blocked_host(&Url::parse("https://example.com/").unwrap()));
        assert!(!is_blocked_host(&Url::parse("https://8.8.8.8/").unwrap()));
    }
}
