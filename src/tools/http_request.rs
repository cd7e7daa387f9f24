//! API request tool: lets the agent call external REST APIs.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::{json, Value};

use crate::error::{InstantlyError, Result};
use crate::sandbox::SandboxContext;

use super::web::read_body_limited;
use super::{Tool, ToolArgs, ToolMetadata};

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_RESPONSE_BYTES: usize = 1_000_000;

/// Makes HTTP requests, optionally relative to a base URL with default headers.
///
/// Arguments: `method`, `endpoint`, optional `data` (sent as a JSON body)
/// and optional `params` (query string). JSON responses are parsed; anything
/// else is returned as text.
pub struct ApiRequestTool {
    client: Client,
    base_url: Option<String>,
    headers: HashMap<String, String>,
}

impl ApiRequestTool {
    pub fn new(base_url: Option<String>, headers: HashMap<String, String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            base_url: base_url.filter(|u| !u.trim().is_empty()),
            headers,
        }
    }

    /// Join `endpoint` onto the base URL, if one is configured.
    pub fn build_url(&self, endpoint: &str) -> String {
        match &self.base_url {
            Some(base) => format!(
                "{}/{}",
                base.trim_end_matches('/'),
                endpoint.trim_start_matches('/')
            ),
            None => endpoint.to_string(),
        }
    }
}

impl Default for ApiRequestTool {
    fn default() -> Self {
        Self::new(None, HashMap::new())
    }
}

/// Query parameters from a JSON object; non-string scalars are stringified.
fn query_pairs(params: Option<&Value>) -> Result<Vec<(String, String)>> {
    let Some(params) = params else {
        return Ok(Vec::new());
    };
    let object = params.as_object().ok_or_else(|| {
        InstantlyError::Validation("Argument 'params' must be an object".to_string())
    })?;
    Ok(object
        .iter()
        .map(|(k, v)| {
            let value = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), value)
        })
        .collect())
}

#[async_trait]
impl Tool for ApiRequestTool {
    fn describe(&self) -> ToolMetadata {
        ToolMetadata::new("api_request", "Make HTTP API requests")
            .with_tags(["api", "http", "web"])
            .asynchronous()
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "required": ["method", "endpoint"],
            "properties": {
                "method": {"type": "string", "description": "HTTP method, e.g. GET or POST"},
                "endpoint": {"type": "string", "description": "Path relative to the base URL, or a full URL"},
                "data": {"type": "object", "description": "JSON request body"},
                "params": {"type": "object", "description": "Query string parameters"}
            }
        })
    }

    async fn invoke(&self, args: ToolArgs, _ctx: &SandboxContext) -> Result<Value> {
        let method_str = args.str_arg(0, "method")?.to_uppercase();
        let endpoint = args.str_arg(1, "endpoint")?;
        let data = args.get(2, "data").cloned();
        let params = query_pairs(args.get(3, "params"))?;

        let method = Method::from_bytes(method_str.as_bytes()).map_err(|_| {
            InstantlyError::Validation(format!("Unknown HTTP method: {}", method_str))
        })?;
        let url = self.build_url(&endpoint);
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(InstantlyError::Validation(format!(
                "Only http:// and https:// URLs are allowed: {}",
                url
            )));
        }

        let mut req = self.client.request(method, &url).query(&params);
        for (k, v) in &self.headers {
            req = req.header(k, v);
        }
        if let Some(body) = &data {
            req = req.json(body);
        }

        let response = req
            .send()
            .await
            .map_err(|e| InstantlyError::Api(format!("Request to {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(InstantlyError::Api(format!(
                "{} {} returned HTTP {}",
                method_str, url, status
            )));
        }

        let is_json = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.starts_with("application/json"))
            .unwrap_or(false);

        let body = read_body_limited(response, MAX_RESPONSE_BYTES).await?;
        if is_json {
            serde_json::from_str(&body)
                .map_err(|e| InstantlyError::Api(format!("Invalid JSON from {}: {}", url, e)))
        } else {
            Ok(Value::String(body))
        }
    }
}
