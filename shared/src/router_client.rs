use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error};

/// Number of candidate families requested when the caller does not ask for a specific count.
pub const DEFAULT_TOP_K: u32 = 3;

const DEFAULT_FAILURE: &str = "Failed to test prompt routing";

#[derive(Serialize)]
struct TestPromptRequest<'a> {
    prompt: &'a str,
    top_k: u32,
}

#[derive(thiserror::Error, Debug)]
pub enum RouterError {
    #[error("network error: {0}")]
    Network(String),
    /// Non-2xx answer; carries the remote `detail` when one was sent.
    #[error("{0}")]
    Remote(String),
    #[error("router response is not a JSON object")]
    InvalidShape,
    #[error("parse error: {0}")]
    Parse(serde_json::Error),
}

/// Asks the routing-evaluation service which centroid families match `prompt`.
///
/// Sends `POST {base_url}/v1/router/test-prompt` scoped to `tenant_id` and
/// returns the decoded JSON object untouched.
pub async fn test_prompt(
    client: &Client,
    base_url: &str,
    tenant_id: &str,
    prompt: &str,
    top_k: u32,
) -> Result<Value, RouterError> {
    let url = format!("{}/v1/router/test-prompt", base_url.trim_end_matches('/'));
    debug!(%url, tenant_id, top_k, "\u{2192} router test-prompt");

    let res = client
        .post(&url)
        .header("X-Tenant-Id", tenant_id)
        .json(&TestPromptRequest { prompt, top_k })
        .send()
        .await
        .map_err(|e| {
            error!("network error to router service: {e}");
            RouterError::Network(e.to_string())
        })?;

    let status = res.status();
    let bytes = res
        .bytes()
        .await
        .map_err(|e| RouterError::Network(e.to_string()))?;
    debug!(
        %status,
        "\u{2190} body = {}",
        String::from_utf8_lossy(&bytes[..bytes.len().min(1024)])
    );

    if !status.is_success() {
        return Err(RouterError::Remote(remote_detail(&bytes)));
    }

    let body: Value = serde_json::from_slice(&bytes).map_err(RouterError::Parse)?;
    if !body.is_object() {
        return Err(RouterError::InvalidShape);
    }
    Ok(body)
}

fn remote_detail(bytes: &[u8]) -> String {
    let detail = serde_json::from_slice::<Value>(bytes)
        .ok()
        .and_then(|body| body.get("detail").cloned());
    match detail {
        Some(Value::String(s)) if !s.trim().is_empty() => s,
        Some(Value::Null) | None => DEFAULT_FAILURE.to_string(),
        Some(Value::String(_)) => DEFAULT_FAILURE.to_string(),
        Some(other) => other.to_string(),
    }
}
