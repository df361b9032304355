use serde::{Deserialize, Serialize};

/// Uniform wrapper around every orchestrator response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiEnvelope<T> {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub msg: Option<String>,
    pub data: T,
}

impl<T> ApiEnvelope<T> {
    pub fn success(data: T, msg: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            msg: Some(msg.into()),
            data,
        }
    }

    pub fn into_data(self) -> T {
        self.data
    }
}

/// Body of a non-2xx response.
///
/// FastAPI reports `{"detail": "..."}`, or a list of field errors for request
/// validation failures; envelope-style errors carry the text in `msg`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub detail: Option<serde_json::Value>,
    #[serde(default)]
    pub msg: Option<String>,
}

impl ErrorBody {
    pub fn message(&self) -> Option<String> {
        if let Some(detail) = &self.detail {
            match detail {
                serde_json::Value::String(s) => return Some(s.clone()),
                serde_json::Value::Array(items) => {
                    let parts: Vec<String> = items
                        .iter()
                        .map(|item| match item.get("msg").and_then(|m| m.as_str()) {
                            Some(m) => m.to_string(),
                            None => item.to_string(),
                        })
                        .collect();
                    if !parts.is_empty() {
                        return Some(parts.join("; "));
                    }
                }
                serde_json::Value::Null => {}
                other => return Some(other.to_string()),
            }
        }
        self.msg.clone().filter(|m| !m.is_empty())
    }
}
