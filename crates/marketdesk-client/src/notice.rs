use std::fmt;
use std::future::Future;

use serde::Serialize;
use tracing::warn;

use crate::error::ClientError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// A user-facing message produced at an action boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: String,
    pub message: String,
}

impl Notice {
    pub fn info(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            title: title.into(),
            message: message.into(),
        }
    }
}

impl From<&ClientError> for Notice {
    fn from(err: &ClientError) -> Self {
        let (level, title) = match err {
            ClientError::Validation(_) => (NoticeLevel::Warning, "Invalid input"),
            ClientError::NotFound(_) => (NoticeLevel::Warning, "Not found"),
            ClientError::Network(_) => (NoticeLevel::Error, "Network error"),
            ClientError::Server { .. } | ClientError::Json(_) => {
                (NoticeLevel::Error, "Server error")
            }
            ClientError::Cache(_) => (NoticeLevel::Error, "Cache error"),
        };
        Self {
            level,
            title: title.to_string(),
            message: err.user_message(),
        }
    }
}

impl From<ClientError> for Notice {
    fn from(err: ClientError) -> Self {
        Notice::from(&err)
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.title, self.message)
    }
}

impl std::error::Error for Notice {}

/// Run one user action, converting a failure into a [`Notice`].
pub async fn guarded<T, Fut>(action: &str, fut: Fut) -> Result<T, Notice>
where
    Fut: Future<Output = Result<T, ClientError>>,
{
    fut.await.map_err(|e| {
        warn!(action, error = %e, "Action failed");
        Notice::from(&e)
    })
}
