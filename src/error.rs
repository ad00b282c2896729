use thiserror::Error;

pub const GENERIC_FAILURE_MESSAGE: &str = "Something went wrong. Please try again.";
pub const QUOTA_EXCEEDED_MESSAGE: &str =
    "You have reached the reminder limit for your plan. Upgrade to add more reminders.";

#[derive(Debug, Error)]
pub enum ClientError {
    /// Missing or malformed user input. Handled locally, never sent to the backend.
    #[error("invalid {field}: {message}")]
    Validation { field: &'static str, message: String },

    #[error("notification permission denied")]
    PermissionDenied,

    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("failed to acquire push token: {0}")]
    TokenAcquisition(String),

    #[error("backend rejected request ({status}): {}", .message.as_deref().unwrap_or(GENERIC_FAILURE_MESSAGE))]
    BackendRejection { status: u16, message: Option<String> },

    /// The push token was still rejected after the one automatic refresh.
    #[error("push token rejected after refresh: {0}")]
    TokenStale(String),

    #[error("reminder quota exceeded")]
    QuotaExceeded,

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl ClientError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        ClientError::Validation {
            field,
            message: message.into(),
        }
    }

    /// Text shown to the user in a transient notice.
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Validation { message, .. } => message.clone(),
            ClientError::PermissionDenied => {
                "Notifications are blocked. Allow them in your browser or device settings.".to_string()
            }
            ClientError::UnsupportedPlatform(_) => {
                "This device does not support push notifications.".to_string()
            }
            ClientError::TokenAcquisition(_) => {
                "Could not set up notifications on this device.".to_string()
            }
            ClientError::BackendRejection { message, .. } => message
                .clone()
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| GENERIC_FAILURE_MESSAGE.to_string()),
            ClientError::TokenStale(_) => {
                "Could not deliver the notification. Try disabling and re-enabling notifications."
                    .to_string()
            }
            ClientError::QuotaExceeded => QUOTA_EXCEEDED_MESSAGE.to_string(),
            ClientError::Network(_) | ClientError::Storage(_) | ClientError::Config(_) => {
                GENERIC_FAILURE_MESSAGE.to_string()
            }
        }
    }

    /// Whether a failed send indicates the backend no longer knows this push token.
    pub fn indicates_stale_token(&self) -> bool {
        let text = match self {
            ClientError::BackendRejection { message: Some(m), .. } => m,
            ClientError::TokenStale(m) => m,
            _ => return false,
        };
        let text = text.to_lowercase();
        ["invalid", "unknown", "unregistered", "not registered"]
            .iter()
            .any(|needle| text.contains(needle))
    }
}
