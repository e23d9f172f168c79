//! Controller error types.

use ferrostor_core::{ApiCallRc, ApiCallRcEntry, RetCode};
use ferrostor_metadata::MetadataError;

/// Controller error type.
#[derive(Debug, thiserror::Error)]
pub enum CtrlError {
    /// A user-facing failure with a specific return code.
    #[error("{0}")]
    Api(Box<ApiCallRcEntry>),

    /// A broken internal invariant.
    #[error("implementation error: {0}")]
    Implementation(String),

    #[error("metadata error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("core error: {0}")]
    Core(#[from] ferrostor_core::Error),

    #[error("satellite communication failed: {0}")]
    Satellite(String),
}

impl CtrlError {
    pub fn api(ret_code: RetCode, message: impl Into<String>) -> Self {
        Self::Api(Box::new(ApiCallRcEntry::new(ret_code, message)))
    }

    pub fn implementation(message: impl Into<String>) -> Self {
        Self::Implementation(message.into())
    }

    /// Whether this error indicates a defect rather than a user or environment problem.
    pub fn is_implementation_error(&self) -> bool {
        match self {
            Self::Implementation(_) => true,
            Self::Metadata(e) => e.is_implementation_error(),
            _ => false,
        }
    }

    /// Get the return code for this error.
    pub fn ret_code(&self) -> RetCode {
        match self {
            Self::Api(entry) => entry.ret_code,
            Self::Implementation(_) => RetCode::FailImplError,
            Self::Metadata(e) => match e {
                MetadataError::Implementation(_) => RetCode::FailImplError,
                MetadataError::Database(_) => RetCode::FailSqlError,
                MetadataError::Core(_) => RetCode::FailInvalidName,
                _ => RetCode::FailUnknownError,
            },
            Self::Core(_) => RetCode::FailInvalidName,
            Self::Satellite(_) => RetCode::FailUnknownError,
        }
    }

    /// Get the error code string for this error.
    pub fn code(&self) -> &'static str {
        self.ret_code().as_str()
    }

    /// Render into the result list reported to the caller, logging it on the way.
    pub fn to_api_call_rc(&self) -> ApiCallRc {
        if self.is_implementation_error() {
            tracing::error!(code = self.code(), error = %self, "implementation error");
        } else {
            tracing::warn!(code = self.code(), error = %self, "operation failed");
        }

        match self {
            Self::Api(entry) => ApiCallRc::single(entry.as_ref().clone()),
            other => ApiCallRc::single(
                ApiCallRcEntry::new(other.ret_code(), "operation failed")
                    .with_cause(other.to_string()),
            ),
        }
    }
}

impl From<ApiCallRcEntry> for CtrlError {
    fn from(entry: ApiCallRcEntry) -> Self {
        Self::Api(Box::new(entry))
    }
}

/// Result type for controller operations.
pub type CtrlResult<T> = std::result::Result<T, CtrlError>;
