//! SAI status codes and error handling for the IPMC gateway.
//!
//! Every gateway call returns [`SaiResult`]. The orchestration layer keeps
//! the [`SaiStatus`] of a failed call so callers can see what the hardware
//! actually reported.

use std::fmt;
use thiserror::Error;

/// SAI status codes used by the IPMC object APIs.
///
/// Values match `sai_status_t` in the SAI headers.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SaiStatus {
    Success = 0,
    Failure = -1,
    NotSupported = -2,
    NoMemory = -3,
    InsufficientResources = -4,
    InvalidParameter = -5,
    ItemAlreadyExists = -6,
    ItemNotFound = -7,
    TableFull = -13,
    ObjectInUse = -17,
    InvalidObjectType = -18,
    InvalidObjectId = -19,
}

impl fmt::Display for SaiStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SaiStatus::Success => "SAI_STATUS_SUCCESS",
            SaiStatus::Failure => "SAI_STATUS_FAILURE",
            SaiStatus::NotSupported => "SAI_STATUS_NOT_SUPPORTED",
            SaiStatus::NoMemory => "SAI_STATUS_NO_MEMORY",
            SaiStatus::InsufficientResources => "SAI_STATUS_INSUFFICIENT_RESOURCES",
            SaiStatus::InvalidParameter => "SAI_STATUS_INVALID_PARAMETER",
            SaiStatus::ItemAlreadyExists => "SAI_STATUS_ITEM_ALREADY_EXISTS",
            SaiStatus::ItemNotFound => "SAI_STATUS_ITEM_NOT_FOUND",
            SaiStatus::TableFull => "SAI_STATUS_TABLE_FULL",
            SaiStatus::ObjectInUse => "SAI_STATUS_OBJECT_IN_USE",
            SaiStatus::InvalidObjectType => "SAI_STATUS_INVALID_OBJECT_TYPE",
            SaiStatus::InvalidObjectId => "SAI_STATUS_INVALID_OBJECT_ID",
        };
        write!(f, "{}", s)
    }
}

/// Error type for SAI gateway operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SaiError {
    /// Gateway returned a status without a more specific mapping.
    #[error("SAI operation failed: {status}")]
    Status { status: SaiStatus },

    #[error("Invalid parameter: {message}")]
    InvalidParameter { message: String },

    #[error("Item not found: {item}")]
    NotFound { item: String },

    #[error("Item already exists: {item}")]
    AlreadyExists { item: String },

    #[error("Object in use: {object}")]
    ObjectInUse { object: String },

    #[error("Table full: {table}")]
    TableFull { table: String },

    #[error("Feature not supported: {feature}")]
    NotSupported { feature: String },
}

impl SaiError {
    /// Creates an error from a non-success SAI status code.
    ///
    /// Codes without a dedicated variant are kept in `Status` as returned.
    pub fn from_status(status: SaiStatus) -> Self {
        match status {
            SaiStatus::InvalidParameter => SaiError::InvalidParameter {
                message: format!("SAI returned {}", status),
            },
            SaiStatus::ItemNotFound => SaiError::NotFound {
                item: "unknown".to_string(),
            },
            SaiStatus::ItemAlreadyExists => SaiError::AlreadyExists {
                item: "unknown".to_string(),
            },
            SaiStatus::ObjectInUse => SaiError::ObjectInUse {
                object: "unknown".to_string(),
            },
            SaiStatus::TableFull => SaiError::TableFull {
                table: "unknown".to_string(),
            },
            SaiStatus::NotSupported => SaiError::NotSupported {
                feature: "unknown".to_string(),
            },
            _ => SaiError::Status { status },
        }
    }

    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        SaiError::InvalidParameter {
            message: message.into(),
        }
    }

    pub fn not_found(item: impl Into<String>) -> Self {
        SaiError::NotFound { item: item.into() }
    }

    pub fn already_exists(item: impl Into<String>) -> Self {
        SaiError::AlreadyExists { item: item.into() }
    }

    pub fn object_in_use(object: impl Into<String>) -> Self {
        SaiError::ObjectInUse {
            object: object.into(),
        }
    }

    /// Returns the SAI status this error corresponds to.
    pub fn status(&self) -> SaiStatus {
        match self {
            SaiError::Status { status } => *status,
            SaiError::InvalidParameter { .. } => SaiStatus::InvalidParameter,
            SaiError::NotFound { .. } => SaiStatus::ItemNotFound,
            SaiError::AlreadyExists { .. } => SaiStatus::ItemAlreadyExists,
            SaiError::ObjectInUse { .. } => SaiStatus::ObjectInUse,
            SaiError::TableFull { .. } => SaiStatus::TableFull,
            SaiError::NotSupported { .. } => SaiStatus::NotSupported,
        }
    }
}

/// Result type for SAI operations.
pub type SaiResult<T> = Result<T, SaiError>;
