// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Status codes surfaced by the namespace layer

/// Core namespace error type
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NsError {
    #[error("invalid argument")]
    InvalidArgument,
    #[error("not found")]
    NotFound,
    #[error("wrong type")]
    WrongType,
    #[error("bad state")]
    BadState,
    #[error("not enough buffer")]
    NotEnoughBuffer,
    #[error("out of memory")]
    OutOfMemory,
    #[error("already exists")]
    AlreadyExists,
    #[error("recursion too deep")]
    RecurseTooDeep,
}

pub type NsResult<T> = Result<T, NsError>;

/// Boundary status, including success, in the system-wide numeric convention.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Success,
    Error(NsError),
}

impl Status {
    pub const NO_ERROR: i32 = 0;
    pub const ERR_NOT_FOUND: i32 = -3;
    pub const ERR_NO_MEMORY: i32 = -4;
    pub const ERR_INVALID_ARGS: i32 = -10;
    pub const ERR_NOT_ENOUGH_BUFFER: i32 = -14;
    pub const ERR_ALREADY_EXISTS: i32 = -15;
    pub const ERR_BAD_STATE: i32 = -20;
    pub const ERR_RECURSE_TOO_DEEP: i32 = -53;
    pub const ERR_WRONG_TYPE: i32 = -54;

    pub fn into_raw(self) -> i32 {
        match self {
            Status::Success => Self::NO_ERROR,
            Status::Error(err) => match err {
                NsError::InvalidArgument => Self::ERR_INVALID_ARGS,
                NsError::NotFound => Self::ERR_NOT_FOUND,
                NsError::WrongType => Self::ERR_WRONG_TYPE,
                NsError::BadState => Self::ERR_BAD_STATE,
                NsError::NotEnoughBuffer => Self::ERR_NOT_ENOUGH_BUFFER,
                NsError::OutOfMemory => Self::ERR_NO_MEMORY,
                NsError::AlreadyExists => Self::ERR_ALREADY_EXISTS,
                NsError::RecurseTooDeep => Self::ERR_RECURSE_TOO_DEEP,
            },
        }
    }

    /// Returns `None` for codes this layer never produces.
    pub fn from_raw(raw: i32) -> Option<Self> {
        let err = match raw {
            Self::NO_ERROR => return Some(Status::Success),
            Self::ERR_INVALID_ARGS => NsError::InvalidArgument,
            Self::ERR_NOT_FOUND => NsError::NotFound,
            Self::ERR_WRONG_TYPE => NsError::WrongType,
            Self::ERR_BAD_STATE => NsError::BadState,
            Self::ERR_NOT_ENOUGH_BUFFER => NsError::NotEnoughBuffer,
            Self::ERR_NO_MEMORY => NsError::OutOfMemory,
            Self::ERR_ALREADY_EXISTS => NsError::AlreadyExists,
            Self::ERR_RECURSE_TOO_DEEP => NsError::RecurseTooDeep,
            _ => return None,
        };
        Some(Status::Error(err))
    }

    pub fn is_ok(self) -> bool {
        matches!(self, Status::Success)
    }
}

impl From<NsError> for Status {
    fn from(err: NsError) -> Self {
        Status::Error(err)
    }
}

impl<T> From<&NsResult<T>> for Status {
    fn from(result: &NsResult<T>) -> Self {
        match result {
            Ok(_) => Status::Success,
            Err(err) => Status::Error(*err),
        }
    }
}
