use crate::types::enums::{LoadErrorKind, Status};
use std::ffi::NulError;
use std::os::raw::c_int;
use std::string::FromUtf8Error;
use thiserror::Error;

pub type BridgeResult<T> = anyhow::Result<T, BridgeError>;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual: String,
    },

    #[error("attempt to call '{name}' (a {actual} value)")]
    NotCallable { name: String, actual: &'static str },

    #[error("{0}")]
    Runtime(String),

    #[error("{kind}: {message}")]
    Load {
        kind: LoadErrorKind,
        message: String,
    },

    #[error("integer {value} does not fit in {target}")]
    IntegerOverflow { value: i64, target: &'static str },

    #[error("bad argument #{position} ({source})")]
    BadArgument {
        position: usize,
        #[source]
        source: Box<BridgeError>,
    },

    #[error("{captured} captured values exceed the {arity} declared parameters")]
    ArityMismatch { arity: usize, captured: usize },

    #[error("cannot grow the Lua stack by {extra} slots at depth {depth}")]
    StackOverflow { extra: c_int, depth: c_int },

    #[error("{type_name} is already borrowed")]
    BorrowConflict { type_name: &'static str },

    #[error("String conversion error: {0}")]
    StringConversion(#[from] NulError),

    #[error("UTF-8 conversion error: {0}")]
    Utf8Conversion(#[from] FromUtf8Error),

    #[error("path is not valid UTF-8")]
    InvalidPath,

    #[error("Failed to create Lua state")]
    FailedToCreateState,
}

impl BridgeError {
    /// Maps a failed load status to the matching [`BridgeError::Load`].
    ///
    /// Runtime statuses never come out of the loader, but are folded into
    /// [`BridgeError::Runtime`] so the mapping is total.
    pub fn from_load_status(status: Status, message: String) -> Self {
        match LoadErrorKind::from_status(status) {
            Some(kind) => BridgeError::Load { kind, message },
            None => BridgeError::Runtime(message),
        }
    }

    pub(crate) fn bad_argument(position: usize, source: BridgeError) -> Self {
        BridgeError::BadArgument {
            position,
            source: Box::new(source),
        }
    }

    /// The message a script sees when this error crosses into the engine.
    pub fn message(&self) -> String {
        self.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_message_is_verbatim() {
        let err = BridgeError::Runtime("boom".to_string());
        assert_eq!(err.message(), "boom");
    }

    #[test]
    fn bad_argument_wraps_source() {
        let err = BridgeError::bad_argument(
            2,
            BridgeError::TypeMismatch {
                expected: "integer",
                actual: "string".to_string(),
            },
        );
        assert_eq!(
            err.to_string(),
            "bad argument #2 (type mismatch: expected integer, got string)"
        );
    }

    #[test]
    fn load_status_maps_to_kind() {
        let err = BridgeError::from_load_status(Status::SyntaxError, "oops".into());
        assert!(matches!(
            err,
            BridgeError::Load {
                kind: LoadErrorKind::Syntax,
                ..
            }
        ));

        let err = BridgeError::from_load_status(Status::RuntimeError, "late".into());
        assert!(matches!(err, BridgeError::Runtime(ref m) if m == "late"));
    }
}
