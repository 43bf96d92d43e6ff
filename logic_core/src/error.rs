//! Structured error type and the accumulating error log.
//!
//! Grounded on `grim_stream::ProtocolError` for the `thiserror` enum shape
//! and on `original_source/src/include/internals/ErrorReporting.h` for the
//! accumulate-don't-throw policy: construction/update/serialization errors
//! are appended here rather than propagated as panics.

use std::fmt;

use crate::facade::ObjectHandle;

/// The sum type of everything that can go wrong in the engine.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LogicError {
    #[error("Lua syntax error: {0}")]
    LuaSyntaxError(String),
    #[error("Lua runtime error: {0}")]
    LuaRuntimeError(String),
    #[error("illegal argument: {0}")]
    IllegalArgument(String),
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },
    #[error("property '{0}' is read-only")]
    ReadOnlyProperty(String),
    #[error("unknown property: {0}")]
    UnknownProperty(String),
    #[error("duplicate property: {0}")]
    DuplicateProperty(String),
    #[error("cycle detected among strong links")]
    CycleDetected,
    #[error("unknown module: {0}")]
    UnknownModule(String),
    #[error("module name collision: {0}")]
    ModuleNameCollision(String),
    #[error("binding scene mismatch: {0}")]
    BindingSceneMismatch(String),
    #[error("binary version mismatch: {0}")]
    BinaryVersionMismatch(String),
    #[error("corrupted binary: {0}")]
    CorruptedBinary(String),
    #[error("corrupted header: {0}")]
    CorruptedHeader(String),
    #[error("not a logic file: {0}")]
    NotALogicFile(String),
    #[error("missing serialized field: {0}")]
    MissingSerializedField(String),
    #[error("validation warning: {0}")]
    ValidationWarning(String),
}

/// A single entry in the engine's error log.
///
/// Carries the offending object (if any) and a Lua source location
/// (chunk name + line) when the error originated from a script.
#[derive(Debug, Clone)]
pub struct ErrorEntry {
    pub error: LogicError,
    pub offending_object: Option<ObjectHandle>,
    pub source_location: Option<SourceLocation>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub chunk_name: String,
    pub line: u32,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chunk_name, self.line)
    }
}

/// Accumulates errors across calls until explicitly cleared.
#[derive(Debug, Clone, Default)]
pub struct LogicErrorLog {
    entries: Vec<ErrorEntry>,
}

impl LogicErrorLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: LogicError) {
        self.entries.push(ErrorEntry {
            error,
            offending_object: None,
            source_location: None,
        });
    }

    pub fn push_for_object(&mut self, error: LogicError, object: ObjectHandle) {
        self.entries.push(ErrorEntry {
            error,
            offending_object: Some(object),
            source_location: None,
        });
    }

    pub fn push_with_location(
        &mut self,
        error: LogicError,
        object: Option<ObjectHandle>,
        location: SourceLocation,
    ) {
        self.entries.push(ErrorEntry {
            error,
            offending_object: object,
            source_location: Some(location),
        });
    }

    pub fn entries(&self) -> &[ErrorEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
