//! GuestEvaluator trait — the compiler/evaluator seam
//!
//! The guest runtime's parser, compiler, and bytecode evaluator live outside
//! this crate. The bridge reaches them through this trait: it hands over
//! source text, receives opaque code objects back, and asks for them to be
//! executed in a module namespace or called as functions.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::guest::error::GuestError;
use crate::guest::value::GuestRef;
use crate::interp::GuestInterpreter;

/// Embedding ABI version this bridge was built against.
///
/// Checked against [`GuestEvaluator::abi_version`] when the bridge is
/// created; a mismatch is refused at load time.
pub const GUEST_ABI_VERSION: u32 = 3;

/// Guest source failed to parse or compile.
#[derive(Debug, Clone, thiserror::Error)]
#[error("compile error in {file}:{line}: {message}")]
pub struct CompileError {
    /// Diagnostic message
    pub message: String,
    /// Source file name
    pub file: String,
    /// 1-based line of the failure (0 when unknown)
    pub line: u32,
}

impl CompileError {
    /// Create a compile error
    pub fn new(message: impl Into<String>, file: impl Into<String>, line: u32) -> Self {
        Self {
            message: message.into(),
            file: file.into(),
            line,
        }
    }
}

/// Opaque compiled code object.
///
/// The payload belongs to the evaluator that produced it; the bridge only
/// carries it around.
#[derive(Clone)]
pub struct GuestCode {
    /// Code object name (function or module name)
    pub name: String,
    /// Source file the code was compiled from
    pub file: String,
    payload: Arc<dyn Any + Send + Sync>,
}

impl GuestCode {
    /// Create a code object with an evaluator-owned payload
    pub fn new(
        name: impl Into<String>,
        file: impl Into<String>,
        payload: Arc<dyn Any + Send + Sync>,
    ) -> Self {
        Self {
            name: name.into(),
            file: file.into(),
            payload,
        }
    }

    /// Downcast the payload to the evaluator's concrete type
    pub fn payload_as<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }
}

impl fmt::Debug for GuestCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GuestCode({} @ {})", self.name, self.file)
    }
}

/// Abstract guest compiler/evaluator.
///
/// The bridge calls these methods only while a lock scope for `interp` is
/// open, so implementations may freely touch guest state.
pub trait GuestEvaluator: Send + Sync {
    /// Embedding ABI version of the loaded guest runtime
    fn abi_version(&self) -> u32;

    /// Compile source text into a code object
    fn compile(&self, source: &str, file: &str) -> Result<GuestCode, CompileError>;

    /// Execute module-level code in the given module namespace
    fn execute(
        &self,
        interp: &GuestInterpreter,
        code: &GuestCode,
        module: &GuestRef,
    ) -> Result<GuestRef, GuestError>;

    /// Call a code-backed function
    fn call(
        &self,
        interp: &GuestInterpreter,
        code: &GuestCode,
        recv: Option<&GuestRef>,
        args: &[GuestRef],
    ) -> Result<GuestRef, GuestError>;
}
