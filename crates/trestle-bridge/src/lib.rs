//! Trestle Bridge Core
//!
//! Embeds a reference-counted dynamic scripting runtime (the guest) inside a
//! host object-oriented runtime and makes values, classes, functions, and
//! exceptions interchangeable in both directions. This crate provides:
//! - Guest interpreter lifecycle and the process-wide interpreter lock
//! - Bidirectional value marshaling between the two type systems
//! - Lazy projection of classes across the runtime boundary
//! - Object wrapping with dual reference-count bookkeeping
//! - Cross-boundary call dispatch
//! - Exception and call-stack translation
//!
//! The host system is reached through the descriptor types of `trestle-sdk`;
//! the guest runtime's compiler/evaluator is reached through the
//! [`GuestEvaluator`] trait.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod bridge;
pub mod codec;
pub mod dispatch;
pub mod except;
pub mod guest;
pub mod interp;
pub mod jvm;
pub mod lock;
pub mod project;
pub mod stack_bridge;
pub mod wrap;

// Re-export SDK types (canonical definitions live in trestle-sdk)
pub use trestle_sdk::{
    Duration, ForeignHandle, FrameLanguage, HostClassBuilder, HostClassDef, HostError, HostFn,
    HostFrame, HostFunctionDef, HostMethodDef, HostObject, HostProgram, HostRegistry, HostResult,
    HostValue, MemberKind, Timestamp, Visibility, WeakHostObject,
};

pub use bridge::{Bridge, BridgeConfig};
pub use except::{BridgeException, BridgeFrame};
pub use guest::eval::{CompileError, GuestCode, GuestEvaluator, GUEST_ABI_VERSION};
pub use guest::{GuestClass, GuestError, GuestFrame, GuestRef, GuestWeak};
pub use interp::{GuestInterpreter, InterpId};
pub use jvm::JvmBridge;
pub use lock::{LockManager, LockScope};
pub use project::ProxyKind;
pub use stack_bridge::{CallKind, GuestStackWalker, StackLocation};

/// Bridge error taxonomy.
///
/// Conversion and resolution failures always surface to the immediate
/// caller; runtime failures carry the fully translated guest stack. Nothing
/// here retries; every failure is reported once, synchronously, at the
/// call site.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// A value or type has no interchange mapping
    #[error("no interchange mapping for value of type '{type_name}'")]
    Conversion {
        /// Name of the offending type
        type_name: String,
    },

    /// Guest source failed to parse or compile
    #[error("{0}")]
    Compile(#[from] CompileError),

    /// A native exception occurred during guest execution
    #[error("{0}")]
    Runtime(BridgeException),

    /// A named function/class/method/symbol could not be found on either side
    #[error("unresolved symbol: {0}")]
    Resolution(String),

    /// Required dynamic symbol or module missing
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The loaded guest runtime does not match the ABI this bridge was built
    /// against. Refused at load time rather than risking memory corruption.
    #[error("guest runtime ABI mismatch: bridge supports {supported}, runtime reports {found}")]
    Version {
        /// ABI version this bridge supports
        supported: u32,
        /// ABI version the loaded runtime reports
        found: u32,
    },

    /// Inheritance cycle detected while projecting a class hierarchy
    #[error("inheritance cycle while projecting class '{0}'")]
    ProjectionCycle(String),
}

/// Bridge result type
pub type BridgeResult<T> = Result<T, BridgeError>;
