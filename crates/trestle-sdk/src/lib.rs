//! Trestle SDK - Host-boundary types for the trestle object bridge
//!
//! This crate provides the types a host runtime exchanges with the bridge:
//! the generic value representation, class/method/constant descriptors with
//! visibility, the object handle, the namespace registry, the program
//! context handle, and the host error payload.
//!
//! Host embedders program against these types alone; they never depend on
//! the bridge core or on the guest runtime.
//!
//! # Example
//!
//! ```ignore
//! use trestle_sdk::{HostClassDef, HostValue, Visibility};
//!
//! let point = HostClassDef::builder("Point")
//!     .namespace("geo")
//!     .constructor(|recv, args| { /* ... */ Ok(HostValue::Null) })
//!     .method("distance", Visibility::Public, |recv, _args| {
//!         /* ... */ Ok(HostValue::Float(5.0))
//!     })
//!     .build();
//! ```

#![warn(missing_docs)]

mod class;
mod error;
mod object;
mod program;
mod registry;
mod value;

pub use class::{
    HostClassBuilder, HostClassDef, HostFn, HostFunctionDef, HostMethodDef, MemberKind,
    Visibility,
};
pub use error::{FrameLanguage, HostError, HostFrame, HostResult};
pub use object::{ForeignHandle, HostObject, WeakHostObject};
pub use program::HostProgram;
pub use registry::HostRegistry;
pub use value::{Duration, HostValue, Timestamp};
