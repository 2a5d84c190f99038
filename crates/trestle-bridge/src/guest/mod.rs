//! Guest runtime embedding surface
//!
//! The concrete reference-counted object model the guest runtime's embedding
//! API exposes: values, classes, pending-error state, and the compiler/
//! evaluator seam. The bridge manipulates guest state exclusively through
//! these types while holding a [`crate::lock::LockScope`].

pub mod class;
pub mod error;
pub mod eval;
pub mod module;
pub mod value;

pub use class::{ClassOrigin, GuestClass, GuestMember, GuestMemberKind};
pub use error::{GuestError, GuestFrame};
pub use value::{
    GuestCallable, GuestDuration, GuestInstance, GuestPayload, GuestRef, GuestTimestamp,
    GuestWeak, NativeGuestFn,
};
