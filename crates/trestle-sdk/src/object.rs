//! Host object handle
//!
//! A `HostObject` is the host runtime's reference-counted instance handle.
//! Cloning the handle takes one new strong reference; dropping it releases
//! exactly one. Identity is the heap address of the shared cell.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, Weak};

use crate::class::HostClassDef;
use crate::error::{HostError, HostResult};
use crate::value::HostValue;

/// Opaque payload pinned to an object by a foreign runtime.
///
/// The bridge stores the far-side native handle here; the host never
/// inspects it.
pub type ForeignHandle = Arc<dyn Any + Send + Sync>;

struct ObjectInner {
    class: Arc<HostClassDef>,
    fields: Mutex<HashMap<String, HostValue>>,
    foreign: OnceLock<ForeignHandle>,
}

/// Reference-counted host instance handle.
#[derive(Clone)]
pub struct HostObject {
    inner: Arc<ObjectInner>,
}

impl HostObject {
    /// Allocate a new instance of the given class with no fields set
    pub fn new(class: Arc<HostClassDef>) -> Self {
        Self {
            inner: Arc::new(ObjectInner {
                class,
                fields: Mutex::new(HashMap::new()),
                foreign: OnceLock::new(),
            }),
        }
    }

    /// The instance's class descriptor
    pub fn class(&self) -> &Arc<HostClassDef> {
        &self.inner.class
    }

    /// Stable identity: heap address of the shared cell
    pub fn id(&self) -> usize {
        Arc::as_ptr(&self.inner) as usize
    }

    /// Whether two handles refer to the same instance
    pub fn ptr_eq(&self, other: &HostObject) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Number of live strong references to this instance
    pub fn strong_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Read a field by name
    pub fn get_field(&self, name: &str) -> Option<HostValue> {
        self.inner.fields.lock().unwrap().get(name).cloned()
    }

    /// Write a field by name
    pub fn set_field(&self, name: impl Into<String>, value: HostValue) {
        self.inner
            .fields
            .lock()
            .unwrap()
            .insert(name.into(), value);
    }

    /// Pin a foreign payload to this instance.
    ///
    /// The payload can be set once; a second attempt is an error so two
    /// runtimes can never contend for the slot.
    pub fn attach_foreign(&self, handle: ForeignHandle) -> HostResult<()> {
        self.inner.foreign.set(handle).map_err(|_| {
            HostError::new(
                "StateError",
                format!(
                    "object of class '{}' already carries a foreign payload",
                    self.inner.class.name()
                ),
            )
        })
    }

    /// The pinned foreign payload, if any
    pub fn foreign(&self) -> Option<&ForeignHandle> {
        self.inner.foreign.get()
    }

    /// Downgrade to a weak handle
    pub fn downgrade(&self) -> WeakHostObject {
        WeakHostObject {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

impl PartialEq for HostObject {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for HostObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "HostObject({}@{:#x})",
            self.inner.class.name(),
            self.id()
        )
    }
}

/// Weak counterpart of [`HostObject`], used by identity tables.
#[derive(Clone)]
pub struct WeakHostObject {
    inner: Weak<ObjectInner>,
}

impl WeakHostObject {
    /// Upgrade back to a strong handle if the instance is still alive
    pub fn upgrade(&self) -> Option<HostObject> {
        self.inner.upgrade().map(|inner| HostObject { inner })
    }
}
