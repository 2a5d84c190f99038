//! Host program context handle
//!
//! A `HostProgram` stands for one host execution context: it owns the
//! symbol registry the bridge projects against and the bookkeeping of which
//! OS threads the host already knows about. Threads unknown to the host
//! must be registered before they may call back into host code.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::thread::ThreadId;

use crate::registry::HostRegistry;

struct ProgramInner {
    name: String,
    registry: Arc<HostRegistry>,
    threads: Mutex<HashSet<ThreadId>>,
}

/// Shared handle to one host program context.
#[derive(Clone)]
pub struct HostProgram {
    inner: Arc<ProgramInner>,
}

impl HostProgram {
    /// Create a program context backed by the given registry
    pub fn new(name: impl Into<String>, registry: Arc<HostRegistry>) -> Self {
        Self {
            inner: Arc::new(ProgramInner {
                name: name.into(),
                registry,
                threads: Mutex::new(HashSet::new()),
            }),
        }
    }

    /// Program name
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The program's symbol registry
    pub fn registry(&self) -> &Arc<HostRegistry> {
        &self.inner.registry
    }

    /// Stable identity of this program context
    pub fn id(&self) -> usize {
        Arc::as_ptr(&self.inner) as usize
    }

    /// Whether two handles refer to the same program
    pub fn ptr_eq(&self, other: &HostProgram) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Register the calling OS thread with this program.
    ///
    /// Returns `true` if the thread was not previously known.
    pub fn register_thread(&self) -> bool {
        self.inner
            .threads
            .lock()
            .unwrap()
            .insert(std::thread::current().id())
    }

    /// Deregister the calling OS thread
    pub fn deregister_thread(&self) {
        self.inner
            .threads
            .lock()
            .unwrap()
            .remove(&std::thread::current().id());
    }

    /// Whether the calling OS thread is known to this program
    pub fn thread_registered(&self) -> bool {
        self.inner
            .threads
            .lock()
            .unwrap()
            .contains(&std::thread::current().id())
    }

    /// Number of currently registered threads
    pub fn registered_thread_count(&self) -> usize {
        self.inner.threads.lock().unwrap().len()
    }
}

impl fmt::Debug for HostProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostProgram({}@{:#x})", self.inner.name, self.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_registration() {
        let program = HostProgram::new("main", Arc::new(HostRegistry::new()));
        assert!(!program.thread_registered());
        assert!(program.register_thread());
        assert!(!program.register_thread());
        assert!(program.thread_registered());
        program.deregister_thread();
        assert!(!program.thread_registered());
    }

    #[test]
    fn test_identity() {
        let registry = Arc::new(HostRegistry::new());
        let a = HostProgram::new("a", Arc::clone(&registry));
        let b = a.clone();
        let c = HostProgram::new("c", registry);
        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&c));
    }
}
