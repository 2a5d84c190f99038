//! Interpreter lock manager
//!
//! One process-wide lock protects all guest execution: only one OS thread
//! runs guest code at a time, regardless of how many interpreter instances
//! exist. A [`LockScope`] is a dynamically-scoped, re-entrant, thread-bound
//! claim on that lock for one interpreter; dropping the scope restores the
//! previously-current interpreter for the thread, never a different one.
//!
//! Every other component touches guest state only while a scope is open.

use std::cell::RefCell;
use std::marker::PhantomData;
use std::sync::Arc;
use std::thread::ThreadId;

use parking_lot::{Condvar, Mutex};
use tracing::trace;
use trestle_sdk::HostObject;

use crate::guest::value::GuestRef;
use crate::interp::{GuestInterpreter, InterpId};

#[derive(Default)]
struct LockState {
    owner: Option<ThreadId>,
    depth: usize,
}

struct ScopeFrame {
    manager: usize,
    interp: InterpId,
    keep_alive_guest: Vec<GuestRef>,
    keep_alive_host: Vec<HostObject>,
}

thread_local! {
    static SCOPES: RefCell<Vec<ScopeFrame>> = const { RefCell::new(Vec::new()) };
}

/// Owner of the process-wide guest lock and the per-thread current-
/// interpreter bookkeeping.
pub struct LockManager {
    state: Mutex<LockState>,
    available: Condvar,
}

impl LockManager {
    /// Create a lock manager
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LockState::default()),
            available: Condvar::new(),
        }
    }

    fn id(&self) -> usize {
        self as *const LockManager as usize
    }

    /// Acquire the lock for an interpreter, blocking if another thread
    /// holds it.
    ///
    /// Re-entrant per thread: nested acquisitions for the same interpreter
    /// are counted and free. Acquiring for a *different* interpreter while
    /// this thread already holds the lock is a programming error (it would
    /// deadlock) and fails an assertion.
    ///
    /// The calling thread is registered with the interpreter's host program
    /// before guest code may call back into host code, and deregistered
    /// when the registering scope closes.
    pub fn acquire(&self, interp: &Arc<GuestInterpreter>) -> LockScope<'_> {
        let manager = self.id();
        let held = SCOPES.with(|scopes| {
            scopes
                .borrow()
                .iter()
                .rev()
                .find(|f| f.manager == manager)
                .map(|f| f.interp)
        });

        match held {
            Some(current) => {
                assert_eq!(
                    current,
                    interp.id(),
                    "re-entrant lock acquisition for interpreter #{} while holding the lock \
                     for interpreter #{}; release the current scope first",
                    interp.id().as_u64(),
                    current.as_u64(),
                );
                self.state.lock().depth += 1;
            }
            None => {
                let mut state = self.state.lock();
                while state.owner.is_some() {
                    self.available.wait(&mut state);
                }
                state.owner = Some(std::thread::current().id());
                state.depth = 1;
            }
        }

        let registered = if !interp.program().thread_registered() {
            interp.program().register_thread();
            true
        } else {
            false
        };

        SCOPES.with(|scopes| {
            scopes.borrow_mut().push(ScopeFrame {
                manager,
                interp: interp.id(),
                keep_alive_guest: Vec::new(),
                keep_alive_host: Vec::new(),
            })
        });

        trace!(interp = interp.id().as_u64(), registered, "lock scope opened");

        LockScope {
            manager: self,
            interp: Arc::clone(interp),
            registered,
            _not_send: PhantomData,
        }
    }

    /// The interpreter current on the calling thread, if it holds the lock
    pub fn current_interpreter(&self) -> Option<InterpId> {
        let manager = self.id();
        SCOPES.with(|scopes| {
            scopes
                .borrow()
                .iter()
                .rev()
                .find(|f| f.manager == manager)
                .map(|f| f.interp)
        })
    }

    /// Whether any thread currently holds the lock
    pub fn is_locked(&self) -> bool {
        self.state.lock().owner.is_some()
    }

    /// Record a guest handle in the innermost open scope's keep-alive table.
    ///
    /// No-op when no scope is open on the calling thread.
    pub(crate) fn record_guest_keep_alive(&self, value: GuestRef) {
        let manager = self.id();
        SCOPES.with(|scopes| {
            if let Some(frame) = scopes
                .borrow_mut()
                .iter_mut()
                .rev()
                .find(|f| f.manager == manager)
            {
                frame.keep_alive_guest.push(value);
            }
        });
    }

    /// Record a host handle in the innermost open scope's keep-alive table.
    pub(crate) fn record_host_keep_alive(&self, object: HostObject) {
        let manager = self.id();
        SCOPES.with(|scopes| {
            if let Some(frame) = scopes
                .borrow_mut()
                .iter_mut()
                .rev()
                .find(|f| f.manager == manager)
            {
                frame.keep_alive_host.push(object);
            }
        });
    }

    fn release(&self, scope: &LockScope<'_>) {
        let manager = self.id();
        let frame = SCOPES.with(|scopes| {
            let mut scopes = scopes.borrow_mut();
            let idx = scopes
                .iter()
                .rposition(|f| f.manager == manager)
                .expect("lock scope closed on a thread that never opened it");
            scopes.remove(idx)
        });
        debug_assert_eq!(
            frame.interp,
            scope.interp.id(),
            "lock scopes must close in strict nesting order"
        );
        // Keep-alive handles drop here, after the call they protected.
        drop(frame);

        if scope.registered {
            scope.interp.program().deregister_thread();
        }

        let mut state = self.state.lock();
        state.depth -= 1;
        if state.depth == 0 {
            state.owner = None;
            self.available.notify_one();
        }

        trace!(interp = scope.interp.id().as_u64(), "lock scope closed");
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII claim on the guest lock for one interpreter.
///
/// Thread-bound: a scope never migrates to another thread.
pub struct LockScope<'a> {
    manager: &'a LockManager,
    interp: Arc<GuestInterpreter>,
    registered: bool,
    _not_send: PhantomData<*mut ()>,
}

impl LockScope<'_> {
    /// The interpreter this scope holds the lock for
    pub fn interp(&self) -> &Arc<GuestInterpreter> {
        &self.interp
    }
}

impl Drop for LockScope<'_> {
    fn drop(&mut self) {
        self.manager.release(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guest::error::GuestError;
    use crate::guest::eval::{CompileError, GuestCode, GuestEvaluator, GUEST_ABI_VERSION};
    use std::sync::atomic::{AtomicBool, Ordering};
    use trestle_sdk::{HostProgram, HostRegistry};

    struct NullEvaluator;

    impl GuestEvaluator for NullEvaluator {
        fn abi_version(&self) -> u32 {
            GUEST_ABI_VERSION
        }
        fn compile(&self, _s: &str, file: &str) -> Result<GuestCode, CompileError> {
            Err(CompileError::new("not supported", file, 0))
        }
        fn execute(
            &self,
            _i: &GuestInterpreter,
            _c: &GuestCode,
            _m: &GuestRef,
        ) -> Result<GuestRef, GuestError> {
            Ok(GuestRef::none())
        }
        fn call(
            &self,
            _i: &GuestInterpreter,
            _c: &GuestCode,
            _r: Option<&GuestRef>,
            _a: &[GuestRef],
        ) -> Result<GuestRef, GuestError> {
            Ok(GuestRef::none())
        }
    }

    fn interp() -> Arc<GuestInterpreter> {
        let program = HostProgram::new("test", Arc::new(HostRegistry::new()));
        GuestInterpreter::new(program, Arc::new(NullEvaluator))
    }

    #[test]
    fn test_reentrant_same_interpreter() {
        let mgr = LockManager::new();
        let i = interp();

        let _outer = mgr.acquire(&i);
        assert_eq!(mgr.current_interpreter(), Some(i.id()));
        {
            let _inner = mgr.acquire(&i);
            assert_eq!(mgr.current_interpreter(), Some(i.id()));
        }
        // Inner release restores the same current interpreter.
        assert_eq!(mgr.current_interpreter(), Some(i.id()));
        assert!(mgr.is_locked());
    }

    #[test]
    fn test_full_release_clears_current() {
        let mgr = LockManager::new();
        let i = interp();
        {
            let _scope = mgr.acquire(&i);
            assert!(mgr.is_locked());
        }
        assert_eq!(mgr.current_interpreter(), None);
        assert!(!mgr.is_locked());
    }

    #[test]
    #[should_panic(expected = "re-entrant lock acquisition")]
    fn test_cross_interpreter_nesting_asserts() {
        let mgr = LockManager::new();
        let a = interp();
        let b = interp();
        let _outer = mgr.acquire(&a);
        let _inner = mgr.acquire(&b);
    }

    #[test]
    fn test_exclusion_across_threads() {
        let mgr = Arc::new(LockManager::new());
        let i = interp();
        let other_ran = Arc::new(AtomicBool::new(false));

        let scope = mgr.acquire(&i);
        std::thread::scope(|s| {
            let handle = {
                let mgr = Arc::clone(&mgr);
                let i = Arc::clone(&i);
                let other_ran = Arc::clone(&other_ran);
                s.spawn(move || {
                    let _scope = mgr.acquire(&i);
                    other_ran.store(true, Ordering::SeqCst);
                })
            };

            std::thread::sleep(std::time::Duration::from_millis(30));
            assert!(!other_ran.load(Ordering::SeqCst), "lock was not exclusive");
            drop(scope);

            handle.join().unwrap();
            assert!(other_ran.load(Ordering::SeqCst));
        });
    }

    #[test]
    fn test_thread_registration_lifecycle() {
        let mgr = LockManager::new();
        let i = interp();
        assert!(!i.program().thread_registered());
        {
            let _scope = mgr.acquire(&i);
            assert!(i.program().thread_registered());
            {
                let _inner = mgr.acquire(&i);
                assert!(i.program().thread_registered());
            }
            // Still registered: the outer scope did the registering.
            assert!(i.program().thread_registered());
        }
        assert!(!i.program().thread_registered());
    }

    #[test]
    fn test_keep_alive_held_until_scope_close() {
        let mgr = LockManager::new();
        let i = interp();
        let value = GuestRef::str("pinned");
        let base = value.strong_count();
        {
            let _scope = mgr.acquire(&i);
            mgr.record_guest_keep_alive(value.clone());
            assert_eq!(value.strong_count(), base + 1);
        }
        assert_eq!(value.strong_count(), base);
    }

    #[test]
    fn test_keep_alive_without_scope_is_noop() {
        let mgr = LockManager::new();
        let value = GuestRef::str("unpinned");
        let base = value.strong_count();
        mgr.record_guest_keep_alive(value.clone());
        assert_eq!(value.strong_count(), base);
    }
}
