//! The bridge service object
//!
//! A [`Bridge`] owns the lock manager, the interpreter registry, the
//! projection caches, and the wrapper identity tables: all the shared
//! mutable state of the runtime boundary. It has process lifetime and is
//! injected (as `Arc<Bridge>`) into everything that needs guest access;
//! there are no ambient globals.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;
use trestle_sdk::{HostClassDef, HostProgram, WeakHostObject};

use crate::guest::class::GuestClass;
use crate::guest::eval::{GuestEvaluator, GUEST_ABI_VERSION};
use crate::guest::value::{GuestRef, GuestWeak};
use crate::interp::{GuestInterpreter, InterpId};
use crate::lock::{LockManager, LockScope};
use crate::{BridgeError, BridgeResult};

/// Bridge configuration.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// UTC offset applied to timezone-naive guest timestamps, in seconds.
    ///
    /// Naive timestamps carry no zone of their own; they are resolved
    /// against this caller-default zone.
    pub default_utc_offset_secs: i32,
    /// Namespace guest classes are registered under when projected into the
    /// host registry
    pub guest_namespace: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            default_utc_offset_secs: 0,
            guest_namespace: "guest".to_string(),
        }
    }
}

/// The cross-runtime object bridge.
///
/// All caches and identity tables live here and are mutated only while a
/// lock scope is open, except during interpreter teardown, which uses the
/// tables' own mutexes so it can run without the guest lock held.
pub struct Bridge {
    self_ref: Weak<Bridge>,
    config: BridgeConfig,
    lock: LockManager,
    evaluator: Arc<dyn GuestEvaluator>,
    by_program: Mutex<FxHashMap<usize, Arc<GuestInterpreter>>>,
    by_id: Mutex<FxHashMap<InterpId, Arc<GuestInterpreter>>>,

    /// Host class descriptor → projected guest class, per interpreter.
    /// Projections are owned by the cache: one lives as long as its
    /// interpreter.
    pub(crate) host_class_cache: Mutex<FxHashMap<(InterpId, usize), GuestRef>>,
    /// Guest class → projected host class descriptor
    pub(crate) guest_class_cache: Mutex<FxHashMap<usize, Arc<HostClassDef>>>,
    /// Host descriptors that are themselves projections of guest classes,
    /// for identity-preserving reverse lookup
    pub(crate) host_projection_sources: Mutex<FxHashMap<usize, Weak<GuestClass>>>,
    /// Descriptors whose projection is currently being constructed
    pub(crate) projections_in_progress: Mutex<FxHashSet<usize>>,
    /// Host object → guest wrapper identity table, per interpreter
    pub(crate) guest_wrappers: Mutex<FxHashMap<(InterpId, usize), GuestWeak>>,
    /// Guest value → host wrapper identity table
    pub(crate) host_wrappers: Mutex<FxHashMap<usize, WeakHostObject>>,
    /// Host classes wrapping guest values with no class of their own
    /// (classes, callables, modules), keyed by kind name
    pub(crate) opaque_wrapper_classes: Mutex<FxHashMap<&'static str, Arc<HostClassDef>>>,
    /// Member-enumeration walks performed (one per materialized projection)
    pub(crate) enumeration_walks: AtomicU64,
}

impl Bridge {
    /// Create a bridge over the given guest evaluator.
    ///
    /// The evaluator's embedding ABI version is checked here, at load time;
    /// a mismatch is refused rather than risking memory corruption later.
    pub fn new(
        evaluator: Arc<dyn GuestEvaluator>,
        config: BridgeConfig,
    ) -> BridgeResult<Arc<Bridge>> {
        let found = evaluator.abi_version();
        if found != GUEST_ABI_VERSION {
            return Err(BridgeError::Version {
                supported: GUEST_ABI_VERSION,
                found,
            });
        }

        debug!(abi = GUEST_ABI_VERSION, "bridge created");

        Ok(Arc::new_cyclic(|self_ref| Bridge {
            self_ref: self_ref.clone(),
            config,
            lock: LockManager::new(),
            evaluator,
            by_program: Mutex::new(FxHashMap::default()),
            by_id: Mutex::new(FxHashMap::default()),
            host_class_cache: Mutex::new(FxHashMap::default()),
            guest_class_cache: Mutex::new(FxHashMap::default()),
            host_projection_sources: Mutex::new(FxHashMap::default()),
            projections_in_progress: Mutex::new(FxHashSet::default()),
            guest_wrappers: Mutex::new(FxHashMap::default()),
            host_wrappers: Mutex::new(FxHashMap::default()),
            opaque_wrapper_classes: Mutex::new(FxHashMap::default()),
            enumeration_walks: AtomicU64::new(0),
        }))
    }

    /// Bridge configuration
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// The lock manager
    pub fn lock_manager(&self) -> &LockManager {
        &self.lock
    }

    /// The interpreter current on the calling thread, if any
    pub fn current_interpreter(&self) -> Option<InterpId> {
        self.lock.current_interpreter()
    }

    /// Weak self-handle for proxy closures
    pub(crate) fn weak(&self) -> Weak<Bridge> {
        self.self_ref.clone()
    }

    // ========================================================================
    // Interpreter lifecycle
    // ========================================================================

    /// The interpreter for a host program, created on first use.
    ///
    /// Exactly one interpreter exists per program context.
    pub fn interpreter_for(&self, program: &HostProgram) -> Arc<GuestInterpreter> {
        let mut by_program = self.by_program.lock();
        if let Some(interp) = by_program.get(&program.id()) {
            return Arc::clone(interp);
        }

        let interp = GuestInterpreter::new(program.clone(), Arc::clone(&self.evaluator));
        debug!(
            interp = interp.id().as_u64(),
            program = program.name(),
            "interpreter created"
        );
        by_program.insert(program.id(), Arc::clone(&interp));
        self.by_id.lock().insert(interp.id(), Arc::clone(&interp));
        interp
    }

    /// Destroy the interpreter belonging to a host program.
    ///
    /// Purges every cache entry tied to the instance. Runs without the
    /// guest lock held, so teardown cannot deadlock against in-flight
    /// destructors; the tables' own mutexes cover the mutation.
    pub fn destroy_interpreter(&self, program: &HostProgram) {
        let Some(interp) = self.by_program.lock().remove(&program.id()) else {
            return;
        };
        let id = interp.id();
        self.by_id.lock().remove(&id);
        self.host_class_cache.lock().retain(|(i, _), _| *i != id);
        self.guest_wrappers.lock().retain(|(i, _), _| *i != id);
        debug!(interp = id.as_u64(), "interpreter destroyed");
    }

    /// Look up a live interpreter by ID
    pub fn interpreter(&self, id: InterpId) -> Option<Arc<GuestInterpreter>> {
        self.by_id.lock().get(&id).cloned()
    }

    /// Open a lock scope for an interpreter
    pub fn acquire(&self, interp: &Arc<GuestInterpreter>) -> LockScope<'_> {
        self.lock.acquire(interp)
    }

    // ========================================================================
    // Diagnostics
    // ========================================================================

    /// Number of member-enumeration walks performed so far.
    ///
    /// A memoized projection walks its source exactly once; repeated
    /// projections of the same descriptor leave this counter unchanged.
    pub fn enumeration_walk_count(&self) -> u64 {
        self.enumeration_walks.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("interpreters", &self.by_id.lock().len())
            .field("projected_host_classes", &self.host_class_cache.lock().len())
            .field("projected_guest_classes", &self.guest_class_cache.lock().len())
            .finish()
    }
}
