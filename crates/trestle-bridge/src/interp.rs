//! Guest interpreter instances
//!
//! Each host program context owns one isolated interpreter with its own
//! module namespace. Interpreters share the guest heap and the single
//! process-wide lock; all mutation happens while a lock scope for the
//! instance is open.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::ThreadId;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use trestle_sdk::HostProgram;

use crate::guest::error::{GuestError, GuestFrame};
use crate::guest::eval::GuestEvaluator;
use crate::guest::value::GuestRef;

/// Unique identifier for a guest interpreter instance.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct InterpId(u64);

static NEXT_INTERP_ID: AtomicU64 = AtomicU64::new(1);

impl InterpId {
    /// Generate a new unique InterpId
    pub fn new() -> Self {
        InterpId(NEXT_INTERP_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the numeric ID value
    pub fn as_u64(self) -> u64 {
        self.0
    }

    /// Create an InterpId from a u64 value
    pub fn from_u64(id: u64) -> Self {
        InterpId(id)
    }
}

impl Default for InterpId {
    fn default() -> Self {
        Self::new()
    }
}

/// One isolated guest execution environment.
pub struct GuestInterpreter {
    id: InterpId,
    program: HostProgram,
    evaluator: Arc<dyn GuestEvaluator>,
    modules: Mutex<FxHashMap<String, GuestRef>>,
    pending_error: Mutex<Option<GuestError>>,
    call_stacks: Mutex<FxHashMap<ThreadId, Vec<GuestFrame>>>,
}

impl GuestInterpreter {
    pub(crate) fn new(program: HostProgram, evaluator: Arc<dyn GuestEvaluator>) -> Arc<Self> {
        Arc::new(Self {
            id: InterpId::new(),
            program,
            evaluator,
            modules: Mutex::new(FxHashMap::default()),
            pending_error: Mutex::new(None),
            call_stacks: Mutex::new(FxHashMap::default()),
        })
    }

    /// Interpreter identifier
    pub fn id(&self) -> InterpId {
        self.id
    }

    /// The host program context this interpreter belongs to
    pub fn program(&self) -> &HostProgram {
        &self.program
    }

    /// The guest compiler/evaluator
    pub fn evaluator(&self) -> &Arc<dyn GuestEvaluator> {
        &self.evaluator
    }

    // ========================================================================
    // Module namespace
    // ========================================================================

    /// Register a module under a name, replacing any previous entry
    pub fn register_module(&self, name: impl Into<String>, module: GuestRef) {
        self.modules.lock().insert(name.into(), module);
    }

    /// Look up a module by name
    pub fn lookup_module(&self, name: &str) -> Option<GuestRef> {
        self.modules.lock().get(name).cloned()
    }

    /// Number of registered modules
    pub fn module_count(&self) -> usize {
        self.modules.lock().len()
    }

    /// Resolve a dotted `module.attribute` path.
    ///
    /// Module names may themselves contain dots; the longest registered
    /// module prefix wins.
    pub fn resolve(&self, qualified: &str) -> Option<GuestRef> {
        let modules = self.modules.lock();
        for (idx, _) in qualified.rmatch_indices('.') {
            if let Some(module) = modules.get(&qualified[..idx]) {
                return module.get_attr(&qualified[idx + 1..]);
            }
        }
        None
    }

    // ========================================================================
    // Pending error state
    // ========================================================================

    /// Set the pending error, replacing any previous one
    pub fn set_error(&self, err: GuestError) {
        *self.pending_error.lock() = Some(err);
    }

    /// Fetch and clear the pending error
    pub fn take_error(&self) -> Option<GuestError> {
        self.pending_error.lock().take()
    }

    /// Restore a previously fetched error
    pub fn restore_error(&self, err: GuestError) {
        *self.pending_error.lock() = Some(err);
    }

    /// Clear the pending error
    pub fn clear_error(&self) {
        *self.pending_error.lock() = None;
    }

    /// Whether an error is pending
    pub fn has_error(&self) -> bool {
        self.pending_error.lock().is_some()
    }

    // ========================================================================
    // Per-thread guest call stack
    // ========================================================================

    /// Push a frame on the calling thread's guest call stack
    pub fn push_frame(&self, frame: GuestFrame) {
        self.call_stacks
            .lock()
            .entry(std::thread::current().id())
            .or_default()
            .push(frame);
    }

    /// Pop the innermost frame from the calling thread's guest call stack
    pub fn pop_frame(&self) -> Option<GuestFrame> {
        self.call_stacks
            .lock()
            .get_mut(&std::thread::current().id())
            .and_then(|stack| stack.pop())
    }

    /// Snapshot the calling thread's guest call stack, outermost first
    pub fn snapshot_stack(&self) -> Vec<GuestFrame> {
        self.call_stacks
            .lock()
            .get(&std::thread::current().id())
            .cloned()
            .unwrap_or_default()
    }

    /// Depth of the calling thread's guest call stack
    pub fn stack_depth(&self) -> usize {
        self.call_stacks
            .lock()
            .get(&std::thread::current().id())
            .map(|s| s.len())
            .unwrap_or(0)
    }
}

impl std::fmt::Debug for GuestInterpreter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "GuestInterpreter(#{} for {:?})",
            self.id.as_u64(),
            self.program.name()
        )
    }
}

/// RAII guard that pushes one frame on an interpreter's call stack and
/// pops it when dropped, including on error paths.
pub(crate) struct FrameGuard<'a> {
    interp: &'a GuestInterpreter,
}

impl<'a> FrameGuard<'a> {
    pub(crate) fn push(interp: &'a GuestInterpreter, frame: GuestFrame) -> Self {
        interp.push_frame(frame);
        Self { interp }
    }
}

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        self.interp.pop_frame();
    }
}
