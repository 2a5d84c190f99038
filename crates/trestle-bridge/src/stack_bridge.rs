//! Stack location bridge
//!
//! Produces host-compatible stack-frame descriptors from the guest
//! runtime's live call stack for unified diagnostics. The sequence is
//! pull-based and lazily initialized: the guest stack is snapshotted on
//! first access (not at construction, to keep the hot path free), then
//! advanced one frame per access without re-querying the guest runtime.
//! Accessing past the last frame yields a sentinel "no caller info" frame.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::ThreadId;

use once_cell::sync::OnceCell;

use crate::guest::error::GuestFrame;
use crate::interp::GuestInterpreter;

/// Whether a frame executes guest code or bridge-native code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    /// Guest bytecode
    Native,
    /// Bridge-native (foreign) code called from guest code
    Foreign,
}

/// One stack-frame descriptor in host-compatible form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackLocation {
    /// Call name (empty for the sentinel)
    pub name: String,
    /// Call kind
    pub kind: CallKind,
    /// Normalized absolute, OS-independent file path
    pub file: String,
    /// 1-based line number (0 when unknown)
    pub line: u32,
}

impl StackLocation {
    /// The sentinel returned past the end of the stack, or when queried
    /// from the wrong thread.
    pub fn no_caller_info() -> Self {
        Self {
            name: String::new(),
            kind: CallKind::Native,
            file: String::new(),
            line: 0,
        }
    }

    /// Whether this location carries caller information
    pub fn has_info(&self) -> bool {
        !self.name.is_empty() || !self.file.is_empty() || self.line != 0
    }
}

/// Lazily-initialized, per-thread sequence of guest stack locations.
///
/// Thread-affine: guest stack frames are not safely introspectable from
/// another thread without that thread's lock scope, so a walker queried
/// from a thread other than its creator reports "no info".
pub struct GuestStackWalker {
    interp: Arc<GuestInterpreter>,
    thread: ThreadId,
    frames: OnceCell<Vec<GuestFrame>>,
    cursor: AtomicUsize,
}

impl GuestStackWalker {
    /// Create a walker bound to the calling thread.
    ///
    /// No guest state is touched until the first access.
    pub fn new(interp: Arc<GuestInterpreter>) -> Self {
        Self {
            interp,
            thread: std::thread::current().id(),
            frames: OnceCell::new(),
            cursor: AtomicUsize::new(0),
        }
    }

    /// Yield the next location, innermost frame first.
    pub fn next_location(&self) -> StackLocation {
        if std::thread::current().id() != self.thread {
            return StackLocation::no_caller_info();
        }

        let frames = self.frames.get_or_init(|| {
            // Snapshot once; the stack is tied to the depth at first access.
            let mut snapshot = self.interp.snapshot_stack();
            snapshot.reverse();
            snapshot
        });

        let index = self.cursor.fetch_add(1, Ordering::Relaxed);
        match frames.get(index) {
            Some(frame) => StackLocation {
                name: frame.function.clone(),
                kind: if frame.native {
                    CallKind::Foreign
                } else {
                    CallKind::Native
                },
                file: normalize_path(&frame.file),
                line: frame.line,
            },
            None => StackLocation::no_caller_info(),
        }
    }

    /// Depth of the snapshot (forces initialization)
    pub fn depth(&self) -> usize {
        if std::thread::current().id() != self.thread {
            return 0;
        }
        self.frames
            .get_or_init(|| {
                let mut snapshot = self.interp.snapshot_stack();
                snapshot.reverse();
                snapshot
            })
            .len()
    }
}

/// Normalize a guest-reported path to an absolute, OS-independent form:
/// forward slashes, `.`/`..` segments collapsed lexically, rooted.
///
/// Synthetic paths in angle brackets (`<native>`, `<stdin>`) pass through
/// unchanged.
pub(crate) fn normalize_path(path: &str) -> String {
    if path.is_empty() || path.starts_with('<') {
        return path.to_string();
    }

    let unified = path.replace('\\', "/");
    let (prefix, rest) = split_root(&unified);

    let mut segments: Vec<&str> = Vec::new();
    for segment in rest.split('/') {
        match segment {
            "" | "." => {}
            // `..` above the root is dropped.
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    format!("{}/{}", prefix, segments.join("/"))
}

/// Split off a root prefix: a drive letter (`C:`) or nothing.
fn split_root(path: &str) -> (String, &str) {
    let bytes = path.as_bytes();
    if bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic() {
        (path[..2].to_string(), &path[2..])
    } else {
        (String::new(), path)
    }
}
