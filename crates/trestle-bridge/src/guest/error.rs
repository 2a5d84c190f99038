//! Guest pending-error state

use crate::guest::value::GuestRef;

/// One frame of a guest traceback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuestFrame {
    /// Source file path as the guest runtime reports it
    pub file: String,
    /// 1-based line number (0 when unknown)
    pub line: u32,
    /// Function or callable name
    pub function: String,
    /// Whether the frame executes bridge-native code rather than guest code
    pub native: bool,
}

impl GuestFrame {
    /// Create a guest-code frame
    pub fn new(file: impl Into<String>, line: u32, function: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line,
            function: function.into(),
            native: false,
        }
    }

    /// Create a bridge-native frame
    pub fn native(function: impl Into<String>) -> Self {
        Self {
            file: "<native>".to_string(),
            line: 0,
            function: function.into(),
            native: true,
        }
    }
}

/// A guest-runtime error: type name, message, optional structured value,
/// and a traceback ordered outermost-to-innermost.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct GuestError {
    /// Exception type name (e.g. `"ValueError"`)
    pub kind: String,
    /// Human-readable description
    pub message: String,
    /// Optional structured argument value
    pub value: Option<GuestRef>,
    /// Traceback, outermost frame first
    pub traceback: Vec<GuestFrame>,
}

impl GuestError {
    /// Create an error with a kind and message
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            value: None,
            traceback: Vec::new(),
        }
    }

    /// Attach a structured value
    pub fn with_value(mut self, value: GuestRef) -> Self {
        self.value = Some(value);
        self
    }

    /// Append a traceback frame (outermost-to-innermost order)
    pub fn push_frame(&mut self, frame: GuestFrame) {
        self.traceback.push(frame);
    }

    /// Normalize the error: an empty kind becomes `"RuntimeError"`.
    ///
    /// Capture must not assume a well-formed error object; this is the
    /// equivalent of fetch-and-normalize before reading type/value/traceback.
    pub fn normalized(mut self) -> Self {
        if self.kind.is_empty() {
            self.kind = "RuntimeError".to_string();
        }
        self
    }
}
