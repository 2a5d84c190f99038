//! Host error payload

use crate::value::HostValue;

/// Result type for host-side operations
pub type HostResult<T> = Result<T, HostError>;

/// Which runtime a stack frame originated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameLanguage {
    /// A frame executing host code
    Host,
    /// A frame executing guest code
    Guest,
}

/// One stack frame in a host error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostFrame {
    /// Source file path
    pub file: String,
    /// 1-based line number (0 when unknown)
    pub line: u32,
    /// Function or method name
    pub function: String,
    /// Originating runtime
    pub language: FrameLanguage,
}

impl HostFrame {
    /// Create a frame
    pub fn new(
        file: impl Into<String>,
        line: u32,
        function: impl Into<String>,
        language: FrameLanguage,
    ) -> Self {
        Self {
            file: file.into(),
            line,
            function: function.into(),
            language,
        }
    }
}

/// Error raised into (or by) the host runtime.
///
/// `kind` is the host exception type name (e.g. `"ValueError"`), `message`
/// the human-readable description. `argument` carries an optional structured
/// payload, `frames` the call stack ordered outermost-to-innermost with the
/// raising location first.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct HostError {
    /// Exception kind / type name
    pub kind: String,
    /// Human-readable description
    pub message: String,
    /// Optional structured argument value
    pub argument: Option<Box<HostValue>>,
    /// Call stack, raising location first
    pub frames: Vec<HostFrame>,
}

impl HostError {
    /// Create an error with a kind and message
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            argument: None,
            frames: Vec::new(),
        }
    }

    /// Attach a structured argument value
    pub fn with_argument(mut self, argument: HostValue) -> Self {
        self.argument = Some(Box::new(argument));
        self
    }

    /// Append a stack frame (outermost-to-innermost order)
    pub fn push_frame(&mut self, frame: HostFrame) {
        self.frames.push(frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_format() {
        let err = HostError::new("TypeError", "expected int");
        assert_eq!(err.to_string(), "TypeError: expected int");
    }

    #[test]
    fn test_frames_preserve_order() {
        let mut err = HostError::new("Error", "boom");
        err.push_frame(HostFrame::new("a.gs", 1, "outer", FrameLanguage::Guest));
        err.push_frame(HostFrame::new("b.gs", 2, "inner", FrameLanguage::Guest));
        assert_eq!(err.frames[0].function, "outer");
        assert_eq!(err.frames[1].function, "inner");
    }
}
