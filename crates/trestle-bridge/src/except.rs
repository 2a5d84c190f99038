//! Exception translator
//!
//! Converts a pending error in one runtime into an equivalent error in the
//! other, carrying kind, description, optional structured argument, and the
//! translated call stack. Capture normalizes the error state first, never
//! assumes a traceback is present, and always leaves the source runtime
//! error-free.

use std::fmt;

use crate::guest::error::{GuestError, GuestFrame};
use crate::interp::GuestInterpreter;
use crate::{Bridge, FrameLanguage, HostError, HostFrame, HostValue};

/// One translated stack frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeFrame {
    /// Source file path
    pub file: String,
    /// 1-based line number (0 when unknown)
    pub line: u32,
    /// Function or callable name
    pub function: String,
    /// Which runtime the frame executed in
    pub language: FrameLanguage,
}

/// Canonical cross-runtime error payload.
///
/// Frames are ordered outermost-to-innermost; the first frame is treated as
/// the raising location, subsequent frames as caller context.
#[derive(Debug, Clone)]
pub struct BridgeException {
    /// Exception kind / type name (e.g. `"ValueError"`)
    pub kind: String,
    /// Human-readable description
    pub message: String,
    /// Optional structured argument value
    pub argument: Option<HostValue>,
    /// Translated call stack
    pub frames: Vec<BridgeFrame>,
}

impl fmt::Display for BridgeException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl Bridge {
    /// Capture and clear the pending guest error, if any.
    ///
    /// The interpreter is left in a well-defined, error-free condition.
    pub fn capture_guest(&self, interp: &GuestInterpreter) -> Option<BridgeException> {
        let err = interp.take_error()?;
        Some(self.exception_from_guest_error(interp, err.normalized()))
    }

    /// Translate a guest error into the canonical payload.
    pub(crate) fn exception_from_guest_error(
        &self,
        interp: &GuestInterpreter,
        err: GuestError,
    ) -> BridgeException {
        let argument = err.value.as_ref().and_then(|v| self.to_host_scalar(v).ok());

        let mut frames: Vec<BridgeFrame> = err
            .traceback
            .iter()
            .map(|f| BridgeFrame {
                file: f.file.clone(),
                line: f.line,
                function: f.function.clone(),
                language: if f.native {
                    FrameLanguage::Host
                } else {
                    FrameLanguage::Guest
                },
            })
            .collect();

        if frames.is_empty() {
            // No traceback available: synthesize a single-frame location
            // from the live call stack.
            let synthesized = interp
                .snapshot_stack()
                .last()
                .map(|f| BridgeFrame {
                    file: f.file.clone(),
                    line: f.line,
                    function: f.function.clone(),
                    language: if f.native {
                        FrameLanguage::Host
                    } else {
                        FrameLanguage::Guest
                    },
                })
                .unwrap_or_else(|| BridgeFrame {
                    file: "<bridge>".to_string(),
                    line: 0,
                    function: "<unknown>".to_string(),
                    language: FrameLanguage::Guest,
                });
            frames.push(synthesized);
        }

        BridgeException {
            kind: err.kind,
            message: err.message,
            argument,
            frames,
        }
    }

    /// Re-raise a captured exception in the host runtime.
    pub fn raise_host(&self, exc: BridgeException) -> HostError {
        let mut err = HostError::new(exc.kind, exc.message);
        if let Some(argument) = exc.argument {
            err = err.with_argument(argument);
        }
        for frame in exc.frames {
            err.push_frame(HostFrame::new(
                frame.file,
                frame.line,
                frame.function,
                frame.language,
            ));
        }
        err
    }

    /// Translate a host error into the canonical payload.
    pub fn capture_host(&self, err: &HostError) -> BridgeException {
        let mut frames: Vec<BridgeFrame> = err
            .frames
            .iter()
            .map(|f| BridgeFrame {
                file: f.file.clone(),
                line: f.line,
                function: f.function.clone(),
                language: f.language,
            })
            .collect();

        if frames.is_empty() {
            frames.push(BridgeFrame {
                file: "<host>".to_string(),
                line: 0,
                function: err.kind.clone(),
                language: FrameLanguage::Host,
            });
        }

        BridgeException {
            kind: err.kind.clone(),
            message: err.message.clone(),
            argument: err.argument.as_deref().cloned(),
            frames,
        }
    }

    /// Re-raise a captured exception as the guest's pending error.
    pub fn raise_guest(&self, interp: &GuestInterpreter, exc: BridgeException) {
        interp.set_error(self.guest_error_from_exception(exc));
    }

    /// Translate a host error directly into a guest error.
    pub(crate) fn guest_error_from_host(&self, err: &HostError) -> GuestError {
        self.guest_error_from_exception(self.capture_host(err))
    }

    fn guest_error_from_exception(&self, exc: BridgeException) -> GuestError {
        let mut err = GuestError::new(exc.kind, exc.message);
        if let Some(argument) = &exc.argument {
            if let Ok(value) = self.to_guest_scalar(argument) {
                err = err.with_value(value);
            }
        }
        for frame in exc.frames {
            err.push_frame(GuestFrame {
                file: frame.file,
                line: frame.line,
                function: frame.function,
                native: frame.language == FrameLanguage::Host,
            });
        }
        err
    }
}
