//! Optional third-runtime (JVM) entry lookup
//!
//! The JVM bridge is reached only through a stable C symbol resolved by
//! name against the running process image, never linked directly. A
//! missing symbol is a reportable configuration error, not a crash.

use std::ffi::c_void;

use crate::{BridgeError, BridgeResult};

/// Handle to a third-runtime entry point resolved from the process image.
pub struct JvmBridge {
    symbol: String,
    entry: *const c_void,
}

// The resolved address is immutable for the process lifetime.
unsafe impl Send for JvmBridge {}
unsafe impl Sync for JvmBridge {}

impl JvmBridge {
    /// Resolve the named entry symbol against the running process image.
    ///
    /// Returns a configuration error when the symbol is absent (the third
    /// runtime is simply not loaded).
    pub fn locate(symbol: &str) -> BridgeResult<Self> {
        let entry = lookup_process_symbol(symbol)?;
        Ok(Self {
            symbol: symbol.to_string(),
            entry,
        })
    }

    /// The symbol this handle was resolved from
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Raw entry address.
    ///
    /// # Safety
    ///
    /// Calling through the address requires the caller to know the entry's
    /// true C signature; the bridge treats it as opaque.
    pub fn entry_addr(&self) -> *const c_void {
        self.entry
    }
}

/// Resolve a symbol against the running process image.
pub fn lookup_process_symbol(symbol: &str) -> BridgeResult<*const c_void> {
    platform::lookup(symbol)
}

// ============================================================================
// Unix implementation
// ============================================================================

#[cfg(unix)]
mod platform {
    use std::ffi::{c_void, CStr, CString};

    use crate::{BridgeError, BridgeResult};

    pub(super) fn lookup(symbol: &str) -> BridgeResult<*const c_void> {
        let c_name = CString::new(symbol).map_err(|_| {
            BridgeError::Configuration(format!("symbol name contains NUL: {:?}", symbol))
        })?;

        unsafe {
            // Clear any previous error state before resolving.
            libc::dlerror();
            let addr = libc::dlsym(libc::RTLD_DEFAULT, c_name.as_ptr());

            let err = libc::dlerror();
            if !err.is_null() {
                let detail = CStr::from_ptr(err).to_string_lossy().into_owned();
                return Err(BridgeError::Configuration(format!(
                    "symbol '{}' not found in process image: {}",
                    symbol, detail
                )));
            }
            if addr.is_null() {
                return Err(BridgeError::Configuration(format!(
                    "symbol '{}' not found in process image",
                    symbol
                )));
            }
            Ok(addr as *const c_void)
        }
    }
}

// ============================================================================
// Windows implementation
// ============================================================================

#[cfg(windows)]
mod platform {
    use std::ffi::{c_void, CString};

    use crate::{BridgeError, BridgeResult};

    extern "system" {
        fn GetModuleHandleW(name: *const u16) -> *mut c_void;
        fn GetProcAddress(module: *mut c_void, name: *const i8) -> *mut c_void;
    }

    pub(super) fn lookup(symbol: &str) -> BridgeResult<*const c_void> {
        let c_name = CString::new(symbol).map_err(|_| {
            BridgeError::Configuration(format!("symbol name contains NUL: {:?}", symbol))
        })?;

        unsafe {
            let module = GetModuleHandleW(std::ptr::null());
            let addr = GetProcAddress(module, c_name.as_ptr());
            if addr.is_null() {
                return Err(BridgeError::Configuration(format!(
                    "symbol '{}' not found in process image",
                    symbol
                )));
            }
            Ok(addr as *const c_void)
        }
    }
}
