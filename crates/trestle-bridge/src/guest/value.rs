//! GuestRef — reference-counted guest value handle
//!
//! Cloning a `GuestRef` takes exactly one new strong reference on the guest
//! heap cell; dropping releases exactly one. Identity is the cell address.
//! Interior mutation (lists, maps, instance attributes) is only performed
//! while the interpreter lock is held.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use trestle_sdk::HostObject;

use crate::guest::class::GuestClass;
use crate::guest::error::GuestError;
use crate::guest::eval::GuestCode;
use crate::interp::GuestInterpreter;
use crate::project::ProxyKind;

/// Guest timestamp payload.
///
/// `offset_secs` is `None` for a timezone-naive timestamp; aware timestamps
/// answer their offset through [`GuestTimestamp::utc_offset`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuestTimestamp {
    /// Microseconds since the Unix epoch (UTC)
    pub epoch_micros: i64,
    offset_secs: Option<i32>,
}

impl GuestTimestamp {
    /// Create a timezone-aware timestamp with a fixed UTC offset
    pub fn aware(epoch_micros: i64, offset_secs: i32) -> Self {
        Self {
            epoch_micros,
            offset_secs: Some(offset_secs),
        }
    }

    /// Create a timezone-naive timestamp
    pub fn naive(epoch_micros: i64) -> Self {
        Self {
            epoch_micros,
            offset_secs: None,
        }
    }

    /// Offset-query protocol: the UTC offset in seconds, if the timestamp
    /// is timezone-aware
    pub fn utc_offset(&self) -> Option<i32> {
        self.offset_secs
    }
}

/// Guest relative-duration payload (calendar-relative delta).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GuestDuration {
    /// Calendar years
    pub years: i32,
    /// Calendar months
    pub months: i32,
    /// Days
    pub days: i32,
    /// Seconds
    pub secs: i64,
    /// Microseconds
    pub micros: i64,
}

/// Guest instance state: class, attribute dictionary, and the optional
/// pinned host object a wrapper instance forwards to.
pub struct GuestInstance {
    class: Arc<GuestClass>,
    attrs: Mutex<HashMap<String, GuestRef>>,
    foreign: OnceCell<HostObject>,
}

impl GuestInstance {
    /// The instance's class
    pub fn class(&self) -> &Arc<GuestClass> {
        &self.class
    }

    /// The pinned host object, if this instance wraps one
    pub fn foreign(&self) -> Option<&HostObject> {
        self.foreign.get()
    }
}

/// Native implementation of a guest callable.
pub type NativeGuestFn = Arc<
    dyn Fn(&GuestInterpreter, Option<&GuestRef>, &[GuestRef]) -> Result<GuestRef, GuestError>
        + Send
        + Sync,
>;

enum CallableImp {
    Native(NativeGuestFn),
    Code(GuestCode),
}

/// A guest callable: either a native (bridge-provided) function or a
/// compiled guest code object.
pub struct GuestCallable {
    /// Callable name, used for stack frames and diagnostics
    pub name: String,
    imp: CallableImp,
}

impl GuestCallable {
    /// Whether this callable is implemented natively (not guest code)
    pub fn is_native(&self) -> bool {
        matches!(self.imp, CallableImp::Native(_))
    }

    /// The compiled code object, for code-backed callables
    pub fn code(&self) -> Option<&GuestCode> {
        match &self.imp {
            CallableImp::Code(code) => Some(code),
            CallableImp::Native(_) => None,
        }
    }

    pub(crate) fn invoke_native(
        &self,
        interp: &GuestInterpreter,
        recv: Option<&GuestRef>,
        args: &[GuestRef],
    ) -> Option<Result<GuestRef, GuestError>> {
        match &self.imp {
            CallableImp::Native(f) => Some(f(interp, recv, args)),
            CallableImp::Code(_) => None,
        }
    }
}

/// Guest module: a named attribute dictionary.
pub struct GuestModule {
    /// Module name
    pub name: String,
    dict: Mutex<HashMap<String, GuestRef>>,
}

/// Guest heap payload kinds.
pub enum GuestPayload {
    /// Absent / none
    None,
    /// Boolean
    Bool(bool),
    /// 64-bit signed integer
    Int(i64),
    /// IEEE-754 double
    Float(f64),
    /// UTF-8 string
    Str(String),
    /// Byte sequence (not necessarily UTF-8)
    Bytes(Vec<u8>),
    /// Ordered list
    List(Mutex<Vec<GuestRef>>),
    /// String-keyed map
    Map(Mutex<HashMap<String, GuestRef>>),
    /// Absolute timestamp
    Timestamp(GuestTimestamp),
    /// Relative duration
    Duration(GuestDuration),
    /// Class instance
    Instance(GuestInstance),
    /// Class object
    Class(Arc<GuestClass>),
    /// Callable
    Callable(GuestCallable),
    /// Module
    Module(GuestModule),
    /// Opaque capsule binding a host member descriptor to a proxy slot
    Capsule(ProxyKind),
}

struct GuestCell {
    payload: GuestPayload,
}

/// Reference-counted guest value handle.
#[derive(Clone)]
pub struct GuestRef {
    cell: Arc<GuestCell>,
}

impl GuestRef {
    fn alloc(payload: GuestPayload) -> Self {
        Self {
            cell: Arc::new(GuestCell { payload }),
        }
    }

    /// The none value
    pub fn none() -> Self {
        Self::alloc(GuestPayload::None)
    }

    /// A boolean value
    pub fn bool(b: bool) -> Self {
        Self::alloc(GuestPayload::Bool(b))
    }

    /// An integer value
    pub fn int(i: i64) -> Self {
        Self::alloc(GuestPayload::Int(i))
    }

    /// A float value
    pub fn float(f: f64) -> Self {
        Self::alloc(GuestPayload::Float(f))
    }

    /// A string value
    pub fn str(s: impl Into<String>) -> Self {
        Self::alloc(GuestPayload::Str(s.into()))
    }

    /// A byte-sequence value
    pub fn bytes(b: impl Into<Vec<u8>>) -> Self {
        Self::alloc(GuestPayload::Bytes(b.into()))
    }

    /// A list value
    pub fn list(items: Vec<GuestRef>) -> Self {
        Self::alloc(GuestPayload::List(Mutex::new(items)))
    }

    /// A map value
    pub fn map(entries: HashMap<String, GuestRef>) -> Self {
        Self::alloc(GuestPayload::Map(Mutex::new(entries)))
    }

    /// A timestamp value
    pub fn timestamp(ts: GuestTimestamp) -> Self {
        Self::alloc(GuestPayload::Timestamp(ts))
    }

    /// A duration value
    pub fn duration(d: GuestDuration) -> Self {
        Self::alloc(GuestPayload::Duration(d))
    }

    /// A class value
    pub fn class(class: Arc<GuestClass>) -> Self {
        Self::alloc(GuestPayload::Class(class))
    }

    /// A native callable
    pub fn native_callable(name: impl Into<String>, imp: NativeGuestFn) -> Self {
        Self::alloc(GuestPayload::Callable(GuestCallable {
            name: name.into(),
            imp: CallableImp::Native(imp),
        }))
    }

    /// A code-backed callable
    pub fn code_callable(name: impl Into<String>, code: GuestCode) -> Self {
        Self::alloc(GuestPayload::Callable(GuestCallable {
            name: name.into(),
            imp: CallableImp::Code(code),
        }))
    }

    /// A fresh empty module
    pub fn module(name: impl Into<String>) -> Self {
        Self::alloc(GuestPayload::Module(GuestModule {
            name: name.into(),
            dict: Mutex::new(HashMap::new()),
        }))
    }

    /// An opaque proxy capsule
    pub fn capsule(kind: ProxyKind) -> Self {
        Self::alloc(GuestPayload::Capsule(kind))
    }

    /// Allocate an instance of a class. Callers go through
    /// [`GuestClass::allocate_raw`] or the wrapper path instead of this.
    pub(crate) fn instance(class: Arc<GuestClass>, foreign: Option<HostObject>) -> Self {
        let cell = OnceCell::new();
        if let Some(obj) = foreign {
            let _ = cell.set(obj);
        }
        Self::alloc(GuestPayload::Instance(GuestInstance {
            class,
            attrs: Mutex::new(HashMap::new()),
            foreign: cell,
        }))
    }

    // ========================================================================
    // Identity and reference counting
    // ========================================================================

    /// Stable identity: heap address of the cell
    pub fn identity(&self) -> usize {
        Arc::as_ptr(&self.cell) as usize
    }

    /// Whether two handles refer to the same cell
    pub fn ptr_eq(&self, other: &GuestRef) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }

    /// Number of live strong references to the cell
    pub fn strong_count(&self) -> usize {
        Arc::strong_count(&self.cell)
    }

    /// Downgrade to a weak handle
    pub fn downgrade(&self) -> GuestWeak {
        GuestWeak {
            cell: Arc::downgrade(&self.cell),
        }
    }

    // ========================================================================
    // Payload access
    // ========================================================================

    /// Borrow the payload
    pub fn payload(&self) -> &GuestPayload {
        &self.cell.payload
    }

    /// Check if this is the none value
    pub fn is_none(&self) -> bool {
        matches!(self.cell.payload, GuestPayload::None)
    }

    /// Get as boolean if this is a bool
    pub fn as_bool(&self) -> Option<bool> {
        match &self.cell.payload {
            GuestPayload::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as i64 if this is an integer
    pub fn as_int(&self) -> Option<i64> {
        match &self.cell.payload {
            GuestPayload::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as f64 if this is a float
    pub fn as_float(&self) -> Option<f64> {
        match &self.cell.payload {
            GuestPayload::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Get as string slice if this is a string
    pub fn as_str(&self) -> Option<&str> {
        match &self.cell.payload {
            GuestPayload::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Get the instance state if this is an instance
    pub fn as_instance(&self) -> Option<&GuestInstance> {
        match &self.cell.payload {
            GuestPayload::Instance(inst) => Some(inst),
            _ => None,
        }
    }

    /// Get the class if this is a class value
    pub fn as_class(&self) -> Option<&Arc<GuestClass>> {
        match &self.cell.payload {
            GuestPayload::Class(c) => Some(c),
            _ => None,
        }
    }

    /// Get the callable if this is a callable value
    pub fn as_callable(&self) -> Option<&GuestCallable> {
        match &self.cell.payload {
            GuestPayload::Callable(c) => Some(c),
            _ => None,
        }
    }

    /// Get the capsule payload if this is a capsule
    pub fn as_capsule(&self) -> Option<&ProxyKind> {
        match &self.cell.payload {
            GuestPayload::Capsule(k) => Some(k),
            _ => None,
        }
    }

    // ========================================================================
    // Type introspection
    // ========================================================================

    /// Type name of the payload, or the class name for instances
    pub fn type_name(&self) -> String {
        match &self.cell.payload {
            GuestPayload::None => "none".to_string(),
            GuestPayload::Bool(_) => "bool".to_string(),
            GuestPayload::Int(_) => "int".to_string(),
            GuestPayload::Float(_) => "float".to_string(),
            GuestPayload::Str(_) => "str".to_string(),
            GuestPayload::Bytes(_) => "bytes".to_string(),
            GuestPayload::List(_) => "list".to_string(),
            GuestPayload::Map(_) => "map".to_string(),
            GuestPayload::Timestamp(_) => "timestamp".to_string(),
            GuestPayload::Duration(_) => "duration".to_string(),
            GuestPayload::Instance(inst) => inst.class.name.clone(),
            GuestPayload::Class(_) => "type".to_string(),
            GuestPayload::Callable(_) => "callable".to_string(),
            GuestPayload::Module(_) => "module".to_string(),
            GuestPayload::Capsule(_) => "capsule".to_string(),
        }
    }

    /// The class of an instance, or `None` for every other payload kind
    pub fn class_of(&self) -> Option<Arc<GuestClass>> {
        self.as_instance().map(|i| Arc::clone(&i.class))
    }

    /// Whether this value is an instance of `class` or of a subclass
    pub fn isinstance(&self, class: &Arc<GuestClass>) -> bool {
        match self.class_of() {
            Some(own) => own.is_subclass_of(class),
            None => false,
        }
    }

    // ========================================================================
    // Attribute protocol
    // ========================================================================

    /// Read an attribute.
    ///
    /// Instances consult their attribute dictionary first, then the class
    /// member tables in resolution order. Modules and classes consult their
    /// own dictionaries.
    pub fn get_attr(&self, name: &str) -> Option<GuestRef> {
        match &self.cell.payload {
            GuestPayload::Instance(inst) => {
                if let Some(v) = inst.attrs.lock().get(name) {
                    return Some(v.clone());
                }
                inst.class.lookup(name).map(|(m, _)| m.value)
            }
            GuestPayload::Class(class) => class.lookup(name).map(|(m, _)| m.value),
            GuestPayload::Module(module) => module.dict.lock().get(name).cloned(),
            _ => None,
        }
    }

    /// Write an attribute on an instance or module.
    pub fn set_attr(&self, name: impl Into<String>, value: GuestRef) -> Result<(), GuestError> {
        match &self.cell.payload {
            GuestPayload::Instance(inst) => {
                inst.attrs.lock().insert(name.into(), value);
                Ok(())
            }
            GuestPayload::Module(module) => {
                module.dict.lock().insert(name.into(), value);
                Ok(())
            }
            _ => Err(GuestError::new(
                "TypeError",
                format!("'{}' object does not support attribute assignment", self.type_name()),
            )),
        }
    }

    /// Module attribute names (sorted), for wholesale imports and diagnostics
    pub fn module_attrs(&self) -> Vec<String> {
        match &self.cell.payload {
            GuestPayload::Module(module) => {
                let mut names: Vec<String> = module.dict.lock().keys().cloned().collect();
                names.sort();
                names
            }
            _ => Vec::new(),
        }
    }

    // ========================================================================
    // Display
    // ========================================================================

    /// Human-readable representation for diagnostics.
    ///
    /// Byte sequences that are not valid UTF-8 render via their escaped
    /// repr form, the display fallback for non-UTF-8 guest strings.
    pub fn repr(&self) -> String {
        match &self.cell.payload {
            GuestPayload::None => "none".to_string(),
            GuestPayload::Bool(b) => b.to_string(),
            GuestPayload::Int(i) => i.to_string(),
            GuestPayload::Float(f) => f.to_string(),
            GuestPayload::Str(s) => format!("\"{}\"", s),
            GuestPayload::Bytes(b) => match std::str::from_utf8(b) {
                Ok(s) => format!("b\"{}\"", s),
                Err(_) => format!("b{:?}", b),
            },
            GuestPayload::List(items) => format!("[list({})]", items.lock().len()),
            GuestPayload::Map(entries) => format!("[map({})]", entries.lock().len()),
            GuestPayload::Timestamp(ts) => format!("[timestamp {}us]", ts.epoch_micros),
            GuestPayload::Duration(d) => format!(
                "[duration {}y{}m{}d {}s]",
                d.years, d.months, d.days, d.secs
            ),
            GuestPayload::Instance(inst) => {
                format!("[{} instance @{:#x}]", inst.class.name, self.identity())
            }
            GuestPayload::Class(c) => format!("[class {}]", c.name),
            GuestPayload::Callable(c) => format!("[callable {}]", c.name),
            GuestPayload::Module(m) => format!("[module {}]", m.name),
            GuestPayload::Capsule(_) => "[capsule]".to_string(),
        }
    }
}

impl fmt::Debug for GuestRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GuestRef({})", self.repr())
    }
}

/// Weak counterpart of [`GuestRef`], used by identity tables.
#[derive(Clone)]
pub struct GuestWeak {
    cell: Weak<GuestCell>,
}

impl GuestWeak {
    /// Upgrade back to a strong handle if the cell is still alive
    pub fn upgrade(&self) -> Option<GuestRef> {
        self.cell.upgrade().map(|cell| GuestRef { cell })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_payloads() {
        assert!(GuestRef::none().is_none());
        assert_eq!(GuestRef::bool(true).as_bool(), Some(true));
        assert_eq!(GuestRef::int(-7).as_int(), Some(-7));
        assert_eq!(GuestRef::float(2.5).as_float(), Some(2.5));
        assert_eq!(GuestRef::str("hi").as_str(), Some("hi"));
        assert_eq!(GuestRef::int(1).as_bool(), None);
    }

    #[test]
    fn test_identity_and_refcount() {
        let a = GuestRef::str("x");
        let count = a.strong_count();
        let b = a.clone();
        assert!(a.ptr_eq(&b));
        assert_eq!(a.strong_count(), count + 1);
        drop(b);
        assert_eq!(a.strong_count(), count);

        let c = GuestRef::str("x");
        assert!(!a.ptr_eq(&c));
        assert_ne!(a.identity(), c.identity());
    }

    #[test]
    fn test_weak_upgrade() {
        let v = GuestRef::int(1);
        let w = v.downgrade();
        assert!(w.upgrade().is_some());
        drop(v);
        assert!(w.upgrade().is_none());
    }

    #[test]
    fn test_timestamp_offset_query() {
        let aware = GuestTimestamp::aware(100, 3600);
        let naive = GuestTimestamp::naive(100);
        assert_eq!(aware.utc_offset(), Some(3600));
        assert_eq!(naive.utc_offset(), None);
    }

    #[test]
    fn test_module_attrs() {
        let m = GuestRef::module("tools");
        m.set_attr("b", GuestRef::int(2)).unwrap();
        m.set_attr("a", GuestRef::int(1)).unwrap();
        assert_eq!(m.module_attrs(), ["a", "b"]);
        assert_eq!(m.get_attr("a").unwrap().as_int(), Some(1));
        assert!(m.get_attr("c").is_none());
    }

    #[test]
    fn test_attr_assignment_rejected_on_scalars() {
        let v = GuestRef::int(1);
        let err = v.set_attr("x", GuestRef::none()).unwrap_err();
        assert_eq!(err.kind, "TypeError");
    }

    #[test]
    fn test_repr_non_utf8_bytes() {
        let bad = GuestRef::bytes(vec![0xff, 0xfe]);
        let repr = bad.repr();
        assert!(repr.starts_with('b'));

        let good = GuestRef::bytes(b"ok".to_vec());
        assert_eq!(good.repr(), "b\"ok\"");
    }
}
