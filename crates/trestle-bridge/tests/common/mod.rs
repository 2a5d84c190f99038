//! Shared fixtures for the bridge integration tests: a scripted guest
//! evaluator and a small host class library.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use trestle_bridge::{
    Bridge, BridgeConfig, CompileError, GuestCode, GuestError, GuestEvaluator, GuestInterpreter,
    GuestRef, HostClassDef, HostError, HostFunctionDef, HostObject, HostProgram, HostRegistry,
    HostResult, HostValue, Visibility, GUEST_ABI_VERSION,
};

// ============================================================================
// Scripted evaluator
// ============================================================================

pub type ModuleBody =
    Arc<dyn Fn(&GuestInterpreter, &GuestRef) -> Result<GuestRef, GuestError> + Send + Sync>;

/// Test evaluator: module bodies are Rust closures registered per source
/// text. Anything not registered fails to compile.
pub struct ScriptedEvaluator {
    abi: u32,
    programs: Mutex<HashMap<String, ModuleBody>>,
}

impl ScriptedEvaluator {
    pub fn new() -> Self {
        Self {
            abi: GUEST_ABI_VERSION,
            programs: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_abi(abi: u32) -> Self {
        Self {
            abi,
            programs: Mutex::new(HashMap::new()),
        }
    }

    /// Register the behavior of a source text.
    pub fn define(
        &self,
        source: &str,
        body: impl Fn(&GuestInterpreter, &GuestRef) -> Result<GuestRef, GuestError>
            + Send
            + Sync
            + 'static,
    ) {
        self.programs
            .lock()
            .unwrap()
            .insert(source.to_string(), Arc::new(body));
    }
}

impl GuestEvaluator for ScriptedEvaluator {
    fn abi_version(&self) -> u32 {
        self.abi
    }

    fn compile(&self, source: &str, file: &str) -> Result<GuestCode, CompileError> {
        if !self.programs.lock().unwrap().contains_key(source) {
            return Err(CompileError::new("unexpected token", file, 1));
        }
        Ok(GuestCode::new("<module>", file, Arc::new(source.to_string())))
    }

    fn execute(
        &self,
        interp: &GuestInterpreter,
        code: &GuestCode,
        module: &GuestRef,
    ) -> Result<GuestRef, GuestError> {
        let source = code
            .payload_as::<String>()
            .ok_or_else(|| GuestError::new("RuntimeError", "foreign code object"))?;
        let body = self
            .programs
            .lock()
            .unwrap()
            .get(source)
            .cloned()
            .ok_or_else(|| GuestError::new("RuntimeError", "unknown code object"))?;
        body(interp, module)
    }

    fn call(
        &self,
        interp: &GuestInterpreter,
        code: &GuestCode,
        _recv: Option<&GuestRef>,
        _args: &[GuestRef],
    ) -> Result<GuestRef, GuestError> {
        let module = GuestRef::module("<call>");
        self.execute(interp, code, &module)
    }
}

// ============================================================================
// Host class library
// ============================================================================

fn require_recv(recv: Option<&HostObject>) -> HostResult<&HostObject> {
    recv.ok_or_else(|| HostError::new("TypeError", "method requires a receiver"))
}

pub fn number_arg(args: &[HostValue], index: usize) -> HostResult<f64> {
    match args.get(index) {
        Some(HostValue::Int(i)) => Ok(*i as f64),
        Some(HostValue::Float(f)) => Ok(*f),
        Some(other) => Err(HostError::new(
            "TypeError",
            format!("argument {} must be a number, got {}", index, other.kind_name()),
        )),
        None => Err(HostError::new(
            "TypeError",
            format!("missing argument {}", index),
        )),
    }
}

fn field_f64(obj: &HostObject, name: &str) -> HostResult<f64> {
    match obj.get_field(name) {
        Some(HostValue::Float(f)) => Ok(f),
        Some(HostValue::Int(i)) => Ok(i as f64),
        _ => Err(HostError::new(
            "StateError",
            format!("field '{}' is not set", name),
        )),
    }
}

/// `geo.Point` with `x`/`y` fields and a `distance()` method.
pub fn point_class() -> Arc<HostClassDef> {
    HostClassDef::builder("Point")
        .namespace("geo")
        .constructor(|recv, args| {
            let recv = require_recv(recv)?;
            recv.set_field("x", HostValue::Float(number_arg(args, 0)?));
            recv.set_field("y", HostValue::Float(number_arg(args, 1)?));
            Ok(HostValue::Null)
        })
        .method("distance", Visibility::Public, |recv, _args| {
            let recv = require_recv(recv)?;
            let x = field_f64(recv, "x")?;
            let y = field_f64(recv, "y")?;
            Ok(HostValue::Float((x * x + y * y).sqrt()))
        })
        .method("translate", Visibility::Public, |recv, args| {
            let recv = require_recv(recv)?;
            let dx = number_arg(args, 0)?;
            let dy = number_arg(args, 1)?;
            recv.set_field("x", HostValue::Float(field_f64(recv, "x")? + dx));
            recv.set_field("y", HostValue::Float(field_f64(recv, "y")? + dy));
            Ok(HostValue::Null)
        })
        .build()
}

/// `geo.Shape` base class: overridable members, one protected and one
/// private member, and a constant.
pub fn shape_class() -> Arc<HostClassDef> {
    HostClassDef::builder("Shape")
        .namespace("geo")
        .method("area", Visibility::Public, |_recv, _args| {
            Ok(HostValue::Float(0.0))
        })
        .method("label", Visibility::Public, |_recv, _args| {
            Ok(HostValue::Str("shape".to_string()))
        })
        .method("hint", Visibility::Protected, |_recv, _args| {
            Ok(HostValue::Str("base-hint".to_string()))
        })
        .method("secret", Visibility::Private, |_recv, _args| {
            Ok(HostValue::Str("hidden".to_string()))
        })
        .constant("KIND", HostValue::Str("shape".to_string()))
        .build()
}

/// `geo.Circle` extends `Shape`: shadows `area`/`label`, keeps the rest.
pub fn circle_class(shape: Arc<HostClassDef>) -> Arc<HostClassDef> {
    HostClassDef::builder("Circle")
        .namespace("geo")
        .parent(shape)
        .constructor(|recv, args| {
            let recv = require_recv(recv)?;
            recv.set_field("r", HostValue::Float(number_arg(args, 0)?));
            Ok(HostValue::Null)
        })
        .method("area", Visibility::Public, |recv, _args| {
            let recv = require_recv(recv)?;
            let r = field_f64(recv, "r")?;
            Ok(HostValue::Float(std::f64::consts::PI * r * r))
        })
        .method("label", Visibility::Public, |_recv, _args| {
            Ok(HostValue::Str("circle".to_string()))
        })
        .build()
}

/// `util.Util`: a same-named instance/static method pair for the
/// unbound-call fallback.
pub fn util_class() -> Arc<HostClassDef> {
    HostClassDef::builder("Util")
        .namespace("util")
        .method("describe", Visibility::Public, |recv, _args| {
            let recv = require_recv(recv)?;
            Ok(HostValue::Str(format!(
                "instance of {}",
                recv.class().name()
            )))
        })
        .static_method("describe", Visibility::Public, |_recv, args| {
            Ok(HostValue::Str(format!("static with {} args", args.len())))
        })
        .build()
}

/// `math.add` free function.
pub fn add_function() -> Arc<HostFunctionDef> {
    Arc::new(HostFunctionDef::new(
        "add",
        "math",
        Visibility::Public,
        Arc::new(|_recv, args| {
            let a = args
                .first()
                .and_then(|v| v.as_int())
                .ok_or_else(|| HostError::new("TypeError", "add expects integers"))?;
            let b = args
                .get(1)
                .and_then(|v| v.as_int())
                .ok_or_else(|| HostError::new("TypeError", "add expects integers"))?;
            Ok(HostValue::Int(a + b))
        }),
    ))
}

/// Registry with the full fixture library registered.
pub fn fixture_registry() -> Arc<HostRegistry> {
    let registry = Arc::new(HostRegistry::new());
    let shape = shape_class();
    registry.register_class(point_class());
    registry.register_class(Arc::clone(&shape));
    registry.register_class(circle_class(shape));
    registry.register_class(util_class());
    registry.register_function(add_function());
    registry
}

// ============================================================================
// Bridge setup
// ============================================================================

pub struct Fixture {
    pub bridge: Arc<Bridge>,
    pub program: HostProgram,
    pub interp: Arc<GuestInterpreter>,
    pub evaluator: Arc<ScriptedEvaluator>,
}

/// Honor `RUST_LOG` in test runs; safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn setup() -> Fixture {
    setup_with(fixture_registry())
}

pub fn setup_with(registry: Arc<HostRegistry>) -> Fixture {
    init_tracing();
    let evaluator = Arc::new(ScriptedEvaluator::new());
    let bridge = Bridge::new(
        Arc::clone(&evaluator) as Arc<dyn GuestEvaluator>,
        BridgeConfig::default(),
    )
    .expect("ABI versions match");
    let program = HostProgram::new("test-program", registry);
    let interp = bridge.interpreter_for(&program);
    Fixture {
        bridge,
        program,
        interp,
        evaluator,
    }
}
