//! Guest module loading and the bridge command surface
//!
//! Two virtual module categories hook into the guest import machinery:
//! `host.<namespace>` imports a host namespace wholesale (every public
//! class and free function, projected), and `derived.<namespace>` exposes
//! guest classes derived from the projected host classes, ready for guest
//! code to subclass and override.
//!
//! The command surface accepts one text command per call, of the form
//! `<command> <argument>`, split on the first space.

use std::sync::Arc;

use tracing::debug;

use crate::guest::value::GuestRef;
use crate::guest::GuestClass;
use crate::interp::GuestInterpreter;
use crate::{Bridge, BridgeError, BridgeResult, HostValue};

/// Virtual module prefix for wholesale host-namespace imports.
pub const HOST_MODULE_PREFIX: &str = "host.";
/// Virtual module prefix for derived-class modules.
pub const DERIVED_MODULE_PREFIX: &str = "derived.";

const VALID_COMMANDS: &str = "import";

impl Bridge {
    /// Compile and execute guest source as a module, returning the
    /// module-level result converted to a host value.
    pub fn run_source(
        &self,
        interp: &Arc<GuestInterpreter>,
        name: &str,
        source: &str,
    ) -> BridgeResult<HostValue> {
        let _scope = self.acquire(interp);

        let code = interp
            .evaluator()
            .compile(source, &format!("<{}>", name))?;

        let module = GuestRef::module(name);
        interp.register_module(name, module.clone());

        let result = interp
            .evaluator()
            .execute(interp, &code, &module)
            .map_err(|e| self.guest_failure(interp, e))?;

        debug!(module = name, "module executed");
        self.to_host(interp, &result)
    }

    /// Import a module by name, consulting the virtual module hooks when
    /// the name is not already registered.
    pub fn import_module(
        &self,
        interp: &Arc<GuestInterpreter>,
        name: &str,
    ) -> BridgeResult<GuestRef> {
        if let Some(module) = interp.lookup_module(name) {
            return Ok(module);
        }

        let _scope = self.acquire(interp);

        let module = if let Some(namespace) = name.strip_prefix(HOST_MODULE_PREFIX) {
            self.build_host_namespace_module(interp, name, namespace)?
        } else if let Some(namespace) = name.strip_prefix(DERIVED_MODULE_PREFIX) {
            self.build_derived_module(interp, name, namespace)?
        } else {
            return Err(BridgeError::Resolution(format!(
                "module '{}' is not registered and is not a virtual module",
                name
            )));
        };

        interp.register_module(name, module.clone());
        debug!(module = name, "virtual module imported");
        Ok(module)
    }

    /// Namespace imported wholesale: every public class and free function
    /// in the host namespace, projected.
    fn build_host_namespace_module(
        &self,
        interp: &Arc<GuestInterpreter>,
        name: &str,
        namespace: &str,
    ) -> BridgeResult<GuestRef> {
        let registry = Arc::clone(interp.program().registry());
        let classes = registry.classes_in(namespace);
        let functions = registry.functions_in(namespace);
        if classes.is_empty() && functions.is_empty() {
            return Err(BridgeError::Resolution(format!(
                "host namespace '{}' has no symbols",
                namespace
            )));
        }

        let module = GuestRef::module(name);
        for class in &classes {
            let projection = self.project_host_class(interp, class)?;
            self.set_module_attr(&module, class.name(), projection)?;
        }
        for func in &functions {
            if !func.visibility.is_exposed() {
                continue;
            }
            let proxy = self.free_function_proxy(func);
            self.set_module_attr(&module, &func.name, proxy)?;
        }
        Ok(module)
    }

    /// Classes derived from host classes: one guest subclass per public
    /// host class, open for guest code to extend.
    fn build_derived_module(
        &self,
        interp: &Arc<GuestInterpreter>,
        name: &str,
        namespace: &str,
    ) -> BridgeResult<GuestRef> {
        let registry = Arc::clone(interp.program().registry());
        let classes = registry.classes_in(namespace);
        if classes.is_empty() {
            return Err(BridgeError::Resolution(format!(
                "host namespace '{}' has no classes to derive from",
                namespace
            )));
        }

        let module = GuestRef::module(name);
        for class in &classes {
            let projection = self.project_host_class(interp, class)?;
            let base = projection
                .as_class()
                .ok_or_else(|| BridgeError::Resolution(class.qualified_name()))?;
            let derived = GuestClass::define(
                interp.id(),
                class.name(),
                vec![Arc::clone(base)],
                Vec::new(),
            );
            self.set_module_attr(&module, class.name(), GuestRef::class(derived))?;
        }
        Ok(module)
    }

    /// Execute one bridge command of the form `<command> <argument>`.
    pub fn run_command(
        &self,
        interp: &Arc<GuestInterpreter>,
        line: &str,
    ) -> BridgeResult<String> {
        let trimmed = line.trim();
        let (command, argument) = match trimmed.split_once(' ') {
            Some((command, argument)) => (command, argument.trim()),
            None => (trimmed, ""),
        };

        match command {
            "import" => self.import_host_symbol(interp, argument),
            other => Err(BridgeError::Configuration(format!(
                "unknown command '{}'; valid commands: {}",
                other, VALID_COMMANDS
            ))),
        }
    }

    /// Project one host symbol (class or free function) into the guest
    /// module for its namespace.
    fn import_host_symbol(
        &self,
        interp: &Arc<GuestInterpreter>,
        qualified: &str,
    ) -> BridgeResult<String> {
        if qualified.is_empty() {
            return Err(BridgeError::Resolution(
                "import requires a symbol argument".to_string(),
            ));
        }

        let _scope = self.acquire(interp);
        let registry = Arc::clone(interp.program().registry());

        if let Some(class) = registry.lookup_class(qualified) {
            let projection = self.project_host_class(interp, &class)?;
            let module = self.namespace_module(interp, class.namespace());
            self.set_module_attr(&module, class.name(), projection)?;
            return Ok(format!("imported {}", qualified));
        }

        if let Some(func) = registry.lookup_function(qualified) {
            let proxy = self.free_function_proxy(&func);
            let module = self.namespace_module(interp, &func.namespace);
            self.set_module_attr(&module, &func.name, proxy)?;
            return Ok(format!("imported {}", qualified));
        }

        Err(BridgeError::Resolution(qualified.to_string()))
    }

    /// The `host.<namespace>` module for single-symbol imports, created
    /// empty on first use.
    fn namespace_module(&self, interp: &Arc<GuestInterpreter>, namespace: &str) -> GuestRef {
        let name = if namespace.is_empty() {
            "host".to_string()
        } else {
            format!("{}{}", HOST_MODULE_PREFIX, namespace)
        };
        if let Some(module) = interp.lookup_module(&name) {
            return module;
        }
        let module = GuestRef::module(&name);
        interp.register_module(&name, module.clone());
        module
    }

    fn set_module_attr(
        &self,
        module: &GuestRef,
        name: &str,
        value: GuestRef,
    ) -> BridgeResult<()> {
        module
            .set_attr(name, value)
            .map_err(|e| BridgeError::Configuration(e.to_string()))
    }
}
