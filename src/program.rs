//! The program compiler: compiles every function of a program and wires
//! up the lookup constraints realizing their calls.
//!
//! `spec.md` §4.4 steps 1–3 (columns, bus view, framing, body) are
//! entirely local to one function and are delegated to
//! [`function::compile_function`]; this module is responsible only for
//! step 4 — installing one lookup per distinct bus, once every
//! function's bus view has been allocated. Grounded on the teacher's own
//! top-level `Interpreter`, which owns a fixed set of contexts and drives
//! per-context setup in a declared order before anything cross-context
//! is resolved.

use std::collections::{
    HashMap,
    HashSet,
};

use tracing::debug;

use crate::{
    backend::{
        Module,
        ModuleId,
    },
    error::{
        CompileResult,
        Diagnostic,
        DiagnosticCode,
        Site,
    },
    function::{
        compile_function,
        Function,
        FunctionMapping,
    },
    register::FieldConfig,
};

/// A program: a fixed set of functions, each compiled into its own
/// back-end module. `spec.md` §3: "the program exclusively owns
/// functions".
#[derive(Debug, Clone)]
pub struct Program {
    functions: Vec<Function>,
}

impl Program {
    /// Declare a new program from its functions.
    pub fn new(functions: Vec<Function>) -> Self {
        Self { functions }
    }

    /// The program's declared functions.
    pub fn functions(&self) -> &[Function] {
        &self.functions
    }

    /// Look up a function by name.
    pub fn find(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name() == name)
    }
}

/// Compile every function of `program`, wiring up lookups for their
/// calls.
///
/// `modules` must have one entry per function name in `program`,
/// pre-created by the caller — this crate has no opinion on how a back
/// end allocates a fresh module. Per `spec.md` §4.4's "Dependency
/// order" note, every function's columns and bus view are fully
/// allocated (via [`compile_function`]) before any lookup is installed,
/// so a callee compiled after its caller is still resolvable.
pub fn compile_program(
    program: &Program,
    modules: &mut HashMap<&'static str, Box<dyn Module>>,
    config: FieldConfig,
) -> CompileResult<HashMap<&'static str, FunctionMapping>> {
    let mut mappings = HashMap::with_capacity(program.functions().len());
    debug!(functions = program.functions().len(), "compiling program");

    for function in program.functions() {
        let module = modules.get_mut(function.name()).ok_or_else(|| {
            Diagnostic::new(
                DiagnosticCode::UnboundBus,
                Site::new(function.name(), 0),
                format!("no back-end module registered for function {}", function.name()),
            )
        })?;
        let mapping = compile_function(module.as_mut(), function, config)?;
        mappings.insert(function.name(), mapping);
    }

    for function in program.functions() {
        install_lookups(function, &mappings, modules)?;
    }

    Ok(mappings)
}

/// Install one lookup constraint per distinct bus referenced by
/// `function`'s body, per `spec.md` §4.4 step 4.
fn install_lookups(
    function: &Function,
    mappings: &HashMap<&'static str, FunctionMapping>,
    modules: &mut HashMap<&'static str, Box<dyn Module>>,
) -> CompileResult<()> {
    let caller_mapping = &mappings[function.name()];
    let mut seen = HashSet::new();

    for bus in function.buses() {
        if !seen.insert(bus.name()) {
            continue;
        }

        let callee_name = bus.linkage().callee().ok_or_else(|| {
            Diagnostic::new(
                DiagnosticCode::UnboundBus,
                Site::new(function.name(), 0),
                format!("bus {} on {} has no linked callee", bus.name(), function.name()),
            )
        })?;

        let callee_mapping = mappings.get(callee_name).ok_or_else(|| {
            Diagnostic::new(
                DiagnosticCode::UnboundBus,
                Site::new(function.name(), 0),
                format!("bus {} on {} names unknown callee {callee_name}", bus.name(), function.name()),
            )
        })?;

        let source: Vec<_> = bus
            .address()
            .ids()
            .chain(bus.data().ids())
            .map(|reg| caller_mapping.column_of(reg))
            .collect();
        let target = callee_mapping.bus_view();

        if source.len() != target.len() {
            return Err(Diagnostic::new(
                DiagnosticCode::BusArity,
                Site::new(function.name(), 0),
                format!(
                    "bus {} has {} address/data lines but callee {callee_name} has {} input/output registers",
                    bus.name(),
                    source.len(),
                    target.len()
                ),
            )
            .into());
        }

        // A bus-declared enable line is the caller's own say on when the
        // call is live; absent that, a multi-line callee is only fully
        // evaluated on its terminal row, so its own `ret` column gates
        // the lookup instead.
        let enable = bus
            .enable()
            .and_then(|vector| vector.ids().next())
            .map(|reg| caller_mapping.column_of(reg))
            .or(callee_mapping.ret_column());

        let module = modules
            .get_mut(function.name())
            .expect("module registered for every program function")
            .as_mut();
        let name = format!("{}:{}", function.name(), bus.name());
        module.add_lookup_constraint(&name, source, ModuleId::new(callee_name), target, enable);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backend::RecordingModule,
        bus::{
            Bus,
            BusId,
            Linkage,
        },
        macro_instr::MacroInstr,
        poly::{
            Monomial,
            Poly,
        },
        register::{
            Register,
            RegisterId,
            RegisterKind,
            RegisterVector,
        },
    };

    fn field() -> FieldConfig {
        FieldConfig::new(64, 32)
    }

    fn add_function() -> Function {
        let a = Register::new(RegisterId::new(0), "a", RegisterKind::Input, 8, 0);
        let b = Register::new(RegisterId::new(1), "b", RegisterKind::Input, 8, 0);
        let c = Register::new(RegisterId::new(2), "c", RegisterKind::Output, 16, 0);
        let body = vec![MacroInstr::Assign {
            targets: RegisterVector::from_run(RegisterId::new(2), 1),
            source: Poly::from_terms(vec![
                Monomial::new(1, vec![RegisterId::new(0)]),
                Monomial::new(1, vec![RegisterId::new(1)]),
            ]),
        }];
        Function::new("add", vec![a, b, c], Vec::new(), body)
    }

    fn caller_function() -> Function {
        let arg0 = Register::new(RegisterId::new(0), "arg0", RegisterKind::Input, 8, 0);
        let r0 = Register::new(RegisterId::new(1), "r0", RegisterKind::Output, 8, 0);
        let bus = Bus::new(
            BusId::new(0),
            "add_bus",
            RegisterVector::from_run(RegisterId::new(0), 1),
            RegisterVector::from_run(RegisterId::new(1), 1),
            None,
            Linkage::Linked { callee: "add" },
        );
        let body = vec![MacroInstr::Call {
            bus: BusId::new(0),
            targets: vec![RegisterId::new(1)],
            sources: vec![Poly::register(RegisterId::new(0))],
        }];
        Function::new("caller", vec![arg0, r0], vec![bus], body)
    }

    #[test]
    fn program_installs_one_lookup_per_distinct_bus() {
        let program = Program::new(vec![add_function(), caller_function()]);
        let mut modules: HashMap<&'static str, Box<dyn Module>> = HashMap::new();
        modules.insert("add", Box::new(RecordingModule::new()));
        modules.insert("caller", Box::new(RecordingModule::new()));

        let mappings = compile_program(&program, &mut modules, field()).unwrap();
        assert!(mappings.contains_key("add"));
        assert!(mappings.contains_key("caller"));

        let caller_module = modules
            .get("caller")
            .unwrap()
            .as_any()
            .downcast_ref::<RecordingModule>()
            .expect("caller module is a RecordingModule");
        let lookups: Vec<_> = caller_module.lookup_constraints().collect();
        assert_eq!(lookups.len(), 1);
    }

    #[test]
    fn unlinked_bus_is_rejected() {
        let arg0 = Register::new(RegisterId::new(0), "arg0", RegisterKind::Input, 8, 0);
        let r0 = Register::new(RegisterId::new(1), "r0", RegisterKind::Output, 8, 0);
        let bus = Bus::new(
            BusId::new(0),
            "add_bus",
            RegisterVector::from_run(RegisterId::new(0), 1),
            RegisterVector::from_run(RegisterId::new(1), 1),
            None,
            Linkage::Unlinked,
        );
        let body = vec![MacroInstr::Call {
            bus: BusId::new(0),
            targets: vec![RegisterId::new(1)],
            sources: vec![Poly::register(RegisterId::new(0))],
        }];
        let function = Function::new("caller", vec![arg0, r0], vec![bus], body);
        let program = Program::new(vec![function]);
        let mut modules: HashMap<&'static str, Box<dyn Module>> = HashMap::new();
        modules.insert("caller", Box::new(RecordingModule::new()));

        let err = compile_program(&program, &mut modules, field()).unwrap_err();
        match err {
            crate::error::CompileError::Diagnostic(d) => {
                assert_eq!(d.code, DiagnosticCode::UnboundBus);
            }
        }
    }
}
