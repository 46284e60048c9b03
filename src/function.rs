//! The function compiler: allocates a function's columns, installs
//! framing, and drives the state translator over every instruction.
//!
//! `spec.md` §4.4. Grounded on `call::Call`/`interpreter::frame` in the
//! teacher crate for the idea of a function owning a fixed, pre-declared
//! register table that the rest of the compiler only ever reads by id.

use std::collections::HashSet;

use tracing::debug;

use crate::{
    branch_table::BranchTable,
    bus::Bus,
    error::{
        CompileResult,
        Diagnostic,
        DiagnosticCode,
        Site,
    },
    expr::ColumnRef,
    backend::{
        ColumnId,
        ColumnKind,
        Module,
        ModuleId,
        RowDomain,
    },
    lower::lower,
    macro_instr::MacroInstr,
    register::{
        FieldConfig,
        Register,
        RegisterId,
        RegisterKind,
    },
    translate::translate_instruction,
};

/// A function: its declared registers, buses, and macro-instruction
/// body, per `spec.md` §3.
#[derive(Debug, Clone)]
pub struct Function {
    name: &'static str,
    registers: Vec<Register>,
    buses: Vec<Bus>,
    body: Vec<MacroInstr>,
}

impl Function {
    /// Declare a new function. Registers must be supplied in dense id
    /// order (`registers[i].id() == RegisterId::new(i)`); this is
    /// checked by [`compile_function`], not here, since construction
    /// alone cannot yet observe a back end to report the error against.
    pub fn new(
        name: &'static str,
        registers: Vec<Register>,
        buses: Vec<Bus>,
        body: Vec<MacroInstr>,
    ) -> Self {
        Self {
            name,
            registers,
            buses,
            body,
        }
    }

    /// Declared name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Declared registers, in dense id order.
    pub fn registers(&self) -> &[Register] {
        &self.registers
    }

    /// Declared buses.
    pub fn buses(&self) -> &[Bus] {
        &self.buses
    }

    /// The macro-instruction body.
    pub fn body(&self) -> &[MacroInstr] {
        &self.body
    }

    /// A function is atomic when its body is a single instruction —
    /// `spec.md` §3 ("Framing": "atomic (one microcode instruction
    /// only)"). Atomic functions receive no `pc`/`ret` framing.
    pub fn is_atomic(&self) -> bool {
        self.body.len() <= 1
    }
}

/// The result of compiling one function: its column allocation, framing
/// columns, and bus view, per `spec.md` §3's `Function mapping`.
#[derive(Debug, Clone)]
pub struct FunctionMapping {
    name: &'static str,
    is_atomic: bool,
    registers: Vec<Register>,
    columns: Vec<ColumnId>,
    io_lines: HashSet<RegisterId>,
    pc_column: Option<ColumnId>,
    pc_width: u32,
    ret_column: Option<ColumnId>,
}

impl FunctionMapping {
    /// The function's name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether this function received no framing columns.
    pub fn is_atomic(&self) -> bool {
        self.is_atomic
    }

    /// The function's declared registers, in dense id order.
    pub fn registers(&self) -> &[Register] {
        &self.registers
    }

    /// The back-end column holding `reg`'s value.
    pub fn column_of(&self, reg: RegisterId) -> ColumnId {
        self.columns[reg.index()]
    }

    /// `reg`'s declared bit width.
    pub fn width_of(&self, reg: RegisterId) -> u32 {
        self.registers[reg.index()].width()
    }

    /// A [`ColumnRef`] for `reg` at the given row `shift`.
    pub fn column_ref(&self, reg: RegisterId, shift: i32) -> ColumnRef {
        ColumnRef {
            column: self.column_of(reg).index() as u32,
            shift,
        }
    }

    /// Whether `reg` is exempt from this module's own per-instruction
    /// constancy constraints — inputs (latched by the function-wide
    /// input-constancy framing constraint instead) and I/O lines
    /// (driven by lookups, not local constancy), per `spec.md` §4.3.
    pub fn is_forwarded_externally(&self, reg: RegisterId) -> bool {
        self.registers[reg.index()].is_input() || self.io_lines.contains(&reg)
    }

    /// Whether `reg` is an input register. Input reads are never
    /// previous-row, even when the write lattice reports no forwarding —
    /// `spec.md` §4.3: "all other reads of *non-input* registers refer
    /// to the previous-row value".
    pub fn is_input(&self, reg: RegisterId) -> bool {
        self.registers[reg.index()].is_input()
    }

    /// The framing program-counter column, if this function is
    /// multi-line.
    pub fn pc_column(&self) -> Option<ColumnId> {
        self.pc_column
    }

    /// The `pc` column's bit width (`0` for atomic functions).
    pub fn pc_width(&self) -> u32 {
        self.pc_width
    }

    /// The framing return-line column, if this function is multi-line.
    pub fn ret_column(&self) -> Option<ColumnId> {
        self.ret_column
    }

    /// This function's bus view: the columns of its input registers
    /// followed by its output registers, in declared order — `spec.md`
    /// §4.4 step 2.
    pub fn bus_view(&self) -> Vec<ColumnId> {
        let inputs = self
            .registers
            .iter()
            .filter(|r| matches!(r.kind(), RegisterKind::Input))
            .map(|r| self.column_of(r.id()));
        let outputs = self
            .registers
            .iter()
            .filter(|r| matches!(r.kind(), RegisterKind::Output))
            .map(|r| self.column_of(r.id()));
        inputs.chain(outputs).collect()
    }
}

/// Bit width of the `pc` column for a function with `instruction_count`
/// instructions: `⌈log₂(1 + N)⌉`, per `spec.md` §3.
fn pc_width(instruction_count: usize) -> u32 {
    let n = instruction_count as u64 + 1;
    (u64::BITS - (n - 1).leading_zeros()).max(1)
}

/// Compile one function: allocate its columns (`spec.md` §4.4 step 1),
/// record its bus view (step 2), install framing and translate its body
/// (step 3). Lookup installation for buses it calls (step 4) is the
/// program compiler's job, since it needs every callee's mapping
/// already built.
pub fn compile_function(
    module: &mut dyn Module,
    function: &Function,
    config: FieldConfig,
) -> CompileResult<FunctionMapping> {
    for (index, register) in function.registers().iter().enumerate() {
        if register.id().index() != index {
            return Err(Diagnostic::new(
                DiagnosticCode::WidthOverflow,
                Site::new(function.name(), 0),
                format!(
                    "register table for {} is not densely indexed at position {index}",
                    function.name()
                ),
            )
            .into());
        }
    }

    let mut columns = Vec::with_capacity(function.registers().len());
    for register in function.registers() {
        let column = module.create_column(
            ColumnKind::from(register.kind()),
            register.name(),
            register.width(),
            register.padding(),
        );
        module.add_range_constraint(register.name(), column, register.width());
        columns.push(column);
    }

    let is_atomic = function.is_atomic();
    let (pc_column, pc_width_bits, ret_column) = if is_atomic {
        (None, 0, None)
    } else {
        let width = pc_width(function.body().len());
        let pc = module.create_column(ColumnKind::ProgramCounter, "pc", width, 0);
        let ret = module.create_column(ColumnKind::Return, "ret", 1, 0);
        (Some(pc), width, Some(ret))
    };

    let io_lines: HashSet<RegisterId> = function
        .buses()
        .iter()
        .flat_map(|bus| {
            bus.address()
                .ids()
                .chain(bus.data().ids())
                .chain(bus.enable().into_iter().flat_map(|e| e.ids()))
        })
        .collect();

    let mapping = FunctionMapping {
        name: function.name(),
        is_atomic,
        registers: function.registers().to_vec(),
        columns,
        io_lines,
        pc_column,
        pc_width: pc_width_bits,
        ret_column,
    };

    if !is_atomic {
        install_framing(module, &mapping);
    }

    debug!(
        function = function.name(),
        instructions = function.body().len(),
        atomic = is_atomic,
        "compiling function"
    );
    for (pc, instr) in function.body().iter().enumerate() {
        let micro = lower(
            function.name(),
            pc as u32,
            instr,
            config,
            function.buses(),
            function.registers(),
        )?;
        let table = BranchTable::build(&micro);
        let expr = translate_instruction(module, &mapping, pc as u32, &micro, &table)?;
        let name = format!("{}@{pc}", function.name());
        module.add_vanishing_constraint(&name, RowDomain::All, expr);
    }

    Ok(mapping)
}

/// Install the four framing constraints for a multi-line function, per
/// `spec.md` §4.4.
fn install_framing(module: &mut dyn Module, mapping: &FunctionMapping) {
    let pc_col = mapping.pc_column().expect("multi-line function has pc column");
    let ret_col = mapping.ret_column().expect("multi-line function has ret column");

    let pc_now = |arena: &mut crate::expr::ExprArena| {
        arena.column(ColumnRef {
            column: pc_col.index() as u32,
            shift: 0,
        })
    };
    let pc_prev = |arena: &mut crate::expr::ExprArena| {
        arena.column(ColumnRef {
            column: pc_col.index() as u32,
            shift: -1,
        })
    };
    let ret_now = |arena: &mut crate::expr::ExprArena| {
        arena.column(ColumnRef {
            column: ret_col.index() as u32,
            shift: 0,
        })
    };

    // Padding: pc_now = 0 => ret_now = 0.
    {
        let arena = module.arena_mut();
        let zero = arena.constant(0);
        let pc_now_e = pc_now(arena);
        let guard = arena.eq(pc_now_e, zero);
        let ret_now_e = ret_now(arena);
        let zero2 = arena.constant(0);
        let consequent = arena.eq(ret_now_e, zero2);
        let expr = arena.implies(guard, consequent);
        module.add_vanishing_constraint("framing_padding", RowDomain::All, expr);
    }

    // Reset: pc_prev = 0 /\ pc_now != 0 => pc_now = 1.
    {
        let arena = module.arena_mut();
        let zero = arena.constant(0);
        let pc_prev_e = pc_prev(arena);
        let prev_zero = arena.eq(pc_prev_e, zero);
        let zero2 = arena.constant(0);
        let pc_now_e = pc_now(arena);
        let now_nonzero = arena.neq(pc_now_e, zero2);
        let guard = arena.and(vec![prev_zero, now_nonzero]);
        let one = arena.constant(1);
        let pc_now_e2 = pc_now(arena);
        let consequent = arena.eq(pc_now_e2, one);
        let expr = arena.implies(guard, consequent);
        module.add_vanishing_constraint("framing_reset", RowDomain::All, expr);
    }

    // First row: pc_now != 0 => pc_now = 1, restricted to row 0.
    {
        let arena = module.arena_mut();
        let zero = arena.constant(0);
        let pc_now_e = pc_now(arena);
        let guard = arena.neq(pc_now_e, zero);
        let one = arena.constant(1);
        let pc_now_e2 = pc_now(arena);
        let consequent = arena.eq(pc_now_e2, one);
        let expr = arena.implies(guard, consequent);
        module.add_vanishing_constraint("framing_first_row", RowDomain::FromStart(0), expr);
    }

    // Input constancy: pc_now != 0 /\ pc_now != 1 => r_prev = r_now, for
    // every input register.
    for register in mapping.registers() {
        if !register.is_input() {
            continue;
        }
        let arena = module.arena_mut();
        let zero = arena.constant(0);
        let pc_now_e = pc_now(arena);
        let nonzero = arena.neq(pc_now_e, zero);
        let one = arena.constant(1);
        let pc_now_e2 = pc_now(arena);
        let not_first = arena.neq(pc_now_e2, one);
        let guard = arena.and(vec![nonzero, not_first]);
        let now = arena.column(mapping.column_ref(register.id(), 0));
        let prev = arena.column(mapping.column_ref(register.id(), -1));
        let consequent = arena.eq(prev, now);
        let expr = arena.implies(guard, consequent);
        module.add_vanishing_constraint("framing_input_constancy", RowDomain::All, expr);
    }
}

/// This function's own module id, for use as a lookup target by its
/// callers.
pub fn module_id_of(function: &Function) -> ModuleId {
    ModuleId::new(function.name())
}
