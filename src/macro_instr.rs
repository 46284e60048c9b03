//! The macro instruction set: the high-level instructions a function
//! body is written in, before lowering to microcodes.
//!
//! Grounded on `interpreter::executors::opcodes_impl` in the teacher
//! crate and `fuel_asm::Opcode`: one tagged variant per instruction kind,
//! each carrying its own typed operands, matched exhaustively by every
//! downstream pass.

use num_bigint::BigInt;

use crate::{
    bus::BusId,
    poly::Poly,
    register::{
        RegisterId,
        RegisterVector,
    },
};

/// The comparison used by a conditional branch. `spec.md` §4.1: "comparisons
/// other than EQ/NEQ are rejected (they must be lowered earlier)".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    /// `lhs == rhs`.
    Eq,
    /// `lhs != rhs`.
    Neq,
}

/// The right-hand operand of a comparison, canonicalized at construction
/// time to avoid the "tag-sensitive" silent mis-tagging risk `spec.md`
/// §9 calls out for `Skip`/`SkipIf` operands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RightOperand {
    /// Compare against another register vector.
    Vector(RegisterVector),
    /// Compare against a constant.
    Const(BigInt),
}

/// Program counter: a dense index of a macro instruction within its
/// enclosing function.
pub type Pc = u32;

/// A macro instruction, per `spec.md` §3/§4.1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MacroInstr {
    /// `targets := poly`.
    Assign {
        /// Registers written, most-significant last.
        targets: RegisterVector,
        /// The right-hand-side polynomial.
        source: Poly,
    },
    /// `targets := bus(sources)`, a function call over a typed bus.
    Call {
        /// The bus this call communicates over.
        bus: BusId,
        /// Registers receiving the bus's data lines, in order.
        targets: Vec<RegisterId>,
        /// Expressions lifted into the bus's address lines, in order.
        sources: Vec<Poly>,
    },
    /// `targets := source` truncated/extended to `width` bits.
    Cast {
        /// Registers written.
        targets: RegisterVector,
        /// Target width in bits.
        width: u32,
        /// The value being cast.
        source: Poly,
    },
    /// `if lhs cmp rhs goto target`.
    IfGoto {
        /// The comparison.
        cmp: CmpOp,
        /// Left-hand operand, normalized to a register vector.
        lhs: RegisterVector,
        /// Right-hand operand.
        rhs: RightOperand,
        /// Target program counter if the comparison holds.
        target: Pc,
    },
    /// `targets := cmp(lhs, rhs) ? then_source : else_source`.
    IfThenElse {
        /// Registers written on either branch.
        targets: RegisterVector,
        /// The comparison.
        cmp: CmpOp,
        /// Left-hand operand.
        lhs: RegisterVector,
        /// Right-hand operand.
        rhs: RightOperand,
        /// Polynomial evaluated when the comparison holds.
        then_source: Poly,
        /// Polynomial evaluated otherwise.
        else_source: Poly,
    },
    /// Unconditional jump.
    Goto {
        /// Target program counter.
        target: Pc,
    },
    /// Terminate the frame successfully.
    Return,
    /// Terminate the frame with an unsatisfiable constraint — a runtime
    /// failure per `spec.md` §7.
    Fail,
    /// `quotient, remainder := dividend /% divisor`, with a witness
    /// register used by the surrounding `Assign`s that actually check
    /// the division (`spec.md` §9 open question).
    Division {
        /// Quotient register.
        quotient: RegisterId,
        /// Remainder register.
        remainder: RegisterId,
        /// Non-determinism witness register.
        witness: RegisterId,
        /// Dividend operand.
        dividend: Poly,
        /// Divisor operand.
        divisor: Poly,
    },
}

impl MacroInstr {
    /// Registers this instruction may write, syntactically derivable
    /// from the variant without consulting the branch table.
    pub fn writes(&self) -> Vec<RegisterId> {
        match self {
            MacroInstr::Assign { targets, .. } | MacroInstr::Cast { targets, .. } => {
                targets.ids().collect()
            }
            MacroInstr::Call { targets, .. } => targets.clone(),
            MacroInstr::IfThenElse { targets, .. } => targets.ids().collect(),
            MacroInstr::Division {
                quotient, remainder, ..
            } => vec![*quotient, *remainder],
            MacroInstr::IfGoto { .. }
            | MacroInstr::Goto { .. }
            | MacroInstr::Return
            | MacroInstr::Fail => Vec::new(),
        }
    }

    /// A short, stable tag for diagnostics and logging.
    pub fn tag(&self) -> &'static str {
        match self {
            MacroInstr::Assign { .. } => "assign",
            MacroInstr::Call { .. } => "call",
            MacroInstr::Cast { .. } => "cast",
            MacroInstr::IfGoto { .. } => "if_goto",
            MacroInstr::IfThenElse { .. } => "if_then_else",
            MacroInstr::Goto { .. } => "goto",
            MacroInstr::Return => "return",
            MacroInstr::Fail => "fail",
            MacroInstr::Division { .. } => "division",
        }
    }
}
