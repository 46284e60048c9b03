//! The micro instruction set: the atomic microcodes a macro instruction
//! lowers to, per `spec.md` §3/§4.1.

use crate::{
    bus::BusId,
    macro_instr::RightOperand,
    poly::Poly,
    register::{
        RegisterId,
        RegisterVector,
    },
};

/// One atomic microcode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Microcode {
    /// Write `targets` simultaneously with a shifted combination equal
    /// to `source` over the source registers.
    Assign {
        /// Registers written, least-significant first.
        targets: RegisterVector,
        /// The right-hand-side polynomial.
        source: Poly,
    },
    /// Skip the next `skip` microcodes unconditionally.
    Skip {
        /// Number of microcodes to skip.
        skip: u32,
    },
    /// If the sign-adjusted equality of `left` vs `right` holds, skip
    /// `skip` microcodes; otherwise fall through.
    SkipIf {
        /// Left-hand operand.
        left: RegisterVector,
        /// Right-hand operand.
        right: RightOperand,
        /// Whether the comparison is negated (`sign`): `true` skips on
        /// inequality rather than equality.
        negated: bool,
        /// Number of microcodes to skip when the comparison holds.
        skip: u32,
    },
    /// Set next-row program counter to `target`.
    Jmp {
        /// Target program counter.
        target: u32,
    },
    /// Terminate the frame.
    Ret,
    /// Produce the unsatisfiable constraint.
    Fail,
    /// Communicate with a bus; drives a lookup rather than a local
    /// arithmetic constraint.
    InOut {
        /// The bus communicated with.
        bus: BusId,
        /// Address-line registers in the caller's module.
        address: RegisterVector,
        /// Data-line registers in the caller's module.
        data: RegisterVector,
    },
    /// Compute-and-check division; the translator emits no equation
    /// here (the surrounding `Assign`s enforce the relation).
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

impl Microcode {
    /// Registers written by this microcode, used by the write-lattice
    /// builder (`branch_table.rs`).
    pub fn writes(&self) -> Vec<RegisterId> {
        match self {
            Microcode::Assign { targets, .. } => targets.ids().collect(),
            Microcode::Division {
                quotient, remainder, ..
            } => vec![*quotient, *remainder],
            Microcode::Skip { .. }
            | Microcode::SkipIf { .. }
            | Microcode::Jmp { .. }
            | Microcode::Ret
            | Microcode::Fail
            | Microcode::InOut { .. } => Vec::new(),
        }
    }

    /// A short, stable tag for diagnostics and logging.
    pub fn tag(&self) -> &'static str {
        match self {
            Microcode::Assign { .. } => "assign",
            Microcode::Skip { .. } => "skip",
            Microcode::SkipIf { .. } => "skip_if",
            Microcode::Jmp { .. } => "jmp",
            Microcode::Ret => "ret",
            Microcode::Fail => "fail",
            Microcode::InOut { .. } => "in_out",
            Microcode::Division { .. } => "division",
        }
    }

    /// Whether this microcode terminates straight-line control flow
    /// within the instruction (no structural successor at `offset + 1`
    /// beyond what the branch table computes explicitly).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Microcode::Jmp { .. } | Microcode::Ret | Microcode::Fail)
    }
}

/// An ordered list of microcodes for one macro instruction: the first is
/// the "body", subsequent microcodes encode control flow and side
/// channels.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MicroInstr {
    microcodes: Vec<Microcode>,
}

impl MicroInstr {
    /// Build a micro-instruction from its microcode sequence.
    pub fn new(microcodes: Vec<Microcode>) -> Self {
        Self { microcodes }
    }

    /// The microcode sequence.
    pub fn microcodes(&self) -> &[Microcode] {
        &self.microcodes
    }

    /// Number of microcodes.
    pub fn len(&self) -> usize {
        self.microcodes.len()
    }

    /// Whether there are no microcodes (never produced by `lower`, kept
    /// for API symmetry).
    pub fn is_empty(&self) -> bool {
        self.microcodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::register::RegisterId;

    #[test]
    fn jmp_ret_fail_are_terminal() {
        assert!(Microcode::Jmp { target: 0 }.is_terminal());
        assert!(Microcode::Ret.is_terminal());
        assert!(Microcode::Fail.is_terminal());
        assert!(!Microcode::Skip { skip: 1 }.is_terminal());
    }

    #[test]
    fn assign_writes_its_targets() {
        let m = Microcode::Assign {
            targets: RegisterVector::from_run(RegisterId::new(0), 1),
            source: Poly::zero(),
        };
        assert_eq!(m.writes(), vec![RegisterId::new(0)]);
    }
}
