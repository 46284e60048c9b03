//! The branch-table builder: a forward dataflow over the microcode
//! sequence of a single macro instruction, computing per-microcode entry
//! conditions and the per-register write lattice.
//!
//! `spec.md` §4.2. Grounded on the design note's preference for a dense,
//! bitset-shaped representation of the write lattice (`hundreds of bits,
//! dense-index friendly`) — mirroring how the teacher keeps per-register
//! data in flat, fixed-size arrays (`[Word; VM_REGISTER_COUNT]`) rather
//! than sparse maps.

use std::collections::HashSet;

use crate::{
    cond::{
        Atom,
        Cond,
    },
    macro_instr::RightOperand,
    micro::{
        Microcode,
        MicroInstr,
    },
    register::RegisterId,
};

/// Per-offset write-lattice entry: registers that are written on *every*
/// path continuing to termination (`must`), and registers possibly
/// written on *some* path (`may`). `spec.md` §3 invariant: `must ⊆ may`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct WriteSet {
    must: HashSet<RegisterId>,
    may: HashSet<RegisterId>,
}

impl WriteSet {
    fn join(&mut self, other: &WriteSet) {
        self.must.retain(|r| other.must.contains(r));
        self.may.extend(other.may.iter().copied());
    }

    fn add(&mut self, regs: &[RegisterId]) {
        for &r in regs {
            self.must.insert(r);
            self.may.insert(r);
        }
    }
}

/// The result of analyzing one macro instruction's microcode sequence:
/// an entry condition and write-lattice snapshot per offset.
#[derive(Debug, Clone)]
pub struct BranchTable {
    entry_cond: Vec<Cond>,
    writes: Vec<WriteSet>,
}

impl BranchTable {
    /// Build the branch table for a micro-instruction, per `spec.md`
    /// §4.2.
    ///
    /// Because control flow is acyclic within a single macro
    /// instruction's lowering, one sweep in microcode order suffices:
    /// `entry_cond[0] = TRUE`, and every successor transfer only ever
    /// points forward (`spec.md` §4.2: "one sweep in order suffices
    /// when microcodes are emitted in reverse postorder" — this
    /// lowerer already emits microcodes in program order, which is a
    /// reverse postorder for the straight-line/skip/skip-if shapes
    /// `lower.rs` produces).
    pub fn build(instr: &MicroInstr) -> Self {
        let len = instr.microcodes().len();
        let mut entry_cond = vec![Cond::False; len];
        let mut writes = vec![WriteSet::default(); len];
        if len == 0 {
            return Self { entry_cond, writes };
        }
        entry_cond[0] = Cond::True;
        let mut reached = vec![false; len];
        reached[0] = true;

        for i in 0..len {
            if !reached[i] {
                // Unreachable offset; nothing propagates from here.
                continue;
            }
            let microcode = &instr.microcodes()[i];
            let incoming = entry_cond[i].clone();
            let written_here = microcode.writes();
            let mut pending = writes[i].clone();
            pending.add(&written_here);

            for successor in successors(i, microcode) {
                let Successor { offset, extra_atom } = successor;
                if offset >= len {
                    continue;
                }
                let mut cond = incoming.clone();
                if let Some(atom) = extra_atom {
                    cond = cond.and_atom(atom);
                }
                if reached[offset] {
                    entry_cond[offset] = entry_cond[offset].clone().or(cond);
                    writes[offset].join(&pending);
                } else {
                    entry_cond[offset] = cond;
                    writes[offset] = pending.clone();
                    reached[offset] = true;
                }
            }
        }

        Self { entry_cond, writes }
    }

    /// The entry condition of the microcode at `offset`: a disjunction
    /// of conjunctions of register (in)equalities reached so far.
    pub fn entry_cond(&self, offset: usize) -> &Cond {
        &self.entry_cond[offset]
    }

    /// Whether a register is written on *every* path that reaches
    /// `offset` and continues to termination.
    pub fn must_write(&self, offset: usize, reg: RegisterId) -> bool {
        self.writes[offset].must.contains(&reg)
    }

    /// Whether a register is possibly written on *some* path that
    /// reaches `offset`.
    pub fn may_write(&self, offset: usize, reg: RegisterId) -> bool {
        self.writes[offset].may.contains(&reg)
    }

    /// Number of offsets this table covers.
    pub fn len(&self) -> usize {
        self.entry_cond.len()
    }

    /// Whether this table covers no offsets.
    pub fn is_empty(&self) -> bool {
        self.entry_cond.is_empty()
    }
}

/// A transfer-function successor: the offset control flow moves to, and
/// an optional extra atom to conjoin onto the propagated condition (for
/// `SkipIf`'s taken/fall-through legs).
struct Successor {
    offset: usize,
    extra_atom: Option<Atom>,
}

fn successors(i: usize, microcode: &Microcode) -> Vec<Successor> {
    match microcode {
        Microcode::Skip { skip } => vec![Successor {
            offset: i + 1 + *skip as usize,
            extra_atom: None,
        }],
        Microcode::SkipIf {
            left,
            right,
            negated,
            skip,
        } => {
            let taken_atom = if *negated {
                Atom::neq(left.clone(), right.clone())
            } else {
                Atom::eq(left.clone(), right.clone())
            };
            let fall_through_atom = taken_atom.negate();
            vec![
                Successor {
                    offset: i + 1 + *skip as usize,
                    extra_atom: Some(taken_atom),
                },
                Successor {
                    offset: i + 1,
                    extra_atom: Some(fall_through_atom),
                },
            ]
        }
        Microcode::Jmp { .. } | Microcode::Ret | Microcode::Fail => Vec::new(),
        Microcode::Assign { .. } | Microcode::InOut { .. } | Microcode::Division { .. } => {
            vec![Successor {
                offset: i + 1,
                extra_atom: None,
            }]
        }
    }
}
