//! Branch conditions: propositions in disjunctive normal form over
//! equality atoms, plus the single point (`to_expr`) where they are
//! converted into the arithmetic [`crate::expr::ExprArena`].
//!
//! `spec.md` §9 design note: "Branch conditions live in DNF over
//! equality atoms; arithmetic equations live in a distinct builder.
//! Mixing them is a source-level hazard ... A cleaner design keeps the
//! two node families in separate types and provides exactly one
//! conversion point." [`Cond`]/[`Atom`] are that separate logical type;
//! [`Cond::to_expr`] is that one conversion point.

use itertools::Itertools;
use num_traits::Signed;

use crate::{
    expr::{
        ColumnRef,
        ExprArena,
        ExprId,
    },
    macro_instr::RightOperand,
    register::{
        RegisterId,
        RegisterVector,
    },
};

/// One atom of a branch condition: `left = right` or `left != right`.
///
/// Atoms are ordered by `(first register id, length, negated)`, giving
/// every conjunction/disjunction a canonical member order — `spec.md`
/// §3: "Atoms are compared/ordered by a total order ... to allow
/// canonical forms." The "forwarding bit" the spec also orders by is a
/// translation-time property (whether the atom's registers read the
/// current or previous row), not a property `Atom` itself carries; the
/// translator folds that bit in before sorting (see `translate.rs`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Atom {
    left: RegisterVector,
    right: RightOperand,
    negated: bool,
}

impl Atom {
    /// `left = right`.
    pub fn eq(left: RegisterVector, right: RightOperand) -> Self {
        Self {
            left,
            right,
            negated: false,
        }
    }

    /// `left != right`.
    pub fn neq(left: RegisterVector, right: RightOperand) -> Self {
        Self {
            left,
            right,
            negated: true,
        }
    }

    /// The left-hand register vector.
    pub fn left(&self) -> &RegisterVector {
        &self.left
    }

    /// The right-hand operand.
    pub fn right(&self) -> &RightOperand {
        &self.right
    }

    /// Whether this atom is a negated (`!=`) comparison.
    pub fn is_negated(&self) -> bool {
        self.negated
    }

    /// Logical negation of this atom.
    pub fn negate(&self) -> Self {
        Self {
            left: self.left.clone(),
            right: self.right.clone(),
            negated: !self.negated,
        }
    }

    /// Canonical ordering key: `(first register id, length, negated)`.
    fn order_key(&self) -> (u32, u32, bool) {
        (self.left.first().index() as u32, self.left.len(), self.negated)
    }
}

impl PartialOrd for Atom {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Atom {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.order_key().cmp(&other.order_key())
    }
}

/// A branch condition: a disjunction of conjunctions of atoms (DNF), or
/// one of the two distinguished constants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cond {
    /// Always holds.
    True,
    /// Never holds — marks an unreachable path; `spec.md` §4.5: "`FALSE`
    /// is never translated ... must have been pruned."
    False,
    /// A disjunction of conjunctions of atoms. Each inner `Vec<Atom>` is
    /// sorted and deduplicated by [`Cond::conjunction`]/[`Cond::or`] so
    /// equal conditions compare equal structurally.
    Dnf(Vec<Vec<Atom>>),
}

impl Cond {
    /// Build a single conjunction clause from a set of atoms.
    pub fn conjunction(atoms: Vec<Atom>) -> Self {
        if atoms.is_empty() {
            return Cond::True;
        }
        let atoms: Vec<Atom> = atoms.into_iter().sorted().dedup().collect();
        Cond::Dnf(vec![atoms])
    }

    /// A single atom, as a condition.
    pub fn atom(atom: Atom) -> Self {
        Self::conjunction(vec![atom])
    }

    /// Disjunction (join) of two conditions, as used by the branch-table
    /// builder when multiple paths reach the same microcode offset.
    pub fn or(self, other: Cond) -> Cond {
        match (self, other) {
            (Cond::False, other) | (other, Cond::False) => other,
            (Cond::True, _) | (_, Cond::True) => Cond::True,
            (Cond::Dnf(a), Cond::Dnf(b)) => {
                let merged: Vec<Vec<Atom>> = a.into_iter().chain(b).sorted().dedup().collect();
                if merged.is_empty() {
                    Cond::False
                } else {
                    Cond::Dnf(merged)
                }
            }
        }
    }

    /// Append one atom to every clause of this condition (used when a
    /// `SkipIf` successor appends a new atom to the incoming path
    /// condition).
    pub fn and_atom(self, atom: Atom) -> Cond {
        match self {
            Cond::True => Self::atom(atom),
            Cond::False => Cond::False,
            Cond::Dnf(clauses) => {
                let extended = clauses
                    .into_iter()
                    .map(|mut clause| {
                        clause.push(atom.clone());
                        clause.into_iter().sorted().dedup().collect()
                    })
                    .collect();
                Cond::Dnf(extended)
            }
        }
    }

    /// Logical negation, per De Morgan: negate every clause's atoms
    /// disjunctively combined — callers needing the negation of a DNF
    /// condition get back a DNF condition too, since `spec.md` §4.3
    /// ("Constancy") requires negating a disjunction of entry
    /// conditions and feeding the result back into the same algebra.
    pub fn negate(&self) -> Cond {
        match self {
            Cond::True => Cond::False,
            Cond::False => Cond::True,
            Cond::Dnf(clauses) => {
                // NOT(OR_i AND_j atom_ij) = AND_i OR_j NOT(atom_ij)
                // Distribute back into DNF.
                let mut result = Cond::True;
                for clause in clauses {
                    let mut clause_negation = Cond::False;
                    for atom in clause {
                        clause_negation = clause_negation.or(Cond::atom(atom.negate()));
                    }
                    result = result.and(clause_negation);
                }
                result
            }
        }
    }

    /// Conjunction (meet) of two conditions, by distributing into DNF.
    pub fn and(self, other: Cond) -> Cond {
        match (&self, &other) {
            (Cond::False, _) | (_, Cond::False) => Cond::False,
            (Cond::True, _) => other,
            (_, Cond::True) => self,
            (Cond::Dnf(a), Cond::Dnf(b)) => {
                let mut clauses = Vec::with_capacity(a.len() * b.len());
                for ca in a {
                    for cb in b {
                        let merged: Vec<Atom> = ca.iter().chain(cb).cloned().sorted().dedup().collect();
                        clauses.push(merged);
                    }
                }
                let clauses: Vec<Vec<Atom>> = clauses.into_iter().sorted().dedup().collect();
                Cond::Dnf(clauses)
            }
        }
    }

    /// Whether this is the `True` constant.
    pub fn is_true(&self) -> bool {
        matches!(self, Cond::True)
    }

    /// Whether this is the `False` constant.
    pub fn is_false(&self) -> bool {
        matches!(self, Cond::False)
    }
}

/// Translate an atom to its algebraic form, per `spec.md` §4.5:
/// equality becomes a conjunction of per-limb equalities (zero-extending
/// the shorter side), inequality becomes a disjunction of per-limb
/// inequalities. `column_of` maps a register id (with a row shift
/// determined by the caller's forwarding decision) to a back-end column
/// reference. `width_of` reports a register's declared bit width, used
/// to validate that a constant operand actually fits the limb it is
/// compared against.
pub fn atom_to_expr(
    arena: &mut ExprArena,
    atom: &Atom,
    column_of: &mut dyn FnMut(RegisterId) -> ColumnRef,
    width_of: &mut dyn FnMut(RegisterId) -> u32,
) -> ExprId {
    let left_limbs: Vec<ExprId> = atom
        .left()
        .ids()
        .map(|id| arena.column(column_of(id)))
        .collect();
    let right_limbs: Vec<ExprId> = match atom.right() {
        RightOperand::Vector(v) => v.ids().map(|id| arena.column(column_of(id))).collect(),
        RightOperand::Const(value) => {
            // A constant right-hand side only ever fills the lowest
            // limb (every other limb zero-extends against it below);
            // it must fit that limb's declared width, per `spec.md`
            // §4.2's "validating that constants fit".
            let width = width_of(atom.left().first());
            if value.is_negative() || value.bits() > width as u64 {
                crate::error::Bug::unreachable(
                    crate::error::BugVariant::ConstantTooWide,
                    format!(
                        "constant {value} does not fit the {width}-bit limb it is compared against"
                    ),
                );
            }
            vec![arena.constant(value.clone())]
        }
    };
    let len = left_limbs.len().max(right_limbs.len());
    let zero = arena.constant(0);
    let limb_eqs: Vec<ExprId> = (0..len)
        .map(|i| {
            let l = left_limbs.get(i).copied().unwrap_or(zero);
            let r = right_limbs.get(i).copied().unwrap_or(zero);
            arena.eq(l, r)
        })
        .collect();
    if atom.is_negated() {
        let limb_neqs: Vec<ExprId> = limb_eqs.into_iter().map(|e| arena.not(e)).collect();
        arena.or(limb_neqs)
    } else {
        arena.and(limb_eqs)
    }
}

impl Cond {
    /// Translate this condition into the arithmetic arena, per
    /// `spec.md` §4.5. This is the sole point where the logical DNF
    /// world and the arithmetic `Expr` world meet.
    pub fn to_expr(
        &self,
        arena: &mut ExprArena,
        column_of: &mut dyn FnMut(RegisterId) -> ColumnRef,
        width_of: &mut dyn FnMut(RegisterId) -> u32,
    ) -> ExprId {
        match self {
            Cond::True => arena.truth(),
            Cond::False => {
                crate::error::Bug::unreachable(
                    crate::error::BugVariant::UnreachableBranch,
                    "attempted to translate an unreachable (FALSE) branch condition",
                )
            }
            Cond::Dnf(clauses) => {
                let clause_exprs: Vec<ExprId> = clauses
                    .iter()
                    .map(|clause| {
                        let atom_exprs: Vec<ExprId> = clause
                            .iter()
                            .map(|atom| atom_to_expr(arena, atom, column_of, width_of))
                            .collect();
                        arena.and(atom_exprs)
                    })
                    .collect();
                arena.or(clause_exprs)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(id: RegisterId) -> ColumnRef {
        ColumnRef {
            column: id.index() as u32,
            shift: 0,
        }
    }

    fn width(_id: RegisterId) -> u32 {
        8
    }

    #[test]
    fn true_translates_to_zero_equals_zero() {
        let mut arena = ExprArena::new();
        let expr = Cond::True.to_expr(&mut arena, &mut col, &mut width);
        let zero = arena.constant(0);
        let expected = arena.eq(zero, zero);
        assert_eq!(expr, expected);
    }

    #[test]
    fn negation_of_negation_is_identity_on_single_atom() {
        let atom = Atom::eq(
            RegisterVector::from_run(RegisterId::new(0), 1),
            RightOperand::Const(0.into()),
        );
        let cond = Cond::atom(atom);
        let double_negated = cond.negate().negate();
        assert_eq!(cond, double_negated);
    }

    #[test]
    fn or_deduplicates_identical_clauses() {
        let atom = Atom::eq(
            RegisterVector::from_run(RegisterId::new(1), 1),
            RightOperand::Const(0.into()),
        );
        let a = Cond::atom(atom.clone());
        let b = Cond::atom(atom);
        let joined = a.or(b);
        assert_eq!(joined, Cond::Dnf(vec![vec![Atom::eq(
            RegisterVector::from_run(RegisterId::new(1), 1),
            RightOperand::Const(0.into()),
        )]]));
    }
}
