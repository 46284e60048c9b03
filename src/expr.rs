//! The algebraic expression builder consumed by the translator.
//!
//! `spec.md` §6 describes `Expr` as an external, consumed interface: a
//! pure-constructor builder for arithmetic/logical expressions. This
//! module provides that interface as an arena of indexed nodes —
//! `spec.md` §9's design note prefers integer references over heap
//! pointers for cheap structural sharing and hashing, so node children
//! are `ExprId`s into a single `ExprArena`, not `Box<Expr>`.
//!
//! No teacher file builds an expression arena (the teacher is an
//! interpreter, not a term-rewriting compiler); the newtype-index-over-
//! `usize` shape follows the idiom the teacher uses for `RegisterId`/
//! `BusId`-style wrappers elsewhere in this crate.

use std::collections::HashMap;

use num_bigint::BigInt;

/// Index of a node within an [`ExprArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExprId(u32);

impl ExprId {
    fn new(index: usize) -> Self {
        Self(index as u32)
    }

    fn index(self) -> usize {
        self.0 as usize
    }
}

/// A column reference with an integer row shift: `shift == 0` means the
/// current row, `shift == -1` the previous row, matching the "current
/// row" / "previous row" register-forwarding distinction of `spec.md`
/// §4.3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColumnRef {
    /// Back-end column id (opaque to this crate; see `backend.rs`).
    pub column: u32,
    /// Row shift relative to the row the constraint is evaluated at.
    pub shift: i32,
}

/// One arena node. Node children are [`ExprId`]s, not boxed expressions,
/// so the arena can hash-cons structurally identical subterms.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Node {
    Const(BigInt),
    Column(ColumnRef),
    Sum(Vec<ExprId>),
    Product(Vec<ExprId>),
    Eq(ExprId, ExprId),
    Neq(ExprId, ExprId),
    And(Vec<ExprId>),
    Or(Vec<ExprId>),
    Not(ExprId),
    IfThenElse(ExprId, ExprId, ExprId),
}

/// An arena of algebraic/logical expression nodes with structural
/// hash-consing: constructing the same node twice returns the same
/// [`ExprId`].
#[derive(Debug, Default)]
pub struct ExprArena {
    nodes: Vec<Node>,
    interned: HashMap<Node, ExprId>,
    true_id: Option<ExprId>,
    false_id: Option<ExprId>,
}

impl ExprArena {
    /// Create an empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    fn intern(&mut self, node: Node) -> ExprId {
        if let Some(&id) = self.interned.get(&node) {
            return id;
        }
        let id = ExprId::new(self.nodes.len());
        self.nodes.push(node.clone());
        self.interned.insert(node, id);
        id
    }

    /// Constant node from a big integer, per `spec.md` §3 ("Expression
    /// ... with big-integer coefficients").
    pub fn constant(&mut self, value: impl Into<BigInt>) -> ExprId {
        self.intern(Node::Const(value.into()))
    }

    /// `0 = 0`, the canonical translation of the logical constant
    /// `TRUE` (`spec.md` §4.5).
    pub fn truth(&mut self) -> ExprId {
        if let Some(id) = self.true_id {
            return id;
        }
        let zero = self.constant(0);
        let id = self.eq(zero, zero);
        self.true_id = Some(id);
        id
    }

    /// The unsatisfiable constraint, the translation of a reachable
    /// `Fail` (`spec.md` §4.3/§8 S6).
    pub fn falsehood(&mut self) -> ExprId {
        if let Some(id) = self.false_id {
            return id;
        }
        let zero = self.constant(0);
        let one = self.constant(1);
        let id = self.eq(zero, one);
        self.false_id = Some(id);
        id
    }

    /// A column variable with an integer row shift.
    pub fn column(&mut self, column_ref: ColumnRef) -> ExprId {
        self.intern(Node::Column(column_ref))
    }

    /// Sum of one or more terms.
    pub fn sum(&mut self, terms: Vec<ExprId>) -> ExprId {
        debug_assert!(!terms.is_empty(), "sum of zero terms has no identity here");
        if terms.len() == 1 {
            return terms[0];
        }
        self.intern(Node::Sum(terms))
    }

    /// Product of one or more factors.
    pub fn product(&mut self, factors: Vec<ExprId>) -> ExprId {
        debug_assert!(
            !factors.is_empty(),
            "product of zero factors has no identity here"
        );
        if factors.len() == 1 {
            return factors[0];
        }
        self.intern(Node::Product(factors))
    }

    /// `lhs = rhs`.
    pub fn eq(&mut self, lhs: ExprId, rhs: ExprId) -> ExprId {
        let (lhs, rhs) = if lhs <= rhs { (lhs, rhs) } else { (rhs, lhs) };
        self.intern(Node::Eq(lhs, rhs))
    }

    /// `lhs != rhs`.
    pub fn neq(&mut self, lhs: ExprId, rhs: ExprId) -> ExprId {
        let (lhs, rhs) = if lhs <= rhs { (lhs, rhs) } else { (rhs, lhs) };
        self.intern(Node::Neq(lhs, rhs))
    }

    /// Conjunction of zero or more clauses. An empty conjunction is
    /// `TRUE`.
    pub fn and(&mut self, mut clauses: Vec<ExprId>) -> ExprId {
        if clauses.is_empty() {
            return self.truth();
        }
        if clauses.len() == 1 {
            return clauses[0];
        }
        clauses.sort_unstable();
        clauses.dedup();
        if clauses.len() == 1 {
            return clauses[0];
        }
        self.intern(Node::And(clauses))
    }

    /// Disjunction of zero or more clauses. An empty disjunction is
    /// `FALSE`.
    pub fn or(&mut self, mut clauses: Vec<ExprId>) -> ExprId {
        if clauses.is_empty() {
            return self.falsehood();
        }
        if clauses.len() == 1 {
            return clauses[0];
        }
        clauses.sort_unstable();
        clauses.dedup();
        if clauses.len() == 1 {
            return clauses[0];
        }
        self.intern(Node::Or(clauses))
    }

    /// Logical negation.
    pub fn not(&mut self, inner: ExprId) -> ExprId {
        self.intern(Node::Not(inner))
    }

    /// `cond ⇒ consequent`, desugared to `NOT(cond) OR consequent` so
    /// the arena only needs to hash-cons `Or`/`Not`.
    pub fn implies(&mut self, cond: ExprId, consequent: ExprId) -> ExprId {
        let not_cond = self.not(cond);
        self.or(vec![not_cond, consequent])
    }

    /// `if cond { then_ } else { else_ }`, realized algebraically as
    /// `cond * then_ + (1 - cond) * else_` is left to callers that need
    /// numeric ite; this logical ite picks one of two *expressions*
    /// structurally, for building DNF-shaped conditions.
    pub fn if_then_else(&mut self, cond: ExprId, then_: ExprId, else_: ExprId) -> ExprId {
        self.intern(Node::IfThenElse(cond, then_, else_))
    }

    /// Number of distinct nodes currently interned. Exposed for tests
    /// asserting on hash-consing behavior.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the arena has no nodes yet.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structurally_identical_nodes_are_shared() {
        let mut arena = ExprArena::new();
        let a = arena.constant(5);
        let b = arena.constant(5);
        assert_eq!(a, b);
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn eq_is_order_independent() {
        let mut arena = ExprArena::new();
        let a = arena.constant(1);
        let b = arena.constant(2);
        let lhs_first = arena.eq(a, b);
        let rhs_first = arena.eq(b, a);
        assert_eq!(lhs_first, rhs_first);
    }

    #[test]
    fn truth_is_zero_equals_zero() {
        let mut arena = ExprArena::new();
        let truth = arena.truth();
        let zero = arena.constant(0);
        let expected = arena.eq(zero, zero);
        assert_eq!(truth, expected);
    }

    #[test]
    fn and_of_empty_is_truth() {
        let mut arena = ExprArena::new();
        let truth = arena.truth();
        let anded = arena.and(vec![]);
        assert_eq!(truth, anded);
    }

    #[test]
    fn or_of_empty_is_falsehood() {
        let mut arena = ExprArena::new();
        let falsehood = arena.falsehood();
        let ored = arena.or(vec![]);
        assert_eq!(falsehood, ored);
    }
}
