//! The polynomial expression carried by a macro `Assign`.
//!
//! `spec.md` §3: "Expression (in macro `Assign`): polynomial over
//! registers with big-integer coefficients, expressible as a sum of
//! monomials `c · x₁ · … · xₖ`. Negative coefficients permitted (they
//! drive sign-bit rebalancing in the translator)." This is a distinct,
//! much simpler type from `expr::ExprArena`: a `Poly` exists only at the
//! macro-instruction level, before lowering; the translator consumes it
//! and produces `Expr` nodes in the back-end arena.

use itertools::Itertools;
use num_bigint::BigInt;

use crate::register::RegisterId;

/// One term of a polynomial: a coefficient times zero or more register
/// factors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Monomial {
    coefficient: BigInt,
    factors: Vec<RegisterId>,
}

impl Monomial {
    /// Build a monomial `coefficient * factors[0] * factors[1] * ...`.
    pub fn new(coefficient: impl Into<BigInt>, factors: Vec<RegisterId>) -> Self {
        Self {
            coefficient: coefficient.into(),
            factors,
        }
    }

    /// A constant monomial (no register factors).
    pub fn constant(coefficient: impl Into<BigInt>) -> Self {
        Self::new(coefficient, Vec::new())
    }

    /// The coefficient.
    pub fn coefficient(&self) -> &BigInt {
        &self.coefficient
    }

    /// The register factors.
    pub fn factors(&self) -> &[RegisterId] {
        &self.factors
    }

    /// Whether this monomial's coefficient is negative.
    pub fn is_negative(&self) -> bool {
        self.coefficient.sign() == num_bigint::Sign::Minus
    }
}

/// A polynomial: a sum of monomials.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Poly {
    terms: Vec<Monomial>,
}

impl Poly {
    /// The empty polynomial (value `0`).
    pub fn zero() -> Self {
        Self::default()
    }

    /// Build a polynomial from its monomials.
    pub fn from_terms(terms: Vec<Monomial>) -> Self {
        Self { terms }
    }

    /// A polynomial consisting of a single register read with
    /// coefficient `1`.
    pub fn register(id: RegisterId) -> Self {
        Self::from_terms(vec![Monomial::new(1, vec![id])])
    }

    /// A constant polynomial.
    pub fn constant(value: impl Into<BigInt>) -> Self {
        Self::from_terms(vec![Monomial::constant(value)])
    }

    /// The polynomial's monomials.
    pub fn terms(&self) -> &[Monomial] {
        &self.terms
    }

    /// Whether any monomial carries a negative coefficient — `spec.md`
    /// §4.1/§4.3: a signed polynomial requires a sign-bit target and
    /// drives the translator's rebalancing.
    pub fn is_signed(&self) -> bool {
        self.terms.iter().any(Monomial::is_negative)
    }

    /// All distinct registers read by this polynomial, in first-seen
    /// order.
    pub fn reads(&self) -> Vec<RegisterId> {
        self.terms
            .iter()
            .flat_map(|term| term.factors().iter().copied())
            .unique()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_coefficient_marks_poly_signed() {
        let p = Poly::from_terms(vec![
            Monomial::new(1, vec![RegisterId::new(0)]),
            Monomial::new(-1, vec![]),
        ]);
        assert!(p.is_signed());
    }

    #[test]
    fn positive_poly_is_unsigned() {
        let p = Poly::register(RegisterId::new(0));
        assert!(!p.is_signed());
    }

    #[test]
    fn reads_deduplicates_in_first_seen_order() {
        let a = RegisterId::new(0);
        let b = RegisterId::new(1);
        let p = Poly::from_terms(vec![
            Monomial::new(1, vec![a, b]),
            Monomial::new(2, vec![a]),
        ]);
        assert_eq!(p.reads(), vec![a, b]);
    }
}
