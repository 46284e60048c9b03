//! Error types produced while lowering and translating a program.
//!
//! Following `spec.md` §7, errors come in three unrelated kinds:
//!
//! - [`Diagnostic`]: a structural error discovered during validation or
//!   lowering. Recoverable in the sense that the compiler reports it and
//!   stops cleanly; never a panic.
//! - [`Bug`]: an invariant violation that can only occur if an upstream
//!   pass (or this one) has a defect. These are documented as
//!   "never happens on well-typed input" and are not meant to be handled
//!   by callers — constructing one is itself the abort.
//! - Runtime failures (`Fail`, division by zero, range-check failures)
//!   are not an error type at all; the translator renders them as the
//!   algebraic constant `FALSE` (see `translate.rs`).

use std::fmt;

/// A single point in the source program that a diagnostic refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Site {
    /// Name of the enclosing function.
    pub function: &'static str,
    /// Program counter of the offending macro instruction.
    pub pc: u32,
}

impl Site {
    /// Build a new site reference.
    pub const fn new(function: &'static str, pc: u32) -> Self {
        Self { function, pc }
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.function, self.pc)
    }
}

/// A machine-checkable structural error code, per `SPEC_FULL.md` §4.6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::IntoStaticStr)]
pub enum DiagnosticCode {
    /// Sum of target widths is smaller than the width required by the
    /// right-hand side.
    WidthOverflow,
    /// A polynomial's value cannot fit in the configured field.
    FieldOverflow,
    /// A signed assignment's most-significant target does not have
    /// width 1.
    MissingSignBit,
    /// A signed assignment's subtraction pivot is not aligned to a limb
    /// boundary.
    MisalignedPivot,
    /// A call's argument/result count does not match the bus's arity.
    BusArity,
    /// A call's argument/result widths do not match the bus's line
    /// widths.
    BusWidth,
    /// A bus referenced by a call has no linked callee.
    UnboundBus,
    /// A branch comparison is always taken (trivially true condition
    /// used with a non-`EQ` operator).
    AlwaysTaken,
    /// A branch comparison can never be taken.
    NeverTaken,
    /// An `Assign` names the same target register more than once.
    DuplicateTarget,
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s: &'static str = self.into();
        f.write_str(s)
    }
}

/// A structural error discovered during validation, lowering, or
/// translation.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
#[display(fmt = "{code} at {site}: {message}")]
pub struct Diagnostic {
    /// The machine-checkable error kind.
    pub code: DiagnosticCode,
    /// The instruction site this diagnostic refers to.
    pub site: Site,
    /// A human-readable explanation.
    pub message: String,
}

impl Diagnostic {
    /// Build a new diagnostic.
    pub fn new(code: DiagnosticCode, site: Site, message: impl Into<String>) -> Self {
        Self {
            code,
            site,
            message: message.into(),
        }
    }

    /// Convenience constructor that formats the message.
    pub fn at(code: DiagnosticCode, site: Site, args: fmt::Arguments<'_>) -> Self {
        Self::new(code, site, fmt::format(args))
    }
}

/// An invariant violation: a bug in an upstream pass (or this one), never
/// expected on a well-typed input.
///
/// Constructing a [`Bug`] does not itself panic; callers that reach an
/// invariant they can't recover from should prefer `Bug::unreachable`,
/// which does.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
#[display(fmt = "internal error ({variant}): {message}")]
pub struct Bug {
    /// Which invariant was violated.
    pub variant: BugVariant,
    /// Extra detail for the implementer reading a panic message.
    pub message: String,
}

/// Closed set of invariant-violation kinds this crate can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::IntoStaticStr)]
pub enum BugVariant {
    /// A register vector's ids are not a consecutive run.
    NonConsecutiveRegisterVector,
    /// A constant does not fit the declared limb widths that were
    /// supposedly already validated.
    ConstantTooWide,
    /// The translator reached a branch-table path marked `FALSE`.
    UnreachableBranch,
    /// A microcode or macro-instruction variant unknown to this version
    /// of the lowerer/translator was encountered.
    UnknownVariant,
}

impl fmt::Display for BugVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s: &'static str = self.into();
        f.write_str(s)
    }
}

impl Bug {
    /// Build a new bug description without panicking.
    pub fn new(variant: BugVariant, message: impl Into<String>) -> Self {
        Self {
            variant,
            message: message.into(),
        }
    }

    /// Build and immediately panic. Used at call sites that have no
    /// sensible recovery — the panic message carries the [`BugVariant`]
    /// so it is greppable in a crash report.
    #[track_caller]
    pub fn unreachable(variant: BugVariant, message: impl Into<String>) -> ! {
        panic!("{}", Self::new(variant, message))
    }
}

/// Top-level error type returned by the function/program compiler.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum CompileError {
    /// A structural error was found while compiling a function.
    Diagnostic(Diagnostic),
}

impl From<Diagnostic> for CompileError {
    fn from(value: Diagnostic) -> Self {
        Self::Diagnostic(value)
    }
}

/// Result alias used throughout lowering/translation.
pub type CompileResult<T> = Result<T, CompileError>;
