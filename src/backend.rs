//! The back-end module interface: the append-only sink the function and
//! program compilers populate, per `spec.md` §3/§6.
//!
//! Grounded on the teacher's own boundary pattern of depending on a
//! narrow, externally-defined interface (`interpreter::storage::*`
//! traits) rather than a concrete implementation; the back-end that
//! actually builds a constraint system is, per `spec.md` §1, out of
//! scope here. [`RecordingModule`] is a reference implementation used
//! only by this crate's own tests.

use std::{
    any::Any,
    fmt,
};

use num_bigint::BigInt;

use crate::{
    expr::{
        ExprArena,
        ExprId,
    },
    register::RegisterKind,
};

/// Opaque column id returned by a [`Module`] implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ColumnId(u32);

impl ColumnId {
    /// Wrap a raw back-end column index.
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// The raw back-end column index.
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ColumnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "col{}", self.0)
    }
}

/// Role of a newly created column, passed through to the back end
/// opaquely — this crate draws no further distinctions between them
/// once a [`ColumnId`] comes back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Mirrors `RegisterKind::Input`.
    Input,
    /// Mirrors `RegisterKind::Output`.
    Output,
    /// Mirrors `RegisterKind::Internal`.
    Internal,
    /// Mirrors `RegisterKind::Computed`.
    Computed,
    /// The framing program-counter column of a multi-line function.
    ProgramCounter,
    /// The framing return-line column of a multi-line function.
    Return,
}

impl From<RegisterKind> for ColumnKind {
    fn from(kind: RegisterKind) -> Self {
        match kind {
            RegisterKind::Input => ColumnKind::Input,
            RegisterKind::Output => ColumnKind::Output,
            RegisterKind::Internal => ColumnKind::Internal,
            RegisterKind::Computed => ColumnKind::Computed,
        }
    }
}

/// The set of rows a vanishing constraint applies to, per `spec.md` §6:
/// "`None` applies to all rows; non-negative `k` applies to row `k` from
/// the start; `-1` applies to the last row, `-2` to the second-to-last,
/// etc."
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowDomain {
    /// Every row (the `None` case).
    All,
    /// Row `k`, counting from the start of the module.
    FromStart(u32),
    /// Row `k` counting backward from the end: `1` is the last row, `2`
    /// the second-to-last, and so on.
    FromEnd(u32),
}

/// Identifies a [`Module`] as a lookup target, by the name of the
/// function whose module it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleId(&'static str);

impl ModuleId {
    /// Build a module id from a function name.
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    /// The function name this id refers to.
    pub const fn name(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// The append-only back-end sink, per `spec.md` §6's "Consumed"
/// interface list.
pub trait Module {
    /// The expression arena constraints for this module are built in.
    fn arena_mut(&mut self) -> &mut ExprArena;

    /// Create a new column, returning its id.
    fn create_column(
        &mut self,
        kind: ColumnKind,
        name: &'static str,
        width: u32,
        padding: u64,
    ) -> ColumnId;

    /// Assert `expr` evaluates to true on every row of `domain`.
    fn add_vanishing_constraint(&mut self, name: &str, domain: RowDomain, expr: ExprId);

    /// Assert `column`'s value is less than `2^width` on every row.
    fn add_range_constraint(&mut self, name: &'static str, column: ColumnId, width: u32);

    /// Assert every row of `source` (within this module) appears among
    /// the rows of `target` (within `target_module`), optionally
    /// filtered to rows where `enable` holds.
    fn add_lookup_constraint(
        &mut self,
        name: &str,
        source: Vec<ColumnId>,
        target_module: ModuleId,
        target: Vec<ColumnId>,
        enable: Option<ColumnId>,
    );

    /// Record a precomputed (non-witnessed) column assignment, used for
    /// constants the back end can fill in directly rather than deriving
    /// via a constraint (e.g. a padding-row value).
    fn add_precomputed_assignment(&mut self, column: ColumnId, value: BigInt);

    /// Narrow back to the concrete implementation, for callers (and this
    /// crate's own tests) that need more than the append-only interface
    /// above — e.g. inspecting a [`RecordingModule`]'s recorded entries
    /// after driving it through `&mut dyn Module`.
    fn as_any(&self) -> &dyn Any;
}

/// A record of one call to a [`Module`] method, as captured by
/// [`RecordingModule`]. Exposed for assertions in this crate's own test
/// suite and in downstream integration tests.
#[cfg(any(test, feature = "test-helpers"))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    /// A `create_column` call.
    Column {
        /// The column's assigned id.
        id: ColumnId,
        /// The declared kind.
        kind: ColumnKind,
        /// The declared name.
        name: &'static str,
        /// The declared width.
        width: u32,
        /// The declared padding value.
        padding: u64,
    },
    /// An `add_vanishing_constraint` call.
    Vanishing {
        /// The constraint's name.
        name: String,
        /// The row domain it applies to.
        domain: RowDomain,
        /// The asserted expression.
        expr: ExprId,
    },
    /// An `add_range_constraint` call.
    Range {
        /// The constraint's name.
        name: &'static str,
        /// The bounded column.
        column: ColumnId,
        /// The bound's bit width.
        width: u32,
    },
    /// An `add_lookup_constraint` call.
    Lookup {
        /// The constraint's name.
        name: String,
        /// Source columns, in this module.
        source: Vec<ColumnId>,
        /// Target module.
        target_module: ModuleId,
        /// Target columns, in the target module.
        target: Vec<ColumnId>,
        /// Optional enable column, in this module.
        enable: Option<ColumnId>,
    },
    /// An `add_precomputed_assignment` call.
    Precomputed {
        /// The assigned column.
        column: ColumnId,
        /// The assigned value.
        value: BigInt,
    },
}

/// An in-memory [`Module`] that simply records every call it receives,
/// in order. Used by this crate's own tests in place of a real
/// constraint-system back end, which is out of scope here (`spec.md`
/// §1).
#[cfg(any(test, feature = "test-helpers"))]
#[derive(Debug, Default)]
pub struct RecordingModule {
    arena: ExprArena,
    entries: Vec<Entry>,
    next_column: u32,
}

#[cfg(any(test, feature = "test-helpers"))]
impl RecordingModule {
    /// Create an empty recording module.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call recorded so far, in order.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// The expression arena backing this module's recorded constraints.
    pub fn arena(&self) -> &ExprArena {
        &self.arena
    }

    /// All `Vanishing` entries recorded so far.
    pub fn vanishing_constraints(&self) -> impl Iterator<Item = (&str, RowDomain, ExprId)> + '_ {
        self.entries.iter().filter_map(|e| match e {
            Entry::Vanishing { name, domain, expr } => Some((name.as_str(), *domain, *expr)),
            _ => None,
        })
    }

    /// All `Lookup` entries recorded so far.
    pub fn lookup_constraints(&self) -> impl Iterator<Item = &Entry> + '_ {
        self.entries
            .iter()
            .filter(|e| matches!(e, Entry::Lookup { .. }))
    }
}

#[cfg(any(test, feature = "test-helpers"))]
impl Module for RecordingModule {
    fn arena_mut(&mut self) -> &mut ExprArena {
        &mut self.arena
    }

    fn create_column(
        &mut self,
        kind: ColumnKind,
        name: &'static str,
        width: u32,
        padding: u64,
    ) -> ColumnId {
        let id = ColumnId::new(self.next_column);
        self.next_column += 1;
        self.entries.push(Entry::Column {
            id,
            kind,
            name,
            width,
            padding,
        });
        id
    }

    fn add_vanishing_constraint(&mut self, name: &str, domain: RowDomain, expr: ExprId) {
        self.entries.push(Entry::Vanishing {
            name: name.to_string(),
            domain,
            expr,
        });
    }

    fn add_range_constraint(&mut self, name: &'static str, column: ColumnId, width: u32) {
        self.entries.push(Entry::Range {
            name,
            column,
            width,
        });
    }

    fn add_lookup_constraint(
        &mut self,
        name: &str,
        source: Vec<ColumnId>,
        target_module: ModuleId,
        target: Vec<ColumnId>,
        enable: Option<ColumnId>,
    ) {
        self.entries.push(Entry::Lookup {
            name: name.to_string(),
            source,
            target_module,
            target,
            enable,
        });
    }

    fn add_precomputed_assignment(&mut self, column: ColumnId, value: BigInt) {
        self.entries.push(Entry::Precomputed { column, value });
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_module_assigns_dense_column_ids() {
        let mut module = RecordingModule::new();
        let a = module.create_column(ColumnKind::Input, "a", 8, 0);
        let b = module.create_column(ColumnKind::Output, "b", 8, 0);
        assert_eq!(a, ColumnId::new(0));
        assert_eq!(b, ColumnId::new(1));
    }

    #[test]
    fn vanishing_constraints_are_recorded_in_order() {
        let mut module = RecordingModule::new();
        let expr = module.arena_mut().truth();
        module.add_vanishing_constraint("c0", RowDomain::All, expr);
        let recorded: Vec<_> = module.vanishing_constraints().collect();
        assert_eq!(recorded, vec![("c0", RowDomain::All, expr)]);
    }
}
