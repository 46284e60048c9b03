//! The bus model: a named contract of address-line and data-line
//! register layouts through which one function invokes another.
//!
//! Grounded on `call::Call`/`CallFrame` in the teacher crate: a small,
//! `Copy` description of a call site (callee id plus argument words) that
//! other code resolves against the callee's own definition.

use std::fmt;

use crate::register::RegisterVector;

/// Dense id of a bus within its owning function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BusId(u32);

impl BusId {
    /// Wrap a raw dense index.
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// The raw dense index.
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BusId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bus{}", self.0)
    }
}

/// Which function a bus communicates with, if resolved.
///
/// `spec.md` §3 invariant: a bus either names exactly one callee function
/// or is "unlinked" (a placeholder resolved before lowering).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Linkage {
    /// Not yet resolved to a callee. Buses in this state must be
    /// resolved before `lower` runs; `lower` rejects an unlinked bus
    /// with `DiagnosticCode::UnboundBus`.
    Unlinked,
    /// Resolved to a named callee function.
    Linked {
        /// Name of the callee function.
        callee: &'static str,
    },
}

impl Linkage {
    /// Whether this bus has been resolved to a callee.
    pub const fn is_linked(&self) -> bool {
        matches!(self, Linkage::Linked { .. })
    }

    /// The callee name, if linked.
    pub const fn callee(&self) -> Option<&'static str> {
        match self {
            Linkage::Linked { callee } => Some(callee),
            Linkage::Unlinked => None,
        }
    }
}

/// A bus: address lines, data lines, and an optional enable line, all
/// named as register vectors within the *caller's* module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bus {
    id: BusId,
    name: &'static str,
    address: RegisterVector,
    data: RegisterVector,
    enable: Option<RegisterVector>,
    linkage: Linkage,
}

impl Bus {
    /// Declare a new bus.
    pub const fn new(
        id: BusId,
        name: &'static str,
        address: RegisterVector,
        data: RegisterVector,
        enable: Option<RegisterVector>,
        linkage: Linkage,
    ) -> Self {
        Self {
            id,
            name,
            address,
            data,
            enable,
            linkage,
        }
    }

    /// Dense id of this bus within its function.
    pub const fn id(&self) -> BusId {
        self.id
    }

    /// Declared name, used to dedupe lookup installation in the function
    /// compiler (`spec.md` §4.4 step 4: "for each distinct bus").
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Address-line registers, in the caller's module.
    pub const fn address(&self) -> &RegisterVector {
        &self.address
    }

    /// Data-line registers, in the caller's module.
    pub const fn data(&self) -> &RegisterVector {
        &self.data
    }

    /// Optional enable-line register.
    pub const fn enable(&self) -> Option<&RegisterVector> {
        self.enable.as_ref()
    }

    /// Callee linkage.
    pub const fn linkage(&self) -> &Linkage {
        &self.linkage
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::register::RegisterId;

    #[test]
    fn unlinked_bus_reports_no_callee() {
        let bus = Bus::new(
            BusId::new(0),
            "add_bus",
            RegisterVector::from_run(RegisterId::new(0), 1),
            RegisterVector::from_run(RegisterId::new(1), 1),
            None,
            Linkage::Unlinked,
        );
        assert!(!bus.linkage().is_linked());
        assert_eq!(bus.linkage().callee(), None);
    }

    #[test]
    fn linked_bus_reports_callee() {
        let bus = Bus::new(
            BusId::new(0),
            "add_bus",
            RegisterVector::from_run(RegisterId::new(0), 1),
            RegisterVector::from_run(RegisterId::new(1), 1),
            None,
            Linkage::Linked { callee: "add" },
        );
        assert_eq!(bus.linkage().callee(), Some("add"));
    }
}
