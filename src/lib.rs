//! Lowers a typed, multi-function assembly language into algebraic
//! (vanishing) and lookup constraints for a zero-knowledge proving
//! system.
//!
//! The pipeline, leaves-first: [`register`]/[`bus`] declare the data
//! model; [`macro_instr`] is the surface instruction set a function body
//! is written in; [`lower`] reduces one macro instruction to a sequence
//! of [`micro`] microcodes; [`branch_table`] computes each microcode's
//! reachability condition and write lattice; [`cond`] and [`expr`] are
//! the two expression algebras (logical and arithmetic, respectively)
//! that condition lives in and gets translated into; [`translate`] is
//! the per-instruction constraint translator; [`function`] and
//! [`program`] drive the whole thing over a function and a program of
//! functions, emitting into a [`backend::Module`].
#![deny(unsafe_code)]
#![deny(unused_must_use)]
#![warn(missing_docs)]

pub mod backend;
pub mod branch_table;
pub mod bus;
pub mod cond;
pub mod error;
pub mod expr;
pub mod function;
pub mod lower;
pub mod macro_instr;
pub mod micro;
pub mod poly;
pub mod program;
pub mod register;
pub mod translate;

/// Re-exports of the types most call sites need, mirroring the crate's
/// own internal usage.
pub mod prelude {
    pub use crate::{
        backend::Module,
        bus::{
            Bus,
            BusId,
            Linkage,
        },
        error::{
            Bug,
            CompileError,
            CompileResult,
            Diagnostic,
            DiagnosticCode,
        },
        function::{
            Function,
            FunctionMapping,
        },
        lower::lower,
        macro_instr::MacroInstr,
        micro::{
            Microcode,
            MicroInstr,
        },
        program::Program,
        register::{
            FieldConfig,
            Register,
            RegisterId,
            RegisterKind,
            RegisterVector,
        },
    };
}
