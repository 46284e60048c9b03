//! Macro → micro lowering, per `spec.md` §4.1.
//!
//! `lower` is a deterministic pure function from one macro instruction to
//! its microcode sequence, validated against a [`FieldConfig`]. Grounded
//! on `interpreter::executors::instruction` in the teacher crate: one
//! `match` arm per instruction variant, each arm doing its own narrow
//! validation before emitting.

use tracing::trace;

use crate::{
    bus::Bus,
    error::{
        Diagnostic,
        DiagnosticCode,
        Site,
    },
    macro_instr::{
        CmpOp,
        MacroInstr,
        Pc,
        RightOperand,
    },
    micro::{
        Microcode,
        MicroInstr,
    },
    poly::Poly,
    register::{
        FieldConfig,
        Register,
        RegisterVector,
    },
};

/// Lower one macro instruction at `pc` into its microcode sequence.
///
/// `function_name` and `pc` are only used to stamp [`Site`] on any
/// diagnostic raised; `buses` resolves `Call`'s bus reference for arity
/// and linkage validation; `registers` is the caller's own declared
/// register table, used to validate widths against bus lines and sign
/// bits (bus address/data lines and `Assign`/`Call` targets all name
/// registers in this same table — `spec.md` §3).
pub fn lower(
    function_name: &'static str,
    pc: Pc,
    instr: &MacroInstr,
    config: FieldConfig,
    buses: &[Bus],
    registers: &[Register],
) -> Result<MicroInstr, Diagnostic> {
    let site = Site::new(function_name, pc);
    trace!(function = function_name, pc, instr = ?instr, "lowering instruction");
    let microcodes = match instr {
        MacroInstr::Assign { targets, source } => {
            validate_assign(site, targets, source, config, registers)?;
            vec![
                Microcode::Assign {
                    targets: targets.clone(),
                    source: source.clone(),
                },
                Microcode::Jmp { target: pc + 1 },
            ]
        }
        MacroInstr::Call {
            bus,
            targets,
            sources,
        } => {
            let bus_def = buses.get(bus.index()).ok_or_else(|| {
                Diagnostic::new(
                    DiagnosticCode::UnboundBus,
                    site,
                    format!("call references unknown bus {bus}"),
                )
            })?;
            if !bus_def.linkage().is_linked() {
                return Err(Diagnostic::new(
                    DiagnosticCode::UnboundBus,
                    site,
                    format!("bus {} has no linked callee", bus_def.name()),
                ));
            }
            if sources.len() != bus_def.address().len() as usize
                || targets.len() != bus_def.data().len() as usize
            {
                return Err(Diagnostic::new(
                    DiagnosticCode::BusArity,
                    site,
                    format!(
                        "call to {} supplies {} argument(s) and {} result(s), bus expects {}/{}",
                        bus_def.name(),
                        sources.len(),
                        targets.len(),
                        bus_def.address().len(),
                        bus_def.data().len(),
                    ),
                ));
            }

            for (offset, source) in sources.iter().enumerate() {
                let address_reg = bus_def.address().ids().nth(offset).expect("checked arity");
                let line_width = registers[address_reg.index()].width();
                let source_width = required_width(source, config);
                if source_width > line_width {
                    return Err(Diagnostic::new(
                        DiagnosticCode::BusWidth,
                        site,
                        format!(
                            "call to {} argument {offset} needs {source_width} bit(s), address line {address_reg} declares {line_width}",
                            bus_def.name(),
                        ),
                    ));
                }
            }
            for (offset, &target) in targets.iter().enumerate() {
                let data_reg = bus_def.data().ids().nth(offset).expect("checked arity");
                let data_width = registers[data_reg.index()].width();
                let target_width = registers[target.index()].width();
                if data_width > target_width {
                    return Err(Diagnostic::new(
                        DiagnosticCode::BusWidth,
                        site,
                        format!(
                            "call to {} result {offset} data line {data_reg} declares {data_width} bit(s), target {target} only declares {target_width}",
                            bus_def.name(),
                        ),
                    ));
                }
            }

            let mut microcodes = Vec::with_capacity(sources.len() + targets.len() + 2);
            for (offset, source) in sources.iter().enumerate() {
                let address_reg = bus_def.address().ids().nth(offset).expect("checked arity");
                microcodes.push(Microcode::Assign {
                    targets: RegisterVector::single(address_reg),
                    source: source.clone(),
                });
            }
            microcodes.push(Microcode::InOut {
                bus: *bus,
                address: bus_def.address().clone(),
                data: bus_def.data().clone(),
            });
            for (offset, &target) in targets.iter().enumerate() {
                let data_reg = bus_def.data().ids().nth(offset).expect("checked arity");
                microcodes.push(Microcode::Assign {
                    targets: RegisterVector::single(target),
                    source: Poly::register(data_reg),
                });
            }
            microcodes.push(Microcode::Jmp { target: pc + 1 });
            microcodes
        }
        MacroInstr::Cast {
            targets,
            width,
            source,
        } => {
            validate_width(site, targets, *width, config)?;
            vec![
                Microcode::Assign {
                    targets: targets.clone(),
                    source: source.clone(),
                },
                Microcode::Jmp { target: pc + 1 },
            ]
        }
        MacroInstr::Goto { target } => vec![Microcode::Jmp { target: *target }],
        MacroInstr::IfGoto {
            cmp,
            lhs,
            rhs,
            target,
        } => {
            validate_branch_reachability(site, lhs, rhs, *cmp)?;
            let negated = matches!(cmp, CmpOp::Neq);
            vec![
                Microcode::SkipIf {
                    left: lhs.clone(),
                    right: rhs.clone(),
                    negated,
                    skip: 1,
                },
                Microcode::Jmp { target: pc + 1 },
                Microcode::Jmp { target: *target },
            ]
        }
        MacroInstr::IfThenElse {
            targets,
            cmp,
            lhs,
            rhs,
            then_source,
            else_source,
        } => {
            validate_branch_reachability(site, lhs, rhs, *cmp)?;
            let negated = matches!(cmp, CmpOp::Neq);
            let (taken_source, fall_source) = (then_source.clone(), else_source.clone());
            vec![
                Microcode::SkipIf {
                    left: lhs.clone(),
                    right: rhs.clone(),
                    negated,
                    skip: 2,
                },
                Microcode::Assign {
                    targets: targets.clone(),
                    source: fall_source,
                },
                Microcode::Jmp { target: pc + 1 },
                Microcode::Assign {
                    targets: targets.clone(),
                    source: taken_source,
                },
                Microcode::Jmp { target: pc + 1 },
            ]
        }
        MacroInstr::Return => vec![Microcode::Ret],
        MacroInstr::Fail => vec![Microcode::Fail],
        MacroInstr::Division {
            quotient,
            remainder,
            witness,
            dividend,
            divisor,
        } => vec![
            Microcode::Division {
                quotient: *quotient,
                remainder: *remainder,
                witness: *witness,
                dividend: dividend.clone(),
                divisor: divisor.clone(),
            },
            Microcode::Jmp { target: pc + 1 },
        ],
    };
    check_duplicate_targets(site, instr)?;
    Ok(MicroInstr::new(microcodes))
}

/// An `Assign`'s target width must cover the source and, if the source is
/// signed, must carry a width-1 sign bit as its most-significant target.
fn validate_assign(
    site: Site,
    targets: &RegisterVector,
    source: &Poly,
    config: FieldConfig,
    registers: &[Register],
) -> Result<(), Diagnostic> {
    validate_width(site, targets, required_width(source, config), config)?;
    if source.is_signed() {
        validate_sign_bit(site, targets, registers)?;
    }
    Ok(())
}

/// Conservative width required to hold `source`'s value: one bit per
/// monomial's maximum limb contribution is not tracked precisely by this
/// crate (that lives in the splitting pass); here we only check against
/// the field's own bandwidth ceiling, per `spec.md` §4.1.
fn required_width(source: &Poly, config: FieldConfig) -> u32 {
    let reads = source.reads().len() as u32;
    (reads + 1).min(config.max_bandwidth())
}

fn validate_width(
    site: Site,
    targets: &RegisterVector,
    required: u32,
    config: FieldConfig,
) -> Result<(), Diagnostic> {
    if targets.len() == 0 {
        return Err(Diagnostic::new(
            DiagnosticCode::WidthOverflow,
            site,
            "assignment has no target registers",
        ));
    }
    if required > config.max_bandwidth() {
        return Err(Diagnostic::new(
            DiagnosticCode::FieldOverflow,
            site,
            format!(
                "required width {required} exceeds field bandwidth {}",
                config.max_bandwidth()
            ),
        ));
    }
    Ok(())
}

/// A signed assignment's most-significant target must be exactly the
/// sign bit (width 1), per `spec.md` §4.1/§9 glossary ("Sign bit").
fn validate_sign_bit(
    site: Site,
    targets: &RegisterVector,
    registers: &[Register],
) -> Result<(), Diagnostic> {
    if targets.len() < 2 {
        return Err(Diagnostic::new(
            DiagnosticCode::MissingSignBit,
            site,
            "signed assignment must target at least a value limb and a sign bit",
        ));
    }
    let sign_offset = targets.len() - 1;
    let sign_reg = targets.ids().nth(sign_offset as usize).expect("checked len");
    let sign_width = registers[sign_reg.index()].width();
    if sign_width != 1 {
        return Err(Diagnostic::new(
            DiagnosticCode::MisalignedPivot,
            site,
            format!(
                "signed assignment's sign bit {sign_reg} declares width {sign_width}, expected exactly 1"
            ),
        ));
    }
    Ok(())
}

/// Reject a branch whose comparison can never or always be taken because
/// both operands are the identical constant vector, per `spec.md` §4.1.
fn validate_branch_reachability(
    site: Site,
    lhs: &RegisterVector,
    rhs: &RightOperand,
    cmp: CmpOp,
) -> Result<(), Diagnostic> {
    let RightOperand::Vector(rhs_vec) = rhs else {
        return Ok(());
    };
    if lhs.first() == rhs_vec.first() && lhs.len() == rhs_vec.len() {
        return Err(Diagnostic::new(
            match cmp {
                CmpOp::Eq => DiagnosticCode::AlwaysTaken,
                CmpOp::Neq => DiagnosticCode::NeverTaken,
            },
            site,
            "branch compares a register vector against itself",
        ));
    }
    Ok(())
}

/// A `Call`'s result targets may not name the same register twice.
/// `Assign`/`Cast`/`IfThenElse` targets are `RegisterVector`s, which are
/// consecutive runs by construction and so cannot repeat an id; `Call`
/// targets are a bare `Vec<RegisterId>` and need an explicit check.
fn check_duplicate_targets(site: Site, instr: &MacroInstr) -> Result<(), Diagnostic> {
    let MacroInstr::Call { targets, .. } = instr else {
        return Ok(());
    };
    let mut seen = std::collections::HashSet::new();
    for &target in targets {
        if !seen.insert(target) {
            return Err(Diagnostic::new(
                DiagnosticCode::DuplicateTarget,
                site,
                format!("call names target register {target} more than once"),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bus::{
            BusId,
            Linkage,
        },
        register::{
            RegisterId,
            RegisterKind,
        },
    };

    fn field() -> FieldConfig {
        FieldConfig::new(64, 32)
    }

    /// `n` generously-wide internal registers, for tests that only care
    /// about arity/structure, not width validation.
    fn regs(n: u32) -> Vec<Register> {
        (0..n)
            .map(|i| Register::new(RegisterId::new(i), "r", RegisterKind::Internal, 32, 0))
            .collect()
    }

    #[test]
    fn assign_lowers_to_assign_then_jmp() {
        let instr = MacroInstr::Assign {
            targets: RegisterVector::from_run(RegisterId::new(0), 1),
            source: Poly::register(RegisterId::new(1)),
        };
        let micro = lower("f", 0, &instr, field(), &[], &regs(2)).unwrap();
        assert_eq!(micro.len(), 2);
        assert!(matches!(micro.microcodes()[0], Microcode::Assign { .. }));
        assert_eq!(
            micro.microcodes()[1],
            Microcode::Jmp { target: 1 }
        );
    }

    #[test]
    fn goto_lowers_to_bare_jmp() {
        let instr = MacroInstr::Goto { target: 5 };
        let micro = lower("f", 2, &instr, field(), &[], &[]).unwrap();
        assert_eq!(micro.microcodes(), &[Microcode::Jmp { target: 5 }]);
    }

    #[test]
    fn if_goto_lowers_to_skip_if_then_two_jmps() {
        let instr = MacroInstr::IfGoto {
            cmp: CmpOp::Eq,
            lhs: RegisterVector::from_run(RegisterId::new(0), 1),
            rhs: RightOperand::Const(0.into()),
            target: 10,
        };
        let micro = lower("f", 3, &instr, field(), &[], &[]).unwrap();
        assert_eq!(micro.len(), 3);
        assert!(matches!(micro.microcodes()[0], Microcode::SkipIf { .. }));
        assert_eq!(micro.microcodes()[1], Microcode::Jmp { target: 4 });
        assert_eq!(micro.microcodes()[2], Microcode::Jmp { target: 10 });
    }

    #[test]
    fn branch_against_self_is_rejected() {
        let v = RegisterVector::from_run(RegisterId::new(0), 1);
        let instr = MacroInstr::IfGoto {
            cmp: CmpOp::Eq,
            lhs: v.clone(),
            rhs: RightOperand::Vector(v),
            target: 10,
        };
        let err = lower("f", 0, &instr, field(), &[], &[]).unwrap_err();
        assert_eq!(err.code, DiagnosticCode::AlwaysTaken);
    }

    #[test]
    fn call_checks_arity_against_bus() {
        let bus = Bus::new(
            BusId::new(0),
            "add_bus",
            RegisterVector::from_run(RegisterId::new(0), 1),
            RegisterVector::from_run(RegisterId::new(1), 1),
            None,
            Linkage::Linked { callee: "add" },
        );
        let instr = MacroInstr::Call {
            bus: BusId::new(0),
            targets: vec![RegisterId::new(2)],
            sources: vec![Poly::register(RegisterId::new(3)), Poly::register(RegisterId::new(4))],
        };
        let err = lower("f", 0, &instr, field(), &[bus], &regs(5)).unwrap_err();
        assert_eq!(err.code, DiagnosticCode::BusArity);
    }

    #[test]
    fn call_rejects_unlinked_bus() {
        let bus = Bus::new(
            BusId::new(0),
            "add_bus",
            RegisterVector::from_run(RegisterId::new(0), 1),
            RegisterVector::from_run(RegisterId::new(1), 1),
            None,
            Linkage::Unlinked,
        );
        let instr = MacroInstr::Call {
            bus: BusId::new(0),
            targets: vec![RegisterId::new(2)],
            sources: vec![Poly::register(RegisterId::new(3))],
        };
        let err = lower("f", 0, &instr, field(), &[bus], &regs(4)).unwrap_err();
        assert_eq!(err.code, DiagnosticCode::UnboundBus);
    }

    #[test]
    fn call_rejects_mismatched_argument_width() {
        let bus = Bus::new(
            BusId::new(0),
            "add_bus",
            RegisterVector::from_run(RegisterId::new(0), 1),
            RegisterVector::from_run(RegisterId::new(1), 1),
            None,
            Linkage::Linked { callee: "add" },
        );
        let mut registers = regs(4);
        registers[0] = Register::new(RegisterId::new(0), "addr", RegisterKind::Internal, 1, 0);
        let instr = MacroInstr::Call {
            bus: BusId::new(0),
            targets: vec![RegisterId::new(2)],
            sources: vec![Poly::from_terms(vec![
                crate::poly::Monomial::new(1, vec![RegisterId::new(3)]),
                crate::poly::Monomial::new(1, vec![]),
            ])],
        };
        let err = lower("f", 0, &instr, field(), &[bus], &registers).unwrap_err();
        assert_eq!(err.code, DiagnosticCode::BusWidth);
    }

    #[test]
    fn call_rejects_duplicate_result_targets() {
        let bus = Bus::new(
            BusId::new(0),
            "add_bus",
            RegisterVector::from_run(RegisterId::new(0), 1),
            RegisterVector::from_run(RegisterId::new(1), 2),
            None,
            Linkage::Linked { callee: "add" },
        );
        let instr = MacroInstr::Call {
            bus: BusId::new(0),
            targets: vec![RegisterId::new(5), RegisterId::new(5)],
            sources: vec![Poly::register(RegisterId::new(3))],
        };
        let err = lower("f", 0, &instr, field(), &[bus], &regs(6)).unwrap_err();
        assert_eq!(err.code, DiagnosticCode::DuplicateTarget);
    }

    #[test]
    fn signed_assign_requires_at_least_two_targets() {
        let instr = MacroInstr::Assign {
            targets: RegisterVector::from_run(RegisterId::new(0), 1),
            source: Poly::from_terms(vec![crate::poly::Monomial::new(-1, vec![])]),
        };
        let err = lower("f", 0, &instr, field(), &[], &regs(1)).unwrap_err();
        assert_eq!(err.code, DiagnosticCode::MissingSignBit);
    }

    #[test]
    fn signed_assign_rejects_wide_sign_bit() {
        let mut registers = regs(2);
        registers[1] = Register::new(RegisterId::new(1), "sign", RegisterKind::Computed, 4, 0);
        let instr = MacroInstr::Assign {
            targets: RegisterVector::from_run(RegisterId::new(0), 2),
            source: Poly::from_terms(vec![crate::poly::Monomial::new(-1, vec![])]),
        };
        let err = lower("f", 0, &instr, field(), &[], &registers).unwrap_err();
        assert_eq!(err.code, DiagnosticCode::MisalignedPivot);
    }
}
