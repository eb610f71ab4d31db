//! The target-independent low-level IR.
//!
//! LIR is what the code generator consumes: functions of labeled basic
//! blocks, PHI nodes at block entry (materialized from GIL block
//! arguments), virtual registers, and a flat instruction set that maps
//! one-to-one onto a conventional backend. Allocas are always in the entry
//! block.

use std::fmt;

use galec_ast::TyId;
use galec_util::Symbol;

/// A virtual register.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Reg(pub u32);

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%r{}", self.0)
    }
}

/// An operand: a register or an immediate.
#[derive(Clone, Debug, PartialEq)]
pub enum LirValue {
    Reg(Reg),
    IntConst(i64),
    FloatConst(f64),
    BoolConst(bool),
    StringConst(Symbol),
    /// Address of a named function.
    Function(String),
    /// Address of a named global.
    Global(String),
}

impl fmt::Display for LirValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LirValue::Reg(reg) => write!(f, "{reg}"),
            LirValue::IntConst(v) => write!(f, "{v}"),
            LirValue::FloatConst(v) => write!(f, "{v}"),
            LirValue::BoolConst(v) => write!(f, "{v}"),
            LirValue::StringConst(s) => write!(f, "\"{s}\""),
            LirValue::Function(name) => write!(f, "@{name}"),
            LirValue::Global(name) => write!(f, "@{name}"),
        }
    }
}

/// A PHI node: one incoming value per predecessor edge.
#[derive(Clone, Debug)]
pub struct Phi {
    pub dest: Reg,
    pub ty: TyId,
    pub incoming: Vec<(String, LirValue)>,
}

/// Cast flavors, mirroring the backend's cast instructions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CastKind {
    Bitcast,
    Trunc,
    Zext,
    Sext,
    FpTrunc,
    FpExt,
    FpToInt,
    IntToFp,
    IntToPtr,
    PtrToInt,
}

impl CastKind {
    fn name(self) -> &'static str {
        match self {
            CastKind::Bitcast => "bitcast",
            CastKind::Trunc => "trunc",
            CastKind::Zext => "zext",
            CastKind::Sext => "sext",
            CastKind::FpTrunc => "fptrunc",
            CastKind::FpExt => "fpext",
            CastKind::FpToInt => "fptoint",
            CastKind::IntToFp => "inttofp",
            CastKind::IntToPtr => "inttoptr",
            CastKind::PtrToInt => "ptrtoint",
        }
    }
}

/// Non-terminator instructions.
#[derive(Clone, Debug)]
pub enum LirInst {
    /// Stack slot; hoisted to the entry block.
    Alloca { dest: Reg, ty: TyId },
    Load { dest: Reg, ptr: LirValue },
    Store { value: LirValue, ptr: LirValue },
    /// Build an aggregate from field values.
    Aggregate { dest: Reg, fields: Vec<LirValue> },
    /// Extract a field from an aggregate value.
    ExtractValue {
        dest: Reg,
        base: LirValue,
        index: usize,
    },
    /// Address of a field behind an aggregate pointer.
    FieldPtr {
        dest: Reg,
        base: LirValue,
        index: usize,
    },
    /// Pointer plus element offset.
    ElementPtr {
        dest: Reg,
        base: LirValue,
        offset: LirValue,
    },
    Cast {
        dest: Reg,
        kind: CastKind,
        value: LirValue,
        ty: TyId,
    },
    Call {
        dest: Option<Reg>,
        callee: LirValue,
        args: Vec<LirValue>,
    },
}

/// Block terminators.
#[derive(Clone, Debug)]
pub enum LirTerminator {
    Br { dest: String },
    CondBr {
        cond: LirValue,
        then_dest: String,
        else_dest: String,
    },
    Ret { value: Option<LirValue> },
    Unreachable,
}

/// A basic block: PHIs first, then instructions, then the terminator.
#[derive(Clone, Debug)]
pub struct LirBlock {
    pub label: String,
    pub phis: Vec<Phi>,
    pub insts: Vec<LirInst>,
    pub terminator: LirTerminator,
}

/// A LIR function.
#[derive(Clone, Debug)]
pub struct LirFunction {
    pub name: String,
    pub params: Vec<TyId>,
    pub ret: Option<TyId>,
    pub blocks: Vec<LirBlock>,
}

impl LirFunction {
    pub fn is_declaration(&self) -> bool {
        self.blocks.is_empty()
    }
}

/// A LIR module.
#[derive(Clone, Debug, Default)]
pub struct LirModule {
    pub name: String,
    pub globals: Vec<(String, TyId)>,
    pub functions: Vec<LirFunction>,
}

impl fmt::Display for LirModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "; module {}", self.name)?;
        for (name, _) in &self.globals {
            writeln!(f, "@{name} = global")?;
        }
        for function in &self.functions {
            writeln!(f)?;
            if function.is_declaration() {
                writeln!(f, "declare @{}", function.name)?;
                continue;
            }
            writeln!(f, "define @{} {{", function.name)?;
            for block in &function.blocks {
                writeln!(f, "{}:", block.label)?;
                for phi in &block.phis {
                    let incoming: Vec<String> = phi
                        .incoming
                        .iter()
                        .map(|(label, value)| format!("[{value}, {label}]"))
                        .collect();
                    writeln!(f, "  {} = phi {}", phi.dest, incoming.join(", "))?;
                }
                for inst in &block.insts {
                    writeln!(f, "  {inst}")?;
                }
                writeln!(f, "  {}", block.terminator)?;
            }
            writeln!(f, "}}")?;
        }
        Ok(())
    }
}

impl fmt::Display for LirInst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LirInst::Alloca { dest, .. } => write!(f, "{dest} = alloca"),
            LirInst::Load { dest, ptr } => write!(f, "{dest} = load {ptr}"),
            LirInst::Store { value, ptr } => write!(f, "store {value}, {ptr}"),
            LirInst::Aggregate { dest, fields } => {
                let fields: Vec<String> = fields.iter().map(|v| v.to_string()).collect();
                write!(f, "{dest} = aggregate {{{}}}", fields.join(", "))
            }
            LirInst::ExtractValue { dest, base, index } => {
                write!(f, "{dest} = extractvalue {base}, {index}")
            }
            LirInst::FieldPtr { dest, base, index } => {
                write!(f, "{dest} = fieldptr {base}, {index}")
            }
            LirInst::ElementPtr { dest, base, offset } => {
                write!(f, "{dest} = elementptr {base}, {offset}")
            }
            LirInst::Cast {
                dest, kind, value, ..
            } => write!(f, "{dest} = {} {value}", kind.name()),
            LirInst::Call { dest, callee, args } => {
                let args: Vec<String> = args.iter().map(|v| v.to_string()).collect();
                match dest {
                    Some(dest) => write!(f, "{dest} = call {callee}({})", args.join(", ")),
                    None => write!(f, "call {callee}({})", args.join(", ")),
                }
            }
        }
    }
}

impl fmt::Display for LirTerminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LirTerminator::Br { dest } => write!(f, "br {dest}"),
            LirTerminator::CondBr {
                cond,
                then_dest,
                else_dest,
            } => write!(f, "condbr {cond}, {then_dest}, {else_dest}"),
            LirTerminator::Ret { value: Some(value) } => write!(f, "ret {value}"),
            LirTerminator::Ret { value: None } => write!(f, "ret void"),
            LirTerminator::Unreachable => write!(f, "unreachable"),
        }
    }
}
