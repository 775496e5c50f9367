//! Pretty-print helpers for instructions, terminators, functions, and modules.
//!
//! The output of [`Module`]'s `Display` implementation is accepted back by
//! [`crate::modules::parser::parse_module`].
use crate::{
    modules::{
        BasicBlock, DebugLoc, Function, FunctionLoc, Module, TrampolineSlot,
        instructions::{MuInstr, Statement},
        operand::{IConst, Label, Operand},
        terminator::Terminator,
    },
    types::IType,
};

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if f.alternate() {
            write!(f, "label {}", self.0)
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl std::fmt::Display for IConst {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.ty, self.value)
    }
}

impl std::fmt::Display for Operand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operand::Reg(name) => write!(f, "%{}", name),
            Operand::Imm(constant) => write!(f, "{}", constant),
        }
    }
}

impl std::fmt::Display for DebugLoc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "!loc({}, {})", self.line, self.column)
    }
}

impl std::fmt::Display for FunctionLoc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "!loc(\"{}\", {}, {})",
            escape(&self.file),
            self.line,
            self.column
        )
    }
}

/// Escape a string literal for the textual form.
pub fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

fn fmt_ret_type(ty: Option<IType>) -> String {
    ty.map(|t| t.to_string()).unwrap_or_else(|| "void".to_string())
}

fn fmt_args<'a>(args: impl Iterator<Item = &'a Operand>) -> String {
    args.map(|a| a.to_string()).collect::<Vec<_>>().join(", ")
}

impl std::fmt::Display for MuInstr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MuInstr::IBinary(i) => write!(
                f,
                "%{} = {} {} {}, {}",
                i.dest,
                i.op.to_str(),
                i.ty,
                i.lhs,
                i.rhs
            ),
            MuInstr::ICmp(i) => write!(
                f,
                "%{} = icmp.{} {} {}, {}",
                i.dest,
                i.variant.to_str(),
                i.ty,
                i.lhs,
                i.rhs
            ),
            MuInstr::Call(call) => {
                if let Some(dest) = &call.dest {
                    write!(f, "%{} = ", dest)?;
                }
                write!(
                    f,
                    "call {} @{}({})",
                    fmt_ret_type(call.ret_ty),
                    call.callee,
                    fmt_args(call.args.iter())
                )
            }
            MuInstr::SlotCall(call) => {
                if let Some(dest) = &call.dest {
                    write!(f, "%{} = ", dest)?;
                }
                write!(
                    f,
                    "call.slot {} @{}({})",
                    fmt_ret_type(call.ret_ty),
                    call.slot,
                    fmt_args(call.args.iter())
                )
            }
        }
    }
}

impl std::fmt::Display for Statement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.instr)?;
        if let Some(loc) = &self.loc {
            write!(f, " {}", loc)?;
        }
        Ok(())
    }
}

impl std::fmt::Display for Terminator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Terminator::CBranch(cbranch) => write!(
                f,
                "branch {}, {:#}, {:#}",
                cbranch.cond, cbranch.target_true, cbranch.target_false
            ),
            Terminator::Jump(jump) => write!(f, "jump {:#}", jump.target),
            Terminator::Ret(ret) => match &ret.value {
                Some(value) => write!(f, "ret {}", value),
                None => write!(f, "ret void"),
            },
            Terminator::Trap => write!(f, "trap"),
        }
    }
}

impl std::fmt::Display for BasicBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}:", self.label)?;
        for stmt in &self.statements {
            writeln!(f, "    {}", stmt)?;
        }
        writeln!(f, "    {}", self.terminator)
    }
}

impl std::fmt::Display for Function {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keyword = if self.is_declaration() {
            "declare"
        } else {
            "define"
        };
        write!(
            f,
            "{} {} @{}({})",
            keyword,
            fmt_ret_type(self.return_type),
            self.name,
            self.params
                .iter()
                .map(|(name, ty)| format!("%{}: {}", name, ty))
                .collect::<Vec<_>>()
                .join(", ")
        )?;
        if let Some(loc) = &self.loc {
            write!(f, " {}", loc)?;
        }
        if self.is_declaration() {
            return writeln!(f);
        }

        writeln!(f, " {{")?;
        for bb in &self.body {
            write!(f, "{}", bb)?;
        }
        writeln!(f, "}}")
    }
}

impl std::fmt::Display for TrampolineSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "trampoline @{} = @{} {{", self.name, self.baseline)?;
        for (identifier, target) in &self.mutants {
            writeln!(f, "    \"{}\" => @{},", escape(identifier), target)?;
        }
        writeln!(f, "}}")
    }
}

impl std::fmt::Display for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(source) = &self.source {
            writeln!(f, "module \"{}\"", escape(source))?;
            writeln!(f)?;
        }
        for function in self.functions.values() {
            writeln!(f, "{}", function)?;
        }
        for slot in self.trampolines.values() {
            writeln!(f, "{}", slot)?;
        }
        Ok(())
    }
}
