//! Loader and interpreter for images linked by the image toolchain.
//!
//! The interpreter is where trampoline slots get their meaning: a call
//! through a slot reaches the clone of the first active mutant listed by the
//! slot, and the baseline copy when none is active.
use std::{
    collections::{BTreeSet, HashMap},
    path::Path,
};

use muinstr::{
    modules::{
        Function, Module,
        instructions::MuInstr,
        int::IBinaryOp,
        operand::{Label, Operand},
        parser::parse_module_from_bytes,
        terminator::Terminator,
    },
    types::IType,
};

use crate::{
    encoding::{decode_bytes, decode_u64},
    magic::{DEFAULT_FUEL, ENV_ACTIVE_MUTANTS, IMAGE_MAGIC, MAX_CALL_DEPTH, TEXT_SECTION_NAME},
    objfile::read_section,
    utils::error::{MuResult, RuntimeError},
};

/// Every module of a linked image merged into one symbol table.
#[derive(Debug, Clone, Default)]
pub struct Image {
    module: Module,
}

impl Image {
    /// Merge modules. A definition replaces declarations of the same symbol,
    /// two definitions are an error.
    pub fn from_modules(modules: impl IntoIterator<Item = Module>) -> Result<Self, RuntimeError> {
        let mut merged = Module::default();
        for module in modules {
            for (name, function) in module.functions {
                match merged.functions.get(&name) {
                    Some(existing) if !existing.is_declaration() => {
                        if !function.is_declaration() {
                            return Err(RuntimeError::DuplicateSymbol(name));
                        }
                    }
                    _ => {
                        merged.functions.insert(name, function);
                    }
                }
            }
            for (name, slot) in module.trampolines {
                if merged.trampolines.insert(name.clone(), slot).is_some() {
                    return Err(RuntimeError::DuplicateSymbol(name));
                }
            }
        }
        Ok(Self { module: merged })
    }

    /// Decode an image object.
    pub fn from_bytes(data: &[u8]) -> Result<Self, RuntimeError> {
        let payload = read_section(data, &[TEXT_SECTION_NAME])
            .map_err(|e| RuntimeError::NotAnImage(e.to_string()))?
            .ok_or_else(|| {
                RuntimeError::NotAnImage(format!("section '{}' not found", TEXT_SECTION_NAME))
            })?;

        let mut cursor = payload
            .strip_prefix(&IMAGE_MAGIC[..])
            .ok_or_else(|| RuntimeError::NotAnImage("bad magic".to_string()))?;
        let truncated = || RuntimeError::NotAnImage("truncated payload".to_string());
        let count = decode_u64(&mut cursor).ok_or_else(truncated)?;

        let mut modules = Vec::new();
        for index in 0..count as usize {
            let text = decode_bytes(&mut cursor).ok_or_else(truncated)?;
            let module = parse_module_from_bytes(text, None)
                .map_err(|source| RuntimeError::CorruptModule { index, source })?;
            modules.push(module);
        }
        Self::from_modules(modules)
    }

    pub fn load(path: &Path) -> MuResult<Self> {
        let data = std::fs::read(path)?;
        Ok(Self::from_bytes(&data)?)
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.module.functions.get(name)
    }
}

/// Active mutant identifiers listed in [`ENV_ACTIVE_MUTANTS`].
pub fn active_mutants_from_env() -> BTreeSet<String> {
    std::env::var(ENV_ACTIVE_MUTANTS)
        .map(|value| parse_active_list(&value))
        .unwrap_or_default()
}

/// Split a comma separated identifier list.
pub fn parse_active_list(value: &str) -> BTreeSet<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Evaluate a binary operation on two values of type `ty`.
pub fn evaluate_binary(op: IBinaryOp, ty: IType, lhs: u64, rhs: u64) -> Option<u64> {
    let (ul, ur) = (ty.truncate(lhs), ty.truncate(rhs));
    let (sl, sr) = (ty.sign_extend(lhs), ty.sign_extend(rhs));
    let bits = ty.num_bits() as u64;
    if op.is_division() && ur == 0 {
        return None;
    }

    let value = match op {
        IBinaryOp::Add => ul.wrapping_add(ur),
        IBinaryOp::Sub => ul.wrapping_sub(ur),
        IBinaryOp::Mul => ul.wrapping_mul(ur),
        IBinaryOp::SDiv => sl.wrapping_div(sr) as u64,
        IBinaryOp::UDiv => ul / ur,
        IBinaryOp::SRem => sl.wrapping_rem(sr) as u64,
        IBinaryOp::URem => ul % ur,
        IBinaryOp::And => ul & ur,
        IBinaryOp::Or => ul | ur,
        IBinaryOp::Xor => ul ^ ur,
        IBinaryOp::Shl if ur >= bits => 0,
        IBinaryOp::Shl => ul << ur,
        IBinaryOp::LShr if ur >= bits => 0,
        IBinaryOp::LShr => ul >> ur,
        IBinaryOp::AShr => (sl >> ur.min(63)) as u64,
    };
    Some(ty.truncate(value))
}

/// Interpreter over an [`Image`].
pub struct Machine<'a> {
    image: &'a Image,
    active: BTreeSet<String>,
    fuel: u64,
    executed: u64,
}

impl<'a> Machine<'a> {
    pub fn new(image: &'a Image) -> Self {
        Self {
            image,
            active: BTreeSet::new(),
            fuel: DEFAULT_FUEL,
            executed: 0,
        }
    }

    pub fn with_fuel(mut self, fuel: u64) -> Self {
        self.fuel = fuel;
        self
    }

    pub fn with_active<I, S>(mut self, identifiers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.active.extend(identifiers.into_iter().map(Into::into));
        self
    }

    pub fn with_active_from_env(self) -> Self {
        self.with_active(active_mutants_from_env())
    }

    pub fn is_active(&self, identifier: &str) -> bool {
        self.active.contains(identifier)
    }

    /// Instructions executed so far.
    pub fn executed(&self) -> u64 {
        self.executed
    }

    /// Call `function` with `args`. Returns the value it returns, if any.
    pub fn call(&mut self, function: &str, args: &[u64]) -> Result<Option<u64>, RuntimeError> {
        self.invoke(function, args.to_vec(), 0)
    }

    fn resolve(&self, name: &str) -> Result<&'a Function, RuntimeError> {
        self.image
            .function(name)
            .filter(|f| !f.is_declaration())
            .ok_or_else(|| RuntimeError::UnresolvedSymbol(name.to_string()))
    }

    fn tick(&mut self) -> Result<(), RuntimeError> {
        if self.executed >= self.fuel {
            return Err(RuntimeError::OutOfFuel(self.executed));
        }
        self.executed += 1;
        Ok(())
    }

    fn invoke(
        &mut self,
        name: &str,
        args: Vec<u64>,
        depth: usize,
    ) -> Result<Option<u64>, RuntimeError> {
        if depth >= MAX_CALL_DEPTH {
            return Err(RuntimeError::StackOverflow(MAX_CALL_DEPTH));
        }
        let image = self.image;
        let function = self.resolve(name)?;
        if function.params.len() != args.len() {
            return Err(RuntimeError::ArityMismatch {
                function: name.to_string(),
                expected: function.params.len(),
                found: args.len(),
            });
        }

        let mut registers: HashMap<&str, u64> = function
            .params
            .iter()
            .zip(args)
            .map(|((param, ty), value)| (param.as_str(), ty.truncate(value)))
            .collect();

        let mut label = Label::entry();
        loop {
            let block = function
                .block(&label)
                .ok_or_else(|| RuntimeError::Trap(function.name.clone()))?;

            for stmt in &block.statements {
                self.tick()?;
                let read = |registers: &HashMap<&str, u64>, operand: &Operand| match operand {
                    Operand::Reg(reg) => registers.get(reg.as_str()).copied().ok_or_else(|| {
                        RuntimeError::UninitializedRegister {
                            function: function.name.clone(),
                            name: reg.clone(),
                        }
                    }),
                    Operand::Imm(constant) => Ok(constant.value),
                };

                match &stmt.instr {
                    MuInstr::IBinary(binary) => {
                        let lhs = read(&registers, &binary.lhs)?;
                        let rhs = read(&registers, &binary.rhs)?;
                        let value = evaluate_binary(binary.op, binary.ty, lhs, rhs)
                            .ok_or_else(|| RuntimeError::DivisionByZero(function.name.clone()))?;
                        registers.insert(binary.dest.as_str(), value);
                    }
                    MuInstr::ICmp(icmp) => {
                        let lhs = read(&registers, &icmp.lhs)?;
                        let rhs = read(&registers, &icmp.rhs)?;
                        let value = icmp.variant.evaluate(icmp.ty, lhs, rhs) as u64;
                        registers.insert(icmp.dest.as_str(), value);
                    }
                    MuInstr::Call(call) => {
                        let args = call
                            .args
                            .iter()
                            .map(|a| read(&registers, a))
                            .collect::<Result<Vec<_>, _>>()?;
                        let value = self.invoke(&call.callee, args, depth + 1)?;
                        if let (Some(dest), Some(ty)) = (&call.dest, call.ret_ty) {
                            registers.insert(dest.as_str(), ty.truncate(value.unwrap_or(0)));
                        }
                    }
                    MuInstr::SlotCall(call) => {
                        let slot = image
                            .module
                            .trampolines
                            .get(&call.slot)
                            .ok_or_else(|| RuntimeError::UnresolvedSymbol(call.slot.clone()))?;
                        let target = slot.resolve(|id| self.is_active(id));
                        let args = call
                            .args
                            .iter()
                            .map(|a| read(&registers, a))
                            .collect::<Result<Vec<_>, _>>()?;
                        let value = self.invoke(target, args, depth + 1)?;
                        if let (Some(dest), Some(ty)) = (&call.dest, call.ret_ty) {
                            registers.insert(dest.as_str(), ty.truncate(value.unwrap_or(0)));
                        }
                    }
                }
            }

            self.tick()?;
            match &block.terminator {
                Terminator::CBranch(branch) => {
                    let cond = match &branch.cond {
                        Operand::Reg(reg) => registers.get(reg.as_str()).copied().ok_or_else(
                            || RuntimeError::UninitializedRegister {
                                function: function.name.clone(),
                                name: reg.clone(),
                            },
                        )?,
                        Operand::Imm(constant) => constant.value,
                    };
                    label = if cond != 0 {
                        branch.target_true.clone()
                    } else {
                        branch.target_false.clone()
                    };
                }
                Terminator::Jump(jump) => label = jump.target.clone(),
                Terminator::Ret(ret) => {
                    let value = match &ret.value {
                        Some(Operand::Reg(reg)) => Some(
                            registers.get(reg.as_str()).copied().ok_or_else(|| {
                                RuntimeError::UninitializedRegister {
                                    function: function.name.clone(),
                                    name: reg.clone(),
                                }
                            })?,
                        ),
                        Some(Operand::Imm(constant)) => Some(constant.value),
                        None => None,
                    };
                    return Ok(match (value, function.return_type) {
                        (Some(value), Some(ty)) => Some(ty.truncate(value)),
                        (value, _) => value,
                    });
                }
                Terminator::Trap => return Err(RuntimeError::Trap(function.name.clone())),
            }
        }
    }
}
