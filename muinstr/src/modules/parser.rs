//! Parser for the textual form of the IR.
//!
//! The grammar mirrors what [`crate::modules::fmt`] prints:
//!
//! ```text
//! module "src/math.c"
//! declare i32 @abs(%x: i32)
//! define i32 @sum(%a: i32, %b: i32) !loc("src/math.c", 3, 1) {
//! entry:
//!     %c = add i32 %a, %b !loc(4, 12)
//!     ret %c
//! }
//! trampoline @_mu_trampoline_sum = @_mu_original_sum {
//!     "cxx_add_to_sub:src/math.c:4:12" => @_mu_sum_0,
//! }
//! ```
use std::collections::BTreeMap;

use chumsky::prelude::*;
use smallvec::SmallVec;

use crate::{
    modules::{
        BasicBlock, DebugLoc, Function, FunctionLoc, Module, TrampolineSlot,
        instructions::{Call, MuInstr, SlotCall, Statement},
        int::{IBinary, IBinaryOp, ICmp, ICmpVariant},
        operand::{IConst, Label, Operand},
        terminator::{CBranch, Jump, Ret, Terminator},
    },
    types::IType,
    utils::{Error, ParserError},
};

type Extra<'src> = extra::Err<Rich<'src, char>>;

pub fn whitespace<'src>() -> impl Parser<'src, &'src str, (), Extra<'src>> + Clone {
    any()
        .filter(|c: &char| c.is_whitespace())
        .repeated()
        .at_least(1)
        .ignored()
        .labelled("whitespace")
}

fn identifier<'src>() -> impl Parser<'src, &'src str, String, Extra<'src>> + Clone {
    any()
        .filter(|c: &char| c.is_ascii_alphanumeric() || *c == '_' || *c == '.' || *c == '$')
        .repeated()
        .at_least(1)
        .to_slice()
        .map(|s: &str| s.to_string())
        .labelled("identifier")
}

pub fn register_parser<'src>() -> impl Parser<'src, &'src str, String, Extra<'src>> + Clone {
    just('%').ignore_then(identifier()).labelled("register")
}

pub fn symbol_parser<'src>() -> impl Parser<'src, &'src str, String, Extra<'src>> + Clone {
    just('@').ignore_then(identifier()).labelled("symbol")
}

fn number_parser<'src>() -> impl Parser<'src, &'src str, u64, Extra<'src>> + Clone {
    text::int(10)
        .try_map(|digits: &str, span| {
            digits
                .parse::<u64>()
                .map_err(|e| Rich::custom(span, format!("invalid number {}: {}", digits, e)))
        })
        .labelled("number")
}

fn small_number_parser<'src>() -> impl Parser<'src, &'src str, u32, Extra<'src>> + Clone {
    number_parser().try_map(|value, span| {
        u32::try_from(value)
            .map_err(|_| Rich::custom(span, format!("number {} is out of range", value)))
    })
}

pub fn itype_parser<'src>() -> impl Parser<'src, &'src str, IType, Extra<'src>> + Clone {
    just('i')
        .ignore_then(small_number_parser())
        .try_map(|width, span| {
            IType::new(width).ok_or_else(|| {
                Rich::custom(
                    span,
                    format!(
                        "integer type width must be within {}..={}, got {}",
                        IType::MIN_BITS,
                        IType::MAX_BITS,
                        width
                    ),
                )
            })
        })
        .labelled("integer type")
}

fn maybe_type_parser<'src>() -> impl Parser<'src, &'src str, Option<IType>, Extra<'src>> + Clone {
    choice((just("void").to(None), itype_parser().map(Some))).labelled("maybe type")
}

pub fn iconst_parser<'src>() -> impl Parser<'src, &'src str, IConst, Extra<'src>> + Clone {
    itype_parser()
        .then_ignore(whitespace())
        .then(number_parser())
        .validate(|(ty, value), extra, emit| {
            if !ty.fits_value(value) {
                emit.emit(Rich::custom(
                    extra.span(),
                    format!(
                        "integer constant value {} does not fit in type {} (max {})",
                        value,
                        ty,
                        ty.max_value()
                    ),
                ));
            }
            IConst::new(ty, value)
        })
        .labelled("integer constant")
}

pub fn operand_parser<'src>() -> impl Parser<'src, &'src str, Operand, Extra<'src>> + Clone {
    choice((
        register_parser().map(Operand::Reg),
        iconst_parser().map(Operand::Imm),
    ))
    .labelled("operand")
}

pub fn string_parser<'src>() -> impl Parser<'src, &'src str, String, Extra<'src>> + Clone {
    let escaped = just('\\').ignore_then(any());
    just('"')
        .ignore_then(
            choice((escaped, none_of("\\\"")))
                .repeated()
                .collect::<String>(),
        )
        .then_ignore(just('"'))
        .labelled("string literal")
}

fn debug_loc_parser<'src>() -> impl Parser<'src, &'src str, DebugLoc, Extra<'src>> + Clone {
    just("!loc")
        .ignore_then(
            small_number_parser()
                .padded()
                .then_ignore(just(','))
                .then(small_number_parser().padded())
                .delimited_by(just('('), just(')')),
        )
        .map(|(line, column)| DebugLoc { line, column })
        .labelled("debug location")
}

fn function_loc_parser<'src>() -> impl Parser<'src, &'src str, FunctionLoc, Extra<'src>> + Clone
{
    just("!loc")
        .ignore_then(
            string_parser()
                .padded()
                .then_ignore(just(','))
                .then(small_number_parser().padded())
                .then_ignore(just(','))
                .then(small_number_parser().padded())
                .delimited_by(just('('), just(')')),
        )
        .map(|((file, line), column)| FunctionLoc { file, line, column })
        .labelled("function location")
}

fn label_parser<'src>() -> impl Parser<'src, &'src str, Label, Extra<'src>> + Clone {
    just("label")
        .then_ignore(whitespace())
        .ignore_then(text::ascii::ident())
        .map(|s: &str| Label(s.to_string()))
        .labelled("label")
}

fn dest_parser<'src>() -> impl Parser<'src, &'src str, String, Extra<'src>> + Clone {
    register_parser()
        .then_ignore(just('=').padded())
        .labelled("instruction destination")
}

fn call_args_parser<'src>()
-> impl Parser<'src, &'src str, SmallVec<Operand, 4>, Extra<'src>> + Clone {
    operand_parser()
        .padded()
        .separated_by(just(','))
        .collect::<Vec<_>>()
        .delimited_by(just('('), just(')'))
        .map(|args| args.into_iter().collect())
        .labelled("call arguments")
}

fn instruction_parser<'src>() -> impl Parser<'src, &'src str, MuInstr, Extra<'src>> + Clone {
    let binary = dest_parser()
        .then(text::ascii::ident().try_map(|s: &str, span| {
            IBinaryOp::from_str(s)
                .ok_or_else(|| Rich::custom(span, format!("unknown opcode: {}", s)))
        }))
        .then_ignore(whitespace())
        .then(itype_parser())
        .then(operand_parser().padded())
        .then_ignore(just(','))
        .then(operand_parser().padded())
        .map(|((((dest, op), ty), lhs), rhs)| {
            MuInstr::IBinary(IBinary {
                dest,
                ty,
                op,
                lhs,
                rhs,
            })
        })
        .labelled("binary instruction");

    let icmp = dest_parser()
        .then_ignore(just("icmp."))
        .then(text::ascii::ident().try_map(|s: &str, span| {
            ICmpVariant::from_str(s)
                .ok_or_else(|| Rich::custom(span, format!("unknown comparison: {}", s)))
        }))
        .then_ignore(whitespace())
        .then(itype_parser())
        .then(operand_parser().padded())
        .then_ignore(just(','))
        .then(operand_parser().padded())
        .map(|((((dest, variant), ty), lhs), rhs)| {
            MuInstr::ICmp(ICmp {
                dest,
                ty,
                variant,
                lhs,
                rhs,
            })
        })
        .labelled("comparison instruction");

    let call = dest_parser()
        .or_not()
        .then_ignore(just("call"))
        .then(just(".slot").or_not())
        .then_ignore(whitespace())
        .then(maybe_type_parser())
        .then_ignore(whitespace())
        .then(symbol_parser())
        .then(call_args_parser().padded())
        .map(|((((dest, slot), ret_ty), target), args)| {
            if slot.is_some() {
                MuInstr::SlotCall(SlotCall {
                    dest,
                    ret_ty,
                    slot: target,
                    args,
                })
            } else {
                MuInstr::Call(Call {
                    dest,
                    ret_ty,
                    callee: target,
                    args,
                })
            }
        })
        .labelled("call instruction");

    choice((icmp, call, binary))
}

fn statement_parser<'src>() -> impl Parser<'src, &'src str, Statement, Extra<'src>> + Clone {
    instruction_parser()
        .then(debug_loc_parser().padded().or_not())
        .map(|(instr, loc)| Statement { instr, loc })
}

fn terminator_parser<'src>() -> impl Parser<'src, &'src str, Terminator, Extra<'src>> + Clone {
    let branch = just("branch")
        .ignore_then(operand_parser().padded())
        .then_ignore(just(',').padded())
        .then(label_parser())
        .then_ignore(just(',').padded())
        .then(label_parser())
        .map(|((cond, target_true), target_false)| {
            Terminator::CBranch(CBranch {
                cond,
                target_true,
                target_false,
            })
        })
        .labelled("branch terminator");

    let jump = just("jump")
        .ignore_then(whitespace())
        .ignore_then(label_parser())
        .map(|target| Terminator::Jump(Jump { target }))
        .labelled("jump terminator");

    let ret = just("ret")
        .ignore_then(whitespace())
        .ignore_then(choice((
            just("void").to(None),
            operand_parser().map(Some),
        )))
        .map(|value| Terminator::Ret(Ret { value }))
        .labelled("return terminator");

    let trap = just("trap").to(Terminator::Trap);

    choice((branch, jump, ret, trap)).labelled("terminator")
}

fn block_parser<'src>() -> impl Parser<'src, &'src str, BasicBlock, Extra<'src>> + Clone {
    text::ascii::ident()
        .map(|s: &str| Label(s.to_string()))
        .then_ignore(just(':'))
        .labelled("block label")
        .padded()
        .then(statement_parser().padded().repeated().collect::<Vec<_>>())
        .then(terminator_parser().padded())
        .map(|((label, statements), terminator)| BasicBlock {
            label,
            statements,
            terminator,
        })
        .labelled("block")
}

fn function_parser<'src>() -> impl Parser<'src, &'src str, Function, Extra<'src>> + Clone {
    let param = register_parser()
        .then_ignore(just(':').padded())
        .or_not()
        .then(itype_parser())
        .padded();

    let body = block_parser()
        .padded()
        .repeated()
        .at_least(1)
        .collect::<Vec<_>>()
        .delimited_by(just('{'), just('}'));

    choice((just("define").to(true), just("declare").to(false)))
        .then_ignore(whitespace())
        .then(maybe_type_parser())
        .then_ignore(whitespace())
        .then(symbol_parser())
        .then(
            param
                .separated_by(just(','))
                .collect::<Vec<_>>()
                .delimited_by(just('('), just(')'))
                .padded(),
        )
        .then(function_loc_parser().padded().or_not())
        .then(body.padded().or_not())
        .validate(
            |(((((is_definition, return_type), name), params), loc), body), extra, emit| {
                if is_definition && body.is_none() {
                    emit.emit(Rich::custom(
                        extra.span(),
                        format!("definition of @{} has no body", name),
                    ));
                }
                if !is_definition && body.is_some() {
                    emit.emit(Rich::custom(
                        extra.span(),
                        format!("declaration of @{} cannot have a body", name),
                    ));
                }

                Function {
                    params: params
                        .into_iter()
                        .enumerate()
                        .map(|(index, (name, ty))| {
                            (name.unwrap_or_else(|| format!("arg{}", index)), ty)
                        })
                        .collect(),
                    name,
                    return_type,
                    body: body.unwrap_or_default(),
                    loc,
                }
            },
        )
        .labelled("function")
}

fn trampoline_parser<'src>() -> impl Parser<'src, &'src str, TrampolineSlot, Extra<'src>> + Clone
{
    let entry = string_parser()
        .padded()
        .then_ignore(just("=>").padded())
        .then(symbol_parser())
        .padded();

    just("trampoline")
        .ignore_then(whitespace())
        .ignore_then(symbol_parser())
        .then_ignore(just('=').padded())
        .then(symbol_parser())
        .then(
            entry
                .separated_by(just(','))
                .allow_trailing()
                .collect::<Vec<_>>()
                .padded()
                .delimited_by(just('{'), just('}'))
                .padded(),
        )
        .map(|((name, baseline), mutants)| TrampolineSlot {
            name,
            baseline,
            mutants: mutants.into_iter().collect::<BTreeMap<_, _>>(),
        })
        .labelled("trampoline")
}

enum Item {
    Function(Function),
    Trampoline(TrampolineSlot),
}

fn module_parser<'src>() -> impl Parser<'src, &'src str, Module, Extra<'src>> {
    let header = just("module")
        .ignore_then(whitespace())
        .ignore_then(string_parser())
        .padded();

    let item = choice((
        function_parser().map(Item::Function),
        trampoline_parser().map(Item::Trampoline),
    ))
    .padded();

    header
        .or_not()
        .then(item.repeated().collect::<Vec<_>>())
        .padded()
        .then_ignore(end())
        .validate(|(source, items), extra, emit| {
            let mut module = Module {
                source,
                ..Default::default()
            };

            for item in items {
                let (name, duplicate) = match item {
                    Item::Function(function) => {
                        let name = function.name.clone();
                        (name, module.insert_function(function).is_some())
                    }
                    Item::Trampoline(slot) => {
                        let name = slot.name.clone();
                        (name.clone(), module.trampolines.insert(name, slot).is_some())
                    }
                };
                if duplicate {
                    emit.emit(Rich::custom(
                        extra.span(),
                        format!("symbol @{} is defined more than once", name),
                    ));
                }
            }

            module
        })
}

/// Parse a whole module from its textual form.
pub fn parse_module(source: &str) -> Result<Module, Error> {
    parse_module_named(source, None)
}

/// Parse a whole module, attributing parser errors to `file`.
pub fn parse_module_named(source: &str, file: Option<&str>) -> Result<Module, Error> {
    module_parser()
        .parse(source)
        .into_result()
        .map_err(|errors| {
            log::debug!(
                "parsing of {} failed with {} error(s)",
                file.unwrap_or("<buffer>"),
                errors.len()
            );
            Error::ParserErrors {
                errors: errors
                    .into_iter()
                    .map(|e| ParserError {
                        file: file.map(str::to_string),
                        message: e.to_string(),
                        start: e.span().start,
                        end: e.span().end,
                    })
                    .collect(),
            }
        })
}

/// Parse a module from a raw buffer, such as a section extracted from an
/// object file.
pub fn parse_module_from_bytes(buffer: &[u8], file: Option<&str>) -> Result<Module, Error> {
    let source = std::str::from_utf8(buffer).map_err(|e| Error::InvalidEncoding {
        offset: e.valid_up_to(),
    })?;
    parse_module_named(source, file)
}
