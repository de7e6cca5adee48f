//! String method translation.
//!
//! The target dialect's string functions are 1-based and return 0 for "not
//! found". Abstract string methods are 0-based with -1 for "not found", so
//! every position crossing the boundary is shifted here.
//!
//! Functions used: `INSTR(start, text, search[, compare])`,
//! `MID(text, start, length)`, `LEN`, `LEFT`, `RIGHT`, `TRIM`, `LTRIM`,
//! `RTRIM`, `LCASE`, `UCASE`, `REPLACE`, `COALESCE`.

use crate::translate::{MethodCallTranslator, apply_type_mapping, infer_type_mapping};
use crate::tree::{
    BinaryOp, CaseExpr, Expr, FunctionCall, SqlType, StringMethod, UnaryOp, Value, WhenClause,
};

/// Translator for [`StringMethod`] calls.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringMethodTranslator;

impl MethodCallTranslator for StringMethodTranslator {
    fn translate(
        &self,
        method: StringMethod,
        instance: Option<&Expr>,
        args: &[Expr],
    ) -> Option<Expr> {
        match method {
            StringMethod::IndexOf => index_of(instance?, args),
            StringMethod::Replace => replace(instance?, args),
            StringMethod::Trim => trim("TRIM", instance?, args),
            StringMethod::TrimStart => trim("LTRIM", instance?, args),
            StringMethod::TrimEnd => trim("RTRIM", instance?, args),
            StringMethod::ToLower => unary_function("LCASE", instance?, args),
            StringMethod::ToUpper => unary_function("UCASE", instance?, args),
            StringMethod::Substring => substring(instance?, args),
            StringMethod::IsNullOrEmpty => {
                let arg = static_operand(instance, args)?;
                Some(is_null_or(arg.clone(), Expr::like(arg, Expr::string(""))))
            }
            StringMethod::IsNullOrWhiteSpace => {
                let arg = static_operand(instance, args)?;
                Some(is_null_or(
                    arg.clone(),
                    Expr::binary(BinaryOp::Eq, arg, Expr::string("")),
                ))
            }
            StringMethod::FirstOrDefault => {
                let arg = static_operand(instance, args)?;
                Some(mid(arg, Expr::int(1), Expr::int(1)))
            }
            StringMethod::LastOrDefault => {
                let arg = static_operand(instance, args)?;
                Some(last_char(arg))
            }
            StringMethod::Contains => contains(instance?, args),
            StringMethod::StartsWith => starts_or_ends_with(instance?, args, true),
            StringMethod::EndsWith => starts_or_ends_with(instance?, args, false),
            StringMethod::Length if args.is_empty() => Some(len(instance?.clone())),
            StringMethod::Length => None,
        }
    }
}

// ── Function builders ───────────────────────────────────────────────────

fn function(name: &str, args: Vec<Expr>, propagates: Vec<bool>, data_type: SqlType) -> Expr {
    Expr::Function(FunctionCall::new(name, args, propagates, data_type))
}

fn len(arg: Expr) -> Expr {
    function("LEN", vec![arg], vec![true], SqlType::Integer)
}

fn mid(text: Expr, start: Expr, length: Expr) -> Expr {
    let data_type = text.data_type();
    function("MID", vec![text, start, length], vec![true, true, true], data_type)
}

/// `COALESCE(a, b)`: NULL only when both operands can be NULL.
fn coalesce(a: Expr, b: Expr) -> Expr {
    let nullable = a.is_nullable() && b.is_nullable();
    let data_type = a.data_type();
    Expr::Function(FunctionCall {
        name: "COALESCE".into(),
        args: vec![a, b],
        nullable,
        args_propagate_nullability: vec![false, false],
        data_type,
    })
}

/// `INSTR(start, text, search)`.
fn instr(start: Expr, text: Expr, search: Expr) -> Expr {
    function(
        "INSTR",
        vec![start, text, search],
        vec![true, true, true],
        SqlType::Integer,
    )
}

/// Shift a 0-based position to 1-based, folding integer literals.
fn add_one(position: Expr) -> Expr {
    match position {
        Expr::Constant {
            value: Value::Int(n),
            data_type,
        } => Expr::Constant {
            value: Value::Int(n + 1),
            data_type,
        },
        other => Expr::binary(BinaryOp::Add, other, Expr::int(1)),
    }
}

fn case_when(test: Expr, result: Expr, else_result: Option<Expr>) -> Expr {
    Expr::Case(CaseExpr {
        operand: None,
        when_clauses: vec![WhenClause { test, result }],
        else_result: else_result.map(Box::new),
    })
}

fn is_null_or(arg: Expr, check: Expr) -> Expr {
    Expr::binary(BinaryOp::Or, Expr::unary(UnaryOp::IsNull, arg), check)
}

/// Operand of a static helper (`IsNullOrEmpty(s)`), which may also arrive as
/// an instance call.
fn static_operand(instance: Option<&Expr>, args: &[Expr]) -> Option<Expr> {
    match (instance, args) {
        (Some(i), []) => Some(i.clone()),
        (None, [a]) => Some(a.clone()),
        _ => None,
    }
}

// ── Translations ────────────────────────────────────────────────────────

fn index_of(instance: &Expr, args: &[Expr]) -> Option<Expr> {
    let (search, start) = match args {
        [search] => (search, None),
        [search, start] => (search, Some(start)),
        _ => return None,
    };
    let data_type = infer_type_mapping(&[instance, search]);
    let instance = apply_type_mapping(instance.clone(), data_type);
    let search = apply_type_mapping(search.clone(), data_type);

    let Some(start) = start else {
        if search.as_text_constant() == Some("") {
            return Some(case_when(
                Expr::unary(UnaryOp::IsNotNull, instance),
                Expr::int(0),
                None,
            ));
        }
        return Some(Expr::binary(
            BinaryOp::Subtract,
            instr(Expr::int(1), instance, search),
            Expr::int(1),
        ));
    };

    // With a start position an empty literal is not short-circuited: it
    // takes the CASE offset like a non-constant search. Keep both branches
    // as they are; the two forms are not equivalent for every input.
    let offset = match search.as_text_constant() {
        Some(s) if !s.is_empty() => Expr::int(1),
        _ => case_when(
            Expr::binary(BinaryOp::Eq, search.clone(), Expr::string("")),
            Expr::int(0),
            Some(Expr::int(1)),
        ),
    };
    Some(Expr::binary(
        BinaryOp::Subtract,
        instr(add_one(start.clone()), instance, search),
        offset,
    ))
}

fn replace(instance: &Expr, args: &[Expr]) -> Option<Expr> {
    let [old, new] = args else {
        return None;
    };
    let data_type = infer_type_mapping(&[instance, old, new]);
    let operands = [instance, old, new]
        .into_iter()
        .map(|e| apply_type_mapping(e.clone(), data_type))
        .collect();
    Some(function("REPLACE", operands, vec![true, true, true], data_type))
}

fn trim(name: &str, instance: &Expr, args: &[Expr]) -> Option<Expr> {
    let translatable = match args {
        [] => true,
        [Expr::Constant {
            value: Value::Chars(chars),
            ..
        }] => chars.is_empty(),
        _ => false,
    };
    translatable.then(|| unary_call(name, instance.clone()))
}

fn unary_function(name: &str, instance: &Expr, args: &[Expr]) -> Option<Expr> {
    args.is_empty().then(|| unary_call(name, instance.clone()))
}

fn unary_call(name: &str, arg: Expr) -> Expr {
    let data_type = arg.data_type();
    function(name, vec![arg], vec![true], data_type)
}

fn substring(instance: &Expr, args: &[Expr]) -> Option<Expr> {
    match args {
        [start] => Some(mid(
            instance.clone(),
            add_one(start.clone()),
            coalesce(len(instance.clone()), Expr::int(0)),
        )),
        [start, length] => Some(mid(
            instance.clone(),
            add_one(start.clone()),
            length.clone(),
        )),
        _ => None,
    }
}

fn last_char(arg: Expr) -> Expr {
    let position = case_when(
        Expr::binary(BinaryOp::Eq, len(arg.clone()), Expr::int(0)),
        Expr::int(1),
        Some(len(arg.clone())),
    );
    mid(arg, coalesce(position, Expr::int(0)), Expr::int(1))
}

fn contains(instance: &Expr, args: &[Expr]) -> Option<Expr> {
    let [value] = args else {
        return None;
    };
    if value.as_text_constant() == Some("") {
        return Some(Expr::boolean(true));
    }
    let data_type = infer_type_mapping(&[instance, value]);
    let search = function(
        "INSTR",
        vec![
            Expr::int(1),
            apply_type_mapping(instance.clone(), data_type),
            apply_type_mapping(value.clone(), data_type),
            Expr::int(1),
        ],
        vec![false, true, true, false],
        SqlType::Integer,
    );
    Some(Expr::binary(BinaryOp::Gt, search, Expr::int(0)))
}

fn starts_or_ends_with(instance: &Expr, args: &[Expr], starts: bool) -> Option<Expr> {
    let [value] = args else {
        return None;
    };
    match value {
        Expr::Constant {
            value: Value::Text(s),
            ..
        } => {
            let escaped = escape_like(s);
            let pattern = if starts {
                format!("{escaped}%")
            } else {
                format!("%{escaped}")
            };
            Some(Expr::like(instance.clone(), Expr::string(pattern)))
        }
        Expr::Constant { .. } => None,
        _ => {
            let data_type = instance.data_type();
            let name = if starts { "LEFT" } else { "RIGHT" };
            let edge = function(
                name,
                vec![instance.clone(), len(value.clone())],
                vec![true, true],
                data_type,
            );
            Some(Expr::binary(BinaryOp::Eq, edge, value.clone()))
        }
    }
}

/// Escape LIKE wildcards by wrapping them in a bracket class.
fn escape_like(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '[' | '%' | '_' => {
                out.push('[');
                out.push(ch);
                out.push(']');
            }
            other => out.push(other),
        }
    }
    out
}
