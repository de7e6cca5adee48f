//! Scalar expressions of the query tree.
//!
//! [`Expr`] is a closed tagged variant. Passes pattern-match the shapes they
//! rewrite and fall through a catch-all arm for everything else, so new node
//! kinds can be added without touching every pass.

use chrono::NaiveDateTime;

use crate::error::RewriteError;
use crate::tree::{Ordering, Select};

/// Store type of an expression, as far as these passes care.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlType {
    Boolean,
    Integer,
    BigInt,
    Double,
    Decimal,
    /// Character data; `max_length` is `None` for unbounded (memo) text.
    Text { max_length: Option<u32> },
    DateTime,
    Binary,
}

impl SqlType {
    pub const TEXT: SqlType = SqlType::Text { max_length: None };
}

/// A literal value carried by [`Expr::Constant`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    Text(String),
    DateTime(NaiveDateTime),
    /// A character-array argument (e.g. the trim set of `Trim(params char[])`).
    Chars(Vec<char>),
}

/// A column reference: `table_alias.name`.
///
/// Two columns are structurally equal when alias, name and type match.
/// Nullability is derived metadata and does not take part in equality.
#[derive(Debug, Clone)]
pub struct ColumnRef {
    pub table_alias: String,
    pub name: String,
    pub data_type: SqlType,
    pub nullable: bool,
}

impl PartialEq for ColumnRef {
    fn eq(&self, other: &Self) -> bool {
        self.table_alias == other.table_alias
            && self.name == other.name
            && self.data_type == other.data_type
    }
}

/// A dialect function call.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    pub args: Vec<Expr>,
    /// Whether the call can produce NULL.
    pub nullable: bool,
    /// Per argument: does a NULL in this argument make the result NULL?
    pub args_propagate_nullability: Vec<bool>,
    pub data_type: SqlType,
}

impl FunctionCall {
    /// Build a call whose nullability follows from its arguments: the result
    /// is nullable if any argument flagged as propagating is itself nullable.
    pub fn new(
        name: impl Into<String>,
        args: Vec<Expr>,
        args_propagate_nullability: Vec<bool>,
        data_type: SqlType,
    ) -> Self {
        debug_assert_eq!(args.len(), args_propagate_nullability.len());
        let nullable = args
            .iter()
            .zip(&args_propagate_nullability)
            .any(|(arg, propagates)| *propagates && arg.is_nullable());
        FunctionCall {
            name: name.into(),
            args,
            nullable,
            args_propagate_nullability,
            data_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhenClause {
    pub test: Expr,
    pub result: Expr,
}

/// `CASE [operand] WHEN .. THEN .. [ELSE ..] END`
#[derive(Debug, Clone, PartialEq)]
pub struct CaseExpr {
    pub operand: Option<Box<Expr>>,
    pub when_clauses: Vec<WhenClause>,
    pub else_result: Option<Box<Expr>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl BinaryOp {
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::NotEq
                | BinaryOp::Lt
                | BinaryOp::LtEq
                | BinaryOp::Gt
                | BinaryOp::GtEq
        )
    }

    pub fn sql(&self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::NotEq => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    IsNull,
    IsNotNull,
    Negate,
}

/// Abstract string operations produced by the host's front end.
///
/// The Function Dialect Mapper recognises them by identity, never by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StringMethod {
    IndexOf,
    Replace,
    Trim,
    TrimStart,
    TrimEnd,
    ToLower,
    ToUpper,
    Substring,
    IsNullOrEmpty,
    IsNullOrWhiteSpace,
    FirstOrDefault,
    LastOrDefault,
    Contains,
    StartsWith,
    EndsWith,
    Length,
}

/// An untranslated call of an abstract method, e.g. `instance.IndexOf(x)`.
///
/// Static methods (`IsNullOrEmpty`) have no instance; their operand is the
/// first argument.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodCall {
    pub method: StringMethod,
    pub instance: Option<Box<Expr>>,
    pub args: Vec<Expr>,
    pub data_type: SqlType,
}

/// A SQL expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Column(ColumnRef),
    Constant {
        value: Value,
        data_type: SqlType,
    },
    Function(FunctionCall),
    Case(CaseExpr),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Like {
        expr: Box<Expr>,
        pattern: Box<Expr>,
    },
    /// `expr [NOT] IN (SELECT ...)`
    In {
        expr: Box<Expr>,
        subquery: Box<Select>,
        negated: bool,
    },
    /// A subquery producing one row and one column.
    ScalarSubquery(Box<Select>),
    Exists {
        subquery: Box<Select>,
        negated: bool,
    },
    MethodCall(MethodCall),
    /// Ascending sequence number of each row under `orderings`.
    RowNumber {
        orderings: Vec<Ordering>,
    },
    /// Opaque SQL the passes never look into.
    Fragment {
        sql: String,
        data_type: SqlType,
    },
}

impl Expr {
    // ── Constructors ────────────────────────────────────────────────────

    pub fn column(
        table_alias: impl Into<String>,
        name: impl Into<String>,
        data_type: SqlType,
        nullable: bool,
    ) -> Expr {
        Expr::Column(ColumnRef {
            table_alias: table_alias.into(),
            name: name.into(),
            data_type,
            nullable,
        })
    }

    pub fn int(value: i64) -> Expr {
        Expr::Constant {
            value: Value::Int(value),
            data_type: SqlType::Integer,
        }
    }

    pub fn string(value: impl Into<String>) -> Expr {
        Expr::Constant {
            value: Value::Text(value.into()),
            data_type: SqlType::TEXT,
        }
    }

    pub fn boolean(value: bool) -> Expr {
        Expr::Constant {
            value: Value::Bool(value),
            data_type: SqlType::Boolean,
        }
    }

    pub fn null(data_type: SqlType) -> Expr {
        Expr::Constant {
            value: Value::Null,
            data_type,
        }
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn unary(op: UnaryOp, operand: Expr) -> Expr {
        Expr::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    pub fn like(expr: Expr, pattern: Expr) -> Expr {
        Expr::Like {
            expr: Box::new(expr),
            pattern: Box::new(pattern),
        }
    }

    /// Conjunction of `parts`; `None` when empty.
    pub fn and_all(parts: impl IntoIterator<Item = Expr>) -> Option<Expr> {
        parts
            .into_iter()
            .reduce(|acc, e| Expr::binary(BinaryOp::And, acc, e))
    }

    // ── Metadata ────────────────────────────────────────────────────────

    /// Result type of the expression.
    pub fn data_type(&self) -> SqlType {
        match self {
            Expr::Column(c) => c.data_type,
            Expr::Constant { data_type, .. } => *data_type,
            Expr::Function(f) => f.data_type,
            Expr::Case(case) => case
                .when_clauses
                .first()
                .map(|w| w.result.data_type())
                .or_else(|| case.else_result.as_ref().map(|e| e.data_type()))
                .unwrap_or(SqlType::TEXT),
            Expr::Binary { op, left, right } => {
                if op.is_comparison() || matches!(op, BinaryOp::And | BinaryOp::Or) {
                    SqlType::Boolean
                } else if right.data_type() == SqlType::Double {
                    SqlType::Double
                } else {
                    left.data_type()
                }
            }
            Expr::Unary { op, operand } => match op {
                UnaryOp::Negate => operand.data_type(),
                UnaryOp::Not | UnaryOp::IsNull | UnaryOp::IsNotNull => SqlType::Boolean,
            },
            Expr::Like { .. } | Expr::In { .. } | Expr::Exists { .. } => SqlType::Boolean,
            Expr::ScalarSubquery(select) => select
                .projection
                .first()
                .map(|p| p.expr.data_type())
                .unwrap_or(SqlType::TEXT),
            Expr::MethodCall(call) => call.data_type,
            Expr::RowNumber { .. } => SqlType::BigInt,
            Expr::Fragment { data_type, .. } => *data_type,
        }
    }

    /// Whether the expression can evaluate to NULL.
    pub fn is_nullable(&self) -> bool {
        match self {
            Expr::Column(c) => c.nullable,
            Expr::Constant { value, .. } => matches!(value, Value::Null),
            Expr::Function(f) => f.nullable,
            Expr::Case(case) => {
                case.else_result.as_ref().is_none_or(|e| e.is_nullable())
                    || case.when_clauses.iter().any(|w| w.result.is_nullable())
            }
            Expr::Binary { left, right, .. } => left.is_nullable() || right.is_nullable(),
            Expr::Unary { op, operand } => match op {
                UnaryOp::IsNull | UnaryOp::IsNotNull => false,
                UnaryOp::Not | UnaryOp::Negate => operand.is_nullable(),
            },
            Expr::Like { expr, pattern } => expr.is_nullable() || pattern.is_nullable(),
            Expr::In { expr, .. } => expr.is_nullable(),
            Expr::Exists { .. } | Expr::RowNumber { .. } => false,
            Expr::ScalarSubquery(_) | Expr::MethodCall(_) | Expr::Fragment { .. } => true,
        }
    }

    /// The referenced column, if this is a bare column.
    pub fn as_column(&self) -> Option<&ColumnRef> {
        match self {
            Expr::Column(c) => Some(c),
            _ => None,
        }
    }

    /// The literal string, if this is a text constant.
    pub fn as_text_constant(&self) -> Option<&str> {
        match self {
            Expr::Constant {
                value: Value::Text(s),
                ..
            } => Some(s),
            _ => None,
        }
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, Expr::Constant { .. })
    }

    /// Whether the expression transitively contains a subquery
    /// (`ScalarSubquery`, `Exists` or `IN (SELECT ..)`), looking through
    /// function arguments, CASE branches and operators but not into the
    /// subqueries themselves.
    pub fn contains_subquery(&self) -> bool {
        match self {
            Expr::ScalarSubquery(_) | Expr::Exists { .. } | Expr::In { .. } => true,
            other => other.children().into_iter().any(|c| c.contains_subquery()),
        }
    }

    /// Direct child expressions in the same scope. Subquery bodies are not
    /// children; they are separate scopes.
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Function(f) => f.args.iter().collect(),
            Expr::Case(case) => {
                let mut out: Vec<&Expr> = Vec::new();
                if let Some(op) = &case.operand {
                    out.push(op);
                }
                for w in &case.when_clauses {
                    out.push(&w.test);
                    out.push(&w.result);
                }
                if let Some(e) = &case.else_result {
                    out.push(e);
                }
                out
            }
            Expr::Binary { left, right, .. } => vec![left, right],
            Expr::Unary { operand, .. } => vec![operand],
            Expr::Like { expr, pattern } => vec![expr, pattern],
            Expr::In { expr, .. } => vec![expr],
            Expr::MethodCall(call) => call.instance.iter().map(|i| &**i).chain(&call.args).collect(),
            Expr::RowNumber { orderings } => orderings.iter().map(|o| &o.expr).collect(),
            Expr::Column(_)
            | Expr::Constant { .. }
            | Expr::ScalarSubquery(_)
            | Expr::Exists { .. }
            | Expr::Fragment { .. } => Vec::new(),
        }
    }

    /// Rebuild the expression bottom-up: children first, then `f` on the
    /// rebuilt node. Subquery bodies are left alone.
    pub fn transform_up<F>(self, f: &mut F) -> Result<Expr, RewriteError>
    where
        F: FnMut(Expr) -> Result<Expr, RewriteError>,
    {
        let rebuilt = match self {
            Expr::Function(call) => Expr::Function(FunctionCall {
                args: transform_all(call.args, f)?,
                ..call
            }),
            Expr::Case(case) => Expr::Case(CaseExpr {
                operand: transform_boxed(case.operand, f)?,
                when_clauses: case
                    .when_clauses
                    .into_iter()
                    .map(|w| {
                        Ok(WhenClause {
                            test: w.test.transform_up(f)?,
                            result: w.result.transform_up(f)?,
                        })
                    })
                    .collect::<Result<_, RewriteError>>()?,
                else_result: transform_boxed(case.else_result, f)?,
            }),
            Expr::Binary { op, left, right } => Expr::Binary {
                op,
                left: Box::new(left.transform_up(f)?),
                right: Box::new(right.transform_up(f)?),
            },
            Expr::Unary { op, operand } => Expr::Unary {
                op,
                operand: Box::new(operand.transform_up(f)?),
            },
            Expr::Like { expr, pattern } => Expr::Like {
                expr: Box::new(expr.transform_up(f)?),
                pattern: Box::new(pattern.transform_up(f)?),
            },
            Expr::In {
                expr,
                subquery,
                negated,
            } => Expr::In {
                expr: Box::new(expr.transform_up(f)?),
                subquery,
                negated,
            },
            Expr::MethodCall(call) => Expr::MethodCall(MethodCall {
                instance: transform_boxed(call.instance, f)?,
                args: transform_all(call.args, f)?,
                ..call
            }),
            Expr::RowNumber { orderings } => Expr::RowNumber {
                orderings: orderings
                    .into_iter()
                    .map(|o| {
                        Ok(Ordering {
                            expr: o.expr.transform_up(f)?,
                            ascending: o.ascending,
                        })
                    })
                    .collect::<Result<_, RewriteError>>()?,
            },
            leaf => leaf,
        };
        f(rebuilt)
    }
}

fn transform_all<F>(exprs: Vec<Expr>, f: &mut F) -> Result<Vec<Expr>, RewriteError>
where
    F: FnMut(Expr) -> Result<Expr, RewriteError>,
{
    exprs.into_iter().map(|e| e.transform_up(f)).collect()
}

fn transform_boxed<F>(expr: Option<Box<Expr>>, f: &mut F) -> Result<Option<Box<Expr>>, RewriteError>
where
    F: FnMut(Expr) -> Result<Expr, RewriteError>,
{
    expr.map(|e| e.transform_up(f).map(Box::new)).transpose()
}
