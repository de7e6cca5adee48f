//! Shared helpers for integration tests: tree builders and a small
//! in-memory evaluator.
//!
//! The evaluator runs a query tree against tables held in memory. It knows
//! both sides of every rewrite: native OFFSET and the abstract string
//! methods (reference semantics, 0-based, -1 for "not found"), as well as
//! `TOP`, row numbering and the dialect functions the passes emit. Running a
//! tree before and after a rewrite and comparing the rows checks the rewrite
//! by execution instead of by shape.

#![allow(dead_code)]

use std::cmp::Ordering as CmpOrdering;
use std::collections::HashMap;

use dialect_rewrite::tree::{
    BinaryOp, Expr, MethodCall, Ordering, Projection, Select, SetOpKind, SqlType, StringMethod,
    TableSource, UnaryOp, Value,
};

// ── Builders ────────────────────────────────────────────────────────────

pub fn text_col(alias: &str, name: &str) -> Expr {
    Expr::column(alias, name, SqlType::TEXT, true)
}

pub fn int_col(alias: &str, name: &str) -> Expr {
    Expr::column(alias, name, SqlType::Integer, false)
}

pub fn method(method: StringMethod, instance: Option<Expr>, args: Vec<Expr>) -> Expr {
    let data_type = match method {
        StringMethod::IndexOf | StringMethod::Length => SqlType::Integer,
        StringMethod::IsNullOrEmpty
        | StringMethod::IsNullOrWhiteSpace
        | StringMethod::Contains
        | StringMethod::StartsWith
        | StringMethod::EndsWith => SqlType::Boolean,
        _ => SqlType::TEXT,
    };
    Expr::MethodCall(MethodCall {
        method,
        instance: instance.map(Box::new),
        args,
        data_type,
    })
}

/// `SELECT c.id, c.name FROM Customers c` aliased `s`.
pub fn customers_select() -> Select {
    Select::new("s")
        .with_projection(vec![
            Projection::new(int_col("c", "id"), "id"),
            Projection::new(text_col("c", "name"), "name"),
        ])
        .with_tables(vec![TableSource::table("Customers", "c")])
}

/// A `Customers(id, name, city)` table with `n` rows. Names are distinct
/// and not in id order; cities repeat.
pub fn customers_db(n: usize) -> Database {
    let rows = (0..n)
        .map(|i| {
            vec![
                Value::Int(i as i64 + 1),
                Value::Text(format!("{:03}", (i * 7919) % 1000)),
                Value::Text(["Oslo", "Lima", "Kyiv"][i % 3].to_string()),
            ]
        })
        .collect();
    Database::new().with_table("Customers", &["id", "name", "city"], rows)
}

/// [`customers_db`] plus an `Orders(id, customer_id, item, city)` table with
/// `orders` rows. Items are distinct for up to 17 orders; customers and
/// cities repeat.
pub fn shop_db(customers: usize, orders: usize) -> Database {
    let rows = (0..orders)
        .map(|i| {
            vec![
                Value::Int(i as i64 + 1),
                Value::Int(((i * 5) % customers.max(1)) as i64 + 1),
                Value::Text(format!("item{:02}", (i * 13) % 17)),
                Value::Text(["Lima", "Kyiv", "Oslo", "Rome"][i % 4].to_string()),
            ]
        })
        .collect();
    customers_db(customers).with_table("Orders", &["id", "customer_id", "item", "city"], rows)
}

// ── Data ────────────────────────────────────────────────────────────────

type Row = HashMap<String, Value>;
/// One row of every source visible in a node, by alias.
type Frame = HashMap<String, Row>;

#[derive(Debug, Clone, Default)]
pub struct Database {
    tables: HashMap<String, Vec<Row>>,
}

impl Database {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, name: &str, columns: &[&str], rows: Vec<Vec<Value>>) -> Self {
        let rows = rows
            .into_iter()
            .map(|values| {
                columns
                    .iter()
                    .map(|c| c.to_string())
                    .zip(values)
                    .collect::<Row>()
            })
            .collect();
        self.tables.insert(name.to_string(), rows);
        self
    }
}

/// Result of a query: output names plus rows in output order.
#[derive(Debug, Clone, PartialEq)]
pub struct Relation {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Relation {
    /// Values of one output column.
    pub fn column(&self, name: &str) -> Vec<Value> {
        let index = self
            .columns
            .iter()
            .position(|c| c == name)
            .unwrap_or_else(|| panic!("no output column '{name}' in {:?}", self.columns));
        self.rows.iter().map(|r| r[index].clone()).collect()
    }
}

/// Evaluate `select` against `db`.
pub fn run(db: &Database, select: &Select) -> Relation {
    eval_select(db, select, &[])
}

/// Evaluate a scalar expression with no sources in scope.
pub fn eval_scalar(expr: &Expr) -> Value {
    eval(&Database::new(), expr, &[])
}

// ── Select evaluation ───────────────────────────────────────────────────

fn eval_select(db: &Database, select: &Select, outer: &[&Frame]) -> Relation {
    assert!(
        select.group_by.is_empty() && select.having.is_none(),
        "grouping is not supported by the test evaluator"
    );

    let mut frames = vec![Frame::new()];
    for table in &select.tables {
        frames = join_source(db, frames, table, outer);
    }

    let frames: Vec<Frame> = frames
        .into_iter()
        .filter(|frame| match &select.predicate {
            Some(p) => eval(db, p, &scopes(outer, frame)) == Value::Bool(true),
            None => true,
        })
        .collect();

    // Row numbers are assigned over the filtered rows.
    let mut row_numbers: HashMap<usize, Vec<i64>> = HashMap::new();
    for (i, p) in select.projection.iter().enumerate() {
        if let Expr::RowNumber { orderings } = &p.expr {
            let keys: Vec<Vec<Value>> = frames
                .iter()
                .map(|f| sort_key(db, orderings, &scopes(outer, f)))
                .collect();
            let mut order: Vec<usize> = (0..frames.len()).collect();
            order.sort_by(|a, b| compare_keys(&keys[*a], &keys[*b], orderings));
            let mut numbers = vec![0; frames.len()];
            for (rank, index) in order.into_iter().enumerate() {
                numbers[index] = rank as i64 + 1;
            }
            row_numbers.insert(i, numbers);
        }
    }

    let mut rows: Vec<(Vec<Value>, Vec<Value>)> = frames
        .iter()
        .enumerate()
        .map(|(fi, frame)| {
            let env = scopes(outer, frame);
            let out = select
                .projection
                .iter()
                .enumerate()
                .map(|(i, p)| match row_numbers.get(&i) {
                    Some(numbers) => Value::Int(numbers[fi]),
                    None => eval(db, &p.expr, &env),
                })
                .collect();
            (sort_key(db, &select.orderings, &env), out)
        })
        .collect();

    rows.sort_by(|a, b| compare_keys(&a.0, &b.0, &select.orderings));
    let mut rows: Vec<Vec<Value>> = rows.into_iter().map(|(_, out)| out).collect();

    if select.distinct {
        let mut seen: Vec<Vec<Value>> = Vec::new();
        rows.retain(|r| {
            if seen.contains(r) {
                false
            } else {
                seen.push(r.clone());
                true
            }
        });
    }
    if let Some(offset) = &select.offset {
        let n = as_count(eval(db, offset, outer));
        rows = rows.into_iter().skip(n).collect();
    }
    if let Some(limit) = &select.limit {
        rows.truncate(as_count(eval(db, limit, outer)));
    }

    Relation {
        columns: select.output_names(),
        rows,
    }
}

fn scopes<'a>(outer: &[&'a Frame], frame: &'a Frame) -> Vec<&'a Frame> {
    let mut out = outer.to_vec();
    out.push(frame);
    out
}

fn as_count(value: Value) -> usize {
    match value {
        Value::Int(n) if n >= 0 => n as usize,
        other => panic!("row count must be a non-negative integer, got {other:?}"),
    }
}

fn source_rows(db: &Database, table: &TableSource, outer: &[&Frame]) -> Vec<Row> {
    match table {
        TableSource::Table { name, .. } => db
            .tables
            .get(name)
            .cloned()
            .unwrap_or_else(|| panic!("unknown table '{name}'")),
        TableSource::Subquery(select) => relation_rows(eval_select(db, select, outer)),
        TableSource::SetOperation {
            kind, left, right, ..
        } => {
            let l = eval_select(db, left, outer);
            let r = eval_select(db, right, outer);
            let columns = l.columns.clone();
            let mut rows: Vec<Vec<Value>> = match kind {
                SetOpKind::UnionAll | SetOpKind::Union => {
                    l.rows.into_iter().chain(r.rows).collect()
                }
                SetOpKind::Intersect => {
                    l.rows.into_iter().filter(|x| r.rows.contains(x)).collect()
                }
                SetOpKind::Except => l.rows.into_iter().filter(|x| !r.rows.contains(x)).collect(),
            };
            if *kind != SetOpKind::UnionAll {
                let mut seen: Vec<Vec<Value>> = Vec::new();
                rows.retain(|x| {
                    let fresh = !seen.contains(x);
                    seen.push(x.clone());
                    fresh
                });
            }
            relation_rows(Relation { columns, rows })
        }
        TableSource::Join { .. } => unreachable!("joins are expanded by join_source"),
    }
}

fn relation_rows(relation: Relation) -> Vec<Row> {
    relation
        .rows
        .into_iter()
        .map(|values| relation.columns.iter().cloned().zip(values).collect())
        .collect()
}

fn join_source(
    db: &Database,
    frames: Vec<Frame>,
    table: &TableSource,
    outer: &[&Frame],
) -> Vec<Frame> {
    let (source, condition) = match table {
        TableSource::Join {
            kind,
            source,
            condition,
        } => {
            assert!(
                *kind != dialect_rewrite::tree::JoinKind::Left,
                "left joins are not supported by the test evaluator"
            );
            (source.as_ref(), condition.as_ref())
        }
        other => (other, None),
    };
    let rows = source_rows(db, source, outer);
    let mut out = Vec::new();
    for frame in frames {
        for row in &rows {
            let mut next = frame.clone();
            next.insert(source.alias().to_string(), row.clone());
            let keep = condition
                .is_none_or(|c| eval(db, c, &scopes(outer, &next)) == Value::Bool(true));
            if keep {
                out.push(next);
            }
        }
    }
    out
}

fn sort_key(db: &Database, orderings: &[Ordering], env: &[&Frame]) -> Vec<Value> {
    orderings.iter().map(|o| eval(db, &o.expr, env)).collect()
}

fn compare_keys(a: &[Value], b: &[Value], orderings: &[Ordering]) -> CmpOrdering {
    for ((x, y), o) in a.iter().zip(b).zip(orderings) {
        let ord = compare_values(x, y);
        let ord = if o.ascending { ord } else { ord.reverse() };
        if ord != CmpOrdering::Equal {
            return ord;
        }
    }
    CmpOrdering::Equal
}

/// NULL sorts first.
pub fn compare_values(a: &Value, b: &Value) -> CmpOrdering {
    match (a, b) {
        (Value::Null, Value::Null) => CmpOrdering::Equal,
        (Value::Null, _) => CmpOrdering::Less,
        (_, Value::Null) => CmpOrdering::Greater,
        (Value::Int(x), Value::Int(y)) => x.cmp(y),
        (Value::Text(x), Value::Text(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::DateTime(x), Value::DateTime(y)) => x.cmp(y),
        (x, y) => match (as_f64(x), as_f64(y)) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(CmpOrdering::Equal),
            _ => panic!("cannot compare {x:?} with {y:?}"),
        },
    }
}

fn as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Int(n) => Some(*n as f64),
        Value::Double(d) => Some(*d),
        _ => None,
    }
}

// ── Expression evaluation ───────────────────────────────────────────────

fn eval(db: &Database, expr: &Expr, env: &[&Frame]) -> Value {
    match expr {
        Expr::Column(c) => env
            .iter()
            .rev()
            .find_map(|frame| frame.get(&c.table_alias))
            .and_then(|row| row.get(&c.name))
            .cloned()
            .unwrap_or_else(|| panic!("unresolved column {}.{}", c.table_alias, c.name)),
        Expr::Constant { value, .. } => match value {
            Value::Chars(chars) => Value::Text(chars.iter().collect()),
            other => other.clone(),
        },
        Expr::Function(f) => {
            let args: Vec<Value> = f.args.iter().map(|a| eval(db, a, env)).collect();
            call_function(&f.name, &args)
        }
        Expr::Case(case) => {
            let operand = case.operand.as_ref().map(|o| eval(db, o, env));
            for w in &case.when_clauses {
                let test = eval(db, &w.test, env);
                let hit = match &operand {
                    Some(op) => !matches!(op, Value::Null) && *op == test,
                    None => test == Value::Bool(true),
                };
                if hit {
                    return eval(db, &w.result, env);
                }
            }
            case.else_result
                .as_ref()
                .map_or(Value::Null, |e| eval(db, e, env))
        }
        Expr::Binary { op, left, right } => {
            binary(*op, eval(db, left, env), eval(db, right, env))
        }
        Expr::Unary { op, operand } => {
            let v = eval(db, operand, env);
            match op {
                UnaryOp::IsNull => Value::Bool(v == Value::Null),
                UnaryOp::IsNotNull => Value::Bool(v != Value::Null),
                UnaryOp::Not => match v {
                    Value::Bool(b) => Value::Bool(!b),
                    _ => Value::Null,
                },
                UnaryOp::Negate => match v {
                    Value::Int(n) => Value::Int(-n),
                    Value::Double(d) => Value::Double(-d),
                    _ => Value::Null,
                },
            }
        }
        Expr::Like { expr, pattern } => match (eval(db, expr, env), eval(db, pattern, env)) {
            (Value::Text(s), Value::Text(p)) => Value::Bool(like(&s, &p)),
            _ => Value::Null,
        },
        Expr::In {
            expr,
            subquery,
            negated,
        } => {
            let v = eval(db, expr, env);
            let found = single_column(eval_select(db, subquery, env))
                .iter()
                .any(|r| r[0] == v);
            Value::Bool(found != *negated)
        }
        Expr::ScalarSubquery(sub) => single_column(eval_select(db, sub, env))
            .first()
            .map_or(Value::Null, |r| r[0].clone()),
        Expr::Exists { subquery, negated } => {
            Value::Bool(eval_select(db, subquery, env).rows.is_empty() == *negated)
        }
        Expr::MethodCall(call) => {
            let instance = call.instance.as_ref().map(|i| eval(db, i, env));
            let args: Vec<Value> = call.args.iter().map(|a| eval(db, a, env)).collect();
            reference_method(call.method, instance, &args)
        }
        Expr::RowNumber { .. } => panic!("row numbers are only evaluated as projections"),
        Expr::Fragment { sql, .. } => panic!("cannot evaluate SQL fragment '{sql}'"),
    }
}

/// Rows of a subquery that must produce exactly one column.
fn single_column(relation: Relation) -> Vec<Vec<Value>> {
    assert_eq!(
        relation.columns.len(),
        1,
        "subquery must produce one column, got {:?}",
        relation.columns
    );
    relation.rows
}

fn binary(op: BinaryOp, l: Value, r: Value) -> Value {
    match op {
        BinaryOp::And => match (l, r) {
            (Value::Bool(false), _) | (_, Value::Bool(false)) => Value::Bool(false),
            (Value::Bool(true), Value::Bool(true)) => Value::Bool(true),
            _ => Value::Null,
        },
        BinaryOp::Or => match (l, r) {
            (Value::Bool(true), _) | (_, Value::Bool(true)) => Value::Bool(true),
            (Value::Bool(false), Value::Bool(false)) => Value::Bool(false),
            _ => Value::Null,
        },
        _ if l == Value::Null || r == Value::Null => Value::Null,
        BinaryOp::Eq => Value::Bool(compare_values(&l, &r) == CmpOrdering::Equal),
        BinaryOp::NotEq => Value::Bool(compare_values(&l, &r) != CmpOrdering::Equal),
        BinaryOp::Lt => Value::Bool(compare_values(&l, &r) == CmpOrdering::Less),
        BinaryOp::LtEq => Value::Bool(compare_values(&l, &r) != CmpOrdering::Greater),
        BinaryOp::Gt => Value::Bool(compare_values(&l, &r) == CmpOrdering::Greater),
        BinaryOp::GtEq => Value::Bool(compare_values(&l, &r) != CmpOrdering::Less),
        BinaryOp::Add | BinaryOp::Subtract | BinaryOp::Multiply | BinaryOp::Divide => {
            match (&l, &r) {
                (Value::Int(a), Value::Int(b)) => Value::Int(match op {
                    BinaryOp::Add => a + b,
                    BinaryOp::Subtract => a - b,
                    BinaryOp::Multiply => a * b,
                    _ => a / b,
                }),
                _ => {
                    let a = as_f64(&l).unwrap_or(f64::NAN);
                    let b = as_f64(&r).unwrap_or(f64::NAN);
                    Value::Double(match op {
                        BinaryOp::Add => a + b,
                        BinaryOp::Subtract => a - b,
                        BinaryOp::Multiply => a * b,
                        _ => a / b,
                    })
                }
            }
        }
    }
}

/// `%` any run, `_` one char, `[x]` a literal or class.
fn like(s: &str, pattern: &str) -> bool {
    enum Token {
        Any,
        One,
        Class(Vec<char>),
    }
    let mut tokens = Vec::new();
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        tokens.push(match c {
            '%' => Token::Any,
            '_' => Token::One,
            '[' => Token::Class(chars.by_ref().take_while(|c| *c != ']').collect()),
            other => Token::Class(vec![other]),
        });
    }
    fn matches(s: &[char], t: &[Token]) -> bool {
        match t.split_first() {
            None => s.is_empty(),
            Some((Token::Any, rest)) => (0..=s.len()).any(|i| matches(&s[i..], rest)),
            Some((Token::One, rest)) => !s.is_empty() && matches(&s[1..], rest),
            Some((Token::Class(set), rest)) => {
                !s.is_empty() && set.contains(&s[0]) && matches(&s[1..], rest)
            }
        }
    }
    let s: Vec<char> = s.chars().collect();
    matches(&s, &tokens)
}

fn text(v: &Value) -> Option<Vec<char>> {
    match v {
        Value::Text(s) => Some(s.chars().collect()),
        _ => None,
    }
}

fn int(v: &Value) -> Option<i64> {
    match v {
        Value::Int(n) => Some(*n),
        _ => None,
    }
}

/// 0-based index of `needle` in `hay` at or after `from`.
fn find(hay: &[char], needle: &[char], from: usize) -> Option<usize> {
    if needle.is_empty() {
        return (from <= hay.len()).then_some(from);
    }
    (from..hay.len())
        .find(|&i| hay.len() - i >= needle.len() && hay[i..i + needle.len()] == *needle)
}

fn plain(v: &Value) -> String {
    match v {
        Value::Text(s) => s.clone(),
        _ => String::new(),
    }
}

fn string(chars: &[char]) -> Value {
    Value::Text(chars.iter().collect())
}

/// Dialect functions, 1-based.
fn call_function(name: &str, args: &[Value]) -> Value {
    if name == "COALESCE" {
        return args
            .iter()
            .find(|v| **v != Value::Null)
            .cloned()
            .unwrap_or(Value::Null);
    }
    if args.iter().any(|v| *v == Value::Null) {
        return Value::Null;
    }
    match (name, args) {
        ("INSTR", [start, s, search, ..]) => {
            let s = text(s).unwrap_or_default();
            let search = text(search).unwrap_or_default();
            let start = int(start).unwrap_or(1);
            let from = (start.max(1) - 1) as usize;
            if from > s.len() {
                return Value::Int(0);
            }
            Value::Int(find(&s, &search, from).map_or(0, |i| i as i64 + 1))
        }
        ("LEN", [s]) => Value::Int(text(s).map_or(0, |c| c.len() as i64)),
        ("MID", [s, start, len]) => {
            let s = text(s).unwrap_or_default();
            let from = (int(start).unwrap_or(1).max(1) - 1) as usize;
            let len = int(len).unwrap_or(0).max(0) as usize;
            if from >= s.len() {
                return Value::Text(String::new());
            }
            string(&s[from..(from + len).min(s.len())])
        }
        ("LEFT", [s, n]) => {
            let s = text(s).unwrap_or_default();
            string(&s[..(int(n).unwrap_or(0).max(0) as usize).min(s.len())])
        }
        ("RIGHT", [s, n]) => {
            let s = text(s).unwrap_or_default();
            let n = (int(n).unwrap_or(0).max(0) as usize).min(s.len());
            string(&s[s.len() - n..])
        }
        ("UCASE", [s]) => Value::Text(plain(s).to_uppercase()),
        ("LCASE", [s]) => Value::Text(plain(s).to_lowercase()),
        ("TRIM", [s]) => Value::Text(plain(s).trim().to_string()),
        ("LTRIM", [s]) => Value::Text(plain(s).trim_start().to_string()),
        ("RTRIM", [s]) => Value::Text(plain(s).trim_end().to_string()),
        ("REPLACE", [Value::Text(s), Value::Text(from), Value::Text(to)]) => {
            if from.is_empty() {
                Value::Text(s.clone())
            } else {
                Value::Text(s.replace(from.as_str(), to))
            }
        }
        ("CDBL", [v]) => as_f64(v).map_or(Value::Null, Value::Double),
        (other, _) => panic!("unknown dialect function {other}"),
    }
}

/// Abstract string methods, 0-based.
fn reference_method(method: StringMethod, instance: Option<Value>, args: &[Value]) -> Value {
    let subject = instance
        .or_else(|| args.first().cloned())
        .unwrap_or(Value::Null);
    match method {
        StringMethod::IsNullOrEmpty => {
            return Value::Bool(plain(&subject).is_empty());
        }
        StringMethod::IsNullOrWhiteSpace => {
            return Value::Bool(match &subject {
                Value::Text(s) => s.trim().is_empty(),
                _ => true,
            });
        }
        _ => {}
    }
    let Some(s) = text(&subject) else {
        return Value::Null;
    };
    let arg_text = |i: usize| args.get(i).and_then(text);
    match method {
        StringMethod::IndexOf => {
            let Some(needle) = arg_text(0) else {
                return Value::Null;
            };
            let from = args.get(1).and_then(int).unwrap_or(0) as usize;
            Value::Int(find(&s, &needle, from).map_or(-1, |i| i as i64))
        }
        StringMethod::Replace => match (arg_text(0), arg_text(1)) {
            (Some(from), Some(to)) => {
                let s: String = s.iter().collect();
                let from: String = from.iter().collect();
                let to: String = to.iter().collect();
                Value::Text(if from.is_empty() { s } else { s.replace(&from, &to) })
            }
            _ => Value::Null,
        },
        StringMethod::Trim => Value::Text(plain(&subject).trim().to_string()),
        StringMethod::TrimStart => Value::Text(plain(&subject).trim_start().to_string()),
        StringMethod::TrimEnd => Value::Text(plain(&subject).trim_end().to_string()),
        StringMethod::ToLower => Value::Text(plain(&subject).to_lowercase()),
        StringMethod::ToUpper => Value::Text(plain(&subject).to_uppercase()),
        StringMethod::Substring => {
            let start = (args.first().and_then(int).unwrap_or(0).max(0) as usize).min(s.len());
            let end = match args.get(1).and_then(int) {
                Some(len) => (start + len.max(0) as usize).min(s.len()),
                None => s.len(),
            };
            string(&s[start..end])
        }
        StringMethod::FirstOrDefault => string(&s[..s.len().min(1)]),
        StringMethod::LastOrDefault => string(&s[s.len().saturating_sub(1)..]),
        StringMethod::Contains => {
            arg_text(0).map_or(Value::Null, |n| Value::Bool(find(&s, &n, 0).is_some()))
        }
        StringMethod::StartsWith => {
            arg_text(0).map_or(Value::Null, |n| Value::Bool(s.starts_with(&n)))
        }
        StringMethod::EndsWith => {
            arg_text(0).map_or(Value::Null, |n| Value::Bool(s.ends_with(&n)))
        }
        StringMethod::Length => Value::Int(s.len() as i64),
        StringMethod::IsNullOrEmpty | StringMethod::IsNullOrWhiteSpace => unreachable!(),
    }
}
