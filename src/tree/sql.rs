//! Debug rendering of trees as dialect SQL text.
//!
//! Final SQL generation belongs to the host. This renderer exists for
//! logging and for tests that want to eyeball a rewritten tree; it renders
//! row limits as `TOP n` and leaves any unemulated OFFSET visible.

use crate::tree::{
    Expr, JoinKind, Ordering, Select, SetOpKind, TableSource, UnaryOp, Value,
};

/// Quote an identifier with brackets, doubling any embedded `]`.
pub fn quote_ident(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

/// Render a string literal, doubling embedded quotes.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

impl Expr {
    /// Convert expression to SQL text.
    pub fn to_sql(&self) -> String {
        match self {
            Expr::Column(c) => format!("{}.{}", quote_ident(&c.table_alias), quote_ident(&c.name)),
            Expr::Constant { value, .. } => value_sql(value),
            Expr::Function(f) => {
                let args: Vec<String> = f.args.iter().map(|a| a.to_sql()).collect();
                format!("{}({})", f.name, args.join(", "))
            }
            Expr::Case(case) => {
                let mut sql = String::from("CASE");
                if let Some(op) = &case.operand {
                    sql.push(' ');
                    sql.push_str(&op.to_sql());
                }
                for w in &case.when_clauses {
                    sql.push_str(&format!(" WHEN {} THEN {}", w.test.to_sql(), w.result.to_sql()));
                }
                if let Some(e) = &case.else_result {
                    sql.push_str(&format!(" ELSE {}", e.to_sql()));
                }
                sql.push_str(" END");
                sql
            }
            Expr::Binary { op, left, right } => {
                format!("({} {} {})", left.to_sql(), op.sql(), right.to_sql())
            }
            Expr::Unary { op, operand } => match op {
                UnaryOp::Not => format!("NOT ({})", operand.to_sql()),
                UnaryOp::IsNull => format!("{} IS NULL", operand.to_sql()),
                UnaryOp::IsNotNull => format!("{} IS NOT NULL", operand.to_sql()),
                UnaryOp::Negate => format!("-{}", operand.to_sql()),
            },
            Expr::Like { expr, pattern } => format!("{} LIKE {}", expr.to_sql(), pattern.to_sql()),
            Expr::In {
                expr,
                subquery,
                negated,
            } => format!(
                "{}{} IN ({})",
                expr.to_sql(),
                if *negated { " NOT" } else { "" },
                subquery.to_sql()
            ),
            Expr::ScalarSubquery(sub) => format!("({})", sub.to_sql()),
            Expr::Exists { subquery, negated } => format!(
                "{}EXISTS ({})",
                if *negated { "NOT " } else { "" },
                subquery.to_sql()
            ),
            Expr::MethodCall(call) => {
                let mut args: Vec<String> = Vec::new();
                if let Some(i) = &call.instance {
                    args.push(i.to_sql());
                }
                args.extend(call.args.iter().map(|a| a.to_sql()));
                format!("<{:?}>({})", call.method, args.join(", "))
            }
            Expr::RowNumber { orderings } => {
                format!("ROW_NUMBER() OVER (ORDER BY {})", orderings_sql(orderings))
            }
            Expr::Fragment { sql, .. } => sql.clone(),
        }
    }
}

fn value_sql(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        Value::Int(n) => n.to_string(),
        Value::Double(d) => d.to_string(),
        Value::Text(s) => quote_literal(s),
        Value::DateTime(dt) => format!("#{}#", dt.format("%m/%d/%Y %H:%M:%S")),
        Value::Chars(chars) => quote_literal(&chars.iter().collect::<String>()),
    }
}

fn orderings_sql(orderings: &[Ordering]) -> String {
    orderings
        .iter()
        .map(|o| format!("{}{}", o.expr.to_sql(), if o.ascending { "" } else { " DESC" }))
        .collect::<Vec<_>>()
        .join(", ")
}

impl TableSource {
    pub fn to_sql(&self) -> String {
        match self {
            TableSource::Table {
                name,
                schema,
                alias,
            } => {
                let qualified = match schema {
                    Some(s) => format!("{}.{}", quote_ident(s), quote_ident(name)),
                    None => quote_ident(name),
                };
                format!("{qualified} AS {}", quote_ident(alias))
            }
            TableSource::Subquery(select) => {
                format!("({}) AS {}", select.to_sql(), quote_ident(&select.alias))
            }
            TableSource::SetOperation {
                kind,
                left,
                right,
                alias,
            } => {
                let op = match kind {
                    SetOpKind::Union => "UNION",
                    SetOpKind::UnionAll => "UNION ALL",
                    SetOpKind::Intersect => "INTERSECT",
                    SetOpKind::Except => "EXCEPT",
                };
                format!(
                    "(({}) {op} ({})) AS {}",
                    left.to_sql(),
                    right.to_sql(),
                    quote_ident(alias)
                )
            }
            TableSource::Join {
                kind,
                source,
                condition,
            } => {
                let join = match kind {
                    JoinKind::Inner => "INNER JOIN",
                    JoinKind::Left => "LEFT JOIN",
                    JoinKind::Cross => "CROSS JOIN",
                };
                match condition {
                    Some(c) => format!("{join} {} ON {}", source.to_sql(), c.to_sql()),
                    None => format!("{join} {}", source.to_sql()),
                }
            }
        }
    }
}

impl Select {
    /// Render the node as SQL text.
    pub fn to_sql(&self) -> String {
        let mut sql = String::from("SELECT ");
        if self.distinct {
            sql.push_str("DISTINCT ");
        }
        if let Some(limit) = &self.limit {
            sql.push_str(&format!("TOP {} ", limit.to_sql()));
        }
        if self.projection.is_empty() {
            sql.push('1');
        } else {
            let cols: Vec<String> = self
                .projection
                .iter()
                .map(|p| format!("{} AS {}", p.expr.to_sql(), quote_ident(&p.alias)))
                .collect();
            sql.push_str(&cols.join(", "));
        }
        if !self.tables.is_empty() {
            let mut from = String::new();
            for (i, t) in self.tables.iter().enumerate() {
                match t {
                    TableSource::Join { .. } => from.push(' '),
                    _ if i > 0 => from.push_str(", "),
                    _ => {}
                }
                from.push_str(&t.to_sql());
            }
            sql.push_str(&format!(" FROM {from}"));
        }
        if let Some(p) = &self.predicate {
            sql.push_str(&format!(" WHERE {}", p.to_sql()));
        }
        if !self.group_by.is_empty() {
            let g: Vec<String> = self.group_by.iter().map(|e| e.to_sql()).collect();
            sql.push_str(&format!(" GROUP BY {}", g.join(", ")));
        }
        if let Some(h) = &self.having {
            sql.push_str(&format!(" HAVING {}", h.to_sql()));
        }
        if !self.orderings.is_empty() {
            sql.push_str(&format!(" ORDER BY {}", orderings_sql(&self.orderings)));
        }
        if let Some(offset) = &self.offset {
            sql.push_str(&format!(" OFFSET {}", offset.to_sql()));
        }
        sql
    }
}
