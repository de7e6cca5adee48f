//! Query tree model shared by every pass.
//!
//! A query is a tree of [`Select`] nodes. Each node owns its projection,
//! its table sources (base tables, joins, nested selects, set operations),
//! its clauses, and the alias it is known by in the enclosing scope.
//!
//! Trees are plain values. A pass takes a tree by value and returns either
//! the same value or a rebuilt one; nothing is mutated behind another pass's
//! back. Within a pass, nodes are rebuilt with struct-update syntax or with
//! the two structural primitives every pass relies on:
//!
//! - [`Select::add_to_projection`]: idempotent append to the output list.
//! - [`Select::pushdown_into_subquery`]: wrap the node in a new inner scope
//!   and re-project its outputs by reference.

pub mod expr;
pub mod sql;
pub mod visit;

pub use expr::{
    BinaryOp, CaseExpr, ColumnRef, Expr, FunctionCall, MethodCall, SqlType, StringMethod,
    UnaryOp, Value, WhenClause,
};

use crate::error::RewriteError;
use std::collections::{HashMap, HashSet};

/// One output column: expression plus output name.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    pub expr: Expr,
    pub alias: String,
}

impl Projection {
    pub fn new(expr: Expr, alias: impl Into<String>) -> Self {
        Projection {
            expr,
            alias: alias.into(),
        }
    }
}

/// Sort key for ORDER BY (and for row numbering).
#[derive(Debug, Clone, PartialEq)]
pub struct Ordering {
    pub expr: Expr,
    pub ascending: bool,
}

impl Ordering {
    pub fn asc(expr: Expr) -> Self {
        Ordering {
            expr,
            ascending: true,
        }
    }

    pub fn desc(expr: Expr) -> Self {
        Ordering {
            expr,
            ascending: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Cross,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOpKind {
    Union,
    UnionAll,
    Intersect,
    Except,
}

/// An entry of a node's FROM list.
#[derive(Debug, Clone, PartialEq)]
pub enum TableSource {
    /// Base table.
    Table {
        name: String,
        schema: Option<String>,
        alias: String,
    },
    /// Derived table; the alias is the nested select's own alias.
    Subquery(Box<Select>),
    /// `(left) UNION|... (right) AS alias`; output names come from `left`.
    SetOperation {
        kind: SetOpKind,
        left: Box<Select>,
        right: Box<Select>,
        alias: String,
    },
    /// A join of `source` onto the preceding entries.
    Join {
        kind: JoinKind,
        source: Box<TableSource>,
        condition: Option<Expr>,
    },
}

impl TableSource {
    pub fn table(name: impl Into<String>, alias: impl Into<String>) -> Self {
        TableSource::Table {
            name: name.into(),
            schema: None,
            alias: alias.into(),
        }
    }

    /// The alias columns use to reference this source.
    pub fn alias(&self) -> &str {
        match self {
            TableSource::Table { alias, .. } => alias,
            TableSource::Subquery(select) => &select.alias,
            TableSource::SetOperation { alias, .. } => alias,
            TableSource::Join { source, .. } => source.alias(),
        }
    }

    /// Output column names when they are known from the tree itself.
    /// `None` for base tables, whose columns live in the host's metadata.
    pub fn output_names(&self) -> Option<Vec<String>> {
        match self {
            TableSource::Table { .. } => None,
            TableSource::Subquery(select) => Some(select.output_names()),
            TableSource::SetOperation { left, .. } => Some(left.output_names()),
            TableSource::Join { source, .. } => source.output_names(),
        }
    }
}

/// A SELECT-equivalent query node.
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    /// Name of the node in the enclosing scope.
    pub alias: String,
    pub projection: Vec<Projection>,
    pub tables: Vec<TableSource>,
    pub predicate: Option<Expr>,
    pub group_by: Vec<Expr>,
    pub having: Option<Expr>,
    pub orderings: Vec<Ordering>,
    pub limit: Option<Expr>,
    pub offset: Option<Expr>,
    pub distinct: bool,
}

impl Select {
    /// An empty node with the given alias.
    pub fn new(alias: impl Into<String>) -> Self {
        Select {
            alias: alias.into(),
            projection: Vec::new(),
            tables: Vec::new(),
            predicate: None,
            group_by: Vec::new(),
            having: None,
            orderings: Vec::new(),
            limit: None,
            offset: None,
            distinct: false,
        }
    }

    pub fn with_projection(mut self, projection: Vec<Projection>) -> Self {
        self.projection = projection;
        self
    }

    pub fn with_tables(mut self, tables: Vec<TableSource>) -> Self {
        self.tables = tables;
        self
    }

    pub fn with_predicate(mut self, predicate: Option<Expr>) -> Self {
        self.predicate = predicate;
        self
    }

    pub fn with_orderings(mut self, orderings: Vec<Ordering>) -> Self {
        self.orderings = orderings;
        self
    }

    pub fn with_limit(mut self, limit: Option<Expr>) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: Option<Expr>) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_group_by(mut self, group_by: Vec<Expr>) -> Self {
        self.group_by = group_by;
        self
    }

    pub fn with_distinct(mut self, distinct: bool) -> Self {
        self.distinct = distinct;
        self
    }

    /// Output column names in projection order.
    pub fn output_names(&self) -> Vec<String> {
        self.projection.iter().map(|p| p.alias.clone()).collect()
    }

    /// Aliases of this node's own table sources.
    pub fn table_aliases(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.alias()).collect()
    }

    /// Whether `alias` names one of this node's own table sources.
    pub fn owns_alias(&self, alias: &str) -> bool {
        self.tables.iter().any(|t| t.alias() == alias)
    }

    /// Index of a projection whose expression is structurally equal to `expr`.
    pub fn projection_index_of(&self, expr: &Expr) -> Option<usize> {
        self.projection.iter().position(|p| &p.expr == expr)
    }

    /// Append `expr` to the projection unless a structurally equal entry
    /// already exists. Returns the index of the (existing or new) entry.
    pub fn add_to_projection(&mut self, expr: Expr) -> usize {
        if let Some(index) = self.projection_index_of(&expr) {
            return index;
        }
        let base = match &expr {
            Expr::Column(c) => c.name.as_str(),
            _ => "c",
        };
        let alias = self.unique_projection_alias(base);
        self.projection.push(Projection { expr, alias });
        self.projection.len() - 1
    }

    /// The first of `base`, `base0`, `base1`, ... not yet used by the
    /// projection.
    pub fn unique_projection_alias(&self, base: &str) -> String {
        let taken: HashSet<&str> = self.projection.iter().map(|p| p.alias.as_str()).collect();
        if !taken.contains(base) {
            return base.to_string();
        }
        (0..)
            .map(|i| format!("{base}{i}"))
            .find(|candidate| !taken.contains(candidate.as_str()))
            .unwrap_or_else(|| base.to_string())
    }

    /// Column reference to projection `index` as seen from a scope where
    /// this node is visible under `alias`.
    pub fn projection_column(&self, index: usize, alias: &str) -> Option<Expr> {
        self.projection.get(index).map(|p| {
            Expr::column(alias, &p.alias, p.expr.data_type(), p.expr.is_nullable())
        })
    }

    /// Wrap this node into a new inner select aliased `inner_alias`.
    ///
    /// The inner node carries everything the current node had (tables,
    /// predicate, grouping, distinct, and also its ordering / limit / offset
    /// so a row-limited body keeps its order). The returned outer node keeps
    /// the original alias, selects every projection of the inner node by
    /// reference, and has no predicate, grouping, ordering, limit or offset.
    ///
    /// Projection index `i` of the outer node refers to projection `i` of
    /// the inner node.
    pub fn pushdown_into_subquery(self, inner_alias: impl Into<String>) -> Select {
        let inner_alias = inner_alias.into();
        let projection = (0..self.projection.len())
            .filter_map(|i| {
                self.projection_column(i, &inner_alias)
                    .map(|expr| Projection::new(expr, &self.projection[i].alias))
            })
            .collect();
        let outer_alias = self.alias.clone();
        let inner = Select {
            alias: inner_alias,
            ..self
        };
        Select {
            projection,
            tables: vec![TableSource::Subquery(Box::new(inner))],
            ..Select::new(outer_alias)
        }
    }

    /// Check the structural invariants of the tree rooted here: table
    /// aliases are unique within a node, and every column reference resolves
    /// to a table source of its own node or of an enclosing one. Columns of
    /// a derived table must name one of its outputs.
    pub fn validate(&self) -> Result<(), RewriteError> {
        validate_select(self, &mut Vec::new())
    }
}

type Scope = HashMap<String, Option<Vec<String>>>;

fn validate_select(select: &Select, scopes: &mut Vec<Scope>) -> Result<(), RewriteError> {
    let mut scope: Scope = HashMap::new();
    for table in &select.tables {
        if scope
            .insert(table.alias().to_string(), table.output_names())
            .is_some()
        {
            return Err(RewriteError::InvariantViolation(format!(
                "duplicate table alias '{}' in select '{}'",
                table.alias(),
                select.alias
            )));
        }
    }

    // Derived tables see the enclosing scopes (outer references); the scope
    // of the node itself becomes visible for its expressions.
    for table in &select.tables {
        validate_table(table, scopes)?;
    }

    scopes.push(scope);
    let result = visit::node_expressions(select)
        .into_iter()
        .try_for_each(|e| validate_expr(e, scopes));
    scopes.pop();
    result
}

fn validate_table(table: &TableSource, scopes: &mut Vec<Scope>) -> Result<(), RewriteError> {
    match table {
        TableSource::Table { .. } => Ok(()),
        TableSource::Subquery(select) => validate_select(select, scopes),
        TableSource::SetOperation { left, right, .. } => {
            validate_select(left, scopes)?;
            validate_select(right, scopes)?;
            if left.projection.len() != right.projection.len() {
                return Err(RewriteError::InvariantViolation(format!(
                    "set operation arms '{}' and '{}' project different column counts",
                    left.alias, right.alias
                )));
            }
            Ok(())
        }
        TableSource::Join { source, .. } => validate_table(source, scopes),
    }
}

fn validate_expr(expr: &Expr, scopes: &mut Vec<Scope>) -> Result<(), RewriteError> {
    match expr {
        Expr::Column(c) => resolve_column(c, scopes),
        Expr::ScalarSubquery(sub) => {
            validate_select(sub, scopes)?;
            single_column(sub)
        }
        Expr::Exists { subquery, .. } => validate_select(subquery, scopes),
        Expr::In { expr, subquery, .. } => {
            validate_expr(expr, scopes)?;
            validate_select(subquery, scopes)?;
            single_column(subquery)
        }
        other => other
            .children()
            .into_iter()
            .try_for_each(|c| validate_expr(c, scopes)),
    }
}

fn single_column(subquery: &Select) -> Result<(), RewriteError> {
    match subquery.projection.len() {
        1 => Ok(()),
        n => Err(RewriteError::InvariantViolation(format!(
            "subquery '{}' must project one column, found {n}",
            subquery.alias
        ))),
    }
}

fn resolve_column(column: &ColumnRef, scopes: &[Scope]) -> Result<(), RewriteError> {
    // Innermost scope wins.
    for scope in scopes.iter().rev() {
        if let Some(outputs) = scope.get(&column.table_alias) {
            return match outputs {
                Some(names) if !names.iter().any(|n| n == &column.name) => {
                    Err(RewriteError::InvariantViolation(format!(
                        "column '{}.{}' is not an output of its source",
                        column.table_alias, column.name
                    )))
                }
                _ => Ok(()),
            };
        }
    }
    Err(RewriteError::InvariantViolation(format!(
        "dangling column reference '{}.{}'",
        column.table_alias, column.name
    )))
}
