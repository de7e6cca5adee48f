//! Traversal helpers over `Select` trees.
//!
//! Passes rebuild trees bottom-up: every nested select (derived tables,
//! set-operation arms, join sources, and subqueries inside expressions) is
//! rewritten before its parent, so a parent always sees final descendants.

use std::collections::HashSet;

use crate::error::RewriteError;
use crate::tree::{Expr, Ordering, Projection, Select, TableSource};

/// The expression slots owned directly by `select`, including join
/// conditions. Expressions of nested selects are not included.
pub fn node_expressions(select: &Select) -> Vec<&Expr> {
    let mut out: Vec<&Expr> = select.projection.iter().map(|p| &p.expr).collect();
    for table in &select.tables {
        collect_join_conditions(table, &mut out);
    }
    out.extend(select.predicate.iter());
    out.extend(select.group_by.iter());
    out.extend(select.having.iter());
    out.extend(select.orderings.iter().map(|o| &o.expr));
    out.extend(select.limit.iter());
    out.extend(select.offset.iter());
    out
}

fn collect_join_conditions<'a>(table: &'a TableSource, out: &mut Vec<&'a Expr>) {
    if let TableSource::Join {
        source, condition, ..
    } = table
    {
        out.extend(condition.iter());
        collect_join_conditions(source, out);
    }
}

/// Where a select sits in its parent, as far as its outputs are concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectContext {
    /// The root of the tree.
    Root,
    /// A derived table in a FROM list or join.
    DerivedTable,
    /// One arm of a set operation; its column count must match the other arm.
    SetOperationArm,
    /// A scalar subquery or the subquery of `IN`: exactly one output column.
    SingleColumn,
    /// The subquery of `EXISTS`; its outputs are never read.
    Exists,
}

impl SelectContext {
    /// Whether the enclosing construct fixes the number of output columns.
    pub fn fixes_width(self) -> bool {
        matches!(self, SelectContext::SetOperationArm | SelectContext::SingleColumn)
    }
}

/// Apply `f` to every select of the tree, innermost first, and return the
/// rebuilt root.
pub fn rewrite_selects_bottom_up<F>(select: Select, f: &mut F) -> Result<Select, RewriteError>
where
    F: FnMut(Select) -> Result<Select, RewriteError>,
{
    rewrite_selects_in_context(select, SelectContext::Root, &mut |s, _| f(s))
}

/// Like [`rewrite_selects_bottom_up`], but also tells `f` where each select
/// sits in its parent.
pub fn rewrite_selects_in_context<F>(
    select: Select,
    context: SelectContext,
    f: &mut F,
) -> Result<Select, RewriteError>
where
    F: FnMut(Select, SelectContext) -> Result<Select, RewriteError>,
{
    let tables = select
        .tables
        .into_iter()
        .map(|t| rewrite_table(t, f))
        .collect::<Result<Vec<_>, _>>()?;

    let mut nested = |e: Expr| rewrite_expr_subqueries(e, &mut *f);
    let rebuilt = Select {
        tables,
        ..select
    }
    .map_expressions(&mut nested)?;

    f(rebuilt, context)
}

fn rewrite_table<F>(table: TableSource, f: &mut F) -> Result<TableSource, RewriteError>
where
    F: FnMut(Select, SelectContext) -> Result<Select, RewriteError>,
{
    Ok(match table {
        TableSource::Subquery(select) => TableSource::Subquery(Box::new(
            rewrite_selects_in_context(*select, SelectContext::DerivedTable, f)?,
        )),
        TableSource::SetOperation {
            kind,
            left,
            right,
            alias,
        } => TableSource::SetOperation {
            kind,
            left: Box::new(rewrite_selects_in_context(
                *left,
                SelectContext::SetOperationArm,
                f,
            )?),
            right: Box::new(rewrite_selects_in_context(
                *right,
                SelectContext::SetOperationArm,
                f,
            )?),
            alias,
        },
        TableSource::Join {
            kind,
            source,
            condition,
        } => TableSource::Join {
            kind,
            source: Box::new(rewrite_table(*source, f)?),
            condition,
        },
        table @ TableSource::Table { .. } => table,
    })
}

/// Rewrite the selects nested inside one expression (not the expression's
/// own operators).
fn rewrite_expr_subqueries<F>(expr: Expr, f: &mut F) -> Result<Expr, RewriteError>
where
    F: FnMut(Select, SelectContext) -> Result<Select, RewriteError>,
{
    expr.transform_up(&mut |e| {
        Ok(match e {
            Expr::ScalarSubquery(sub) => Expr::ScalarSubquery(Box::new(
                rewrite_selects_in_context(*sub, SelectContext::SingleColumn, &mut *f)?,
            )),
            Expr::Exists { subquery, negated } => Expr::Exists {
                subquery: Box::new(rewrite_selects_in_context(
                    *subquery,
                    SelectContext::Exists,
                    &mut *f,
                )?),
                negated,
            },
            Expr::In {
                expr,
                subquery,
                negated,
            } => Expr::In {
                expr,
                subquery: Box::new(rewrite_selects_in_context(
                    *subquery,
                    SelectContext::SingleColumn,
                    &mut *f,
                )?),
                negated,
            },
            other => other,
        })
    })
}

impl Select {
    /// Rebuild every expression slot owned by this node (see
    /// [`node_expressions`]) with `f`. Nested selects are not visited.
    pub fn map_expressions<F>(self, f: &mut F) -> Result<Select, RewriteError>
    where
        F: FnMut(Expr) -> Result<Expr, RewriteError>,
    {
        let projection = self
            .projection
            .into_iter()
            .map(|p| {
                Ok(Projection {
                    expr: f(p.expr)?,
                    alias: p.alias,
                })
            })
            .collect::<Result<Vec<_>, RewriteError>>()?;
        let tables = self
            .tables
            .into_iter()
            .map(|t| map_join_conditions(t, f))
            .collect::<Result<Vec<_>, _>>()?;
        let orderings = self
            .orderings
            .into_iter()
            .map(|o| {
                Ok(Ordering {
                    expr: f(o.expr)?,
                    ascending: o.ascending,
                })
            })
            .collect::<Result<Vec<_>, RewriteError>>()?;

        Ok(Select {
            alias: self.alias,
            projection,
            tables,
            predicate: self.predicate.map(&mut *f).transpose()?,
            group_by: self.group_by.into_iter().map(&mut *f).collect::<Result<_, _>>()?,
            having: self.having.map(&mut *f).transpose()?,
            orderings,
            limit: self.limit.map(&mut *f).transpose()?,
            offset: self.offset.map(&mut *f).transpose()?,
            distinct: self.distinct,
        })
    }
}

fn map_join_conditions<F>(table: TableSource, f: &mut F) -> Result<TableSource, RewriteError>
where
    F: FnMut(Expr) -> Result<Expr, RewriteError>,
{
    Ok(match table {
        TableSource::Join {
            kind,
            source,
            condition,
        } => TableSource::Join {
            kind,
            source: Box::new(map_join_conditions(*source, f)?),
            condition: condition.map(&mut *f).transpose()?,
        },
        other => other,
    })
}

/// Every alias used anywhere in the tree: select aliases, table aliases and
/// set-operation aliases.
pub fn collect_aliases(select: &Select) -> HashSet<String> {
    let mut out = HashSet::new();
    collect_select_aliases(select, &mut out);
    out
}

fn collect_select_aliases(select: &Select, out: &mut HashSet<String>) {
    out.insert(select.alias.clone());
    for table in &select.tables {
        collect_table_aliases(table, out);
    }
    for expr in node_expressions(select) {
        collect_expr_aliases(expr, out);
    }
}

fn collect_table_aliases(table: &TableSource, out: &mut HashSet<String>) {
    match table {
        TableSource::Table { alias, .. } => {
            out.insert(alias.clone());
        }
        TableSource::Subquery(select) => collect_select_aliases(select, out),
        TableSource::SetOperation {
            left, right, alias, ..
        } => {
            out.insert(alias.clone());
            collect_select_aliases(left, out);
            collect_select_aliases(right, out);
        }
        TableSource::Join { source, .. } => collect_table_aliases(source, out),
    }
}

fn collect_expr_aliases(expr: &Expr, out: &mut HashSet<String>) {
    match expr {
        Expr::ScalarSubquery(sub) | Expr::Exists { subquery: sub, .. } => {
            collect_select_aliases(sub, out)
        }
        Expr::In { expr, subquery, .. } => {
            collect_expr_aliases(expr, out);
            collect_select_aliases(subquery, out);
        }
        other => {
            for child in other.children() {
                collect_expr_aliases(child, out);
            }
        }
    }
}
