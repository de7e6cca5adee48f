//! OFFSET emulation.
//!
//! The target dialect has `TOP n` but no OFFSET. A node with an offset is
//! pushed down into a derived table that numbers its rows under the node's
//! ordering and keeps the first `offset + limit` of them; the outer node
//! keeps the rows numbered past the offset.
//!
//! ```sql
//! -- Input:
//! SELECT c.id, c.name FROM Customers c ORDER BY c.name OFFSET 2 LIMIT 3
//! -- Rewrite to:
//! SELECT TOP 3 t0.id, t0.name
//! FROM (SELECT TOP 5 c.id, c.name,
//!              ROW_NUMBER() OVER (ORDER BY c.name) AS __row_number
//!       FROM Customers c ORDER BY c.name) AS t0
//! WHERE t0.__row_number > 2 AND t0.__row_number <= 5
//! ORDER BY t0.name
//! ```
//!
//! A limit without an offset is left alone; `TOP n` covers it.
//!
//! A DISTINCT or grouped node is first pushed down as it is, so the rows are
//! numbered after duplicates are removed and groups are formed:
//!
//! ```sql
//! -- Input:
//! SELECT DISTINCT c.city FROM Customers c ORDER BY c.city OFFSET 1 LIMIT 2
//! -- Rewrite to:
//! SELECT TOP 2 t1.city
//! FROM (SELECT TOP 3 t0.city,
//!              ROW_NUMBER() OVER (ORDER BY t0.city) AS __row_number
//!       FROM (SELECT DISTINCT c.city FROM Customers c) AS t0
//!       ORDER BY t0.city) AS t1
//! WHERE t1.__row_number > 1 AND t1.__row_number <= 3
//! ORDER BY t1.city
//! ```

use crate::config::QuerySplittingBehavior;
use crate::error::RewriteError;
use crate::passes::{RewriteContext, restore_width};
use crate::tree::visit::{SelectContext, rewrite_selects_in_context};
use crate::tree::{BinaryOp, Expr, Ordering, Projection, Select, Value};

/// Name of the synthetic sequence column (suffixed when already taken).
pub const ROW_NUMBER_COLUMN: &str = "__row_number";

/// Emulate OFFSET on every node of `tree`, innermost first.
pub fn emulate_pagination(
    tree: Select,
    ctx: &mut RewriteContext,
    splitting: QuerySplittingBehavior,
) -> Result<Select, RewriteError> {
    rewrite_selects_in_context(tree, SelectContext::Root, &mut |node, context| {
        let width = node.projection.len();
        let node = emulate_node(node, ctx, splitting)?;
        Ok(restore_width(node, width, context, ctx))
    })
}

/// A sort key of the paginated node, as the outer node will see it.
enum SortColumn {
    /// Projection index inside the pushed-down node.
    Projected(usize),
    /// A column of an enclosing scope; usable unchanged.
    Outer(Expr),
}

/// Emulate OFFSET on one node.
pub fn emulate_node(
    node: Select,
    ctx: &mut RewriteContext,
    splitting: QuerySplittingBehavior,
) -> Result<Select, RewriteError> {
    let Some(offset) = node.offset.clone() else {
        return Ok(node);
    };

    if node.orderings.is_empty() {
        match splitting {
            QuerySplittingBehavior::SplitQuery => {
                return Err(RewriteError::UnsupportedConstruct(format!(
                    "OFFSET without ORDER BY in select '{}' of a split query",
                    node.alias
                )));
            }
            QuerySplittingBehavior::SingleQuery => {
                tracing::warn!(
                    alias = %node.alias,
                    "OFFSET without ORDER BY; the returned rows are not deterministic"
                );
            }
        }
    }

    let mut node = if node.distinct || !node.group_by.is_empty() || node.having.is_some() {
        isolate_row_source(node, ctx)?
    } else {
        node
    };
    node.offset = None;
    let limit = node.limit.take();
    let orderings = node.orderings.clone();

    let sort_columns: Vec<SortColumn> = orderings
        .iter()
        .map(|o| match &o.expr {
            Expr::Column(c) if !node.owns_alias(&c.table_alias) => {
                SortColumn::Outer(o.expr.clone())
            }
            _ => SortColumn::Projected(node.add_to_projection(o.expr.clone())),
        })
        .collect();

    let row_number_alias = node.unique_projection_alias(ROW_NUMBER_COLUMN);
    node.projection.push(Projection::new(
        Expr::RowNumber {
            orderings: orderings.clone(),
        },
        row_number_alias,
    ));
    let row_number_index = node.projection.len() - 1;

    let window_end = limit.as_ref().map(|l| add_counts(&offset, l));
    node.limit = window_end.clone();

    let inner_alias = ctx.next_alias("t");
    let mut outer = node.pushdown_into_subquery(inner_alias);

    // The sequence number filters rows but is not an output.
    let row_number = outer.projection.remove(row_number_index).expr;

    outer.predicate = Expr::and_all(
        std::iter::once(Expr::binary(BinaryOp::Gt, row_number.clone(), offset))
            .chain(window_end.map(|end| Expr::binary(BinaryOp::LtEq, row_number, end))),
    );
    let rebuilt = rebuild_orderings(&outer, &orderings, sort_columns)?;
    outer.orderings = rebuilt;
    outer.limit = limit;

    tracing::debug!(alias = %outer.alias, "emulated OFFSET with row numbering");
    tracing::trace!(sql = %outer.to_sql(), "paginated select");

    Ok(outer)
}

/// Push a DISTINCT or grouped node down whole, so the caller numbers its
/// finished rows. Sort keys are projected by the pushed-down node and
/// rebuilt against its outputs; ordering, limit and offset move to the
/// returned wrapper.
fn isolate_row_source(node: Select, ctx: &mut RewriteContext) -> Result<Select, RewriteError> {
    let mut node = node;
    let orderings = std::mem::take(&mut node.orderings);
    let limit = node.limit.take();
    let offset = node.offset.take();

    let sort_columns: Vec<SortColumn> = orderings
        .iter()
        .map(|o| match &o.expr {
            Expr::Column(c) if !node.owns_alias(&c.table_alias) => {
                SortColumn::Outer(o.expr.clone())
            }
            _ => SortColumn::Projected(node.add_to_projection(o.expr.clone())),
        })
        .collect();

    let mut outer = node.pushdown_into_subquery(ctx.next_alias("t"));
    let rebuilt = rebuild_orderings(&outer, &orderings, sort_columns)?;
    outer.orderings = rebuilt;
    outer.limit = limit;
    outer.offset = offset;
    Ok(outer)
}

/// `orderings` re-expressed against the projection of `outer`.
fn rebuild_orderings(
    outer: &Select,
    orderings: &[Ordering],
    sort_columns: Vec<SortColumn>,
) -> Result<Vec<Ordering>, RewriteError> {
    orderings
        .iter()
        .zip(sort_columns)
        .map(|(ordering, column)| {
            let expr = match column {
                SortColumn::Outer(expr) => expr,
                SortColumn::Projected(index) => outer
                    .projection
                    .get(index)
                    .map(|p| p.expr.clone())
                    .ok_or_else(|| {
                        RewriteError::InternalError(format!(
                            "pagination sort key {index} missing from select '{}'",
                            outer.alias
                        ))
                    })?,
            };
            Ok(Ordering {
                expr,
                ascending: ordering.ascending,
            })
        })
        .collect()
}

/// `offset + limit`, folded when both are integer literals.
fn add_counts(offset: &Expr, limit: &Expr) -> Expr {
    match (offset, limit) {
        (
            Expr::Constant {
                value: Value::Int(o),
                data_type,
            },
            Expr::Constant {
                value: Value::Int(l),
                ..
            },
        ) => Expr::Constant {
            value: Value::Int(o.saturating_add(*l)),
            data_type: *data_type,
        },
        _ => Expr::binary(BinaryOp::Add, offset.clone(), limit.clone()),
    }
}
