//! ORDER BY legalization.
//!
//! The target dialect accepts a sort key only when it is an output column
//! or an expression it can evaluate directly over the node's own sources.
//! Two kinds of key break that rule once the query shape changes: columns of
//! the node's own tables that are not projected, and expressions that
//! contain a subquery. Such keys are lifted into the projection, the node is
//! pushed down into a derived table, and the ordering is rebuilt on the
//! outer node against the derived table's outputs.
//!
//! ```sql
//! -- Input:
//! SELECT c.id, c.name FROM Customers c ORDER BY c.city, c.name DESC
//! -- Rewrite to:
//! SELECT t0.id, t0.name, t0.city
//! FROM (SELECT c.id, c.name, c.city FROM Customers c) AS t0
//! ORDER BY t0.city, t0.name DESC
//! ```
//!
//! Where the enclosing construct fixes the column count (a scalar or `IN`
//! subquery, a set-operation arm), the lifted keys are hidden again by one
//! more wrapper that re-selects the original outputs:
//!
//! ```sql
//! (SELECT TOP 1 o.name FROM Orders o ORDER BY o.city)
//! -- Rewrite to:
//! (SELECT t1.name FROM (SELECT TOP 1 t0.name, t0.city
//!                       FROM (SELECT o.name, o.city FROM Orders o) AS t0
//!                       ORDER BY t0.city) AS t1)
//! ```

use crate::error::RewriteError;
use crate::passes::{RewriteContext, restore_width};
use crate::tree::visit::{SelectContext, rewrite_selects_in_context};
use crate::tree::{Expr, Ordering, Select};

/// How one sort key of a node is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SortKey {
    /// A bare column already in the projection at this index.
    Projected(usize),
    /// A column of an enclosing scope.
    OuterReference,
    /// An own column or subquery-bearing expression that must be lifted.
    Lift,
    /// Legal in place.
    Keep,
}

fn classify(node: &Select, ordering: &Ordering) -> SortKey {
    match &ordering.expr {
        Expr::Column(column) => match node.projection_index_of(&ordering.expr) {
            Some(index) => SortKey::Projected(index),
            None if !node.owns_alias(&column.table_alias) => SortKey::OuterReference,
            None => SortKey::Lift,
        },
        other if other.contains_subquery() => SortKey::Lift,
        _ => SortKey::Keep,
    }
}

/// Legalize the ORDER BY of every node in `tree`, innermost first.
pub fn legalize_order_by(tree: Select, ctx: &mut RewriteContext) -> Result<Select, RewriteError> {
    rewrite_selects_in_context(tree, SelectContext::Root, &mut |node, context| {
        let width = node.projection.len();
        let node = legalize_node(node, ctx)?;
        Ok(restore_width(node, width, context, ctx))
    })
}

/// Legalize a single node whose descendants are already legal.
pub fn legalize_node(node: Select, ctx: &mut RewriteContext) -> Result<Select, RewriteError> {
    // Classify everything before touching the node: outer references must
    // still resolve against the pre-pushdown shape.
    let keys: Vec<SortKey> = node.orderings.iter().map(|o| classify(&node, o)).collect();
    if !keys.contains(&SortKey::Lift) {
        return Ok(node);
    }

    let mut node = node;
    let orderings = std::mem::take(&mut node.orderings);
    let mut indexes: Vec<Option<usize>> = keys
        .iter()
        .map(|k| match k {
            SortKey::Projected(index) => Some(*index),
            _ => None,
        })
        .collect();

    // Lifted keys first, then outer references, then keys that were legal
    // in place and now have to be reachable through the derived table.
    for pass in [SortKey::Lift, SortKey::OuterReference, SortKey::Keep] {
        for (i, ordering) in orderings.iter().enumerate() {
            if keys[i] == pass {
                indexes[i] = Some(node.add_to_projection(ordering.expr.clone()));
            }
        }
    }

    let lifted = keys.iter().filter(|k| **k == SortKey::Lift).count();
    let limit = node.limit.take();
    let offset = node.offset.take();
    let inner_alias = ctx.next_alias("t");
    let mut outer = node.pushdown_into_subquery(inner_alias);

    let rebuilt = orderings
        .iter()
        .zip(&indexes)
        .map(|(ordering, index)| {
            let index = index.ok_or_else(|| {
                RewriteError::InternalError(format!(
                    "unresolved sort key in select '{}'",
                    outer.alias
                ))
            })?;
            let projected = outer.projection.get(index).ok_or_else(|| {
                RewriteError::InternalError(format!(
                    "sort key index {index} out of range in select '{}'",
                    outer.alias
                ))
            })?;
            Ok(Ordering {
                expr: projected.expr.clone(),
                ascending: ordering.ascending,
            })
        })
        .collect::<Result<Vec<_>, RewriteError>>()?;
    outer.orderings = rebuilt;
    outer.limit = limit;
    outer.offset = offset;

    tracing::debug!(
        alias = %outer.alias,
        lifted,
        sort_keys = outer.orderings.len(),
        "pushed ORDER BY into subquery"
    );
    tracing::trace!(sql = %outer.to_sql(), "legalized select");

    Ok(outer)
}
