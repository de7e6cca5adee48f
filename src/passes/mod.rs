//! Tree-to-tree rewrite passes.
//!
//! Each pass is a pure function from [`Select`] to [`Select`] that visits
//! every node bottom-up (see [`crate::tree::visit`]). Passes that introduce
//! new scopes draw fresh aliases from a [`RewriteContext`] shared across the
//! whole compilation, so no two scopes ever end up with the same name.

pub mod order_by;
pub mod pagination;
pub mod temporal;


use std::collections::HashSet;

use crate::tree::Select;
use crate::tree::visit::{SelectContext, collect_aliases};

/// Per-compilation state shared by the passes.
#[derive(Debug, Clone, Default)]
pub struct RewriteContext {
    /// Every alias in use, including the ones handed out by this context.
    taken: HashSet<String>,
    alias_counter: usize,
}

impl RewriteContext {
    /// Create a context that avoids every alias already used in `tree`.
    pub fn for_tree(tree: &Select) -> Self {
        RewriteContext {
            taken: collect_aliases(tree),
            alias_counter: 0,
        }
    }

    /// Allocate a fresh alias: `prefix0`, `prefix1`, ... skipping taken ones.
    pub fn next_alias(&mut self, prefix: &str) -> String {
        loop {
            let candidate = format!("{prefix}{}", self.alias_counter);
            self.alias_counter += 1;
            if self.taken.insert(candidate.clone()) {
                return candidate;
            }
        }
    }

    /// Mark `alias` as used.
    pub fn reserve(&mut self, alias: impl Into<String>) {
        self.taken.insert(alias.into());
    }

    /// Mark every alias of `tree` as used, e.g. after a host step rebuilt it.
    pub fn absorb(&mut self, tree: &Select) {
        self.taken.extend(collect_aliases(tree));
    }
}

/// Bring a rewritten node back to `width` output columns when `context`
/// fixes its column count.
///
/// Passes only ever append projections, so the original outputs are the
/// first `width` entries. The node is wrapped once more and the wrapper
/// re-selects those; the ordering and `TOP` stay on the derived table.
pub fn restore_width(
    node: Select,
    width: usize,
    context: SelectContext,
    ctx: &mut RewriteContext,
) -> Select {
    if !context.fixes_width() || node.projection.len() <= width {
        return node;
    }
    let mut outer = node.pushdown_into_subquery(ctx.next_alias("t"));
    outer.projection.truncate(width);
    tracing::debug!(alias = %outer.alias, width, "re-selected original outputs");
    outer
}
