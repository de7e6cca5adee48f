//! Millisecond-precision date/time emulation.
//!
//! The target dialect stores date/time values as a double: whole days since
//! 1899-12-30 plus the time of day as a fraction. Its own date/time
//! comparisons round to whole seconds, so when millisecond support is on,
//! every comparison involving a date/time operand is performed on the double
//! representation instead. The same walk also runs the method translators
//! over every expression of the tree.

use chrono::{NaiveDate, NaiveDateTime};

use crate::error::RewriteError;
use crate::translate::TranslatorChain;
use crate::tree::visit::rewrite_selects_bottom_up;
use crate::tree::{Expr, FunctionCall, Select, SqlType, Value};

const MILLIS_PER_DAY: i64 = 86_400_000;

/// Day number of `value` in the dialect's double representation, with
/// millisecond precision.
///
/// Before the epoch the integer part counts days backwards while the
/// fraction still counts time forward: 1899-12-29 06:00 is `-1.25`.
pub fn ole_date(value: NaiveDateTime) -> f64 {
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default();
    let millis = (value - epoch).num_milliseconds();
    let days = millis.div_euclid(MILLIS_PER_DAY) as f64;
    let fraction = millis.rem_euclid(MILLIS_PER_DAY) as f64 / MILLIS_PER_DAY as f64;
    if days >= 0.0 {
        days + fraction
    } else {
        days - fraction
    }
}

/// Translate method calls and convert date/time comparisons in every node.
pub fn convert_temporal(tree: Select, chain: &TranslatorChain) -> Result<Select, RewriteError> {
    rewrite_selects_bottom_up(tree, &mut |node| {
        let mut conversions = 0usize;
        let node = node.map_expressions(&mut |e| {
            chain.translate_expr(e)?.transform_up(&mut |e| {
                Ok(match e {
                    Expr::Binary { op, left, right }
                        if op.is_comparison()
                            && (left.data_type() == SqlType::DateTime
                                || right.data_type() == SqlType::DateTime) =>
                    {
                        conversions += 1;
                        Expr::Binary {
                            op,
                            left: Box::new(to_double(*left)),
                            right: Box::new(to_double(*right)),
                        }
                    }
                    other => other,
                })
            })
        })?;
        if conversions > 0 {
            tracing::debug!(
                alias = %node.alias,
                conversions,
                "compared date/time values as doubles"
            );
        }
        Ok(node)
    })
}

fn to_double(expr: Expr) -> Expr {
    match expr {
        Expr::Constant {
            value: Value::DateTime(dt),
            ..
        } => Expr::Constant {
            value: Value::Double(ole_date(dt)),
            data_type: SqlType::Double,
        },
        Expr::Constant {
            value: Value::Null,
            data_type: SqlType::DateTime,
        } => Expr::null(SqlType::Double),
        other if other.data_type() == SqlType::DateTime => Expr::Function(FunctionCall::new(
            "CDBL",
            vec![other],
            vec![true],
            SqlType::Double,
        )),
        other => other,
    }
}
