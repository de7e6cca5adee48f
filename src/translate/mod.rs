//! Function Dialect Mapper.
//!
//! Abstract scalar operations ([`StringMethod`]) arrive in the tree as
//! [`Expr::MethodCall`] nodes. A [`MethodCallTranslator`] turns a recognised
//! call into dialect [`Expr::Function`] / [`Expr::Case`] composites, or
//! returns `None` so the next translator of the host's [`TranslatorChain`]
//! can try.

pub mod string;

use crate::error::RewriteError;
use crate::tree::{Expr, MethodCall, SqlType, StringMethod};

pub use string::StringMethodTranslator;

/// One translator of the host's chain.
pub trait MethodCallTranslator: Send + Sync {
    /// Translate `method` applied to `instance` with `args`. `None` means
    /// "not recognised".
    fn translate(
        &self,
        method: StringMethod,
        instance: Option<&Expr>,
        args: &[Expr],
    ) -> Option<Expr>;
}

/// Ordered list of translators; the first one that recognises a call wins.
#[derive(Default)]
pub struct TranslatorChain {
    translators: Vec<Box<dyn MethodCallTranslator>>,
}

impl std::fmt::Debug for TranslatorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranslatorChain")
            .field("translators", &self.translators.len())
            .finish()
    }
}

impl TranslatorChain {
    /// An empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// A chain holding the built-in string translator.
    pub fn with_defaults() -> Self {
        Self::new().with(StringMethodTranslator)
    }

    /// Append a translator; it is consulted after the existing ones.
    pub fn with(mut self, translator: impl MethodCallTranslator + 'static) -> Self {
        self.translators.push(Box::new(translator));
        self
    }

    /// Translate one call through the chain.
    pub fn translate_call(&self, call: &MethodCall) -> Option<Expr> {
        self.translators
            .iter()
            .find_map(|t| t.translate(call.method, call.instance.as_deref(), &call.args))
    }

    /// Replace every translatable method call inside `expr`, innermost first.
    /// Calls no translator recognises are left in place for the host to
    /// report.
    pub fn translate_expr(&self, expr: Expr) -> Result<Expr, RewriteError> {
        expr.transform_up(&mut |e| {
            Ok(match e {
                Expr::MethodCall(call) => match self.translate_call(&call) {
                    Some(translated) => {
                        tracing::trace!(
                            method = ?call.method,
                            sql = %translated.to_sql(),
                            "translated method call"
                        );
                        translated
                    }
                    None => Expr::MethodCall(call),
                },
                other => other,
            })
        })
    }
}

/// The store type shared by a set of string operands: the type of the first
/// column among them, otherwise the first operand's type.
pub fn infer_type_mapping(operands: &[&Expr]) -> SqlType {
    operands
        .iter()
        .find_map(|e| e.as_column().map(|c| c.data_type))
        .or_else(|| operands.iter().find(|e| !e.is_constant()).map(|e| e.data_type()))
        .or_else(|| operands.first().map(|e| e.data_type()))
        .unwrap_or(SqlType::TEXT)
}

/// Give a constant operand the inferred store type. Non-constants keep their
/// own mapping.
pub fn apply_type_mapping(expr: Expr, data_type: SqlType) -> Expr {
    match expr {
        Expr::Constant { value, .. } => Expr::Constant { value, data_type },
        other => other,
    }
}
