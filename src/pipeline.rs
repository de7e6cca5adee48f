//! Pipeline orchestrator.
//!
//! Runs the passes over a whole query tree in a fixed order:
//!
//! 1. OFFSET emulation ([`crate::passes::pagination`]).
//! 2. The host's own relational postprocessing, if one is registered.
//! 3. Method translation and date/time conversion
//!    ([`crate::passes::temporal`]), only with millisecond support on.
//! 4. ORDER BY legalization ([`crate::passes::order_by`]), last, so it sees
//!    every derived table the earlier steps introduced.
//!
//! The input tree is validated before step 1. The output is validated after
//! step 4; a failure there is a defect in a pass and is reported as
//! [`RewriteError::InternalError`].

use crate::config::{self, DialectSettings, QuerySplittingBehavior};
use crate::error::RewriteError;
use crate::passes::order_by::legalize_order_by;
use crate::passes::pagination::emulate_pagination;
use crate::passes::temporal::convert_temporal;
use crate::passes::RewriteContext;
use crate::translate::TranslatorChain;
use crate::tree::Select;

/// Per-compilation view of the dialect settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PipelineOptions {
    pub millisecond_support: bool,
    pub query_splitting: QuerySplittingBehavior,
}

impl PipelineOptions {
    /// Snapshot `settings`; `splitting` overrides the default splitting
    /// behaviour for this query.
    pub fn from_settings(
        settings: &DialectSettings,
        splitting: Option<QuerySplittingBehavior>,
    ) -> Self {
        PipelineOptions {
            millisecond_support: settings.millisecond_support,
            query_splitting: splitting.unwrap_or(settings.default_query_splitting),
        }
    }

    /// Snapshot the process-wide settings installed by the host.
    pub fn from_installed(splitting: Option<QuerySplittingBehavior>) -> Self {
        Self::from_settings(&config::current(), splitting)
    }
}

/// The host's generic relational postprocessing step.
pub type Postprocessor = dyn Fn(Select) -> Result<Select, RewriteError> + Send + Sync;

/// A configured pass pipeline.
pub struct Pipeline {
    options: PipelineOptions,
    translators: TranslatorChain,
    postprocessor: Option<Box<Postprocessor>>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("options", &self.options)
            .field("translators", &self.translators)
            .field("postprocessor", &self.postprocessor.is_some())
            .finish()
    }
}

impl Pipeline {
    /// A pipeline with the built-in translators and no host postprocessing.
    pub fn new(options: PipelineOptions) -> Self {
        Pipeline {
            options,
            translators: TranslatorChain::with_defaults(),
            postprocessor: None,
        }
    }

    /// Replace the translator chain used in step 3.
    pub fn with_translators(mut self, translators: TranslatorChain) -> Self {
        self.translators = translators;
        self
    }

    /// Register the host's postprocessing step.
    pub fn with_postprocessor<F>(mut self, postprocessor: F) -> Self
    where
        F: Fn(Select) -> Result<Select, RewriteError> + Send + Sync + 'static,
    {
        self.postprocessor = Some(Box::new(postprocessor));
        self
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Rewrite `tree` into a tree the target dialect can execute.
    pub fn process(&self, tree: Select) -> Result<Select, RewriteError> {
        tree.validate()?;
        let mut ctx = RewriteContext::for_tree(&tree);

        let mut tree = emulate_pagination(tree, &mut ctx, self.options.query_splitting)?;

        if let Some(postprocess) = &self.postprocessor {
            tree = postprocess(tree)?;
            ctx.absorb(&tree);
        }

        if self.options.millisecond_support {
            tree = convert_temporal(tree, &self.translators)?;
        }

        let tree = legalize_order_by(tree, &mut ctx)?;

        tree.validate().map_err(|e| {
            RewriteError::InternalError(format!("rewrite produced an invalid tree: {e}"))
        })?;
        tracing::trace!(sql = %tree.to_sql(), "rewritten query");
        Ok(tree)
    }
}

/// Rewrite `tree` with the built-in translators and no host postprocessing.
pub fn process(tree: Select, options: &PipelineOptions) -> Result<Select, RewriteError> {
    Pipeline::new(*options).process(tree)
}
