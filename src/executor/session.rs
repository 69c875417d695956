//! Session binding.
//!
//! Record sets are created against a [`SessionBinding`], which hands out a
//! fresh [`EnumerationContext`] per execution.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::source::BoxFuture;

use super::context::{EnumerationContext, EnumerationOptions};
use super::error::ExecutorError;
use super::parameter::ParameterContext;

/// Session-level configuration.
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    /// Buffer every record set eagerly (see [`EnumerationOptions::greedy`]).
    pub greedy_enumeration: bool,
}

/// Factory of enumeration contexts.
pub trait SessionBinding: Send + Sync {
    /// Creates a context for one execution.
    fn create_enumeration_context(
        &self,
        parameters: ParameterContext,
    ) -> Result<Arc<EnumerationContext>, ExecutorError>;

    /// Creates a context asynchronously.
    fn create_enumeration_context_async<'a>(
        &'a self,
        parameters: ParameterContext,
        token: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<Arc<EnumerationContext>, ExecutorError>> {
        Box::pin(async move {
            if token.is_cancelled() {
                return Err(ExecutorError::Cancelled);
            }
            self.create_enumeration_context(parameters)
        })
    }
}

/// Default in-process session.
#[derive(Debug, Clone, Default)]
pub struct Session {
    config: SessionConfig,
}

impl Session {
    /// Creates a session with the given configuration.
    pub fn new(config: SessionConfig) -> Self {
        Self { config }
    }

    /// Returns the session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}

impl SessionBinding for Session {
    fn create_enumeration_context(
        &self,
        parameters: ParameterContext,
    ) -> Result<Arc<EnumerationContext>, ExecutorError> {
        trace!(greedy = self.config.greedy_enumeration, "creating enumeration context");
        let options = EnumerationOptions {
            greedy: self.config.greedy_enumeration,
        };
        Ok(EnumerationContext::new(options, parameters))
    }
}
