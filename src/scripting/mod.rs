//! Sandboxed Rhai expressions for gate conditions and scripted transforms.
//!
//! Scripts are compiled as single expressions: no statements, loops or
//! function definitions. The engine carries operation, depth and size limits
//! so a misbehaving expression fails with a script error instead of stalling
//! a node's worker.
//!
//! ## Gate conditions
//!
//! Evaluated to a boolean with these variables in scope:
//!
//! - `condition_data` - every buffered condition value, channel after channel
//! - `condition` - map of channel name to its values
//! - `signal_count` - number of buffered signal samples
//! - `statistics` - object with `mean`, `median`, `stdev`, `variance`, `min`,
//!   `max` and `sum` methods taking an array
//!
//! The statistics are also available as free functions.
//!
//! ```rhai
//! statistics.mean(condition_data) > 0.5
//! ```
//!
//! ## Sample transforms
//!
//! Evaluated once per sample to a number, with `value`, `channel`, `index`
//! and `fs` in scope.
//!
//! ```rhai
//! deadband(value * 1e6, 0.0, 5.0)
//! ```

mod engine;

pub use engine::{ScriptEngine, Statistics};

use crate::pipeline::error::{PipelineError, PipelineResult};
use rhai::{Engine, AST};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// A compiled expression that can be evaluated repeatedly.
#[derive(Clone)]
pub struct CompiledExpression {
    ast: AST,
    source: String,
    name: String,
}

impl CompiledExpression {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn ast(&self) -> &AST {
        &self.ast
    }
}

impl std::fmt::Debug for CompiledExpression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledExpression")
            .field("name", &self.name)
            .field("source", &self.source)
            .finish()
    }
}

/// Compiled expressions keyed by source text.
#[derive(Default)]
pub struct ExpressionCache {
    cache: HashMap<String, CompiledExpression>,
}

impl ExpressionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a cached expression or compile and cache it.
    pub fn get_or_compile(
        &mut self,
        engine: &Engine,
        name: &str,
        source: &str,
    ) -> PipelineResult<CompiledExpression> {
        if let Some(expr) = self.cache.get(source) {
            return Ok(expr.clone());
        }

        let ast = engine
            .compile_expression(source)
            .map_err(|e| PipelineError::Script(format!("{}: compilation error: {}", name, e)))?;

        let expr = CompiledExpression {
            ast,
            source: source.to_string(),
            name: name.to_string(),
        };
        self.cache.insert(source.to_string(), expr.clone());
        Ok(expr)
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }
}

pub type SharedExpressionCache = Arc<RwLock<ExpressionCache>>;

pub fn create_shared_cache() -> SharedExpressionCache {
    Arc::new(RwLock::new(ExpressionCache::new()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_reuses_compiled_expression() {
        let engine = Engine::new();
        let mut cache = ExpressionCache::new();
        let a = cache.get_or_compile(&engine, "a", "1 + 1").unwrap();
        let b = cache.get_or_compile(&engine, "b", "1 + 1").unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(a.name(), b.name());
    }

    #[test]
    fn test_statements_are_rejected() {
        let engine = Engine::new();
        let mut cache = ExpressionCache::new();
        assert!(cache.get_or_compile(&engine, "bad", "let x = 1; x").is_err());
        assert!(cache.is_empty());
    }
}
