//! Script loading for setup cells.
//!
//! A setup cell's source evaluates to a URL. The runtime hands that URL to
//! a [`ScriptLoader`] and the loader's result becomes the cell's value.

use std::collections::HashMap;

use futures_util::future::{self, BoxFuture, FutureExt};

use crate::error::CellError;
use crate::value::Value;

/// Fetches and runs an external script.
pub trait ScriptLoader: Send + Sync {
    fn load(&self, url: &str) -> BoxFuture<'static, Result<Value, CellError>>;
}

/// A loader that rejects every URL.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLoader;

impl ScriptLoader for NoLoader {
    fn load(&self, url: &str) -> BoxFuture<'static, Result<Value, CellError>> {
        future::ready(Err(CellError::Load {
            url: url.to_string(),
            message: "no script loader is configured".to_string(),
        }))
        .boxed()
    }
}

/// A loader serving values registered up front.
#[derive(Debug, Clone, Default)]
pub struct StaticLoader {
    scripts: HashMap<String, Value>,
}

impl StaticLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the value `url` loads to.
    pub fn with(mut self, url: impl Into<String>, value: Value) -> Self {
        self.insert(url, value);
        self
    }

    pub fn insert(&mut self, url: impl Into<String>, value: Value) {
        self.scripts.insert(url.into(), value);
    }
}

impl ScriptLoader for StaticLoader {
    fn load(&self, url: &str) -> BoxFuture<'static, Result<Value, CellError>> {
        let result = self.scripts.get(url).cloned().ok_or_else(|| CellError::Load {
            url: url.to_string(),
            message: "not found".to_string(),
        });
        future::ready(result).boxed()
    }
}
