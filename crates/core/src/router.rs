//! Generic backend router used uniformly across ASR, LLM and TTS (§4.3).
//!
//! `Router<T>` is a read-only `engineName → T` map plus a fallback name.
//! Construction happens once at startup from `Settings`; after that it is
//! immutable and therefore trivially `Send + Sync` without extra locking.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct Router<T> {
    backends: Arc<HashMap<String, T>>,
    fallback: Option<String>,
}

impl<T> Router<T> {
    /// Route by exact name, falling back to the configured fallback engine,
    /// and finally erroring with `NoBackend` (§4.3, §8 router invariant).
    pub fn route(&self, engine: &str) -> Result<&T> {
        if let Some(backend) = self.backends.get(engine) {
            return Ok(backend);
        }
        if let Some(fallback) = &self.fallback {
            if let Some(backend) = self.backends.get(fallback) {
                return Ok(backend);
            }
        }
        Err(Error::NoBackend(engine.to_string()))
    }

    pub fn has(&self, engine: &str) -> bool {
        self.backends.contains_key(engine)
    }

    pub fn engines(&self) -> impl Iterator<Item = &str> {
        self.backends.keys().map(String::as_str)
    }

    pub fn fallback_name(&self) -> Option<&str> {
        self.fallback.as_deref()
    }
}

/// Builder so construction reads as "register every backend, then freeze".
pub struct RouterBuilder<T> {
    backends: HashMap<String, T>,
    fallback: Option<String>,
}

impl<T> RouterBuilder<T> {
    pub fn new() -> Self {
        Self { backends: HashMap::new(), fallback: None }
    }

    pub fn register(mut self, name: impl Into<String>, backend: T) -> Self {
        self.backends.insert(name.into(), backend);
        self
    }

    pub fn fallback(mut self, name: impl Into<String>) -> Self {
        self.fallback = Some(name.into());
        self
    }

    pub fn build(self) -> Router<T> {
        Router {
            backends: Arc::new(self.backends),
            fallback: self.fallback,
        }
    }
}

impl<T> Default for RouterBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_exact_match() {
        let router = RouterBuilder::new()
            .register("a", 1)
            .register("b", 2)
            .fallback("a")
            .build();
        assert_eq!(*router.route("b").unwrap(), 2);
    }

    #[test]
    fn falls_back_on_unknown_name() {
        let router = RouterBuilder::new().register("a", 1).fallback("a").build();
        assert_eq!(*router.route("missing").unwrap(), 1);
    }

    #[test]
    fn errors_with_no_fallback() {
        let router: Router<i32> = RouterBuilder::new().register("a", 1).build();
        assert!(matches!(router.route("missing"), Err(Error::NoBackend(_))));
    }

    #[test]
    fn route_is_deterministic_for_same_name() {
        let router = RouterBuilder::new().register("a", 1).build();
        assert_eq!(router.route("a").unwrap(), router.route("a").unwrap());
    }
}
