//! Handler registry: handler ids mapped to callable jobs.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;

use crate::error::{Error, Result};

/// Future returned by a handler invocation.
pub type HandlerFuture = BoxFuture<'static, anyhow::Result<()>>;

/// A registered job. Arguments are passed positionally, in payload order.
pub type Handler = Arc<dyn Fn(Vec<Value>) -> HandlerFuture + Send + Sync>;

/// Wrap an async function or closure as a [`Handler`].
pub fn handler_fn<F, Fut>(f: F) -> Handler
where
    F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |args| f(args).boxed())
}

/// Thread-safe map of handler id to handler. Last registration wins.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<String, Handler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, id: impl Into<String>, handler: Handler) {
        let mut handlers = self.handlers.write().unwrap_or_else(|e| e.into_inner());
        handlers.insert(id.into(), handler);
    }

    pub fn resolve(&self, id: &str) -> Result<Handler> {
        let handlers = self.handlers.read().unwrap_or_else(|e| e.into_inner());
        handlers
            .get(id)
            .cloned()
            .ok_or_else(|| Error::HandlerNotFound(id.to_string()))
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.handlers.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn noop() -> Handler {
        handler_fn(|_args| async { Ok(()) })
    }

    #[test]
    fn test_register_then_resolve_returns_same_handler() {
        let registry = HandlerRegistry::new();
        let handler = noop();
        registry.register("send-email", handler.clone());

        let resolved = registry.resolve("send-email").unwrap();
        assert!(Arc::ptr_eq(&resolved, &handler));
    }

    #[test]
    fn test_last_registration_wins() {
        let registry = HandlerRegistry::new();
        let first = noop();
        let second = noop();
        registry.register("job", first.clone());
        registry.register("job", second.clone());

        let resolved = registry.resolve("job").unwrap();
        assert!(Arc::ptr_eq(&resolved, &second));
        assert!(!Arc::ptr_eq(&resolved, &first));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_resolve_unknown_handler() {
        let registry = HandlerRegistry::new();
        assert!(registry.is_empty());
        match registry.resolve("missing") {
            Err(Error::HandlerNotFound(id)) => assert_eq!(id, "missing"),
            Err(e) => panic!("unexpected error: {}", e),
            Ok(_) => panic!("expected HandlerNotFound"),
        }
    }

    #[tokio::test]
    async fn test_handler_receives_args_in_order() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handler = handler_fn(move |args| {
            let sink = sink.clone();
            async move {
                sink.lock().unwrap().extend(args);
                Ok(())
            }
        });

        handler(vec![json!(1), json!("two"), json!({"three": 3})])
            .await
            .unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![json!(1), json!("two"), json!({"three": 3})]
        );
    }

    #[tokio::test]
    async fn test_concurrent_register_and_resolve() {
        let registry = Arc::new(HandlerRegistry::new());
        let calls = Arc::new(AtomicUsize::new(0));
        registry.register("shared", noop());

        let mut tasks = Vec::new();
        for i in 0..16 {
            let registry = registry.clone();
            let calls = calls.clone();
            tasks.push(tokio::spawn(async move {
                registry.register(format!("h{}", i), noop());
                let handler = registry.resolve("shared").unwrap();
                handler(vec![]).await.unwrap();
                calls.fetch_add(1, Ordering::SeqCst);
            }));
        }

        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 16);
        assert_eq!(registry.len(), 17);
    }
}
