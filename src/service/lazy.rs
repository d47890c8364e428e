//! Load-once model holder.

use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{info, warn};

type Loader<T> = Arc<dyn Fn() -> Result<Arc<T>, String> + Send + Sync>;

/// A model that is loaded on first use and shared afterwards.
///
/// Loading runs on the blocking thread pool. Concurrent first callers wait for
/// the same load. A failed load is not remembered, so the next call tries
/// again.
pub struct LazyModel<T: ?Sized> {
    name: String,
    cell: OnceCell<Arc<T>>,
    loader: Loader<T>,
}

impl<T: ?Sized + Send + Sync + 'static> LazyModel<T> {
    /// Wrap a blocking loader.
    pub fn new<F>(name: impl Into<String>, loader: F) -> Self
    where
        F: Fn() -> Result<Arc<T>, String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            cell: OnceCell::new(),
            loader: Arc::new(loader),
        }
    }

    /// Wrap a model that is already loaded.
    pub fn ready(name: impl Into<String>, model: Arc<T>) -> Self {
        let name = name.into();
        let failed = name.clone();
        Self {
            cell: OnceCell::new_with(Some(model)),
            loader: Arc::new(move || Err(format!("{} cannot be reloaded", failed))),
            name,
        }
    }

    /// Get the model, loading it if necessary.
    ///
    /// # Errors
    /// The loader's message if loading fails or panics
    pub async fn get(&self) -> Result<Arc<T>, String> {
        let model = self
            .cell
            .get_or_try_init(|| async {
                info!(model = %self.name, "loading model");
                let loader = Arc::clone(&self.loader);
                let loaded = tokio::task::spawn_blocking(move || loader())
                    .await
                    .map_err(|e| format!("model loader panicked: {}", e))
                    .and_then(|result| result);
                if let Err(message) = &loaded {
                    warn!(model = %self.name, error = %message, "model load failed");
                }
                loaded
            })
            .await?;
        Ok(Arc::clone(model))
    }

    pub fn is_loaded(&self) -> bool {
        self.cell.initialized()
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<T: ?Sized> std::fmt::Debug for LazyModel<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyModel")
            .field("name", &self.name)
            .field("loaded", &self.cell.initialized())
            .finish()
    }
}
