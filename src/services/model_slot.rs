// Lazily loaded, process-wide model handle
//
// The first `get()` runs the loader; concurrent callers block until it
// finishes. The outcome is cached either way: a model that failed to load
// stays unavailable until restart and every call reports the same error.

use anyhow::Result;
use once_cell::sync::OnceCell;
use std::sync::Arc;
use tracing::{error, info};

type Loader<M> = Box<dyn Fn() -> Result<Arc<M>> + Send + Sync>;

pub struct ModelSlot<M: ?Sized> {
    name: &'static str,
    cell: OnceCell<Result<Arc<M>, String>>,
    loader: Option<Loader<M>>,
}

impl<M: ?Sized + Send + Sync> ModelSlot<M> {
    pub fn new<F>(name: &'static str, loader: F) -> Self
    where
        F: Fn() -> Result<Arc<M>> + Send + Sync + 'static,
    {
        Self {
            name,
            cell: OnceCell::new(),
            loader: Some(Box::new(loader)),
        }
    }

    /// Slot holding an already-loaded model
    pub fn ready(name: &'static str, model: Arc<M>) -> Self {
        Self {
            name,
            cell: OnceCell::with_value(Ok(model)),
            loader: None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Model handle, loading it on first use. Blocking; call from a
    /// blocking context.
    pub fn get(&self) -> Result<Arc<M>, String> {
        self.cell
            .get_or_init(|| {
                let Some(loader) = self.loader.as_ref() else {
                    return Err(format!("{} model has no loader", self.name));
                };

                info!("Loading {} model", self.name);
                match loader() {
                    Ok(model) => {
                        info!("{} model ready", self.name);
                        Ok(model)
                    }
                    Err(e) => {
                        error!("{} model failed to load: {:#}", self.name, e);
                        Err(format!("{:#}", e))
                    }
                }
            })
            .clone()
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.cell.get(), Some(Ok(_)))
    }

    /// Cached load error, if a load was attempted and failed
    pub fn load_error(&self) -> Option<String> {
        match self.cell.get() {
            Some(Err(e)) => Some(e.clone()),
            _ => None,
        }
    }

    /// "loaded", "failed" or "not_loaded", for health reporting
    pub fn state(&self) -> &'static str {
        match self.cell.get() {
            Some(Ok(_)) => "loaded",
            Some(Err(_)) => "failed",
            None => "not_loaded",
        }
    }
}
