//! Recognition engine pool
//!
//! Holds every configured engine instance. Backends are conditionally compiled
//! based on feature flags; each backend may register several instances that
//! differ by script pairing and detection mode. The pool is built once at
//! startup and only read afterwards.

#[cfg(feature = "engine-ocrs")]
pub mod ocrs;

#[cfg(feature = "engine-leptess")]
pub mod leptess;

use crate::config::Config;
use crate::engine::{DetectionMode, RecognitionEngine, Script};
use crate::error::ExtractError;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Information about a registered engine
#[derive(Debug, Clone, Serialize)]
pub struct EngineInfo {
    pub id: String,
    pub description: &'static str,
    pub supported_scripts: BTreeSet<Script>,
    pub detection_mode: DetectionMode,
}

/// Registry of engine instances
#[derive(Default, Clone)]
pub struct EnginePool {
    engines: Vec<Arc<dyn RecognitionEngine>>,
}

impl EnginePool {
    /// An empty pool; engines are added with [`EnginePool::register`]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a pool with every compiled-in backend initialized
    pub fn from_config(config: &Config) -> Result<Self, ExtractError> {
        #[allow(unused_mut)]
        let mut pool = Self::new();

        #[cfg(feature = "engine-ocrs")]
        {
            tracing::info!("Initializing ocrs engines...");
            for engine in ocrs::OcrsEngine::from_config(config)? {
                pool.register(Arc::new(engine))?;
            }
        }

        #[cfg(feature = "engine-leptess")]
        {
            tracing::info!("Initializing leptess engines...");
            for engine in leptess::LeptessEngine::from_config(config)? {
                pool.register(Arc::new(engine))?;
            }
        }

        #[cfg(not(any(feature = "engine-ocrs", feature = "engine-leptess")))]
        let _ = config;

        if pool.is_empty() {
            return Err(ExtractError::InitializationError(
                "No OCR engines available. Build with --features engine-ocrs or --features engine-leptess".to_string(),
            ));
        }

        tracing::info!("Engine pool ready: {}", pool.list().join(", "));
        Ok(pool)
    }

    /// Add an engine. Engine ids must be unique within the pool.
    pub fn register(&mut self, engine: Arc<dyn RecognitionEngine>) -> Result<(), ExtractError> {
        let id = engine.profile().id.clone();
        if self.get(&id).is_some() {
            return Err(ExtractError::ConfigError(format!(
                "engine id '{}' registered twice",
                id
            )));
        }
        self.engines.push(engine);
        Ok(())
    }

    /// Get an engine by id
    pub fn get(&self, id: &str) -> Option<Arc<dyn RecognitionEngine>> {
        self.engines.iter().find(|e| e.profile().id == id).cloned()
    }

    /// List all registered engine ids in registration order
    pub fn list(&self) -> Vec<&str> {
        self.engines.iter().map(|e| e.profile().id.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }

    /// Get info about all registered engines
    pub fn info(&self) -> Vec<EngineInfo> {
        self.engines
            .iter()
            .map(|e| EngineInfo {
                id: e.profile().id.clone(),
                description: e.description(),
                supported_scripts: e.profile().supported_scripts.clone(),
                detection_mode: e.profile().detection_mode,
            })
            .collect()
    }

    /// Engines to run for one extraction, in registration order.
    ///
    /// `enabled` of `None` means every engine; unknown ids are ignored.
    pub fn select(
        &self,
        enabled: Option<&[String]>,
        script_hint: Option<Script>,
    ) -> Vec<Arc<dyn RecognitionEngine>> {
        self.engines
            .iter()
            .filter(|e| match enabled {
                Some(ids) => ids.iter().any(|id| id == &e.profile().id),
                None => true,
            })
            .filter(|e| e.profile().accepts(script_hint))
            .cloned()
            .collect()
    }
}

/// Directory used to cache downloaded model files
#[cfg(any(feature = "engine-ocrs", feature = "engine-leptess"))]
pub(crate) fn model_cache_dir() -> std::path::PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("campaign-ocr")
}

/// Download a file from URL to path using ureq
#[cfg(any(feature = "engine-ocrs", feature = "engine-leptess"))]
pub(crate) fn download_file(url: &str, path: &std::path::Path) -> Result<(), ExtractError> {
    use std::io::Write;

    let response = ureq::get(url)
        .call()
        .map_err(|e| ExtractError::InitializationError(format!("Failed to download {}: {}", url, e)))?;

    let buffer = response.into_body().read_to_vec().map_err(|e| {
        ExtractError::InitializationError(format!("Failed to read response body: {}", e))
    })?;

    let mut file = std::fs::File::create(path).map_err(|e| {
        ExtractError::InitializationError(format!("Failed to create {:?}: {}", path, e))
    })?;
    file.write_all(&buffer).map_err(|e| {
        ExtractError::InitializationError(format!("Failed to write {:?}: {}", path, e))
    })?;

    Ok(())
}
