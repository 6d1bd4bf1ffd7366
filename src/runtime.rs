//! Process-wide setup.
//!
//! The host calls [`init`] once before building pipelines with
//! `DocumentPipeline::from_global`. Settings live for the rest of the process;
//! there is no teardown.

use crate::config::Settings;
use crate::error::ExtractionError;
use log::info;
use once_cell::sync::OnceCell;

static SETTINGS: OnceCell<Settings> = OnceCell::new();

/// Register settings and install the logger. Fails if called twice.
pub fn init(settings: Settings) -> Result<(), ExtractionError> {
    settings.extraction.validate()?;

    // Host may already have a logger
    let _ = env_logger::try_init();

    SETTINGS
        .set(settings)
        .map_err(|_| ExtractionError::AlreadyInitialized)?;
    info!("lexprime-ingest runtime initialized");
    Ok(())
}

/// Settings registered with [`init`]
pub fn settings() -> Result<&'static Settings, ExtractionError> {
    SETTINGS.get().ok_or(ExtractionError::NotInitialized)
}

pub fn is_initialized() -> bool {
    SETTINGS.get().is_some()
}
