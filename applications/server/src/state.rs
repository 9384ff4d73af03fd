/// Shared application state
use crate::{config::EqualizerSettings, services::JobStore};
use loudeq_loudness::BatchEqualizer;
use std::sync::Arc;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub equalizer: Arc<BatchEqualizer>,
    pub job_store: Arc<JobStore>,
    pub settings: Arc<EqualizerSettings>,
}

impl AppState {
    pub fn new(
        equalizer: Arc<BatchEqualizer>,
        job_store: Arc<JobStore>,
        settings: Arc<EqualizerSettings>,
    ) -> Self {
        Self {
            equalizer,
            job_store,
            settings,
        }
    }
}
