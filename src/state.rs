use std::path::Path;

use crate::persistence::{Store, StoreError};
use crate::pipeline::SubmissionPipeline;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: SubmissionPipeline,
}

impl AppState {
    pub async fn new(store_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let store = Store::open(store_path)?;
        Ok(Self {
            pipeline: SubmissionPipeline::spawn(store),
        })
    }
}
