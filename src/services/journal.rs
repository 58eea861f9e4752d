// src/services/journal.rs

//! In-run collection of provider calls.
//!
//! Clients push one [`ApiCall`] per request; the orchestrator drains the
//! recorder at run end and appends to the persisted journal.

use std::sync::{Arc, Mutex, PoisonError};

use crate::models::ApiCall;
use crate::utils::mask_secret;

/// Query parameters whose values never reach the journal in clear.
const SECRET_PARAMS: &[&str] = &["api_key", "apikey", "token"];

/// Shared, cloneable buffer of calls made during a run.
#[derive(Debug, Clone, Default)]
pub struct CallRecorder {
    calls: Arc<Mutex<Vec<ApiCall>>>,
}

impl CallRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, call: ApiCall) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }

    /// Remove and return everything recorded so far, in call order.
    pub fn take(&self) -> Vec<ApiCall> {
        std::mem::take(&mut *self.calls.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

/// Copy query parameters for the journal, masking secret values.
pub fn masked_params(params: &[(&str, String)]) -> Vec<(String, String)> {
    params
        .iter()
        .map(|(name, value)| {
            let value = if SECRET_PARAMS.contains(&name.to_ascii_lowercase().as_str()) {
                mask_secret(value)
            } else {
                value.clone()
            };
            (name.to_string(), value)
        })
        .collect()
}
