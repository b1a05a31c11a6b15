use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;

use crate::models::MeterDescriptor;

/// Host-facing configuration for the meter engine.
///
/// `initial_meters` are provisioned unconditionally at startup;
/// `add_sample_meters` additionally seeds the built-in development
/// meters and must stay off in production.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MeterConfig {
    #[serde(default)]
    pub add_sample_meters: bool,
    #[serde(default)]
    pub initial_meters: Vec<MeterDescriptor>,
}

impl MeterConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if it exists

        let add_sample_meters = env::var("ADD_SAMPLE_METERS")
            .unwrap_or_else(|_| "false".to_string())
            .parse()
            .unwrap_or(false);

        let initial_meters = match env::var("INITIAL_METERS") {
            Ok(raw) => serde_json::from_str(&raw)
                .context("INITIAL_METERS must be a JSON array of meter descriptors")?,
            Err(_) => Vec::new(),
        };

        Ok(MeterConfig {
            add_sample_meters,
            initial_meters,
        })
    }
}
