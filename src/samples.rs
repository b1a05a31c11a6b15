//! Built-in sample meters for development setups.
//!
//! The ids are stable so repeated startups provision the same records
//! (the duplicate inserts are ignored). These ship with well-known
//! identifiers and must never be enabled in production.

use crate::models::MeterDescriptor;

/// The development meters seeded when `add_sample_meters` is set
pub fn sample_meters() -> Vec<MeterDescriptor> {
    vec![
        MeterDescriptor {
            id: "z16dpsXw7qNppBeZdGaVF4U"
                .parse()
                .expect("static sample meter id"),
            controller: "did:key:z6MkrHLYfuzQsqjWeGLijrdJkgMDvbsqGikPJ9H7Gpdr33hk".to_string(),
            product: Some(serde_json::json!({
                "id": "urn:uuid:32f526e2-9444-4c39-a8f5-14e09ba6ba55"
            })),
            service_id: Some(
                "did:key:z6MkhNyiHXRyGNsBKWcZjCbrEWC2GYvatYhCWbkrrfcMQByd".to_string(),
            ),
        },
        MeterDescriptor {
            id: "z18vNK2PyDhmEWbUFQJTcqR"
                .parse()
                .expect("static sample meter id"),
            controller: "did:key:z6MkrHLYfuzQsqjWeGLijrdJkgMDvbsqGikPJ9H7Gpdr33hk".to_string(),
            product: Some(serde_json::json!({
                "id": "urn:uuid:a9f1f0c8-17c7-4c33-b0e0-5fb63258f85a"
            })),
            service_id: Some(
                "did:key:z6MkmE9freUA4BEbPwhLYKnaXnpTtheDQd7jAvsHGHUSFPUw".to_string(),
            ),
        },
    ]
}
