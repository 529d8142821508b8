//! Resolution of symbolic integration names to live adapters.
//!
//! Build an [`IntegrationRegistry`] once at startup, wrap it in
//! [`Integrations`], and hand clones of that to whatever needs adapters:
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use dynint_api::{IntegrationConfig, Payload};
//! use dynint_connectors::ReqwestTransport;
//! use dynint_core::RegistrySettings;
//! use dynint_runtime::Integrations;
//!
//! # fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = Arc::new(ReqwestTransport::new()?);
//! let integrations = Integrations::from_settings(&RegistrySettings::default(), transport);
//!
//! let adapter = integrations.call(
//!     "RestApi",
//!     IntegrationConfig::new()
//!         .with("base_url", "https://automation.example.com/hooks")
//!         .with("auth_token", "secret"),
//! )?;
//! let result = adapter.execute("nightly-report", &Payload::new())?;
//! println!("started {:?}", result.process_id);
//! # Ok(()) }
//! ```

mod dispatch;
mod registry;

pub use dispatch::Integrations;
pub use registry::{
    BASE_TYPE_NAME, DEFAULT_LOCATION, IntegrationRegistry, RegistryBuilder, SearchLocation,
    TypeEntry, canonical_type_name, symbolic_name,
};
