use dynint_api::FnFactory;

mod gcp;
mod rest;
mod transport;

pub use gcp::{GcpApplicationIntegration, format_payload};
pub use rest::RestApiIntegration;
pub use transport::ReqwestTransport;

/// Adapters shipped with the workspace, in registration order.
pub const BUILTIN_FACTORIES: [FnFactory; 2] = [rest::FACTORY, gcp::FACTORY];
