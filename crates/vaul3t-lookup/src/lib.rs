//! Remote OSINT API client and report projection for vaul3t gated commands.
mod osint_client;
mod report;
mod types;

pub use osint_client::{
    OsintApiClient, OsintApiConfig, DEFAULT_OSINT_API_BASE, DEFAULT_REQUEST_TIMEOUT_MS,
};
pub use report::{render_field_value, render_report, RenderedReport, MISSING_FIELD_PLACEHOLDER};
pub use types::{OsintApi, OsintOperation, RemoteCallError};
