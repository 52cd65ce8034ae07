//! Access-control stores for vaul3t gated commands.
//!
//! Holds the credential store with its known-valid registry, the connection
//! registry for linked external accounts, and the free-tier rate-limit ledger.
//! Every store is a whole-file JSON table from `vaul3t-core`.

pub mod connections;
pub mod credentials;
pub mod identity;
pub mod layout;
pub mod rate_limit;

pub use connections::*;
pub use credentials::*;
pub use identity::*;
pub use layout::*;
pub use rate_limit::*;
