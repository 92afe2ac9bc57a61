//! TickLoop Probe: external collaborators queried by the supervisor and CLI
//!
//! Two probes live here:
//! - [`search`]: web search (Serper) used to collect documentation references
//!   about the collector's upstream endpoint
//! - [`keys`]: model-provider API key checks that list models per provider
//!
//! Both are observability aids. Callers treat every [`ProbeError`] as
//! non-fatal and log it.

pub mod error;
pub mod keys;
pub mod search;

pub use error::ProbeError;
pub use keys::{check_all_providers, check_provider, KeyCheck, KeyStatus, Provider};
pub use search::{
    collect_references, parse_serper_response, SearchHit, SearchProbe, SerperClient, SerperConfig,
};

/// Result type for probe operations
pub type Result<T> = std::result::Result<T, ProbeError>;

/// User agent sent with every probe request
pub const USER_AGENT: &str = concat!("tickloop-probe/", env!("CARGO_PKG_VERSION"));
