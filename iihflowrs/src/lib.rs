pub mod backends;
pub mod classify;
pub mod config;
pub mod directory;
pub mod error;
pub mod filter;
pub mod frame;
pub mod models;
pub mod ordering;
pub mod pagination;
pub mod runtime;
pub mod session;
pub mod template;

use tracing_subscriber::EnvFilter;

/// Install a `fmt` subscriber filtered by `RUST_LOG` (default `info`).
///
/// Safe to call more than once; only the first call installs anything.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

pub use backends::{HistorianBackend, TokenProvider};
pub use classify::{AccessKind, QueryPlan, SeriesKey};
pub use config::IihflowConfig;
pub use directory::VariableDirectory;
pub use error::{IihflowError, Result};
pub use frame::{DataFrame, Field, FieldType, MetricFindValue};
pub use models::{QueryRequest, VariableQuery};
pub use runtime::{ConnectionStatus, QueryEngine};
pub use session::Session;
pub use template::{StaticTemplates, TemplateService, TemplateVariable};
