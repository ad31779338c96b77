//! # Verdict Core
//!
//! Core library for the Verdict analysis engine.
//! Provides the session orchestrator, role executor, mode dispatcher,
//! verification firewalls, session cache, and the ordered event stream
//! consumed by the HTTP gateway and the CLI.

pub mod analysis;
pub mod cache;
pub mod collaborators;
pub mod config;
pub mod degrade;
pub mod dispatch;
pub mod error;
pub mod executor;
pub mod firewall;
pub mod gateway;
pub mod intent;
pub mod orchestrator;
pub mod progress;
pub mod providers;
pub mod report;
pub mod roles;
pub mod services;
pub mod session;
pub mod stream;
pub mod types;

// Re-export commonly used types at the crate root.
pub use cache::{CacheEntry, CacheStore, InMemoryCacheStore, SessionCache};
pub use config::{VerdictConfig, load_config};
pub use dispatch::{DispatchOutcome, ModeDispatcher, RoleRunner};
pub use error::{Result, VerdictError};
pub use executor::RoleExecutor;
pub use intent::{Intent, parse_intent};
pub use orchestrator::Orchestrator;
pub use progress::ProgressTracker;
pub use providers::{ChainInvoker, MockModelBackend, ModelBackend, ModelInvoker};
pub use roles::{Role, RoleRegistry};
pub use services::Services;
pub use session::ExecutionSession;
pub use stream::{StreamEmitter, StreamEvent};
pub use types::{AnalysisRequest, AnalysisResult, Depth, Grade, Mode, RoleState, RoleStatus, Style};
