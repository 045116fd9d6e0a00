//! Core functionality for the relay server

pub mod connection;
pub mod listener;
pub mod message;
pub mod rate_limiter;
pub mod registry;
pub mod server;
pub mod session;
pub mod shutdown;
pub mod stats;
pub mod worker_pool;

// Re-export main components for convenience
pub use connection::{Connection, ConnectionId, Outbound};
pub use listener::Listener;
pub use message::{encode_frame, FrameReader, Message};
pub use rate_limiter::MessageRateLimiter;
pub use registry::{create_registry, BroadcastReport, ClientRegistry, SharedRegistry};
pub use server::RelayServer;
pub use session::{ClientSession, SessionOutcome};
pub use shutdown::{notify_and_stop, ShutdownCoordinator, ShutdownReason, ShutdownSignal};
pub use stats::{RelayStats, SharedStats, StatsSnapshot};
pub use worker_pool::{build_runtime, SessionPool};
