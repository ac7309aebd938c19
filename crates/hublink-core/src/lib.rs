// hublink-core: persistent hub client with live entity state
//
// Sits between hublink-api (wire codec, REST, socket transport) and
// consumers such as the CLI. Owns the connection lifecycle, request
// correlation, the entity cache, and event fan-out.

mod auth;
pub mod cache;
pub mod client;
pub mod config;
pub mod connection;
pub mod correlator;
pub mod dispatcher;
pub mod error;
mod heartbeat;

pub use cache::EntityStateCache;
pub use client::HubClient;
pub use config::{ClientConfig, TlsVerification};
pub use connection::ConnectionState;
pub use correlator::{PendingReply, RequestCorrelator};
pub use dispatcher::{EventDispatcher, HubEvent, StateChange};
pub use error::CoreError;

// Wire-layer types that appear in this crate's public API.
pub use hublink_api::{Connector, Entity, EntityQuery, MatchMode, ServiceCall, Target};
