// hublink-api: wire protocol, REST gateway, and socket transport for hub clients

pub mod error;
pub mod model;
pub mod query;
pub mod rest;
pub mod retry;
pub mod transport;
pub mod websocket;
pub mod wire;

pub use error::Error;
pub use model::Entity;
pub use query::{EntityQuery, MatchMode};
pub use rest::{RestGateway, ServiceCall, Target};
pub use retry::{Backoff, RetryPolicy};
pub use transport::{TlsMode, TransportConfig};
pub use websocket::{Connector, Link, LinkEvent, WsConnector};
