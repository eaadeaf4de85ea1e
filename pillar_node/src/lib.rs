// Pillar Node
//
// A storage pillar of a distributed bit-preservation repository. Clients hold
// conversations with a set of pillars over a message bus: an identify phase
// in which each pillar says whether it can take part, then a perform phase in
// which the chosen pillars stream progress and final responses.
//
// # Architecture
//
// * **API Layer**: HTTP ingress accepting protocol messages
// * **Mediator**: decodes message kinds and routes them to handlers
// * **Handlers**: the identify and perform steps of every operation
// * **Storage Model**: file archive plus checksum cache behind one facade
// * **Bus, Exchange**: outbound responses and alarms, content transfers
// * **Alarm, Audit**: escalation policy and the per-message audit trail
//
// # Usage
//
// ```rust,no_run
// use pillar_node::api::ApiServer;
// use pillar_node::config::PillarConfig;
// use pillar_node::node::PillarNode;
//
// async fn example() -> Result<(), Box<dyn std::error::Error>> {
//     let config = PillarConfig::load("config.toml")?;
//     let bind_address = config.api.bind_address.clone();
//     let node = PillarNode::from_config(config)?;
//
//     ApiServer::new(node.mediator(), bind_address).start().await?;
//     Ok(())
// }
// ```

/// Alarm escalation policy and alarm delivery.
pub mod alarm;

/// HTTP API of the pillar.
///
/// Accepts protocol messages and hands them to the mediator; responses are
/// sent asynchronously over the message bus.
pub mod api;

/// Audit trail of every handled message.
pub mod audit;

/// Outbound message bus for responses and alarms.
pub mod bus;

/// Checksum algorithms and validation.
pub mod checksum;

/// Configuration loading (TOML file plus `PILLAR__` environment overrides).
pub mod config;

/// Error types.
pub mod error;

/// Content transfers to and from the addresses named in requests.
pub mod exchange;

/// Identify and perform handlers, one per operation.
pub mod handlers;

/// Message registry and dispatch.
pub mod mediator;

/// Node assembly from configuration.
pub mod node;

/// Response construction.
pub mod response;

/// File archive, checksum cache and the storage model over both.
///
/// # Features
///
/// * Filesystem archive with staging and retention areas
/// * In-memory archive for tests and ephemeral pillars
/// * SQLite or in-memory checksum cache
/// * Per-file locking for mutating operations
pub mod storage;

/// Protocol data types and messages.
pub mod types;

pub use error::{PillarError, Result};
pub use mediator::PillarMediator;
pub use node::PillarNode;
