//! Supervised route discovery - node engine and simulation driver
//!
//! Models a simplified ad-hoc route-discovery exchange (RREQ / RREP / DATA)
//! as a discrete-event simulation. Every node runs its own event loop and
//! carries two supervisory guards:
//!
//! - **RREQ guard**: a node may not issue a second route request while a
//!   request cycle is in flight.
//! - **RREP guard**: a node may not accept a route reply until another node
//!   has forwarded a reply or sent data.
//!
//! # Architecture
//!
//! - **Event**: immutable `(source, kind)` value, copied into every queue
//! - **Supervisor**: total two-state machines consulted before each action
//! - **Node**: owns its state and guards, mutated only by its own loop
//! - **Driver**: spawns the node loops and broadcasts events in lockstep,
//!   waiting for every node to acknowledge before moving on
//!
//! # Example
//!
//! ```no_run
//! use aodv_core::{Driver, DriverConfig, Event, EventKind, NodeId};
//!
//! #[tokio::main]
//! async fn main() -> aodv_core::Result<()> {
//!     let mut driver = Driver::start([NodeId(1), NodeId(2)], DriverConfig::default())?;
//!
//!     let report = driver.feed(Event::new(NodeId(1), EventKind::RequestSend)).await?;
//!     for observation in &report.observations {
//!         println!("{observation}");
//!     }
//!
//!     driver.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod driver;
pub mod error;
pub mod event;
pub mod node;
pub mod scenario;
pub mod supervisor;

pub use config::DriverConfig;
pub use driver::{DeliveryFailure, Driver, NodeFailure, StepReport};
pub use error::{Error, Result};
pub use event::{Event, EventKind, NodeId};
pub use node::{Action, Delivery, Guarded, Node, NodeObserver, NodeSnapshot, NodeState, Observation, Outcome};
pub use scenario::{PathStep, RouteDiscovery, RouteOutcome};
pub use supervisor::{RrepState, RrepSupervisor, RreqState, RreqSupervisor, Supervisor};
