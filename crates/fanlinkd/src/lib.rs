//! fanlinkd - local-network discovery and control of smart fans
//!
//! This crate provides the runtime behind the `fanlink` CLI:
//! - `listener` - UDP beacon listener feeding the registry
//! - `registry` - Device registry actor, the single owner of device state
//! - `sweeper` - Periodic eviction of devices that went silent
//! - `dispatcher` - One-shot JSON command delivery
//! - `service` - [`DiscoveryService`], which owns the lifecycle of all of the above
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      DiscoveryService                        │
//! ├──────────────────────────────────────────────────────────────┤
//! │                                                              │
//! │  ┌─────────────────┐  upsert   ┌──────────────────────────┐  │
//! │  │ BeaconListener  │──────────▶│      RegistryActor       │  │
//! │  │  (UDP :5625)    │           │   (device state owner)   │  │
//! │  └─────────────────┘           └────────────┬─────────────┘  │
//! │  ┌─────────────────┐  sweep                 │                │
//! │  │    Sweeper      │──────────▶  get        │ events         │
//! │  └─────────────────┘           ▲            ▼                │
//! │  ┌─────────────────┐           │   ┌──────────────────────┐  │
//! │  │CommandDispatcher│───────────┘   │  broadcast::Sender   │  │
//! │  │ (UDP → :5600)   │               └──────────────────────┘  │
//! │  └─────────────────┘                                         │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! Production code in this crate never panics:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod clock;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod listener;
pub mod registry;
pub mod service;
pub mod sweeper;
pub mod transport;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, ServiceConfig};
pub use dispatcher::{CommandDispatcher, Delivery, DispatchError};
pub use error::ServiceError;
pub use registry::{DeviceEvent, RemovalReason};
pub use service::DiscoveryService;
