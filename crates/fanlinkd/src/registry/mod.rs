//! Device registry using Actor pattern.
//!
//! The registry is the single shared mutable resource of the service: the
//! beacon listener and the cleanup sweeper write to it, the dispatcher and
//! API consumers read from it. It receives commands via a tokio mpsc channel
//! and answers each over a oneshot, so every read is an owned copy.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │ BeaconListener  │──┐
//! └─────────────────┘  │  RegistryCommand   ┌─────────────────┐   DeviceEvent   ┌──────────────┐
//! ┌─────────────────┐  ├──────────────────▶│  RegistryActor  │───────────────▶│  subscribers │
//! │ CleanupSweeper  │──┤   (mpsc channel)   │ HashMap<Key,Rec>│   (broadcast)   └──────────────┘
//! └─────────────────┘  │                    └─────────────────┘
//! ┌─────────────────┐  │
//! │CommandDispatcher│──┘ (reads only)
//! └─────────────────┘
//! ```

use tokio::sync::{broadcast, mpsc};

mod actor;
mod commands;
mod handle;

pub use actor::{RegistryActor, MAX_DEVICES};
pub use commands::{DeviceEvent, RegistryCommand, RegistryError, RemovalReason, UpsertOutcome};
pub use handle::RegistryHandle;

/// Channel buffer sizes
const COMMAND_BUFFER: usize = 100;
const EVENT_BUFFER: usize = 100;

/// Spawn the registry actor and return a handle for interaction.
///
/// The actor runs until every clone of the returned handle is dropped.
///
/// # Example
///
/// ```no_run
/// use fanlinkd::registry::spawn_registry;
///
/// #[tokio::main]
/// async fn main() {
///     let handle = spawn_registry();
///     let devices = handle.snapshot().await;
///     assert!(devices.is_empty());
/// }
/// ```
pub fn spawn_registry() -> RegistryHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
    let (event_tx, _) = broadcast::channel(EVENT_BUFFER);

    let actor = RegistryActor::new(cmd_rx, event_tx.clone());
    tokio::spawn(actor.run());

    RegistryHandle::new(cmd_tx, event_tx)
}
