//! fanlink Core - Shared types for smart fan/light control
//!
//! This crate provides the domain types shared between the wire protocol,
//! the discovery service (fanlinkd) and the CLI.
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod command;
pub mod device;
pub mod error;

// Re-exports for convenience
pub use command::{Brightness, BrightnessStep, Command, FanSpeed, LightMode, TimerSetting};
pub use device::{format_last_seen, DeviceKey, DeviceRecord, Series, DEVICE_KEY_LEN, UNKNOWN_SERIES};
pub use error::{DomainError, DomainResult};
