//! `navpat-kernel` – Dispatch & Safety
//!
//! Decides nothing about where the vehicle goes; it fans every sensor sample
//! out to the registered observers and stops the vehicle when it must.
//!
//! # Modules
//!
//! - [`extension`] – [`ExtensionRegistry`][extension::ExtensionRegistry]:
//!   ordered, uniquely named [`Extension`][extension::Extension]s invoked
//!   once per tick and once per sample; the first
//!   [`AbortSignal`][navpat_types::AbortSignal] stops dispatch.
//! - [`interlock`] – the two safety interlocks:
//!   [`NearObstacleInterlock`][interlock::NearObstacleInterlock] (ranging
//!   hysteresis) and [`EmergencyStopInterlock`][interlock::EmergencyStopInterlock]
//!   (external emergency condition).

pub mod extension;
pub mod interlock;

pub use extension::{Extension, ExtensionRegistry, FnExtension, from_fn};
pub use interlock::{
    EmergencyStatus, EmergencyStopInterlock, NearObstacleInterlock, SafetyConfig, SafetyState,
    min_range,
};
