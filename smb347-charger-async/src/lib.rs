//! An asynchronous, `no_std` charging controller for the Summit SMB347 battery charger.
//!
//! This crate provides a `ChargerController` that owns the SMB347 over I2C and decides
//! how the battery is charged. Interrupt handlers, the USB stack and the fuel gauge push
//! [`Event`]s into a bounded [`EventQueue`]; a single task drains the queue and drives the
//! charging state machine, the battery protections and the charge-current selection.
//!
//! # Usage
//!
//! You need an I2C peripheral implementation that satisfies the
//! `embedded-hal-async::i2c::I2c` trait and a [`PowerSupplyHost`] that forwards online
//! changes and power-off requests to the rest of the system.
//!
//! ```no_run
//! use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
//! use embedded_hal_async::i2c::I2c;
//! use smb347_charger_async::{
//!     BoardProfile, ChargerController, ControllerConfig, Event, EventQueue, I2cRegisterPort,
//!     PowerSupplyHost,
//! };
//!
//! static EVENTS: EventQueue<CriticalSectionRawMutex> = EventQueue::new();
//!
//! struct Board;
//!
//! impl PowerSupplyHost for Board {
//!     fn on_usb_online(&mut self, online: bool) {
//!         log::info!("USB online: {online}");
//!     }
//!
//!     fn on_ac_online(&mut self, online: bool) {
//!         log::info!("AC online: {online}");
//!     }
//!
//!     fn power_off(&mut self) {
//!         // Cut the system power rail here.
//!     }
//! }
//!
//! // Body of the charger task.
//! async fn charger_task(i2c: impl I2c) {
//!     let port = I2cRegisterPort::new(i2c);
//!     let mut charger = ChargerController::new(
//!         port,
//!         Board,
//!         BoardProfile::for_revision(2),
//!         ControllerConfig::default(),
//!     );
//!     charger.run(&EVENTS).await;
//! }
//!
//! // From the charger interrupt handler.
//! fn on_charger_irq() {
//!     if let Err(rejected) = EVENTS.push(Event::ChargerIrq) {
//!         log::warn!("charger event dropped: {:?}", rejected.0);
//!     }
//! }
//! ```

#![cfg_attr(not(test), no_std)]

pub mod attr;
pub mod board;
pub mod controller;
pub mod event;
pub mod host;
pub mod port;
pub mod protection;
pub mod regs;
pub mod selector;
pub mod tables;
mod worker;

#[cfg(test)]
mod mock;

pub use attr::{write_attr, AttrError, ConfigAttr, InvalidValue};
pub use board::{apply_board_config, BoardProfile};
pub use controller::{
    next_state, ChargerController, ChargerState, ControllerConfig, WAKE_RELEASE_DELAY,
};
pub use event::{Event, EventQueue, QueueFull, TempBand, ThermalAdjustMode, EVENT_QUEUE_DEPTH};
pub use host::PowerSupplyHost;
pub use port::{I2cRegisterPort, RegisterPort};
pub use protection::{PowerDecision, ProtectionEngine, ProtectionFlags};
pub use selector::ChargeSetting;
