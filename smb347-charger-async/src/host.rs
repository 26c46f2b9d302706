//! Callbacks from the state machine into the surrounding system.

use crate::controller::ChargerState;

/// Notification sink and platform hooks driven by the charging state machine.
///
/// The online callbacks are edge triggered: the controller only calls them when the
/// value actually changes.
pub trait PowerSupplyHost {
    /// USB power became available or went away.
    fn on_usb_online(&mut self, online: bool);

    /// Mains (AC adapter) power became available or went away.
    fn on_ac_online(&mut self, online: bool);

    /// A catastrophic battery condition was detected; cut power.
    fn power_off(&mut self);

    /// Acquire or release the resource that keeps the system awake while a source is attached.
    fn hold_wake(&mut self, _held: bool) {}

    /// Called after every state transition.
    fn on_state_change(&mut self, _from: ChargerState, _to: ChargerState) {}
}
