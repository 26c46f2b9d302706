//! Battery protection flags and the charge-enable decision derived from them.
//!
//! Two masks are tracked: which protections a deployment cares about (`enabled`) and which
//! conditions are currently true (`triggered`). A protection only has an effect when its
//! bit is set in both.

use bitflags::bitflags;

use crate::event::{Event, TempBand};

bitflags! {
    /// One bit per protection condition.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ProtectionFlags: u16 {
        const BAT_FULL = 1 << 0;
        const I2C_FAIL = 1 << 1;
        const NOT_RECOGNIZED = 1 << 2;
        const NTC_ERROR = 1 << 3;
        const TOO_COLD_FOR_CHARGE = 1 << 4;
        const TOO_COLD_FOR_DISCHARGE = 1 << 5;
        const TOO_HOT_FOR_CHARGE = 1 << 6;
        const ADJUST_CURRENT_VOLTAGE = 1 << 7;
        const NO_SUITABLE_CURRENT = 1 << 8;
        const TOO_WEAK = 1 << 9;
    }
}

impl ProtectionFlags {
    /// Conditions that power the device off.
    pub const POWER_OFF: Self = Self::TOO_WEAK
        .union(Self::TOO_COLD_FOR_DISCHARGE)
        .union(Self::TOO_HOT_FOR_CHARGE);

    /// Conditions that stop charging.
    pub const CHARGE_DISABLE: Self = Self::BAT_FULL
        .union(Self::I2C_FAIL)
        .union(Self::NOT_RECOGNIZED)
        .union(Self::NTC_ERROR)
        .union(Self::TOO_COLD_FOR_CHARGE)
        .union(Self::NO_SUITABLE_CURRENT);

    /// The three temperature conditions.
    pub const THERMAL: Self = Self::TOO_COLD_FOR_CHARGE
        .union(Self::TOO_COLD_FOR_DISCHARGE)
        .union(Self::TOO_HOT_FOR_CHARGE);

    /// Maps the 1-based protection number used by the configuration surface to its flag.
    pub fn from_index(index: u8) -> Option<Self> {
        if (1..=10).contains(&index) {
            Self::from_bits(1 << (index - 1))
        } else {
            None
        }
    }
}

/// What the charger hardware should be doing given the current protections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerDecision {
    /// Charging enabled.
    Normal,
    /// Charging disabled, the device keeps running.
    DisableCharging,
    /// The device must power down.
    PowerOff,
}

/// Evaluates `enabled` against `triggered`.
///
/// A bit missing from `enabled` can never contribute to the outcome.
pub fn decide(enabled: ProtectionFlags, triggered: ProtectionFlags) -> PowerDecision {
    let active = enabled & triggered;
    if active.intersects(ProtectionFlags::POWER_OFF) {
        PowerDecision::PowerOff
    } else if active.intersects(ProtectionFlags::CHARGE_DISABLE) {
        PowerDecision::DisableCharging
    } else {
        PowerDecision::Normal
    }
}

/// Per-controller protection state.
#[derive(Debug, Clone)]
pub struct ProtectionEngine {
    supported: bool,
    enabled: ProtectionFlags,
    triggered: ProtectionFlags,
    band: Option<TempBand>,
    powered_off: bool,
}

impl ProtectionEngine {
    /// Creates an engine with the given enabled mask.
    ///
    /// With `supported == false` the engine always answers [`PowerDecision::Normal`].
    pub fn new(supported: bool, enabled: ProtectionFlags) -> Self {
        Self {
            supported,
            enabled,
            triggered: ProtectionFlags::empty(),
            band: None,
            powered_off: false,
        }
    }

    /// Protections this deployment cares about.
    pub fn enabled(&self) -> ProtectionFlags {
        self.enabled
    }

    /// Conditions currently true.
    pub fn triggered(&self) -> ProtectionFlags {
        self.triggered
    }

    /// Last temperature band seen.
    pub fn band(&self) -> Option<TempBand> {
        self.band
    }

    /// Returns `true` once a power-off has been decided.
    pub fn is_powered_off(&self) -> bool {
        self.powered_off
    }

    /// Returns `true` if the deployment evaluates protections at all.
    pub fn is_supported(&self) -> bool {
        self.supported
    }

    /// Adds protections to the enabled mask.
    pub fn enable(&mut self, flags: ProtectionFlags) {
        self.enabled.insert(flags);
    }

    /// Removes protections from the enabled mask.
    pub fn disable(&mut self, flags: ProtectionFlags) {
        self.enabled.remove(flags);
    }

    /// Sets or clears triggered conditions directly.
    pub fn set_triggered(&mut self, flags: ProtectionFlags, value: bool) {
        self.triggered.set(flags, value);
    }

    /// Applies the flag changes an event implies and returns the new triggered mask.
    pub fn apply(&mut self, event: &Event) -> ProtectionFlags {
        use ProtectionFlags as F;

        match *event {
            Event::BatteryFull => self.triggered.insert(F::BAT_FULL),
            Event::RechargeBattery => self.triggered.remove(F::BAT_FULL),
            Event::BatteryWeak => self.triggered.insert(F::TOO_WEAK),
            Event::BatteryHealthy => self.triggered.remove(F::TOO_WEAK),
            Event::NtcZero => self.triggered.insert(F::NTC_ERROR),
            Event::NtcNormal => self.triggered.remove(F::NTC_ERROR),
            Event::I2cFail => self.triggered.insert(F::I2C_FAIL),
            Event::I2cNormal => self.triggered.remove(F::I2C_FAIL),
            Event::NotRecognized => self.triggered.insert(F::NOT_RECOGNIZED),
            Event::Recognized => self.triggered.remove(F::NOT_RECOGNIZED),
            Event::SetBadBattery(bad) => self.triggered.set(F::NOT_RECOGNIZED, bad),
            Event::Thermal(band) => {
                self.band = Some(band);
                self.triggered.remove(F::THERMAL);
                match band {
                    TempBand::Step1 => self.triggered.insert(F::TOO_COLD_FOR_DISCHARGE),
                    TempBand::Step2 => self.triggered.insert(F::TOO_COLD_FOR_CHARGE),
                    TempBand::Step8 => self.triggered.insert(F::TOO_HOT_FOR_CHARGE),
                    _ => {}
                }
            }
            Event::EnableProtection(flags) => self.enable(flags),
            Event::DisableProtection(flags) => self.disable(flags),
            _ => {}
        }
        self.triggered
    }

    /// Derives the decision from the current masks.
    ///
    /// A power-off is latched: once decided it is reported for the rest of the session.
    pub fn decide(&mut self) -> PowerDecision {
        if !self.supported {
            return PowerDecision::Normal;
        }
        if self.powered_off {
            return PowerDecision::PowerOff;
        }
        let decision = decide(self.enabled, self.triggered);
        if decision == PowerDecision::PowerOff {
            self.powered_off = true;
        }
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_PROTECTION_EVENTS: [Event; 18] = [
        Event::BatteryFull,
        Event::RechargeBattery,
        Event::BatteryWeak,
        Event::BatteryHealthy,
        Event::NtcZero,
        Event::NtcNormal,
        Event::I2cFail,
        Event::I2cNormal,
        Event::NotRecognized,
        Event::Recognized,
        Event::SetBadBattery(true),
        Event::Thermal(TempBand::Step1),
        Event::Thermal(TempBand::Step2),
        Event::Thermal(TempBand::Step3),
        Event::Thermal(TempBand::Step6),
        Event::Thermal(TempBand::Step8),
        Event::BatteryUnknown,
        Event::RecheckProtection,
    ];

    #[test]
    fn decision_priorities() {
        let all = ProtectionFlags::all();
        assert_eq!(decide(all, ProtectionFlags::empty()), PowerDecision::Normal);
        assert_eq!(
            decide(all, ProtectionFlags::BAT_FULL),
            PowerDecision::DisableCharging
        );
        assert_eq!(
            decide(all, ProtectionFlags::BAT_FULL | ProtectionFlags::TOO_HOT_FOR_CHARGE),
            PowerDecision::PowerOff
        );
        assert_eq!(
            decide(all, ProtectionFlags::ADJUST_CURRENT_VOLTAGE),
            PowerDecision::Normal
        );
    }

    #[test]
    fn bit_needs_enabled_and_triggered() {
        let enabled = ProtectionFlags::all() - ProtectionFlags::TOO_WEAK;
        assert_eq!(
            decide(enabled, ProtectionFlags::TOO_WEAK),
            PowerDecision::Normal
        );
        assert_eq!(
            decide(ProtectionFlags::empty(), ProtectionFlags::all()),
            PowerDecision::Normal
        );
    }

    #[test]
    fn disabled_bit_never_affects_decision() {
        for flag in ProtectionFlags::all().iter() {
            let mut engine = ProtectionEngine::new(true, ProtectionFlags::all() - flag);
            // Only `flag` gets triggered by hand, every other bit stays clear.
            engine.set_triggered(flag, true);
            assert_eq!(engine.decide(), PowerDecision::Normal, "{flag:?}");

            let enabled = ProtectionFlags::all() - flag;
            let mut engine = ProtectionEngine::new(true, enabled);
            for event in ALL_PROTECTION_EVENTS {
                let triggered = engine.apply(&event);
                if engine.is_powered_off() {
                    break;
                }
                let without_flag = decide(enabled, triggered - flag);
                assert_eq!(engine.decide(), without_flag, "{flag:?} {event:?}");
            }
        }
    }

    #[test]
    fn thermal_bands_set_and_clear_bits() {
        let mut engine = ProtectionEngine::new(true, ProtectionFlags::all());

        let triggered = engine.apply(&Event::Thermal(TempBand::Step2));
        assert_eq!(triggered, ProtectionFlags::TOO_COLD_FOR_CHARGE);
        assert_eq!(engine.decide(), PowerDecision::DisableCharging);

        let triggered = engine.apply(&Event::Thermal(TempBand::Step4));
        assert!(triggered.is_empty());
        assert_eq!(engine.band(), Some(TempBand::Step4));
        assert_eq!(engine.decide(), PowerDecision::Normal);

        let triggered = engine.apply(&Event::Thermal(TempBand::Step1));
        assert_eq!(triggered, ProtectionFlags::TOO_COLD_FOR_DISCHARGE);

        let triggered = engine.apply(&Event::Thermal(TempBand::Step8));
        assert_eq!(triggered, ProtectionFlags::TOO_HOT_FOR_CHARGE);
    }

    #[test]
    fn full_and_recharge() {
        let mut engine = ProtectionEngine::new(true, ProtectionFlags::all());
        engine.apply(&Event::BatteryFull);
        assert_eq!(engine.decide(), PowerDecision::DisableCharging);
        engine.apply(&Event::RechargeBattery);
        assert_eq!(engine.decide(), PowerDecision::Normal);
    }

    #[test]
    fn power_off_is_latched() {
        let mut engine = ProtectionEngine::new(true, ProtectionFlags::TOO_WEAK);
        engine.apply(&Event::BatteryWeak);
        assert_eq!(engine.decide(), PowerDecision::PowerOff);

        engine.apply(&Event::BatteryHealthy);
        engine.apply(&Event::DisableProtection(ProtectionFlags::all()));
        assert!(engine.triggered().is_empty());
        assert_eq!(engine.decide(), PowerDecision::PowerOff);
        assert!(engine.is_powered_off());
    }

    #[test]
    fn unsupported_engine_is_always_normal() {
        let mut engine = ProtectionEngine::new(false, ProtectionFlags::all());
        engine.apply(&Event::BatteryWeak);
        engine.apply(&Event::Thermal(TempBand::Step8));
        assert_eq!(engine.decide(), PowerDecision::Normal);
    }

    #[test]
    fn configuration_indices() {
        assert_eq!(ProtectionFlags::from_index(1), Some(ProtectionFlags::BAT_FULL));
        assert_eq!(ProtectionFlags::from_index(10), Some(ProtectionFlags::TOO_WEAK));
        assert_eq!(ProtectionFlags::from_index(0), None);
        assert_eq!(ProtectionFlags::from_index(11), None);
    }
}
