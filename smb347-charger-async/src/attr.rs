//! Named configuration attributes.
//!
//! Each attribute write is validated and turned into a configuration [`Event`], which is
//! queued like any other event so it is applied in order with hardware notifications.

use embassy_sync::blocking_mutex::raw::RawMutex;

use crate::event::{Event, EventQueue, QueueFull, ThermalAdjustMode};
use crate::protection::ProtectionFlags;

/// A writable configuration attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigAttr {
    /// Enables the protection with the given 1-based number.
    ProtectionEnable,
    /// Disables the protection with the given 1-based number.
    ProtectionDisable,
    /// Charge-current ceiling in mA.
    ChargeCurrent,
    /// Input-current ceiling in mA.
    InputCurrent,
    /// Thermal de-rating in mA.
    ChargeCurrentReduction,
    /// 0 de-rates the input current, 1 the charge current.
    ThermalAdjustMode,
    /// 1 marks the battery as not recognized, 0 clears it.
    BadBattery,
    /// Any write forces the source to be treated as removed.
    ForceDisconnect,
    /// Battery capacity in mAh.
    BatteryCapacity,
}

/// A value outside the range accepted by an attribute.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct InvalidValue(pub i32);

/// An error from [`write_attr`].
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum AttrError {
    /// The value was rejected.
    InvalidValue(i32),
    /// The event queue had no free slot.
    QueueFull(Event),
}

impl From<InvalidValue> for AttrError {
    fn from(err: InvalidValue) -> Self {
        AttrError::InvalidValue(err.0)
    }
}

impl From<QueueFull> for AttrError {
    fn from(err: QueueFull) -> Self {
        AttrError::QueueFull(err.0)
    }
}

impl ConfigAttr {
    /// All attributes, in the order they are listed to users.
    pub const ALL: [ConfigAttr; 9] = [
        ConfigAttr::ProtectionEnable,
        ConfigAttr::ProtectionDisable,
        ConfigAttr::ChargeCurrent,
        ConfigAttr::InputCurrent,
        ConfigAttr::ChargeCurrentReduction,
        ConfigAttr::ThermalAdjustMode,
        ConfigAttr::BadBattery,
        ConfigAttr::ForceDisconnect,
        ConfigAttr::BatteryCapacity,
    ];

    /// Looks an attribute up by name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|attr| attr.name() == name)
    }

    /// The name accepted by [`ConfigAttr::from_name`].
    pub fn name(self) -> &'static str {
        match self {
            ConfigAttr::ProtectionEnable => "protection_enable",
            ConfigAttr::ProtectionDisable => "protection_disable",
            ConfigAttr::ChargeCurrent => "charge_current",
            ConfigAttr::InputCurrent => "input_current",
            ConfigAttr::ChargeCurrentReduction => "charge_current_reduction",
            ConfigAttr::ThermalAdjustMode => "thermal_adjust_mode",
            ConfigAttr::BadBattery => "bad_battery",
            ConfigAttr::ForceDisconnect => "force_disconnect",
            ConfigAttr::BatteryCapacity => "battery_capacity",
        }
    }

    /// Validates `value` and builds the matching event.
    pub fn to_event(self, value: i32) -> Result<Event, InvalidValue> {
        let invalid = InvalidValue(value);
        let milliamps = || u16::try_from(value).map_err(|_| invalid);
        let protection = || {
            u8::try_from(value)
                .ok()
                .and_then(ProtectionFlags::from_index)
                .ok_or(invalid)
        };

        let event = match self {
            ConfigAttr::ProtectionEnable => Event::EnableProtection(protection()?),
            ConfigAttr::ProtectionDisable => Event::DisableProtection(protection()?),
            ConfigAttr::ChargeCurrent => Event::SetChargeCurrent(milliamps()?),
            ConfigAttr::InputCurrent => Event::SetInputCurrent(milliamps()?),
            ConfigAttr::ChargeCurrentReduction => Event::SetChargeCurrentReduction(milliamps()?),
            ConfigAttr::BatteryCapacity => Event::SetBatteryCapacity(milliamps()?),
            ConfigAttr::ThermalAdjustMode => match value {
                0 => Event::SetThermalAdjustMode(ThermalAdjustMode::InputCurrent),
                1 => Event::SetThermalAdjustMode(ThermalAdjustMode::ChargeCurrent),
                _ => return Err(invalid),
            },
            ConfigAttr::BadBattery => match value {
                0 => Event::SetBadBattery(false),
                1 => Event::SetBadBattery(true),
                _ => return Err(invalid),
            },
            ConfigAttr::ForceDisconnect => Event::ForceDisconnect,
        };
        Ok(event)
    }
}

/// Validates an attribute write and queues the resulting event.
pub fn write_attr<M: RawMutex, const N: usize>(
    queue: &EventQueue<M, N>,
    attr: ConfigAttr,
    value: i32,
) -> Result<(), AttrError> {
    let event = attr
        .to_event(value)
        .inspect_err(|_| log::warn!("smb347: {} rejects {value}", attr.name()))?;
    queue.push(event)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

    use super::*;

    #[test]
    fn names_round_trip() {
        for attr in ConfigAttr::ALL {
            assert_eq!(ConfigAttr::from_name(attr.name()), Some(attr));
        }
        assert_eq!(ConfigAttr::from_name("charge_voltage"), None);
    }

    #[test]
    fn protection_numbers() {
        assert_eq!(
            ConfigAttr::ProtectionEnable.to_event(10),
            Ok(Event::EnableProtection(ProtectionFlags::TOO_WEAK))
        );
        assert_eq!(
            ConfigAttr::ProtectionDisable.to_event(1),
            Ok(Event::DisableProtection(ProtectionFlags::BAT_FULL))
        );
        assert_eq!(ConfigAttr::ProtectionEnable.to_event(0), Err(InvalidValue(0)));
        assert_eq!(ConfigAttr::ProtectionEnable.to_event(11), Err(InvalidValue(11)));
        assert_eq!(ConfigAttr::ProtectionDisable.to_event(-3), Err(InvalidValue(-3)));
    }

    #[test]
    fn value_ranges() {
        assert_eq!(
            ConfigAttr::ChargeCurrent.to_event(1500),
            Ok(Event::SetChargeCurrent(1500))
        );
        assert_eq!(ConfigAttr::InputCurrent.to_event(-1), Err(InvalidValue(-1)));
        assert_eq!(
            ConfigAttr::BatteryCapacity.to_event(70_000),
            Err(InvalidValue(70_000))
        );
        assert_eq!(
            ConfigAttr::ThermalAdjustMode.to_event(1),
            Ok(Event::SetThermalAdjustMode(ThermalAdjustMode::ChargeCurrent))
        );
        assert_eq!(ConfigAttr::ThermalAdjustMode.to_event(2), Err(InvalidValue(2)));
        assert_eq!(ConfigAttr::BadBattery.to_event(1), Ok(Event::SetBadBattery(true)));
        assert_eq!(ConfigAttr::BadBattery.to_event(5), Err(InvalidValue(5)));
        assert_eq!(ConfigAttr::ForceDisconnect.to_event(0), Ok(Event::ForceDisconnect));
    }

    #[test]
    fn writes_are_queued_in_order() {
        let queue: EventQueue<CriticalSectionRawMutex, 2> = EventQueue::new();
        write_attr(&queue, ConfigAttr::ChargeCurrent, 900).unwrap();
        assert_eq!(
            write_attr(&queue, ConfigAttr::BadBattery, 7),
            Err(AttrError::InvalidValue(7))
        );
        write_attr(&queue, ConfigAttr::BadBattery, 0).unwrap();
        assert_eq!(
            write_attr(&queue, ConfigAttr::ForceDisconnect, 1),
            Err(AttrError::QueueFull(Event::ForceDisconnect))
        );

        assert_eq!(queue.try_pop(), Some(Event::SetChargeCurrent(900)));
        assert_eq!(queue.try_pop(), Some(Event::SetBadBattery(false)));
        assert_eq!(queue.try_pop(), None);
    }
}
