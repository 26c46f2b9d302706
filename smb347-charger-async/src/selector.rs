//! Maps a temperature band and battery capacity onto the closest supported current setting.

use crate::event::TempBand;
use crate::tables::{search_down, FAST_CHARGE_MA, INPUT_CURRENT_MA, PRE_CHARGE_MA};

/// A resolved charge current.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeSetting {
    /// Row of [`FAST_CHARGE_MA`].
    FastCharge(u8),
    /// Row of [`PRE_CHARGE_MA`].
    PreCharge(u8),
    /// Even the smallest pre-charge current is above the target.
    NoneFound,
}

impl ChargeSetting {
    /// The current this setting delivers, in mA.
    pub fn milliamps(self) -> Option<u16> {
        match self {
            ChargeSetting::FastCharge(index) => FAST_CHARGE_MA.get(usize::from(index)).copied(),
            ChargeSetting::PreCharge(index) => PRE_CHARGE_MA.get(usize::from(index)).copied(),
            ChargeSetting::NoneFound => None,
        }
    }
}

/// C-rate for a band, as a numerator over 100.
///
/// Bands 1, 2 and 8 are handled by the protection engine and never charge; they map to
/// zero so that a stray selection cannot pick a current.
fn c_rate_percent(band: TempBand) -> u32 {
    match band {
        TempBand::Step3 | TempBand::Step4 => 18,
        TempBand::Step5 | TempBand::Step7 => 50,
        TempBand::Step6 => 70,
        TempBand::Step1 | TempBand::Step2 | TempBand::Step8 => 0,
    }
}

/// Target charge current for `band` and a battery of `capacity_mah`, in mA.
pub fn target_current(band: TempBand, capacity_mah: u16) -> u16 {
    let target = u32::from(capacity_mah) * c_rate_percent(band) / 100;
    target.min(u32::from(u16::MAX)) as u16
}

/// Resolves a target current to the largest fast-charge row not above it, falling back to
/// the pre-charge table.
pub fn select_for_target(target_ma: u16) -> ChargeSetting {
    if let Some(index) = search_down(&FAST_CHARGE_MA, target_ma) {
        ChargeSetting::FastCharge(index)
    } else if let Some(index) = search_down(&PRE_CHARGE_MA, target_ma) {
        ChargeSetting::PreCharge(index)
    } else {
        ChargeSetting::NoneFound
    }
}

/// Selects the charge setting for a temperature band and battery capacity.
pub fn select_current(band: TempBand, capacity_mah: u16) -> ChargeSetting {
    select_for_target(target_current(band, capacity_mah))
}

/// Selects the input current limit row for a ceiling in mA.
pub fn select_input_limit(ceiling_ma: u16) -> Option<u8> {
    search_down(&INPUT_CURRENT_MA, ceiling_ma)
}
