//! SMB347 register addresses and the bit fields the charging state machine reasons about.
//!
//! Only a subset of the register map is described here. Board specific presets for the
//! remaining configuration registers live in [`crate::board`] as raw address/value pairs.

/// Default 7-bit I2C address of the SMB347.
pub const SMB347_I2C_ADDR: u8 = 0x6A;

// --- Configuration registers (non-volatile, need write permission) ---
pub const CFG_CHARGE_CURRENT: u8 = 0x00;
pub const CFG_CURRENT_LIMIT: u8 = 0x01;
pub const CFG_FLOAT_VOLTAGE: u8 = 0x03;
pub const CFG_CHARGE_CONTROL: u8 = 0x04;
pub const CFG_PIN_CONTROL: u8 = 0x06;
pub const CFG_THERM_CONTROL: u8 = 0x07;
pub const CFG_OTHER_CONTROL: u8 = 0x09;
pub const CFG_LAST: u8 = 0x0E;

// --- Command registers (volatile) ---
pub const CMD_A: u8 = 0x30;
pub const CMD_B: u8 = 0x31;

// --- Status registers ---
pub const STAT_C: u8 = 0x3D;
pub const STAT_D: u8 = 0x3E;
pub const STAT_E: u8 = 0x3F;

// --- CFG_CHARGE_CURRENT fields ---
pub const FAST_CHARGE_MASK: u8 = 0b1110_0000;
pub const FAST_CHARGE_SHIFT: u8 = 5;
pub const PRE_CHARGE_MASK: u8 = 0b0001_1000;
pub const PRE_CHARGE_SHIFT: u8 = 3;

// --- CFG_CURRENT_LIMIT fields ---
pub const INPUT_LIMIT_MASK: u8 = 0b0000_1111;

// --- CFG_CHARGE_CONTROL fields ---
pub const APSD_ENABLE: u8 = 0b0000_0100;

// --- CMD_A fields ---
pub const CMD_A_ALLOW_WRITE: u8 = 0b1000_0000;
pub const CMD_A_FORCE_PRECHARGE: u8 = 0b0000_0100;
pub const CMD_A_CHARGE_ENABLE: u8 = 0b0000_0010;

// --- CMD_B fields ---
pub const CMD_B_USB500: u8 = 0b0000_0010;
pub const CMD_B_HIGH_CURRENT: u8 = 0b0000_0001;
pub const CMD_B_MODE_MASK: u8 = CMD_B_USB500 | CMD_B_HIGH_CURRENT;

// --- STAT_C fields ---
pub const STAT_C_CHARGER_ERROR: u8 = 0b0100_0000;
pub const STAT_C_CHARGING_MASK: u8 = 0b0000_0110;
pub const STAT_C_CHARGING_SHIFT: u8 = 1;

// --- STAT_D fields ---
pub const STAT_D_APSD_DONE: u8 = 0b0000_1000;
pub const STAT_D_APSD_MASK: u8 = 0b0000_0111;

// --- STAT_E fields ---
pub const STAT_E_AICL_DONE: u8 = 0b0001_0000;
pub const STAT_E_AICL_MASK: u8 = 0b0000_1111;

/// Returns `true` if `addr` is a configuration register that needs write permission.
pub const fn is_config_register(addr: u8) -> bool {
    addr <= CFG_LAST
}

/// Port type reported by Automatic Power Source Detection in `STAT_D`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApsdResult {
    /// Detection has not produced a result.
    NotRun,
    /// Charging downstream port.
    ChargingDownstream,
    /// Dedicated charging port.
    Dedicated,
    /// Other charging port.
    Other,
    /// Standard downstream port.
    StandardDownstream,
    /// Accessory charger adapter, treated like an unidentified charger.
    Accessory,
    /// Detection could not decide.
    ToBeDetermined,
}

impl From<u8> for ApsdResult {
    fn from(stat_d: u8) -> Self {
        match stat_d & STAT_D_APSD_MASK {
            1 => ApsdResult::ChargingDownstream,
            2 => ApsdResult::Dedicated,
            3 => ApsdResult::Other,
            4 => ApsdResult::StandardDownstream,
            5 => ApsdResult::Accessory,
            6 | 7 => ApsdResult::ToBeDetermined,
            _ => ApsdResult::NotRun,
        }
    }
}

/// Charging phase reported in `STAT_C`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargePhase {
    /// No charging.
    Idle,
    /// Pre-charge phase.
    PreCharge,
    /// Fast charge phase.
    FastCharge,
    /// Taper (constant voltage) phase.
    Taper,
}

/// Decoded view of the status registers read when the charger interrupt fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChargerStatus {
    /// The charger flagged an error (safety timer, thermal, ...).
    pub error: bool,
    /// Current charging phase.
    pub phase: ChargePhase,
    /// APSD finished and `apsd` is meaningful.
    pub apsd_done: bool,
    /// Result of the last APSD run.
    pub apsd: ApsdResult,
    /// AICL finished and `aicl_raw` is meaningful.
    pub aicl_done: bool,
    /// Raw AICL result index.
    pub aicl_raw: u8,
}

impl ChargerStatus {
    /// Decodes the `STAT_C`, `STAT_D` and `STAT_E` register values.
    pub fn decode(stat_c: u8, stat_d: u8, stat_e: u8) -> Self {
        let phase = match (stat_c & STAT_C_CHARGING_MASK) >> STAT_C_CHARGING_SHIFT {
            0b00 => ChargePhase::Idle,
            0b01 => ChargePhase::PreCharge,
            0b10 => ChargePhase::FastCharge,
            _ => ChargePhase::Taper,
        };
        Self {
            error: stat_c & STAT_C_CHARGER_ERROR != 0,
            phase,
            apsd_done: stat_d & STAT_D_APSD_DONE != 0,
            apsd: ApsdResult::from(stat_d),
            aicl_done: stat_e & STAT_E_AICL_DONE != 0,
            aicl_raw: stat_e & STAT_E_AICL_MASK,
        }
    }

    /// Returns `true` while the charger is actively charging.
    pub fn is_charging(&self) -> bool {
        self.phase != ChargePhase::Idle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_status_bytes() {
        let status = ChargerStatus::decode(0b0000_0100, STAT_D_APSD_DONE | 2, STAT_E_AICL_DONE | 4);
        assert!(!status.error);
        assert_eq!(status.phase, ChargePhase::FastCharge);
        assert!(status.is_charging());
        assert!(status.apsd_done);
        assert_eq!(status.apsd, ApsdResult::Dedicated);
        assert!(status.aicl_done);
        assert_eq!(status.aicl_raw, 4);
    }

    #[test]
    fn error_bit_and_idle_phase() {
        let status = ChargerStatus::decode(STAT_C_CHARGER_ERROR, 0, 0);
        assert!(status.error);
        assert!(!status.is_charging());
        assert_eq!(status.apsd, ApsdResult::NotRun);
        assert!(!status.apsd_done);
    }

    #[test]
    fn config_bank_boundary() {
        assert!(is_config_register(CFG_CHARGE_CURRENT));
        assert!(is_config_register(CFG_LAST));
        assert!(!is_config_register(CMD_A));
    }
}
