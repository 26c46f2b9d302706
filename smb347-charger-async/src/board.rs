//! Board specific configuration: register presets and which protections apply.

use crate::port::RegisterPort;
use crate::protection::ProtectionFlags;
use crate::regs::{
    is_config_register, CFG_CHARGE_CONTROL, CFG_FLOAT_VOLTAGE, CFG_OTHER_CONTROL, CFG_PIN_CONTROL,
    CFG_THERM_CONTROL,
};

/// Register presets for boards before revision 2.
///
/// Charging is controlled through the enable pin, APSD runs in hardware.
const LEGACY_REGISTERS: &[(u8, u8)] = &[
    (CFG_FLOAT_VOLTAGE, 0xE3),
    (CFG_CHARGE_CONTROL, 0x84),
    (CFG_PIN_CONTROL, 0x60),
    (CFG_THERM_CONTROL, 0x85),
];

/// Register presets for revision 2 and later.
///
/// Charging is controlled through `CMD_A`, thermistor monitoring is left to the fuel gauge.
const STANDARD_REGISTERS: &[(u8, u8)] = &[
    (CFG_FLOAT_VOLTAGE, 0xE3),
    (CFG_CHARGE_CONTROL, 0x84),
    (CFG_PIN_CONTROL, 0x20),
    (CFG_THERM_CONTROL, 0x95),
    (CFG_OTHER_CONTROL, 0x0C),
];

/// Everything that differs between board families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoardProfile {
    /// Human readable name, used in logs.
    pub name: &'static str,
    /// Hardware revision this profile was selected for.
    pub revision: u8,
    /// Whether the protection engine is consulted at all.
    pub protections_supported: bool,
    /// Protections enabled at start-up.
    pub default_protections: ProtectionFlags,
    /// Whether every `Init` re-runs port detection instead of trusting a cached result.
    pub fresh_detection: bool,
    /// Configuration register presets, applied in order.
    pub registers: &'static [(u8, u8)],
}

impl BoardProfile {
    /// First revision with a working protection path.
    pub const PROTECTION_REVISION: u8 = 2;

    /// Early boards: charging is never gated by protections.
    pub const LEGACY: BoardProfile = BoardProfile {
        name: "legacy",
        revision: 0,
        protections_supported: false,
        default_protections: ProtectionFlags::empty(),
        fresh_detection: false,
        registers: LEGACY_REGISTERS,
    };

    /// Production boards.
    pub const STANDARD: BoardProfile = BoardProfile {
        name: "standard",
        revision: Self::PROTECTION_REVISION,
        protections_supported: true,
        default_protections: ProtectionFlags::BAT_FULL
            .union(ProtectionFlags::I2C_FAIL)
            .union(ProtectionFlags::NOT_RECOGNIZED)
            .union(ProtectionFlags::NTC_ERROR)
            .union(ProtectionFlags::THERMAL)
            .union(ProtectionFlags::ADJUST_CURRENT_VOLTAGE)
            .union(ProtectionFlags::NO_SUITABLE_CURRENT),
        fresh_detection: true,
        registers: STANDARD_REGISTERS,
    };

    /// Picks the profile for a hardware revision.
    pub fn for_revision(revision: u8) -> BoardProfile {
        let base = if revision < Self::PROTECTION_REVISION {
            Self::LEGACY
        } else {
            Self::STANDARD
        };
        BoardProfile { revision, ..base }
    }
}

/// Writes the board presets.
///
/// Registers already holding the preset value are skipped unless `force` is set. The
/// configuration bank is unlocked for the duration of the sequence and locked again even
/// if a write fails. Returns the number of registers written.
pub async fn apply_board_config<P: RegisterPort>(
    port: &mut P,
    profile: &BoardProfile,
    force: bool,
) -> Result<usize, P::Error> {
    port.set_config_access(true).await?;
    let result = write_presets(port, profile.registers, force).await;
    let relock = port.set_config_access(false).await;
    let written = result?;
    relock?;
    if written > 0 {
        log::info!("smb347: {} board preset, {written} registers written", profile.name);
    }
    Ok(written)
}

async fn write_presets<P: RegisterPort>(
    port: &mut P,
    registers: &[(u8, u8)],
    force: bool,
) -> Result<usize, P::Error> {
    let mut written = 0;
    for &(addr, value) in registers {
        debug_assert!(is_config_register(addr));
        if !force && port.read(addr).await? == value {
            continue;
        }
        port.write(addr, value).await?;
        written += 1;
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use embassy_futures::block_on;

    use super::*;
    use crate::mock::{BusFault, FakeRegisters};
    use crate::regs::{CMD_A, CMD_A_ALLOW_WRITE};

    #[test]
    fn revision_selects_profile() {
        let legacy = BoardProfile::for_revision(1);
        assert!(!legacy.protections_supported);
        assert_eq!(legacy.revision, 1);
        assert_eq!(legacy.registers, LEGACY_REGISTERS);

        let standard = BoardProfile::for_revision(5);
        assert!(standard.protections_supported);
        assert_eq!(standard.revision, 5);
        assert!(standard.default_protections.contains(ProtectionFlags::NO_SUITABLE_CURRENT));
        assert!(!standard.default_protections.contains(ProtectionFlags::TOO_WEAK));
    }

    #[test]
    fn presets_are_idempotent() {
        let mut regs = FakeRegisters::new();
        let profile = BoardProfile::STANDARD;

        let written = block_on(apply_board_config(&mut regs, &profile, false)).unwrap();
        assert_eq!(written, STANDARD_REGISTERS.len());
        for &(addr, value) in STANDARD_REGISTERS {
            assert_eq!(regs.get(addr), value);
        }
        assert_eq!(regs.get(CMD_A) & CMD_A_ALLOW_WRITE, 0);
        assert_eq!(regs.writes().first(), Some(&(CMD_A, CMD_A_ALLOW_WRITE)));

        regs.clear_writes();
        let written = block_on(apply_board_config(&mut regs, &profile, false)).unwrap();
        assert_eq!(written, 0);
        // Only the unlock/relock pair touches the bus.
        assert_eq!(regs.writes(), [(CMD_A, CMD_A_ALLOW_WRITE), (CMD_A, 0)]);

        let written = block_on(apply_board_config(&mut regs, &profile, true)).unwrap();
        assert_eq!(written, STANDARD_REGISTERS.len());
    }

    #[test]
    fn only_differing_registers_are_rewritten() {
        let mut regs = FakeRegisters::new();
        for &(addr, value) in LEGACY_REGISTERS {
            regs.set(addr, value);
        }
        regs.set(CFG_PIN_CONTROL, 0x00);
        let written = block_on(apply_board_config(&mut regs, &BoardProfile::LEGACY, false)).unwrap();
        assert_eq!(written, 1);
        assert!(regs.writes().contains(&(CFG_PIN_CONTROL, 0x60)));
    }

    #[test]
    fn bus_failure_propagates() {
        let mut regs = FakeRegisters::new();
        regs.set_failing(true);
        let result = block_on(apply_board_config(&mut regs, &BoardProfile::STANDARD, false));
        assert_eq!(result, Err(BusFault));
    }
}
