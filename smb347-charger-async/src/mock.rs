//! In-memory charger and host used by the unit tests.

extern crate std;

use std::vec::Vec;

use crate::controller::ChargerState;
use crate::host::PowerSupplyHost;
use crate::port::RegisterPort;

/// Bus failure injected by [`FakeRegisters`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusFault;

/// 256-byte register file that records every write.
pub struct FakeRegisters {
    regs: [u8; 256],
    writes: Vec<(u8, u8)>,
    fail: bool,
}

impl FakeRegisters {
    pub fn new() -> Self {
        Self {
            regs: [0u8; 256],
            writes: Vec::new(),
            fail: false,
        }
    }

    /// Presets a register without recording a write.
    pub fn set(&mut self, addr: u8, value: u8) {
        self.regs[usize::from(addr)] = value;
    }

    pub fn get(&self, addr: u8) -> u8 {
        self.regs[usize::from(addr)]
    }

    pub fn writes(&self) -> &[(u8, u8)] {
        &self.writes
    }

    pub fn clear_writes(&mut self) {
        self.writes.clear();
    }

    /// Makes every following transaction fail.
    pub fn set_failing(&mut self, fail: bool) {
        self.fail = fail;
    }
}

impl RegisterPort for FakeRegisters {
    type Error = BusFault;

    async fn read(&mut self, addr: u8) -> Result<u8, Self::Error> {
        if self.fail {
            return Err(BusFault);
        }
        Ok(self.get(addr))
    }

    async fn write(&mut self, addr: u8, value: u8) -> Result<(), Self::Error> {
        if self.fail {
            return Err(BusFault);
        }
        self.regs[usize::from(addr)] = value;
        self.writes.push((addr, value));
        Ok(())
    }
}

/// Host callbacks, recorded.
#[derive(Default)]
pub struct RecordingHost {
    pub usb: Vec<bool>,
    pub ac: Vec<bool>,
    pub power_offs: usize,
    pub wake: Vec<bool>,
    pub trace: Vec<ChargerState>,
}

impl PowerSupplyHost for RecordingHost {
    fn on_usb_online(&mut self, online: bool) {
        self.usb.push(online);
    }

    fn on_ac_online(&mut self, online: bool) {
        self.ac.push(online);
    }

    fn power_off(&mut self) {
        self.power_offs += 1;
    }

    fn hold_wake(&mut self, held: bool) {
        self.wake.push(held);
    }

    fn on_state_change(&mut self, _from: ChargerState, to: ChargerState) {
        self.trace.push(to);
    }
}
