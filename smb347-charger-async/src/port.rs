//! Register access to the charger.
//!
//! The state machine only needs byte-wide reads and writes by address. [`I2cRegisterPort`]
//! provides them on top of any `embedded-hal-async` I2C bus, other transports can implement
//! [`RegisterPort`] directly.

use core::fmt::Debug;

use embedded_hal_async::i2c::{I2c, SevenBitAddress};

use crate::regs::{CMD_A, CMD_A_ALLOW_WRITE, SMB347_I2C_ADDR};

/// Synchronous-semantics access to 8-bit registers.
///
/// Implementations may suspend while the bus is busy but must not reorder transactions.
#[allow(async_fn_in_trait)]
pub trait RegisterPort {
    /// Bus error type.
    type Error: Debug;

    /// Reads the register at `addr`.
    async fn read(&mut self, addr: u8) -> Result<u8, Self::Error>;

    /// Writes `value` to the register at `addr`.
    async fn write(&mut self, addr: u8, value: u8) -> Result<(), Self::Error>;

    /// Read-modify-write of the bits selected by `mask`.
    ///
    /// Skips the write if the register already holds the requested bits.
    async fn update(&mut self, addr: u8, mask: u8, value: u8) -> Result<(), Self::Error> {
        let current = self.read(addr).await?;
        let next = (current & !mask) | (value & mask);
        if next != current {
            self.write(addr, next).await?;
        }
        Ok(())
    }

    /// Grants or revokes write permission for the configuration registers.
    async fn set_config_access(&mut self, allow: bool) -> Result<(), Self::Error> {
        let value = if allow { CMD_A_ALLOW_WRITE } else { 0 };
        self.update(CMD_A, CMD_A_ALLOW_WRITE, value).await
    }
}

/// [`RegisterPort`] over an `embedded-hal-async` I2C bus.
pub struct I2cRegisterPort<I2cType> {
    i2c: I2cType,
    address: SevenBitAddress,
}

impl<I2cType, ErrorType> I2cRegisterPort<I2cType>
where
    I2cType: I2c<SevenBitAddress, Error = ErrorType>,
    ErrorType: embedded_hal_async::i2c::Error,
{
    /// Creates a port talking to the SMB347 at its default address.
    ///
    /// # Arguments
    ///
    /// * `i2c` - An I2C peripheral that implements the `embedded-hal-async::i2c::I2c` trait.
    pub fn new(i2c: I2cType) -> Self {
        Self::with_address(i2c, SMB347_I2C_ADDR)
    }

    /// Creates a port talking to a charger strapped to a different address.
    pub fn with_address(i2c: I2cType, address: SevenBitAddress) -> Self {
        Self { i2c, address }
    }

    /// Gives the bus back.
    pub fn release(self) -> I2cType {
        self.i2c
    }
}

impl<I2cType, ErrorType> RegisterPort for I2cRegisterPort<I2cType>
where
    I2cType: I2c<SevenBitAddress, Error = ErrorType>,
    ErrorType: embedded_hal_async::i2c::Error,
{
    type Error = ErrorType;

    async fn read(&mut self, addr: u8) -> Result<u8, Self::Error> {
        let mut buf = [0u8; 1];
        self.i2c
            .write_read(self.address, &[addr], &mut buf)
            .await
            .inspect_err(|e| log::warn!("smb347: read of {addr:#04x} failed: {e:?}"))?;
        Ok(buf[0])
    }

    async fn write(&mut self, addr: u8, value: u8) -> Result<(), Self::Error> {
        log::trace!("smb347: {addr:#04x} <= {value:#010b}");
        self.i2c
            .write(self.address, &[addr, value])
            .await
            .inspect_err(|e| log::warn!("smb347: write of {addr:#04x} failed: {e:?}"))
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use std::vec::Vec;

    use embassy_futures::block_on;
    use embedded_hal_async::i2c::{ErrorKind, ErrorType, Operation};

    use super::*;
    use crate::mock::FakeRegisters;

    /// Register file behind an I2C bus, in the style of a dummy bus device.
    struct DummyI2c {
        regs: [u8; 256],
        transactions: Vec<u8>,
    }

    impl ErrorType for DummyI2c {
        type Error = ErrorKind;
    }

    impl I2c for DummyI2c {
        async fn transaction(
            &mut self,
            address: u8,
            operations: &mut [Operation<'_>],
        ) -> Result<(), Self::Error> {
            if address != SMB347_I2C_ADDR {
                return Err(ErrorKind::Other);
            }
            self.transactions.push(address);
            let mut pointer = 0usize;
            for op in operations {
                match op {
                    Operation::Write(bytes) => {
                        pointer = usize::from(bytes[0]);
                        for (i, b) in bytes.iter().skip(1).enumerate() {
                            self.regs[pointer + i] = *b;
                        }
                    }
                    Operation::Read(buf) => {
                        for (i, b) in buf.iter_mut().enumerate() {
                            *b = self.regs[pointer + i];
                        }
                    }
                }
            }
            Ok(())
        }
    }

    #[test]
    fn reads_and_writes_through_i2c() {
        let bus = DummyI2c {
            regs: [0u8; 256],
            transactions: Vec::new(),
        };
        let mut port = I2cRegisterPort::new(bus);
        block_on(async {
            port.write(0x31, 0x03).await.unwrap();
            assert_eq!(port.read(0x31).await.unwrap(), 0x03);
            port.update(0x31, 0x01, 0x00).await.unwrap();
            assert_eq!(port.read(0x31).await.unwrap(), 0x02);
        });
        let bus = port.release();
        assert_eq!(bus.transactions.len(), 5);
    }

    #[test]
    fn wrong_address_surfaces_bus_error() {
        let bus = DummyI2c {
            regs: [0u8; 256],
            transactions: Vec::new(),
        };
        let mut port = I2cRegisterPort::with_address(bus, 0x10);
        assert_eq!(block_on(port.read(0x00)), Err(ErrorKind::Other));
    }

    #[test]
    fn update_skips_redundant_write() {
        let mut regs = FakeRegisters::new();
        regs.set(CMD_A, CMD_A_ALLOW_WRITE);
        block_on(regs.set_config_access(true)).unwrap();
        assert!(regs.writes().is_empty());
        block_on(regs.set_config_access(false)).unwrap();
        assert_eq!(regs.writes(), [(CMD_A, 0)]);
    }
}
