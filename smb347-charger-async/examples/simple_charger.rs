//! Drives the charger controller against a simulated SMB347 on the host.
//!
//! A dedicated charger is plugged in, detected, charged through a warm spell and a full
//! battery, then unplugged.
use embassy_executor::Spawner;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_time::{Duration, Timer};
use embedded_hal_async::i2c::{ErrorKind, ErrorType, I2c, Operation};
use log::{error, info, LevelFilter, Log, Metadata, Record};
use smb347_charger_async::regs::{
    STAT_C, STAT_D, STAT_D_APSD_DONE, STAT_E, STAT_E_AICL_DONE, SMB347_I2C_ADDR,
};
use smb347_charger_async::{
    BoardProfile, ChargerController, ControllerConfig, Event, EventQueue, I2cRegisterPort,
    PowerSupplyHost, TempBand, WAKE_RELEASE_DELAY,
};

static EVENTS: EventQueue<CriticalSectionRawMutex> = EventQueue::new();

struct StdoutLogger;

impl Log for StdoutLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        println!("{:<5} {}", record.level(), record.args());
    }

    fn flush(&self) {}
}

static LOGGER: StdoutLogger = StdoutLogger;

/// Register file answering on the SMB347 address.
struct SimulatedCharger {
    regs: [u8; 256],
}

impl ErrorType for SimulatedCharger {
    type Error = ErrorKind;
}

impl I2c for SimulatedCharger {
    async fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        if address != SMB347_I2C_ADDR {
            return Err(ErrorKind::Other);
        }
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

struct Board;

impl PowerSupplyHost for Board {
    fn on_usb_online(&mut self, online: bool) {
        info!("USB online: {online}");
    }

    fn on_ac_online(&mut self, online: bool) {
        info!("AC online: {online}");
    }

    fn power_off(&mut self) {
        error!("Power off requested");
    }

    fn hold_wake(&mut self, held: bool) {
        info!("Wake lock held: {held}");
    }
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    log::set_logger(&LOGGER).expect("Could not install logger");
    log::set_max_level(LevelFilter::Info);

    // Detection finished on a dedicated charger, fast charging, AICL at 1500 mA.
    let mut charger = SimulatedCharger { regs: [0u8; 256] };
    charger.regs[usize::from(STAT_D)] = STAT_D_APSD_DONE | 2;
    charger.regs[usize::from(STAT_C)] = 0b0000_0100;
    charger.regs[usize::from(STAT_E)] = STAT_E_AICL_DONE | 5;

    spawner
        .spawn(charger_task(charger))
        .expect("Failed to spawn charger_task");

    let script = [
        Event::DetectSource,
        Event::ChargerIrq,
        Event::ChargerIrq,
        Event::Thermal(TempBand::Step7),
        Event::BatteryFull,
        Event::RechargeBattery,
        Event::Thermal(TempBand::Step6),
        Event::SourceRemoved,
    ];
    for event in script {
        if let Err(rejected) = EVENTS.push(event) {
            error!("Event dropped: {:?}", rejected.0);
        }
        Timer::after(Duration::from_millis(100)).await;
    }

    Timer::after(WAKE_RELEASE_DELAY + Duration::from_millis(200)).await;
    EVENTS.request_stop();
    Timer::after(Duration::from_millis(100)).await;
    info!("Done.");
    std::process::exit(0);
}

#[embassy_executor::task]
async fn charger_task(charger: SimulatedCharger) {
    let mut controller = ChargerController::new(
        I2cRegisterPort::new(charger),
        Board,
        BoardProfile::for_revision(2),
        ControllerConfig::default(),
    );
    let discarded = controller.run(&EVENTS).await;
    info!("Final state: {:?}", controller.state());
    info!("Charger task stopped, {discarded} events discarded");
}
