//! Events consumed by the charging state machine and the bounded queue that carries them.
//!
//! Producers (charger interrupt, USB notifier, battery notifier, configuration writes) call
//! [`EventQueue::push`], which never blocks and is safe from interrupt context. A single
//! consumer drains the queue in insertion order, see
//! [`ChargerController::run`](crate::ChargerController::run).

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::{Channel, TrySendError};
use embassy_sync::signal::Signal;

use crate::protection::ProtectionFlags;

/// Number of slots in the event queue.
pub const EVENT_QUEUE_DEPTH: usize = 30;

/// One of the eight ordered battery temperature bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TempBand {
    /// Below -20 °C.
    Step1,
    /// -20 °C to 0 °C.
    Step2,
    /// 0 °C to 10 °C.
    Step3,
    /// 10 °C to 14 °C.
    Step4,
    /// 14 °C to 23 °C.
    Step5,
    /// 23 °C to 45 °C.
    Step6,
    /// 45 °C to 60 °C.
    Step7,
    /// Above 60 °C.
    Step8,
}

impl TempBand {
    /// Band assumed before any thermal event has been seen.
    pub const ROOM: TempBand = TempBand::Step6;

    /// Maps a 1-based thermal step number to its band.
    pub fn from_step(step: u8) -> Option<Self> {
        Some(match step {
            1 => TempBand::Step1,
            2 => TempBand::Step2,
            3 => TempBand::Step3,
            4 => TempBand::Step4,
            5 => TempBand::Step5,
            6 => TempBand::Step6,
            7 => TempBand::Step7,
            8 => TempBand::Step8,
            _ => return None,
        })
    }

    /// The 1-based step number of this band.
    pub fn step(self) -> u8 {
        self as u8 + 1
    }
}

/// Which limit is lowered when the battery needs thermal de-rating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThermalAdjustMode {
    /// Lower the input current limit.
    #[default]
    InputCurrent,
    /// Lower the charge current.
    ChargeCurrent,
}

/// An input to the charging state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // --- USB / port detection ---
    /// The power source was unplugged.
    SourceRemoved,
    /// A source may be attached; start detection.
    DetectSource,
    /// VBUS is present, port type not known yet.
    VbusPresent,
    /// Standard downstream port detected.
    PortStandard,
    /// Charging downstream port detected.
    PortChargingDownstream,
    /// Dedicated charger detected.
    PortDedicated,
    /// Some other charger detected.
    PortOther,
    /// Detection could not classify the port yet.
    PortToBeDetermined,
    /// Host allows 100 mA.
    Limit100,
    /// Host allows 500 mA.
    Limit500,
    /// The charger interrupt line fired; status registers need reading.
    ChargerIrq,

    // --- Thermal ---
    /// The battery entered a new temperature band.
    Thermal(TempBand),
    /// Re-run the protection decision without changing any flag.
    RecheckProtection,
    /// The charge current needs thermal adjustment.
    AdjustCurrentForThermal,

    // --- Battery health ---
    /// The battery is full.
    BatteryFull,
    /// The battery dropped below the recharge threshold.
    RechargeBattery,
    /// Fuel gauge reported an unknown status.
    BatteryUnknown,
    /// Battery voltage is critically low.
    BatteryWeak,
    /// Battery voltage is back to normal.
    BatteryHealthy,
    /// Thermistor reads zero, it is probably disconnected.
    NtcZero,
    /// Thermistor reads sane values again.
    NtcNormal,
    /// The fuel gauge stopped answering on the bus.
    I2cFail,
    /// The fuel gauge answers again.
    I2cNormal,
    /// The pack was not recognized.
    NotRecognized,
    /// The pack was recognized.
    Recognized,

    // --- Control ---
    /// Re-initialize from `Suspend`.
    CheckInit,
    /// Hand control over to an external override.
    ChangeToOnDemand,
    /// Return control from the external override to the state machine.
    ChangeToInternalFsm,
    /// The system is shutting down.
    Shutdown,

    // --- Configuration surface ---
    /// Enable the given protections.
    EnableProtection(ProtectionFlags),
    /// Disable the given protections.
    DisableProtection(ProtectionFlags),
    /// Desired charge-current ceiling in mA.
    SetChargeCurrent(u16),
    /// Desired input-current ceiling in mA.
    SetInputCurrent(u16),
    /// Thermal de-rating subtracted from the ceiling, in mA.
    SetChargeCurrentReduction(u16),
    /// Selects which limit thermal de-rating acts on.
    SetThermalAdjustMode(ThermalAdjustMode),
    /// Marks the pack as bad (or good again).
    SetBadBattery(bool),
    /// Act as if the source was unplugged.
    ForceDisconnect,
    /// Battery capacity used for C-rate calculations, in mAh.
    SetBatteryCapacity(u16),
}

impl Event {
    /// Returns `true` for battery-health events.
    pub fn is_battery_health(&self) -> bool {
        matches!(
            self,
            Event::BatteryFull
                | Event::RechargeBattery
                | Event::BatteryUnknown
                | Event::BatteryWeak
                | Event::BatteryHealthy
                | Event::NtcZero
                | Event::NtcNormal
                | Event::I2cFail
                | Event::I2cNormal
                | Event::NotRecognized
                | Event::Recognized
        )
    }

    /// Returns `true` for thermal events.
    pub fn is_thermal(&self) -> bool {
        matches!(
            self,
            Event::Thermal(_) | Event::RecheckProtection | Event::AdjustCurrentForThermal
        )
    }

    /// Returns `true` if the event requires the protection decision to be re-run.
    pub fn needs_protection_check(&self) -> bool {
        self.is_battery_health()
            || self.is_thermal()
            || matches!(
                self,
                Event::EnableProtection(_)
                    | Event::DisableProtection(_)
                    | Event::SetBadBattery(_)
                    | Event::SetChargeCurrent(_)
                    | Event::SetInputCurrent(_)
                    | Event::SetChargeCurrentReduction(_)
                    | Event::SetThermalAdjustMode(_)
                    | Event::SetBatteryCapacity(_)
            )
    }

    /// Returns `true` if the event may change the selected charge current.
    pub fn alters_current(&self) -> bool {
        matches!(
            self,
            Event::Thermal(_)
                | Event::AdjustCurrentForThermal
                | Event::SetChargeCurrent(_)
                | Event::SetChargeCurrentReduction(_)
                | Event::SetThermalAdjustMode(_)
                | Event::SetBatteryCapacity(_)
        )
    }
}

/// The queue was full and the event was rejected.
///
/// The rejected event is handed back so the producer can log or retry it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFull(pub Event);

/// Bounded multi-producer, single-consumer FIFO of pending events.
///
/// On overflow the newest event is rejected; queued events are never overwritten.
pub struct EventQueue<M: RawMutex, const N: usize = EVENT_QUEUE_DEPTH> {
    channel: Channel<M, Event, N>,
    stop: Signal<M, ()>,
}

impl<M: RawMutex, const N: usize> EventQueue<M, N> {
    /// Creates an empty queue.
    pub const fn new() -> Self {
        Self {
            channel: Channel::new(),
            stop: Signal::new(),
        }
    }

    /// Enqueues an event without blocking.
    ///
    /// Returns [`QueueFull`] carrying the event if all `N` slots are taken.
    pub fn push(&self, event: Event) -> Result<(), QueueFull> {
        self.channel.try_send(event).map_err(|err| match err {
            TrySendError::Full(event) => QueueFull(event),
        })
    }

    /// Waits for the next event.
    pub async fn receive(&self) -> Event {
        self.channel.receive().await
    }

    /// Takes the oldest event, if any.
    pub fn try_pop(&self) -> Option<Event> {
        self.channel.try_receive().ok()
    }

    /// Pops events in FIFO order and hands each to `handler` until the queue is empty.
    ///
    /// Returns the number of events processed.
    pub fn pop_all_and_process(&self, mut handler: impl FnMut(Event)) -> usize {
        let mut count = 0;
        while let Some(event) = self.try_pop() {
            handler(event);
            count += 1;
        }
        count
    }

    /// Number of queued events.
    pub fn len(&self) -> usize {
        self.channel.len()
    }

    /// Returns `true` if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.channel.is_empty()
    }

    /// Number of slots.
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Asks the consumer task to tear down and return.
    pub fn request_stop(&self) {
        self.stop.signal(());
    }

    pub(crate) async fn stopped(&self) {
        self.stop.wait().await
    }
}

impl<M: RawMutex, const N: usize> Default for EventQueue<M, N> {
    fn default() -> Self {
        Self::new()
    }
}
