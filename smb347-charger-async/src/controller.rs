//! The charging state machine.
//!
//! [`ChargerController`] owns all per-device state. It is fed one [`Event`] at a time by
//! the worker task and translates state transitions and protection decisions into
//! register writes and host notifications.
//!
//! Bus failures inside entry actions are logged and otherwise ignored: the transition
//! still completes and the hardware is left in its last configuration.

use core::fmt::Debug;

use embassy_time::{Duration, Instant};
use heapless::Vec;

use crate::board::{apply_board_config, BoardProfile};
use crate::event::{Event, TempBand, ThermalAdjustMode};
use crate::host::PowerSupplyHost;
use crate::port::RegisterPort;
use crate::protection::{PowerDecision, ProtectionEngine, ProtectionFlags};
use crate::regs::*;
use crate::selector::{select_for_target, select_input_limit, target_current, ChargeSetting};
use crate::tables::{aicl_result_ma, FAST_CHARGE_MAX_INDEX, INPUT_CURRENT_MAX_MA};

/// How long the wake resource is kept after the source goes away.
pub const WAKE_RELEASE_DELAY: Duration = Duration::from_secs(1);

/// Mode of the charger, exactly one is current at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargerState {
    /// No source attached.
    Suspend,
    /// An external override drives the charger.
    OnDemand,
    /// A source may be attached, detection in progress.
    Init,
    /// VBUS seen on a standard port, waiting for the host current limit.
    PortClassifying,
    /// USB host, 100 mA.
    LimitedHost100mA,
    /// USB host, 500 mA.
    LimitedHost500mA,
    /// Charging downstream port.
    ChargingDownstreamPort,
    /// Dedicated charger.
    DedicatedCharger,
    /// Detection could not decide, treated as a charger.
    UnknownCharger,
    /// Non-standard charger.
    OtherCharger,
    /// The charger reports an active charge cycle.
    Charging,
    /// The charger reported an error.
    ChargeError,
    /// Terminal, no further transitions.
    Shutdown,
}

impl ChargerState {
    /// Returns `true` for the states reached once a source has been classified.
    pub fn is_source_attached(self) -> bool {
        matches!(
            self,
            ChargerState::LimitedHost100mA
                | ChargerState::LimitedHost500mA
                | ChargerState::ChargingDownstreamPort
                | ChargerState::DedicatedCharger
                | ChargerState::UnknownCharger
                | ChargerState::OtherCharger
        )
    }
}

/// Transition for events that need no bus access to decide.
///
/// Returns `None` when the event leaves the state unchanged.
pub fn next_state(state: ChargerState, event: &Event) -> Option<ChargerState> {
    use ChargerState::*;

    match (state, event) {
        (Shutdown, _) => None,
        (_, Event::Shutdown) => Some(Shutdown),
        (Suspend, Event::SourceRemoved | Event::ForceDisconnect) => None,
        (_, Event::SourceRemoved | Event::ForceDisconnect) => Some(Suspend),
        (OnDemand, Event::ChangeToInternalFsm) => Some(Init),
        (OnDemand, _) => None,
        (_, Event::ChangeToOnDemand) => Some(OnDemand),
        (Suspend, Event::CheckInit | Event::DetectSource) => Some(Init),
        (Init, Event::VbusPresent | Event::PortStandard) => Some(PortClassifying),
        (Init, Event::PortChargingDownstream) => Some(ChargingDownstreamPort),
        (Init, Event::PortDedicated) => Some(DedicatedCharger),
        (Init | PortClassifying, Event::PortToBeDetermined) => Some(UnknownCharger),
        (Init, Event::PortOther) => Some(OtherCharger),
        (Init | PortClassifying | LimitedHost500mA, Event::Limit100) => Some(LimitedHost100mA),
        (Init | PortClassifying | LimitedHost100mA, Event::Limit500) => Some(LimitedHost500mA),
        _ => None,
    }
}

fn is_port_classification(event: &Event) -> bool {
    matches!(
        event,
        Event::VbusPresent
            | Event::PortStandard
            | Event::PortChargingDownstream
            | Event::PortDedicated
            | Event::PortOther
            | Event::PortToBeDetermined
    )
}

fn port_event(apsd: ApsdResult) -> Option<Event> {
    match apsd {
        ApsdResult::StandardDownstream => Some(Event::PortStandard),
        ApsdResult::ChargingDownstream => Some(Event::PortChargingDownstream),
        ApsdResult::Dedicated => Some(Event::PortDedicated),
        ApsdResult::Other => Some(Event::PortOther),
        ApsdResult::Accessory | ApsdResult::ToBeDetermined => Some(Event::PortToBeDetermined),
        ApsdResult::NotRun => None,
    }
}

/// Logs a failed bus transaction and carries on.
fn best_effort<T, E: Debug>(what: &str, result: Result<T, E>) -> Option<T> {
    result
        .inspect_err(|e| log::warn!("smb347: {what} failed: {e:?}"))
        .ok()
}

/// Tunables supplied when the controller is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Battery capacity used for C-rate calculations, in mAh.
    pub capacity_mah: u16,
    /// Requested input-current ceiling, in mA.
    pub input_current_ma: u16,
    /// Requested charge-current ceiling, in mA.
    pub charge_current_ma: u16,
    /// Thermal de-rating subtracted from the active ceiling, in mA.
    pub charge_current_reduction_ma: u16,
    /// Which ceiling the de-rating acts on.
    pub thermal_adjust_mode: ThermalAdjustMode,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            capacity_mah: 4325,
            input_current_ma: INPUT_CURRENT_MAX_MA,
            charge_current_ma: 2500,
            charge_current_reduction_ma: 0,
            thermal_adjust_mode: ThermalAdjustMode::InputCurrent,
        }
    }
}

/// Per-device state of one charger, created at attach time.
pub struct ChargerController<P, H> {
    port: P,
    host: H,
    profile: BoardProfile,
    config: ControllerConfig,
    state: ChargerState,
    protection: ProtectionEngine,
    decision: PowerDecision,
    power_off_sent: bool,
    setting: Option<ChargeSetting>,
    input_limit: Option<u8>,
    charging_enabled: Option<bool>,
    usb_online: bool,
    ac_online: bool,
    wake_held: bool,
    release_deadline: Option<Instant>,
    cached_port: Option<Event>,
    redetect: bool,
    weak_armed: bool,
    input_unfit: bool,
    last_aicl: Option<u8>,
    debug_register: u8,
}

impl<P, H> ChargerController<P, H>
where
    P: RegisterPort,
    H: PowerSupplyHost,
{
    /// Creates a controller in [`ChargerState::Suspend`].
    ///
    /// # Arguments
    ///
    /// * `port` - Register access to the charger.
    /// * `host` - Receives online notifications and power-off requests.
    /// * `profile` - Board presets and protection support.
    /// * `config` - Initial current ceilings and battery capacity.
    pub fn new(port: P, host: H, profile: BoardProfile, config: ControllerConfig) -> Self {
        log::info!(
            "smb347: controller for {} board rev {}",
            profile.name,
            profile.revision
        );
        Self {
            port,
            host,
            protection: ProtectionEngine::new(
                profile.protections_supported,
                profile.default_protections,
            ),
            profile,
            config,
            state: ChargerState::Suspend,
            decision: PowerDecision::Normal,
            power_off_sent: false,
            setting: None,
            input_limit: None,
            charging_enabled: None,
            usb_online: false,
            ac_online: false,
            wake_held: false,
            release_deadline: None,
            cached_port: None,
            redetect: false,
            weak_armed: false,
            input_unfit: false,
            last_aicl: None,
            debug_register: CFG_CHARGE_CURRENT,
        }
    }

    /// Current state.
    pub fn state(&self) -> ChargerState {
        self.state
    }

    /// Protection masks and last seen temperature band.
    pub fn protection(&self) -> &ProtectionEngine {
        &self.protection
    }

    /// Last protection decision applied to the hardware.
    pub fn decision(&self) -> PowerDecision {
        self.decision
    }

    /// Last charge setting written.
    pub fn charge_setting(&self) -> Option<ChargeSetting> {
        self.setting
    }

    /// Last input limit row written.
    pub fn input_limit(&self) -> Option<u8> {
        self.input_limit
    }

    /// Current tunables.
    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// USB online flag as last reported to the host.
    pub fn usb_online(&self) -> bool {
        self.usb_online
    }

    /// AC online flag as last reported to the host.
    pub fn ac_online(&self) -> bool {
        self.ac_online
    }

    /// When the wake resource will be released, if a release is pending.
    pub fn release_deadline(&self) -> Option<Instant> {
        self.release_deadline
    }

    /// Last AICL result in mA.
    pub fn aicl_ma(&self) -> Option<u16> {
        self.last_aicl.map(aicl_result_ma)
    }

    /// The host hooks.
    pub fn host(&self) -> &H {
        &self.host
    }

    /// The register port.
    pub fn port(&self) -> &P {
        &self.port
    }

    /// Consumes the controller and returns the port and host.
    pub fn into_parts(self) -> (P, H) {
        (self.port, self.host)
    }

    /// Feeds one event through the state machine.
    ///
    /// Follow-up events produced internally (a cached or freshly detected port type) are
    /// processed before this returns.
    pub async fn handle_event(&mut self, event: Event) {
        let mut next = Some(event);
        while let Some(event) = next.take() {
            next = self.dispatch(event).await;
        }
    }

    async fn dispatch(&mut self, event: Event) -> Option<Event> {
        if self.state == ChargerState::Shutdown {
            log::debug!("smb347: {event:?} ignored after shutdown");
            return None;
        }
        log::debug!("smb347: {event:?} in {:?}", self.state);

        self.apply_settings(&event).await;
        if self.state == ChargerState::Suspend && is_port_classification(&event) {
            self.cached_port = Some(event);
        }

        let (target, mut follow_up) = if event == Event::ChargerIrq {
            self.service_irq().await
        } else {
            (next_state(self.state, &event), None)
        };

        if let Some(target) = target {
            if target != self.state {
                follow_up = follow_up.or(self.enter(target).await);
            }
        }

        if event.needs_protection_check() && self.state != ChargerState::Shutdown {
            self.protection.apply(&event);
            self.evaluate(event.alters_current()).await;
        }
        follow_up
    }

    async fn apply_settings(&mut self, event: &Event) {
        let input_mode = self.config.thermal_adjust_mode == ThermalAdjustMode::InputCurrent;
        match *event {
            Event::SetChargeCurrent(ma) => self.config.charge_current_ma = ma,
            Event::SetBatteryCapacity(mah) => self.config.capacity_mah = mah,
            Event::SetThermalAdjustMode(mode) => {
                self.config.thermal_adjust_mode = mode;
                self.write_input_limit(self.input_ceiling()).await;
            }
            Event::SetInputCurrent(ma) => {
                self.config.input_current_ma = ma;
                self.write_input_limit(self.input_ceiling()).await;
            }
            Event::SetChargeCurrentReduction(ma) => {
                self.config.charge_current_reduction_ma = ma;
                if input_mode {
                    self.write_input_limit(self.input_ceiling()).await;
                }
            }
            Event::AdjustCurrentForThermal if input_mode => {
                self.write_input_limit(self.input_ceiling()).await;
            }
            // An explicit choice replaces the one made on unplug.
            Event::EnableProtection(flags) | Event::DisableProtection(flags)
                if flags.contains(ProtectionFlags::TOO_WEAK) =>
            {
                self.weak_armed = false;
            }
            _ => {}
        }
    }

    // --- Transitions ---

    async fn enter(&mut self, target: ChargerState) -> Option<Event> {
        let from = self.state;
        self.state = target;
        log::info!("smb347: {from:?} -> {target:?}");
        self.host.on_state_change(from, target);

        match target {
            ChargerState::Suspend => self.enter_suspend().await,
            ChargerState::Init => return self.enter_init().await,
            ChargerState::PortClassifying => self.set_online(true, false),
            ChargerState::LimitedHost100mA => {
                self.set_input_mode(0).await;
                self.set_online(true, false);
                self.evaluate(false).await;
            }
            ChargerState::LimitedHost500mA => {
                self.set_input_mode(CMD_B_USB500).await;
                self.set_online(true, false);
                self.evaluate(false).await;
            }
            ChargerState::ChargingDownstreamPort => {
                self.enter_high_current().await;
                self.set_online(true, false);
                self.evaluate(false).await;
            }
            ChargerState::DedicatedCharger
            | ChargerState::UnknownCharger
            | ChargerState::OtherCharger => {
                self.enter_high_current().await;
                self.set_online(false, true);
                self.evaluate(false).await;
            }
            ChargerState::Charging => {}
            ChargerState::ChargeError => {
                log::warn!("smb347: charger reported an error, charging stopped");
                self.set_charging(false).await;
            }
            ChargerState::OnDemand => self.reinitialize().await,
            ChargerState::Shutdown => self.enter_shutdown().await,
        }
        None
    }

    async fn enter_suspend(&mut self) {
        self.set_online(false, false);
        self.cached_port = None;
        if self.wake_held {
            self.release_deadline = Some(Instant::now() + WAKE_RELEASE_DELAY);
        }
        if self.protection.is_supported() {
            if !self.protection.enabled().contains(ProtectionFlags::TOO_WEAK) {
                self.protection.enable(ProtectionFlags::TOO_WEAK);
                self.weak_armed = true;
            }
            self.evaluate(false).await;
        }
    }

    async fn enter_init(&mut self) -> Option<Event> {
        if self.release_deadline.take().is_some() {
            log::debug!("smb347: wake release cancelled");
        }
        if !self.wake_held {
            self.wake_held = true;
            self.host.hold_wake(true);
        }
        if self.weak_armed {
            self.weak_armed = false;
            self.protection.disable(ProtectionFlags::TOO_WEAK);
        }

        let follow_up = if self.profile.fresh_detection || self.redetect {
            self.redetect = false;
            self.cached_port = None;
            self.start_detection().await;
            None
        } else {
            self.cached_port.take()
        };

        best_effort(
            "board configuration",
            apply_board_config(&mut self.port, &self.profile, false).await,
        );
        self.evaluate(true).await;
        follow_up
    }

    async fn enter_high_current(&mut self) {
        self.set_input_mode(CMD_B_HIGH_CURRENT).await;
        self.write_input_limit(self.input_ceiling()).await;
    }

    async fn enter_shutdown(&mut self) {
        if self.config.input_current_ma != INPUT_CURRENT_MAX_MA {
            self.config.input_current_ma = INPUT_CURRENT_MAX_MA;
            self.write_input_limit(INPUT_CURRENT_MAX_MA).await;
        }
        self.write_setting(ChargeSetting::FastCharge(FAST_CHARGE_MAX_INDEX))
            .await;
        self.set_charging(true).await;
    }

    /// Forces the presets and current settings back into the hardware.
    async fn reinitialize(&mut self) {
        best_effort(
            "board configuration",
            apply_board_config(&mut self.port, &self.profile, true).await,
        );
        self.write_input_limit(self.input_ceiling()).await;
        self.redetect = true;
        self.evaluate(true).await;
    }

    async fn service_irq(&mut self) -> (Option<ChargerState>, Option<Event>) {
        let Some(status) = best_effort("status read", self.read_status().await) else {
            return (None, None);
        };

        if status.aicl_done && self.last_aicl != Some(status.aicl_raw) {
            self.last_aicl = Some(status.aicl_raw);
            log::info!("smb347: AICL settled at {} mA", aicl_result_ma(status.aicl_raw));
        }

        let target = match self.state {
            ChargerState::Init => {
                if status.apsd_done {
                    self.cached_port = port_event(status.apsd);
                    return (None, self.cached_port);
                }
                None
            }
            state if state.is_source_attached() => {
                if status.error {
                    Some(ChargerState::ChargeError)
                } else if status.is_charging() {
                    Some(ChargerState::Charging)
                } else {
                    None
                }
            }
            ChargerState::Charging if status.error => Some(ChargerState::ChargeError),
            ChargerState::ChargeError if !status.error && status.is_charging() => {
                Some(ChargerState::Charging)
            }
            _ => None,
        };
        (target, None)
    }

    // --- Protection ---

    /// Re-derives the protection decision and drives the hardware accordingly.
    ///
    /// With `reselect` the charge current is recomputed first, which may trigger or clear
    /// [`ProtectionFlags::NO_SUITABLE_CURRENT`].
    async fn evaluate(&mut self, reselect: bool) {
        let mut decision = self.protection.decide();
        if reselect && decision != PowerDecision::PowerOff {
            self.reselect_current().await;
            decision = self.protection.decide();
        }
        log::debug!(
            "smb347: {decision:?} (enabled {:?}, triggered {:?})",
            self.protection.enabled(),
            self.protection.triggered()
        );
        self.decision = decision;

        match decision {
            PowerDecision::PowerOff => {
                self.set_charging(false).await;
                if !self.power_off_sent {
                    self.power_off_sent = true;
                    log::error!("smb347: battery protection requests power off");
                    self.host.power_off();
                }
            }
            PowerDecision::DisableCharging => self.set_charging(false).await,
            PowerDecision::Normal => self.set_charging(true).await,
        }
    }

    async fn reselect_current(&mut self) {
        let band = self.protection.band().unwrap_or(TempBand::ROOM);
        if matches!(band, TempBand::Step1 | TempBand::Step2 | TempBand::Step8) {
            return;
        }
        let setting = select_for_target(self.charge_target(band));
        self.protection.set_triggered(
            ProtectionFlags::NO_SUITABLE_CURRENT,
            setting == ChargeSetting::NoneFound || self.input_unfit,
        );
        self.write_setting(setting).await;
    }

    fn thermal_adjust_active(&self) -> bool {
        self.protection
            .enabled()
            .contains(ProtectionFlags::ADJUST_CURRENT_VOLTAGE)
    }

    /// Band target capped by the charge ceiling.
    ///
    /// The reduction only applies while [`ProtectionFlags::ADJUST_CURRENT_VOLTAGE`] is
    /// enabled, so boards without protections never de-rate.
    fn charge_target(&self, band: TempBand) -> u16 {
        let mut ceiling = self.config.charge_current_ma;
        if self.thermal_adjust_active()
            && self.config.thermal_adjust_mode == ThermalAdjustMode::ChargeCurrent
        {
            ceiling = ceiling.saturating_sub(self.config.charge_current_reduction_ma);
        }
        target_current(band, self.config.capacity_mah).min(ceiling)
    }

    fn input_ceiling(&self) -> u16 {
        let ceiling = self.config.input_current_ma;
        if self.thermal_adjust_active()
            && self.config.thermal_adjust_mode == ThermalAdjustMode::InputCurrent
        {
            ceiling.saturating_sub(self.config.charge_current_reduction_ma)
        } else {
            ceiling
        }
    }

    // --- Hardware actions ---

    fn set_online(&mut self, usb: bool, ac: bool) {
        if self.usb_online != usb {
            self.usb_online = usb;
            self.host.on_usb_online(usb);
        }
        if self.ac_online != ac {
            self.ac_online = ac;
            self.host.on_ac_online(ac);
        }
    }

    async fn set_charging(&mut self, enable: bool) {
        let value = if enable { CMD_A_CHARGE_ENABLE } else { 0 };
        let result = self.port.update(CMD_A, CMD_A_CHARGE_ENABLE, value).await;
        if best_effort("charge enable", result).is_some() && self.charging_enabled != Some(enable)
        {
            log::info!(
                "smb347: charging {}",
                if enable { "enabled" } else { "disabled" }
            );
            self.charging_enabled = Some(enable);
        }
    }

    async fn set_input_mode(&mut self, mode: u8) {
        let result = self.port.update(CMD_B, CMD_B_MODE_MASK, mode).await;
        best_effort("input mode", result);
    }

    /// Programs the largest input limit that fits `ceiling_ma`.
    ///
    /// A ceiling below the smallest row programs that row and triggers
    /// [`ProtectionFlags::NO_SUITABLE_CURRENT`] until a ceiling fits again.
    async fn write_input_limit(&mut self, ceiling_ma: u16) {
        let fitted = select_input_limit(ceiling_ma);
        if fitted.is_none() {
            log::warn!("smb347: no input limit fits {ceiling_ma} mA");
        }
        self.input_unfit = fitted.is_none();
        let index = fitted.unwrap_or(0);
        self.protection.set_triggered(
            ProtectionFlags::NO_SUITABLE_CURRENT,
            self.input_unfit || self.setting == Some(ChargeSetting::NoneFound),
        );
        let result = self
            .update_config(CFG_CURRENT_LIMIT, INPUT_LIMIT_MASK, index)
            .await;
        if best_effort("input current limit", result).is_some() {
            self.input_limit = Some(index);
        }
    }

    async fn write_setting(&mut self, setting: ChargeSetting) {
        let result = match setting {
            ChargeSetting::FastCharge(index) => {
                let value = index << FAST_CHARGE_SHIFT;
                match self
                    .update_config(CFG_CHARGE_CURRENT, FAST_CHARGE_MASK, value)
                    .await
                {
                    Ok(()) => self.port.update(CMD_A, CMD_A_FORCE_PRECHARGE, 0).await,
                    Err(e) => Err(e),
                }
            }
            ChargeSetting::PreCharge(index) => {
                let value = index << PRE_CHARGE_SHIFT;
                match self
                    .update_config(CFG_CHARGE_CURRENT, PRE_CHARGE_MASK, value)
                    .await
                {
                    Ok(()) => {
                        self.port
                            .update(CMD_A, CMD_A_FORCE_PRECHARGE, CMD_A_FORCE_PRECHARGE)
                            .await
                    }
                    Err(e) => Err(e),
                }
            }
            ChargeSetting::NoneFound => {
                log::warn!("smb347: no supported current for this battery");
                self.port.update(CMD_A, CMD_A_FORCE_PRECHARGE, 0).await
            }
        };
        if best_effort("charge current", result).is_some() {
            if self.setting != Some(setting) {
                log::info!(
                    "smb347: charge current {setting:?} ({:?} mA)",
                    setting.milliamps()
                );
            }
            self.setting = Some(setting);
        }
    }

    async fn update_config(&mut self, addr: u8, mask: u8, value: u8) -> Result<(), P::Error> {
        self.port.set_config_access(true).await?;
        let result = self.port.update(addr, mask, value).await;
        let relock = self.port.set_config_access(false).await;
        result?;
        relock
    }

    async fn start_detection(&mut self) {
        let result = async {
            self.port.set_config_access(true).await?;
            self.port.update(CFG_CHARGE_CONTROL, APSD_ENABLE, 0).await?;
            self.port
                .update(CFG_CHARGE_CONTROL, APSD_ENABLE, APSD_ENABLE)
                .await?;
            self.port.set_config_access(false).await
        }
        .await;
        if best_effort("port detection", result).is_some() {
            log::debug!("smb347: port detection started");
        }
    }

    async fn read_status(&mut self) -> Result<ChargerStatus, P::Error> {
        let stat_c = self.port.read(STAT_C).await?;
        let stat_d = self.port.read(STAT_D).await?;
        let stat_e = self.port.read(STAT_E).await?;
        Ok(ChargerStatus::decode(stat_c, stat_d, stat_e))
    }

    // --- Wake resource ---

    /// Releases the wake resource if its release deadline has passed.
    ///
    /// Returns `true` if it was released.
    pub fn release_wake_if_due(&mut self, now: Instant) -> bool {
        match self.release_deadline {
            Some(deadline) if now >= deadline => {
                self.release_deadline = None;
                self.release_wake();
                true
            }
            _ => false,
        }
    }

    /// Cancels any pending release and drops the wake resource immediately.
    pub fn teardown(&mut self) {
        self.release_deadline = None;
        self.release_wake();
    }

    fn release_wake(&mut self) {
        if self.wake_held {
            self.wake_held = false;
            self.host.hold_wake(false);
            log::debug!("smb347: wake resource released");
        }
    }

    // --- Debug surface ---

    /// Selects the register read by [`Self::read_debug_register`].
    pub fn select_debug_register(&mut self, addr: u8) {
        self.debug_register = addr;
    }

    /// Reads the selected debug register.
    pub async fn read_debug_register(&mut self) -> Result<(u8, u8), P::Error> {
        let addr = self.debug_register;
        Ok((addr, self.port.read(addr).await?))
    }

    /// Reads the configuration, command and status banks.
    pub async fn dump_registers(&mut self) -> Result<Vec<(u8, u8), 32>, P::Error> {
        let mut dump = Vec::new();
        for addr in (CFG_CHARGE_CURRENT..=CFG_LAST).chain(CMD_A..=STAT_E) {
            let value = self.port.read(addr).await?;
            if dump.push((addr, value)).is_err() {
                break;
            }
        }
        Ok(dump)
    }
}
