//! The single consumer of the event queue.
//!
//! [`ChargerController::run`] is meant to be the body of a dedicated embassy task. It
//! sleeps until an event arrives, the wake-release deadline passes or a stop is requested.

use embassy_futures::select::{select3, Either3};
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::{Instant, Timer};

use crate::controller::ChargerController;
use crate::event::EventQueue;
use crate::host::PowerSupplyHost;
use crate::port::RegisterPort;

async fn deadline(at: Option<Instant>) {
    match at {
        Some(at) => Timer::at(at).await,
        None => core::future::pending().await,
    }
}

impl<P, H> ChargerController<P, H>
where
    P: RegisterPort,
    H: PowerSupplyHost,
{
    /// Processes events from `queue` until [`EventQueue::request_stop`] is called.
    ///
    /// Events are handled one at a time in insertion order. On stop the release timer is
    /// cancelled, the wake resource dropped and anything still queued is discarded.
    /// Returns the number of discarded events.
    pub async fn run<M: RawMutex, const N: usize>(&mut self, queue: &EventQueue<M, N>) -> usize {
        log::info!("smb347: worker started");
        loop {
            match select3(
                queue.stopped(),
                queue.receive(),
                deadline(self.release_deadline()),
            )
            .await
            {
                Either3::First(()) => break,
                Either3::Second(event) => self.handle_event(event).await,
                Either3::Third(()) => {
                    self.release_wake_if_due(Instant::now());
                }
            }
        }

        self.teardown();
        let discarded = queue.pop_all_and_process(|event| {
            log::debug!("smb347: dropping {event:?}");
        });
        log::info!("smb347: worker stopped, {discarded} events discarded");
        discarded
    }
}
