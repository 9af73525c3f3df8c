//! Wake timers delivered through the dispatcher.
//!
//! All core timeouts (command response, send-message transmission,
//! data-path confirmation) are modelled as events: a [`WakeupTimer`]
//! sleeps in a background task and, on expiry, pushes its event onto the
//! dispatcher queue like any other input. Cancellation is idempotent and
//! rearming replaces the previous schedule.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::event::CoreEvent;

/// A single rearmable wake timer bound to the dispatcher queue.
pub struct WakeupTimer {
    events: mpsc::UnboundedSender<CoreEvent>,
    pending: Option<JoinHandle<()>>,
}

impl WakeupTimer {
    pub fn new(events: mpsc::UnboundedSender<CoreEvent>) -> Self {
        Self {
            events,
            pending: None,
        }
    }

    /// Arm the timer to deliver `event` after `delay`. Replaces any
    /// previously armed schedule.
    pub fn schedule(&mut self, delay: Duration, event: CoreEvent) {
        self.schedule_at(Instant::now() + delay, event);
    }

    /// Arm the timer to deliver `event` at `deadline`. Replaces any
    /// previously armed schedule.
    pub fn schedule_at(&mut self, deadline: Instant, event: CoreEvent) {
        self.cancel();
        let events = self.events.clone();
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            // Delivery failure means the dispatcher is gone; nothing to do.
            let _ = events.send(event);
        }));
    }

    /// Disarm the timer. Safe to call when not armed, or again after a
    /// previous cancel.
    pub fn cancel(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.abort();
        }
    }
}

impl Drop for WakeupTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn timer_delivers_event_after_delay() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timer = WakeupTimer::new(tx);

        timer.schedule(Duration::from_secs(5), CoreEvent::SendMessageTimeout);
        tokio::time::sleep(Duration::from_secs(6)).await;

        assert!(matches!(
            rx.try_recv().expect("timer fired"),
            CoreEvent::SendMessageTimeout
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_delivery_and_is_idempotent() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timer = WakeupTimer::new(tx);

        timer.schedule(Duration::from_secs(5), CoreEvent::SendMessageTimeout);
        timer.cancel();
        timer.cancel();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_replaces_previous_schedule() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timer = WakeupTimer::new(tx);

        timer.schedule(Duration::from_secs(2), CoreEvent::SendMessageTimeout);
        timer.schedule(
            Duration::from_secs(30),
            CoreEvent::ResponseTimeout {
                transaction_id: crate::types::TransactionId(3),
            },
        );

        // Past the first deadline: nothing fires, the first schedule was
        // replaced.
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(matches!(
            rx.try_recv().expect("rearmed timer fired"),
            CoreEvent::ResponseTimeout { .. }
        ));
    }
}
