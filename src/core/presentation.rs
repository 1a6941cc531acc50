// Presentation state machine for the notification curtain.
//
// States are driven only by hub events. A SHOW while anything is on screen
// forces a reset to Hidden; the new alert is parked as pending and only
// reaches the curtain after the settle delay.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::core::alerts::model::Alert;
use crate::core::notifications::events::NotificationEvent;
use crate::core::notifications::manager::NotificationManager;

pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PresentationState {
    #[default]
    Hidden,
    /// Compact dismissible banner
    Curtain,
    /// Expanded view with the drink-water action
    Fullscreen,
}

/// User gestures the presentation layer may turn into hub callbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentationAction {
    Close,
    Expand,
    DrinkWater,
}

#[derive(Debug, Default)]
pub struct PresentationMachine {
    state: PresentationState,
    current: Option<Alert>,
    pending: Option<Alert>,
}

impl PresentationMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> PresentationState {
        self.state
    }

    pub fn current_alert(&self) -> Option<&Alert> {
        self.current.as_ref()
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    fn hide(&mut self) {
        self.state = PresentationState::Hidden;
        self.current = None;
        self.pending = None;
    }

    /// Apply one hub event and return the resulting state.
    pub fn apply(&mut self, event: &NotificationEvent) -> PresentationState {
        let before = self.state;
        match event {
            NotificationEvent::ShowNotification(alert) => {
                self.hide();
                self.pending = Some(alert.clone());
            }
            NotificationEvent::HideNotification(_) | NotificationEvent::WaterCompleted(_) => self.hide(),
            NotificationEvent::ExpandNotification(_) => match self.state {
                PresentationState::Curtain => self.state = PresentationState::Fullscreen,
                PresentationState::Hidden if self.pending.is_some() => {
                    // expanded before the reset settled
                    self.current = self.pending.take();
                    self.state = PresentationState::Fullscreen;
                }
                _ => log::debug!("Ignoring expand while {:?}", self.state),
            },
        }
        if before != self.state {
            log::debug!("Presentation {:?} -> {:?} on {}", before, self.state, event.kind());
        }
        self.state
    }

    /// Move a pending alert onto the curtain. Returns false if nothing was pending.
    pub fn settle(&mut self) -> bool {
        match self.pending.take() {
            Some(alert) => {
                self.current = Some(alert);
                self.state = PresentationState::Curtain;
                log::debug!("Presentation Hidden -> Curtain after settle");
                true
            }
            None => false,
        }
    }

    /// Whether the control for `action` is visible in the current state.
    pub fn allows(&self, action: PresentationAction) -> bool {
        matches!(
            (action, self.state),
            (PresentationAction::Close, PresentationState::Curtain | PresentationState::Fullscreen)
                | (PresentationAction::Expand, PresentationState::Curtain)
                | (PresentationAction::DrinkWater, PresentationState::Fullscreen)
        )
    }
}

/// Event-loop wrapper around the machine that owns the settle timer and
/// forwards user actions to the hub.
pub struct Presenter {
    manager: Arc<NotificationManager>,
    machine: Mutex<PresentationMachine>,
    settle_delay: Duration,
}

impl Presenter {
    pub fn new(manager: Arc<NotificationManager>, settle_delay: Duration) -> Self {
        Self {
            manager,
            machine: Mutex::new(PresentationMachine::new()),
            settle_delay,
        }
    }

    fn lock(&self) -> MutexGuard<'_, PresentationMachine> {
        self.machine.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn state(&self) -> PresentationState {
        self.lock().state()
    }

    pub fn current_alert(&self) -> Option<Alert> {
        self.lock().current_alert().cloned()
    }

    /// Consume hub events until the channel closes.
    pub async fn run(&self, mut events: mpsc::UnboundedReceiver<NotificationEvent>) {
        let mut settle_at: Option<Instant> = None;
        loop {
            let event = match settle_at {
                Some(deadline) => tokio::select! {
                    event = events.recv() => event,
                    _ = tokio::time::sleep_until(deadline) => {
                        self.lock().settle();
                        settle_at = None;
                        continue;
                    }
                },
                None => events.recv().await,
            };
            let Some(event) = event else {
                break;
            };

            let pending = {
                let mut machine = self.lock();
                machine.apply(&event);
                machine.has_pending()
            };
            settle_at = match (&event, pending) {
                (NotificationEvent::ShowNotification(_), true) => Some(Instant::now() + self.settle_delay),
                (_, true) => settle_at,
                (_, false) => None,
            };
        }
        log::debug!("Presenter event stream closed");
    }

    /// Forward a user gesture to the hub. Gestures whose control is not on
    /// screen are dropped and return false.
    pub fn handle_action(&self, action: PresentationAction) -> bool {
        if !self.lock().allows(action) {
            log::debug!("Ignoring {:?} while {:?}", action, self.state());
            return false;
        }
        match action {
            PresentationAction::Close => self.manager.dismiss_notification(),
            PresentationAction::Expand => self.manager.expand_notification(),
            PresentationAction::DrinkWater => self.manager.complete_water_reminder(),
        }
    }
}
