//! View/interactivity state machine — the single source of truth for
//! which screen is shown and whether the overlay accepts input.
//!
//! Interactivity is a pure function of the view state and a user toggle:
//! the window is inert whenever the view is away from idle or the user
//! asked for click-through. Because some hosts re-assert default window
//! behavior after the flags are set, the inertness contract is applied
//! at transition time, again on the next scheduler tick, and once more
//! after a short delay.

mod geometry;

pub use geometry::{GeometryLimiter, DELTA_THRESHOLD_PX, MIN_RESIZE_SPACING};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;

const REASSERT_DELAY: Duration = Duration::from_millis(150);

/// The externally visible screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ViewState {
    Idle,
    Awaiting,
    Streaming,
    Errored,
}

/// Whether the window accepts pointer input and shows up in switchers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum InteractivityMode {
    Inert,
    Interactive,
}

/// Computed interactivity: inert away from idle, or on user request.
pub fn interactivity(view: ViewState, user_inert: bool) -> InteractivityMode {
    if view != ViewState::Idle || user_inert {
        InteractivityMode::Inert
    } else {
        InteractivityMode::Interactive
    }
}

/// Host-window side effects the state machine drives. The Tauri
/// implementation lives in the app shell; tests record calls.
pub trait WindowEffects: Send + Sync + 'static {
    /// Apply the full inertness contract: pointer pass-through,
    /// exclude-from-switchers, unfocusable — or undo all of it.
    fn apply_inertness(&self, inert: bool);
    fn resize(&self, width: f64, height: f64);
}

/// For wiring before a window exists.
pub struct NoopEffects;

impl WindowEffects for NoopEffects {
    fn apply_inertness(&self, _inert: bool) {}
    fn resize(&self, _width: f64, _height: f64) {}
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewSnapshot {
    pub view: ViewState,
    pub interactivity: InteractivityMode,
    pub locked_width: Option<f64>,
}

struct Machine {
    view: ViewState,
    user_inert: bool,
    geometry: GeometryLimiter,
}

pub struct ViewController {
    effects: Arc<dyn WindowEffects>,
    inner: Mutex<Machine>,
    /// Current inertness, read by queued reassert tasks so a stale task
    /// always applies the present value, never the one it was queued for.
    inert: Arc<AtomicBool>,
}

impl ViewController {
    pub fn new(effects: Arc<dyn WindowEffects>) -> Arc<Self> {
        Arc::new(Self {
            effects,
            inner: Mutex::new(Machine {
                view: ViewState::Idle,
                user_inert: false,
                geometry: GeometryLimiter::default(),
            }),
            inert: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Move the view to `to`, recompute interactivity, and re-apply the
    /// inertness contract.
    pub fn transition(&self, to: ViewState) {
        let mode = {
            let mut machine = match self.inner.lock() {
                Ok(m) => m,
                Err(poisoned) => poisoned.into_inner(),
            };
            let from = machine.view;
            if from == ViewState::Idle && to != ViewState::Idle {
                machine.geometry.lock_width();
            }
            if to == ViewState::Idle {
                machine.geometry.unlock_width();
            }
            if from != to {
                log::debug!("[VIEW] {:?} -> {:?}", from, to);
            }
            machine.view = to;
            interactivity(to, machine.user_inert)
        };
        self.apply_interactivity(mode);
    }

    /// Flip the user's click-through toggle; returns the new mode.
    pub fn toggle_user_inert(&self) -> InteractivityMode {
        let mode = {
            let mut machine = match self.inner.lock() {
                Ok(m) => m,
                Err(poisoned) => poisoned.into_inner(),
            };
            machine.user_inert = !machine.user_inert;
            interactivity(machine.view, machine.user_inert)
        };
        self.apply_interactivity(mode);
        mode
    }

    /// Rate-limited, width-locked resize.
    pub fn request_resize(&self, width: f64, height: f64) {
        let applied = {
            let mut machine = match self.inner.lock() {
                Ok(m) => m,
                Err(poisoned) => poisoned.into_inner(),
            };
            machine
                .geometry
                .decide(width, height, tokio::time::Instant::now())
        };
        if let Some((w, h)) = applied {
            self.effects.resize(w, h);
        }
    }

    pub fn snapshot(&self) -> ViewSnapshot {
        let machine = match self.inner.lock() {
            Ok(m) => m,
            Err(poisoned) => poisoned.into_inner(),
        };
        ViewSnapshot {
            view: machine.view,
            interactivity: interactivity(machine.view, machine.user_inert),
            locked_width: machine.geometry.locked_width(),
        }
    }

    /// Apply the inertness contract now and schedule the two redundant
    /// re-applications that close the host-platform revert race.
    fn apply_interactivity(&self, mode: InteractivityMode) {
        let inert = mode == InteractivityMode::Inert;
        self.inert.store(inert, Ordering::SeqCst);
        self.effects.apply_inertness(inert);

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let effects = self.effects.clone();
            let flag = self.inert.clone();
            handle.spawn(async move {
                tokio::task::yield_now().await;
                effects.apply_inertness(flag.load(Ordering::SeqCst));
                tokio::time::sleep(REASSERT_DELAY).await;
                effects.apply_inertness(flag.load(Ordering::SeqCst));
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct RecordingEffects {
        applies: Mutex<Vec<bool>>,
        resizes: AtomicUsize,
    }

    impl WindowEffects for RecordingEffects {
        fn apply_inertness(&self, inert: bool) {
            self.applies.lock().unwrap().push(inert);
        }
        fn resize(&self, _w: f64, _h: f64) {
            self.resizes.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn interactivity_is_inert_away_from_idle() {
        assert_eq!(
            interactivity(ViewState::Idle, false),
            InteractivityMode::Interactive
        );
        assert_eq!(
            interactivity(ViewState::Awaiting, false),
            InteractivityMode::Inert
        );
        assert_eq!(
            interactivity(ViewState::Streaming, false),
            InteractivityMode::Inert
        );
        assert_eq!(
            interactivity(ViewState::Errored, false),
            InteractivityMode::Inert
        );
        assert_eq!(
            interactivity(ViewState::Idle, true),
            InteractivityMode::Inert
        );
    }

    #[tokio::test(start_paused = true)]
    async fn transition_reapplies_inertness_redundantly() {
        let effects = Arc::new(RecordingEffects::default());
        let controller = ViewController::new(effects.clone());

        controller.transition(ViewState::Awaiting);
        // Immediate + next-tick + delayed application.
        tokio::time::sleep(Duration::from_millis(300)).await;

        let applies = effects.applies.lock().unwrap().clone();
        assert!(applies.len() >= 3, "got {} applications", applies.len());
        assert!(applies.iter().all(|&inert| inert));
    }

    #[tokio::test(start_paused = true)]
    async fn stale_reassert_applies_current_value() {
        let effects = Arc::new(RecordingEffects::default());
        let controller = ViewController::new(effects.clone());

        controller.transition(ViewState::Awaiting);
        controller.transition(ViewState::Idle);
        tokio::time::sleep(Duration::from_millis(300)).await;

        // Whatever the interleaving, the last applied value must reflect
        // the current state (interactive), not the queued-for one.
        let applies = effects.applies.lock().unwrap().clone();
        assert_eq!(applies.last(), Some(&false));
    }

    #[tokio::test(start_paused = true)]
    async fn user_toggle_keeps_window_inert_while_idle() {
        let effects = Arc::new(RecordingEffects::default());
        let controller = ViewController::new(effects.clone());

        let mode = controller.toggle_user_inert();
        assert_eq!(mode, InteractivityMode::Inert);
        assert_eq!(controller.snapshot().view, ViewState::Idle);

        let mode = controller.toggle_user_inert();
        assert_eq!(mode, InteractivityMode::Interactive);
    }

    #[tokio::test(start_paused = true)]
    async fn width_lock_follows_idle_departure_and_return() {
        let effects = Arc::new(RecordingEffects::default());
        let controller = ViewController::new(effects.clone());

        controller.request_resize(420.0, 200.0);
        controller.transition(ViewState::Awaiting);
        assert_eq!(controller.snapshot().locked_width, Some(420.0));

        controller.transition(ViewState::Streaming);
        assert_eq!(controller.snapshot().locked_width, Some(420.0));

        controller.transition(ViewState::Idle);
        assert_eq!(controller.snapshot().locked_width, None);
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_jitter_resizes_are_dropped() {
        let effects = Arc::new(RecordingEffects::default());
        let controller = ViewController::new(effects.clone());

        controller.request_resize(420.0, 200.0);
        controller.request_resize(421.0, 201.0);
        controller.request_resize(422.0, 199.0);
        assert_eq!(effects.resizes.load(Ordering::SeqCst), 1);
    }
}
