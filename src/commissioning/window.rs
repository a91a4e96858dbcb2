use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use strum_macros::Display as StrumDisplay;
use tracing::{debug, instrument};

/// Minimum accepted commissioning-window timeout.
pub const MIN_WINDOW_TIMEOUT: Duration = Duration::from_secs(30);
/// Maximum accepted commissioning-window timeout.
pub const MAX_WINDOW_TIMEOUT: Duration = Duration::from_secs(300);
/// Timeout applied when none is configured.
pub const DEFAULT_WINDOW_TIMEOUT: Duration = Duration::from_secs(120);

/// Commissioning-window states.
#[derive(Debug, Clone, Copy, Eq, PartialEq, StrumDisplay)]
pub enum WindowState {
    #[strum(to_string = "closed")]
    Closed,
    #[strum(to_string = "open")]
    Open,
    #[strum(to_string = "pase_in_progress")]
    PaseInProgress,
}

/// What opened the window.
#[derive(Debug, Clone, Copy, Eq, PartialEq, StrumDisplay)]
pub enum OpenTrigger {
    #[strum(to_string = "button")]
    Button,
    #[strum(to_string = "command")]
    Command,
    #[strum(to_string = "factory_reset")]
    FactoryReset,
}

/// Why the window closed.
#[derive(Debug, Clone, Copy, Eq, PartialEq, StrumDisplay)]
pub enum CloseReason {
    #[strum(to_string = "timeout")]
    Timeout,
    #[strum(to_string = "commissioned")]
    Commissioned,
    #[strum(to_string = "explicit")]
    Explicit,
}

/// Errors returned by window operations.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum WindowError {
    #[error("window timeout {requested:?} is outside {MIN_WINDOW_TIMEOUT:?}..={MAX_WINDOW_TIMEOUT:?}")]
    InvalidTimeout { requested: Duration },
    #[error("the commissioning window is closed")]
    WindowClosed,
    #[error("a PASE session is already in progress")]
    WindowBusy,
    #[error("no PASE session is in progress")]
    WindowNotInPase,
    #[error("PASE session `{session}` does not match the active session")]
    SessionMismatch { session: String },
}

/// Observes state transitions; invoked outside the window lock.
pub type OnStateChange = Arc<dyn Fn(WindowState, WindowState) + Send + Sync>;
/// Observes timer expiry; invoked outside the window lock.
pub type OnTimeout = Arc<dyn Fn() + Send + Sync>;

#[derive(Debug)]
struct WindowInner {
    state: WindowState,
    timeout: Duration,
    deadline: Option<Instant>,
    trigger: Option<OpenTrigger>,
    session: Option<String>,
    session_counter: u64,
    timer: Option<CancellationToken>,
}

#[derive(Default)]
struct Callbacks {
    on_state_change: Option<OnStateChange>,
    on_timeout: Option<OnTimeout>,
}

impl std::fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_state_change", &self.on_state_change.is_some())
            .field("on_timeout", &self.on_timeout.is_some())
            .finish()
    }
}

/// The commissioning-window state machine.
///
/// At most one PASE session is in flight at any time; the timeout armed on
/// open keeps running through a PASE attempt.
#[derive(Debug)]
pub struct CommissioningWindow {
    weak_self: Weak<CommissioningWindow>,
    inner: Mutex<WindowInner>,
    callbacks: Mutex<Callbacks>,
    cancel: CancellationToken,
}

impl CommissioningWindow {
    /// Creates a closed window with a validated timeout.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTimeout` outside 30 s..=300 s.
    pub fn new(timeout: Duration) -> Result<Arc<Self>, WindowError> {
        if !(MIN_WINDOW_TIMEOUT..=MAX_WINDOW_TIMEOUT).contains(&timeout) {
            return Err(WindowError::InvalidTimeout { requested: timeout });
        }
        Ok(Arc::new_cyclic(|weak_self| Self {
            weak_self: weak_self.clone(),
            inner: Mutex::new(WindowInner {
                state: WindowState::Closed,
                timeout,
                deadline: None,
                trigger: None,
                session: None,
                session_counter: 0,
                timer: None,
            }),
            callbacks: Mutex::new(Callbacks::default()),
            cancel: CancellationToken::new(),
        }))
    }

    /// Creates a closed window with the default 120 s timeout.
    #[must_use]
    pub fn with_default_timeout() -> Arc<Self> {
        Self::new(DEFAULT_WINDOW_TIMEOUT).expect("default timeout is within bounds")
    }

    /// Registers the state-change observer.
    pub fn set_on_state_change(&self, callback: OnStateChange) {
        self.lock_callbacks().on_state_change = Some(callback);
    }

    /// Registers the timeout observer.
    pub fn set_on_timeout(&self, callback: OnTimeout) {
        self.lock_callbacks().on_timeout = Some(callback);
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> WindowState {
        self.lock_inner().state
    }

    /// Returns what opened the window, while it is not closed.
    #[must_use]
    pub fn trigger(&self) -> Option<OpenTrigger> {
        self.lock_inner().trigger
    }

    /// Opens the window, or restarts its timer when already open.
    ///
    /// A no-op while a PASE session is in progress.
    #[instrument(skip(self), level = "debug")]
    pub fn open(&self, trigger: OpenTrigger) {
        let transition = {
            let mut inner = self.lock_inner();
            match inner.state {
                WindowState::PaseInProgress => return,
                WindowState::Open => {
                    self.arm_timer(&mut inner);
                    inner.trigger = Some(trigger);
                    None
                }
                WindowState::Closed => {
                    inner.state = WindowState::Open;
                    inner.trigger = Some(trigger);
                    self.arm_timer(&mut inner);
                    Some((WindowState::Closed, WindowState::Open))
                }
            }
        };
        self.fire_state_change(transition);
    }

    /// Starts the single PASE session and returns its opaque session ID.
    ///
    /// # Errors
    ///
    /// Returns `WindowClosed` from the closed state and `WindowBusy` while a
    /// session is already in progress.
    #[instrument(skip(self), level = "debug")]
    pub fn begin_pase(&self) -> Result<String, WindowError> {
        let (session, transition) = {
            let mut inner = self.lock_inner();
            match inner.state {
                WindowState::Closed => return Err(WindowError::WindowClosed),
                WindowState::PaseInProgress => return Err(WindowError::WindowBusy),
                WindowState::Open => {}
            }
            inner.session_counter += 1;
            let session = format!("pase-{:08x}", inner.session_counter);
            inner.session = Some(session.clone());
            inner.state = WindowState::PaseInProgress;
            (session, Some((WindowState::Open, WindowState::PaseInProgress)))
        };
        self.fire_state_change(transition);
        Ok(session)
    }

    /// Ends the active PASE session.
    ///
    /// Success closes the window (commissioning complete); failure falls back
    /// to open while window time remains, else closed.
    ///
    /// # Errors
    ///
    /// Returns `WindowNotInPase` outside a session and `SessionMismatch` for
    /// a stale session ID.
    #[instrument(skip(self, session_id), level = "debug")]
    pub fn end_pase(&self, session_id: &str, success: bool) -> Result<WindowState, WindowError> {
        let (transition, resulting) = {
            let mut inner = self.lock_inner();
            if inner.state != WindowState::PaseInProgress {
                return Err(WindowError::WindowNotInPase);
            }
            if inner.session.as_deref() != Some(session_id) {
                return Err(WindowError::SessionMismatch {
                    session: session_id.to_string(),
                });
            }
            inner.session = None;

            if success {
                self.close_locked(&mut inner);
                (
                    Some((WindowState::PaseInProgress, WindowState::Closed)),
                    WindowState::Closed,
                )
            } else {
                let remaining = inner
                    .deadline
                    .map(|deadline| deadline.saturating_duration_since(Instant::now()))
                    .unwrap_or_default();
                if remaining.is_zero() {
                    self.close_locked(&mut inner);
                    (
                        Some((WindowState::PaseInProgress, WindowState::Closed)),
                        WindowState::Closed,
                    )
                } else {
                    inner.state = WindowState::Open;
                    (
                        Some((WindowState::PaseInProgress, WindowState::Open)),
                        WindowState::Open,
                    )
                }
            }
        };
        self.fire_state_change(transition);
        Ok(resulting)
    }

    /// Closes the window unconditionally.
    pub fn close(&self) {
        let transition = {
            let mut inner = self.lock_inner();
            if inner.state == WindowState::Closed {
                return;
            }
            let previous = inner.state;
            self.close_locked(&mut inner);
            Some((previous, WindowState::Closed))
        };
        self.fire_state_change(transition);
    }

    /// Cancels the timer permanently; used on service shutdown.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    fn arm_timer(&self, inner: &mut WindowInner) {
        if let Some(timer) = inner.timer.take() {
            timer.cancel();
        }
        let now = Instant::now();
        inner.deadline = Some(now + inner.timeout);

        let token = self.cancel.child_token();
        inner.timer = Some(token.clone());
        let timeout = inner.timeout;
        let weak = self.weak_self.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => {}
                () = tokio::time::sleep(timeout) => {
                    if let Some(window) = weak.upgrade() {
                        window.handle_timeout();
                    }
                }
            }
        });
    }

    fn close_locked(&self, inner: &mut WindowInner) {
        inner.state = WindowState::Closed;
        inner.deadline = None;
        inner.trigger = None;
        inner.session = None;
        if let Some(timer) = inner.timer.take() {
            timer.cancel();
        }
    }

    fn handle_timeout(&self) {
        let transition = {
            let mut inner = self.lock_inner();
            if inner.state == WindowState::Closed {
                return;
            }
            let previous = inner.state;
            self.close_locked(&mut inner);
            debug!("commissioning window timed out");
            Some((previous, WindowState::Closed))
        };
        self.fire_state_change(transition);

        let on_timeout = self.lock_callbacks().on_timeout.clone();
        if let Some(on_timeout) = on_timeout {
            on_timeout();
        }
    }

    fn fire_state_change(&self, transition: Option<(WindowState, WindowState)>) {
        let Some((from, to)) = transition else { return };
        let callback = self.lock_callbacks().on_state_change.clone();
        if let Some(callback) = callback {
            callback(from, to);
        }
    }

    fn lock_inner(&self) -> std::sync::MutexGuard<'_, WindowInner> {
        self.inner.lock().expect("commissioning window mutex poisoned")
    }

    fn lock_callbacks(&self) -> std::sync::MutexGuard<'_, Callbacks> {
        self.callbacks.lock().expect("window callbacks mutex poisoned")
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn timeout_is_validated_into_bounds() {
        assert_matches!(
            CommissioningWindow::new(Duration::from_secs(29)),
            Err(WindowError::InvalidTimeout { .. })
        );
        assert_matches!(
            CommissioningWindow::new(Duration::from_secs(301)),
            Err(WindowError::InvalidTimeout { .. })
        );
        CommissioningWindow::new(Duration::from_secs(30)).expect("30 s is the lower bound");
        CommissioningWindow::new(Duration::from_secs(300)).expect("300 s is the upper bound");
    }

    #[tokio::test]
    async fn begin_pase_requires_an_open_window() {
        let window = CommissioningWindow::with_default_timeout();
        assert_matches!(window.begin_pase(), Err(WindowError::WindowClosed));

        window.open(OpenTrigger::Button);
        let session = window.begin_pase().expect("open window should accept PASE");
        assert!(!session.is_empty());
        assert_eq!(WindowState::PaseInProgress, window.state());

        assert_matches!(window.begin_pase(), Err(WindowError::WindowBusy));
    }

    #[tokio::test]
    async fn end_pase_validates_state_and_session() {
        let window = CommissioningWindow::with_default_timeout();
        assert_matches!(
            window.end_pase("pase-00000001", true),
            Err(WindowError::WindowNotInPase)
        );

        window.open(OpenTrigger::Command);
        let session = window.begin_pase().expect("PASE should begin");
        assert_matches!(
            window.end_pase("pase-ffffffff", true),
            Err(WindowError::SessionMismatch { .. })
        );

        let resulting = window
            .end_pase(&session, true)
            .expect("matching session should end");
        assert_eq!(WindowState::Closed, resulting);
        assert_eq!(WindowState::Closed, window.state());
    }

    #[tokio::test]
    async fn failed_pase_reopens_while_time_remains() {
        let window = CommissioningWindow::with_default_timeout();
        window.open(OpenTrigger::Button);
        let session = window.begin_pase().expect("PASE should begin");

        window
            .end_pase(&session, false)
            .expect("matching session should end");
        assert_eq!(WindowState::Open, window.state());
    }

    #[tokio::test]
    async fn open_is_a_no_op_during_pase() {
        let window = CommissioningWindow::with_default_timeout();
        window.open(OpenTrigger::Button);
        window.begin_pase().expect("PASE should begin");

        window.open(OpenTrigger::Command);
        assert_eq!(WindowState::PaseInProgress, window.state());
        assert_eq!(Some(OpenTrigger::Button), window.trigger());
    }
}
