use foundation::time::Time;

/// Quiescence-window debouncer.
///
/// Every `trigger` restarts the window; `fire_due` reports (once) when the
/// burst has been quiet for the full window. Time is an explicit parameter so
/// behavior is deterministic and replayable; nothing here reads a wall clock.
#[derive(Debug, Clone, PartialEq)]
pub struct Debounce {
    window_s: f64,
    deadline: Option<Time>,
}

impl Debounce {
    pub fn new(window_s: f64) -> Self {
        Self {
            window_s,
            deadline: None,
        }
    }

    pub fn window_s(&self) -> f64 {
        self.window_s
    }

    /// Record a triggering event at `now`, restarting the quiescence window.
    pub fn trigger(&mut self, now: Time) {
        self.deadline = Some(now.plus_secs(self.window_s));
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// Returns `true` exactly once per burst, when `now` has passed the
    /// deadline set by the last `trigger`.
    pub fn fire_due(&mut self, now: Time) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }
}
