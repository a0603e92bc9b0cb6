/// `runner/policy.rs` — what a mod fault does to the session
use std::fmt;

use crate::error::RunnerError;

/// Where a fault was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultSite {
    Tick,
    Event(&'static str),
    /// Explicit load / reload call.
    Load,
    /// Watch timer.
    Poll,
}

impl fmt::Display for FaultSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultSite::Tick => f.write_str("tick handler"),
            FaultSite::Event(name) => write!(f, "event handler ({name})"),
            FaultSite::Load => f.write_str("mod load"),
            FaultSite::Poll => f.write_str("watched reload"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Reported; the session keeps going.
    Continue,
    /// Tear the session down.
    Terminate,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorPolicy {
    crash_on_error: bool,
}

impl ErrorPolicy {
    pub fn new(crash_on_error: bool) -> Self {
        Self { crash_on_error }
    }

    /// Log `err` and decide its fate. Fetch and file failures never end a
    /// session; anything raised by mod code does when crash-on-error is set.
    pub fn judge(&self, site: FaultSite, err: &RunnerError) -> Verdict {
        let from_mod = matches!(err, RunnerError::Script(_) | RunnerError::Engine(_));
        if from_mod && self.crash_on_error {
            log::error!("{site} failed, terminating session: {err}");
            Verdict::Terminate
        } else {
            log::warn!("{site} failed: {err}");
            Verdict::Continue
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn script_error() -> RunnerError {
        RunnerError::Script(mlua::Error::runtime("boom"))
    }

    #[test]
    fn default_policy_always_continues() {
        let policy = ErrorPolicy::default();
        assert_eq!(policy.judge(FaultSite::Tick, &script_error()), Verdict::Continue);
        assert_eq!(
            policy.judge(FaultSite::Event("ship_destroyed"), &script_error()),
            Verdict::Continue
        );
    }

    #[test]
    fn crash_policy_terminates_on_mod_faults_only() {
        let policy = ErrorPolicy::new(true);
        assert_eq!(policy.judge(FaultSite::Tick, &script_error()), Verdict::Terminate);

        let fetch = RunnerError::Fetch {
            url: "http://localhost/mod.lua".into(),
            status: 500,
        };
        assert_eq!(policy.judge(FaultSite::Poll, &fetch), Verdict::Continue);
    }

    #[test]
    fn sites_render_for_logs() {
        assert_eq!(
            FaultSite::Event("ui_component_clicked").to_string(),
            "event handler (ui_component_clicked)"
        );
    }
}
