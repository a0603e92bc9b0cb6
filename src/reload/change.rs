/// `reload/change.rs` — decides whether freshly fetched text needs executing
#[derive(Debug, Clone, Copy, Default)]
pub struct ChangeDetector {
    /// Execute even when the text equals what is already loaded.
    pub same_code_execution: bool,
}

impl ChangeDetector {
    pub fn new(same_code_execution: bool) -> Self {
        Self {
            same_code_execution,
        }
    }

    pub fn should_execute(
        &self,
        new_text: &str,
        previous_text: Option<&str>,
        forced: bool,
        started: bool,
    ) -> bool {
        if !started || forced || self.same_code_execution {
            return true;
        }
        previous_text != Some(new_text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn always_executes_before_start() {
        let detector = ChangeDetector::new(false);
        assert!(detector.should_execute("a", Some("a"), false, false));
    }

    #[test]
    fn identical_text_is_skipped_once_started() {
        let detector = ChangeDetector::new(false);
        assert!(!detector.should_execute("a", Some("a"), false, true));
        assert!(detector.should_execute("b", Some("a"), false, true));
        assert!(detector.should_execute("a", None, false, true));
    }

    #[test]
    fn forced_or_same_code_policy_executes_identical_text() {
        assert!(ChangeDetector::new(false).should_execute("a", Some("a"), true, true));
        assert!(ChangeDetector::new(true).should_execute("a", Some("a"), false, true));
    }
}
