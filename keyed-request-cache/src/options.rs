use serde::{Deserialize, Serialize};
use serde_inline_default::serde_inline_default;

/// Per-entry override of how failures surface.
///
/// With `fail_silently` (the default) a failed flight is only visible through the
/// entry state. Otherwise the failure is returned as an error and, unless
/// `no_error_toast` is set, reported to the [`ErrorNotifier`](crate::notify::ErrorNotifier).
#[serde_inline_default]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallOptions {
    #[serde_inline_default(true)]
    pub fail_silently: bool,
    #[serde(default)]
    pub no_error_toast: bool,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            fail_silently: true,
            no_error_toast: false,
        }
    }
}

impl CallOptions {
    /// Failures are returned to the caller and reported to the notifier.
    pub fn strict() -> Self {
        Self {
            fail_silently: false,
            no_error_toast: false,
        }
    }

    pub fn with_fail_silently(mut self, fail_silently: bool) -> Self {
        self.fail_silently = fail_silently;
        self
    }

    pub fn with_no_error_toast(mut self, no_error_toast: bool) -> Self {
        self.no_error_toast = no_error_toast;
        self
    }

    pub(crate) fn should_notify(&self) -> bool {
        !self.fail_silently && !self.no_error_toast
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_fields_use_defaults() {
        let options: CallOptions = serde_json::from_value(json!({})).unwrap();
        assert_eq!(options, CallOptions::default());

        let options: CallOptions = serde_json::from_value(json!({"fail_silently": false})).unwrap();
        assert_eq!(options, CallOptions::strict());
    }

    #[test]
    fn test_should_notify() {
        assert!(!CallOptions::default().should_notify());
        assert!(CallOptions::strict().should_notify());
        assert!(!CallOptions::strict().with_no_error_toast(true).should_notify());
        assert!(!CallOptions::default()
            .with_fail_silently(true)
            .with_no_error_toast(false)
            .should_notify());
    }
}
