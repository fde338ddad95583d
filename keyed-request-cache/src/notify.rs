use crate::key::RequestKey;

/// External collaborator surfacing request failures to the user (a toast, a banner...).
pub trait ErrorNotifier: Send + Sync {
    fn notify_error(&self, key: &RequestKey, message: &str);
}

/// Reports failures through the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl ErrorNotifier for LogNotifier {
    fn notify_error(&self, key: &RequestKey, message: &str) {
        log::warn!("Request {} failed: {}", key.short(), message);
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl ErrorNotifier for NoopNotifier {
    fn notify_error(&self, _key: &RequestKey, _message: &str) {}
}
