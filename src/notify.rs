use serde_json::Value;

/// Silent-push collaborator. Delivery is best effort: implementations log
/// failures and never surface them to the mutation that triggered the
/// notification.
pub trait PushNotifier: Send + Sync {
    fn send_silent(&self, topic: &str, payload: &Value);
}

/// Default notifier: records the would-be push in the log stream. Device
/// bookkeeping and the real push transport live outside this service.
#[derive(Default)]
pub struct LogNotifier;

impl PushNotifier for LogNotifier {
    fn send_silent(&self, topic: &str, payload: &Value) {
        tracing::debug!(topic, %payload, "silent push");
    }
}
