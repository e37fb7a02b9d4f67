use std::{future::Future, pin::Pin};

/// Downstream notification dispatch (email service in the portal).
/// Fire-and-forget: implementations never return errors; delivery problems
/// are logged, not propagated into the settlement path.
pub trait Notifier: Send + Sync {
    fn notify(
        &self,
        event: &str,
        payload: serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// Default dispatcher: logs the event and moves on. The real mail bridge
/// lives outside this service and subscribes to the same events.
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(
        &self,
        event: &str,
        payload: serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        let event = event.to_string();
        Box::pin(async move {
            tracing::info!(event = %event, %payload, "notification dispatched");
        })
    }
}
