//! Notification hub
//!
//! Keeps a listener set per project and fans context events out to it.
//! Delivery is best effort at the time of broadcast: a failing listener never
//! stops delivery to the others, and listeners that can no longer accept
//! data are pruned during the broadcast that discovers them.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::NotifyConfig;
use crate::domain::events::ContextEvent;
use crate::domain::project::ProjectContext;
use crate::metrics::{MetricsCollector, Operation};

use super::connection::{ChannelListener, Connection};

/// Why a single delivery did not go through
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// The listener's buffer is full; the event was dropped for it
    #[error("listener buffer is full")]
    Full,
    /// The listener can no longer accept data
    #[error("listener is closed")]
    Closed,
    /// The listener rejected the event
    #[error("listener failed: {0}")]
    Failed(String),
}

/// Receives broadcasts for one project
pub trait Listener: Send + Sync {
    /// Deliver one event
    fn deliver(&self, event: &ContextEvent) -> Result<(), DeliveryError>;

    /// Whether this listener can still accept data
    fn is_alive(&self) -> bool {
        true
    }
}

/// Adapts a closure into a [`Listener`]
pub struct FnListener<F>(F);

impl<F> FnListener<F>
where
    F: Fn(&ContextEvent) -> Result<(), DeliveryError> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> Listener for FnListener<F>
where
    F: Fn(&ContextEvent) -> Result<(), DeliveryError> + Send + Sync,
{
    fn deliver(&self, event: &ContextEvent) -> Result<(), DeliveryError> {
        (self.0)(event)
    }
}

/// Outcome of one broadcast
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastReport {
    pub recipients: usize,
    pub delivered: usize,
    pub failed: usize,
    pub pruned: usize,
}

struct Registration {
    id: u64,
    listener: Arc<dyn Listener>,
    drops: AtomicU64,
}

#[derive(Default)]
struct HubState {
    listeners: RwLock<HashMap<String, Vec<Arc<Registration>>>>,
    next_id: AtomicU64,
}

impl HubState {
    fn remove(&self, project_id: &str, ids: &[u64]) -> usize {
        let Ok(mut listeners) = self.listeners.write() else {
            return 0;
        };
        let mut removed = 0;
        if let Some(set) = listeners.get_mut(project_id) {
            let before = set.len();
            set.retain(|r| !ids.contains(&r.id));
            removed = before - set.len();
            if set.is_empty() {
                listeners.remove(project_id);
            }
        }
        removed
    }
}

/// Handle returned by [`NotificationHub::subscribe`]
///
/// Dropping the handle does not unsubscribe; call [`Subscription::unsubscribe`].
#[derive(Debug, Clone)]
pub struct Subscription {
    id: u64,
    project_id: String,
    hub: Weak<HubState>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Remove the listener; returns false if it was already gone
    pub fn unsubscribe(&self) -> bool {
        match self.hub.upgrade() {
            Some(hub) => hub.remove(&self.project_id, &[self.id]) > 0,
            None => false,
        }
    }
}

/// Per-project pub/sub hub for context events
#[derive(Clone)]
pub struct NotificationHub {
    state: Arc<HubState>,
    config: NotifyConfig,
    metrics: Option<Arc<MetricsCollector>>,
}

impl std::fmt::Debug for NotificationHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationHub")
            .field("listeners", &self.total_listener_count())
            .field("config", &self.config)
            .finish()
    }
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new(NotifyConfig::default())
    }
}

impl NotificationHub {
    /// Create a hub with the given configuration
    pub fn new(config: NotifyConfig) -> Self {
        Self {
            state: Arc::new(HubState::default()),
            config,
            metrics: None,
        }
    }

    /// Report broadcasts to a metrics collector
    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &NotifyConfig {
        &self.config
    }

    fn state(&self) -> &HubState {
        &self.state
    }

    /// Register a listener for one project
    pub fn subscribe(&self, project_id: &str, listener: Arc<dyn Listener>) -> Subscription {
        let id = self.state().next_id.fetch_add(1, Ordering::Relaxed) + 1;
        if let Ok(mut listeners) = self.state().listeners.write() {
            listeners
                .entry(project_id.to_string())
                .or_default()
                .push(Arc::new(Registration {
                    id,
                    listener,
                    drops: AtomicU64::new(0),
                }));
        }
        debug!(project_id = %project_id, listener_id = id, "Listener subscribed");

        Subscription {
            id,
            project_id: project_id.to_string(),
            hub: Arc::downgrade(&self.state),
        }
    }

    /// Register a closure listener for one project
    pub fn subscribe_fn<F>(&self, project_id: &str, f: F) -> Subscription
    where
        F: Fn(&ContextEvent) -> Result<(), DeliveryError> + Send + Sync + 'static,
    {
        self.subscribe(project_id, Arc::new(FnListener::new(f)))
    }

    /// Remove a listener by id
    pub fn unsubscribe(&self, project_id: &str, listener_id: u64) -> bool {
        self.state().remove(project_id, &[listener_id]) > 0
    }

    /// Open a channel-backed connection for a live transport
    ///
    /// `initial` is queued before the connection is registered so a new
    /// subscriber always starts with current state when there is one.
    pub fn connect(&self, project_id: &str, initial: Option<ProjectContext>) -> Connection {
        let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));
        if let Some(context) = initial {
            let _ = tx.try_send(ContextEvent::updated(context));
        }
        let subscription = self.subscribe(project_id, Arc::new(ChannelListener::new(tx)));
        Connection::new(project_id, rx, subscription)
    }

    /// Deliver an event to every listener of its project
    pub fn broadcast(&self, event: &ContextEvent) -> BroadcastReport {
        let timer = self
            .metrics
            .as_ref()
            .map(|m| m.start(Operation::Broadcast, &event.project_id));

        let registrations: Vec<Arc<Registration>> = self
            .state()
            .listeners
            .read()
            .ok()
            .and_then(|l| l.get(&event.project_id).cloned())
            .unwrap_or_default();

        let mut report = BroadcastReport {
            recipients: registrations.len(),
            ..Default::default()
        };
        let mut dead = Vec::new();

        for registration in &registrations {
            if !registration.listener.is_alive() {
                dead.push(registration.id);
                continue;
            }

            let outcome = catch_unwind(AssertUnwindSafe(|| registration.listener.deliver(event)))
                .unwrap_or_else(|_| Err(DeliveryError::Failed("listener panicked".to_string())));

            match outcome {
                Ok(()) => report.delivered += 1,
                Err(DeliveryError::Closed) => {
                    report.failed += 1;
                    dead.push(registration.id);
                }
                Err(DeliveryError::Full) => {
                    report.failed += 1;
                    let drops = registration.drops.fetch_add(1, Ordering::Relaxed) + 1;
                    if drops >= self.config.max_dropped_messages {
                        warn!(
                            project_id = %event.project_id,
                            listener_id = registration.id,
                            drops,
                            "Disconnecting slow listener"
                        );
                        dead.push(registration.id);
                    } else {
                        warn!(
                            project_id = %event.project_id,
                            listener_id = registration.id,
                            total_drops = drops,
                            "Listener buffer full, event dropped"
                        );
                    }
                }
                Err(DeliveryError::Failed(reason)) => {
                    report.failed += 1;
                    warn!(
                        project_id = %event.project_id,
                        listener_id = registration.id,
                        reason = %reason,
                        "Listener delivery failed"
                    );
                }
            }
        }

        if !dead.is_empty() {
            report.pruned = self.state().remove(&event.project_id, &dead);
            debug!(project_id = %event.project_id, pruned = report.pruned, "Pruned dead listeners");
        }

        debug!(
            event_type = %event.event_type,
            project_id = %event.project_id,
            recipients = report.recipients,
            delivered = report.delivered,
            "Broadcast event"
        );

        if let (Some(metrics), Some(mut timer)) = (self.metrics.as_ref(), timer) {
            timer.set("recipients", report.recipients);
            timer.set("delivered", report.delivered);
            timer.set("pruned", report.pruned);
            if report.failed == 0 {
                metrics.succeed(timer);
            } else {
                metrics.fail(
                    timer,
                    format!("{} of {} deliveries failed", report.failed, report.recipients),
                );
            }
        }

        report
    }

    /// Announce an external deletion
    pub fn broadcast_deleted(&self, project_id: &str) -> BroadcastReport {
        self.broadcast(&ContextEvent::deleted(project_id))
    }

    /// Prune listeners that report themselves dead, without broadcasting
    pub fn sweep_dead(&self) -> usize {
        let Ok(mut listeners) = self.state().listeners.write() else {
            return 0;
        };
        let mut pruned = 0;
        for set in listeners.values_mut() {
            let before = set.len();
            set.retain(|r| r.listener.is_alive());
            pruned += before - set.len();
        }
        listeners.retain(|_, set| !set.is_empty());
        pruned
    }

    /// Listeners registered for one project
    pub fn listener_count(&self, project_id: &str) -> usize {
        self.state()
            .listeners
            .read()
            .map(|l| l.get(project_id).map(Vec::len).unwrap_or(0))
            .unwrap_or(0)
    }

    /// Listeners registered across all projects
    pub fn total_listener_count(&self) -> usize {
        self.state()
            .listeners
            .read()
            .map(|l| l.values().map(Vec::len).sum())
            .unwrap_or(0)
    }

    /// Projects with at least one listener
    pub fn project_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .state()
            .listeners
            .read()
            .map(|l| l.keys().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::project::{ProjectStatus, ProjectType};
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    fn event(project_id: &str) -> ContextEvent {
        ContextEvent::updated(ProjectContext::new(project_id, ProjectType::Blog))
    }

    fn counting_listener(hub: &NotificationHub, project_id: &str) -> (Subscription, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let sub = hub.subscribe_fn(project_id, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        (sub, count)
    }

    #[test]
    fn test_broadcast_reaches_only_project_listeners() {
        let hub = NotificationHub::default();
        let (_a, count_a) = counting_listener(&hub, "a");
        let (_b, count_b) = counting_listener(&hub, "b");

        let report = hub.broadcast(&event("a"));

        assert_eq!(report.delivered, 1);
        assert_eq!(count_a.load(Ordering::SeqCst), 1);
        assert_eq!(count_b.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_broadcast_without_listeners() {
        let hub = NotificationHub::default();
        let report = hub.broadcast(&event("nobody"));
        assert_eq!(report, BroadcastReport::default());
    }

    #[test]
    fn test_failing_listener_does_not_block_others() {
        let hub = NotificationHub::default();
        let _bad = hub.subscribe_fn("p", |_| Err(DeliveryError::Failed("boom".to_string())));
        let _panics = hub.subscribe_fn("p", |_| panic!("listener bug"));
        let (_good, count) = counting_listener(&hub, "p");

        let report = hub.broadcast(&event("p"));

        assert_eq!(report.recipients, 3);
        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed, 2);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        // Failed listeners are kept; only dead ones are pruned
        assert_eq!(hub.listener_count("p"), 3);
    }

    #[test]
    fn test_unsubscribe() {
        let hub = NotificationHub::default();
        let (sub, count) = counting_listener(&hub, "p");
        assert_eq!(hub.listener_count("p"), 1);

        assert!(sub.unsubscribe());
        assert!(!sub.unsubscribe());
        hub.broadcast(&event("p"));

        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(hub.listener_count("p"), 0);
        assert!(hub.project_ids().is_empty());
    }

    #[test]
    fn test_closed_listener_is_pruned_on_broadcast() {
        let hub = NotificationHub::default();
        let _closed = hub.subscribe_fn("p", |_| Err(DeliveryError::Closed));
        let (_ok, _) = counting_listener(&hub, "p");

        let report = hub.broadcast(&event("p"));

        assert_eq!(report.pruned, 1);
        assert_eq!(hub.listener_count("p"), 1);
    }

    #[test]
    fn test_dropped_connection_is_pruned() {
        let hub = NotificationHub::default();
        let connection = hub.connect("p", None);
        assert_eq!(hub.listener_count("p"), 1);

        drop(connection);
        let report = hub.broadcast(&event("p"));

        assert_eq!(report.pruned, 1);
        assert_eq!(hub.total_listener_count(), 0);
    }

    #[test]
    fn test_sweep_dead_without_broadcast() {
        let hub = NotificationHub::default();
        let live = hub.connect("p", None);
        let dead = hub.connect("p", None);
        drop(dead);

        assert_eq!(hub.sweep_dead(), 1);
        assert_eq!(hub.listener_count("p"), 1);
        drop(live);
    }

    #[test]
    fn test_slow_connection_pruned_after_drop_budget() {
        let hub = NotificationHub::new(NotifyConfig {
            channel_capacity: 1,
            max_dropped_messages: 2,
        });
        let _connection = hub.connect("p", None);

        assert_eq!(hub.broadcast(&event("p")).delivered, 1);
        assert_eq!(hub.broadcast(&event("p")).pruned, 0);
        assert_eq!(hub.broadcast(&event("p")).pruned, 1);
        assert_eq!(hub.listener_count("p"), 0);
    }

    #[tokio::test]
    async fn test_connect_pushes_initial_snapshot() {
        let hub = NotificationHub::default();
        let mut ctx = ProjectContext::new("p", ProjectType::Saas);
        ctx.status = ProjectStatus::InProgress;

        let mut connection = hub.connect("p", Some(ctx.clone()));
        let first = connection.recv().await.expect("initial snapshot");
        assert_eq!(first.context, Some(ctx));

        let mut next = ProjectContext::new("p", ProjectType::Saas);
        next.status = ProjectStatus::Paused;
        hub.broadcast(&ContextEvent::updated(next));
        let second = connection.recv().await.expect("broadcast event");
        assert_eq!(second.context.map(|c| c.status), Some(ProjectStatus::Paused));
    }

    #[test]
    fn test_broadcast_deleted() {
        let hub = NotificationHub::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        let _sub = hub.subscribe_fn("p", move |e| {
            s.lock().unwrap().push(e.clone());
            Ok(())
        });

        hub.broadcast_deleted("p");

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].context.is_none());
    }

    #[test]
    fn test_broadcast_records_metrics() {
        let metrics = Arc::new(MetricsCollector::default());
        let hub = NotificationHub::default().with_metrics(Arc::clone(&metrics));
        let _bad = hub.subscribe_fn("p", |_| Err(DeliveryError::Failed("x".to_string())));

        hub.broadcast(&event("p"));

        let recorded = metrics.recent(1);
        assert_eq!(recorded[0].operation, Operation::Broadcast);
        assert!(!recorded[0].success);
    }

    #[test]
    fn test_listener_may_subscribe_during_broadcast() {
        let hub = NotificationHub::default();
        let inner = hub.clone();
        let _sub = hub.subscribe_fn("p", move |_| {
            let _ = inner.subscribe_fn("q", |_| Ok(()));
            Ok(())
        });

        hub.broadcast(&event("p"));
        assert_eq!(hub.listener_count("q"), 1);
    }
}
