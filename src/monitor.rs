//! Async polling driver.
//!
//! [`TelemetryMonitor::spawn`] moves a [`SessionReader`] into a tokio task
//! that keeps the connection alive and polls it on fixed intervals:
//! - startup is retried every `startup_retry_interval` while the producer is absent
//! - telemetry is polled at `telemetry_rate`
//! - session info is polled every `session_info_interval`
//!
//! Results are published as [`MonitorEvent`]s on a broadcast channel. The
//! latest frame and session text are also kept in watch channels for
//! consumers that only care about the current value.

use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval, interval_at};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::{BroadcastStream, WatchStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::config::MonitorConfig;
use crate::platform::{DataSignal, SharedMemory};
use crate::reader::SessionReader;
use crate::types::{TelemetryFrame, VariableInfo};

/// Events queued per subscriber before the slowest one starts lagging.
const EVENT_CAPACITY: usize = 256;

/// `tokio::time::interval` rejects a zero period.
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Something that happened on the producer connection.
#[derive(Debug, Clone)]
pub enum MonitorEvent {
    /// The producer became available and reports itself connected.
    Connected,
    /// The producer went away; the reader has been shut down.
    Disconnected,
    /// Variable table, sent before the first frame of each connection.
    TelemetryDescription(Arc<[VariableInfo]>),
    /// A new telemetry frame.
    Telemetry(Arc<TelemetryFrame>),
    /// New session-info text, passed through unparsed.
    SessionInfo(Arc<str>),
}

/// Handle to a running monitor task.
///
/// Dropping the handle cancels the task.
#[derive(Debug)]
pub struct TelemetryMonitor {
    events: broadcast::Sender<MonitorEvent>,
    frames: watch::Receiver<Option<Arc<TelemetryFrame>>>,
    sessions: watch::Receiver<Option<Arc<str>>>,
    connected: watch::Receiver<bool>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl TelemetryMonitor {
    /// Spawn the polling task on the current tokio runtime.
    pub fn spawn<M, S>(reader: SessionReader<M, S>, config: MonitorConfig) -> Self
    where
        M: SharedMemory + Send + 'static,
        S: DataSignal + Send + 'static,
    {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (frame_tx, frames) = watch::channel(None);
        let (session_tx, sessions) = watch::channel(None);
        let (connected_tx, connected) = watch::channel(false);
        let cancel = CancellationToken::new();

        let worker = Worker {
            reader,
            events: events.clone(),
            frame_tx,
            session_tx,
            connected_tx,
            connected: false,
            described: false,
        };
        let task = tokio::spawn(worker.run(config, cancel.clone()));

        Self { events, frames, sessions, connected, cancel, task: Some(task) }
    }

    /// A receiver for every event from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.events.subscribe()
    }

    /// Event stream; events a slow consumer missed are skipped.
    pub fn events(&self) -> impl Stream<Item = MonitorEvent> + Send + 'static {
        BroadcastStream::new(self.subscribe()).filter_map(|event| event.ok())
    }

    /// Stream of the latest frame, starting with the current one if any.
    ///
    /// Intermediate frames are dropped when the consumer is slower than the producer.
    pub fn frames(&self) -> impl Stream<Item = Arc<TelemetryFrame>> + Send + 'static {
        WatchStream::new(self.frames.clone()).filter_map(|frame| frame)
    }

    pub fn latest_frame(&self) -> Option<Arc<TelemetryFrame>> {
        self.frames.borrow().clone()
    }

    pub fn current_session_info(&self) -> Option<Arc<str>> {
        self.sessions.borrow().clone()
    }

    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    /// Ask the task to stop without waiting for it.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Stop the task and wait until it has shut the reader down.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for TelemetryMonitor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// State owned by the polling task.
struct Worker<M: SharedMemory, S: DataSignal> {
    reader: SessionReader<M, S>,
    events: broadcast::Sender<MonitorEvent>,
    frame_tx: watch::Sender<Option<Arc<TelemetryFrame>>>,
    session_tx: watch::Sender<Option<Arc<str>>>,
    connected_tx: watch::Sender<bool>,
    connected: bool,
    described: bool,
}

impl<M: SharedMemory, S: DataSignal> Worker<M, S> {
    async fn run(mut self, config: MonitorConfig, cancel: CancellationToken) {
        info!(rate = ?config.telemetry_rate, "Telemetry monitor started");
        self.reader.startup();

        let mut telemetry = interval(config.telemetry_rate.poll_interval());
        telemetry.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut session = interval(config.session_info_interval.max(MIN_PERIOD));
        session.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let retry = config.startup_retry_interval.max(MIN_PERIOD);
        let mut startup = interval_at(Instant::now() + retry, retry);
        startup.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Telemetry monitor cancelled");
                    break;
                }
                _ = startup.tick() => {
                    if !self.reader.is_initialized() {
                        trace!("Retrying reader startup");
                        self.reader.startup();
                    }
                }
                _ = telemetry.tick() => self.poll_telemetry(),
                _ = session.tick() => self.poll_session_info(),
            }
        }

        self.reader.shutdown();
        self.connected_tx.send_replace(false);
    }

    /// Track connect/disconnect transitions.
    fn check_connection(&mut self) {
        let now_connected = self.reader.is_initialized() && self.reader.is_connected();
        if now_connected == self.connected {
            return;
        }

        self.connected = now_connected;
        self.connected_tx.send_replace(now_connected);
        if now_connected {
            info!(tick_rate = ?self.reader.tick_rate(), "Producer connected");
            self.publish(MonitorEvent::Connected);
        } else {
            info!("Producer disconnected");
            self.publish(MonitorEvent::Disconnected);
            self.reader.shutdown();
            self.described = false;
        }
    }

    fn poll_telemetry(&mut self) {
        self.check_connection();
        if !self.connected || !self.reader.update_telemetry() {
            return;
        }

        if !self.described {
            let variables: Arc<[VariableInfo]> = self.reader.variable_descriptors().into();
            debug!(count = variables.len(), "Publishing telemetry description");
            self.publish(MonitorEvent::TelemetryDescription(variables));
            self.described = true;
        }

        if let Some(frame) = self.reader.frame() {
            let frame = Arc::new(frame);
            self.frame_tx.send_replace(Some(Arc::clone(&frame)));
            self.publish(MonitorEvent::Telemetry(frame));
        }
    }

    fn poll_session_info(&mut self) {
        self.check_connection();
        if !self.connected || !self.reader.update_session_info() {
            return;
        }

        let text: Arc<str> = self.reader.session_info().into();
        debug!(len = text.len(), "Publishing session info");
        self.session_tx.send_replace(Some(Arc::clone(&text)));
        self.publish(MonitorEvent::SessionInfo(text));
    }

    fn publish(&self, event: MonitorEvent) {
        // No subscribers is fine; watch channels still hold the latest values.
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{MockProducer, ProducerLayout};
    use crate::types::{UpdateRate, VariableType};
    use tokio::time::timeout;

    fn producer() -> MockProducer {
        crate::test_utils::init_tracing();
        MockProducer::new(
            ProducerLayout::new()
                .variable("Speed", VariableType::Float32, 1)
                .variable("Gear", VariableType::Int32, 1)
                .build(),
        )
    }

    fn payload(producer: &MockProducer, speed: f32) -> Vec<u8> {
        producer.image().payload(&[("Speed", &speed.to_le_bytes())])
    }

    /// Next event other than session info.
    async fn next_event(events: &mut broadcast::Receiver<MonitorEvent>) -> MonitorEvent {
        loop {
            let event = timeout(Duration::from_secs(60), events.recv())
                .await
                .expect("timed out waiting for event")
                .expect("event channel closed");
            if !matches!(event, MonitorEvent::SessionInfo(_)) {
                return event;
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn connects_then_describes_then_streams() {
        let producer = producer();
        let monitor = TelemetryMonitor::spawn(producer.reader(), MonitorConfig::default());
        let mut events = monitor.subscribe();

        assert!(matches!(next_event(&mut events).await, MonitorEvent::Connected));
        assert!(monitor.is_connected());

        producer.publish(1, &payload(&producer, 12.0));
        match next_event(&mut events).await {
            MonitorEvent::TelemetryDescription(vars) => {
                let names: Vec<_> = vars.iter().map(|v| v.name.as_str()).collect();
                assert_eq!(names, ["Speed", "Gear"]);
            }
            other => panic!("expected description, got {other:?}"),
        }
        match next_event(&mut events).await {
            MonitorEvent::Telemetry(frame) => assert_eq!(frame.tick, 1),
            other => panic!("expected telemetry, got {other:?}"),
        }

        producer.publish(2, &payload(&producer, 13.0));
        match next_event(&mut events).await {
            MonitorEvent::Telemetry(frame) => {
                assert_eq!(frame.tick, 2);
                assert_eq!(monitor.latest_frame().unwrap().tick, 2);
            }
            other => panic!("expected telemetry, got {other:?}"),
        }

        monitor.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn retries_startup_until_producer_appears() {
        let producer = producer();
        producer.set_running(false);
        let config = MonitorConfig { startup_retry_interval: Duration::from_secs(10), ..Default::default() };
        let started = Instant::now();
        let monitor = TelemetryMonitor::spawn(producer.reader(), config);
        let mut events = monitor.subscribe();

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(!monitor.is_connected());
        producer.set_running(true);

        assert!(matches!(next_event(&mut events).await, MonitorEvent::Connected));
        assert!(started.elapsed() >= Duration::from_secs(10));
        monitor.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_resets_description() {
        let producer = producer();
        let config = MonitorConfig { startup_retry_interval: Duration::from_secs(1), ..Default::default() };
        let monitor = TelemetryMonitor::spawn(producer.reader(), config);
        let mut events = monitor.subscribe();

        assert!(matches!(next_event(&mut events).await, MonitorEvent::Connected));
        producer.publish(5, &payload(&producer, 1.0));
        assert!(matches!(next_event(&mut events).await, MonitorEvent::TelemetryDescription(_)));
        assert!(matches!(next_event(&mut events).await, MonitorEvent::Telemetry(_)));

        producer.set_connected(false);
        assert!(matches!(next_event(&mut events).await, MonitorEvent::Disconnected));
        assert!(!monitor.is_connected());

        producer.set_connected(true);
        assert!(matches!(next_event(&mut events).await, MonitorEvent::Connected));
        producer.publish(6, &payload(&producer, 2.0));
        assert!(matches!(next_event(&mut events).await, MonitorEvent::TelemetryDescription(_)));
        match next_event(&mut events).await {
            MonitorEvent::Telemetry(frame) => assert_eq!(frame.tick, 6),
            other => panic!("expected telemetry, got {other:?}"),
        }

        monitor.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn session_info_changes_are_published() {
        let producer = producer();
        producer.set_session_info("WeekendInfo:\n TrackID: 1\n");
        let monitor = TelemetryMonitor::spawn(producer.reader(), MonitorConfig::default());
        let mut events = monitor.events();

        let first = timeout(Duration::from_secs(5), async {
            loop {
                if let Some(MonitorEvent::SessionInfo(text)) = events.next().await {
                    return text;
                }
            }
        })
        .await
        .unwrap();
        assert!(first.contains("TrackID: 1"));
        assert_eq!(monitor.current_session_info().as_deref(), Some(&*first));

        producer.set_session_info("WeekendInfo:\n TrackID: 2\n");
        let second = timeout(Duration::from_secs(5), async {
            loop {
                if let Some(MonitorEvent::SessionInfo(text)) = events.next().await {
                    return text;
                }
            }
        })
        .await
        .unwrap();
        assert!(second.contains("TrackID: 2"));

        monitor.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn throttled_rate_still_delivers_frames() {
        let producer = producer();
        let config = MonitorConfig { telemetry_rate: UpdateRate::Max(10), ..Default::default() };
        let monitor = TelemetryMonitor::spawn(producer.reader(), config);
        let mut frames = monitor.frames();

        producer.publish(40, &payload(&producer, 3.5));
        let frame = timeout(Duration::from_secs(5), frames.next()).await.unwrap().unwrap();
        assert_eq!(frame.tick, 40);
        assert_eq!(
            frame.value::<f32>(producer.image().variable("Speed").unwrap()).unwrap(),
            3.5
        );

        monitor.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_closes_event_channel() {
        let producer = producer();
        let monitor = TelemetryMonitor::spawn(producer.reader(), MonitorConfig::default());
        let mut events = monitor.subscribe();
        assert!(matches!(next_event(&mut events).await, MonitorEvent::Connected));

        monitor.stop().await;
        loop {
            match events.recv().await {
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
            }
        }
    }
}
