//! Shared test utilities
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parley_gateway::config::DispatchConfig;
use parley_gateway::coordinator::{CoordinatorSnapshot, QueueState, TurnCoordinator};
use parley_gateway::events::{Channel, Event, EventKind, EventProducer, EventSource};
use parley_gateway::sinks::{DispatchRequest, DispatchSink, PresentationEvent, PresentationSink};
use parley_gateway::{CoordinatorLoop, Error, Result};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Default dispatch settings with a 10 second delay
#[must_use]
pub fn dispatch_config() -> DispatchConfig {
    DispatchConfig {
        delay: Duration::from_secs(10),
        ..DispatchConfig::default()
    }
}

/// Build an event stamped at `at`
#[must_use]
pub fn event_at(at: Instant, channel: Channel, kind: EventKind) -> Event {
    Event {
        seq: 0,
        channel,
        at,
        received_at: Utc::now(),
        kind,
    }
}

/// Presentation sink that remembers everything it was given
///
/// When attached to a snapshot channel it also records the queue state a
/// newly connecting client would have seen at the moment of each event.
#[derive(Debug, Default)]
pub struct RecordingPresenter {
    events: Mutex<Vec<(PresentationEvent, Option<QueueState>)>>,
    snapshot: OnceLock<watch::Receiver<CoordinatorSnapshot>>,
}

impl RecordingPresenter {
    pub fn attach(&self, snapshot: watch::Receiver<CoordinatorSnapshot>) {
        let _ = self.snapshot.set(snapshot);
    }

    pub fn events(&self) -> Vec<PresentationEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|(event, _)| event.clone())
            .collect()
    }

    /// Published queue state while the first event matching `pred` was presented
    pub fn snapshot_during(
        &self,
        pred: impl Fn(&PresentationEvent) -> bool,
    ) -> Option<QueueState> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .find(|(event, _)| pred(event))
            .and_then(|(_, state)| *state)
    }

    pub fn position(&self, pred: impl Fn(&PresentationEvent) -> bool) -> Option<usize> {
        self.events().iter().position(pred)
    }
}

#[async_trait]
impl PresentationSink for RecordingPresenter {
    async fn present(&self, event: PresentationEvent) -> Result<()> {
        let visible = self.snapshot.get().map(|rx| rx.borrow().queue_state);
        self.events.lock().unwrap().push((event, visible));
        Ok(())
    }
}

/// Dispatch sink replaying scripted outcomes, succeeding once the script runs out
#[derive(Debug, Default)]
pub struct ScriptedDispatch {
    script: Mutex<VecDeque<std::result::Result<(), String>>>,
    requests: Mutex<Vec<DispatchRequest>>,
    interrupts: Mutex<usize>,
}

impl ScriptedDispatch {
    pub fn failing(times: usize) -> Self {
        let sink = Self::default();
        sink.script
            .lock()
            .unwrap()
            .extend((0..times).map(|_| Err("connection refused".to_string())));
        sink
    }

    pub fn tasks(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.task_content.clone())
            .collect()
    }

    pub fn interrupts(&self) -> usize {
        *self.interrupts.lock().unwrap()
    }
}

#[async_trait]
impl DispatchSink for ScriptedDispatch {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn dispatch(&self, request: &DispatchRequest) -> Result<()> {
        self.requests.lock().unwrap().push(request.clone());
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Err(reason)) => Err(Error::Bridge(reason)),
            Some(Ok(())) | None => Ok(()),
        }
    }

    async fn interrupt(&self) -> Result<()> {
        *self.interrupts.lock().unwrap() += 1;
        Ok(())
    }
}

/// A coordinator loop running on a background task
pub struct Harness {
    pub producer: EventProducer,
    pub presenter: Arc<RecordingPresenter>,
    pub snapshot: watch::Receiver<CoordinatorSnapshot>,
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<TurnCoordinator>,
}

impl Harness {
    pub fn spawn(config: DispatchConfig, dispatcher: Arc<dyn DispatchSink>) -> Self {
        let (source, producer) = EventSource::new();
        let presenter = Arc::new(RecordingPresenter::default());
        let coordinator = TurnCoordinator::new(config);
        let (snapshot_tx, snapshot) = watch::channel(coordinator.snapshot(Instant::now()));
        presenter.attach(snapshot.clone());
        let (shutdown, shutdown_rx) = oneshot::channel::<()>();

        let coordinator_loop = CoordinatorLoop::new(
            coordinator,
            source,
            producer.clone(),
            Arc::clone(&presenter) as Arc<dyn PresentationSink>,
            dispatcher,
            snapshot_tx,
            Duration::from_millis(250),
        );
        let handle = tokio::spawn(coordinator_loop.run(async {
            let _ = shutdown_rx.await;
        }));

        Self {
            producer,
            presenter,
            snapshot,
            shutdown,
            handle,
        }
    }

    /// Stop the loop and return the coordinator's final state
    pub async fn finish(self) -> TurnCoordinator {
        let _ = self.shutdown.send(());
        self.handle.await.expect("coordinator loop panicked")
    }
}
