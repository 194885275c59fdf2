//! Daemon - the main gateway service
//!
//! Wires the event source, the turn coordinator, the presentation and
//! dispatch sinks, and the HTTP API, then runs the coordinator loop until
//! interrupted.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};

use crate::agent::{HttpAgentBridge, UnconfiguredBridge};
use crate::api::{self, ApiState};
use crate::coordinator::{CoordinatorSnapshot, Intent, TurnCoordinator};
use crate::events::{EventProducer, EventSource};
use crate::sinks::{BroadcastPresenter, DispatchSink, PresentationEvent, PresentationSink};
use crate::{Config, Error, Result};

/// Presentation events buffered per WebSocket client
const PRESENTATION_CAPACITY: usize = 256;

/// The Parley daemon
pub struct Daemon {
    config: Config,
}

impl Daemon {
    /// Create a new daemon instance
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run the daemon until interrupted
    ///
    /// # Errors
    ///
    /// Returns error if the agent bridge cannot be built or the API server
    /// fails to bind
    pub async fn run(mut self) -> Result<()> {
        let (source, producer) = EventSource::new();
        let presenter = Arc::new(BroadcastPresenter::new(PRESENTATION_CAPACITY));
        let dispatcher = self.build_dispatcher()?;

        let coordinator = TurnCoordinator::new(self.config.dispatch.clone());
        let (snapshot_tx, snapshot_rx) = watch::channel(coordinator.snapshot(Instant::now()));

        let state = Arc::new(ApiState {
            producer: producer.clone(),
            presenter: Arc::clone(&presenter),
            snapshot: snapshot_rx,
            agent_configured: self.config.agent.url.is_some(),
        });

        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| Error::Api(format!("failed to bind API server on {addr}: {e}")))?;
        tracing::info!(addr = %addr, "API server listening");
        let api_handle = tokio::spawn(async move {
            if let Err(e) = api::serve(listener, state).await {
                tracing::error!(error = %e, "API server stopped");
            }
        });

        tracing::info!(
            delay_secs = self.config.dispatch.delay.as_secs(),
            require_brief = self.config.dispatch.require_brief,
            max_dispatch_attempts = self.config.dispatch.max_dispatch_attempts,
            dispatcher = dispatcher.name(),
            "daemon running"
        );

        let coordinator_loop = CoordinatorLoop::new(
            coordinator,
            source,
            producer,
            presenter,
            dispatcher,
            snapshot_tx,
            self.config.dispatch.tick_interval,
        );
        coordinator_loop.run(shutdown_signal()).await;

        api_handle.abort();
        tracing::info!("daemon stopped");
        Ok(())
    }

    fn build_dispatcher(&mut self) -> Result<Arc<dyn DispatchSink>> {
        let Some(url) = &self.config.agent.url else {
            tracing::warn!("no main agent URL configured, queued tasks will not be dispatched");
            return Ok(Arc::new(UnconfiguredBridge));
        };

        let bridge = HttpAgentBridge::new(
            url,
            self.config.agent.token.take(),
            self.config.agent.timeout,
        )?;
        tracing::info!(url = %bridge.base_url(), "main agent bridge configured");
        Ok(Arc::new(bridge))
    }
}

/// Single consumer of the event stream
///
/// Each wakeup handles one event, drains everything else already buffered,
/// and only then asks the coordinator whether the queued task may go out.
/// The snapshot is published before any intent runs. Intents are executed in
/// order: presentation is awaited, dispatch and interrupt run as spawned
/// tasks whose outcome re-enters as events.
pub struct CoordinatorLoop {
    coordinator: TurnCoordinator,
    source: EventSource,
    producer: EventProducer,
    presenter: Arc<dyn PresentationSink>,
    dispatcher: Arc<dyn DispatchSink>,
    snapshot: watch::Sender<CoordinatorSnapshot>,
    tick_interval: Duration,
}

impl CoordinatorLoop {
    #[must_use]
    pub fn new(
        coordinator: TurnCoordinator,
        source: EventSource,
        producer: EventProducer,
        presenter: Arc<dyn PresentationSink>,
        dispatcher: Arc<dyn DispatchSink>,
        snapshot: watch::Sender<CoordinatorSnapshot>,
        tick_interval: Duration,
    ) -> Self {
        Self {
            coordinator,
            source,
            producer,
            presenter,
            dispatcher,
            snapshot,
            tick_interval,
        }
    }

    /// Run until `shutdown` resolves or the event source closes
    ///
    /// Returns the coordinator so its final state can be inspected.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) -> TurnCoordinator {
        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            let first = tokio::select! {
                biased;
                () = &mut shutdown => {
                    tracing::info!("shutdown requested");
                    break;
                }
                event = self.source.next_event() => {
                    let Some(event) = event else {
                        tracing::info!("event source closed");
                        break;
                    };
                    Some(event)
                }
                _ = ticker.tick() => None,
            };

            let mut intents = Vec::new();
            if let Some(event) = first {
                intents.extend(self.coordinator.handle(&event));
            }
            loop {
                let ready = self.source.drain_ready();
                if ready.is_empty() {
                    break;
                }
                for event in &ready {
                    intents.extend(self.coordinator.handle(event));
                }
            }

            let now = Instant::now();
            intents.extend(self.coordinator.tick(now));
            intents.extend(self.coordinator.poll_dispatch(now));

            // Publish first so a client joining mid-batch cannot miss the result
            self.snapshot.send_replace(self.coordinator.snapshot(now));
            self.execute(intents).await;
        }

        self.coordinator
    }

    async fn execute(&self, intents: Vec<Intent>) {
        for intent in intents {
            match intent {
                Intent::Present(event) => {
                    if let Err(e) = self.presenter.present(event).await {
                        tracing::warn!(error = %e, "presentation failed");
                    }
                }
                Intent::Dispatch(request) => {
                    let dispatcher = Arc::clone(&self.dispatcher);
                    let producer = self.producer.clone();
                    tokio::spawn(async move {
                        let outcome = match dispatcher.dispatch(&request).await {
                            Ok(()) => producer.dispatch_ack(request.dispatch_id),
                            Err(e) => producer.dispatch_failure(request.dispatch_id, e.to_string()),
                        };
                        if outcome.is_err() {
                            tracing::debug!(
                                dispatch_id = %request.dispatch_id,
                                "coordinator gone before dispatch result"
                            );
                        }
                    });
                }
                Intent::Interrupt => {
                    let dispatcher = Arc::clone(&self.dispatcher);
                    let presenter = Arc::clone(&self.presenter);
                    tokio::spawn(async move {
                        if let Err(e) = dispatcher.interrupt().await {
                            tracing::warn!(error = %e, sink = dispatcher.name(), "interrupt failed");
                            let _ = presenter
                                .present(PresentationEvent::Error {
                                    code: "interrupt_failed".to_string(),
                                    message: e.to_string(),
                                })
                                .await;
                        }
                    });
                }
            }
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
