//! Turn coordinator scenarios

use std::time::Duration;

use parley_gateway::agent::{AgentContextUpdate, AgentStatus};
use parley_gateway::config::DispatchConfig;
use parley_gateway::coordinator::{Intent, QueueState, TurnCoordinator};
use parley_gateway::events::{Channel, CommandKind, EventKind, EventSource, ScratchpadEdit};
use parley_gateway::sinks::PresentationEvent;
use tokio::time::Instant;

mod common;
use common::{dispatch_config, event_at};

fn utterance(text: &str) -> EventKind {
    EventKind::Utterance {
        text: text.to_string(),
        is_final: true,
    }
}

fn command(kind: CommandKind) -> EventKind {
    EventKind::Command(kind)
}

fn agent(status: AgentStatus, seq: u64) -> EventKind {
    EventKind::AgentContext(AgentContextUpdate {
        status,
        seq: Some(seq),
        ..AgentContextUpdate::default()
    })
}

fn dispatched(intents: &[Intent]) -> Vec<String> {
    intents
        .iter()
        .filter_map(|intent| match intent {
            Intent::Dispatch(request) => Some(request.task_content.clone()),
            _ => None,
        })
        .collect()
}

#[test]
fn fix_the_login_bug_dispatches_once() {
    let t0 = Instant::now();
    let mut coordinator = TurnCoordinator::new(dispatch_config());

    coordinator.handle(&event_at(t0, Channel::Speech, utterance("Fix the login bug")));
    coordinator.handle(&event_at(t0, Channel::Ui, command(CommandKind::Queue)));

    let mut sent = Vec::new();
    for secs in 0..=20 {
        sent.extend(dispatched(
            &coordinator.poll_dispatch(t0 + Duration::from_secs(secs)),
        ));
    }
    assert_eq!(sent, vec!["Fix the login bug".to_string()]);
    assert_eq!(coordinator.queue_state(), QueueState::Dispatching);
}

#[test]
fn draft_email_interjection_dequeues() {
    let t0 = Instant::now();
    let mut coordinator = TurnCoordinator::new(dispatch_config());

    coordinator.handle(&event_at(t0, Channel::Speech, utterance("Draft email")));
    coordinator.handle(&event_at(t0, Channel::Ui, command(CommandKind::Queue)));
    let t3 = t0 + Duration::from_secs(3);
    let out = coordinator.handle(&event_at(t3, Channel::Speech, utterance("actually wait")));

    assert_eq!(coordinator.queue_state(), QueueState::None);
    assert!(coordinator.queued().is_none());
    assert_eq!(coordinator.scratchpad().content(), "Draft email\nactually wait");
    assert_eq!(
        out[0],
        Intent::Present(PresentationEvent::QueueStateChanged {
            state: QueueState::None,
            countdown_seconds: None,
        })
    );
    assert!(
        coordinator
            .poll_dispatch(t0 + Duration::from_secs(60))
            .is_empty()
    );
}

#[test]
fn structured_work_also_dequeues() {
    let t0 = Instant::now();
    let mut coordinator = TurnCoordinator::new(dispatch_config());

    coordinator.handle(&event_at(t0, Channel::Speech, utterance("Run the benchmarks")));
    coordinator.handle(&event_at(t0, Channel::Ui, command(CommandKind::Queue)));
    coordinator.handle(&event_at(
        t0,
        Channel::Ui,
        EventKind::Work(ScratchpadEdit::Patch {
            find: "benchmarks".to_string(),
            replace: "integration tests".to_string(),
        }),
    ));

    assert_eq!(coordinator.queue_state(), QueueState::None);
    assert_eq!(coordinator.scratchpad().content(), "Run the integration tests");
}

#[test]
fn never_dispatched_before_delay() {
    let t0 = Instant::now();
    let mut coordinator = TurnCoordinator::new(dispatch_config());
    coordinator.handle(&event_at(t0, Channel::Speech, utterance("Refactor the parser")));
    coordinator.handle(&event_at(t0, Channel::Ui, command(CommandKind::Queue)));

    for millis in (0..10_000).step_by(100) {
        assert!(
            coordinator
                .poll_dispatch(t0 + Duration::from_millis(millis))
                .is_empty(),
            "dispatched at {millis}ms"
        );
    }
    assert_eq!(
        dispatched(&coordinator.poll_dispatch(t0 + Duration::from_secs(10))).len(),
        1
    );
}

#[test]
fn status_pings_never_pull_dispatch_forward() {
    let t0 = Instant::now();
    let mut coordinator = TurnCoordinator::new(dispatch_config());
    coordinator.handle(&event_at(t0, Channel::Agent, agent(AgentStatus::Idle, 5)));
    coordinator.handle(&event_at(t0, Channel::Speech, utterance("Refactor the parser")));
    coordinator.handle(&event_at(t0, Channel::Ui, command(CommandKind::Queue)));

    let mut fresh = 5;
    for millis in (0..10_000).step_by(50) {
        let at = t0 + Duration::from_millis(millis);
        // Alternate replayed stale pings with fresh idle heartbeats
        let ping = if millis % 100 == 0 {
            agent(AgentStatus::Idle, 1)
        } else {
            fresh += 1;
            agent(AgentStatus::Idle, fresh)
        };
        let mut out = coordinator.handle(&event_at(at, Channel::Agent, ping));
        out.extend(coordinator.tick(at));
        out.extend(coordinator.poll_dispatch(at));
        assert!(dispatched(&out).is_empty(), "dispatched at {millis}ms");
    }

    assert_eq!(coordinator.queue_state(), QueueState::Queued);
    assert_eq!(
        dispatched(&coordinator.poll_dispatch(t0 + Duration::from_secs(10))),
        vec!["Refactor the parser".to_string()]
    );
}

#[test]
fn missing_brief_does_not_block_when_not_required() {
    let t0 = Instant::now();
    let mut coordinator = TurnCoordinator::new(DispatchConfig {
        require_brief: false,
        ..dispatch_config()
    });
    coordinator.handle(&event_at(
        t0,
        Channel::Agent,
        EventKind::AgentContext(AgentContextUpdate {
            status: AgentStatus::Idle,
            just_finished: true,
            seq: Some(1),
            ..AgentContextUpdate::default()
        }),
    ));
    coordinator.handle(&event_at(t0, Channel::Speech, utterance("Open a PR")));
    coordinator.handle(&event_at(t0, Channel::Ui, command(CommandKind::Queue)));

    let out = coordinator.poll_dispatch(t0 + Duration::from_secs(10));

    assert_eq!(dispatched(&out), vec!["Open a PR".to_string()]);
    assert!(
        !out.iter()
            .any(|i| matches!(i, Intent::Present(PresentationEvent::BriefReady { .. })))
    );
}

#[test]
fn second_queue_is_rejected() {
    let t0 = Instant::now();
    let mut coordinator = TurnCoordinator::new(dispatch_config());
    coordinator.handle(&event_at(t0, Channel::Speech, utterance("First task")));
    coordinator.handle(&event_at(t0, Channel::Ui, command(CommandKind::Queue)));

    let out = coordinator.handle(&event_at(t0, Channel::Ui, command(CommandKind::Queue)));

    assert_eq!(coordinator.queued().unwrap().content, "First task");
    assert!(matches!(
        &out[..],
        [Intent::Present(PresentationEvent::Error { code, .. })] if code == "already_queued"
    ));
}

#[test]
fn busy_agent_holds_dispatch() {
    let t0 = Instant::now();
    let mut coordinator = TurnCoordinator::new(dispatch_config());
    coordinator.handle(&event_at(t0, Channel::Agent, agent(AgentStatus::Busy, 1)));
    coordinator.handle(&event_at(t0, Channel::Speech, utterance("Update the docs")));
    coordinator.handle(&event_at(t0, Channel::Ui, command(CommandKind::Queue)));

    assert!(
        coordinator
            .poll_dispatch(t0 + Duration::from_secs(30))
            .is_empty()
    );

    let t31 = t0 + Duration::from_secs(31);
    coordinator.handle(&event_at(t31, Channel::Agent, agent(AgentStatus::Idle, 2)));
    assert_eq!(dispatched(&coordinator.poll_dispatch(t31)).len(), 1);
}

#[test]
fn no_dispatch_before_brief() {
    let t0 = Instant::now();
    let mut coordinator = TurnCoordinator::new(dispatch_config());
    coordinator.handle(&event_at(
        t0,
        Channel::Agent,
        EventKind::AgentContext(AgentContextUpdate {
            just_finished: true,
            seq: Some(1),
            ..AgentContextUpdate::default()
        }),
    ));
    coordinator.handle(&event_at(t0, Channel::Speech, utterance("Deploy to staging")));
    coordinator.handle(&event_at(t0, Channel::Ui, command(CommandKind::Queue)));

    let t20 = t0 + Duration::from_secs(20);
    assert!(coordinator.poll_dispatch(t20).is_empty());
    assert!(coordinator.brief_pending());

    let out = coordinator.handle(&event_at(
        t20,
        Channel::Agent,
        EventKind::AgentContext(AgentContextUpdate {
            completion_brief: Some("Tests pass, PR opened.".to_string()),
            seq: Some(2),
            ..AgentContextUpdate::default()
        }),
    ));
    assert_eq!(
        out,
        vec![Intent::Present(PresentationEvent::BriefReady {
            text: "Tests pass, PR opened.".to_string()
        })]
    );
    assert_eq!(dispatched(&coordinator.poll_dispatch(t20)).len(), 1);
}

#[test]
fn empty_brief_releases_gate_silently() {
    let t0 = Instant::now();
    let mut coordinator = TurnCoordinator::new(dispatch_config());

    let out = coordinator.handle(&event_at(
        t0,
        Channel::Agent,
        EventKind::AgentContext(AgentContextUpdate {
            just_finished: true,
            completion_brief: Some(String::new()),
            ..AgentContextUpdate::default()
        }),
    ));

    assert!(out.is_empty());
    assert!(!coordinator.brief_pending());
}

#[test]
fn repeated_agent_update_is_idempotent() {
    let t0 = Instant::now();
    let mut coordinator = TurnCoordinator::new(dispatch_config());
    let update = EventKind::AgentContext(AgentContextUpdate {
        status: AgentStatus::Idle,
        just_finished: true,
        completion_brief: Some("Done.".to_string()),
        ..AgentContextUpdate::default()
    });

    let first = coordinator.handle(&event_at(t0, Channel::Agent, update.clone()));
    let before = coordinator.snapshot(t0);
    let second = coordinator.handle(&event_at(t0, Channel::Agent, update));

    assert_eq!(first.len(), 1);
    assert!(second.is_empty());
    assert_eq!(coordinator.snapshot(t0), before);
}

#[test]
fn stale_agent_update_is_discarded() {
    let t0 = Instant::now();
    let mut coordinator = TurnCoordinator::new(dispatch_config());

    coordinator.handle(&event_at(t0, Channel::Agent, agent(AgentStatus::Busy, 7)));
    let out = coordinator.handle(&event_at(t0, Channel::Agent, agent(AgentStatus::Idle, 7)));

    assert!(out.is_empty());
    assert_eq!(coordinator.agent().status, AgentStatus::Busy);
}

#[tokio::test]
async fn cancel_wins_over_satisfied_gate() {
    let (mut source, producer) = EventSource::new();
    let mut coordinator = TurnCoordinator::new(dispatch_config());
    let t0 = Instant::now();

    coordinator.handle(&event_at(t0, Channel::Speech, utterance("Fix the login bug")));
    coordinator.handle(&event_at(t0, Channel::Ui, command(CommandKind::Queue)));

    // Delay has elapsed but both events below are already buffered
    producer.agent_context(AgentContextUpdate::default()).unwrap();
    producer.command(CommandKind::Cancel).unwrap();

    let first = source.next_event().await.unwrap();
    coordinator.handle(&first);
    for event in source.drain_ready() {
        coordinator.handle(&event);
    }

    assert!(
        coordinator
            .poll_dispatch(t0 + Duration::from_secs(10))
            .is_empty()
    );
    assert_eq!(coordinator.queue_state(), QueueState::None);
}

#[tokio::test]
async fn malformed_json_is_surfaced() {
    let (mut source, producer) = EventSource::new();
    let mut coordinator = TurnCoordinator::new(dispatch_config());

    producer
        .submit_json(r#"{"type":"utterance"}"#, Channel::Speech)
        .unwrap();

    let event = source.next_event().await.unwrap();
    let out = coordinator.handle(&event);

    assert!(matches!(
        &out[..],
        [Intent::Present(PresentationEvent::Error { code, .. })] if code == "malformed_event"
    ));
    assert_eq!(coordinator.scratchpad().revision(), 0);
}
