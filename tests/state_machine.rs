// tests/state_machine.rs

use std::error::Error;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use taskgate::task::{Task, TaskState, TaskStatus};
use taskgate::types::{PriorityClass, SchedulingIntent};
use taskgate_test_utils::{init_tracing, noop_task, pending_task};

type TestResult = Result<(), Box<dyn Error>>;

const ALL_STATES: [TaskState; 5] = [
    TaskState::Initialized,
    TaskState::Pending,
    TaskState::Executing,
    TaskState::Finishing,
    TaskState::Finished,
];

#[test]
fn transition_table_accepts_exactly_the_legal_pairs() {
    use TaskState::*;

    let legal_always = [
        (Initialized, Pending),
        (Pending, Executing),
        (Executing, Finishing),
        (Finishing, Finished),
    ];

    for from in ALL_STATES {
        for to in ALL_STATES {
            let expected_uncancelled = legal_always.contains(&(from, to));
            let expected_cancelled = expected_uncancelled || (from, to) == (Pending, Finishing);

            assert_eq!(
                from.can_transition_to(to, false),
                expected_uncancelled,
                "{from} -> {to} (not cancelled)"
            );
            assert_eq!(
                from.can_transition_to(to, true),
                expected_cancelled,
                "{from} -> {to} (cancelled)"
            );
        }
    }
}

#[test]
fn states_are_ordered_by_definition() {
    assert!(TaskState::Initialized < TaskState::Pending);
    assert!(TaskState::Pending < TaskState::Executing);
    assert!(TaskState::Executing < TaskState::Finishing);
    assert!(TaskState::Finishing < TaskState::Finished);
    assert!(TaskState::Finished.is_terminal());
    assert!(!TaskState::Finishing.is_terminal());
}

#[test]
fn normal_lifecycle_walks_every_state_once() -> TestResult {
    init_tracing();

    let runs = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&runs);
    let task = Task::builder("walk")
        .work_fn(move |task: &Task| {
            assert_eq!(task.state(), TaskState::Executing);
            assert!(task.is_executing());
            seen.fetch_add(1, Ordering::SeqCst);
            task.finish(Vec::new());
        })
        .build();

    assert_eq!(task.state(), TaskState::Initialized);
    let rx = task.subscribe();

    task.will_enqueue();
    assert_eq!(task.state(), TaskState::Pending);

    task.start();

    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert!(task.is_finished());
    assert!(!task.is_cancelled());
    assert!(task.errors().is_empty());
    assert_eq!(
        *rx.borrow(),
        TaskStatus {
            state: TaskState::Finished,
            cancelled: false
        }
    );
    Ok(())
}

#[test]
fn cancelled_pending_task_goes_straight_to_finishing() {
    init_tracing();

    let task = pending_task("skip");
    task.cancel();
    assert_eq!(task.state(), TaskState::Pending);

    // Pending -> Finishing is legal once cancelled.
    task.finish(Vec::new());

    assert!(task.is_finished());
    assert!(task.is_cancelled());
}

#[test]
#[should_panic(expected = "illegal state transition initialized -> finishing")]
fn finishing_an_unscheduled_task_faults() {
    noop_task("early").finish(Vec::new());
}

#[test]
#[should_panic(expected = "illegal state transition pending -> finishing (cancelled = false)")]
fn finishing_an_uncancelled_pending_task_faults() {
    pending_task("not-cancelled").finish(Vec::new());
}

#[test]
#[should_panic(expected = "illegal state transition pending -> pending")]
fn enqueueing_twice_faults() {
    let task = pending_task("twice");
    task.will_enqueue();
}

#[test]
#[should_panic(expected = "illegal state transition finished -> pending")]
fn enqueueing_a_finished_task_faults() {
    let task = pending_task("done");
    task.start();
    assert!(task.is_finished());
    task.will_enqueue();
}

#[test]
#[should_panic(expected = "illegal state transition initialized -> executing")]
fn starting_an_unscheduled_task_faults() {
    noop_task("unscheduled").start();
}

#[test]
#[should_panic(expected = "waiting synchronously for a task is not supported")]
fn blocking_wait_is_fatal() {
    let task = pending_task("wait");
    task.wait_until_finished();
}

#[test]
fn scheduling_intent_maps_to_priority_class() -> TestResult {
    assert_eq!(SchedulingIntent::None.priority_class(), PriorityClass::Default);
    assert_eq!(
        SchedulingIntent::SideEffect.priority_class(),
        PriorityClass::Utility
    );
    assert_eq!(
        SchedulingIntent::Initiated.priority_class(),
        PriorityClass::UserInitiated
    );

    assert_eq!("side-effect".parse::<SchedulingIntent>()?, SchedulingIntent::SideEffect);
    assert!("urgent".parse::<SchedulingIntent>().is_err());
    Ok(())
}

#[test]
fn scheduling_intent_is_mutable_until_execution() {
    let task = noop_task("hint");
    assert_eq!(task.scheduling_intent(), SchedulingIntent::None);

    task.set_scheduling_intent(SchedulingIntent::Initiated);
    task.will_enqueue();
    task.set_scheduling_intent(SchedulingIntent::SideEffect);

    assert_eq!(task.scheduling_intent(), SchedulingIntent::SideEffect);
}

#[test]
#[should_panic(expected = "cannot change scheduling intent once a task is executing")]
fn scheduling_intent_is_frozen_while_executing() {
    let task = Task::builder("busy").work_fn(|_: &Task| {}).build();
    task.will_enqueue();
    task.start();
    task.set_scheduling_intent(SchedulingIntent::Initiated);
}

#[test]
fn task_ids_are_unique_and_equality_is_by_id() {
    let a = noop_task("same-name");
    let b = noop_task("same-name");

    assert_ne!(a.id(), b.id());
    assert_ne!(a, b);
    assert_eq!(a, a.clone());

    let weak = a.downgrade();
    assert_eq!(weak.upgrade(), Some(a.clone()));
    drop(a);
    assert!(weak.upgrade().is_none());
}
