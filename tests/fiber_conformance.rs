//! End-to-end fiber lifecycle and suspension behavior.

mod common;

use std::sync::{Arc, Mutex};
use strand::{fiber, Error, ErrorKind, FiberState, Promise, Runtime};

#[test]
fn fiber_without_waits_completes_during_spawn() {
    common::init_logging();
    let rt = Runtime::new();

    let handle = rt.spawn(|| Ok(7_u32)).unwrap();

    // No driving needed: the task ran as part of spawn.
    assert!(handle.is_terminal());
    assert!(matches!(handle.state(), Some(FiberState::Completed)));
    assert_eq!(handle.take_outcome().unwrap().unwrap_completed(), 7);
    assert_eq!(rt.live_fibers(), 0);
}

#[test]
fn wait_returns_the_fulfilled_value() {
    common::init_logging();
    let rt = Runtime::new();
    let (resolver, promise) = Promise::<i32>::pair();

    let handle = rt
        .spawn(move || {
            let v = fiber::wait(promise)?;
            Ok(v + 1)
        })
        .unwrap();
    assert!(matches!(handle.state(), Some(FiberState::Suspended)));

    resolver.fulfill(5);
    rt.run_until_idle();

    assert_eq!(handle.take_outcome().unwrap().unwrap_completed(), 6);
}

#[test]
fn wait_propagates_rejection_verbatim() {
    common::init_logging();
    let rt = Runtime::new();
    let (resolver, promise) = Promise::<i32>::pair();

    let handle = rt.spawn(move || fiber::wait(promise)).unwrap();
    resolver.reject(Error::task("upstream failed"));
    rt.run_until_idle();

    let outcome = handle.take_outcome().unwrap();
    assert!(outcome.is_failed());
    match outcome {
        strand::Outcome::Failed(err) => {
            assert_eq!(err.kind(), ErrorKind::Task);
            assert_eq!(err.message(), Some("upstream failed"));
        }
        other => panic!("expected Failed, got {other:?}"),
    }
}

#[test]
fn already_settled_promise_still_suspends_once() {
    common::init_logging();
    let rt = Runtime::new();

    let handle = rt.spawn(|| fiber::wait(Promise::settled(42_u64))).unwrap();

    // Settlement is queued, never delivered inline from spawn.
    assert!(matches!(handle.state(), Some(FiberState::Suspended)));
    assert_eq!(rt.live_fibers(), 1);

    assert_eq!(rt.run_until_idle(), 1);
    assert_eq!(handle.take_outcome().unwrap().unwrap_completed(), 42);
}

#[test]
fn sequential_waits_resume_in_settlement_order() {
    common::init_logging();
    let rt = Runtime::new();
    let (r1, p1) = Promise::<u32>::pair();
    let (r2, p2) = Promise::<u32>::pair();

    let handle = rt
        .spawn(move || {
            let a = fiber::wait(p1)?;
            let b = fiber::wait(p2)?;
            Ok(a + b)
        })
        .unwrap();

    r1.fulfill(10);
    rt.run_until_idle();
    // Back at the second wait now.
    assert!(matches!(handle.state(), Some(FiberState::Suspended)));

    r2.fulfill(32);
    rt.run_until_idle();
    assert_eq!(handle.take_outcome().unwrap().unwrap_completed(), 42);
}

#[test]
fn step_delivers_exactly_one_resumption() {
    common::init_logging();
    let rt = Runtime::new();
    let (r1, p1) = Promise::<()>::pair();
    let (r2, p2) = Promise::<()>::pair();

    let h1 = rt.spawn(move || fiber::wait(p1)).unwrap();
    let h2 = rt.spawn(move || fiber::wait(p2)).unwrap();

    r1.fulfill(());
    r2.fulfill(());

    assert!(rt.step());
    assert!(h1.is_terminal());
    assert!(!h2.is_terminal());

    assert!(rt.step());
    assert!(h2.is_terminal());
    assert!(!rt.step());
}

#[test]
fn fiber_joins_child_fiber_with_handle_wait() {
    common::init_logging();
    let rt = Runtime::new();
    let (resolver, promise) = Promise::<u32>::pair();

    let outer = rt
        .spawn(move || {
            let child = fiber::run(move || fiber::wait(promise))?;
            let value = child.wait()?;
            Ok(value * 2)
        })
        .unwrap();

    resolver.fulfill(21);
    rt.run_until_idle();

    assert_eq!(outer.take_outcome().unwrap().unwrap_completed(), 42);
}

#[test]
fn panicking_task_becomes_failed() {
    common::init_logging();
    let rt = Runtime::new();

    let handle = rt
        .spawn(|| -> Result<u32, Error> { panic!("kaboom") })
        .unwrap();

    assert!(matches!(handle.state(), Some(FiberState::Failed)));
    match handle.take_outcome().unwrap() {
        strand::Outcome::Failed(err) => {
            assert_eq!(err.kind(), ErrorKind::TaskPanicked);
            assert_eq!(err.message(), Some("kaboom"));
        }
        other => panic!("expected Failed, got {other:?}"),
    }
}

#[test]
fn panic_in_child_does_not_poison_the_parent() {
    common::init_logging();
    let rt = Runtime::new();

    let outer = rt
        .spawn(|| {
            let child = fiber::run(|| -> Result<(), Error> { panic!("inner") })?;
            match child.take_outcome() {
                Some(strand::Outcome::Failed(err)) => Ok(err.kind()),
                other => Err(Error::task(format!("unexpected child outcome {other:?}"))),
            }
        })
        .unwrap();

    assert_eq!(
        outer.take_outcome().unwrap().unwrap_completed(),
        ErrorKind::TaskPanicked
    );
}

#[test]
fn completion_promise_is_observable_from_the_host() {
    common::init_logging();
    let rt = Runtime::new();
    let (resolver, promise) = Promise::<u32>::pair();

    let mut handle = rt.spawn(move || fiber::wait(promise)).unwrap();
    let completion = handle.completion().unwrap();
    assert!(!completion.is_settled());
    // One-shot: the promise moved out with the first take.
    assert!(handle.completion().is_none());

    let seen = Arc::new(Mutex::new(None));
    let seen2 = seen.clone();
    completion.subscribe(move |settlement| *seen2.lock().unwrap() = Some(settlement));

    resolver.fulfill(7);
    rt.run_until_idle();

    assert_eq!(*seen.lock().unwrap(), Some(Ok(())));
    assert_eq!(handle.take_outcome().unwrap().unwrap_completed(), 7);
}

#[test]
fn completion_promise_rejects_when_the_task_fails() {
    common::init_logging();
    let rt = Runtime::new();

    let mut handle = rt
        .spawn(|| -> Result<(), Error> { Err(Error::task("boom")) })
        .unwrap();

    let completion = handle.completion().unwrap();
    assert!(completion.is_settled());

    let seen = Arc::new(Mutex::new(None));
    let seen2 = seen.clone();
    completion.subscribe(move |settlement| *seen2.lock().unwrap() = Some(settlement));
    assert_eq!(*seen.lock().unwrap(), Some(Err(Error::task("boom"))));
}

#[test]
fn handle_wait_outside_fiber_is_rejected() {
    common::init_logging();
    let rt = Runtime::new();
    let (_resolver, promise) = Promise::<()>::pair();

    let handle = rt.spawn(move || fiber::wait(promise)).unwrap();
    let err = handle.wait().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotInFiber);
}

#[test]
fn live_fibers_tracks_suspension() {
    common::init_logging();
    let rt = Runtime::new();
    let (resolver, promise) = Promise::<()>::pair();

    assert_eq!(rt.live_fibers(), 0);
    let handle = rt.spawn(move || fiber::wait(promise)).unwrap();
    assert_eq!(rt.live_fibers(), 1);

    resolver.fulfill(());
    rt.run_until_idle();
    assert_eq!(rt.live_fibers(), 0);
    assert!(handle.is_terminal());
}

#[test]
fn current_is_set_only_inside_the_fiber() {
    common::init_logging();
    let rt = Runtime::new();
    assert!(fiber::current().is_none());
    assert!(rt.current_fiber().is_none());

    let seen = Arc::new(Mutex::new(None));
    let seen2 = seen.clone();
    let handle = rt
        .spawn(move || {
            *seen2.lock().unwrap() = fiber::current();
            Ok(())
        })
        .unwrap();

    assert_eq!(*seen.lock().unwrap(), Some(handle.id()));
    assert!(fiber::current().is_none());
    assert!(rt.current_fiber().is_none());
}

#[test]
fn dropping_the_runtime_aborts_suspended_fibers() {
    common::init_logging();
    let rt = Runtime::new();
    let (_resolver, promise) = Promise::<()>::pair();

    let handle = rt.spawn(move || fiber::wait(promise)).unwrap();
    assert!(matches!(handle.state(), Some(FiberState::Suspended)));

    drop(rt);

    // The handle keeps the fiber table alive past the runtime.
    match handle.state() {
        Some(FiberState::Aborted(reason)) => assert!(reason.is_shutdown()),
        other => panic!("expected Aborted, got {other:?}"),
    }
}
