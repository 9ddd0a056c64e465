use std::rc::Rc;

use assert_call::{call, CallRecorder};

use super::*;
use crate::Error;

#[test]
fn same_key_runs_once_per_frame() {
    let mut cr = CallRecorder::new();
    let s = FrameScheduler::new();
    s.schedule_once(
        FlushKey(1),
        Box::new(|| {
            call!("first");
            Ok(())
        }),
    );
    s.schedule_once(
        FlushKey(1),
        Box::new(|| {
            call!("second");
            Ok(())
        }),
    );
    s.schedule_once(
        FlushKey(2),
        Box::new(|| {
            call!("other");
            Ok(())
        }),
    );
    cr.verify(());

    assert_eq!(s.run_frame(), Ok(2));
    cr.verify(["first", "other"]);
    assert_eq!(s.frame(), 1);

    assert_eq!(s.run_frame(), Ok(0));
    cr.verify(());
}

#[test]
fn task_scheduled_during_frame_runs_next_frame() {
    let mut cr = CallRecorder::new();
    let s = Rc::new(FrameScheduler::new());
    let s0 = s.clone();
    s.schedule_once(
        FlushKey(1),
        Box::new(move || {
            call!("outer");
            s0.schedule_once(
                FlushKey(1),
                Box::new(|| {
                    call!("inner");
                    Ok(())
                }),
            );
            Ok(())
        }),
    );
    s.run_frame().unwrap();
    cr.verify("outer");
    assert!(s.is_pending(FlushKey(1)));
    s.run_frame().unwrap();
    cr.verify("inner");
}

#[test]
fn error_does_not_stop_frame() {
    let mut cr = CallRecorder::new();
    let s = FrameScheduler::new();
    s.schedule_once(FlushKey(1), Box::new(|| Err(Error::Hook("boom".into()))));
    s.schedule_once(
        FlushKey(2),
        Box::new(|| {
            call!("after");
            Ok(())
        }),
    );
    assert_eq!(s.run_frame(), Err(Error::Hook("boom".into())));
    cr.verify("after");
    assert_eq!(s.pending_count(), 0);
}

#[test]
fn run_until_idle_is_bounded() {
    let s = Rc::new(FrameScheduler::new());
    fn reschedule(s: Rc<FrameScheduler>) {
        let s0 = s.clone();
        s.schedule_once(
            FlushKey(0),
            Box::new(move || {
                reschedule(s0);
                Ok(())
            }),
        );
    }
    reschedule(s.clone());
    assert_eq!(s.run_until_idle(3), Ok(3));
    assert_eq!(s.pending_count(), 1);
}
