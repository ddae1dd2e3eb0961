use std::sync::Arc;

use rstest::rstest;
use tempo_core::mocks::{ManualTimer, RecordingActuator, RecordingSink};
use tempo_core::protocol::{ActuateRequest, Command, Response};
use tempo_core::{DispatchCfg, Dispatcher, TransportEvent, export::decode_binary};
use tempo_traits::{Clock, ManualClock};

struct Rig {
    clock: ManualClock,
    sink: RecordingSink,
    actuator: Arc<RecordingActuator>,
    timer: ManualTimer,
    dispatcher: Dispatcher,
}

fn rig() -> Rig {
    let clock = ManualClock::starting_at_ms(1_000);
    let sink = RecordingSink::new();
    let timer = ManualTimer::new();
    let actuator = Arc::new(RecordingActuator::new(Arc::new(clock.clone())));
    let dispatcher = Dispatcher::builder()
        .with_clock(Arc::new(clock.clone()))
        .with_actuator(actuator.clone())
        .with_timer(timer.factory())
        .with_sink(Box::new(sink.clone()))
        .with_config(DispatchCfg {
            tolerance_ms: 10,
            report_interval_ms: 0,
        })
        .try_build()
        .expect("dispatcher builds");
    Rig {
        clock,
        sink,
        actuator,
        timer,
        dispatcher,
    }
}

fn connected() -> Rig {
    let mut r = rig();
    r.dispatcher.handle_event(TransportEvent::Connected);
    r
}

#[rstest]
#[case::empty(vec![])]
#[case::unknown_opcode(vec![0x7F, 0, 0, 0])]
#[case::short_time_sync(vec![0x01, 1, 2, 3, 4, 5, 6, 7])]
#[case::short_actuate(vec![0x02; 19])]
#[case::short_periodic_start(vec![0x03, 5, 0, 75])]
#[case::short_periodic_signal(vec![0x04, 1, 0, 0, 0, 0, 0, 0, 0, 0])]
fn malformed_frames_are_dropped_without_response(#[case] frame: Vec<u8>) {
    let mut r = connected();
    assert_eq!(r.dispatcher.dispatch(&frame), None);
    r.dispatcher.handle_event(TransportEvent::Write(frame));
    assert!(r.sink.frames().is_empty());
    assert_eq!(r.actuator.output_pulses(), 0);
    assert_eq!(r.dispatcher.stats().total_commands, 0);
}

#[test]
fn responses_only_reach_an_active_session() {
    let mut r = rig();
    let sync = Command::TimeSync { t1: 900 }.encode();

    r.dispatcher.handle_event(TransportEvent::Write(sync.clone()));
    assert!(r.sink.frames().is_empty(), "no session, nothing sent");

    r.dispatcher.handle_event(TransportEvent::Connected);
    r.dispatcher.handle_event(TransportEvent::Write(sync.clone()));
    assert_eq!(r.sink.frames().len(), 1);

    r.dispatcher.handle_event(TransportEvent::Disconnected);
    r.dispatcher.handle_event(TransportEvent::Write(sync));
    // the earlier response was not queued for later delivery either
    assert_eq!(r.sink.frames().len(), 1);
}

#[test]
fn time_sync_reply_layout() {
    let mut r = connected();
    r.dispatcher
        .handle_event(TransportEvent::Write(Command::TimeSync { t1: 777 }.encode()));
    let frames = r.sink.take();
    assert_eq!(frames.len(), 1);
    let f = &frames[0];
    assert_eq!(f.len(), 25);
    assert_eq!(f[0], 0x01);
    assert_eq!(u64::from_le_bytes(f[1..9].try_into().unwrap()), 777);
    let t2 = i64::from_le_bytes(f[9..17].try_into().unwrap());
    let t3 = i64::from_le_bytes(f[17..25].try_into().unwrap());
    assert_eq!(t2, 1_000);
    assert!(t3 >= t2);
}

#[test]
fn periodic_scenario_yields_anchored_deviations() {
    let mut r = connected();
    r.clock.set_ms(0);
    let start = Command::PeriodicStart {
        count: 5,
        period_ms: 75,
    };
    assert_eq!(
        r.dispatcher.dispatch(&start.encode()),
        Some(Response::PeriodicStarted)
    );

    for (seq, t) in [0i64, 74, 151, 224, 300].into_iter().enumerate() {
        r.clock.set_ms(t);
        let signal = Command::PeriodicSignal {
            sequence: seq as u16,
            sent_at: t as u64,
        };
        assert_eq!(r.dispatcher.dispatch(&signal.encode()), None);
    }

    assert!(!r.dispatcher.series().is_running());
    assert!(r.dispatcher.take_series_completed());
    assert!(!r.dispatcher.take_series_completed());
    assert_eq!(r.dispatcher.series().deviations(), &[0, -1, 1, -1, 0]);

    let Some(Response::Results(bytes)) = r.dispatcher.dispatch(&[0x05]) else {
        panic!("expected results");
    };
    assert_eq!(decode_binary(&bytes).unwrap(), vec![0, -1, 1, -1, 0]);
}

#[test]
fn signals_after_completion_are_ignored() {
    let mut r = connected();
    r.dispatcher.dispatch(
        &Command::PeriodicStart {
            count: 2,
            period_ms: 10,
        }
        .encode(),
    );
    for t in [1_000, 1_010, 1_020] {
        r.clock.set_ms(t);
        r.dispatcher.dispatch(
            &Command::PeriodicSignal {
                sequence: 0,
                sent_at: 0,
            }
            .encode(),
        );
    }
    assert_eq!(r.dispatcher.series().sample_count(), 2);
}

#[test]
fn get_results_with_no_samples_is_two_zero_bytes() {
    let mut r = connected();
    r.dispatcher.handle_event(TransportEvent::Write(vec![0x05]));
    assert_eq!(r.sink.take(), vec![vec![0x00, 0x00]]);
}

#[test]
fn periodic_start_acknowledges_even_for_zero_count() {
    let mut r = connected();
    r.dispatcher.handle_event(TransportEvent::Write(
        Command::PeriodicStart {
            count: 0,
            period_ms: 75,
        }
        .encode(),
    ));
    assert_eq!(r.sink.take(), vec![vec![1, 0]]);
    assert!(!r.dispatcher.series().is_running());
}

#[test]
fn far_future_actuation_runs_immediately_and_answers() {
    let mut r = connected();
    let req = ActuateRequest {
        actuation_id: 3,
        sent_at: 990,
        execute_at: 1_000 + 1_500,
        sequence: 42,
    };
    r.dispatcher
        .handle_event(TransportEvent::Write(Command::Actuate(req).encode()));

    assert!(r.timer.armed().is_empty());
    assert_eq!(r.actuator.output_pulses(), 1);
    let frames = r.sink.take();
    assert_eq!(frames.len(), 1);
    let f = &frames[0];
    assert_eq!(f.len(), 20);
    assert_eq!(f[0], 0x02);
    assert_eq!(f[1], 3);
    let received_at = i64::from_le_bytes(f[2..10].try_into().unwrap());
    let executed_at = i64::from_le_bytes(f[10..18].try_into().unwrap());
    assert_eq!(received_at, 1_000);
    assert_eq!(executed_at - 2_500, -1_500);
    assert_eq!(u16::from_le_bytes([f[18], f[19]]), 42);

    let snap = r.dispatcher.stats();
    assert_eq!(snap.total_commands, 1);
    assert_eq!(snap.max_error_ms, 1_500);
}

#[test]
fn deferred_actuation_sends_nothing_and_drains_completion() {
    let mut r = connected();
    let req = ActuateRequest {
        actuation_id: 1,
        sent_at: 1_000,
        execute_at: 1_200,
        sequence: 9,
    };
    r.dispatcher
        .handle_event(TransportEvent::Write(Command::Actuate(req).encode()));
    assert!(r.sink.frames().is_empty());
    assert!(r.dispatcher.engine().pending().is_some());

    r.clock.advance_ms(200);
    r.timer.fire_next().expect("armed");
    assert!(r.sink.frames().is_empty());
    assert!(r.dispatcher.engine().pending().is_none());

    r.dispatcher.poll(r.clock.now_ms());
    assert!(r.dispatcher.engine().take_completion().is_none(), "drained by poll");
}

#[test]
fn failing_sink_does_not_stop_dispatch() {
    let mut r = connected();
    r.sink.set_failing(true);
    r.dispatcher.handle_event(TransportEvent::Write(vec![0x05]));
    r.sink.set_failing(false);
    r.dispatcher.handle_event(TransportEvent::Write(vec![0x05]));
    assert_eq!(r.sink.frames().len(), 1);
}

#[test]
fn session_led_follows_the_connection() {
    let mut r = rig();
    assert!(!r.actuator.session_on());
    r.dispatcher.handle_event(TransportEvent::Connected);
    assert!(r.actuator.session_on());
    r.dispatcher.handle_event(TransportEvent::Disconnected);
    assert!(!r.actuator.session_on());
}

#[test]
fn poll_settles_actuator_pins_every_pass() {
    let mut r = connected();
    let now = r.clock.now_ms();
    r.dispatcher.poll(now);
    r.dispatcher.poll(now + 1);
    assert_eq!(r.actuator.settles(), 2);
}
