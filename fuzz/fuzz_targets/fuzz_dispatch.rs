#![no_main]
use std::sync::Arc;

use libfuzzer_sys::fuzz_target;
use tempo_core::export::MAX_RESULT_PAYLOAD;
use tempo_core::mocks::{ManualTimer, RecordingActuator, RecordingSink};
use tempo_core::{Dispatcher, TransportEvent};
use tempo_traits::{Clock, ManualClock};

// Input is a stream of `len:u8, frame[len]` records. Between frames the clock
// advances and any armed timers fire, so deferred and stale paths are hit.
fuzz_target!(|data: &[u8]| {
    let clock = ManualClock::starting_at_ms(1_000);
    let shared: Arc<dyn Clock + Send + Sync> = Arc::new(clock.clone());
    let timer = ManualTimer::new();
    let sink = RecordingSink::new();
    let Ok(mut dispatcher) = Dispatcher::builder()
        .with_clock(Arc::clone(&shared))
        .with_actuator(Arc::new(RecordingActuator::new(Arc::clone(&shared))))
        .with_timer(timer.factory())
        .with_sink(Box::new(sink.clone()))
        .try_build()
    else {
        return;
    };
    dispatcher.handle_event(TransportEvent::Connected);

    let mut rest = data;
    while let Some((&len, tail)) = rest.split_first() {
        let n = usize::from(len).min(tail.len());
        let (frame, next) = tail.split_at(n);
        rest = next;

        dispatcher.handle_event(TransportEvent::Write(frame.to_vec()));
        clock.advance_ms(i64::from(len % 17));
        if len % 3 == 0 {
            timer.fire_all();
        }
        dispatcher.poll(clock.now_ms());
    }

    for frame in sink.frames() {
        assert!(frame.len() <= MAX_RESULT_PAYLOAD);
    }
    let stats = dispatcher.stats();
    assert!(stats.commands_within_tolerance <= stats.total_commands);
});
