//! End-to-end tests for the announcement pipeline
//!
//! Scripted backends record every delivery call so the tests can check
//! ordering, spacing and fallback without real audio.

mod common;

use annunciator::compose::{Detection, GridPosition};
use annunciator::pipeline::{CooldownPolicy, PipelineSettings, WorkerState};
use annunciator::AnnouncerError;
use common::{announcer, fast_settings, wait_for, Behavior, CallLog, ScriptedBackend};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn no_cooldown() -> PipelineSettings {
    fast_settings(Duration::ZERO, CooldownPolicy::Discard)
}

#[test]
fn test_queue_never_exceeds_capacity() {
    let log = CallLog::default();
    let slow = ScriptedBackend::new("slow", Behavior::Succeed(Duration::from_millis(200)), &log);
    let settings = PipelineSettings {
        capacity: 3,
        saturation_threshold: 2,
        ..no_cooldown()
    };
    let announcer = announcer(settings, &[slow]);
    assert!(announcer.start());

    for i in 0..20 {
        assert!(announcer.enqueue(&format!("message {}", i)));
        assert!(announcer.status().queue_size <= 3);
    }
    assert!(announcer.status().dropped > 0);
}

#[test]
fn test_saturation_keeps_latest() {
    let log = CallLog::default();
    let slow = ScriptedBackend::new("slow", Behavior::Succeed(Duration::from_millis(300)), &log);
    let settings = PipelineSettings {
        capacity: 3,
        saturation_threshold: 2,
        ..no_cooldown()
    };
    let announcer = announcer(settings, &[slow]);
    assert!(announcer.start());

    assert!(announcer.enqueue("first"));
    assert!(wait_for(|| log.len() == 1));

    // Worker is busy speaking "first"
    assert!(announcer.enqueue("A"));
    assert!(announcer.enqueue("B"));
    assert!(announcer.enqueue("C"));
    assert_eq!(announcer.status().queue_size, 1);

    assert!(wait_for(|| announcer.status().delivered == 2));
    thread::sleep(Duration::from_millis(100));
    assert_eq!(log.texts(), vec!["first", "C"]);
}

#[test]
fn test_clear_reports_count() {
    let log = CallLog::default();
    let slow = ScriptedBackend::new("slow", Behavior::Succeed(Duration::from_millis(300)), &log);
    let announcer = announcer(no_cooldown(), &[slow]);
    assert!(announcer.start());

    assert!(announcer.enqueue("first"));
    assert!(wait_for(|| log.len() == 1));
    assert!(announcer.enqueue("second"));
    assert!(announcer.enqueue("third"));

    assert_eq!(announcer.clear_queue().cleared_count, 2);
    assert_eq!(announcer.status().queue_size, 0);
    assert_eq!(announcer.clear_queue().cleared_count, 0);
}

#[test]
fn test_fallback_tries_backends_in_order() {
    let log = CallLog::default();
    let broken = ScriptedBackend::new("broken", Behavior::Fail, &log);
    let working = ScriptedBackend::new("working", Behavior::Succeed(Duration::ZERO), &log);
    let announcer = announcer(no_cooldown(), &[broken, working]);
    assert!(announcer.start());

    assert!(announcer.enqueue("hello"));
    assert!(wait_for(|| announcer.status().delivered == 1));

    let calls = log.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].backend, "broken");
    assert_eq!(calls[1].backend, "working");
    assert_eq!(calls[1].text, "hello");

    let status = announcer.status();
    assert_eq!(status.current_backend.as_deref(), Some("working"));
    assert_eq!(status.available_backends, vec!["broken", "working"]);
}

#[test]
fn test_all_backends_failing_counts_failure() {
    let log = CallLog::default();
    let a = ScriptedBackend::new("a", Behavior::Fail, &log);
    let b = ScriptedBackend::new("b", Behavior::Fail, &log);
    let announcer = announcer(no_cooldown(), &[a, b]);
    assert!(announcer.start());

    assert!(announcer.enqueue("nobody hears this"));
    assert!(wait_for(|| announcer.status().failed == 1));
    assert_eq!(announcer.status().delivered, 0);
    assert!(announcer.status().worker_alive);
}

#[test]
fn test_hung_backend_bounded_by_attempt_timeout() {
    let log = CallLog::default();
    let hung = ScriptedBackend::new("hung", Behavior::Hang, &log);
    let working = ScriptedBackend::new("working", Behavior::Succeed(Duration::ZERO), &log);
    let settings = PipelineSettings {
        attempt_timeout: Duration::from_millis(200),
        ..no_cooldown()
    };
    let announcer = announcer(settings, &[hung.clone(), working]);
    assert!(announcer.start());

    let enqueued = Instant::now();
    assert!(announcer.enqueue("hello"));
    assert!(wait_for(|| announcer.status().delivered == 1));

    let calls = log.calls();
    assert_eq!(calls[0].backend, "hung");
    assert_eq!(calls[1].backend, "working");
    let waited = calls[1].at.duration_since(enqueued);
    assert!(waited >= Duration::from_millis(200), "waited {:?}", waited);
    assert!(waited < Duration::from_millis(1500), "waited {:?}", waited);
    assert!(hung.was_cancelled());

    // Worker keeps going afterwards
    assert!(announcer.enqueue("next"));
    assert!(wait_for(|| announcer.status().delivered == 2));
}

#[test]
fn test_discard_policy_skips_inside_cooldown() {
    let log = CallLog::default();
    let backend = ScriptedBackend::new("fast", Behavior::Succeed(Duration::ZERO), &log);
    let settings = fast_settings(Duration::from_millis(500), CooldownPolicy::Discard);
    let announcer = announcer(settings, &[backend]);
    assert!(announcer.start());

    assert!(announcer.enqueue("A"));
    assert!(wait_for(|| announcer.status().delivered == 1));
    assert!(announcer.status().cooldown_remaining_ms > 0);

    assert!(announcer.enqueue("B"));
    assert!(wait_for(|| announcer.status().skipped == 1));

    thread::sleep(Duration::from_millis(600));
    assert_eq!(announcer.status().cooldown_remaining_ms, 0);
    assert!(announcer.enqueue("C"));
    assert!(wait_for(|| announcer.status().delivered == 2));
    assert_eq!(log.texts(), vec!["A", "C"]);
}

#[test]
fn test_failed_attempt_starts_cooldown() {
    let log = CallLog::default();
    let broken = ScriptedBackend::new("broken", Behavior::Fail, &log);
    let settings = fast_settings(Duration::from_millis(1000), CooldownPolicy::Discard);
    let announcer = announcer(settings, &[broken]);
    assert!(announcer.start());

    assert!(announcer.enqueue("A"));
    assert!(wait_for(|| announcer.status().failed == 1));
    assert!(announcer.status().cooldown_remaining_ms > 0);

    assert!(announcer.enqueue("B"));
    assert!(wait_for(|| announcer.status().skipped == 1));
    assert_eq!(log.texts(), vec!["A"]);
    assert_eq!(announcer.status().failed, 1);
}

#[test]
fn test_discard_policy_spaces_successes() {
    let log = CallLog::default();
    let backend = ScriptedBackend::new("fast", Behavior::Succeed(Duration::ZERO), &log);
    let cooldown = Duration::from_millis(300);
    let announcer = announcer(fast_settings(cooldown, CooldownPolicy::Discard), &[backend]);
    assert!(announcer.start());

    let until = Instant::now() + Duration::from_millis(1400);
    let mut i = 0;
    while Instant::now() < until {
        assert!(announcer.enqueue(&format!("frame {}", i)));
        i += 1;
        thread::sleep(Duration::from_millis(20));
    }

    let calls = log.calls();
    assert!(calls.len() >= 3, "only {} deliveries", calls.len());
    for pair in calls.windows(2) {
        let gap = pair[1].at.duration_since(pair[0].at);
        assert!(gap >= Duration::from_millis(290), "gap {:?}", gap);
    }
    assert!(announcer.status().skipped > 0);
}

#[test]
fn test_defer_policy_spaces_deliveries() {
    let log = CallLog::default();
    let backend = ScriptedBackend::new("fast", Behavior::Succeed(Duration::ZERO), &log);
    let cooldown = Duration::from_millis(300);
    let announcer = announcer(fast_settings(cooldown, CooldownPolicy::Defer), &[backend]);
    assert!(announcer.start());

    assert!(announcer.enqueue("A"));
    assert!(announcer.enqueue("B"));
    assert!(announcer.enqueue("C"));
    assert!(wait_for(|| announcer.status().delivered == 3));

    let calls = log.calls();
    assert_eq!(log.texts(), vec!["A", "B", "C"]);
    for pair in calls.windows(2) {
        let gap = pair[1].at.duration_since(pair[0].at);
        assert!(gap >= Duration::from_millis(280), "gap {:?}", gap);
    }
    assert_eq!(announcer.status().skipped, 0);
}

#[test]
fn test_defer_policy_delivers_after_cooldown() {
    let log = CallLog::default();
    let backend = ScriptedBackend::new("fast", Behavior::Succeed(Duration::ZERO), &log);
    let cooldown = Duration::from_millis(400);
    let announcer = announcer(fast_settings(cooldown, CooldownPolicy::Defer), &[backend]);
    assert!(announcer.start());

    assert!(announcer.enqueue("first"));
    assert!(wait_for(|| log.len() == 1));

    thread::sleep(Duration::from_millis(100));
    assert!(announcer.enqueue("second"));
    assert!(wait_for(|| log.len() == 2));

    let calls = log.calls();
    let gap = calls[1].at.duration_since(calls[0].at);
    assert!(gap >= Duration::from_millis(380), "gap {:?}", gap);
}

#[test]
fn test_defer_policy_two_second_scenario() {
    // C=3, T=2, 2s cooldown, 10ms backend: "D" enqueued 500ms after "C"
    // is held back and spoken once the window after "C" closes.
    let log = CallLog::default();
    let backend = ScriptedBackend::new("fast", Behavior::Succeed(Duration::from_millis(10)), &log);
    let settings = PipelineSettings {
        capacity: 3,
        saturation_threshold: 2,
        ..fast_settings(Duration::from_secs(2), CooldownPolicy::Defer)
    };
    let announcer = announcer(settings, &[backend]);
    assert!(announcer.start());

    let t0 = Instant::now();
    assert!(announcer.enqueue("C"));
    assert!(wait_for(|| log.len() == 1));
    assert!(log.calls()[0].at.duration_since(t0) < Duration::from_millis(200));

    thread::sleep(Duration::from_millis(500).saturating_sub(t0.elapsed()));
    assert!(announcer.enqueue("D"));
    thread::sleep(Duration::from_millis(1000));
    assert_eq!(log.len(), 1, "D spoken inside the cooldown");

    let deadline = Instant::now() + Duration::from_secs(3);
    while log.len() < 2 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }

    let calls = log.calls();
    assert_eq!(log.texts(), vec!["C", "D"]);
    assert!(calls[1].at.duration_since(t0) >= Duration::from_secs(2));
    let gap = calls[1].at.duration_since(calls[0].at);
    assert!(gap >= Duration::from_millis(1990), "gap {:?}", gap);
    assert!(gap < Duration::from_millis(2500), "gap {:?}", gap);
}

#[test]
fn test_skipped_scene_is_announced_later() {
    let log = CallLog::default();
    let backend = ScriptedBackend::new("fast", Behavior::Succeed(Duration::ZERO), &log);
    let settings = fast_settings(Duration::from_millis(500), CooldownPolicy::Discard);
    let announcer = announcer(settings, &[backend]);
    assert!(announcer.start());

    assert!(announcer.enqueue("warmup"));
    assert!(wait_for(|| announcer.status().delivered == 1));

    let scene = [Detection::new("dog", GridPosition::Center, 0.9)];
    assert!(announcer.announce_detections(&scene));
    assert!(wait_for(|| announcer.status().skipped == 1));

    thread::sleep(Duration::from_millis(600));
    assert!(announcer.announce_detections(&scene));
    assert!(wait_for(|| announcer.status().delivered == 2));
    assert_eq!(log.texts(), vec!["warmup", "I see: dog in center"]);

    // Now spoken, the unchanged scene is not repeated
    thread::sleep(Duration::from_millis(600));
    assert!(!announcer.announce_detections(&scene));
}

#[test]
fn test_restart_forgets_last_scene() {
    let log = CallLog::default();
    let backend = ScriptedBackend::new("fast", Behavior::Succeed(Duration::ZERO), &log);
    let announcer = announcer(no_cooldown(), &[backend]);
    assert!(announcer.start());

    let scene = [Detection::new("cat", GridPosition::TopLeft, 0.9)];
    assert!(announcer.announce_detections(&scene));
    assert!(wait_for(|| announcer.status().delivered == 1));
    assert!(!announcer.announce_detections(&scene));

    assert!(announcer.restart());
    assert!(announcer.announce_detections(&scene));
    assert!(wait_for(|| announcer.status().delivered == 2));
}

#[test]
fn test_defer_policy_saturation_during_cooldown() {
    let log = CallLog::default();
    let backend = ScriptedBackend::new("fast", Behavior::Succeed(Duration::ZERO), &log);
    let settings = PipelineSettings {
        capacity: 3,
        saturation_threshold: 2,
        ..fast_settings(Duration::from_millis(400), CooldownPolicy::Defer)
    };
    let announcer = announcer(settings, &[backend]);
    assert!(announcer.start());

    assert!(announcer.enqueue("first"));
    assert!(wait_for(|| log.len() == 1));

    assert!(announcer.enqueue("X"));
    assert!(announcer.enqueue("Y"));
    assert!(announcer.enqueue("Z"));
    assert_eq!(announcer.status().queue_size, 1);

    assert!(wait_for(|| log.len() == 2));
    thread::sleep(Duration::from_millis(50));
    assert_eq!(log.texts(), vec!["first", "Z"]);
}

#[test]
fn test_no_backends_accepts_and_drops() {
    let log = CallLog::default();
    let missing = ScriptedBackend::unavailable("missing", &log);
    let announcer = announcer(no_cooldown(), &[missing]);

    assert!(!announcer.start());
    let status = announcer.status();
    assert!(status.available_backends.is_empty());
    assert!(status.worker_alive);
    assert_eq!(status.state, WorkerState::Running);

    assert!(announcer.enqueue("into the void"));
    assert!(wait_for(|| announcer.status().failed == 1));
    assert_eq!(announcer.status().delivered, 0);
    assert_eq!(log.len(), 0);
}

#[test]
fn test_start_and_stop_are_idempotent() {
    let log = CallLog::default();
    let backend = ScriptedBackend::new("fast", Behavior::Succeed(Duration::ZERO), &log);
    let announcer = announcer(no_cooldown(), &[backend]);

    assert!(announcer.start());
    assert!(announcer.start());
    assert_eq!(announcer.state(), WorkerState::Running);

    assert!(announcer.stop(Duration::from_secs(1)).is_ok());
    assert!(announcer.stop(Duration::from_secs(1)).is_ok());
    assert_eq!(announcer.state(), WorkerState::Stopped);
    assert!(!announcer.status().worker_alive);
    assert!(!announcer.enqueue("rejected"));
}

#[test]
fn test_stop_discards_pending() {
    let log = CallLog::default();
    let slow = ScriptedBackend::new("slow", Behavior::Succeed(Duration::from_millis(200)), &log);
    let announcer = announcer(no_cooldown(), &[slow]);
    assert!(announcer.start());

    assert!(announcer.enqueue("first"));
    assert!(wait_for(|| log.len() == 1));
    assert!(announcer.enqueue("never"));

    assert!(announcer.stop(Duration::from_secs(2)).is_ok());
    assert_eq!(announcer.status().queue_size, 0);
    thread::sleep(Duration::from_millis(100));
    assert_eq!(log.texts(), vec!["first"]);
}

#[test]
fn test_ungraceful_stop_still_stops() {
    let log = CallLog::default();
    let hung = ScriptedBackend::new("hung", Behavior::Hang, &log);
    let settings = PipelineSettings {
        attempt_timeout: Duration::from_secs(2),
        ..no_cooldown()
    };
    let announcer = announcer(settings, &[hung]);
    assert!(announcer.start());

    assert!(announcer.enqueue("stuck"));
    assert!(wait_for(|| log.len() == 1));

    let started = Instant::now();
    let result = announcer.stop(Duration::from_millis(100));
    assert!(matches!(result, Err(AnnouncerError::UngracefulShutdown(_))));
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(announcer.state(), WorkerState::Stopped);
    assert!(!announcer.enqueue("rejected"));
}

#[test]
fn test_restart_reprobes_backends() {
    let log = CallLog::default();
    let late = ScriptedBackend::unavailable("late", &log);
    let announcer = announcer(no_cooldown(), &[late.clone()]);

    assert!(!announcer.start());
    assert!(announcer.status().available_backends.is_empty());

    late.set_available(true);
    assert!(announcer.restart());
    assert_eq!(announcer.status().available_backends, vec!["late"]);

    assert!(announcer.enqueue("now audible"));
    assert!(wait_for(|| announcer.status().delivered == 1));
    assert_eq!(log.texts(), vec!["now audible"]);
}

#[test]
fn test_concurrent_producers() {
    let log = CallLog::default();
    let backend = ScriptedBackend::new("fast", Behavior::Succeed(Duration::from_millis(5)), &log);
    let settings = PipelineSettings {
        capacity: 4,
        saturation_threshold: 3,
        ..no_cooldown()
    };
    let announcer = Arc::new(announcer(settings, &[backend]));
    assert!(announcer.start());

    let producers: Vec<_> = (0..4)
        .map(|p| {
            let announcer = Arc::clone(&announcer);
            thread::spawn(move || {
                for i in 0..50 {
                    assert!(announcer.enqueue(&format!("producer {} message {}", p, i)));
                    assert!(announcer.status().queue_size <= 4);
                }
            })
        })
        .collect();

    for producer in producers {
        producer.join().unwrap();
    }

    // Every accepted message is either spoken or dropped by saturation
    assert!(wait_for(|| {
        let status = announcer.status();
        status.queue_size == 0 && status.delivered + status.dropped == 200
    }));
    let status = announcer.status();
    assert_eq!(status.failed, 0);
    assert_eq!(status.skipped, 0);
    assert_eq!(log.len() as u64, status.delivered);
}

#[test]
fn test_enqueue_does_not_wait_for_speech() {
    let log = CallLog::default();
    let slow = ScriptedBackend::new("slow", Behavior::Succeed(Duration::from_millis(500)), &log);
    let announcer = announcer(no_cooldown(), &[slow]);
    assert!(announcer.start());

    assert!(announcer.enqueue("long sentence"));
    assert!(wait_for(|| log.len() == 1));

    let started = Instant::now();
    for i in 0..5 {
        assert!(announcer.enqueue(&format!("queued {}", i)));
    }
    assert!(started.elapsed() < Duration::from_millis(100));
}

#[test]
fn test_long_text_truncated() {
    let log = CallLog::default();
    let backend = ScriptedBackend::new("fast", Behavior::Succeed(Duration::ZERO), &log);
    let settings = PipelineSettings {
        max_text_len: 20,
        ..no_cooldown()
    };
    let announcer = announcer(settings, &[backend]);
    assert!(announcer.start());

    assert!(announcer.enqueue(&"word ".repeat(40)));
    assert!(wait_for(|| log.len() == 1));

    let spoken = &log.texts()[0];
    assert!(spoken.chars().count() <= 20);
    assert!(spoken.ends_with("..."));
}
