use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use cardscan::capture::{Facing, SimulatedCamera, Size};
use cardscan::recognition::{self, RecognitionError};
use cardscan::{CameraSession, CameraStatus, Config, ScanEvent};

fn config(fps: u32) -> Config {
    let mut config = Config::default();
    config.simulator.fps = fps;
    config.pipeline.event_capacity = 1024;
    config
}

fn camera(config: &Config) -> SimulatedCamera {
    SimulatedCamera::open(Facing::Back, &config.simulator).unwrap()
}

#[test]
fn thirty_fps_for_one_second_conserves_buffers() {
    let config = config(30);
    let successes = Arc::new(AtomicU64::new(0));
    let counter = successes.clone();
    let recognizer = recognition::from_fn(move |_| {
        counter.fetch_add(1, Ordering::Relaxed);
        Ok(Vec::new())
    });

    let mut session = CameraSession::with_config(Ok(camera(&config)), recognizer, &config);
    let pair = session.start().unwrap();
    assert_eq!(pair.preview, Size::new(480, 360));

    thread::sleep(Duration::from_secs(1));
    session.stop();

    let stats = session.stats();
    let sim = session.driver().unwrap().stats();

    // Every buffer the camera delivered came back exactly once.
    assert!(sim.delivered >= 15, "only {} frames delivered", sim.delivered);
    assert_eq!(stats.pool.delivered, sim.delivered);
    assert_eq!(stats.pool.recycled, stats.pool.delivered);
    assert_eq!(stats.pool.stray, 0);
    assert_eq!(stats.pool.in_pipeline, 0);
    assert_eq!(stats.pool.with_driver, stats.pool.capacity);
    assert_eq!(sim.queued, stats.pool.capacity);

    // Processed + superseded + drained accounts for every published frame.
    assert_eq!(
        stats.exchange.taken + stats.exchange.superseded + stats.exchange.drained,
        stats.exchange.published
    );
    assert_eq!(stats.worker.processed, stats.exchange.taken);
    assert_eq!(successes.load(Ordering::Relaxed), stats.worker.succeeded);
    assert!(stats.worker.succeeded > 0);
}

#[test]
fn slow_recognizer_sees_only_fresh_frames() {
    let config = config(100);
    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let log = seen.clone();
    let recognizer = recognition::from_fn(move |image| {
        log.lock().push(image.sequence);
        thread::sleep(Duration::from_millis(50));
        Ok(Vec::new())
    });

    let mut session = CameraSession::with_config(Ok(camera(&config)), recognizer, &config);
    session.start().unwrap();
    thread::sleep(Duration::from_millis(500));
    session.stop();

    let stats = session.stats();
    assert!(stats.exchange.superseded > 0);
    assert_eq!(stats.pool.recycled, stats.pool.delivered);

    // Frames reach the worker in publish order, with gaps where frames
    // were superseded.
    let seen = seen.lock();
    assert!(seen.windows(2).all(|w| w[0] < w[1]));
    assert!(seen.windows(2).any(|w| w[1] - w[0] > 1));

    // The camera never ran dry: buffers kept coming back.
    let sim = session.driver().unwrap().stats();
    assert!(sim.delivered > stats.pool.capacity as u64);
}

#[test]
fn failing_recognizer_does_not_stall_the_pipeline() {
    let config = config(60);
    let recognizer = recognition::from_fn(|image| {
        if image.sequence % 2 == 0 {
            Err(RecognitionError::Failed("no text".into()))
        } else if image.sequence % 5 == 0 {
            panic!("recognizer bug")
        } else {
            Ok(Vec::new())
        }
    });

    let mut session = CameraSession::with_config(Ok(camera(&config)), recognizer, &config);
    let events = session.events();
    session.start().unwrap();
    thread::sleep(Duration::from_millis(500));
    session.stop();

    let stats = session.stats();
    assert!(stats.worker.failed > 0);
    assert!(stats.worker.succeeded > 0);
    assert_eq!(stats.pool.recycled, stats.pool.delivered);

    let events: Vec<ScanEvent> = events.drain().collect();
    assert_eq!(events.first(), Some(&ScanEvent::Camera(CameraStatus::Ready)));
    assert_eq!(events.last(), Some(&ScanEvent::Camera(CameraStatus::NotReady)));
    assert!(events.iter().any(|e| matches!(e, ScanEvent::Failed { .. })));
}

#[test]
fn stop_returns_promptly_with_no_frames() {
    let config = config(1);
    let recognizer = recognition::from_fn(|_| Ok(Vec::new()));
    let mut session = CameraSession::with_config(Ok(camera(&config)), recognizer, &config);
    session.start().unwrap();

    let started = Instant::now();
    session.stop();
    session.stop();
    // Bounded by one simulated frame interval plus slack.
    assert!(started.elapsed() < Duration::from_secs(3));
    assert!(!session.is_running());
}

#[test]
fn restart_after_stop_runs_again() {
    let config = config(60);
    let recognizer = recognition::from_fn(|_| Ok(Vec::new()));
    let mut session = CameraSession::with_config(Ok(camera(&config)), recognizer, &config);

    session.start().unwrap();
    thread::sleep(Duration::from_millis(200));
    session.stop();
    let first = session.stats();

    session.start().unwrap();
    thread::sleep(Duration::from_millis(200));
    session.stop();
    let second = session.stats();

    assert!(first.pool.delivered > 0);
    assert!(second.pool.delivered > 0);
    assert_eq!(second.pool.recycled, second.pool.delivered);
    assert_eq!(second.exchange.published, second.pool.delivered);
    // The first run's buffers were still queued in the camera; each came
    // back once as a stray and was dropped.
    assert_eq!(second.pool.stray, first.pool.capacity as u64);
    assert_eq!(session.driver().unwrap().stats().queued, second.pool.capacity);
    session.close();
}

#[test]
fn missing_camera_reports_unavailable() {
    let config = config(30);
    let recognizer = recognition::from_fn(|_| Ok(Vec::new()));
    let mut session = CameraSession::with_config(
        SimulatedCamera::open(Facing::Front, &config.simulator),
        recognizer,
        &config,
    );

    assert!(matches!(
        session.start(),
        Err(cardscan::ScanError::DeviceUnavailable(_))
    ));
    session.stop();
}
