use floatlease_transport::ClockWatch;
use floatlease_types::{ClockSide, LeaseError};
use std::time::{Duration, Instant, SystemTime};

const TOLERANCE: Duration = Duration::from_secs(60);

#[test]
fn first_observation_is_baseline() {
    let watch = ClockWatch::new(TOLERANCE);
    assert!(watch.observe(SystemTime::now(), Instant::now()).is_ok());
}

#[test]
fn clocks_advancing_together_pass() {
    let watch = ClockWatch::new(TOLERANCE);
    let wall = SystemTime::now();
    let mono = Instant::now();
    watch.observe(wall, mono).unwrap();
    let step = Duration::from_secs(600);
    assert!(watch.observe(wall + step, mono + step).is_ok());
}

#[test]
fn wall_clock_moved_forward_passes() {
    let watch = ClockWatch::new(TOLERANCE);
    let wall = SystemTime::now();
    let mono = Instant::now();
    watch.observe(wall, mono).unwrap();
    assert!(
        watch
            .observe(wall + Duration::from_secs(86_400), mono + Duration::from_secs(1))
            .is_ok()
    );
}

#[test]
fn wall_clock_wound_back_is_tampering() {
    let watch = ClockWatch::new(TOLERANCE);
    let wall = SystemTime::now();
    let mono = Instant::now();
    watch.observe(wall, mono).unwrap();

    let err = watch
        .observe(wall - Duration::from_secs(3600), mono + Duration::from_secs(1))
        .unwrap_err();
    assert!(matches!(err, LeaseError::ClockTampered(ClockSide::Client)));
}

#[test]
fn wall_clock_stalled_beyond_tolerance_is_tampering() {
    let watch = ClockWatch::new(TOLERANCE);
    let wall = SystemTime::now();
    let mono = Instant::now();
    watch.observe(wall, mono).unwrap();
    assert!(watch.observe(wall, mono + Duration::from_secs(120)).is_err());
}

#[test]
fn small_drift_is_tolerated() {
    let watch = ClockWatch::new(TOLERANCE);
    let wall = SystemTime::now();
    let mono = Instant::now();
    watch.observe(wall, mono).unwrap();
    assert!(
        watch
            .observe(wall - Duration::from_secs(30), mono + Duration::from_secs(1))
            .is_ok()
    );
}

#[test]
fn detection_resets_baseline() {
    let watch = ClockWatch::new(TOLERANCE);
    let wall = SystemTime::now();
    let mono = Instant::now();
    watch.observe(wall, mono).unwrap();

    let back = wall - Duration::from_secs(3600);
    assert!(watch.observe(back, mono + Duration::from_secs(1)).is_err());
    assert!(
        watch
            .observe(back + Duration::from_secs(10), mono + Duration::from_secs(11))
            .is_ok()
    );
}
