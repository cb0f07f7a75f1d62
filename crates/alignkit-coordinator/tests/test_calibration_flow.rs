use alignkit_coordinator::{
    AlignCommand, CancelToken, CaptureProvider, CommandPacket, CommandStatus, Coordinator,
    ResetScope, Router, SimulatedCamera, VisionRegistry,
};
use alignkit_core::{
    rotate_point, AffineTransform, AlignmentError, AlignmentEvent, CalibrationEvent, DeviceName,
    EventFilter, Point3, RegistrationEvent,
};
use alignkit_settings::{
    calibration_positions, AlignmentConstants, AlignmentParams, MemoryConfig,
};
use approx::assert_relative_eq;
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

// Camera that replays precomputed readings; can be told to hang on the next capture
struct PatternCamera {
    frames: Vec<Point3>,
    index: Mutex<usize>,
    stall: AtomicBool,
}

impl PatternCamera {
    fn new(frames: Vec<Point3>) -> Self {
        Self {
            frames,
            index: Mutex::new(0),
            stall: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl CaptureProvider for PatternCamera {
    async fn capture(&self, camera: &str, _cancel: &CancelToken) -> Result<Point3, AlignmentError> {
        if self.stall.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(60)).await;
        }
        let mut index = self.index.lock();
        let frame = self
            .frames
            .get(*index)
            .copied()
            .ok_or_else(|| AlignmentError::NotConnected {
                camera: camera.to_string(),
            })?;
        *index += 1;
        Ok(frame)
    }
}

fn name(s: &str) -> DeviceName {
    DeviceName::from(s)
}

fn generator() -> AffineTransform {
    AffineTransform::from_similarity(2.0, 1.0, 100.0, 50.0)
}

fn params() -> AlignmentParams {
    AlignmentParams {
        calib_move: Point3::new(5.0, 5.0, 2.0),
        ..Default::default()
    }
}

const PIXEL_CENTER: Point3 = Point3::xy(40.0, -30.0);

/// Pixels a camera sees while the robot walks the default pattern
fn pattern_pixels() -> Vec<Point3> {
    let positions = calibration_positions(&params(), &AlignmentConstants::default());
    let to_pixel = generator().invert().unwrap();
    let probe = Point3::xy(55.0, -30.0);

    positions
        .iter()
        .enumerate()
        .map(|(i, real)| {
            if i < 9 {
                to_pixel.apply(real)
            } else {
                rotate_point(&PIXEL_CENTER, &probe, real.u)
            }
        })
        .collect()
}

fn coordinator(camera: Arc<dyn CaptureProvider>) -> Coordinator {
    Coordinator::new(
        VisionRegistry::new().with_camera("CCD1", camera),
        Arc::new(MemoryConfig::with_params(params())),
    )
}

#[tokio::test]
async fn test_twelve_step_calibration_recovers_generator() {
    let coord = coordinator(Arc::new(PatternCamera::new(pattern_pixels())));
    let mut rx = coord.events().receiver();
    let token = CancelToken::new();

    for step in 1..=11 {
        let packet = CommandPacket::new("C1", "CCD1", AlignCommand::Calibrate)
            .with_robot(Point3::new(300.0, 200.0, 0.0));
        let result = coord.handle(&packet, &token).await;
        assert!(result.success, "step {}: {}", step, result.message);
        assert_eq!(result.status, CommandStatus::InProgress);
        assert_eq!((result.completed, result.required), (step, 12));
        if step == 1 {
            assert_eq!(result.next_relative_move, Point3::new(-5.0, 0.0, 0.0));
        }
        assert!(coord.calibration(&name("C1")).is_none());
    }

    let packet = CommandPacket::new("C1", "CCD1", AlignCommand::Calibrate);
    let result = coord.handle(&packet, &token).await;
    assert_eq!(result.status, CommandStatus::Completed);
    assert_eq!(result.status_code(), 2);
    assert_eq!(result.completed, 12);
    assert!(result.rmse < 1e-3);
    assert_eq!(result.next_relative_move, Point3::ZERO);

    let calib = coord.calibration(&name("c1")).unwrap();
    let p2r = calib.pixel_to_real[&name("CCD1")];
    let g = generator();
    for (fit, expected) in p2r.to_array().iter().zip(g.to_array()) {
        assert_relative_eq!(*fit, expected, epsilon = 1e-6);
    }
    let roundtrip = calib.real_to_pixel[&name("CCD1")].compose(&p2r);
    assert_relative_eq!(roundtrip.a, 1.0, epsilon = 1e-9);
    assert_relative_eq!(roundtrip.c, 0.0, epsilon = 1e-6);

    let rc = calib.rotation_centers[&name("CCD1")];
    assert_relative_eq!(rc.x, PIXEL_CENTER.x, epsilon = 1e-6);
    assert_relative_eq!(rc.y, PIXEL_CENTER.y, epsilon = 1e-6);
    assert_eq!(calib.origin, Point3::ZERO);

    let mut completed_events = 0;
    while let Ok(event) = rx.try_recv() {
        if let AlignmentEvent::Calibration(CalibrationEvent::Completed { rmse, .. }) = event {
            assert!(rmse < 1e-3);
            completed_events += 1;
        }
    }
    assert_eq!(completed_events, 1);
    assert!(coord.calibration_progress(&name("C1"), &name("CCD1")).is_none());
}

#[tokio::test]
async fn test_calibrate_after_completion_starts_over() {
    let mut frames = pattern_pixels();
    frames.extend(pattern_pixels());
    let coord = coordinator(Arc::new(PatternCamera::new(frames)));
    let token = CancelToken::new();

    for _ in 0..12 {
        coord
            .handle(&CommandPacket::new("C1", "CCD1", AlignCommand::Calibrate), &token)
            .await;
    }
    let result = coord
        .handle(&CommandPacket::new("C1", "CCD1", AlignCommand::Calibrate), &token)
        .await;
    assert_eq!(result.status, CommandStatus::InProgress);
    assert_eq!(result.completed, 1);
    // The previous calibration stays committed until the new plan completes
    assert!(coord.calibration(&name("C1")).unwrap().is_calibrated(&name("CCD1")));
}

#[tokio::test]
async fn test_cancelled_capture_commits_nothing_and_resumes() {
    let camera = Arc::new(PatternCamera::new(pattern_pixels()));
    let coord = Arc::new(coordinator(camera.clone()));

    for _ in 0..11 {
        coord
            .handle(
                &CommandPacket::new("C1", "CCD1", AlignCommand::Calibrate),
                &CancelToken::new(),
            )
            .await;
    }

    camera.stall.store(true, Ordering::SeqCst);
    let token = CancelToken::new();
    let task = {
        let coord = coord.clone();
        let token = token.clone();
        tokio::spawn(async move {
            coord
                .handle(&CommandPacket::new("C1", "CCD1", AlignCommand::Calibrate), &token)
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    token.cancel();
    let result = task.await.unwrap();

    assert!(!result.success);
    assert_eq!(result.message, "Operation cancelled");
    assert!(coord.calibration(&name("C1")).is_none());
    assert_eq!(coord.calibration_progress(&name("C1"), &name("CCD1")), Some((11, 12)));

    camera.stall.store(false, Ordering::SeqCst);
    let result = coord
        .handle(
            &CommandPacket::new("C1", "CCD1", AlignCommand::Calibrate),
            &CancelToken::new(),
        )
        .await;
    assert_eq!(result.status, CommandStatus::Completed);
    assert!(coord.calibration(&name("C1")).is_some());
}

#[tokio::test]
async fn test_degenerate_calibration_fails_and_discards_plan() {
    // A camera that never moves cannot constrain the affine fit
    let coord = coordinator(Arc::new(SimulatedCamera::new(vec![Point3::xy(10.0, 10.0)])));
    let token = CancelToken::new();

    let mut last = None;
    for _ in 0..12 {
        last = Some(
            coord
                .handle(&CommandPacket::new("C1", "CCD1", AlignCommand::Calibrate), &token)
                .await,
        );
    }
    let result = last.unwrap();
    assert_eq!(result.status, CommandStatus::Failed);
    assert!(coord.calibration(&name("C1")).is_none());
    assert!(coord.calibration_progress(&name("C1"), &name("CCD1")).is_none());
}

#[tokio::test]
async fn test_short_pattern_is_exhausted_before_capture() {
    let camera = Arc::new(SimulatedCamera::canned());
    let constants = AlignmentConstants {
        calib_pos_matrix: vec![Point3::ZERO, Point3::xy(1.0, 0.0)],
        calib_move_matrix: vec![Point3::xy(1.0, 0.0)],
    };
    let coord = Coordinator::new(
        VisionRegistry::new().with_camera("CCD1", camera.clone()),
        Arc::new(MemoryConfig::new(params(), constants)),
    );
    let token = CancelToken::new();

    for _ in 0..2 {
        let r = coord
            .handle(&CommandPacket::new("C1", "CCD1", AlignCommand::Calibrate), &token)
            .await;
        assert_eq!((r.status, r.required), (CommandStatus::InProgress, 2));
    }
    let r = coord
        .handle(&CommandPacket::new("C1", "CCD1", AlignCommand::Calibrate), &token)
        .await;
    assert_eq!(r.status, CommandStatus::Failed);
    assert!(r.message.contains("exhausted"));
    assert_eq!(camera.captures(), 2);
}

fn registered_router() -> Router {
    let vision = VisionRegistry::new()
        .with_camera(
            "CCD1",
            Arc::new(SimulatedCamera::new(vec![Point3::xy(100.0, 100.0)])) as Arc<dyn CaptureProvider>,
        )
        .with_camera(
            "CCD2",
            Arc::new(SimulatedCamera::new(vec![Point3::xy(200.0, 150.0)])) as Arc<dyn CaptureProvider>,
        );
    let coordinator = Coordinator::new(vision, Arc::new(MemoryConfig::with_params(params())));

    let pixel = [Point3::xy(0.0, 0.0), Point3::xy(100.0, 0.0), Point3::xy(0.0, 100.0)];
    let real: Vec<Point3> = pixel.iter().map(|p| generator().apply(p)).collect();
    for cam in ["CCD1", "CCD2"] {
        coordinator
            .build_pixel_to_real(&name("C1"), &name(cam), &pixel, &real)
            .unwrap();
    }
    Router::new(Arc::new(coordinator))
}

#[tokio::test]
async fn test_register_two_cameras_then_align() {
    let router = registered_router();
    let golden = Point3::new(250.0, 180.0, 0.5);

    let first = CommandPacket::new("C1", "CCD1", AlignCommand::Register)
        .with_job("J1")
        .with_cameras(["CCD1", "CCD2"])
        .with_robot(golden);
    let result = router.execute(first).await;
    assert_eq!(result.status, CommandStatus::InProgress);
    assert_eq!((result.completed, result.required), (1, 2));
    assert_eq!(
        router.coordinator().registration_progress(&name("C1"), "J1"),
        Some((1, 2))
    );

    let second = CommandPacket::new("C1", "CCD2", AlignCommand::Register)
        .with_job("J1")
        .with_cameras(["CCD1", "CCD2"])
        .with_robot(Point3::new(999.0, 999.0, 0.0));
    let result = router.execute(second).await;
    assert_eq!(result.status, CommandStatus::Completed);
    assert_eq!(result.real, golden);
    assert!(router
        .coordinator()
        .registration_progress(&name("C1"), "J1")
        .is_none());

    let calib = router.coordinator().calibration(&name("C1")).unwrap();
    assert_eq!(calib.real_golden, golden);
    assert_eq!(calib.pixel_golden[&name("CCD1")], vec![Point3::xy(100.0, 100.0)]);
    assert_eq!(calib.pixel_golden[&name("CCD2")], vec![Point3::xy(200.0, 150.0)]);

    let result = router
        .execute(CommandPacket::new("C1", "CCD1", AlignCommand::Align).with_job("A1"))
        .await;
    assert!(result.success, "{}", result.message);
    assert_eq!(result.status, CommandStatus::Ok);
    let expected_real = generator().apply(&Point3::xy(100.0, 100.0));
    assert_relative_eq!(result.real.x, expected_real.x, epsilon = 1e-6);
    assert_relative_eq!(result.offset.x, expected_real.x - golden.x, epsilon = 1e-6);
    assert_relative_eq!(result.offset.y, expected_real.y - golden.y, epsilon = 1e-6);

    let offset = router
        .coordinator()
        .compute_offset(&name("C1"), &name("CCD2"))
        .unwrap();
    let ccd2_real = generator().apply(&Point3::xy(200.0, 150.0));
    assert_relative_eq!(offset.x, golden.x - ccd2_real.x, epsilon = 1e-6);

    router.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_simultaneous_reporters_complete_one_registration() {
    let router = registered_router();
    // Hold CCD1's agent right after it recorded its pixel
    router
        .coordinator()
        .events()
        .subscribe(EventFilter::All, |event| {
            if let AlignmentEvent::Registration(RegistrationEvent::PixelCaptured { camera, .. }) = event {
                if camera == "CCD1" {
                    std::thread::sleep(Duration::from_millis(300));
                }
            }
        });

    let golden = Point3::new(12.0, 34.0, 0.0);
    let packet = |cam: &str| {
        CommandPacket::new("C1", cam, AlignCommand::Register)
            .with_job("J1")
            .with_cameras(["CCD1", "CCD2"])
            .with_robot(golden)
    };
    let first = router.submit(packet("CCD1")).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    let second = router.submit(packet("CCD2")).unwrap();

    let second = second.wait().await;
    let first = first.wait().await;
    assert_eq!(second.status, CommandStatus::Completed, "{}", second.message);
    assert!(first.success, "{}", first.message);
    assert_eq!(first.status, CommandStatus::InProgress);
    assert_eq!((first.completed, first.required), (1, 2));

    let calib = router.coordinator().calibration(&name("C1")).unwrap();
    assert_eq!(calib.pixel_golden.len(), 2);
    assert_eq!(calib.real_golden, golden);
    assert!(router
        .coordinator()
        .registration_progress(&name("C1"), "J1")
        .is_none());
    router.shutdown().await;
}

#[tokio::test]
async fn test_register_rejects_camera_outside_job() {
    let camera = Arc::new(SimulatedCamera::canned());
    let coordinator = Coordinator::new(
        VisionRegistry::new().with_fallback(camera.clone()),
        Arc::new(MemoryConfig::default()),
    );

    let packet = CommandPacket::new("C1", "CCD3", AlignCommand::Register)
        .with_job("J5")
        .with_cameras(["CCD1", "CCD2"]);
    let result = coordinator.handle(&packet, &CancelToken::new()).await;
    assert!(!result.success);
    assert_eq!(result.message, "Camera CCD3 is not expected by job J5");
    assert_eq!(camera.captures(), 0);
    assert!(coordinator.registration_progress(&name("C1"), "J5").is_none());
}

#[tokio::test]
async fn test_multi_camera_align_uses_first_camera() {
    let router = registered_router();
    let cams = ["CCD2", "CCD1"];

    let result = router
        .execute(
            CommandPacket::new("C1", "CCD1", AlignCommand::Align)
                .with_job("A7")
                .with_cameras(cams),
        )
        .await;
    assert_eq!(result.status, CommandStatus::InProgress);

    let result = router
        .execute(
            CommandPacket::new("C1", "CCD2", AlignCommand::Align)
                .with_job("A7")
                .with_cameras(cams),
        )
        .await;
    assert_eq!(result.status, CommandStatus::Ok);
    assert_eq!((result.completed, result.required), (2, 2));
    let ccd2_real = generator().apply(&Point3::xy(200.0, 150.0));
    assert_relative_eq!(result.real.x, ccd2_real.x, epsilon = 1e-6);
    assert_relative_eq!(result.real.y, ccd2_real.y, epsilon = 1e-6);
}

#[tokio::test]
async fn test_align_rejects_uncalibrated_camera_before_capture() {
    let camera = Arc::new(SimulatedCamera::canned());
    let coordinator = Coordinator::new(
        VisionRegistry::new().with_fallback(camera.clone()),
        Arc::new(MemoryConfig::default()),
    );
    let pixel = [Point3::xy(0.0, 0.0), Point3::xy(1.0, 0.0), Point3::xy(0.0, 1.0)];
    coordinator
        .build_pixel_to_real(&name("C1"), &name("CCD1"), &pixel, &pixel)
        .unwrap();

    let packet = CommandPacket::new("C1", "", AlignCommand::Align).with_cameras(["CCD1", "CCD3"]);
    let result = coordinator.handle(&packet, &CancelToken::new()).await;
    assert!(!result.success);
    assert!(result.message.contains("CCD3"));
    assert_eq!(camera.captures(), 0);
}

#[tokio::test]
async fn test_reset_all_calibration_is_connection_scoped() {
    let router = registered_router();
    let pixel = [Point3::xy(0.0, 0.0), Point3::xy(10.0, 0.0), Point3::xy(0.0, 10.0)];
    router
        .coordinator()
        .build_pixel_to_real(&name("C2"), &name("CCD1"), &pixel, &pixel)
        .unwrap();
    for conn in ["C1", "C2"] {
        let r = router
            .execute(CommandPacket::new(conn, "CCD1", AlignCommand::Register).with_robot(Point3::xy(1.0, 2.0)))
            .await;
        assert_eq!(r.status, CommandStatus::Completed);
    }

    let r = router
        .execute(CommandPacket::new("C1", "", AlignCommand::Reset(ResetScope::AllCalibration)))
        .await;
    assert_eq!(r.status, CommandStatus::Ok);

    let c1 = router.coordinator().calibration(&name("C1")).unwrap();
    assert!(c1.pixel_to_real.is_empty());
    assert!(c1.rotation_centers.is_empty());
    assert_eq!(c1.real_golden, Point3::ZERO);

    let c2 = router.coordinator().calibration(&name("C2")).unwrap();
    assert!(c2.is_calibrated(&name("CCD1")));
    assert_eq!(c2.real_golden, Point3::xy(1.0, 2.0));

    let r = router
        .execute(CommandPacket::new("C1", "CCD1", AlignCommand::Align))
        .await;
    assert_eq!(r.status, CommandStatus::Failed);
}

#[tokio::test]
async fn test_reset_connection_drops_open_jobs() {
    let router = registered_router();
    router
        .execute(
            CommandPacket::new("C1", "CCD1", AlignCommand::Register)
                .with_job("J9")
                .with_cameras(["CCD1", "CCD2"]),
        )
        .await;
    assert!(router.coordinator().registration_progress(&name("C1"), "J9").is_some());

    let r = router
        .submit_raw("C1", "", "command:7")
        .unwrap()
        .wait()
        .await;
    assert_eq!(r.message, "Reset");
    assert!(router.coordinator().registration_progress(&name("C1"), "J9").is_none());
    // Progress-only reset keeps committed data
    assert!(router.coordinator().calibration(&name("C1")).unwrap().is_calibrated(&name("CCD1")));
}

#[tokio::test]
async fn test_sweep_expired_registrations() {
    let router = registered_router();
    let coord = router.coordinator().clone();
    router
        .execute(
            CommandPacket::new("C1", "CCD1", AlignCommand::Register)
                .with_job("J2")
                .with_cameras(["CCD1", "CCD2"]),
        )
        .await;

    assert_eq!(coord.sweep_expired(Utc::now()), 0);
    assert_eq!(coord.sweep_expired(Utc::now() + ChronoDuration::seconds(5)), 1);
    assert!(coord.registration_progress(&name("C1"), "J2").is_none());

    // A late report opens a fresh plan
    let r = router
        .execute(
            CommandPacket::new("C1", "CCD2", AlignCommand::Register)
                .with_job("J2")
                .with_cameras(["CCD1", "CCD2"]),
        )
        .await;
    assert_eq!(r.status, CommandStatus::InProgress);
    assert_eq!((r.completed, r.required), (1, 2));
}

#[tokio::test]
async fn test_offset_limits_from_config() {
    let limited = AlignmentParams {
        offset_limit: Point3::new(1.0, 1.0, 0.0),
        offset_trim: Point3::new(0.25, 0.0, 0.0),
        ..params()
    };
    let coordinator = Coordinator::new(
        VisionRegistry::new().with_fallback(Arc::new(SimulatedCamera::new(vec![Point3::xy(3.0, 4.0)]))),
        Arc::new(MemoryConfig::with_params(limited)),
    );
    let pixel = [Point3::xy(0.0, 0.0), Point3::xy(1.0, 0.0), Point3::xy(0.0, 1.0)];
    coordinator
        .build_pixel_to_real(&name("C1"), &name("CCD1"), &pixel, &pixel)
        .unwrap();
    coordinator
        .handle(
            &CommandPacket::new("C1", "CCD1", AlignCommand::Register).with_robot(Point3::xy(3.5, 40.0)),
            &CancelToken::new(),
        )
        .await;

    let offset = coordinator.compute_offset(&name("C1"), &name("CCD1")).unwrap();
    assert_relative_eq!(offset.x, 0.75, epsilon = 1e-9);
    assert_relative_eq!(offset.y, 1.0);
}

#[tokio::test]
async fn test_zero_offset_limit_leaves_axis_unclamped() {
    let unlimited = AlignmentParams {
        offset_limit: Point3::ZERO,
        ..params()
    };
    let coordinator = Coordinator::new(
        VisionRegistry::new().with_fallback(Arc::new(SimulatedCamera::new(vec![Point3::xy(3.0, 4.0)]))),
        Arc::new(MemoryConfig::with_params(unlimited)),
    );
    let pixel = [Point3::xy(0.0, 0.0), Point3::xy(1.0, 0.0), Point3::xy(0.0, 1.0)];
    coordinator
        .build_pixel_to_real(&name("C1"), &name("CCD1"), &pixel, &pixel)
        .unwrap();
    coordinator
        .handle(
            &CommandPacket::new("C1", "CCD1", AlignCommand::Register)
                .with_robot(Point3::new(-97.0, 504.0, 1.5)),
            &CancelToken::new(),
        )
        .await;

    let offset = coordinator.compute_offset(&name("C1"), &name("CCD1")).unwrap();
    assert_relative_eq!(offset.x, -100.0, epsilon = 1e-9);
    assert_relative_eq!(offset.y, 500.0, epsilon = 1e-9);
    assert_relative_eq!(offset.u, 1.5, epsilon = 1e-9);
}
