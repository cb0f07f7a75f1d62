use alignkit::{
    init_logging, AlignCommand, AlignmentParams, CaptureProvider, CommandPacket, CommandStatus,
    ConfigFormat, ConfigProvider, Coordinator, DeviceName, FileConfig, MemoryConfig, Point3,
    Router, SimulatedCamera, VisionRegistry, BUILD_DATE, VERSION,
};
use std::sync::Arc;

const CONNECTION: &str = "PLC1";
const CAMERA: &str = "CCD1";

/// Config directory from the first argument, or built-in demo parameters
fn config() -> Arc<dyn ConfigProvider> {
    match std::env::args().nth(1) {
        Some(dir) => {
            tracing::info!("Using alignment config in {}", dir);
            Arc::new(FileConfig::new(dir, ConfigFormat::Json))
        }
        None => Arc::new(MemoryConfig::with_params(AlignmentParams {
            calib_move: Point3::new(110.0, 110.0, 5.0),
            ..Default::default()
        })),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging()?;
    tracing::info!("AlignKit {} (built {})", VERSION, BUILD_DATE);

    let camera: Arc<dyn CaptureProvider> = Arc::new(SimulatedCamera::canned());
    let coordinator = Coordinator::new(VisionRegistry::new().with_camera(CAMERA, camera), config());
    let router = Router::new(Arc::new(coordinator));

    // Simulated motion: apply each reported relative move to the pose
    let mut robot = Point3::ZERO;
    loop {
        let packet = CommandPacket::new(CONNECTION, CAMERA, AlignCommand::Calibrate).with_robot(robot);
        let result = router.execute(packet).await;
        match result.status {
            CommandStatus::InProgress => {
                tracing::info!(
                    "Step {}/{}: pixel {} -> move {}",
                    result.completed,
                    result.required,
                    result.pixel,
                    result.next_relative_move
                );
                robot = robot.add(&result.next_relative_move);
            }
            CommandStatus::Completed => {
                tracing::info!("Calibration completed, rmse {:.6}", result.rmse);
                break;
            }
            _ => {
                router.shutdown().await;
                anyhow::bail!("calibration failed: {}", result.message);
            }
        }
    }

    if let Some(calib) = router.coordinator().calibration(&DeviceName::new(CONNECTION)) {
        for (cam, t) in &calib.pixel_to_real {
            let info = t.decompose();
            tracing::info!(
                "{}: theta {:.4} deg, scale {:.6} x {:.6}, shear {:.6}",
                cam,
                info.theta_deg,
                info.sx,
                info.sy,
                info.shear
            );
        }
        for (cam, center) in &calib.rotation_centers {
            tracing::info!("{}: rotation center {}", cam, center);
        }
    }

    router.shutdown().await;
    Ok(())
}
