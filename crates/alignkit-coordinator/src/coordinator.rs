//! Alignment coordinator
//!
//! Turns a stream of commands into calibration data. Each (connection, camera)
//! has at most one calibration plan and each (connection, job) at most one
//! registration or alignment aggregation. Commands for one camera are expected
//! to arrive one at a time through that camera's agent.
//!
//! Locks are taken around plan and store updates only. Captures run with no
//! lock held, and committed calibration changes only at the final step of a
//! plan, so a cancelled or failed capture leaves it untouched.

use alignkit_core::geometry::AffineTransform;
use alignkit_core::types::{thread_safe_map, thread_safe_rw_map, ThreadSafeMap, ThreadSafeRwMap};
use alignkit_core::{
    AlignEvent, AlignmentError, AlignmentEvent, CalibrationEvent, DeviceName, Error, EventBus,
    GeometryError, Point3, RegistrationEvent, Result,
};
use alignkit_settings::{
    calibration_positions, calibration_steps, AlignmentConstants, AlignmentParams, ConfigProvider,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::cancel::CancelToken;
use crate::command::{AlignCommand, CommandPacket, CommandResult, ResetScope};
use crate::state::{
    AggregationPlan, CalibrationPlan, CalibrationStore, PerConnectionCalibration, AFFINE_POINTS,
    ROTATION_POINTS,
};
use crate::vision::VisionRegistry;

type CameraKey = (DeviceName, DeviceName);
type JobKey = (DeviceName, String);

/// Affine-only calibration built from caller-supplied pairs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationResult {
    pub camera: DeviceName,
    pub pixel_to_real: AffineTransform,
    pub real_to_pixel: AffineTransform,
    pub rot_deg: f64,
    pub sx: f64,
    pub sy: f64,
    pub shear: f64,
    pub rmse: f64,
    pub pair_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Register,
    Align,
}

enum Aggregation {
    Pending {
        completed: usize,
        required: usize,
        pixel: Point3,
    },
    Complete(AggregationPlan),
}

/// Per-device calibration, registration and alignment state machine
pub struct Coordinator {
    vision: VisionRegistry,
    config: Arc<dyn ConfigProvider>,
    store: CalibrationStore,
    calib_plans: ThreadSafeMap<CameraKey, CalibrationPlan>,
    registrations: ThreadSafeMap<JobKey, AggregationPlan>,
    alignments: ThreadSafeMap<JobKey, AggregationPlan>,
    last_robot: ThreadSafeRwMap<DeviceName, Point3>,
    events: Arc<EventBus>,
}

impl Coordinator {
    /// Create a coordinator with an empty store and its own event bus
    pub fn new(vision: VisionRegistry, config: Arc<dyn ConfigProvider>) -> Self {
        Self {
            vision,
            config,
            store: CalibrationStore::new(),
            calib_plans: thread_safe_map(),
            registrations: thread_safe_map(),
            alignments: thread_safe_map(),
            last_robot: thread_safe_rw_map(),
            events: EventBus::shared(),
        }
    }

    /// Publish progress on `events` instead of a private bus
    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    /// Share an existing calibration store
    pub fn with_store(mut self, store: CalibrationStore) -> Self {
        self.store = store;
        self
    }

    /// Run one command
    ///
    /// Never fails: errors come back as a [`CommandResult`] with
    /// `success == false` and the error text as the message.
    pub async fn handle(&self, packet: &CommandPacket, cancel: &CancelToken) -> CommandResult {
        self.last_robot
            .write()
            .insert(packet.connection.clone(), packet.robot);

        tracing::debug!(
            "Handling {} for {} (job {})",
            packet.command,
            packet.key_label(),
            packet.job_id
        );

        let outcome = if cancel.is_cancelled() {
            Err(AlignmentError::Cancelled.into())
        } else {
            match packet.command {
                AlignCommand::Calibrate => self.calibrate(packet, cancel).await,
                AlignCommand::Register => self.register(packet, cancel).await,
                AlignCommand::Align => self.align(packet, cancel).await,
                AlignCommand::Reset(scope) => {
                    let camera = (!packet.camera.is_empty()).then_some(&packet.camera);
                    Ok(self.reset(&packet.connection, camera, scope, &packet.job_id))
                }
            }
        };

        match outcome {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!("{} failed for {}: {}", packet.command, packet.key_label(), e);
                if packet.command == AlignCommand::Calibrate {
                    self.events.publish(AlignmentEvent::Calibration(CalibrationEvent::Failed {
                        connection: packet.connection.to_string(),
                        camera: packet.camera.to_string(),
                        reason: e.to_string(),
                    }));
                }
                CommandResult::failed(&packet.job_id, e.to_string())
            }
        }
    }

    async fn capture(
        &self,
        camera: &DeviceName,
        cancel: &CancelToken,
    ) -> std::result::Result<Point3, AlignmentError> {
        let provider = self.vision.get(camera)?;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AlignmentError::Cancelled),
            pixel = provider.capture(camera.as_str(), cancel) => pixel,
        }
    }

    async fn calibrate(&self, packet: &CommandPacket, cancel: &CancelToken) -> Result<CommandResult> {
        let conn = &packet.connection;
        let cam = &packet.camera;
        self.vision.get(cam)?;

        let key: CameraKey = (conn.clone(), cam.clone());
        let needs_plan = self
            .calib_plans
            .lock()
            .get(&key)
            .map_or(true, |plan| plan.done);
        let seed = if needs_plan {
            let params = self.load_params()?;
            let constants = self.load_constants()?;
            Some((
                calibration_positions(&params, &constants),
                calibration_steps(&params, &constants),
            ))
        } else {
            None
        };

        let index = {
            let mut plans = self.calib_plans.lock();
            if plans.get(&key).is_some_and(|plan| plan.done) {
                plans.remove(&key);
            }
            if !plans.contains_key(&key) {
                let (pos_list, steps) = seed.ok_or_else(|| AlignmentError::PlanDiscarded {
                    key: packet.key_label(),
                })?;
                let base_robot = packet.robot;
                tracing::info!(
                    "Calibration started for {}: {} positions, base {}",
                    packet.key_label(),
                    pos_list.len(),
                    base_robot
                );
                plans.insert(
                    key.clone(),
                    CalibrationPlan::new(&packet.job_id, base_robot, pos_list, steps),
                );
            }

            let plan = plans.get(&key).ok_or_else(|| AlignmentError::PlanDiscarded {
                key: packet.key_label(),
            })?;
            let index = plan.completed();
            if plan.next_position().is_none() {
                return Err(AlignmentError::PatternExhausted {
                    index,
                    available: plan.pos_list.len(),
                }
                .into());
            }
            index
        };

        let pixel = self.capture(cam, cancel).await?;

        let (completed, required, next_move, ready) = {
            let mut plans = self.calib_plans.lock();
            let plan = plans
                .get_mut(&key)
                .filter(|plan| !plan.done && plan.completed() == index)
                .ok_or_else(|| AlignmentError::PlanDiscarded {
                    key: packet.key_label(),
                })?;
            let real = plan.next_position().ok_or(AlignmentError::PatternExhausted {
                index,
                available: plan.pos_list.len(),
            })?;
            plan.pairs.push((pixel, real));

            let completed = plan.completed();
            let ready = plan.is_ready().then(|| plan.pairs.clone());
            (completed, plan.required_count, plan.step_after(completed), ready)
        };

        tracing::debug!(
            "Calibration pair {}/{} for {}: pixel {}",
            completed,
            required,
            packet.key_label(),
            pixel
        );
        self.events.publish(AlignmentEvent::Calibration(CalibrationEvent::PairRecorded {
            connection: conn.to_string(),
            camera: cam.to_string(),
            completed,
            required,
            pixel,
        }));

        let Some(pairs) = ready else {
            let mut result = CommandResult::in_progress(&packet.job_id, "Calibrating", completed, required);
            result.pixel = pixel;
            result.next_relative_move = next_move;
            return Ok(result);
        };

        let params = self.load_params()?;
        let affine_count = pairs.len().min(AFFINE_POINTS);
        let rotation_count = (pairs.len() - affine_count).min(ROTATION_POINTS);
        let outcome = match self.store.calibrate_from_pairs(
            conn,
            cam,
            &pairs,
            affine_count,
            rotation_count,
            &params,
        ) {
            Ok(outcome) => outcome,
            Err(e) => {
                self.calib_plans.lock().remove(&key);
                return Err(e);
            }
        };

        if let Some(plan) = self.calib_plans.lock().get_mut(&key) {
            plan.done = true;
        }

        let rotation_center = outcome.rotation_center();
        tracing::info!(
            "Calibration completed for {}: rmse {:.6}, rotation center {} (rmse {:.6}), theta {:.4} deg, scale {:.6}/{:.6}, shear {:.6}",
            packet.key_label(),
            outcome.affine_rmse,
            rotation_center,
            outcome.rotation_rmse(),
            outcome.info.theta_deg,
            outcome.info.sx,
            outcome.info.sy,
            outcome.info.shear
        );
        self.events.publish(AlignmentEvent::Calibration(CalibrationEvent::Completed {
            connection: conn.to_string(),
            camera: cam.to_string(),
            rmse: outcome.affine_rmse,
            rotation_center,
            theta_deg: outcome.info.theta_deg,
        }));

        let mut result = CommandResult::completed(&packet.job_id, "Calibration completed");
        result.completed = completed;
        result.required = required;
        result.pixel = pixel;
        result.rmse = outcome.affine_rmse;
        result.next_relative_move = next_move;
        Ok(result)
    }

    /// Capture every camera this packet is responsible for into the job's plan
    ///
    /// Recording a pixel, checking completion and removing a finished plan
    /// happen under one lock, so exactly one reporter sees `Complete`.
    async fn aggregate(
        &self,
        stage: Stage,
        packet: &CommandPacket,
        expected: Vec<DeviceName>,
        cancel: &CancelToken,
    ) -> Result<Aggregation> {
        let plans = match stage {
            Stage::Register => &self.registrations,
            Stage::Align => &self.alignments,
        };
        let conn = &packet.connection;
        let key: JobKey = (conn.clone(), packet.job_id.clone());
        let discarded = || AlignmentError::PlanDiscarded {
            key: format!("{}/{}", conn, packet.job_id),
        };
        let to_capture = packet.cameras_to_capture()?;
        let snapshot = self.last_robot(conn).unwrap_or_default();

        plans.lock().entry(key.clone()).or_insert_with(|| {
            tracing::debug!("{:?} job {} opened on {} for {:?}", stage, packet.job_id, conn, expected);
            AggregationPlan::new(&packet.job_id, expected, snapshot, Utc::now())
        });

        let mut outcome: Option<Aggregation> = None;
        for cam in to_capture {
            {
                let guard = plans.lock();
                match guard.get(&key) {
                    Some(plan) if plan.has(&cam) => continue,
                    Some(_) => {}
                    // Finished by another reporter after our own contribution
                    None if outcome.is_some() => break,
                    None => return Err(discarded().into()),
                }
            }

            let pixel = self.capture(&cam, cancel).await?;

            let (completed, required, step) = {
                let mut guard = plans.lock();
                let Some(plan) = guard.get_mut(&key) else {
                    if outcome.is_some() {
                        break;
                    }
                    return Err(discarded().into());
                };
                plan.record(cam.clone(), pixel);
                let (completed, required) = plan.progress();
                let step = if plan.is_complete() {
                    guard.remove(&key).map(Aggregation::Complete).ok_or_else(discarded)?
                } else {
                    Aggregation::Pending {
                        completed,
                        required,
                        pixel,
                    }
                };
                (completed, required, step)
            };

            tracing::debug!(
                "{:?} job {}: {} reported {} ({}/{})",
                stage,
                packet.job_id,
                cam,
                pixel,
                completed,
                required
            );
            let (connection, job, camera) = (conn.to_string(), packet.job_id.clone(), cam.to_string());
            self.events.publish(match stage {
                Stage::Register => AlignmentEvent::Registration(RegistrationEvent::PixelCaptured {
                    connection,
                    job,
                    camera,
                    completed,
                    required,
                }),
                Stage::Align => AlignmentEvent::Alignment(AlignEvent::PixelCaptured {
                    connection,
                    job,
                    camera,
                    completed,
                    required,
                }),
            });

            let done = matches!(step, Aggregation::Complete(_));
            outcome = Some(step);
            if done {
                break;
            }
        }

        if let Some(outcome) = outcome {
            return Ok(outcome);
        }

        // Nothing captured: every camera of this packet had already reported
        let guard = plans.lock();
        let plan = guard.get(&key).ok_or_else(discarded)?;
        let (completed, required) = plan.progress();
        Ok(Aggregation::Pending {
            completed,
            required,
            pixel: Point3::ZERO,
        })
    }

    async fn register(&self, packet: &CommandPacket, cancel: &CancelToken) -> Result<CommandResult> {
        let expected = packet.expected_cameras();
        if expected.is_empty() {
            return Err(AlignmentError::NoCameras.into());
        }

        let plan = match self.aggregate(Stage::Register, packet, expected, cancel).await? {
            Aggregation::Pending {
                completed,
                required,
                pixel,
            } => {
                let mut result =
                    CommandResult::in_progress(&packet.job_id, "Register pending", completed, required);
                result.pixel = pixel;
                return Ok(result);
            }
            Aggregation::Complete(plan) => plan,
        };

        let pixels = plan.ordered_pixels().ok_or_else(|| AlignmentError::PlanDiscarded {
            key: format!("{}/{}", packet.connection, packet.job_id),
        })?;
        self.store
            .register_goldens(&packet.connection, &pixels, plan.real_snapshot);

        tracing::info!(
            "Registered {} camera(s) on {} (job {}) at {}",
            pixels.len(),
            packet.connection,
            packet.job_id,
            plan.real_snapshot
        );
        self.events.publish(AlignmentEvent::Registration(RegistrationEvent::Completed {
            connection: packet.connection.to_string(),
            job: packet.job_id.clone(),
            real_golden: plan.real_snapshot,
        }));

        let mut result = CommandResult::completed(&packet.job_id, "Register completed");
        result.completed = pixels.len();
        result.required = plan.expected.len();
        result.real = plan.real_snapshot;
        if let Some((_, px)) = pixels.first() {
            result.pixel = *px;
        }
        Ok(result)
    }

    async fn align(&self, packet: &CommandPacket, cancel: &CancelToken) -> Result<CommandResult> {
        let expected = packet.expected_cameras();
        if expected.is_empty() {
            return Err(AlignmentError::NoCameras.into());
        }
        self.store.transforms_for(&packet.connection, &expected)?;

        let plan = match self.aggregate(Stage::Align, packet, expected, cancel).await? {
            Aggregation::Pending {
                completed,
                required,
                pixel,
            } => {
                let mut result =
                    CommandResult::in_progress(&packet.job_id, "Align pending", completed, required);
                result.pixel = pixel;
                return Ok(result);
            }
            Aggregation::Complete(plan) => plan,
        };

        let pixels = plan.ordered_pixels().ok_or_else(|| AlignmentError::PlanDiscarded {
            key: format!("{}/{}", packet.connection, packet.job_id),
        })?;
        let (transforms, real_golden) = self.store.transforms_for(&packet.connection, &plan.expected)?;

        // The first requested camera stands in for the whole set
        let reals: Vec<Point3> = pixels
            .iter()
            .zip(&transforms)
            .map(|((_, px), t)| t.apply(px))
            .collect();
        let (fused, pixel) = match (reals.first(), pixels.first()) {
            (Some(real), Some((_, px))) => (*real, *px),
            _ => return Err(AlignmentError::NoCameras.into()),
        };
        let offset = fused.subtract(&real_golden);

        tracing::info!(
            "Aligned {} (job {}): real {} offset {}",
            packet.connection,
            packet.job_id,
            fused,
            offset
        );
        self.events.publish(AlignmentEvent::Alignment(AlignEvent::Aligned {
            connection: packet.connection.to_string(),
            job: packet.job_id.clone(),
            real: fused,
            offset,
        }));

        let mut result = CommandResult::ok(&packet.job_id, "OK");
        result.completed = pixels.len();
        result.required = plan.expected.len();
        result.pixel = pixel;
        result.real = fused;
        result.offset = offset;
        Ok(result)
    }

    /// Discard in-progress work and, for [`ResetScope::AllCalibration`], the connection's calibration
    ///
    /// With a camera only that camera's calibration plan is dropped; without
    /// one every plan of the connection goes.
    pub fn reset(
        &self,
        connection: &DeviceName,
        camera: Option<&DeviceName>,
        scope: ResetScope,
        job_id: &str,
    ) -> CommandResult {
        match camera {
            Some(cam) => {
                self.calib_plans.lock().remove(&(connection.clone(), cam.clone()));
            }
            None => {
                self.calib_plans.lock().retain(|(conn, _), _| conn != connection);
                self.registrations.lock().retain(|(conn, _), _| conn != connection);
                self.alignments.lock().retain(|(conn, _), _| conn != connection);
            }
        }

        let all_calibration = scope == ResetScope::AllCalibration;
        if all_calibration {
            self.store.clear_calibration(connection);
        }

        tracing::info!(
            "Reset {}{} ({:?})",
            connection,
            camera.map(|c| format!("/{}", c)).unwrap_or_default(),
            scope
        );
        self.events.publish(AlignmentEvent::Calibration(CalibrationEvent::Reset {
            connection: connection.to_string(),
            camera: camera.map(|c| c.to_string()),
            all_calibration,
        }));

        CommandResult::ok(job_id, "Reset")
    }

    /// Drop Register/Align aggregations whose deadline passed before `now`
    ///
    /// Returns the number of plans removed.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        let mut removed = 0;
        for plans in [&self.registrations, &self.alignments] {
            let mut guard = plans.lock();
            let before = guard.len();
            guard.retain(|_, plan| !plan.is_expired(now));
            removed += before - guard.len();
        }
        if removed > 0 {
            tracing::debug!("Swept {} expired aggregation plan(s)", removed);
        }
        removed
    }

    /// Fit and commit an affine-only calibration from caller-supplied pairs
    pub fn build_pixel_to_real(
        &self,
        connection: &DeviceName,
        camera: &DeviceName,
        pixel: &[Point3],
        real: &[Point3],
    ) -> Result<CalibrationResult> {
        if pixel.len() != real.len() || pixel.len() < 3 {
            return Err(GeometryError::invalid_input("Need ≥3 pairs").into());
        }

        let pairs: Vec<(Point3, Point3)> = pixel.iter().copied().zip(real.iter().copied()).collect();
        // Rotation is not solved here, so the axis convention is irrelevant
        let outcome = self.store.calibrate_from_pairs(
            connection,
            camera,
            &pairs,
            pairs.len(),
            0,
            &AlignmentParams::default(),
        )?;

        tracing::info!(
            "Built pixel-to-real for {}/{} from {} pairs (rmse {:.6})",
            connection,
            camera,
            pairs.len(),
            outcome.affine_rmse
        );

        Ok(CalibrationResult {
            camera: camera.clone(),
            pixel_to_real: outcome.pixel_to_real,
            real_to_pixel: outcome.real_to_pixel,
            rot_deg: outcome.info.theta_deg,
            sx: outcome.info.sx,
            sy: outcome.info.sy,
            shear: outcome.info.shear,
            rmse: outcome.affine_rmse,
            pair_count: pairs.len(),
        })
    }

    /// Correction for `camera`'s golden reading using the current parameters
    pub fn compute_offset(&self, connection: &DeviceName, camera: &DeviceName) -> Result<Point3> {
        let params = self.load_params()?;
        Ok(self.store.compute_offset(connection, camera, &params)?)
    }

    /// Copy of the connection's committed calibration
    pub fn calibration(&self, connection: &DeviceName) -> Option<PerConnectionCalibration> {
        self.store.snapshot(connection)
    }

    pub fn store(&self) -> &CalibrationStore {
        &self.store
    }

    /// Robot pose from the latest packet on `connection`
    pub fn last_robot(&self, connection: &DeviceName) -> Option<Point3> {
        self.last_robot.read().get(connection).copied()
    }

    /// `(completed, required)` of the camera's active calibration plan
    pub fn calibration_progress(
        &self,
        connection: &DeviceName,
        camera: &DeviceName,
    ) -> Option<(usize, usize)> {
        self.calib_plans
            .lock()
            .get(&(connection.clone(), camera.clone()))
            .filter(|plan| !plan.done)
            .map(|plan| (plan.completed(), plan.required_count))
    }

    /// `(reported, expected)` of an open registration
    pub fn registration_progress(&self, connection: &DeviceName, job_id: &str) -> Option<(usize, usize)> {
        self.registrations
            .lock()
            .get(&(connection.clone(), job_id.to_string()))
            .map(AggregationPlan::progress)
    }

    /// `(reported, expected)` of an open alignment job
    pub fn alignment_progress(&self, connection: &DeviceName, job_id: &str) -> Option<(usize, usize)> {
        self.alignments
            .lock()
            .get(&(connection.clone(), job_id.to_string()))
            .map(AggregationPlan::progress)
    }

    pub fn events(&self) -> Arc<EventBus> {
        self.events.clone()
    }

    pub fn vision(&self) -> &VisionRegistry {
        &self.vision
    }

    fn load_params(&self) -> Result<AlignmentParams> {
        self.config
            .load_params()
            .map_err(|e| Error::other(format!("Failed to load alignment params: {}", e)))
    }

    fn load_constants(&self) -> Result<AlignmentConstants> {
        self.config
            .load_constants()
            .map_err(|e| Error::other(format!("Failed to load alignment constants: {}", e)))
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("vision", &self.vision)
            .field("calib_plans", &self.calib_plans.lock().len())
            .field("registrations", &self.registrations.lock().len())
            .field("alignments", &self.alignments.lock().len())
            .finish()
    }
}
