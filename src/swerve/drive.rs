// Chassis coordinator: the only thing commands drive directly

use tracing::{debug, info};

use super::{
    ChassisSpeeds, DriveGains, GainMode, GainRole, GainSet, ModuleHardware, ModulePosition,
    ModuleState, NUM_MODULES, SwerveError, SwerveKinematics, SwerveModule, SwerveOdometry,
    desaturate,
};
use crate::config::RobotConfig;
use crate::geometry::{Pose2d, Rotation2d};
use crate::motor::Gyro;
use crate::telemetry::{Alert, Telemetry};

pub struct Swerve {
    modules: [SwerveModule; NUM_MODULES],
    kinematics: SwerveKinematics,
    odometry: SwerveOdometry,
    gyro: Box<dyn Gyro + Send>,
    gains: DriveGains,
    gain_mode: GainMode,
    max_module_speed_mps: f64,
    max_angular_speed_rads: f64,
    /// Last chassis request, after field-relative conversion
    commanded: ChassisSpeeds,
}

impl Swerve {
    /// Build the drive on the given devices. Modules start on the auto profile.
    pub fn new(
        config: &RobotConfig,
        hardware: [ModuleHardware; NUM_MODULES],
        mut gyro: Box<dyn Gyro + Send>,
    ) -> Result<Self, SwerveError> {
        let kinematics = SwerveKinematics::new(config.modules.each_ref().map(|m| m.location()))?;

        let gains = config.gains;
        let gain_mode = GainMode::Auto;
        let profile = *gains.profile(gain_mode);

        let mut index = 0;
        let mut modules = hardware.map(|hw| {
            let module = SwerveModule::new(
                &config.modules[index],
                &config.mechanism,
                hw,
                profile.drive,
                profile.steer,
            );
            index += 1;
            module
        });

        let positions = modules.each_mut().map(|m| m.position());
        let odometry = SwerveOdometry::new(gyro.heading(), positions, Pose2d::default());

        info!(
            "Swerve drive ready: {}",
            modules.iter().map(|m| m.name()).collect::<Vec<_>>().join(", ")
        );

        Ok(Self {
            modules,
            kinematics,
            odometry,
            gyro,
            gains,
            gain_mode,
            max_module_speed_mps: config.mechanism.max_module_speed_mps,
            max_angular_speed_rads: config.mechanism.max_angular_speed_rads,
            commanded: ChassisSpeeds::default(),
        })
    }

    pub fn max_module_speed(&self) -> f64 {
        self.max_module_speed_mps
    }

    pub fn max_angular_speed(&self) -> f64 {
        self.max_angular_speed_rads
    }

    /// Drive with forward/strafe in m/s and rotation in rad/s.
    ///
    /// Field-oriented requests are rotated by the negated gyro heading first.
    pub fn set_drive_speeds(
        &mut self,
        forward: f64,
        strafe: f64,
        rotate: f64,
        field_oriented: bool,
    ) {
        let speeds = if field_oriented {
            ChassisSpeeds::from_field_relative(forward, strafe, rotate, self.gyro.heading())
        } else {
            ChassisSpeeds::new(forward, strafe, rotate)
        };
        self.set_chassis_speeds(speeds);
    }

    /// Robot-relative request, e.g. from a path follower
    pub fn set_chassis_speeds(&mut self, speeds: ChassisSpeeds) {
        let mut states = self.kinematics.to_module_states(speeds);
        desaturate(&mut states, self.max_module_speed_mps);
        for (module, state) in self.modules.iter_mut().zip(states) {
            module.set_state(state);
        }
        self.commanded = speeds;
    }

    pub fn stop(&mut self) {
        for module in &mut self.modules {
            module.stop();
        }
        self.commanded = ChassisSpeeds::default();
    }

    /// Once per cycle regardless of which command (if any) is driving
    pub fn periodic(&mut self, telemetry: &mut dyn Telemetry) {
        let positions = self.module_positions();
        let heading = self.gyro.heading();
        let pose = self.odometry.update(&self.kinematics, heading, positions);

        for module in &mut self.modules {
            module.refresh_alerts();
            module.log(telemetry);
        }

        telemetry.number("Swerve/Pose X", pose.x());
        telemetry.number("Swerve/Pose Y", pose.y());
        telemetry.number("Swerve/Pose Heading", pose.rotation.degrees());
        telemetry.number("Swerve/Gyro Heading", heading.degrees());
        telemetry.number("Swerve/Commanded vx", self.commanded.vx);
        telemetry.number("Swerve/Commanded vy", self.commanded.vy);
        telemetry.number("Swerve/Commanded omega", self.commanded.omega);
        telemetry.text(
            "Swerve/Gain Mode",
            match self.gain_mode {
                GainMode::Auto => "Auto",
                GainMode::Teleop => "Teleop",
            },
        );
        let profile = self.gains.profile(self.gain_mode);
        for role in GainRole::ALL {
            let set = profile.get(role);
            for (term, value) in [("P", set.p), ("I", set.i), ("D", set.d), ("V", set.v)] {
                telemetry.number(&format!("Swerve/{} {}", role.label(), term), value);
            }
        }
    }

    pub fn set_tele_pid(&mut self) {
        self.apply_profile(GainMode::Teleop);
    }

    pub fn set_auto_pid(&mut self) {
        self.apply_profile(GainMode::Auto);
    }

    fn apply_profile(&mut self, mode: GainMode) {
        self.gain_mode = mode;
        let profile = *self.gains.profile(mode);
        for module in &mut self.modules {
            for role in GainRole::ALL {
                module.set_gains(role, profile.get(role));
            }
        }
        info!("Swerve gains switched to {:?}", mode);
    }

    pub fn gain_mode(&self) -> GainMode {
        self.gain_mode
    }

    pub fn gains(&self) -> &DriveGains {
        &self.gains
    }

    /// Replace one teleop gain set.
    ///
    /// Modules only see it now if the teleop profile is active; otherwise it
    /// takes effect on the next `set_tele_pid`. Returns whether it was pushed.
    pub fn update_teleop_gains(&mut self, role: GainRole, gains: GainSet) -> bool {
        self.gains.teleop.set(role, gains);
        if self.gain_mode != GainMode::Teleop {
            debug!("Teleop {} gains stored, push deferred", role.label());
            return false;
        }
        for module in &mut self.modules {
            module.set_gains(role, gains);
        }
        true
    }

    pub fn heading(&mut self) -> Rotation2d {
        self.gyro.heading()
    }

    pub fn pose(&self) -> Pose2d {
        self.odometry.pose()
    }

    pub fn module_states(&mut self) -> [ModuleState; NUM_MODULES] {
        self.modules.each_mut().map(|m| m.state())
    }

    pub fn module_positions(&mut self) -> [ModulePosition; NUM_MODULES] {
        self.modules.each_mut().map(|m| m.position())
    }

    pub fn modules(&self) -> &[SwerveModule; NUM_MODULES] {
        &self.modules
    }

    /// Re-seed odometry, e.g. from a vision fix
    pub fn reset_pose(&mut self, pose: Pose2d) {
        let positions = self.module_positions();
        let heading = self.gyro.heading();
        self.odometry.reset_position(heading, positions, pose);
        info!(
            "Pose reset to ({:.3}, {:.3}, {:.1} deg)",
            pose.x(),
            pose.y(),
            pose.rotation.degrees()
        );
    }

    /// Make the current heading field-forward. Position on the field is kept.
    pub fn reset_gyro(&mut self) {
        self.gyro.reset();
        let pose = Pose2d {
            translation: self.odometry.pose().translation,
            rotation: Rotation2d::ZERO,
        };
        let positions = self.module_positions();
        self.odometry.reset_position(self.gyro.heading(), positions, pose);
        info!("Gyro reset");
    }

    /// Zero every drive distance. The pose estimate is kept.
    pub fn reset_encoders(&mut self) {
        for module in &mut self.modules {
            module.reset_position();
        }
        let pose = self.odometry.pose();
        let positions = self.module_positions();
        let heading = self.gyro.heading();
        self.odometry.reset_position(heading, positions, pose);
        info!("Drive encoders reset");
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.modules
            .iter()
            .flat_map(|m| m.alerts())
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motor::sim::{SimDevices, SimPlant};
    use crate::telemetry::TelemetryFrame;

    fn sim_drive() -> (Swerve, SimPlant) {
        let config = RobotConfig::default();
        let SimDevices { plant, hardware, gyro } = SimPlant::build(&config).unwrap();
        let swerve = Swerve::new(&config, hardware, Box::new(gyro)).unwrap();
        (swerve, plant)
    }

    #[test]
    fn test_forward_command_points_all_modules_ahead() {
        let (mut swerve, _plant) = sim_drive();
        swerve.set_drive_speeds(1.0, 0.0, 0.0, false);

        for state in swerve.module_states() {
            assert!((state.speed_mps - 1.0).abs() < 1e-9);
            assert!(state.angle.degrees().abs() < 1e-9);
        }
    }

    #[test]
    fn test_rotation_command_speeds() {
        let (mut swerve, _plant) = sim_drive();
        swerve.set_drive_speeds(0.0, 0.0, 1.0, false);

        let expected = 0.3556 * 2f64.sqrt();
        let states = swerve.module_states();
        for (module, state) in swerve.modules().iter().zip(states) {
            assert!((state.speed_mps.abs() - expected).abs() < 1e-6);
            // Wheel direction is perpendicular to the radius vector
            let radius = module.location();
            let dot = radius.x * state.angle.cos() + radius.y * state.angle.sin();
            assert!(dot.abs() < 1e-9);
        }
    }

    #[test]
    fn test_field_oriented_uses_gyro_heading() {
        let (mut swerve, mut plant) = sim_drive();
        plant.set_yaw(std::f64::consts::FRAC_PI_2);

        swerve.set_drive_speeds(1.0, 0.0, 0.0, true);
        // Facing field-left, field-forward is robot-right
        for state in swerve.module_states() {
            let vx = state.speed_mps * state.angle.cos();
            let vy = state.speed_mps * state.angle.sin();
            assert!(vx.abs() < 1e-9);
            assert!((vy + 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_requests_are_desaturated() {
        let (mut swerve, _plant) = sim_drive();
        let max = swerve.max_module_speed();
        swerve.set_drive_speeds(max, max, swerve.max_angular_speed(), false);
        for state in swerve.module_states() {
            assert!(state.speed_mps.abs() <= max + 1e-9);
        }
    }

    #[test]
    fn test_periodic_integrates_pose() {
        let (mut swerve, mut plant) = sim_drive();
        let mut frame = TelemetryFrame::new(0);

        swerve.set_drive_speeds(1.0, 0.0, 0.0, false);
        for _ in 0..50 {
            plant.step(0.02);
            swerve.periodic(&mut frame);
        }

        let pose = swerve.pose();
        assert!((pose.x() - 1.0).abs() < 1e-6);
        assert!(pose.y().abs() < 1e-6);
        assert_eq!(frame.get_number("Swerve/Pose X"), Some(pose.x()));
        assert!(frame.get_number("Swerve/FrontLeft/drive set speed").is_some());
    }

    #[test]
    fn test_stop_zeroes_module_speeds() {
        let (mut swerve, _plant) = sim_drive();
        swerve.set_drive_speeds(1.0, 0.5, 0.2, false);
        swerve.stop();
        assert!(swerve.module_states().iter().all(|s| s.speed_mps == 0.0));
    }

    #[test]
    fn test_gain_profiles_switch() {
        let (mut swerve, plant) = sim_drive();
        let defaults = DriveGains::default();
        assert_eq!(plant.drive(0).config().gains, defaults.auto.drive);

        swerve.set_tele_pid();
        assert_eq!(swerve.gain_mode(), GainMode::Teleop);
        for i in 0..NUM_MODULES {
            assert_eq!(plant.drive(i).config().gains, defaults.teleop.drive);
            assert_eq!(plant.steer(i).config().gains, defaults.teleop.steer);
        }

        swerve.set_auto_pid();
        assert_eq!(plant.steer(3).config().gains, defaults.auto.steer);
    }

    #[test]
    fn test_teleop_update_deferred_in_auto() {
        let (mut swerve, plant) = sim_drive();
        let tuned = GainSet::new(0.5, 0.0, 0.01, 0.1);

        assert!(!swerve.update_teleop_gains(GainRole::Drive, tuned));
        assert_eq!(plant.drive(0).config().gains, DriveGains::default().auto.drive);

        swerve.set_tele_pid();
        assert_eq!(plant.drive(0).config().gains, tuned);

        let retuned = GainSet::new(0.6, 0.0, 0.0, 0.1);
        assert!(swerve.update_teleop_gains(GainRole::Drive, retuned));
        assert_eq!(plant.drive(2).config().gains, retuned);
        // Auto profile never changes
        assert_eq!(swerve.gains().auto, DriveGains::default().auto);
    }

    #[test]
    fn test_reset_encoders_keeps_pose() {
        let (mut swerve, mut plant) = sim_drive();
        let mut frame = TelemetryFrame::new(0);
        swerve.set_drive_speeds(1.0, 0.0, 0.0, false);
        for _ in 0..10 {
            plant.step(0.02);
            swerve.periodic(&mut frame);
        }
        let before = swerve.pose();

        swerve.reset_encoders();
        assert!(swerve.module_positions().iter().all(|p| p.distance_m == 0.0));
        swerve.periodic(&mut frame);
        assert!((swerve.pose().x() - before.x()).abs() < 1e-9);
    }

    #[test]
    fn test_reset_gyro_zeroes_heading() {
        let (mut swerve, mut plant) = sim_drive();
        let mut frame = TelemetryFrame::new(0);
        plant.set_yaw(0.7);
        swerve.periodic(&mut frame);
        assert!((swerve.pose().rotation.radians() - 0.7).abs() < 1e-9);

        swerve.reset_gyro();
        swerve.periodic(&mut frame);
        assert!(swerve.heading().radians().abs() < 1e-9);
        assert!(swerve.pose().rotation.radians().abs() < 1e-9);
    }

    #[test]
    fn test_reset_pose_reseeds_odometry() {
        let (mut swerve, _plant) = sim_drive();
        swerve.reset_pose(Pose2d::new(3.0, -2.0, Rotation2d::from_degrees(90.0)));
        let mut frame = TelemetryFrame::new(0);
        swerve.periodic(&mut frame);
        let pose = swerve.pose();
        assert!((pose.x() - 3.0).abs() < 1e-9);
        assert!((pose.rotation.degrees() - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_disconnected_module_keeps_others_driving() {
        let (mut swerve, plant) = sim_drive();
        plant.drive(1).set_connected(false);
        let mut frame = TelemetryFrame::new(0);
        swerve.periodic(&mut frame);

        swerve.set_drive_speeds(1.0, 0.0, 0.0, false);
        assert!((plant.drive(0).velocity()).abs() > 0.0);
        let active: Vec<String> = swerve
            .alerts()
            .into_iter()
            .filter(|a| a.active)
            .map(|a| a.text)
            .collect();
        assert_eq!(active, vec!["Disconnected drive motor 3".to_string()]);
    }
}
