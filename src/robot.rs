// Root composition: owns the drive, its scheduler and the operator-facing state
//
// Everything here runs on the single loop thread, once per cycle.

use tracing::{info, warn};

use crate::commands::{
    AlignToTag, CommandContext, DriveScheduler, PadDrive, TagCache, VelocityDrive,
};
use crate::config::{CMD_TIMEOUT, LOOP_HZ, RobotConfig};
use crate::messages::{
    Action, BaseCommand, DriverInput, OperatingMode, RuntimeHealth, TagObservation, TuningValue,
};
use crate::swerve::Swerve;
use crate::telemetry::{Alert, AlertLevel, Telemetry, TelemetryFrame};
use crate::tuning::{MemoryTunables, TuningBridge};

/// Everything that arrived since the previous cycle
#[derive(Debug, Clone, Default)]
pub struct RobotInputs {
    pub mode: Option<OperatingMode>,
    pub pad: Option<DriverInput>,
    pub base: Option<BaseCommand>,
    pub actions: Vec<Action>,
    pub tuning: Vec<TuningValue>,
    pub tags: Vec<TagObservation>,
}

/// What one cycle produced for the outside world
#[derive(Debug, Clone)]
pub struct TickOutput {
    pub telemetry: TelemetryFrame,
    pub alerts: Vec<Alert>,
    pub health: RuntimeHealth,
}

#[derive(Debug, Clone, Copy)]
struct Stamped<T> {
    value: T,
    at: f64,
}

impl<T: Copy> Stamped<T> {
    fn fresh(stamped: &Option<Stamped<T>>, now: f64) -> Option<T> {
        stamped
            .as_ref()
            .filter(|s| now - s.at <= CMD_TIMEOUT.as_secs_f64())
            .map(|s| s.value)
    }
}

pub struct Robot {
    config: RobotConfig,
    swerve: Swerve,
    scheduler: DriveScheduler,
    tuning: TuningBridge,
    tunables: MemoryTunables,
    tags: TagCache,
    mode: OperatingMode,
    pad: Option<Stamped<DriverInput>>,
    base: Option<Stamped<BaseCommand>>,
    /// No driver or follower input while enabled
    stale_alert: Alert,
    time: f64,
    cycle: u64,
}

impl Robot {
    /// Starts Disabled, like a robot on the field before the match
    pub fn new(config: RobotConfig, swerve: Swerve) -> Self {
        let tuning = TuningBridge::new(config.tuning.prefix.clone());
        let mut tunables = MemoryTunables::new();
        tuning.seed(&mut tunables, &swerve.gains().teleop);

        Self {
            tags: TagCache::new(CMD_TIMEOUT.as_secs_f64()),
            config,
            swerve,
            scheduler: DriveScheduler::new(),
            tuning,
            tunables,
            mode: OperatingMode::Disabled,
            pad: None,
            base: None,
            stale_alert: Alert::new("Driver and follower commands stale", AlertLevel::Warning),
            time: 0.0,
            cycle: 0,
        }
    }

    pub fn mode(&self) -> OperatingMode {
        self.mode
    }

    pub fn swerve(&self) -> &Swerve {
        &self.swerve
    }

    /// Current tunables, for seeding the external store
    pub fn tuning_entries(&self) -> Vec<TuningValue> {
        self.tuning.entries(&self.swerve.gains().teleop)
    }

    /// Currently driving command, if any
    pub fn active_command(&self) -> Option<&'static str> {
        self.scheduler.current()
    }

    /// Run one control cycle `dt` seconds after the previous one
    pub fn tick(&mut self, inputs: RobotInputs, dt: f64) -> TickOutput {
        self.time += dt;
        self.cycle += 1;
        let now = self.time;
        let mut frame = TelemetryFrame::new(self.cycle);

        for update in &inputs.tuning {
            self.tunables.apply(update);
        }
        for observation in &inputs.tags {
            self.tags.observe(observation, now);
        }
        self.tags.expire(now);
        if let Some(value) = inputs.pad {
            self.pad = Some(Stamped { value, at: now });
        }
        if let Some(value) = inputs.base {
            self.base = Some(Stamped { value, at: now });
        }

        let pad = Stamped::fresh(&self.pad, now);
        let base = Stamped::fresh(&self.base, now);
        let mut ctx = CommandContext {
            swerve: &mut self.swerve,
            pad,
            base,
            vision: &self.tags,
            telemetry: &mut frame,
            time: now,
        };

        if let Some(mode) = inputs.mode {
            if mode != self.mode {
                Self::enter_mode(&self.config, &mut self.scheduler, &mut ctx, self.mode, mode);
                self.mode = mode;
            }
        }

        for action in inputs.actions {
            match action {
                Action::ApplyTuning => {
                    self.tuning.pull(&self.tunables, ctx.swerve);
                }
                Action::ResetGyro => ctx.swerve.reset_gyro(),
                Action::ResetEncoders => ctx.swerve.reset_encoders(),
                Action::Align(side) if self.mode != OperatingMode::Disabled => {
                    let target = self.config.align.target(side);
                    let period = 1.0 / LOOP_HZ as f64;
                    let align = AlignToTag::new(target, &self.config.align, period);
                    self.scheduler.schedule(Box::new(align), &mut ctx);
                }
                Action::Align(side) => warn!("Ignoring align {:?} while disabled", side),
                Action::CancelAlign => self.scheduler.cancel(&mut ctx),
            }
        }

        if self.mode == OperatingMode::Disabled {
            ctx.swerve.stop();
        } else {
            self.scheduler.run(&mut ctx);
        }

        self.swerve.periodic(&mut frame);

        let health = if pad.is_some() || base.is_some() {
            RuntimeHealth::Ok
        } else {
            RuntimeHealth::CmdStale
        };
        self.stale_alert
            .set(health == RuntimeHealth::CmdStale && self.mode != OperatingMode::Disabled);

        frame.text("Robot/Mode", &format!("{:?}", self.mode));
        frame.text("Robot/Command", self.scheduler.current().unwrap_or("None"));
        frame.flag("Robot/Commands Fresh", health == RuntimeHealth::Ok);

        let mut alerts = self.swerve.alerts();
        alerts.push(self.stale_alert.clone());
        TickOutput {
            telemetry: frame,
            alerts,
            health,
        }
    }

    fn enter_mode(
        config: &RobotConfig,
        scheduler: &mut DriveScheduler,
        ctx: &mut CommandContext,
        from: OperatingMode,
        to: OperatingMode,
    ) {
        info!("Mode {:?} -> {:?}", from, to);
        match to {
            OperatingMode::Disabled => {
                scheduler.cancel_all(ctx);
            }
            OperatingMode::Autonomous => {
                ctx.swerve.set_auto_pid();
                scheduler.cancel(ctx);
                scheduler.set_default(Box::new(VelocityDrive::new()), ctx);
            }
            OperatingMode::Teleop => {
                ctx.swerve.set_tele_pid();
                scheduler.cancel(ctx);
                scheduler.set_default(Box::new(PadDrive::new(config.driver)), ctx);
            }
            OperatingMode::Test => {
                scheduler.cancel(ctx);
                scheduler.set_default(Box::new(PadDrive::new(config.driver)), ctx);
            }
        }
    }
}
