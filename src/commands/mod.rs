// Drive commands and the scheduler that owns the drive on their behalf
//
// Exactly one command drives the chassis at a time. A command moves through
// Idle -> Running -> Finished; cancelling a running command calls
// `end(true)` and nothing else. No stop is issued on its behalf.

mod align;
mod pad_drive;
mod velocity_drive;
mod vision;

pub use align::{AlignTarget, AlignToTag};
pub use pad_drive::{PadDrive, PadSpeeds};
pub use velocity_drive::VelocityDrive;
pub use vision::{TagCache, TagReading, Vision};

use tracing::debug;

use crate::messages::{BaseCommand, DriverInput};
use crate::swerve::Swerve;
use crate::telemetry::Telemetry;

/// Everything a command may touch during one cycle
pub struct CommandContext<'a> {
    pub swerve: &'a mut Swerve,
    /// Latest pad axes, `None` when stale
    pub pad: Option<DriverInput>,
    /// Latest follower velocities, `None` when stale
    pub base: Option<BaseCommand>,
    pub vision: &'a dyn Vision,
    pub telemetry: &'a mut dyn Telemetry,
    /// Seconds since start-up
    pub time: f64,
}

pub trait Command: Send {
    fn name(&self) -> &'static str;

    fn initialize(&mut self, _ctx: &mut CommandContext) {}

    fn execute(&mut self, ctx: &mut CommandContext);

    fn is_finished(&self, _ctx: &CommandContext) -> bool {
        false
    }

    fn end(&mut self, _ctx: &mut CommandContext, _interrupted: bool) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandState {
    Idle,
    Running,
    Finished,
}

/// A command plus its lifecycle state
pub struct ScheduledCommand {
    command: Box<dyn Command>,
    state: CommandState,
}

impl ScheduledCommand {
    pub fn new(command: Box<dyn Command>) -> Self {
        Self {
            command,
            state: CommandState::Idle,
        }
    }

    pub fn name(&self) -> &'static str {
        self.command.name()
    }

    pub fn state(&self) -> CommandState {
        self.state
    }

    /// Advance one scheduler cycle
    pub fn tick(&mut self, ctx: &mut CommandContext) {
        if self.state == CommandState::Idle {
            debug!("Command {} initialized", self.name());
            self.command.initialize(ctx);
            self.state = CommandState::Running;
        }
        if self.state != CommandState::Running {
            return;
        }

        self.command.execute(ctx);
        if self.command.is_finished(ctx) {
            self.command.end(ctx, false);
            self.state = CommandState::Finished;
            debug!("Command {} finished", self.name());
        }
    }

    pub fn cancel(&mut self, ctx: &mut CommandContext) {
        if self.state == CommandState::Running {
            self.command.end(ctx, true);
            debug!("Command {} interrupted", self.name());
        }
        self.state = CommandState::Finished;
    }

    /// Allow a finished command to run again from `initialize`
    pub fn rearm(&mut self) {
        self.state = CommandState::Idle;
    }
}

/// Owns the drive on behalf of one command at a time.
///
/// The default command runs whenever nothing else is scheduled and starts
/// over from `initialize` each time it regains the drive.
pub struct DriveScheduler {
    default: Option<ScheduledCommand>,
    active: Option<ScheduledCommand>,
}

impl DriveScheduler {
    pub fn new() -> Self {
        Self {
            default: None,
            active: None,
        }
    }

    pub fn set_default(&mut self, command: Box<dyn Command>, ctx: &mut CommandContext) {
        if let Some(old) = &mut self.default {
            old.cancel(ctx);
        }
        self.default = Some(ScheduledCommand::new(command));
    }

    /// Hand the drive to `command`, interrupting whoever has it
    pub fn schedule(&mut self, command: Box<dyn Command>, ctx: &mut CommandContext) {
        if let Some(active) = &mut self.active {
            active.cancel(ctx);
        } else if let Some(default) = &mut self.default {
            default.cancel(ctx);
        }
        self.active = Some(ScheduledCommand::new(command));
    }

    /// Interrupt the scheduled command; the default takes over next cycle
    pub fn cancel(&mut self, ctx: &mut CommandContext) {
        if let Some(mut active) = self.active.take() {
            active.cancel(ctx);
        }
    }

    /// Interrupt everything, including the default command
    pub fn cancel_all(&mut self, ctx: &mut CommandContext) {
        self.cancel(ctx);
        if let Some(default) = &mut self.default {
            default.cancel(ctx);
        }
    }

    pub fn run(&mut self, ctx: &mut CommandContext) {
        if let Some(active) = &mut self.active {
            active.tick(ctx);
            if active.state() == CommandState::Finished {
                self.active = None;
            }
            return;
        }

        if let Some(default) = &mut self.default {
            if default.state() == CommandState::Finished {
                default.rearm();
            }
            default.tick(ctx);
        }
    }

    /// Name of the command currently holding the drive
    pub fn current(&self) -> Option<&'static str> {
        match (&self.active, &self.default) {
            (Some(active), _) => Some(active.name()),
            (None, Some(default)) if default.state() == CommandState::Running => {
                Some(default.name())
            }
            _ => None,
        }
    }
}

impl Default for DriveScheduler {
    fn default() -> Self {
        Self::new()
    }
}
