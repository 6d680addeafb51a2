// 50 Hz loop: stands in for the robot's periodic scheduler
// Each tick drains every inbound topic (keeping all messages, in order), runs one
// robot cycle and publishes telemetry, alerts and health.
// Commands older than CMD_TIMEOUT are treated as absent by the robot (watchdog).

use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use tokio::time::interval;
use tracing::{debug, info, warn};
use zenoh::handlers::FifoChannelHandler;
use zenoh::pubsub::Subscriber;
use zenoh::sample::Sample;

// local imports
use crate::config::{
    CMD_TIMEOUT, LOOP_HZ, RobotConfig, TOPIC_ALERTS, TOPIC_CMD_ACTION, TOPIC_CMD_BASE,
    TOPIC_CMD_MODE, TOPIC_CMD_PAD, TOPIC_HEALTH, TOPIC_IMU, TOPIC_TELEMETRY, TOPIC_TUNING,
    TOPIC_VISION,
};
use crate::messages::{
    Action, BaseCommand, DriverInput, ImuSample, ModeCommand, TagObservation, TuningValue,
};
use crate::motor::sim::{SimDevices, SimPlant};
use crate::motor::{FeetechActuator, FeetechBus, FeetechEncoder, HeadingFeed, ImuGyro, shared_bus};
use crate::robot::{Robot, RobotInputs};
use crate::swerve::{ModuleHardware, Swerve};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub struct RunOptions {
    pub config: RobotConfig,
    /// Simulated devices instead of the servo bus
    pub sim: bool,
}

/// Where the chassis heading comes from
enum HeadingSource {
    Imu(HeadingFeed),
    Plant(SimPlant),
}

fn build_drive(config: &RobotConfig, sim: bool) -> Result<(Swerve, HeadingSource), BoxError> {
    if sim {
        info!("Using simulated devices");
        let SimDevices { plant, hardware, gyro } = SimPlant::build(config)?;
        let swerve = Swerve::new(config, hardware, Box::new(gyro))?;
        return Ok((swerve, HeadingSource::Plant(plant)));
    }

    info!("Opening servo bus on {}", config.serial_port);
    let bus = shared_bus(FeetechBus::open(&config.serial_port)?);
    let servo = &config.servo;
    let hardware = config.modules.each_ref().map(|module| ModuleHardware {
        drive: Box::new(FeetechActuator::drive(bus.clone(), module.drive_id, servo)),
        steer: Box::new(FeetechActuator::steer(bus.clone(), module.steer_id, servo)),
        encoder: Box::new(FeetechEncoder::new(
            bus.clone(),
            module.encoder_id,
            module.encoder_offset_rotations,
            config.mechanism.steer_inverted,
            servo,
        )),
    });
    let (gyro, feed) = ImuGyro::new();
    let swerve = Swerve::new(config, hardware, Box::new(gyro))?;
    Ok((swerve, HeadingSource::Imu(feed)))
}

/// Drain all pending samples (non-blocking), skipping ones that do not parse
fn drain<T: DeserializeOwned>(
    subscriber: &Subscriber<FifoChannelHandler<Sample>>,
    topic: &str,
) -> Vec<T> {
    let mut messages = Vec::new();
    while let Ok(Some(sample)) = subscriber.try_recv() {
        let payload = sample.payload().to_bytes();
        match serde_json::from_slice::<T>(&payload) {
            Ok(message) => messages.push(message),
            Err(e) => warn!("Failed to parse {} message: {}", topic, e),
        }
    }
    messages
}

pub async fn run(options: RunOptions) -> Result<(), BoxError> {
    let RunOptions { config, sim } = options;
    let (swerve, mut heading) = build_drive(&config, sim)?;
    let mut robot = Robot::new(config, swerve);

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let sub_pad = session.declare_subscriber(TOPIC_CMD_PAD).await?;
    let sub_base = session.declare_subscriber(TOPIC_CMD_BASE).await?;
    let sub_mode = session.declare_subscriber(TOPIC_CMD_MODE).await?;
    let sub_action = session.declare_subscriber(TOPIC_CMD_ACTION).await?;
    let sub_tuning = session.declare_subscriber(TOPIC_TUNING).await?;
    let sub_imu = session.declare_subscriber(TOPIC_IMU).await?;
    let sub_vision = session.declare_subscriber(TOPIC_VISION).await?;
    let pub_telemetry = session.declare_publisher(TOPIC_TELEMETRY).await?;
    let pub_alerts = session.declare_publisher(TOPIC_ALERTS).await?;
    let pub_health = session.declare_publisher(TOPIC_HEALTH).await?;
    let pub_tuning = session.declare_publisher(TOPIC_TUNING).await?;

    // Seed the tunable store with the teleop defaults
    for entry in robot.tuning_entries() {
        pub_tuning.put(serde_json::to_string(&entry)?).await?;
    }

    let mut tick = interval(Duration::from_millis(1000 / LOOP_HZ));
    let mut last_tick = Instant::now();

    info!(
        "Runtime started: {}Hz loop, {}ms watchdog timeout",
        LOOP_HZ,
        CMD_TIMEOUT.as_millis()
    );
    info!(
        "Subscribed to: {}, {}, {}, {}, {}, {}, {}",
        TOPIC_CMD_PAD,
        TOPIC_CMD_BASE,
        TOPIC_CMD_MODE,
        TOPIC_CMD_ACTION,
        TOPIC_TUNING,
        TOPIC_IMU,
        TOPIC_VISION
    );
    info!("Publishing to: {}, {}, {}", TOPIC_TELEMETRY, TOPIC_ALERTS, TOPIC_HEALTH);

    loop {
        tick.tick().await;
        let dt = last_tick.elapsed().as_secs_f64();
        last_tick = Instant::now();

        // 1. Gather everything that arrived since the last tick
        let imu: Vec<ImuSample> = drain(&sub_imu, TOPIC_IMU);
        match &mut heading {
            HeadingSource::Imu(feed) => {
                if let Some(sample) = imu.last() {
                    feed.publish(sample.yaw);
                }
            }
            HeadingSource::Plant(plant) => plant.step(dt),
        }

        let inputs = RobotInputs {
            mode: drain::<ModeCommand>(&sub_mode, TOPIC_CMD_MODE).last().map(|cmd| cmd.mode),
            pad: drain::<DriverInput>(&sub_pad, TOPIC_CMD_PAD).last().copied(),
            base: drain::<BaseCommand>(&sub_base, TOPIC_CMD_BASE).last().copied(),
            actions: drain::<Action>(&sub_action, TOPIC_CMD_ACTION),
            tuning: drain::<TuningValue>(&sub_tuning, TOPIC_TUNING),
            tags: drain::<TagObservation>(&sub_vision, TOPIC_VISION),
        };
        if !inputs.actions.is_empty() {
            debug!("Actions: {:?}", inputs.actions);
        }

        // 2. One robot cycle (watchdog, commands, odometry)
        let output = robot.tick(inputs, dt);

        // 3. Publish telemetry and alerts
        pub_telemetry.put(serde_json::to_string(&output.telemetry)?).await?;
        pub_alerts.put(serde_json::to_string(&output.alerts)?).await?;

        // 4. Publish health
        let health_json = serde_json::to_string(&output.health)?;
        pub_health.put(health_json).await?;
    }
}
