// Keyboard pad: WASD left stick, Z/X right stick, R/F stick depth, Q quit
// Number keys: 1 disabled, 2 teleop, 3 autonomous, 4 test
// Actions: G reset gyro, T apply tuning, J/K/L align left/center/right, C cancel align
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use serde_json::json;
use std::time::{Duration, Instant};
use tracing::info;

use swerve_zenoh_runtime::config::{TOPIC_CMD_ACTION, TOPIC_CMD_MODE, TOPIC_CMD_PAD};

const DEFLECTIONS: [f64; 3] = [0.25, 0.5, 1.0]; // stick fraction
const INPUT_TIMEOUT_MS: u64 = 100; // Center the sticks after this much time with no input

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let pub_pad = session.declare_publisher(TOPIC_CMD_PAD).await?;
    let pub_mode = session.declare_publisher(TOPIC_CMD_MODE).await?;
    let pub_action = session.declare_publisher(TOPIC_CMD_ACTION).await?;

    info!("Controls: WASD=move, Z/X=rotate, R/F=depth, 1-4=mode, G/T/J/K/L/C=actions, Q=quit");
    info!("Depth: LOW");

    enable_raw_mode()?;
    let result = run_pad(&pub_pad, &pub_mode, &pub_action).await;
    disable_raw_mode()?;

    result
}

async fn run_pad(
    pub_pad: &zenoh::pubsub::Publisher<'_>,
    pub_mode: &zenoh::pubsub::Publisher<'_>,
    pub_action: &zenoh::pubsub::Publisher<'_>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut depth_idx: usize = 0;

    // Persistent stick state, pad sign conventions (stick up = -y)
    let mut left_x = 0.0;
    let mut left_y = 0.0;
    let mut right_x = 0.0;
    let mut last_stick_input = Instant::now();

    loop {
        let mut mode = None;
        let mut action = None;

        // Poll for key with 20ms timeout (50Hz effective rate)
        if event::poll(Duration::from_millis(20))? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;
                let deflection = DEFLECTIONS[depth_idx];

                match code {
                    // Left stick
                    KeyCode::Char('w') if pressed => {
                        left_y = -deflection;
                        last_stick_input = Instant::now();
                    }
                    KeyCode::Char('s') if pressed => {
                        left_y = deflection;
                        last_stick_input = Instant::now();
                    }
                    KeyCode::Char('a') if pressed => {
                        left_x = -deflection;
                        last_stick_input = Instant::now();
                    }
                    KeyCode::Char('d') if pressed => {
                        left_x = deflection;
                        last_stick_input = Instant::now();
                    }

                    // Right stick (z = counter-clockwise)
                    KeyCode::Char('z') if pressed => {
                        right_x = -deflection;
                        last_stick_input = Instant::now();
                    }
                    KeyCode::Char('x') if pressed => {
                        right_x = deflection;
                        last_stick_input = Instant::now();
                    }

                    // Stick depth
                    KeyCode::Char('r') if pressed => {
                        depth_idx = (depth_idx + 1).min(2);
                        print_depth(depth_idx);
                    }
                    KeyCode::Char('f') if pressed => {
                        depth_idx = depth_idx.saturating_sub(1);
                        print_depth(depth_idx);
                    }

                    // Operating mode
                    KeyCode::Char('1') if pressed => mode = Some("disabled"),
                    KeyCode::Char('2') if pressed => mode = Some("teleop"),
                    KeyCode::Char('3') if pressed => mode = Some("autonomous"),
                    KeyCode::Char('4') if pressed => mode = Some("test"),

                    // Buttons
                    KeyCode::Char('g') if pressed => action = Some(json!({"action": "reset_gyro"})),
                    KeyCode::Char('t') if pressed => {
                        action = Some(json!({"action": "apply_tuning"}))
                    }
                    KeyCode::Char('j') if pressed => action = Some(align("left")),
                    KeyCode::Char('k') if pressed => action = Some(align("center")),
                    KeyCode::Char('l') if pressed => action = Some(align("right")),
                    KeyCode::Char('c') if pressed => {
                        action = Some(json!({"action": "cancel_align"}))
                    }

                    // Quit
                    KeyCode::Char('q') | KeyCode::Esc if pressed => break,

                    _ => {}
                }
            }
        }

        if let Some(mode) = mode {
            info!("Mode: {}", mode);
            pub_mode.put(json!({ "mode": mode }).to_string()).await?;
        }
        if let Some(action) = action {
            info!("Action: {}", action);
            pub_action.put(action.to_string()).await?;
        }

        // Center sticks if no input for INPUT_TIMEOUT_MS
        if last_stick_input.elapsed() > Duration::from_millis(INPUT_TIMEOUT_MS) {
            left_x = 0.0;
            left_y = 0.0;
            right_x = 0.0;
        }

        // Always publish at ~50Hz
        let pad = json!({
            "left_x": left_x,
            "left_y": left_y,
            "right_x": right_x
        });
        pub_pad.put(pad.to_string()).await?;
    }

    Ok(())
}

fn print_depth(idx: usize) {
    let label = ["LOW", "MED", "HIGH"][idx];
    info!("Depth: {}", label);
}

fn align(side: &str) -> serde_json::Value {
    json!({"action": "align", "side": side})
}
