// Module diagnostic: READ-ONLY check of every swerve servo on the bus
//
// Nothing is written to the servos, so the wheels never move.
// Run this before putting the base on the runtime.
//
// Usage: cargo run --example module_diagnostic -- [params.toml] [port]

use std::io::{self, Write};

use swerve_zenoh_runtime::config::RobotConfig;
use swerve_zenoh_runtime::motor::feetech::{FeetechBus, Register, STEPS_PER_REVOLUTION};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("debug".parse().unwrap()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let mut config = match args.next() {
        Some(path) => RobotConfig::load(path)?,
        None => RobotConfig::default(),
    };
    if let Some(port) = args.next() {
        config.serial_port = port;
    }

    println!("Swerve module diagnostic (read-only)");
    println!("Serial port: {}", config.serial_port);
    println!();

    println!("Step 1: Opening serial port...");
    let mut bus = match FeetechBus::open(&config.serial_port) {
        Ok(bus) => {
            println!("  ✓ Serial port opened successfully");
            bus
        }
        Err(e) => {
            println!("  ✗ Failed to open serial port: {}", e);
            println!();
            println!("Troubleshooting:");
            println!("  - Check the port path is correct");
            println!("  - Verify the USB cable is connected");
            return Err(e.into());
        }
    };
    println!();

    println!("Step 2: Pinging servos...");
    let mut all_found = true;
    for module in &config.modules {
        for (role, id) in [("drive", module.drive_id), ("steer", module.steer_id)] {
            print!("  {} {} (ID {}): ", module.name, role, id);
            io::stdout().flush()?;

            match bus.ping(id) {
                Ok(true) => println!("✓ RESPONDING"),
                Ok(false) => {
                    println!("✗ NO RESPONSE");
                    all_found = false;
                }
                Err(e) => {
                    println!("✗ ERROR: {}", e);
                    all_found = false;
                }
            }
        }
    }
    println!();

    if !all_found {
        println!("⚠ WARNING: Not all servos responded!");
        println!("  - Check servo power supply");
        println!("  - Compare the IDs above with the parameter file");
        println!();
        print!("Continue reading available servos? [y/N]: ");
        io::stdout().flush()?;
        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Aborted.");
            return Ok(());
        }
        println!();
    }

    println!("Step 3: Reading module state...");
    println!();

    for module in &config.modules {
        println!("  === {} ===", module.name);

        match bus.read_u8(module.drive_id, Register::OperatingMode) {
            Ok(mode) => {
                let mode_str = if mode == 1 { "Velocity" } else { "NOT velocity" };
                println!("    Drive mode:       {} ({})", mode, mode_str);
            }
            Err(e) => println!("    Drive mode:       ERROR - {}", e),
        }

        match bus.present_velocity(module.drive_id) {
            Ok(vel) => println!("    Drive velocity:   {} (raw)", vel),
            Err(e) => println!("    Drive velocity:   ERROR - {}", e),
        }

        match bus.read_u8(module.steer_id, Register::OperatingMode) {
            Ok(mode) => {
                let mode_str = if mode == 0 { "Position" } else { "NOT position" };
                println!("    Steer mode:       {} ({})", mode, mode_str);
            }
            Err(e) => println!("    Steer mode:       ERROR - {}", e),
        }

        match bus.present_position(module.encoder_id) {
            Ok(raw) => {
                let rotations = raw as f64 / STEPS_PER_REVOLUTION as f64;
                let wheel = (rotations - module.encoder_offset_rotations).rem_euclid(1.0);
                println!(
                    "    Encoder:          {} raw, wheel at {:.1}° (offset {:.3} rot)",
                    raw,
                    wheel * 360.0,
                    module.encoder_offset_rotations
                );
            }
            Err(e) => println!("    Encoder:          ERROR - {}", e),
        }

        println!();
    }

    println!("Diagnostic complete.");
    println!("With every wheel pointing forward, each encoder should read close to 0°.");
    println!("Otherwise set encoder_offset_rotations in the parameter file.");

    Ok(())
}
