pub mod commands;
pub mod config;
pub mod geometry;
pub mod messages;
pub mod motor;
pub mod pid;
pub mod robot;
pub mod runtime;
pub mod swerve;
pub mod telemetry;
pub mod tuning;
