// ABOUTME: Root library module exposing all public modules
// ABOUTME: Provides access to config, connectors, bridge, control server, and metrics

pub mod bridge;
pub mod config;
pub mod director;
pub mod events;
pub mod metrics;
pub mod reconnect;
pub mod server;
pub mod twitch;
