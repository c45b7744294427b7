//! # mqttrelay
//!
//! `mqttrelay` subscribes once to a topic on an MQTT broker and re-broadcasts
//! every message it receives to every connected WebSocket client.
//!
//! ## Core Modules
//!
//! - `upstream`: Connects to the broker, subscribes, and exposes inbound messages as a stream.
//! - `hub`: Fans one message stream out to many independent, bounded subscriber queues.
//! - `transport`: The WebSocket server and the per-connection delivery loop.
//! - `relay`: Owns the upstream source, drives the process lifecycle and reconnects.
//! - `client`: Represents a connected downstream client.
//! - `config`: Loads settings from files and the environment.
//! - `utils`: Error types, logging and the shutdown signal.

pub mod client;
pub mod config;
pub mod hub;
pub mod relay;
pub mod transport;
pub mod upstream;
pub mod utils;
