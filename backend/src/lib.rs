//! Activity session coordinator.
//!
//! Coordinates children's educational activity runs with an external robot
//! device over an asynchronous message channel (MQTT, or a raw TCP socket),
//! waits for the device's per-choice performance report under a timeout, and
//! reconciles the report into a per-child, per-activity statistics store
//! with bounded attempt history and derived scoring.

pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod rest;
pub mod storage;
pub mod transport;
