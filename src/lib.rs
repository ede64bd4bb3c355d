// SPDX-License-Identifier: Apache-2.0

//! Rangepub Library
//!
//! This library provides the core functionality for the short-range radar
//! measuring node and its telemetry gateway: a threshold-crossing range
//! estimator over complex sweep data, lookup-table distance correction,
//! bounded temporal averaging, reference position sensing, and the
//! bus-to-serial telemetry protocol.
//!
//! # Features
//!
//! - **Ranging Pipeline** - Amplitude extraction, threshold crossing,
//!   correction tables and smoothing
//! - **Position Sensing** - Quadrature tick counter and oversampled analog
//!   channels
//! - **Telemetry Protocol** - Bus identifier dispatch and checksummed
//!   serial framing
//! - **CAN Transport** - Bus read/send with bounded retry via SocketCAN
//! - **Serial Sink** - Framed output link for the gateway node

#![warn(missing_docs)]

/// CAN transport with bounded-retry sends
#[cfg(feature = "can")]
pub mod bus;

/// Node configuration, built once at startup
pub mod config;

/// Radar front-end capability interface and simulation
pub mod frontend;

/// Reference position sensing
pub mod position;

/// Range measurement pipeline
pub mod ranging;

/// Serial frame sink
#[cfg(feature = "serial")]
pub mod serial;

/// Telemetry records and serial framing protocol
pub mod telemetry;
