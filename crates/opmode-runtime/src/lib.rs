//! `opmode-runtime` – Session Driver
//!
//! Runs sessions on top of the resolution core in `opmode-kernel`.
//!
//! # Modules
//!
//! - [`driver`] – [`SessionDriver`][driver::SessionDriver]: the ten-phase
//!   state machine.  It opens a session, dispatches lifecycle hooks to the
//!   active features in activation order, admits newly pending features at
//!   every phase boundary and rejects out-of-order transitions.
//! - [`op_mode`] – [`OpMode`][op_mode::OpMode]: a program body driven through
//!   one complete session by
//!   [`SessionDriver::run_op_mode`][driver::SessionDriver::run_op_mode].
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: installs the
//!   global `tracing` subscriber with an optional OTLP span exporter.  Set
//!   `OTEL_EXPORTER_OTLP_ENDPOINT` to enable trace export.

pub mod driver;
pub mod op_mode;
pub mod telemetry;

pub use driver::SessionDriver;
pub use op_mode::{OpMode, RunPlan};
pub use telemetry::{TracerProviderGuard, init_tracing};
