//! Mode-specific pipeline constructors.
//!
//! Each collection mode is a thin configuration adapter: it validates its
//! settings, maps them to a [`SessionMode`](crate::session::SessionMode), and
//! returns the one generic [`Pipeline`](crate::pipeline::Pipeline). No mode
//! carries its own state machine.

pub mod counters;
pub mod gcdump;
pub mod logs;
pub mod trace;
