//! The request inspection pipeline (§4.4–§4.8). Each submodule is one
//! named component from §2's table; `api::run_pipeline` invokes them in
//! the fixed order the spec requires.

pub mod anomaly;
pub mod authz;
pub mod payload;
pub mod profiler;
pub mod threat_intel;
