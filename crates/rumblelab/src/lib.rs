//! Console front-end pieces shared by the `rumblelab` binary and its benches.

pub mod commands;
pub mod logging;
pub mod render;
