//! File-driven front end for the motion kernel: configuration loading,
//! move files, and running a kernel to a time limit.

pub mod config;
pub mod moves;
pub mod simulate;
