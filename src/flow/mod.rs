// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 rankflow contributors

//! Flow configuration
//!
//! The key/value context threaded from a pipeline into its steps. Every
//! branch works on its own copy, so concurrently running siblings never see
//! each other's writes.

mod config;
mod value;

pub use config::*;
pub use value::FlowValue;
