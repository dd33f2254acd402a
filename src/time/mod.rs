// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Logical time for the instruction-driven engine.
//!
//! The engine is single-threaded and instruction-driven, so time is a bare
//! counter: one [`Tick`] per instruction, advanced by the [`LogicalClock`]
//! after each instruction completes. Ticks stamp transaction starts and
//! committed versions, and break ties when a deadlock victim is chosen.

mod clock;
mod tick;

pub use clock::LogicalClock;
pub use tick::Tick;
