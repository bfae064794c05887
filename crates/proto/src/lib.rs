// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire protocol between the tether hub and gateway daemons.
//!
//! Two message classes travel over the gateway duplex:
//!
//! - **Text frames** carry JSON envelopes with a top-level `type`
//!   discriminator ([`message::Command`] hub → gateway,
//!   [`message::Event`] gateway → hub).
//! - **Binary frames** carry terminal output exclusively, in the fixed
//!   layout implemented by [`frame`].
//!
//! Everything in this crate is pure data: no I/O, no async, no state.

pub mod frame;
pub mod message;

/// Wire schema version stamped on command envelopes.
pub const SCHEMA_VERSION: &str = "1";
