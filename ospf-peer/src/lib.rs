//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

#![cfg_attr(
    feature = "testing",
    allow(dead_code, unused_variables, unused_imports)
)]

pub mod area;
pub mod auth;
pub mod config;
pub mod debug;
pub mod error;
pub mod events;
pub mod flood;
pub mod lsdb;
pub mod neighbor;
pub mod output;
pub mod packet;
pub mod peer;
pub mod peer_manager;
pub mod peer_out;
pub mod tasks;
pub mod version;
