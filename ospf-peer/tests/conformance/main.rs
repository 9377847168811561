//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

mod network;
mod ospfv2;
mod ospfv3;
