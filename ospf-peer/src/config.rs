//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

#![allow(clippy::derivable_impls)]

use std::net::{IpAddr, Ipv4Addr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::area::AreaType;
use crate::peer::LinkType;

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub instance: InstanceCfg,
    pub links: Vec<LinkCfg>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct InstanceCfg {
    pub router_id: Ipv4Addr,
    // Minimum gap between two packets sent on the same link (milliseconds).
    pub transmit_gap_ms: u64,
    pub debug_packets: bool,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct LinkCfg {
    pub ifname: String,
    pub vifname: String,
    pub addr: IpAddr,
    pub prefixlen: u8,
    pub mtu: u16,
    pub cost: u16,
    pub link_type: LinkType,
    // OSPFv3 Interface ID.
    pub iface_id: u32,
    pub transmit_delay: u16,
    pub enabled: bool,
    pub peers: Vec<PeerCfg>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PeerCfg {
    pub area_id: Ipv4Addr,
    pub area_type: AreaType,
    pub hello_interval: u16,
    pub dead_interval: u32,
    pub rxmt_interval: u16,
    pub priority: u8,
    pub passive: bool,
    pub mtu_ignore: bool,
    // OSPFv3 Instance ID.
    pub instance_id: u8,
    pub auth: AuthCfg,
    pub static_nbrs: Vec<StaticNbrCfg>,
    // Remote router ID (virtual links only).
    pub vlink_router_id: Option<Ipv4Addr>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase", deny_unknown_fields)]
pub enum AuthCfg {
    #[default]
    None,
    Simple {
        password: String,
    },
    Md5 {
        keys: Vec<Md5KeyCfg>,
    },
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Md5KeyCfg {
    pub key_id: u8,
    pub password: String,
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub max_time_drift: u32,
}

#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StaticNbrCfg {
    pub addr: IpAddr,
    #[serde(default)]
    pub priority: u8,
}

// ===== impl Config =====

impl Config {
    // Loads the configuration from a TOML document.
    pub fn from_toml(data: &str) -> Result<Config, toml::de::Error> {
        toml::from_str(data)
    }
}

// ===== impl InstanceCfg =====

impl Default for InstanceCfg {
    fn default() -> InstanceCfg {
        InstanceCfg {
            router_id: Ipv4Addr::UNSPECIFIED,
            transmit_gap_ms: 0,
            debug_packets: false,
        }
    }
}

// ===== impl LinkCfg =====

impl Default for LinkCfg {
    fn default() -> LinkCfg {
        LinkCfg {
            ifname: String::new(),
            vifname: String::new(),
            addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            prefixlen: 24,
            mtu: 1500,
            cost: 10,
            link_type: LinkType::Broadcast,
            iface_id: 0,
            transmit_delay: 1,
            enabled: true,
            peers: vec![],
        }
    }
}

// ===== impl PeerCfg =====

impl Default for PeerCfg {
    fn default() -> PeerCfg {
        PeerCfg {
            area_id: Ipv4Addr::UNSPECIFIED,
            area_type: AreaType::Normal,
            hello_interval: 10,
            dead_interval: 40,
            rxmt_interval: 5,
            priority: 1,
            passive: false,
            mtu_ignore: false,
            instance_id: 0,
            auth: AuthCfg::None,
            static_nbrs: vec![],
            vlink_router_id: None,
        }
    }
}

// ===== unit tests =====
