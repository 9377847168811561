//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use ipnetwork::{Ipv4Network, Ipv6Network};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

// Address Family identifier.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub enum AddressFamily {
    Ipv4 = 1,
    Ipv6 = 2,
}

// Extension methods for Ipv4Addr.
pub trait Ipv4AddrExt {
    const LENGTH: usize;

    // Returns the network mask corresponding to the given prefix length.
    fn from_prefixlen(prefixlen: u8) -> Ipv4Addr;
}

// Extension methods for Ipv6Addr.
pub trait Ipv6AddrExt {
    const LENGTH: usize;

    // Returns true if this is an unicast link-local address (fe80::/10).
    fn is_link_local(&self) -> bool;
}

// Common behavior of the IPv4 and IPv6 address types.
pub trait IpAddrKind:
    std::fmt::Debug
    + std::fmt::Display
    + Clone
    + Copy
    + Eq
    + std::hash::Hash
    + Ord
    + PartialEq
    + PartialOrd
    + Send
    + Sync
    + DeserializeOwned
    + Serialize
    + Into<IpAddr>
    + 'static
{
    fn address_family(&self) -> AddressFamily;

    fn get(addr: IpAddr) -> Option<Self>;

    fn is_usable(&self) -> bool;

    fn is_multicast(&self) -> bool;

    // Returns true if the address falls inside the given prefix.
    fn in_subnet(&self, subnet: &Self, prefixlen: u8) -> bool;
}

// ===== impl AddressFamily =====

impl std::fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AddressFamily::Ipv4 => write!(f, "IPv4"),
            AddressFamily::Ipv6 => write!(f, "IPv6"),
        }
    }
}

// ===== impl Ipv4Addr =====

impl Ipv4AddrExt for Ipv4Addr {
    const LENGTH: usize = 4;

    fn from_prefixlen(prefixlen: u8) -> Ipv4Addr {
        match Ipv4Network::new(Ipv4Addr::UNSPECIFIED, prefixlen) {
            Ok(network) => network.mask(),
            Err(_) => Ipv4Addr::BROADCAST,
        }
    }
}

impl IpAddrKind for Ipv4Addr {
    fn address_family(&self) -> AddressFamily {
        AddressFamily::Ipv4
    }

    fn get(addr: IpAddr) -> Option<Self> {
        match addr {
            IpAddr::V4(addr) => Some(addr),
            _ => None,
        }
    }

    fn is_usable(&self) -> bool {
        !(self.is_broadcast()
            || self.is_loopback()
            || Ipv4Addr::is_multicast(self)
            || self.is_unspecified())
    }

    fn is_multicast(&self) -> bool {
        Ipv4Addr::is_multicast(self)
    }

    fn in_subnet(&self, subnet: &Self, prefixlen: u8) -> bool {
        Ipv4Network::new(*subnet, prefixlen)
            .map(|network| network.contains(*self))
            .unwrap_or(false)
    }
}

// ===== impl Ipv6Addr =====

impl Ipv6AddrExt for Ipv6Addr {
    const LENGTH: usize = 16;

    fn is_link_local(&self) -> bool {
        (self.segments()[0] & 0xffc0) == 0xfe80
    }
}

impl IpAddrKind for Ipv6Addr {
    fn address_family(&self) -> AddressFamily {
        AddressFamily::Ipv6
    }

    fn get(addr: IpAddr) -> Option<Self> {
        match addr {
            IpAddr::V6(addr) => Some(addr),
            _ => None,
        }
    }

    fn is_usable(&self) -> bool {
        !(self.is_loopback()
            || Ipv6Addr::is_multicast(self)
            || self.is_unspecified())
    }

    fn is_multicast(&self) -> bool {
        Ipv6Addr::is_multicast(self)
    }

    fn in_subnet(&self, subnet: &Self, prefixlen: u8) -> bool {
        Ipv6Network::new(*subnet, prefixlen)
            .map(|network| network.contains(*self))
            .unwrap_or(false)
    }
}

// ===== unit tests =====

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ipv4_mask_from_prefixlen() {
        assert_eq!(
            Ipv4Addr::from_prefixlen(24),
            Ipv4Addr::new(255, 255, 255, 0)
        );
        assert_eq!(Ipv4Addr::from_prefixlen(0), Ipv4Addr::UNSPECIFIED);
        assert_eq!(Ipv4Addr::from_prefixlen(40), Ipv4Addr::BROADCAST);
    }

    #[test]
    fn ipv6_link_local() {
        let addr: Ipv6Addr = "fe80::1".parse().unwrap();
        assert!(Ipv6AddrExt::is_link_local(&addr));
        let addr: Ipv6Addr = "2001:db8::1".parse().unwrap();
        assert!(!Ipv6AddrExt::is_link_local(&addr));
    }

    #[test]
    fn subnet_membership() {
        let addr = Ipv4Addr::new(10, 0, 1, 7);
        assert!(addr.in_subnet(&Ipv4Addr::new(10, 0, 1, 0), 24));
        assert!(!addr.in_subnet(&Ipv4Addr::new(10, 0, 2, 0), 24));
    }
}
