//! Interface address lookup.
//!
//! Used to learn which local addresses belong to the WiFi interface, so that
//! subflows can be classified by the address they are bound to.

use std::net::IpAddr;

use super::guess_link_class;
use crate::types::LinkClass;

/// One address assigned to a local interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceAddr {
    pub name: String,
    pub address: IpAddr,
    pub is_up: bool,
    pub is_loopback: bool,
}

impl InterfaceAddr {
    /// Link class guessed from the interface name.
    pub fn link_class(&self) -> Option<LinkClass> {
        guess_link_class(&self.name)
    }
}

/// All interface addresses known to the OS.
#[cfg(unix)]
pub fn list_interface_addresses() -> Vec<InterfaceAddr> {
    use std::ffi::CStr;

    let mut result = Vec::new();

    unsafe {
        let mut ifaddrs: *mut libc::ifaddrs = std::ptr::null_mut();
        if libc::getifaddrs(std::ptr::addr_of_mut!(ifaddrs)) != 0 {
            return result;
        }

        let mut current = ifaddrs;
        while !current.is_null() {
            let ifa = &*current;

            if !ifa.ifa_name.is_null() && !ifa.ifa_addr.is_null() {
                let family = i32::from((*ifa.ifa_addr).sa_family);

                #[allow(clippy::cast_ptr_alignment)]
                let address = match family {
                    libc::AF_INET => {
                        let sockaddr = ifa.ifa_addr.cast::<libc::sockaddr_in>();
                        Some(IpAddr::V4(std::net::Ipv4Addr::from(u32::from_be(
                            (*sockaddr).sin_addr.s_addr,
                        ))))
                    }
                    libc::AF_INET6 => {
                        let sockaddr = ifa.ifa_addr.cast::<libc::sockaddr_in6>();
                        Some(IpAddr::V6(std::net::Ipv6Addr::from((*sockaddr).sin6_addr.s6_addr)))
                    }
                    _ => None,
                };

                if let Some(address) = address {
                    let flags = ifa.ifa_flags as i32;
                    result.push(InterfaceAddr {
                        name: CStr::from_ptr(ifa.ifa_name).to_string_lossy().into_owned(),
                        address,
                        is_up: (flags & libc::IFF_UP) != 0,
                        is_loopback: (flags & libc::IFF_LOOPBACK) != 0,
                    });
                }
            }

            current = ifa.ifa_next;
        }

        libc::freeifaddrs(ifaddrs);
    }

    result
}

#[cfg(not(unix))]
pub fn list_interface_addresses() -> Vec<InterfaceAddr> {
    vec![]
}

/// First WiFi interface that is up, judged by its name.
pub fn find_wifi_interface(addrs: &[InterfaceAddr]) -> Option<&str> {
    addrs
        .iter()
        .find(|i| i.is_up && !i.is_loopback && i.link_class() == Some(LinkClass::Wifi))
        .map(|i| i.name.as_str())
}

/// Name of the local WiFi interface, if one is up.
pub fn detect_wifi_interface() -> Option<String> {
    find_wifi_interface(&list_interface_addresses()).map(str::to_string)
}

/// Addresses assigned to the named interface, empty if it does not exist.
pub fn interface_addresses(name: &str) -> Vec<IpAddr> {
    list_interface_addresses()
        .into_iter()
        .filter(|i| i.name == name)
        .map(|i| i.address)
        .collect()
}
