//! Origin policy
//!
//! Frames are only served to peers on the local network unless configured
//! otherwise. Rejected connections are closed before any byte is written.

use std::net::{IpAddr, Ipv6Addr};

/// Which peer addresses may receive the stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OriginPolicy {
    /// Site-local addresses only: 10/8, 172.16/12, 192.168/16 and fec0::/10
    SiteLocal,
    /// Site-local plus loopback, link-local and IPv6 unique-local addresses
    #[default]
    Private,
    /// Every peer
    Any,
}

impl OriginPolicy {
    /// Whether a peer at `ip` may be served
    pub fn allows(&self, ip: IpAddr) -> bool {
        let ip = unmap(ip);
        match self {
            OriginPolicy::Any => true,
            OriginPolicy::SiteLocal => is_site_local(ip),
            OriginPolicy::Private => {
                is_site_local(ip)
                    || match ip {
                        IpAddr::V4(v4) => v4.is_loopback() || v4.is_link_local(),
                        IpAddr::V6(v6) => {
                            v6.is_loopback() || is_unique_local(&v6) || is_link_local(&v6)
                        }
                    }
            }
        }
    }
}

/// Treat `::ffff:a.b.c.d` like `a.b.c.d`
fn unmap(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => IpAddr::V4(v4),
            None => IpAddr::V6(v6),
        },
        v4 => v4,
    }
}

fn is_site_local(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_private(),
        IpAddr::V6(v6) => (v6.segments()[0] & 0xffc0) == 0xfec0,
    }
}

fn is_unique_local(ip: &Ipv6Addr) -> bool {
    (ip.segments()[0] & 0xfe00) == 0xfc00
}

fn is_link_local(ip: &Ipv6Addr) -> bool {
    (ip.segments()[0] & 0xffc0) == 0xfe80
}
