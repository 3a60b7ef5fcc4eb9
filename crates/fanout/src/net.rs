//! Socket construction for the data channel, plus startup diagnostics.

use std::net::{Ipv4Addr, SocketAddrV4};

use anyhow::{Context, Result};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

use fanout_core::config::NetworkConfig;

/// A UDP socket suitable for sending to the multicast group.
pub fn multicast_send_socket() -> Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).context("socket()")?;

    socket.set_nonblocking(true).context("set_nonblocking")?;
    socket
        .bind(&SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0).into())
        .context("bind()")?;

    UdpSocket::from_std(socket.into()).context("failed to convert to tokio UdpSocket")
}

/// A UDP socket bound to the data port and joined to the multicast group.
pub fn multicast_recv_socket(network: &NetworkConfig) -> Result<UdpSocket> {
    let group: Ipv4Addr = network
        .multicast_group
        .parse()
        .with_context(|| format!("invalid multicast group '{}'", network.multicast_group))?;

    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).context("socket()")?;

    socket.set_reuse_address(true).context("SO_REUSEADDR")?;
    socket.set_nonblocking(true).context("set_nonblocking")?;

    let bind_addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, network.multicast_port);
    socket.bind(&bind_addr.into()).context("bind()")?;

    socket
        .join_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED)
        .context("IP_ADD_MEMBERSHIP")?;

    UdpSocket::from_std(socket.into()).context("failed to convert to tokio UdpSocket")
}

/// Log every local IPv4 interface address. Purely diagnostic: it tells
/// the operator which address receivers should connect to.
pub fn log_interfaces() {
    let addrs = match nix::ifaddrs::getifaddrs() {
        Ok(addrs) => addrs,
        Err(e) => {
            tracing::warn!(error = %e, "failed to enumerate network interfaces");
            return;
        }
    };

    for ifaddr in addrs {
        if let Some(storage) = ifaddr.address {
            if let Some(sin) = storage.as_sockaddr_in() {
                tracing::info!(
                    interface = %ifaddr.interface_name,
                    addr = %sin.ip(),
                    "local interface"
                );
            }
        }
    }
}
