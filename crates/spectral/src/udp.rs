//! UDP socket setup and the per-peer send half.

use crate::error::Error;
use crate::protocol::{RECEIVE_BUFFER_SIZE, SEND_BUFFER_SIZE};
use log::debug;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;

/// Send half of a connection: the (possibly shared) socket plus the peer
/// address. Listener-owned sockets are shared by many connections and are
/// never closed from here; a dialer's socket dies with its connection's last
/// reference.
#[derive(Debug, Clone)]
pub(crate) struct UdpConn {
    socket: Arc<UdpSocket>,
    peer: SocketAddr,
}

impl UdpConn {
    pub fn new(socket: Arc<UdpSocket>, peer: SocketAddr) -> Self {
        Self { socket, peer }
    }

    /// Writes one datagram. An oversized-datagram rejection from the host is
    /// not an error: MTU probes above the path MTU are expected to vanish.
    pub async fn send(&self, p: &[u8]) -> Result<(), Error> {
        match self.socket.send_to(p, self.peer).await {
            Ok(_) => Ok(()),
            Err(e) if is_msg_size_err(&e) => {
                debug!("dropped oversized datagram ({} bytes) to {}", p.len(), self.peer);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}

/// Binds a UDP socket with the transport's buffer sizes and, where the OS
/// supports it, don't-fragment behaviour for MTU discovery. The second
/// return value reports whether MTU discovery may probe.
pub(crate) fn bind(addr: SocketAddr) -> io::Result<(UdpSocket, bool)> {
    let socket = std::net::UdpSocket::bind(addr)?;
    let mtud = set_socket_opts(&socket);
    socket.set_nonblocking(true)?;
    Ok((UdpSocket::from_std(socket)?, mtud))
}

#[cfg(unix)]
fn set_socket_opts(socket: &std::net::UdpSocket) -> bool {
    use std::os::fd::AsRawFd;

    let fd = socket.as_raw_fd();
    set_opt(fd, libc::SOL_SOCKET, libc::SO_RCVBUF, RECEIVE_BUFFER_SIZE as libc::c_int);
    set_opt(fd, libc::SOL_SOCKET, libc::SO_SNDBUF, SEND_BUFFER_SIZE as libc::c_int);
    set_mtu_discover(fd)
}

#[cfg(unix)]
fn set_opt(fd: libc::c_int, level: libc::c_int, name: libc::c_int, value: libc::c_int) -> bool {
    let result = unsafe {
        libc::setsockopt(
            fd,
            level,
            name,
            std::ptr::from_ref(&value).cast(),
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    result == 0
}

#[cfg(target_os = "linux")]
fn set_mtu_discover(fd: libc::c_int) -> bool {
    set_opt(fd, libc::IPPROTO_IP, libc::IP_MTU_DISCOVER, libc::IP_PMTUDISC_DO)
}

#[cfg(all(unix, not(target_os = "linux")))]
fn set_mtu_discover(_fd: libc::c_int) -> bool {
    false
}

#[cfg(not(unix))]
fn set_socket_opts(_socket: &std::net::UdpSocket) -> bool {
    false
}

#[cfg(unix)]
fn is_msg_size_err(e: &io::Error) -> bool {
    e.raw_os_error() == Some(libc::EMSGSIZE)
}

#[cfg(not(unix))]
fn is_msg_size_err(_e: &io::Error) -> bool {
    false
}
