// Copyright 2023 the taproot developers.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! Implementation of the blocking I/O provider.

// NOTE: error handling here is per-scope. A failing receive ends the
// worker (and is logged by the spawning code); a failing *send* over
// UDP is logged and otherwise ignored, so one unreachable client
// cannot stop a worker from serving everyone else. On a TCP
// connection, any I/O error simply ends that connection.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, UdpSocket};
use std::os::fd::AsRawFd;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, error, info};
use nix::sys::socket::{
    self, sockopt, AddressFamily, MsgFlags, SockFlag, SockType, SockaddrStorage,
};

use crate::server::Context;
use crate::zone::Zone;

/// The size of the per-worker UDP receive buffer. Queries are small;
/// anything larger than this is not a query we would answer anyway.
const UDP_RECV_BUF_SIZE: usize = 2048;

/// The largest DNS message a TCP length word can announce.
const MAX_TCP_MESSAGE: usize = u16::MAX as usize;

/// How long a TCP client may take to deliver a full message before
/// the connection is closed (a defense against Slowloris-style
/// abuse). The same limit serves as the idle linger between messages.
const READ_MESSAGE_TIMEOUT: Duration = Duration::from_secs(5);

////////////////////////////////////////////////////////////////////////
// THE PROVIDER                                                       //
////////////////////////////////////////////////////////////////////////

/// Configuration for the [`BlockingIoProvider`].
#[derive(Clone, Copy, Debug)]
pub struct BlockingIoConfig {
    /// The number of UDP worker threads, each with its own
    /// SO_REUSEPORT socket.
    pub udp_workers: usize,

    /// The number of TCP listener threads.
    pub tcp_listeners: usize,
}

impl Default for BlockingIoConfig {
    fn default() -> Self {
        Self {
            udp_workers: 2,
            tcp_listeners: 1,
        }
    }
}

/// A blocking I/O provider.
///
/// Each UDP worker owns a socket bound (with SO_REUSEPORT) to the
/// same address, runs a tight receive/execute/send loop with a reused
/// [`Context`], and transmits each response with a single vectored
/// `sendmsg` — the response segments are never copied into a
/// contiguous buffer. TCP connections get a thread each and reply
/// with ordinary writes.
pub struct BlockingIoProvider {
    config: BlockingIoConfig,
    udp_sockets: Vec<UdpSocket>,
    tcp_listener: Arc<TcpListener>,
}

impl BlockingIoProvider {
    /// Binds the provider's sockets to `addr`. The server does not
    /// start serving until [`BlockingIoProvider::start`] is called.
    pub fn bind(config: BlockingIoConfig, addr: SocketAddr) -> io::Result<Self> {
        let udp_sockets = (0..config.udp_workers.max(1))
            .map(|_| bind_udp_reuseport(addr))
            .collect::<io::Result<Vec<_>>>()?;
        let tcp_listener = Arc::new(TcpListener::bind(addr)?);
        Ok(Self {
            config,
            udp_sockets,
            tcp_listener,
        })
    }

    /// Starts the worker threads and returns. The threads run (and
    /// serve from `zone`) for the rest of the process lifetime.
    pub fn start(self, zone: &Arc<Zone>) -> io::Result<()> {
        for (i, udp_socket) in self.udp_sockets.into_iter().enumerate() {
            let zone = zone.clone();
            thread::Builder::new()
                .name(format!("udp worker {}", i))
                .spawn(move || {
                    if let Err(e) = run_udp_worker(&zone, &udp_socket) {
                        error!("UDP worker exited: {}", e);
                    }
                })?;
        }
        for i in 0..self.config.tcp_listeners.max(1) {
            let zone = zone.clone();
            let tcp_listener = self.tcp_listener.clone();
            thread::Builder::new()
                .name(format!("tcp listener {}", i))
                .spawn(move || {
                    if let Err(e) = run_tcp_listener(&zone, &tcp_listener) {
                        error!("TCP listener exited: {}", e);
                    }
                })?;
        }
        info!("I/O workers started.");
        Ok(())
    }
}

/// Creates a UDP socket with SO_REUSEPORT set before binding, so that
/// several workers can share one address and the kernel distributes
/// received datagrams between them.
fn bind_udp_reuseport(addr: SocketAddr) -> io::Result<UdpSocket> {
    let family = if addr.is_ipv4() {
        AddressFamily::Inet
    } else {
        AddressFamily::Inet6
    };
    let fd = socket::socket(family, SockType::Datagram, SockFlag::empty(), None)?;
    socket::setsockopt(&fd, sockopt::ReusePort, &true)?;
    socket::bind(fd.as_raw_fd(), &SockaddrStorage::from(addr))?;
    Ok(UdpSocket::from(fd))
}

////////////////////////////////////////////////////////////////////////
// UDP                                                                //
////////////////////////////////////////////////////////////////////////

/// The receive/execute/send loop of a UDP worker.
fn run_udp_worker(zone: &Zone, udp_socket: &UdpSocket) -> io::Result<()> {
    let mut context = Context::new(zone);
    let mut buf = [0; UDP_RECV_BUF_SIZE];
    loop {
        let (len, peer) = match udp_socket.recv_from(&mut buf) {
            Ok(received) => received,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        if let Some(response) = context.execute(&buf[..len], false) {
            let slices = response.io_slices();
            let addr = SockaddrStorage::from(peer);
            let sent = socket::sendmsg(
                udp_socket.as_raw_fd(),
                &slices,
                &[],
                MsgFlags::empty(),
                Some(&addr),
            );
            if let Err(e) = sent {
                debug!("failed to send UDP response to {}: {}", peer, e);
            }
        }
    }
}

////////////////////////////////////////////////////////////////////////
// TCP                                                                //
////////////////////////////////////////////////////////////////////////

/// The accept loop of a TCP listener thread.
fn run_tcp_listener(zone: &Arc<Zone>, tcp_listener: &TcpListener) -> io::Result<()> {
    loop {
        let (stream, peer) = match tcp_listener.accept() {
            Ok(accepted) => accepted,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        let zone = zone.clone();
        let spawned = thread::Builder::new()
            .name(format!("tcp {}", peer))
            .spawn(move || {
                if let Err(e) = handle_tcp_connection(&zone, stream) {
                    debug!("TCP connection with {} ended: {}", peer, e);
                }
            });
        if let Err(e) = spawned {
            error!("failed to spawn a TCP connection thread: {}", e);
        }
    }
}

/// Serves one TCP connection: length-framed messages in, responses
/// out, until EOF, a timeout, or a message the DNS core drops.
fn handle_tcp_connection(zone: &Zone, mut stream: TcpStream) -> io::Result<()> {
    stream.set_read_timeout(Some(READ_MESSAGE_TIMEOUT))?;
    stream.set_nodelay(true)?;
    let mut context = Context::new(zone);
    let mut buf = vec![0; 2 + MAX_TCP_MESSAGE];
    loop {
        // A clean EOF at a message boundary ends the connection.
        match stream.read_exact(&mut buf[..2]) {
            Ok(()) => (),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(e),
        }
        let length = u16::from_be_bytes([buf[0], buf[1]]) as usize;
        stream.read_exact(&mut buf[2..2 + length])?;

        match context.execute(&buf[..2 + length], true) {
            Some(response) => {
                for slice in response.io_slices() {
                    stream.write_all(&slice)?;
                }
            }
            // A dropped message drops the connection too.
            None => return Ok(()),
        }
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    fn test_zone() -> Zone {
        const ZONE: &str = "\
. 86400 IN SOA a.root-servers.test. nstld.example.test. 2023112201 1800 900 604800 86400
. 518400 IN NS a.root-servers.test.
a.root-servers.test. 518400 IN A 198.51.100.1
aaa. 172800 IN NS ns1.aaa.
ns1.aaa. 172800 IN A 192.0.2.1
";
        Zone::from_reader(ZONE.as_bytes()).unwrap()
    }

    #[test]
    fn reuseport_sockets_share_an_address() {
        let first = bind_udp_reuseport("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = first.local_addr().unwrap();
        let second = bind_udp_reuseport(addr).unwrap();
        assert_eq!(second.local_addr().unwrap(), addr);
    }

    #[test]
    fn udp_round_trip() {
        let zone = Arc::new(test_zone());
        let provider = BlockingIoProvider::bind(
            BlockingIoConfig {
                udp_workers: 1,
                tcp_listeners: 1,
            },
            "127.0.0.1:0".parse().unwrap(),
        )
        .unwrap();
        let server_addr = provider.udp_sockets[0].local_addr().unwrap();
        provider.start(&zone).unwrap();

        // A root SOA query, no EDNS.
        let query = b"\xab\xcd\x00\x00\x00\x01\x00\x00\x00\x00\x00\x00\
                      \x00\x00\x06\x00\x01";
        let client = UdpSocket::bind("127.0.0.1:0").unwrap();
        client
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        client.send_to(query, server_addr).unwrap();

        let mut response = [0; UDP_RECV_BUF_SIZE];
        let (len, _) = client.recv_from(&mut response).unwrap();
        assert!(len >= 17);
        // The ID is echoed and QR is set.
        assert_eq!(&response[0..2], b"\xab\xcd");
        assert!(response[2] & 0x80 != 0);
        // One SOA record in the answer section.
        assert_eq!(&response[4..8], b"\x00\x01\x00\x01");
    }

    #[test]
    fn tcp_round_trip() {
        let zone = Arc::new(test_zone());
        let provider = BlockingIoProvider::bind(
            BlockingIoConfig {
                udp_workers: 1,
                tcp_listeners: 1,
            },
            "127.0.0.1:0".parse().unwrap(),
        )
        .unwrap();
        let server_addr = provider.tcp_listener.local_addr().unwrap();
        provider.start(&zone).unwrap();

        let query = b"\x00\x11\
                      \xab\xce\x00\x00\x00\x01\x00\x00\x00\x00\x00\x00\
                      \x00\x00\x06\x00\x01";
        let mut client = TcpStream::connect(server_addr).unwrap();
        client
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        client.write_all(query).unwrap();

        let mut length = [0; 2];
        client.read_exact(&mut length).unwrap();
        let length = u16::from_be_bytes(length) as usize;
        let mut response = vec![0; length];
        client.read_exact(&mut response).unwrap();
        assert_eq!(&response[0..2], b"\xab\xce");
        assert!(response[2] & 0x80 != 0);
    }
}
