//! Minimal datagram client for talking to the arbiter.

use std::io;
use std::path::Path;

use hangwatch_wire::WireMessage;
use tokio::net::UnixDatagram;

pub struct ArbiterLink {
    sock: UnixDatagram,
}

impl ArbiterLink {
    /// Connect to the arbiter's socket and open the session with a HELLO
    /// carrying the CPU count; the per-CPU sizing is fixed from here on.
    pub async fn connect(path: &Path, cpu_count: u32) -> io::Result<Self> {
        let sock = UnixDatagram::unbound()?;
        sock.connect(path)?;
        let link = Self { sock };
        link.send(&WireMessage::hello(cpu_count)).await?;
        Ok(link)
    }

    pub async fn send(&self, msg: &WireMessage) -> io::Result<()> {
        self.sock.send(&msg.encode()).await.map(drop)
    }
}
