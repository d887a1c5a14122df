//! Datagram server side of the sampler channel. The arbiter only ever
//! listens; the sampler initiates.

use std::io;
use std::path::{Path, PathBuf};

use hangwatch_wire::WireMessage;
use tokio::net::UnixDatagram;

/// Enough for any classification at the 255-cpu ceiling of the handshake.
const MAX_DATAGRAM: usize = WireMessage::max_encoded_len(u8::MAX as u32);

pub struct SamplerChannel {
    sock: UnixDatagram,
    path: PathBuf,
    buf: Vec<u8>,
}

impl SamplerChannel {
    pub fn bind(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        // a stale socket file from a previous run would fail the bind
        match std::fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        let sock = UnixDatagram::bind(path)?;
        Ok(Self {
            sock,
            path: path.to_path_buf(),
            buf: vec![0u8; MAX_DATAGRAM],
        })
    }

    pub async fn recv(&mut self) -> io::Result<&[u8]> {
        let n = self.sock.recv(&mut self.buf).await?;
        Ok(&self.buf[..n])
    }
}

impl Drop for SamplerChannel {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}
