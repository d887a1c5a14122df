//! Binary codec for the sampler→arbiter datagrams.
//!
//! Layout is driven by the first byte (the classification code); the rest of
//! the frame is a fixed, kind-specific payload sized by the CPU count agreed
//! at handshake. Decoding is exact-length: a frame that is a byte short or a
//! byte long is rejected rather than guessed at.

use bytes::{Buf, BufMut};
use thiserror::Error;

use crate::MetricsSnapshot;

/// Classification codes as they appear on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Classification {
    None = 0,
    CpuError = 1,
    MemError = 2,
    ProcError = 3,
    Hello = 4,
}

impl Classification {
    pub fn code(self) -> u8 {
        self as u8
    }

    fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::None),
            1 => Some(Self::CpuError),
            2 => Some(Self::MemError),
            3 => Some(Self::ProcError),
            4 => Some(Self::Hello),
            _ => None,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("empty datagram")]
    Empty,
    #[error("unknown classification code {0}")]
    UnknownCode(u8),
    #[error("{kind:?} payload is {got} bytes, expected {want} for {cpus} cpus")]
    Length {
        kind: Classification,
        got: usize,
        want: usize,
        cpus: u32,
    },
}

/// One core's sys/usr pair as carried by a CPU_ERROR payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuSample {
    pub sys: u8,
    pub usr: u8,
}

/// The unit on the wire: exactly one per cadence, heartbeat included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireMessage {
    /// Nothing anomalous this cadence; rearms the arbiter's timer.
    Heartbeat,
    /// Opens the session and fixes the per-CPU sizing for its lifetime.
    Hello { cpu_count: u8 },
    /// Per-core sys/usr, in core-index order.
    CpuError { per_cpu: Vec<CpuSample> },
    /// Per-core iowait plus the packed memory fields.
    MemError {
        iowait: Vec<u8>,
        blocked: u8,
        swap_out: u16,
        free_kb: u32,
    },
    ProcError { runnable: u8, blocked: u8 },
}

/// Fixed tail of a MEM_ERROR payload: u8 blocked + u16 swap-out + u24 free-kb.
const MEM_TAIL: usize = 6;

fn sat8(v: u32) -> u8 {
    v.min(u8::MAX as u32) as u8
}

fn sat16(v: u32) -> u16 {
    v.min(u16::MAX as u32) as u16
}

fn sat24(v: u32) -> u32 {
    v.min(0x00FF_FFFF)
}

impl WireMessage {
    /// Frame capacity sufficient for any classification at this CPU count,
    /// code byte included. Computed once at handshake by both sides.
    pub const fn max_encoded_len(cpu_count: u32) -> usize {
        let n = cpu_count as usize;
        let a = 8 + n;
        let b = 2 + 2 * n;
        if a > b {
            a
        } else {
            b
        }
    }

    pub fn classification(&self) -> Classification {
        match self {
            Self::Heartbeat => Classification::None,
            Self::Hello { .. } => Classification::Hello,
            Self::CpuError { .. } => Classification::CpuError,
            Self::MemError { .. } => Classification::MemError,
            Self::ProcError { .. } => Classification::ProcError,
        }
    }

    pub fn hello(cpu_count: u32) -> Self {
        Self::Hello {
            cpu_count: sat8(cpu_count),
        }
    }

    pub fn cpu_error(m: &MetricsSnapshot) -> Self {
        Self::CpuError {
            per_cpu: m
                .per_cpu
                .iter()
                .map(|c| CpuSample {
                    sys: sat8(c.sys),
                    usr: sat8(c.usr),
                })
                .collect(),
        }
    }

    pub fn mem_error(m: &MetricsSnapshot) -> Self {
        Self::MemError {
            iowait: m.per_cpu.iter().map(|c| sat8(c.iowait)).collect(),
            blocked: sat8(m.blocked_count),
            swap_out: sat16(m.swap_out_rate),
            free_kb: sat24(m.free_memory_kb),
        }
    }

    pub fn proc_error(m: &MetricsSnapshot) -> Self {
        Self::ProcError {
            runnable: sat8(m.runnable_count),
            blocked: sat8(m.blocked_count),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::max_encoded_len(match self {
            Self::CpuError { per_cpu } => per_cpu.len() as u32,
            Self::MemError { iowait, .. } => iowait.len() as u32,
            _ => 0,
        }));
        buf.put_u8(self.classification().code());
        match self {
            Self::Heartbeat => {}
            Self::Hello { cpu_count } => buf.put_u8(*cpu_count),
            Self::CpuError { per_cpu } => {
                for c in per_cpu {
                    buf.put_u8(c.sys);
                    buf.put_u8(c.usr);
                }
            }
            Self::MemError {
                iowait,
                blocked,
                swap_out,
                free_kb,
            } => {
                for w in iowait {
                    buf.put_u8(*w);
                }
                buf.put_u8(*blocked);
                buf.put_u16_le(*swap_out);
                buf.put_uint_le(*free_kb as u64, 3);
            }
            Self::ProcError { runnable, blocked } => {
                buf.put_u8(*runnable);
                buf.put_u8(*blocked);
            }
        }
        buf
    }

    /// Decode one datagram. `cpu_count` is the session's count fixed at
    /// handshake (HELLO itself ignores it); a payload implying any other
    /// count is a `Length` error.
    pub fn decode(frame: &[u8], cpu_count: u32) -> Result<Self, WireError> {
        let (&code, payload) = frame.split_first().ok_or(WireError::Empty)?;
        let kind = Classification::from_code(code).ok_or(WireError::UnknownCode(code))?;
        let n = cpu_count as usize;
        let want = match kind {
            Classification::None => 0,
            Classification::Hello => 1,
            Classification::CpuError => 2 * n,
            Classification::MemError => n + MEM_TAIL,
            Classification::ProcError => 2,
        };
        if payload.len() != want {
            return Err(WireError::Length {
                kind,
                got: payload.len(),
                want,
                cpus: cpu_count,
            });
        }

        let mut buf = payload;
        Ok(match kind {
            Classification::None => Self::Heartbeat,
            Classification::Hello => Self::Hello {
                cpu_count: buf.get_u8(),
            },
            Classification::CpuError => Self::CpuError {
                per_cpu: (0..n)
                    .map(|_| CpuSample {
                        sys: buf.get_u8(),
                        usr: buf.get_u8(),
                    })
                    .collect(),
            },
            Classification::MemError => Self::MemError {
                iowait: (0..n).map(|_| buf.get_u8()).collect(),
                blocked: buf.get_u8(),
                swap_out: buf.get_u16_le(),
                free_kb: buf.get_uint_le(3) as u32,
            },
            Classification::ProcError => Self::ProcError {
                runnable: buf.get_u8(),
                blocked: buf.get_u8(),
            },
        })
    }
}
