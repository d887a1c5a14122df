//! Incremental parser for the sar metric stream.
//!
//! sar prints a banner, then one block of labeled sections per cadence:
//! per-CPU utilization rows, context switches, swapping, memory, run/block
//! queues. Rows are prefixed with a clock column and sections are separated
//! by blank lines. Per-core rows are matched by the core index embedded in
//! the row, not by position, since the source may omit or reorder them.

use hangwatch_wire::{CpuLoad, MetricsSnapshot};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};

/// Lines sar prints before the first cadence (kernel/host banner + blank).
const BANNER_LINES: usize = 2;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("metric source closed before the banner was read")]
    TruncatedBanner,
    #[error("cadence ended without a {0} section")]
    MissingSection(&'static str),
    #[error("core index {idx} out of range for {cpus} cpus")]
    CoreIndex { idx: usize, cpus: u32 },
    #[error("unparsable {section} row: {line:?}")]
    BadRow { section: &'static str, line: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Idle,
    Cpu,
    ContextSwitch,
    Swap,
    Memory,
    Queue,
}

/// Pulls `MetricsSnapshot`s off a sar stdout stream, one per cadence.
pub struct SarStream<R> {
    lines: Lines<R>,
    cpu_count: u32,
}

impl<R: AsyncBufRead + Unpin> SarStream<R> {
    pub fn new(reader: R, cpu_count: u32) -> Self {
        Self {
            lines: reader.lines(),
            cpu_count,
        }
    }

    /// Discard the banner. Must be called once before the first snapshot.
    pub async fn prime(&mut self) -> Result<(), ParseError> {
        for _ in 0..BANNER_LINES {
            if self.lines.next_line().await?.is_none() {
                return Err(ParseError::TruncatedBanner);
            }
        }
        Ok(())
    }

    /// Assemble the next full cadence. `Ok(None)` on clean end of stream.
    /// A failed cadence is reported as an error and the stream stays usable:
    /// the next call resynchronizes on the following per-CPU header.
    pub async fn next_snapshot(&mut self) -> Result<Option<MetricsSnapshot>, ParseError> {
        let mut cadence = Cadence::new(self.cpu_count);
        let mut section = Section::Idle;

        while let Some(line) = self.lines.next_line().await? {
            let line = line.trim_end();
            if line.is_empty() || line.starts_with("Average:") {
                section = Section::Idle;
                continue;
            }
            let fields = data_fields(line);
            if let Some(header) = header_for(&fields) {
                if header == Section::Cpu {
                    // a per-CPU header always opens a fresh cadence
                    cadence = Cadence::new(self.cpu_count);
                }
                section = header;
                continue;
            }
            match section {
                Section::Idle => {}
                Section::Cpu => cadence.cpu_row(&fields, line)?,
                Section::ContextSwitch => cadence.cswch_row(&fields, line)?,
                Section::Swap => cadence.swap_row(&fields, line)?,
                Section::Memory => cadence.memory_row(&fields, line)?,
                Section::Queue => {
                    cadence.queue_row(&fields, line)?;
                    return cadence.finish().map(Some);
                }
            }
        }
        Ok(None)
    }
}

/// Row fields with the leading clock column(s) stripped.
fn data_fields(line: &str) -> Vec<&str> {
    line.split_whitespace()
        .skip_while(|f| f.contains(':') || *f == "AM" || *f == "PM")
        .collect()
}

fn header_for(fields: &[&str]) -> Option<Section> {
    for f in fields {
        match *f {
            "%usr" | "%user" => return Some(Section::Cpu),
            "cswch/s" => return Some(Section::ContextSwitch),
            "pswpout/s" => return Some(Section::Swap),
            "kbmemfree" => return Some(Section::Memory),
            "runq-sz" | "runq_sz" => return Some(Section::Queue),
            _ => {}
        }
    }
    None
}

/// sar prints percentages and rates as floats; the snapshot keeps whole
/// numbers, truncated.
fn as_count(tok: &str) -> Option<u32> {
    let v = tok.parse::<f64>().ok()?;
    if v < 0.0 {
        return None;
    }
    Some(v as u32)
}

struct Cadence {
    cpu_count: u32,
    per_cpu: Vec<CpuLoad>,
    saw_cpu_row: bool,
    context_switch_rate: Option<u32>,
    swap_out_rate: Option<u32>,
    free_memory_kb: Option<u32>,
    queues: Option<(u32, u32)>,
}

impl Cadence {
    fn new(cpu_count: u32) -> Self {
        Self {
            cpu_count,
            per_cpu: vec![CpuLoad::default(); cpu_count as usize],
            saw_cpu_row: false,
            context_switch_rate: None,
            swap_out_rate: None,
            free_memory_kb: None,
            queues: None,
        }
    }

    /// `<core> %usr %nice %sys %iowait ...`; the `all` aggregate is skipped.
    fn cpu_row(&mut self, fields: &[&str], line: &str) -> Result<(), ParseError> {
        if fields.first() == Some(&"all") {
            return Ok(());
        }
        let bad = || ParseError::BadRow {
            section: "cpu",
            line: line.to_string(),
        };
        let idx = fields
            .first()
            .and_then(|f| f.parse::<usize>().ok())
            .ok_or_else(bad)?;
        if idx >= self.per_cpu.len() {
            return Err(ParseError::CoreIndex {
                idx,
                cpus: self.cpu_count,
            });
        }
        let usr = fields.get(1).and_then(|f| as_count(f)).ok_or_else(bad)?;
        let sys = fields.get(3).and_then(|f| as_count(f)).ok_or_else(bad)?;
        let iowait = fields.get(4).and_then(|f| as_count(f)).ok_or_else(bad)?;
        self.per_cpu[idx] = CpuLoad { usr, sys, iowait };
        self.saw_cpu_row = true;
        Ok(())
    }

    /// `proc/s cswch/s` data row; the second column is the one we keep.
    fn cswch_row(&mut self, fields: &[&str], line: &str) -> Result<(), ParseError> {
        self.context_switch_rate =
            Some(fields.get(1).and_then(|f| as_count(f)).ok_or_else(|| {
                ParseError::BadRow {
                    section: "context-switch",
                    line: line.to_string(),
                }
            })?);
        Ok(())
    }

    /// `pswpin/s pswpout/s` data row.
    fn swap_row(&mut self, fields: &[&str], line: &str) -> Result<(), ParseError> {
        self.swap_out_rate = Some(fields.get(1).and_then(|f| as_count(f)).ok_or_else(|| {
            ParseError::BadRow {
                section: "swap",
                line: line.to_string(),
            }
        })?);
        Ok(())
    }

    /// `kbmemfree ...` data row; free memory is the first column.
    fn memory_row(&mut self, fields: &[&str], line: &str) -> Result<(), ParseError> {
        self.free_memory_kb = Some(fields.first().and_then(|f| as_count(f)).ok_or_else(|| {
            ParseError::BadRow {
                section: "memory",
                line: line.to_string(),
            }
        })?);
        Ok(())
    }

    /// `runq-sz plist-sz ldavg-1 ldavg-5 ldavg-15 blocked` data row.
    fn queue_row(&mut self, fields: &[&str], line: &str) -> Result<(), ParseError> {
        let bad = || ParseError::BadRow {
            section: "queue",
            line: line.to_string(),
        };
        let run = fields.first().and_then(|f| as_count(f)).ok_or_else(bad)?;
        let blocked = fields.get(5).and_then(|f| as_count(f)).ok_or_else(bad)?;
        self.queues = Some((run, blocked));
        Ok(())
    }

    fn finish(self) -> Result<MetricsSnapshot, ParseError> {
        if !self.saw_cpu_row {
            return Err(ParseError::MissingSection("cpu"));
        }
        let context_switch_rate = self
            .context_switch_rate
            .ok_or(ParseError::MissingSection("context-switch"))?;
        let swap_out_rate = self
            .swap_out_rate
            .ok_or(ParseError::MissingSection("swap"))?;
        let free_memory_kb = self
            .free_memory_kb
            .ok_or(ParseError::MissingSection("memory"))?;
        let (runnable_count, blocked_count) =
            self.queues.ok_or(ParseError::MissingSection("queue"))?;
        Ok(MetricsSnapshot {
            cpu_count: self.cpu_count,
            per_cpu: self.per_cpu,
            context_switch_rate,
            swap_out_rate,
            free_memory_kb,
            runnable_count,
            blocked_count,
        })
    }
}
