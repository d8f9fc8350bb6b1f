//! C9: upstream pipe pump (spec §4.4).
//!
//! Moves bytes from an upstream connection to the downstream client (and,
//! for request bodies, the reverse direction) without blocking the reactor
//! thread. The source's pump is a tight loop of `read_upstream` /
//! `write_to_downstream` that backs off to a temp file once the downstream
//! side falls behind by more than a configured watermark, then drains the
//! temp file once the client catches up. `AGAIN` (EWOULDBLOCK) just returns
//! control to the reactor; there is no thread-offload step here because
//! every read/write in this crate already happens on non-blocking sockets
//! registered with `mio`, so "AGAIN" and "re-entry" collapse into the normal
//! readable/writable event cycle.

use crate::pipe::buffer::Chain;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::time::Instant;

/// Bytes buffered in memory before pump starts spilling to disk.
pub const MEMORY_WATERMARK: usize = 256 * 1024;

#[derive(Debug)]
pub enum PipeError {
    Upstream(io::Error),
    Downstream(io::Error),
    Spillover(io::Error),
}

impl std::fmt::Display for PipeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipeError::Upstream(e) => write!(f, "upstream read failed: {e}"),
            PipeError::Downstream(e) => write!(f, "downstream write failed: {e}"),
            PipeError::Spillover(e) => write!(f, "spillover file failed: {e}"),
        }
    }
}
impl std::error::Error for PipeError {}

#[derive(Debug, PartialEq, Eq)]
pub enum PumpOutcome {
    /// Made progress but neither side is done; reactor should keep polling
    /// both readable and writable interest.
    Progress,
    /// Upstream hit EOF and every buffered byte reached the downstream.
    Done,
    /// Upstream or downstream returned `WouldBlock`; nothing more to do
    /// until the next readiness event.
    Again,
}

/// A single upstream<->downstream byte pump, optionally rate-limited and
/// backed by a spillover file once its in-memory chain crosses
/// `MEMORY_WATERMARK`.
pub struct UpstreamPipe {
    chain: Chain,
    spill: Option<File>,
    spill_write_pos: u64,
    spill_read_pos: u64,
    upstream_eof: bool,
    rate_limit_bytes_per_sec: Option<u64>,
    window_start: Instant,
    window_sent: u64,
}

impl UpstreamPipe {
    pub fn new(rate_limit_bytes_per_sec: Option<u64>) -> Self {
        Self {
            chain: Chain::new(),
            spill: None,
            spill_write_pos: 0,
            spill_read_pos: 0,
            upstream_eof: false,
            rate_limit_bytes_per_sec,
            window_start: Instant::now(),
            window_sent: 0,
        }
    }

    pub fn is_drained(&self) -> bool {
        self.upstream_eof && self.chain.is_empty() && self.spill.is_none()
    }

    fn buffered_len(&self) -> u64 {
        self.chain.len() as u64 + (self.spill_write_pos - self.spill_read_pos)
    }

    /// Reads as much as is available from `upstream` into the pending chain,
    /// spilling to a temp file once `MEMORY_WATERMARK` worth of data is
    /// buffered ahead of the downstream side.
    pub fn read_upstream<R: Read>(&mut self, upstream: &mut R) -> Result<PumpOutcome, PipeError> {
        if self.upstream_eof {
            return Ok(PumpOutcome::Again);
        }

        let mut buf = [0u8; 16 * 1024];
        loop {
            match upstream.read(&mut buf) {
                Ok(0) => {
                    self.upstream_eof = true;
                    return Ok(PumpOutcome::Progress);
                }
                Ok(n) => {
                    self.buffer_bytes(&buf[..n])?;
                    if self.buffered_len() as usize >= MEMORY_WATERMARK {
                        return Ok(PumpOutcome::Progress);
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(PumpOutcome::Again),
                Err(e) => return Err(PipeError::Upstream(e)),
            }
        }
    }

    fn buffer_bytes(&mut self, bytes: &[u8]) -> Result<(), PipeError> {
        if self.spill.is_none() && self.chain.len() + bytes.len() <= MEMORY_WATERMARK {
            self.chain.push_bytes(bytes);
            return Ok(());
        }
        let file = match &mut self.spill {
            Some(f) => f,
            None => {
                let f = tempfile::tempfile().map_err(PipeError::Spillover)?;
                self.spill = Some(f);
                self.spill.as_mut().unwrap()
            }
        };
        file.seek(SeekFrom::Start(self.spill_write_pos))
            .map_err(PipeError::Spillover)?;
        file.write_all(bytes).map_err(PipeError::Spillover)?;
        self.spill_write_pos += bytes.len() as u64;
        Ok(())
    }

    /// Drains whatever is buffered (memory chain first, then spillover) to
    /// `downstream`, respecting the configured rate limit.
    pub fn write_to_downstream<W: Write>(&mut self, downstream: &mut W) -> Result<PumpOutcome, PipeError> {
        let allowance = self.rate_allowance();
        let mut sent_this_call = 0u64;

        loop {
            if allowance.map(|a| sent_this_call >= a).unwrap_or(false) {
                return Ok(PumpOutcome::Again);
            }

            if !self.chain.is_empty() {
                let mut buf = vec![0u8; self.chain.len().min(16 * 1024)];
                let n = self.chain.copy_to(&mut buf);
                match downstream.write(&buf[..n]) {
                    Ok(0) => return Ok(PumpOutcome::Again),
                    Ok(written) => {
                        self.chain.consume(written);
                        sent_this_call += written as u64;
                        self.window_sent += written as u64;
                        continue;
                    }
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(PumpOutcome::Again),
                    Err(e) => return Err(PipeError::Downstream(e)),
                }
            }

            if let Some(file) = &mut self.spill {
                if self.spill_read_pos < self.spill_write_pos {
                    let remaining = (self.spill_write_pos - self.spill_read_pos).min(16 * 1024) as usize;
                    let mut buf = vec![0u8; remaining];
                    file.seek(SeekFrom::Start(self.spill_read_pos)).map_err(PipeError::Spillover)?;
                    file.read_exact(&mut buf).map_err(PipeError::Spillover)?;
                    match downstream.write(&buf) {
                        Ok(0) => return Ok(PumpOutcome::Again),
                        Ok(written) => {
                            self.spill_read_pos += written as u64;
                            sent_this_call += written as u64;
                            self.window_sent += written as u64;
                            continue;
                        }
                        Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(PumpOutcome::Again),
                        Err(e) => return Err(PipeError::Downstream(e)),
                    }
                } else {
                    // Fully drained: rewind so a future burst can reuse the
                    // same file instead of growing it unboundedly.
                    self.spill = None;
                    self.spill_write_pos = 0;
                    self.spill_read_pos = 0;
                }
            }

            break;
        }

        if self.is_drained() {
            Ok(PumpOutcome::Done)
        } else {
            Ok(PumpOutcome::Progress)
        }
    }

    fn rate_allowance(&mut self) -> Option<u64> {
        let limit = self.rate_limit_bytes_per_sec?;
        if self.window_start.elapsed().as_secs() >= 1 {
            self.window_start = Instant::now();
            self.window_sent = 0;
        }
        Some(limit.saturating_sub(self.window_sent))
    }

    /// One iteration of the pump: read whatever upstream has ready, then
    /// push whatever is buffered to downstream. Mirrors the source's
    /// `pump(p, do_write)` driving loop, called once per readable/writable
    /// event on either side.
    pub fn pump<R: Read, W: Write>(&mut self, upstream: &mut R, downstream: &mut W) -> Result<PumpOutcome, PipeError> {
        let read_outcome = self.read_upstream(upstream)?;
        let write_outcome = self.write_to_downstream(downstream)?;

        Ok(match (read_outcome, write_outcome) {
            (_, PumpOutcome::Done) => PumpOutcome::Done,
            (PumpOutcome::Again, PumpOutcome::Again) => PumpOutcome::Again,
            _ => PumpOutcome::Progress,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn pump_moves_bytes_end_to_end() {
        let mut pipe = UpstreamPipe::new(None);
        let mut upstream = Cursor::new(b"hello upstream".to_vec());
        let mut downstream = Vec::new();

        loop {
            match pipe.pump(&mut upstream, &mut downstream).unwrap() {
                PumpOutcome::Done => break,
                PumpOutcome::Again => panic!("should not block against in-memory cursors"),
                PumpOutcome::Progress => continue,
            }
        }

        assert_eq!(downstream, b"hello upstream");
        assert!(pipe.is_drained());
    }

    #[test]
    fn spillover_kicks_in_past_watermark() {
        let mut pipe = UpstreamPipe::new(None);
        let payload = vec![7u8; MEMORY_WATERMARK + 1024];
        pipe.buffer_bytes(&payload).unwrap();
        assert!(pipe.spill.is_some());

        let mut downstream = Vec::new();
        loop {
            match pipe.write_to_downstream(&mut downstream).unwrap() {
                PumpOutcome::Again => break,
                PumpOutcome::Done | PumpOutcome::Progress => {
                    if pipe.chain.is_empty() && pipe.spill.is_none() {
                        break;
                    }
                }
            }
        }
        assert_eq!(downstream, payload);
    }

    #[test]
    fn rate_limit_caps_bytes_per_call() {
        let mut pipe = UpstreamPipe::new(Some(10));
        pipe.buffer_bytes(b"0123456789abcdef").unwrap();
        let mut downstream = Vec::new();
        let outcome = pipe.write_to_downstream(&mut downstream).unwrap();
        assert_eq!(outcome, PumpOutcome::Again);
        assert_eq!(downstream.len(), 10);
    }
}
