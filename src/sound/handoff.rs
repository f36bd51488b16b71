//! Threaded chunk handoff
//!
//! [`spawn_scanner`] walks the chunk list on a worker thread and hands each
//! chunk to the caller as a [`SharedChunk`]. The worker does not touch the
//! stream again until that chunk is released (dropped or
//! [`SharedChunk::release`]d); [`HandoffConfig`] bounds the wait.
//!
//! The description chunk is decoded on the worker and published through
//! [`ScanHandle::description`] instead of being handed over.

use std::io::{self, Read, Seek};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use parking_lot::{Mutex, RwLock};

use super::caf;
use super::chunk::ChunkHeader;
use super::decoder::DecoderOptions;
use super::endian::{self, Endian};
use super::error::{ContainerError, Result};
use super::formats::{Container, Dialect, StreamMetadata};
use super::fourcc::{ChunkRole, FourCC};
use super::scanner::{self, ChunkScanner};

pub const DEFAULT_HANDOFF_TIMEOUT: Duration = Duration::from_secs(2);

/// How often an idle worker checks for a stop request
const SEND_POLL: Duration = Duration::from_millis(20);

/// What the worker does when a chunk is not released in time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeoutPolicy {
    /// Stop scanning with `ConsumerTimeout`
    #[default]
    Fail,
    /// Log a warning and wait again, at most `max_attempts` more times
    Retry { max_attempts: Option<u32> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandoffConfig {
    /// How long the worker waits for each chunk to be released
    pub timeout: Duration,
    pub policy: TimeoutPolicy,
}

impl Default for HandoffConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_HANDOFF_TIMEOUT,
            policy: TimeoutPolicy::Fail,
        }
    }
}

/// Totals reported when the worker finishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScanSummary {
    /// Chunks handed to the consumer
    pub chunks: usize,
    pub description_found: bool,
}

/// `Read + Seek` over the stream shared with released chunks
struct SharedReader<R>(Arc<Mutex<R>>);

impl<R: Read> Read for SharedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.lock().read(buf)
    }
}

impl<R: Seek> Seek for SharedReader<R> {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        self.0.lock().seek(pos)
    }
}

/// A chunk on loan from the scanning thread
///
/// Reads are bounded by the chunk's declared size. Dropping the chunk drains
/// what is left of the payload and tells the worker it may continue.
pub struct SharedChunk<R: Read> {
    header: ChunkHeader,
    reader: Arc<Mutex<R>>,
    order: Endian,
    pos: u64,
    release: Option<Sender<u64>>,
}

impl<R: Read> SharedChunk<R> {
    pub fn header(&self) -> &ChunkHeader {
        &self.header
    }

    pub fn id(&self) -> FourCC {
        self.header.id
    }

    /// Declared payload size (`u64::MAX` for a run-to-end chunk)
    pub fn size(&self) -> u64 {
        self.header.len()
    }

    pub fn position(&self) -> u64 {
        self.pos
    }

    pub fn remaining(&self) -> u64 {
        self.header.len().saturating_sub(self.pos)
    }

    pub fn byte_order(&self) -> Endian {
        self.order
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let order = self.order;
        endian::read_u16(self, order)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let order = self.order;
        endian::read_u32(self, order)
    }

    pub fn read_fourcc(&mut self) -> Result<FourCC> {
        endian::read_fourcc(self)
    }

    /// Drains the payload and hands control back to the worker
    ///
    /// Returns the number of payload bytes that were actually present.
    pub fn release(mut self) -> Result<u64> {
        let reached = self.drain()?;
        self.acknowledge(reached);
        Ok(reached)
    }

    fn drain(&mut self) -> io::Result<u64> {
        let mut buf = [0u8; 4096];
        loop {
            let n = match self.read(&mut buf) {
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            if n == 0 {
                return Ok(self.pos);
            }
        }
    }

    fn acknowledge(&mut self, reached: u64) {
        if let Some(release) = self.release.take() {
            // The worker may have given up already
            let _ = release.send(reached);
        }
    }

    /// Drops the chunk without touching the stream
    fn disarm(mut self) {
        self.release = None;
    }
}

impl<R: Read> Read for SharedChunk<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let max = self.remaining().min(buf.len() as u64) as usize;
        if max == 0 {
            return Ok(0);
        }
        let n = self.reader.lock().read(&mut buf[..max])?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl<R: Read> Drop for SharedChunk<R> {
    fn drop(&mut self) {
        if self.release.is_none() {
            return;
        }
        let reached = match self.drain() {
            Ok(reached) => reached,
            Err(e) => {
                log::warn!("Failed to drain {} chunk: {}", self.header.id, e);
                self.pos
            }
        };
        self.acknowledge(reached);
    }
}

impl<R: Read> std::fmt::Debug for SharedChunk<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedChunk")
            .field("header", &self.header)
            .field("pos", &self.pos)
            .finish()
    }
}

/// Result of waiting for the next chunk
#[derive(Debug)]
pub enum Handoff<R: Read> {
    Chunk(SharedChunk<R>),
    /// Nothing arrived within the wait
    Timeout,
    /// The worker has stopped; see [`ScanHandle::join`]
    Finished,
}

/// Consumer side of a running scan
pub struct ScanHandle<R: Read> {
    container: Container,
    chunks: Receiver<SharedChunk<R>>,
    stop: Arc<AtomicBool>,
    description: Arc<RwLock<Option<StreamMetadata>>>,
    worker: Option<JoinHandle<Result<ScanSummary>>>,
}

impl<R: Read> ScanHandle<R> {
    pub fn container(&self) -> &Container {
        &self.container
    }

    /// Stream description, once the worker has decoded it
    pub fn description(&self) -> Option<StreamMetadata> {
        self.description.read().clone()
    }

    /// Waits up to `wait` for the next chunk
    pub fn next_chunk(&self, wait: Duration) -> Handoff<R> {
        match self.chunks.recv_timeout(wait) {
            Ok(chunk) => Handoff::Chunk(chunk),
            Err(RecvTimeoutError::Timeout) => Handoff::Timeout,
            Err(RecvTimeoutError::Disconnected) => Handoff::Finished,
        }
    }

    /// Blocks until the next chunk, or `None` once the worker has stopped
    pub fn recv(&self) -> Option<SharedChunk<R>> {
        self.chunks.recv().ok()
    }

    /// Asks the worker to stop before handing over another chunk
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Stops the worker and returns how the scan ended
    pub fn join(mut self) -> Result<ScanSummary> {
        self.stop();
        let worker = match self.worker.take() {
            Some(worker) => worker,
            None => return Ok(ScanSummary::default()),
        };
        worker.join().map_err(|_| {
            ContainerError::Io(io::Error::new(
                io::ErrorKind::Other,
                "chunk scanner thread panicked",
            ))
        })?
    }
}

impl<R: Read> Drop for ScanHandle<R> {
    fn drop(&mut self) {
        self.stop();
    }
}

impl<R: Read> std::fmt::Debug for ScanHandle<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanHandle")
            .field("container", &self.container)
            .field("stopped", &self.stop.load(Ordering::Acquire))
            .field(
                "finished",
                &self.worker.as_ref().map_or(true, |w| w.is_finished()),
            )
            .finish()
    }
}

/// Validates the container header on the calling thread, then scans the
/// chunk list on a worker thread
pub fn spawn_scanner<R>(
    mut reader: R,
    options: DecoderOptions,
    config: HandoffConfig,
) -> Result<ScanHandle<R>>
where
    R: Read + Seek + Send + 'static,
{
    let container = scanner::read_container(&mut reader, None)?;
    let position = reader.stream_position()?;
    let shared = Arc::new(Mutex::new(reader));
    let (tx, rx) = channel::bounded(0);
    let stop = Arc::new(AtomicBool::new(false));
    let description = Arc::new(RwLock::new(None));

    let producer = Producer {
        scanner: ChunkScanner::new(SharedReader(Arc::clone(&shared)), container.dialect, position),
        reader: shared,
        container: container.clone(),
        options,
        config,
        chunks: tx,
        stop: Arc::clone(&stop),
        description: Arc::clone(&description),
    };
    let worker = thread::Builder::new()
        .name("chunk-scanner".to_string())
        .spawn(move || {
            let result = producer.run();
            if let Err(e) = &result {
                log::error!("Chunk scan stopped: {}", e);
            }
            result
        })?;

    Ok(ScanHandle {
        container,
        chunks: rx,
        stop,
        description,
        worker: Some(worker),
    })
}

struct Producer<R: Read> {
    scanner: ChunkScanner<SharedReader<R>>,
    reader: Arc<Mutex<R>>,
    container: Container,
    options: DecoderOptions,
    config: HandoffConfig,
    chunks: Sender<SharedChunk<R>>,
    stop: Arc<AtomicBool>,
    description: Arc<RwLock<Option<StreamMetadata>>>,
}

impl<R: Read + Seek> Producer<R> {
    fn run(mut self) -> Result<ScanSummary> {
        let dialect = self.container.dialect;
        let mut summary = ScanSummary::default();
        let mut first = true;

        while let Some(header) = self.scanner.next_header()? {
            if std::mem::take(&mut first) && dialect == Dialect::Caf {
                caf::check_first_chunk(&header)?;
            }

            if header.role(dialect) == ChunkRole::Description {
                if summary.description_found {
                    log::warn!(
                        "Ignoring duplicate {} chunk at offset {}",
                        header.id,
                        header.offset
                    );
                    continue;
                }
                let mode = self.options.extended_float;
                let mut chunk = self
                    .scanner
                    .open()
                    .ok_or(ContainerError::MissingChunk(header.id))?;
                let meta = scanner::read_description(&mut chunk, &self.container, mode)?;
                chunk.done()?;
                *self.description.write() = Some(meta);
                summary.description_found = true;
                continue;
            }

            if self.stop.load(Ordering::Acquire) {
                break;
            }
            let (release_tx, release_rx) = channel::bounded(1);
            let chunk = SharedChunk {
                header,
                reader: Arc::clone(&self.reader),
                order: dialect.byte_order(),
                pos: 0,
                release: Some(release_tx),
            };
            if !self.offer(chunk) {
                break;
            }
            summary.chunks += 1;

            let reached = self.await_release(&header, &release_rx)?;
            match header.size {
                Some(size) if reached < size => {
                    return Err(ContainerError::TruncatedStream {
                        needed: size,
                        available: reached,
                    });
                }
                Some(_) => self.scanner.seek_to(header.end(dialect))?,
                None => break,
            }
        }
        log::debug!("Chunk scan done: {} chunks handed over", summary.chunks);
        Ok(summary)
    }

    /// Returns false when the consumer has gone away or asked to stop
    fn offer(&self, mut chunk: SharedChunk<R>) -> bool {
        loop {
            if self.stop.load(Ordering::Acquire) {
                chunk.disarm();
                return false;
            }
            match self.chunks.send_timeout(chunk, SEND_POLL) {
                Ok(()) => return true,
                Err(SendTimeoutError::Timeout(back)) => chunk = back,
                Err(SendTimeoutError::Disconnected(back)) => {
                    back.disarm();
                    return false;
                }
            }
        }
    }

    fn await_release(&self, header: &ChunkHeader, release: &Receiver<u64>) -> Result<u64> {
        let mut attempts = 0u32;
        loop {
            match release.recv_timeout(self.config.timeout) {
                Ok(reached) => return Ok(reached),
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(ContainerError::ConsumerTimeout {
                        chunk: header.id,
                        waited: self.config.timeout * (attempts + 1),
                    })
                }
                Err(RecvTimeoutError::Timeout) => {
                    attempts += 1;
                    let waited = self.config.timeout * attempts;
                    let retry = match self.config.policy {
                        TimeoutPolicy::Fail => false,
                        TimeoutPolicy::Retry { max_attempts } => {
                            max_attempts.map_or(true, |max| attempts <= max)
                                && !self.stop.load(Ordering::Acquire)
                        }
                    };
                    if !retry {
                        return Err(ContainerError::ConsumerTimeout {
                            chunk: header.id,
                            waited,
                        });
                    }
                    log::warn!(
                        "{} chunk still held after {:?}, waiting again",
                        header.id,
                        waited
                    );
                }
            }
        }
    }
}
