// LogDeck - app/tail.rs
//
// Live tail: one session per viewer, each following one logical file and
// pushing new lines to its subscriber.
//
// Architecture:
//   - `StreamMultiplexer` owns the session table. Each session runs on its
//     own thread and holds exactly one open file handle at a time.
//   - Events go to the subscriber over a bounded crossbeam channel. When it
//     is full the worker either waits (`Block`) or discards the oldest
//     queued event and later reports `Lagged` (`DropOldest`).
//   - An `Arc<AtomicBool>` cancel flag is set by `close`, by dropping the
//     `StreamSubscription` (client disconnect) and by shutdown. The worker
//     checks it every `STREAM_CANCEL_CHECK_INTERVAL_MS` while sleeping or
//     waiting on the channel, and between read chunks.
//
// Session lifecycle: Opening -> Following -> (Rotated -> Reopening ->
// Following)* -> Closed.
//   - Rotation is a change of file identity (inode) behind the logical path,
//     or the path disappearing. Unread data and any unterminated last line of
//     the old file are flushed first; the new file is then read from 0.
//   - Truncation (the same file shrank below the cursor) restarts at 0.
//   - Only complete lines are emitted; the in-progress tail is buffered up
//     to `max_line_bytes`.
//   - A compressed physical file cannot grow. With `read_compressed` it is
//     sent once as a snapshot, otherwise the session ends with
//     `UnsupportedCompression`.

use crate::core::model::{
    Backpressure, Compression, SessionId, SessionState, StreamEvent, StreamLine, StreamStatus,
};
use crate::core::normalize;
use crate::core::parser::{self, LineParser};
use crate::platform::config::StreamSettings;
use crate::platform::fs as host_fs;
use crate::util::constants::{
    MAX_STREAM_READ_BYTES_PER_TICK, STREAM_CANCEL_CHECK_INTERVAL_MS, STREAM_REOPEN_ATTEMPTS,
    STREAM_REOPEN_DELAY_MS,
};
use crate::util::error::StreamError;
use chrono::Utc;
use crossbeam_channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender, TrySendError};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

// =============================================================================
// Public types
// =============================================================================

/// What a new session follows and how it parses lines.
#[derive(Debug, Clone)]
pub struct StreamTarget {
    pub logical_path: PathBuf,
    /// Resolved regex; empty forwards raw lines only.
    pub regex: String,
    /// Cap on historical lines sent when the session starts; 0 = whole file.
    pub max_lines: usize,
    pub read_compressed: bool,
}

/// Snapshot of one session for listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub id: SessionId,
    pub logical_path: PathBuf,
    pub state: SessionState,
}

/// The subscriber's end of a session. Dropping it disconnects the client and
/// stops the worker.
#[derive(Debug)]
pub struct StreamSubscription {
    id: SessionId,
    events: Receiver<StreamEvent>,
    cancel: Arc<AtomicBool>,
}

impl StreamSubscription {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn events(&self) -> &Receiver<StreamEvent> {
        &self.events
    }

    /// Wait up to `timeout` for the next event. `None` on timeout or once
    /// the session has ended and everything was received.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<StreamEvent> {
        match self.events.recv_timeout(timeout) {
            Ok(ev) => Some(ev),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Drain queued events without blocking.
    pub fn drain(&self) -> Vec<StreamEvent> {
        self.events.try_iter().collect()
    }
}

impl Drop for StreamSubscription {
    fn drop(&mut self) {
        self.cancel.store(true, Ordering::SeqCst);
    }
}

// =============================================================================
// StreamMultiplexer
// =============================================================================

struct SessionHandle {
    logical_path: PathBuf,
    cancel: Arc<AtomicBool>,
    state: Arc<Mutex<SessionState>>,
    thread: Option<JoinHandle<()>>,
}

/// Table of live stream sessions. Sessions are independent; the table lock
/// is held only to insert, look up or remove handles.
pub struct StreamMultiplexer {
    settings: StreamSettings,
    next_id: AtomicU64,
    sessions: Mutex<HashMap<SessionId, SessionHandle>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

impl StreamMultiplexer {
    pub fn new(settings: StreamSettings) -> Self {
        Self {
            settings,
            next_id: AtomicU64::new(1),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &StreamSettings {
        &self.settings
    }

    /// Open a session following `target.logical_path`.
    ///
    /// Resolution and the first open happen here, so a missing or unreadable
    /// file is reported to the caller directly. Everything after that is
    /// reported on the subscription.
    pub fn open(&self, target: StreamTarget) -> Result<StreamSubscription, StreamError> {
        self.reap_finished();

        let logical = normalize::normalize(&target.logical_path);
        let physical = resolve_physical(&logical)?;
        let file = File::open(&physical).map_err(|e| StreamError::from_open(&physical, &e))?;
        let compression = normalize::compression_of(&physical);

        let id = SessionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = crossbeam_channel::bounded(self.settings.channel_capacity.max(1));
        let cancel = Arc::new(AtomicBool::new(false));
        let state = Arc::new(Mutex::new(SessionState::Opening));

        let worker = Worker {
            id,
            logical: logical.clone(),
            physical: physical.clone(),
            parser: LineParser::new(&target.regex),
            max_lines: target.max_lines,
            read_compressed: target.read_compressed,
            settings: self.settings.clone(),
            overflow: match self.settings.backpressure {
                Backpressure::Block => None,
                Backpressure::DropOldest => Some(rx.clone()),
            },
            tx,
            cancel: Arc::clone(&cancel),
            state: Arc::clone(&state),
            dropped: 0,
            buf: Vec::new(),
        };

        let thread = std::thread::Builder::new()
            .name(format!("logdeck-{id}"))
            .spawn(move || worker.run(file, compression))
            .map_err(|e| StreamError::Io {
                path: physical.clone(),
                message: format!("cannot start stream worker: {e}"),
            })?;

        lock(&self.sessions).insert(
            id,
            SessionHandle {
                logical_path: logical.clone(),
                cancel: Arc::clone(&cancel),
                state,
                thread: Some(thread),
            },
        );

        tracing::info!(
            session = %id,
            logical = %logical.display(),
            physical = %physical.display(),
            max_lines = target.max_lines,
            "Stream session opened"
        );

        Ok(StreamSubscription {
            id,
            events: rx,
            cancel,
        })
    }

    /// Stop a session and wait for its worker to release the file.
    /// Returns false when no such session exists.
    pub fn close(&self, id: SessionId) -> bool {
        let handle = lock(&self.sessions).remove(&id);
        match handle {
            Some(mut h) => {
                h.cancel.store(true, Ordering::SeqCst);
                if let Some(thread) = h.thread.take() {
                    if thread.join().is_err() {
                        tracing::warn!(session = %id, "Stream worker panicked");
                    }
                }
                tracing::debug!(session = %id, "Stream session closed by request");
                true
            }
            None => false,
        }
    }

    pub fn state(&self, id: SessionId) -> Option<SessionState> {
        lock(&self.sessions).get(&id).map(|h| *lock(&h.state))
    }

    /// Live sessions. Sessions whose worker has exited are dropped first.
    pub fn sessions(&self) -> Vec<SessionInfo> {
        self.reap_finished();
        let sessions = lock(&self.sessions);
        let mut out: Vec<SessionInfo> = sessions
            .iter()
            .map(|(id, h)| SessionInfo {
                id: *id,
                logical_path: h.logical_path.clone(),
                state: *lock(&h.state),
            })
            .collect();
        out.sort_by_key(|s| s.id);
        out
    }

    /// Close every session.
    pub fn shutdown(&self) {
        let ids: Vec<SessionId> = lock(&self.sessions).keys().copied().collect();
        for id in ids {
            self.close(id);
        }
    }

    /// Forget sessions whose worker has already exited.
    fn reap_finished(&self) {
        let finished: Vec<(SessionId, SessionHandle)> = {
            let mut sessions = lock(&self.sessions);
            let ids: Vec<SessionId> = sessions
                .iter()
                .filter(|(_, h)| h.thread.as_ref().map_or(true, |t| t.is_finished()))
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| sessions.remove(&id).map(|h| (id, h)))
                .collect()
        };
        for (id, mut handle) in finished {
            if let Some(thread) = handle.thread.take() {
                let _ = thread.join();
            }
            tracing::debug!(session = %id, "Reaped finished stream session");
        }
    }
}

impl Drop for StreamMultiplexer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Map a logical path to the physical file to follow: the live file if it
/// exists, else its newest rotated copy (uncompressed preferred on ties).
pub fn resolve_physical(logical: &Path) -> Result<PathBuf, StreamError> {
    match std::fs::metadata(logical) {
        Ok(m) if m.is_file() => return Ok(logical.to_path_buf()),
        Ok(_) => {
            return Err(StreamError::NotFound {
                path: logical.to_path_buf(),
            })
        }
        Err(e) if e.kind() != io::ErrorKind::NotFound => {
            return Err(StreamError::from_open(logical, &e))
        }
        Err(_) => {}
    }

    let parent = logical
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let entries = std::fs::read_dir(parent).map_err(|e| StreamError::from_open(logical, &e))?;

    entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && normalize::normalize(p) == logical)
        .min_by_key(|p| {
            let parts = normalize::split(p);
            (normalize::rotation_rank(&parts), parts.compression.is_some())
        })
        .ok_or_else(|| StreamError::NotFound {
            path: logical.to_path_buf(),
        })
}

/// Offset where the last `max_lines` complete lines of a `len`-byte file
/// begin. Scans backwards so large files are not read in full.
fn backfill_start<R: Read + Seek>(file: &mut R, len: u64, max_lines: usize) -> io::Result<u64> {
    const CHUNK: u64 = 64 * 1_024;
    let mut buf = vec![0u8; CHUNK as usize];
    let mut pos = len;
    let mut newlines = 0usize;
    while pos > 0 {
        let n = CHUNK.min(pos);
        pos -= n;
        file.seek(SeekFrom::Start(pos))?;
        let chunk = &mut buf[..n as usize];
        file.read_exact(chunk)?;
        for (i, b) in chunk.iter().enumerate().rev() {
            if *b == b'\n' {
                newlines += 1;
                if newlines > max_lines {
                    return Ok(pos + i as u64 + 1);
                }
            }
        }
    }
    Ok(0)
}

// =============================================================================
// Worker (private to the session thread)
// =============================================================================

/// Why a worker stopped following.
enum End {
    /// Cancelled or the subscriber went away.
    Stopped,
    /// A compressed snapshot was delivered in full.
    Done,
    Failed(StreamError),
}

type Step<T = ()> = Result<T, End>;

/// The open physical file and the read cursor into it.
struct Followed {
    file: File,
    identity: Option<u64>,
    offset: u64,
    partial: Vec<u8>,
}

struct Worker {
    id: SessionId,
    logical: PathBuf,
    physical: PathBuf,
    parser: LineParser,
    max_lines: usize,
    read_compressed: bool,
    settings: StreamSettings,
    tx: Sender<StreamEvent>,
    /// Second receiver used to discard the oldest event (`DropOldest` only).
    overflow: Option<Receiver<StreamEvent>>,
    cancel: Arc<AtomicBool>,
    state: Arc<Mutex<SessionState>>,
    dropped: u64,
    buf: Vec<u8>,
}

impl Worker {
    fn run(mut self, file: File, compression: Option<Compression>) {
        let result = match compression {
            Some(c) if !self.read_compressed => {
                drop(file);
                Err(End::Failed(StreamError::UnsupportedCompression {
                    path: self.physical.clone(),
                    compression: c.to_string(),
                }))
            }
            Some(c) => {
                drop(file);
                self.snapshot(c)
            }
            None => self.follow(file),
        };

        if let Err(End::Failed(e)) = result {
            tracing::warn!(session = %self.id, error = %e, "Stream session failed");
            let _ = self.emit(StreamEvent::Error {
                kind: e.kind(),
                message: e.to_string(),
            });
        }

        let _ = self.emit(StreamEvent::Status(StreamStatus::Closed));
        tracing::info!(session = %self.id, logical = %self.logical.display(), "Stream session ended");
        self.set_state(SessionState::Closed);
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    fn set_state(&self, state: SessionState) {
        *lock(&self.state) = state;
    }

    fn io_failure(&self, e: io::Error) -> End {
        End::Failed(StreamError::Io {
            path: self.physical.clone(),
            message: e.to_string(),
        })
    }

    // -------------------------------------------------------------------------
    // Delivery
    // -------------------------------------------------------------------------

    fn emit(&mut self, event: StreamEvent) -> Step {
        if self.overflow.is_some() {
            self.emit_dropping_oldest(event)
        } else {
            self.emit_blocking(event)
        }
    }

    fn emit_blocking(&self, mut event: StreamEvent) -> Step {
        let wait = Duration::from_millis(STREAM_CANCEL_CHECK_INTERVAL_MS);
        loop {
            match self.tx.send_timeout(event, wait) {
                Ok(()) => return Ok(()),
                Err(SendTimeoutError::Timeout(e)) => {
                    if self.cancelled() {
                        return Err(End::Stopped);
                    }
                    event = e;
                }
                Err(SendTimeoutError::Disconnected(_)) => return Err(End::Stopped),
            }
        }
    }

    fn emit_dropping_oldest(&mut self, mut event: StreamEvent) -> Step {
        loop {
            match self.tx.try_send(event) {
                Ok(()) => break,
                Err(TrySendError::Full(e)) => {
                    if let Some(rx) = &self.overflow {
                        if rx.try_recv().is_ok() {
                            self.dropped += 1;
                        }
                    }
                    event = e;
                }
                Err(TrySendError::Disconnected(_)) => return Err(End::Stopped),
            }
        }
        if self.dropped > 0 {
            let lagged = StreamEvent::Status(StreamStatus::Lagged {
                dropped: self.dropped,
            });
            if self.tx.try_send(lagged).is_ok() {
                tracing::debug!(session = %self.id, dropped = self.dropped, "Subscriber lagged");
                self.dropped = 0;
            }
        }
        Ok(())
    }

    fn emit_line(&mut self, raw: &[u8], offset: u64) -> Step {
        let line = host_fs::decode_line(raw);
        let parsed_fields = self.parser.parse(&line);
        let timestamp = parser::sniff_timestamp(&line).unwrap_or_else(Utc::now);
        self.emit(StreamEvent::Line(StreamLine {
            line,
            parsed_fields,
            timestamp,
            offset,
        }))
    }

    // -------------------------------------------------------------------------
    // Following a growing file
    // -------------------------------------------------------------------------

    fn follow(&mut self, mut file: File) -> Step {
        let meta = file.metadata().map_err(|e| self.io_failure(e))?;
        let start = if self.max_lines == 0 {
            0
        } else {
            backfill_start(&mut file, meta.len(), self.max_lines)
                .map_err(|e| self.io_failure(e))?
        };
        file.seek(SeekFrom::Start(start))
            .map_err(|e| self.io_failure(e))?;

        let mut followed = Followed {
            file,
            identity: host_fs::file_identity(&meta),
            offset: start,
            partial: Vec::new(),
        };

        self.set_state(SessionState::Following);
        self.emit(StreamEvent::Status(StreamStatus::Following {
            physical_path: self.physical.clone(),
            offset: start,
        }))?;

        let slices = (self.settings.poll_interval_ms / STREAM_CANCEL_CHECK_INTERVAL_MS).max(1);

        loop {
            let more_pending = self.read_available(&mut followed)?;
            if !more_pending {
                for _ in 0..slices {
                    std::thread::sleep(Duration::from_millis(STREAM_CANCEL_CHECK_INTERVAL_MS));
                    if self.cancelled() {
                        return Err(End::Stopped);
                    }
                }
            }
            if self.cancelled() {
                return Err(End::Stopped);
            }
            self.check_replaced(&mut followed)?;
        }
    }

    /// Read up to one tick's worth of new bytes. Returns true when the cap
    /// was hit and more data is probably waiting.
    fn read_available(&mut self, f: &mut Followed) -> Step<bool> {
        if self.buf.len() != MAX_STREAM_READ_BYTES_PER_TICK {
            self.buf = vec![0u8; MAX_STREAM_READ_BYTES_PER_TICK];
        }
        let mut total = 0usize;
        while total < MAX_STREAM_READ_BYTES_PER_TICK {
            if self.cancelled() {
                return Err(End::Stopped);
            }
            let want = MAX_STREAM_READ_BYTES_PER_TICK - total;
            let n = match f.file.read(&mut self.buf[..want]) {
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(self.io_failure(e)),
            };
            if n == 0 {
                return Ok(false);
            }
            let chunk_start = f.offset;
            f.offset += n as u64;
            total += n;
            let chunk = std::mem::take(&mut self.buf);
            let result = self.consume(f, &chunk[..n], chunk_start);
            self.buf = chunk;
            result?;
        }
        Ok(true)
    }

    /// Split `bytes` (which start at file offset `start`) into complete
    /// lines and emit them; keep the unterminated remainder.
    fn consume(&mut self, f: &mut Followed, bytes: &[u8], start: u64) -> Step {
        let mut line_start = 0usize;
        for (i, b) in bytes.iter().enumerate() {
            if *b != b'\n' {
                continue;
            }
            f.partial.extend_from_slice(&bytes[line_start..=i]);
            let raw = std::mem::take(&mut f.partial);
            self.emit_line(&raw, start + i as u64 + 1)?;
            line_start = i + 1;
        }
        f.partial.extend_from_slice(&bytes[line_start..]);

        if f.partial.len() > self.settings.max_line_bytes {
            tracing::warn!(
                session = %self.id,
                bytes = f.partial.len(),
                limit = self.settings.max_line_bytes,
                "Unterminated line exceeds limit; emitting it as is"
            );
            let raw = std::mem::take(&mut f.partial);
            self.emit_line(&raw, f.offset)?;
        }
        Ok(())
    }

    fn flush_partial(&mut self, f: &mut Followed) -> Step {
        if f.partial.is_empty() {
            return Ok(());
        }
        let raw = std::mem::take(&mut f.partial);
        self.emit_line(&raw, f.offset)
    }

    /// Detect rotation (a different file, or none, behind the path) and
    /// in-place truncation.
    fn check_replaced(&mut self, f: &mut Followed) -> Step {
        if self.physical != self.logical && self.logical.is_file() {
            // Started on a rotated copy; the live file has appeared.
            return self.rotate(f);
        }

        match std::fs::metadata(&self.physical) {
            Ok(meta) => {
                let identity = host_fs::file_identity(&meta);
                if identity.is_some() && identity != f.identity {
                    return self.rotate(f);
                }
                let len = f.file.metadata().map_err(|e| self.io_failure(e))?.len();
                if len < f.offset {
                    tracing::info!(
                        session = %self.id,
                        old_offset = f.offset,
                        new_size = len,
                        "Followed file truncated; restarting at 0"
                    );
                    f.file
                        .seek(SeekFrom::Start(0))
                        .map_err(|e| self.io_failure(e))?;
                    f.offset = 0;
                    f.partial.clear();
                    self.emit(StreamEvent::Status(StreamStatus::Truncated {
                        physical_path: self.physical.clone(),
                    }))?;
                }
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => self.rotate(f),
            Err(e) => Err(End::Failed(StreamError::StreamInterrupted {
                path: self.physical.clone(),
                reason: e.to_string(),
            })),
        }
    }

    fn rotate(&mut self, f: &mut Followed) -> Step {
        let from = self.physical.clone();
        self.set_state(SessionState::Rotated);

        // Drain the old handle; it stays readable after a rename or unlink.
        while self.read_available(f)? {}
        self.flush_partial(f)?;

        self.set_state(SessionState::Reopening);
        let file = self.reopen()?;
        let meta = file.metadata().map_err(|e| self.io_failure(e))?;

        // Old handle is released here.
        *f = Followed {
            file,
            identity: host_fs::file_identity(&meta),
            offset: 0,
            partial: Vec::new(),
        };
        self.physical = self.logical.clone();

        tracing::info!(
            session = %self.id,
            from = %from.display(),
            to = %self.physical.display(),
            "Followed file rotated"
        );
        self.emit(StreamEvent::Status(StreamStatus::Rotated {
            from,
            to: self.physical.clone(),
        }))?;
        self.set_state(SessionState::Following);
        self.emit(StreamEvent::Status(StreamStatus::Following {
            physical_path: self.physical.clone(),
            offset: 0,
        }))
    }

    fn reopen(&self) -> Step<File> {
        let mut last_error = String::from("file was not recreated");
        for attempt in 1..=STREAM_REOPEN_ATTEMPTS {
            if self.cancelled() {
                return Err(End::Stopped);
            }
            match File::open(&self.logical) {
                Ok(file) => return Ok(file),
                Err(e) => {
                    tracing::trace!(session = %self.id, attempt, error = %e, "Reopen attempt failed");
                    last_error = e.to_string();
                }
            }
            std::thread::sleep(Duration::from_millis(STREAM_REOPEN_DELAY_MS));
        }
        Err(End::Failed(StreamError::StreamInterrupted {
            path: self.logical.clone(),
            reason: format!(
                "could not reopen after {STREAM_REOPEN_ATTEMPTS} attempts: {last_error}"
            ),
        }))
    }

    // -------------------------------------------------------------------------
    // Compressed snapshot
    // -------------------------------------------------------------------------

    fn snapshot(&mut self, compression: Compression) -> Step {
        let mut reader = host_fs::open_reader(&self.physical, Some(compression))
            .map_err(|e| self.io_failure(e))?;

        self.set_state(SessionState::Following);
        self.emit(StreamEvent::Status(StreamStatus::CompressedSnapshot {
            physical_path: self.physical.clone(),
            compression,
        }))?;

        // Lines longer than `max_line_bytes` are emitted in pieces, as when
        // following a plain file.
        let limit = self.settings.max_line_bytes;
        let mut tail: VecDeque<(Vec<u8>, u64)> = VecDeque::new();
        let mut offset = 0u64;
        loop {
            if self.cancelled() {
                return Err(End::Stopped);
            }
            let mut raw = Vec::new();
            let n = host_fs::read_line_capped(&mut reader, &mut raw, limit)
                .map_err(|e| self.io_failure(e))?;
            if n == 0 {
                break;
            }
            if n >= limit && !raw.ends_with(b"\n") {
                tracing::debug!(
                    session = %self.id,
                    limit,
                    "Snapshot line exceeds limit; splitting it"
                );
            }
            offset += n as u64;
            if self.max_lines == 0 {
                self.emit_line(&raw, offset)?;
            } else {
                tail.push_back((raw, offset));
                if tail.len() > self.max_lines {
                    tail.pop_front();
                }
            }
        }
        for (raw, offset) in tail {
            self.emit_line(&raw, offset)?;
        }
        Err(End::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::error::ErrorKind;
    use std::io::Write;
    use std::time::Instant;

    fn settings() -> StreamSettings {
        StreamSettings {
            poll_interval_ms: 20,
            ..StreamSettings::default()
        }
    }

    fn target(path: &Path, max_lines: usize) -> StreamTarget {
        StreamTarget {
            logical_path: path.to_path_buf(),
            regex: String::new(),
            max_lines,
            read_compressed: false,
        }
    }

    fn append(path: &Path, text: &str) {
        let mut f = std::fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(path)
            .unwrap();
        f.write_all(text.as_bytes()).unwrap();
    }

    /// Collect events until `done` returns true or five seconds pass.
    fn collect_until<F>(sub: &StreamSubscription, mut done: F) -> Vec<StreamEvent>
    where
        F: FnMut(&[StreamEvent]) -> bool,
    {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut events = Vec::new();
        while Instant::now() < deadline && !done(&events) {
            if let Some(ev) = sub.recv_timeout(Duration::from_millis(20)) {
                events.push(ev);
            }
        }
        events
    }

    fn lines(events: &[StreamEvent]) -> Vec<String> {
        events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Line(l) => Some(l.line.clone()),
                _ => None,
            })
            .collect()
    }

    fn has_status<F: Fn(&StreamStatus) -> bool>(events: &[StreamEvent], f: F) -> bool {
        events.iter().any(|e| matches!(e, StreamEvent::Status(s) if f(s)))
    }

    #[test]
    fn test_backfill_start() {
        let data = b"a\nb\nc\n";
        let mut cur = io::Cursor::new(&data[..]);
        assert_eq!(backfill_start(&mut cur, 6, 2).unwrap(), 2);
        assert_eq!(backfill_start(&mut cur, 6, 3).unwrap(), 0);
        assert_eq!(backfill_start(&mut cur, 6, 10).unwrap(), 0);

        let partial = b"a\nb\nc\npart";
        let mut cur = io::Cursor::new(&partial[..]);
        assert_eq!(backfill_start(&mut cur, 10, 1).unwrap(), 4);
    }

    #[test]
    fn test_resolve_physical_prefers_live_then_newest_rotation() {
        let dir = tempfile::tempdir().unwrap();
        let logical = dir.path().join("access.log");
        std::fs::write(dir.path().join("access.log.2.gz"), b"x").unwrap();
        std::fs::write(dir.path().join("access.log.1"), b"x").unwrap();
        assert_eq!(
            resolve_physical(&logical).unwrap(),
            dir.path().join("access.log.1")
        );
        std::fs::write(&logical, b"x").unwrap();
        assert_eq!(resolve_physical(&logical).unwrap(), logical);

        let missing = resolve_physical(&dir.path().join("error.log")).unwrap_err();
        assert_eq!(missing.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_follow_backfills_then_streams_complete_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(&path, "one\ntwo\nthree\n").unwrap();

        let mux = StreamMultiplexer::new(settings());
        let sub = mux.open(target(&path, 2)).unwrap();

        let events = collect_until(&sub, |ev| lines(ev).len() >= 2);
        assert!(matches!(
            events.first(),
            Some(StreamEvent::Status(StreamStatus::Following { offset: 4, .. }))
        ));
        assert_eq!(lines(&events), vec!["two", "three"]);

        append(&path, "four\nhalf");
        let events = collect_until(&sub, |ev| !lines(ev).is_empty());
        assert_eq!(lines(&events), vec!["four"]);

        // The unterminated fragment is held until its newline arrives.
        std::thread::sleep(Duration::from_millis(100));
        assert!(lines(&sub.drain()).is_empty());
        append(&path, " done\n");
        let events = collect_until(&sub, |ev| !lines(ev).is_empty());
        assert_eq!(lines(&events), vec!["half done"]);

        assert!(mux.close(sub.id()));
        let rest = sub.drain();
        assert!(has_status(&rest, |s| *s == StreamStatus::Closed));
        assert!(!mux.close(sub.id()));
    }

    #[test]
    fn test_lines_carry_parsed_fields_and_offsets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(&path, "2024-01-10T13:55:36Z INFO ready\n").unwrap();

        let mux = StreamMultiplexer::new(settings());
        let mut t = target(&path, 0);
        t.regex = r"^(?P<timestamp>\S+) (?P<level>\w+) (?P<message>.*)$".to_string();
        let sub = mux.open(t).unwrap();

        let events = collect_until(&sub, |ev| !lines(ev).is_empty());
        let line = events
            .iter()
            .find_map(|e| match e {
                StreamEvent::Line(l) => Some(l.clone()),
                _ => None,
            })
            .unwrap();
        let fields = line.parsed_fields.unwrap();
        assert_eq!(fields["level"], "INFO");
        assert_eq!(fields["message"], "ready");
        assert_eq!(line.offset, 32);
        assert_eq!(line.timestamp.to_rfc3339(), "2024-01-10T13:55:36+00:00");
    }

    #[test]
    fn test_truncation_restarts_at_zero() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(&path, "a fairly long first line\n").unwrap();

        let mux = StreamMultiplexer::new(settings());
        let sub = mux.open(target(&path, 0)).unwrap();
        collect_until(&sub, |ev| !lines(ev).is_empty());

        std::fs::write(&path, "new\n").unwrap();
        let events = collect_until(&sub, |ev| !lines(ev).is_empty());
        assert!(has_status(&events, |s| matches!(s, StreamStatus::Truncated { .. })));
        assert_eq!(lines(&events), vec!["new"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_rotation_flushes_old_file_then_follows_new() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("access.log");
        let rotated = dir.path().join("access.log.1");
        std::fs::write(&path, "one\n").unwrap();

        let mux = StreamMultiplexer::new(settings());
        let sub = mux.open(target(&path, 0)).unwrap();
        collect_until(&sub, |ev| !lines(ev).is_empty());

        std::fs::rename(&path, &rotated).unwrap();
        append(&rotated, "two\nunterminated");
        std::fs::write(&path, "three\n").unwrap();

        let events = collect_until(&sub, |ev| lines(ev).contains(&"three".to_string()));
        assert_eq!(lines(&events), vec!["two", "unterminated", "three"]);
        assert!(has_status(&events, |s| matches!(s, StreamStatus::Rotated { .. })));
    }

    #[test]
    fn test_vanished_file_ends_with_interrupted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone.log");
        std::fs::write(&path, "x\n").unwrap();

        let mux = StreamMultiplexer::new(settings());
        let sub = mux.open(target(&path, 0)).unwrap();
        collect_until(&sub, |ev| !lines(ev).is_empty());
        std::fs::remove_file(&path).unwrap();

        let events = collect_until(&sub, |ev| has_status(ev, |s| *s == StreamStatus::Closed));
        assert!(events.iter().any(|e| matches!(
            e,
            StreamEvent::Error {
                kind: ErrorKind::StreamInterrupted,
                ..
            }
        )));
    }

    #[test]
    fn test_compressed_without_permission_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let gz = dir.path().join("access.log.1.gz");
        let mut enc = flate2::write::GzEncoder::new(
            File::create(&gz).unwrap(),
            flate2::Compression::default(),
        );
        enc.write_all(b"old one\nold two\n").unwrap();
        enc.finish().unwrap();

        let mux = StreamMultiplexer::new(settings());
        let logical = dir.path().join("access.log");
        let sub = mux.open(target(&logical, 0)).unwrap();
        let events = collect_until(&sub, |ev| has_status(ev, |s| *s == StreamStatus::Closed));
        assert!(matches!(
            events.first(),
            Some(StreamEvent::Error {
                kind: ErrorKind::UnsupportedCompression,
                ..
            })
        ));

        let mut t = target(&logical, 1);
        t.read_compressed = true;
        let sub = mux.open(t).unwrap();
        let events = collect_until(&sub, |ev| has_status(ev, |s| *s == StreamStatus::Closed));
        assert!(has_status(&events, |s| matches!(
            s,
            StreamStatus::CompressedSnapshot { .. }
        )));
        assert_eq!(lines(&events), vec!["old two"]);
    }

    #[test]
    fn test_snapshot_splits_long_lines() {
        let dir = tempfile::tempdir().unwrap();
        let gz = dir.path().join("app.log.1.gz");
        let mut enc = flate2::write::GzEncoder::new(
            File::create(&gz).unwrap(),
            flate2::Compression::default(),
        );
        enc.write_all(&[b'z'; 3000]).unwrap();
        enc.write_all(b"\nlast\n").unwrap();
        enc.finish().unwrap();

        let mux = StreamMultiplexer::new(StreamSettings {
            max_line_bytes: 1024,
            ..settings()
        });
        let mut t = target(&dir.path().join("app.log"), 0);
        t.read_compressed = true;
        let sub = mux.open(t).unwrap();
        let events = collect_until(&sub, |ev| has_status(ev, |s| *s == StreamStatus::Closed));
        let got = lines(&events);
        assert_eq!(got.len(), 4, "{:?}", got.iter().map(String::len).collect::<Vec<_>>());
        assert!(got[..3].iter().all(|l| l.len() <= 1024 && l.bytes().all(|b| b == b'z')));
        assert_eq!(got[..3].iter().map(String::len).sum::<usize>(), 3000);
        assert_eq!(got[3], "last");
    }

    #[test]
    fn test_drop_oldest_reports_lag() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("busy.log");
        let body: String = (0..50).map(|i| format!("line {i}\n")).collect();
        std::fs::write(&path, body).unwrap();

        let mux = StreamMultiplexer::new(StreamSettings {
            channel_capacity: 4,
            backpressure: Backpressure::DropOldest,
            ..settings()
        });
        let sub = mux.open(target(&path, 0)).unwrap();
        std::thread::sleep(Duration::from_millis(200));
        let first = sub.drain();
        assert!(first.len() <= 4);
        assert_eq!(lines(&first).last().map(String::as_str), Some("line 49"));

        append(&path, "more\n");
        let events = collect_until(&sub, |ev| {
            has_status(ev, |s| matches!(s, StreamStatus::Lagged { .. }))
        });
        assert_eq!(lines(&events), vec!["more"]);
    }

    #[test]
    fn test_blocked_session_closes_promptly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("busy.log");
        let body: String = (0..100).map(|i| format!("line {i}\n")).collect();
        std::fs::write(&path, body).unwrap();

        let mux = StreamMultiplexer::new(StreamSettings {
            channel_capacity: 1,
            ..settings()
        });
        let sub = mux.open(target(&path, 0)).unwrap();
        std::thread::sleep(Duration::from_millis(100));

        let started = Instant::now();
        assert!(mux.close(sub.id()));
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(mux.sessions().is_empty());
    }

    #[test]
    fn test_dropping_subscription_ends_session() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(&path, "x\n").unwrap();

        let mux = StreamMultiplexer::new(settings());
        let sub = mux.open(target(&path, 0)).unwrap();
        let id = sub.id();
        drop(sub);

        let deadline = Instant::now() + Duration::from_secs(5);
        while mux.state(id) != Some(SessionState::Closed) && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(mux.state(id), Some(SessionState::Closed));

        let other = mux.open(target(&path, 0)).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut ids: Vec<SessionId> = Vec::new();
        while Instant::now() < deadline {
            ids = mux.sessions().iter().map(|s| s.id).collect();
            if !ids.contains(&id) {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(ids, vec![other.id()]);
    }

    #[test]
    fn test_missing_file_fails_at_open() {
        let dir = tempfile::tempdir().unwrap();
        let mux = StreamMultiplexer::new(settings());
        let err = mux.open(target(&dir.path().join("none.log"), 0)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
