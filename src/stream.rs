//! Live log tailing
//!
//! One polling loop per client: every interval (2s by default) the loop reads
//! the most recent lines of the selected source and pushes them as a
//! [`LogBatch`]. The loop ends as soon as the client drops its receiver or
//! shutdown is broadcast; ticks missed while a client is slow are skipped,
//! never replayed.
//!
//! Reading a source never fails the stream. An unreadable source yields the
//! single line `Logs not available: <reason>` so the client still sees why.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

/// Lines returned by a one-shot read when the caller does not say
pub const DEFAULT_RECENT_LINES: usize = 50;

/// How far back from the end of a file a tail read looks
const TAIL_WINDOW_BYTES: u64 = 64 * 1024;

/// Upper bound on the `docker events` snapshot
const DOCKER_TIMEOUT: Duration = Duration::from_secs(10);

/// Batches a slow client may have queued before the loop waits on it
const CHANNEL_CAPACITY: usize = 4;

/// Selectable log sources
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum LogSource {
    Syslog,
    Auth,
    /// The panel's own log file
    App,
    /// Container events from the last hour
    Docker,
}

/// File locations for the file-backed sources
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogPaths {
    pub syslog: PathBuf,
    pub auth: PathBuf,
    pub app: PathBuf,
}

impl Default for LogPaths {
    fn default() -> Self {
        Self {
            syslog: PathBuf::from("/var/log/syslog"),
            auth: PathBuf::from("/var/log/auth.log"),
            app: crate::utils::get_state_dir()
                .unwrap_or_default()
                .join(crate::utils::LOG_FILE_NAME),
        }
    }
}

/// Fetches recent lines from a log source
pub trait LogReader: Send + Sync + 'static {
    /// At most `count` of the newest lines, oldest first
    fn recent_lines(&self, source: LogSource, count: usize)
    -> impl Future<Output = Vec<String>> + Send;
}

/// Reads the host's log files and the docker daemon
#[derive(Debug, Clone, Default)]
pub struct SystemLogReader {
    paths: LogPaths,
}

impl SystemLogReader {
    pub fn new(paths: LogPaths) -> Self {
        Self { paths }
    }

    fn path_for(&self, source: LogSource) -> Option<&Path> {
        match source {
            LogSource::Syslog => Some(&self.paths.syslog),
            LogSource::Auth => Some(&self.paths.auth),
            LogSource::App => Some(&self.paths.app),
            LogSource::Docker => None,
        }
    }
}

impl LogReader for SystemLogReader {
    async fn recent_lines(&self, source: LogSource, count: usize) -> Vec<String> {
        let result = match self.path_for(source) {
            Some(path) => tail_file(path, count).await,
            None => docker_events(count).await,
        };

        result.unwrap_or_else(|e| {
            debug!("Log source {source} unavailable: {e}");
            vec![format!("Logs not available: {e}")]
        })
    }
}

/// Last `count` non-empty lines of `path`
async fn tail_file(path: &Path, count: usize) -> std::io::Result<Vec<String>> {
    let mut file = tokio::fs::File::open(path).await?;
    let len = file.metadata().await?.len();
    let offset = len.saturating_sub(TAIL_WINDOW_BYTES);
    file.seek(SeekFrom::Start(offset)).await?;

    let mut buf = Vec::new();
    file.read_to_end(&mut buf).await?;
    let text = String::from_utf8_lossy(&buf);

    // Started mid-file: the first line is partial
    let skip = usize::from(offset > 0);
    Ok(last_lines(text.lines().skip(skip), count))
}

async fn docker_events(count: usize) -> std::io::Result<Vec<String>> {
    let child = tokio::process::Command::new("docker")
        .args(["events", "--since", "1h", "--until", "0s"])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let output = tokio::time::timeout(DOCKER_TIMEOUT, child.wait_with_output())
        .await
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "docker events timed out"))??;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(std::io::Error::other(format!(
            "{} {}",
            output.status,
            stderr.trim()
        )));
    }

    Ok(last_lines(String::from_utf8_lossy(&output.stdout).lines(), count))
}

fn last_lines<'a>(lines: impl Iterator<Item = &'a str>, count: usize) -> Vec<String> {
    let lines: Vec<&str> = lines.filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(count);
    lines[start..].iter().map(ToString::to_string).collect()
}

/// One push to a streaming client
#[derive(Debug, Clone, Serialize)]
pub struct LogBatch {
    pub source: LogSource,
    pub lines: Vec<String>,
    /// 1-based position in this client's stream
    pub sequence: u64,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSettings {
    pub interval: Duration,
    pub batch_lines: usize,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            batch_lines: 5,
        }
    }
}

/// Why a tail loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    ClientDisconnected,
    Shutdown,
}

/// Pushes batches to `tx` until the client goes away or shutdown is signalled.
///
/// The first batch is sent immediately, then one per interval.
pub async fn run_tail<R: LogReader>(
    reader: Arc<R>,
    source: LogSource,
    settings: StreamSettings,
    tx: mpsc::Sender<LogBatch>,
    mut shutdown: broadcast::Receiver<()>,
) -> StreamEnd {
    let session = Uuid::new_v4();
    let mut ticker = tokio::time::interval(settings.interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut sequence = 0u64;

    info!(%session, %source, "Log stream started");

    let end = loop {
        tokio::select! {
            biased;
            () = tx.closed() => break StreamEnd::ClientDisconnected,
            // A closed channel means the server is going away too
            _ = shutdown.recv() => break StreamEnd::Shutdown,
            _ = ticker.tick() => {}
        }

        let lines = reader.recent_lines(source, settings.batch_lines).await;
        sequence += 1;
        let batch = LogBatch {
            source,
            lines,
            sequence,
            sent_at: Utc::now(),
        };

        if tx.send(batch).await.is_err() {
            break StreamEnd::ClientDisconnected;
        }
    };

    info!(%session, batches = sequence, "Log stream ended: {end:?}");
    end
}

/// A running tail loop and the client's receiving half
#[derive(Debug)]
pub struct TailStream {
    pub batches: mpsc::Receiver<LogBatch>,
    pub task: JoinHandle<StreamEnd>,
}

/// Starts a tail loop on its own task
pub fn spawn_tail<R: LogReader>(
    reader: Arc<R>,
    source: LogSource,
    settings: StreamSettings,
    shutdown: broadcast::Receiver<()>,
) -> TailStream {
    let (tx, batches) = mpsc::channel(CHANNEL_CAPACITY);
    let task = tokio::spawn(run_tail(reader, source, settings, tx, shutdown));
    TailStream { batches, task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts reads and answers instantly, so the paused clock drives everything
    #[derive(Default)]
    struct CountingReader {
        reads: AtomicUsize,
    }

    impl LogReader for CountingReader {
        async fn recent_lines(&self, source: LogSource, count: usize) -> Vec<String> {
            let n = self.reads.fetch_add(1, Ordering::SeqCst) + 1;
            vec![format!("{source} read {n}"); count]
        }
    }

    #[test]
    fn test_source_selector() {
        assert_eq!(LogSource::from_str("syslog").unwrap(), LogSource::Syslog);
        assert_eq!(LogSource::from_str("AUTH").unwrap(), LogSource::Auth);
        assert_eq!(LogSource::Docker.to_string(), "docker");
        assert!(LogSource::from_str("kernel").is_err());
    }

    #[test]
    fn test_last_lines() {
        let text = "one\n\ntwo\nthree\n";
        assert_eq!(last_lines(text.lines(), 2), vec!["two", "three"]);
        assert_eq!(last_lines(text.lines(), 10), vec!["one", "two", "three"]);
        assert!(last_lines(text.lines(), 0).is_empty());
    }

    #[tokio::test]
    async fn test_tail_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.log");
        let content: String = (1..=20).map(|i| format!("line {i}\n")).collect();
        tokio::fs::write(&path, content).await.unwrap();

        let reader = SystemLogReader::new(LogPaths {
            syslog: path.clone(),
            auth: path.clone(),
            app: path,
        });
        let lines = reader.recent_lines(LogSource::Auth, 3).await;
        assert_eq!(lines, vec!["line 18", "line 19", "line 20"]);
    }

    #[tokio::test]
    async fn test_tail_large_file_drops_partial_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("syslog");
        let line = format!("{}\n", "x".repeat(999));
        tokio::fs::write(&path, line.repeat(200)).await.unwrap();

        let lines = tail_file(&path, usize::MAX).await.unwrap();
        assert!(lines.iter().all(|l| l.len() == 999));
        assert!(lines.len() < 200);
    }

    #[tokio::test]
    async fn test_unreadable_source_yields_message() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.log");
        let reader = SystemLogReader::new(LogPaths {
            syslog: missing.clone(),
            auth: missing.clone(),
            app: missing,
        });

        let lines = reader.recent_lines(LogSource::Syslog, 5).await;
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("Logs not available: "));
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_disconnect_after_five_seconds() {
        let reader = Arc::new(CountingReader::default());
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let mut stream = spawn_tail(
            reader.clone(),
            LogSource::Syslog,
            StreamSettings::default(),
            shutdown_rx,
        );

        let mut received = Vec::new();
        let deadline = tokio::time::sleep(Duration::from_secs(5));
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                () = &mut deadline => break,
                Some(batch) = stream.batches.recv() => received.push(batch),
            }
        }
        drop(stream.batches);

        assert_eq!(stream.task.await.unwrap(), StreamEnd::ClientDisconnected);
        assert!(reader.reads.load(Ordering::SeqCst) <= 3);
        assert_eq!(received.len(), 3);
        let sequences: Vec<u64> = received.iter().map(|b| b.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
        assert_eq!(received[0].lines.len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_stream() {
        let reader = Arc::new(CountingReader::default());
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let mut stream = spawn_tail(reader, LogSource::App, StreamSettings::default(), shutdown_rx);

        let first = stream.batches.recv().await.unwrap();
        assert_eq!(first.sequence, 1);

        shutdown_tx.send(()).unwrap();
        assert_eq!(stream.task.await.unwrap(), StreamEnd::Shutdown);
    }
}
