use parking_lot::Mutex;
use pyroshow_core::sync::PlaybackHandle;
use pyroshow_core::types::TimeUs;
use serde_json::{json, Value};
use std::fmt;
use std::io::{BufRead, BufReader, Write};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{PreviewError, Result};

/// Properties mirrored from mpv, keyed by observer id.
const OBSERVED_PROPERTIES: [(u64, &str); 3] = [(1, "time-pos"), (2, "pause"), (3, "duration")];

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

/// Window placement in screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Geometry {
    /// Cell `index` of a grid with `columns` columns of `width`x`height`.
    pub fn tile(index: usize, columns: usize, width: u32, height: u32) -> Self {
        let columns = columns.max(1);
        let col = (index % columns) as i32;
        let row = (index / columns) as i32;
        Self {
            x: col * width as i32,
            y: row * height as i32,
            width,
            height,
        }
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}+{}+{}", self.width, self.height, self.x, self.y)
    }
}

// ---------------------------------------------------------------------------
// Observed state
// ---------------------------------------------------------------------------

/// Last values mpv pushed for the observed properties.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Observed {
    position: Option<f64>,
    paused: bool,
    duration: Option<f64>,
    connected: bool,
}

impl Default for Observed {
    fn default() -> Self {
        Self {
            position: None,
            paused: true,
            duration: None,
            connected: false,
        }
    }
}

/// Fold one IPC line into `observed`. Command replies carrying an error are
/// returned as `PreviewError::Mpv`; everything else is informational.
fn apply_line(observed: &mut Observed, line: &str) -> Result<()> {
    let value: Value = serde_json::from_str(line)?;
    match value.get("event").and_then(Value::as_str) {
        Some("property-change") => {
            let data = value.get("data");
            match value.get("name").and_then(Value::as_str) {
                Some("time-pos") => observed.position = data.and_then(Value::as_f64),
                Some("pause") => {
                    if let Some(paused) = data.and_then(Value::as_bool) {
                        observed.paused = paused;
                    }
                }
                Some("duration") => {
                    observed.duration = data
                        .and_then(Value::as_f64)
                        .filter(|d| d.is_finite() && *d > 0.0);
                }
                _ => {}
            }
            Ok(())
        }
        Some(_) => Ok(()),
        None => match value.get("error").and_then(Value::as_str) {
            Some("success") | None => Ok(()),
            Some(other) => Err(PreviewError::Mpv(other.to_string())),
        },
    }
}

fn read_events(stream: UnixStream, observed: Arc<Mutex<Observed>>) {
    for line in BufReader::new(stream).lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                tracing::debug!(error = %e, "mpv read failed");
                break;
            }
        };
        let mut guard = observed.lock();
        if let Err(e) = apply_line(&mut guard, &line) {
            tracing::debug!(error = %e, "mpv message");
        }
    }
    observed.lock().connected = false;
}

fn write_commands(mut stream: UnixStream, commands: Receiver<Value>) {
    for command in commands {
        if let Err(e) = writeln!(stream, "{}", command) {
            tracing::debug!(error = %e, "mpv write failed");
            break;
        }
    }
}

// ---------------------------------------------------------------------------
// DurationProbe
// ---------------------------------------------------------------------------

/// Detached view of a handle's observed state, used to wait for media
/// metadata off the frame loop.
#[derive(Debug, Clone)]
pub struct DurationProbe {
    observed: Arc<Mutex<Observed>>,
}

impl DurationProbe {
    /// Block until mpv reports the media duration or `timeout` elapses.
    pub fn wait(&self, timeout: Duration) -> Result<f64> {
        let deadline = Instant::now() + timeout;
        loop {
            {
                let observed = self.observed.lock();
                if let Some(duration) = observed.duration {
                    return Ok(duration);
                }
                if !observed.connected {
                    return Err(PreviewError::Disconnected);
                }
            }
            if Instant::now() >= deadline {
                return Err(PreviewError::MissingData("duration"));
            }
            std::thread::sleep(Duration::from_millis(50));
        }
    }
}

// ---------------------------------------------------------------------------
// MpvHandle
// ---------------------------------------------------------------------------

/// One mpv window playing one show item.
///
/// A reader thread mirrors `time-pos`, `pause` and `duration` from mpv
/// property events and a writer thread drains queued commands, so no
/// method here waits on the socket.
pub struct MpvHandle {
    process: Option<Child>,
    socket_path: PathBuf,
    stream: UnixStream,
    commands: Sender<Value>,
    observed: Arc<Mutex<Observed>>,
}

impl MpvHandle {
    /// Start a paused mpv window for `locator` and connect to its IPC socket.
    pub fn spawn(tag: &str, locator: &str, geometry: Geometry) -> Result<Self> {
        let socket_path =
            std::env::temp_dir().join(format!("pyroshow-mpv-{}-{}", std::process::id(), tag));
        let _ = std::fs::remove_file(&socket_path);
        tracing::debug!(%locator, %geometry, socket = %socket_path.display(), "starting mpv");

        let mut child = Command::new("mpv")
            .args([
                "--pause=yes",
                "--keep-open=always",
                "--osc=no",
                "--osd-level=0",
                "--no-border",
                "--force-window=immediate",
                "--hr-seek=yes",
                &format!("--title=pyroshow {}", tag),
                &format!("--geometry={}", geometry),
                &format!("--input-ipc-server={}", socket_path.display()),
                "--",
                locator,
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(PreviewError::Spawn)?;

        for _ in 0..50 {
            if socket_path.exists() {
                match Self::connect(socket_path.clone()) {
                    Ok(mut handle) => {
                        handle.process = Some(child);
                        return Ok(handle);
                    }
                    Err(e) => tracing::debug!(error = %e, "mpv socket not accepting yet"),
                }
            }
            std::thread::sleep(Duration::from_millis(100));
        }

        let _ = child.kill();
        let _ = child.wait();
        let _ = std::fs::remove_file(&socket_path);
        Err(PreviewError::SocketTimeout(socket_path))
    }

    /// Attach to an mpv IPC socket that is already listening.
    pub fn connect(socket_path: PathBuf) -> Result<Self> {
        let stream = UnixStream::connect(&socket_path)?;
        let reader = stream.try_clone()?;
        let writer = stream.try_clone()?;
        let observed = Arc::new(Mutex::new(Observed {
            connected: true,
            ..Observed::default()
        }));
        let (commands, queue) = mpsc::channel();
        for (id, name) in OBSERVED_PROPERTIES {
            let _ = commands.send(json!({ "command": ["observe_property", id, name] }));
        }

        std::thread::Builder::new()
            .name("mpv-reader".into())
            .spawn({
                let observed = observed.clone();
                move || read_events(reader, observed)
            })?;
        std::thread::Builder::new()
            .name("mpv-writer".into())
            .spawn(move || write_commands(writer, queue))?;

        Ok(Self {
            process: None,
            socket_path,
            stream,
            commands,
            observed,
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub fn probe(&self) -> DurationProbe {
        DurationProbe {
            observed: self.observed.clone(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.observed.lock().connected
    }

    /// Queue a command for the writer thread.
    fn send(&self, command: Value) -> Result<()> {
        if !self.is_connected() {
            return Err(PreviewError::Disconnected);
        }
        self.commands
            .send(command)
            .map_err(|_| PreviewError::Disconnected)
    }

    pub fn is_running(&self) -> bool {
        self.process.is_some() && self.is_connected()
    }

    pub fn stop(&mut self) {
        if let Some(mut child) = self.process.take() {
            let _ = self.send(json!({ "command": ["quit"] }));
            let _ = child.kill();
            let _ = child.wait();
            let _ = std::fs::remove_file(&self.socket_path);
        }
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

impl PlaybackHandle for MpvHandle {
    /// Last pushed position; `None` until mpv has reported one or once the
    /// connection is gone.
    fn position(&self) -> Option<TimeUs> {
        let observed = self.observed.lock();
        if !observed.connected {
            return None;
        }
        observed.position.map(TimeUs::from_seconds)
    }

    fn is_paused(&self) -> bool {
        self.observed.lock().paused
    }

    fn seek_to(&mut self, t: TimeUs) -> pyroshow_core::error::Result<()> {
        self.send(json!({ "command": ["seek", t.as_seconds(), "absolute+exact"] }))?;
        self.observed.lock().position = Some(t.as_seconds());
        Ok(())
    }

    fn play(&mut self) -> pyroshow_core::error::Result<()> {
        self.send(json!({ "command": ["set_property", "pause", false] }))?;
        self.observed.lock().paused = false;
        Ok(())
    }

    fn pause(&mut self) -> pyroshow_core::error::Result<()> {
        self.send(json!({ "command": ["set_property", "pause", true] }))?;
        self.observed.lock().paused = true;
        Ok(())
    }
}

impl Drop for MpvHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
