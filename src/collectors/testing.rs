use super::source::{CounterSource, FsStat};
use super::ReadError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};
use tokio::time::Instant;

/// Scripted counter source for tests.
///
/// A file registered with two texts returns the first one at the instant of
/// the first scripted read and the second one at any later instant, so every
/// sampling window sees a "before" and an "after" regardless of how reads
/// from concurrent windows interleave. Meant for paused-clock tests.
#[derive(Default)]
pub struct FakeSource {
    files: HashMap<String, Vec<String>>,
    fs: HashMap<String, FsStat>,
    pids: Option<Vec<u32>>,
    os_release: Option<String>,
    epoch: Mutex<Option<Instant>>,
    fs_gate: Option<FsGate>,
}

/// Holds every `fs_stat` call until the paired sender fires or is dropped.
struct FsGate {
    entered: Arc<AtomicBool>,
    release: Mutex<Receiver<()>>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self {
            pids: Some(Vec::new()),
            ..Self::default()
        }
    }

    pub fn with(mut self, name: &str, text: &str) -> Self {
        self.files.insert(name.to_string(), vec![text.to_string()]);
        self
    }

    pub fn with_samples(mut self, name: &str, before: &str, after: &str) -> Self {
        self.files
            .insert(name.to_string(), vec![before.to_string(), after.to_string()]);
        self
    }

    pub fn with_fs(mut self, mount: &str, stat: FsStat) -> Self {
        self.fs.insert(mount.to_string(), stat);
        self
    }

    pub fn with_process(mut self, pid: u32, state: char) -> Self {
        self.pids.get_or_insert_with(Vec::new).push(pid);
        self.with(&format!("{pid}/stat"), &format!("{pid} (proc {pid}) {state} 1 1 1"))
    }

    pub fn without_process_table(mut self) -> Self {
        self.pids = None;
        self
    }

    pub fn with_blocking_fs(mut self, release: Receiver<()>, entered: Arc<AtomicBool>) -> Self {
        self.fs_gate = Some(FsGate {
            entered,
            release: Mutex::new(release),
        });
        self
    }

    pub fn with_os_release(mut self, text: &str) -> Self {
        self.os_release = Some(text.to_string());
        self
    }

    fn is_after_first_read(&self) -> bool {
        let now = Instant::now();
        match self.epoch.lock() {
            Ok(mut epoch) => now > *epoch.get_or_insert(now),
            Err(_) => false,
        }
    }
}

fn missing(name: &str) -> ReadError {
    ReadError::Io {
        source_name: name.to_string(),
        error: std::io::Error::from(std::io::ErrorKind::NotFound),
    }
}

impl CounterSource for FakeSource {
    fn read(&self, name: &str) -> Result<String, ReadError> {
        let texts = self.files.get(name).ok_or_else(|| missing(name))?;
        match texts.as_slice() {
            [only] => Ok(only.clone()),
            [before, after] => Ok(if self.is_after_first_read() {
                after.clone()
            } else {
                before.clone()
            }),
            _ => Err(missing(name)),
        }
    }

    fn process_ids(&self) -> Result<Vec<u32>, ReadError> {
        self.pids.clone().ok_or_else(|| missing("process table"))
    }

    fn fs_stat(&self, mount: &str) -> Result<FsStat, ReadError> {
        if let Some(gate) = &self.fs_gate {
            gate.entered.store(true, Ordering::SeqCst);
            if let Ok(release) = gate.release.lock() {
                let _ = release.recv();
            }
        }
        self.fs.get(mount).copied().ok_or_else(|| missing(mount))
    }

    fn os_release(&self) -> Result<String, ReadError> {
        self.os_release.clone().ok_or_else(|| missing("os-release"))
    }
}
