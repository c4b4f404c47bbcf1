use super::FdPool;
use crate::provider::FdProvider;
use log::debug;
use rand_core::RngCore;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::fd::{AsRawFd, RawFd};
use tempfile::NamedTempFile;

/// Readable files that exist on pretty much any Linux box.
const FILE_PATHS: &[&str] = &[
    "/dev/null",
    "/dev/zero",
    "/dev/urandom",
    "/proc/self/status",
    "/proc/self/maps",
    "/proc/self/mountinfo",
    "/proc/cpuinfo",
    "/etc/passwd",
    "/sys/kernel/mm/transparent_hugepage/enabled",
];

const NR_TESTFILES: usize = 4;

/// Opens a fixed set of system files; unreadable ones are skipped.
#[derive(Debug, Default)]
pub struct FilesProvider {
    pool: FdPool,
}

impl FilesProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FdProvider for FilesProvider {
    fn name(&self) -> &'static str {
        "files"
    }

    fn open(&mut self) -> bool {
        for path in FILE_PATHS {
            let opened = OpenOptions::new()
                .read(true)
                .write(path.starts_with("/dev/"))
                .open(path)
                .or_else(|_| File::open(path));
            match opened {
                Ok(file) => self.pool.push(file),
                Err(e) => debug!("files: skipping {path}: {e}"),
            }
        }
        !self.pool.is_empty()
    }

    fn get(&mut self, rng: &mut dyn RngCore) -> RawFd {
        self.pool.pick(rng)
    }
}

/// Scratch files the run may write, truncate and map freely.
///
/// They live in the temp dir and are unlinked when the provider is dropped.
#[derive(Debug, Default)]
pub struct TestfileProvider {
    files: Vec<NamedTempFile>,
}

impl TestfileProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FdProvider for TestfileProvider {
    fn name(&self) -> &'static str {
        "testfile"
    }

    fn open(&mut self) -> bool {
        for i in 0..NR_TESTFILES {
            let created = tempfile::Builder::new()
                .prefix(&format!("fdpool-testfile{}-", i + 1))
                .tempfile();
            match created {
                Ok(mut file) => {
                    // Some content so reads and mmaps have something to hit.
                    if let Err(e) = file.write_all(&[0u8; 4096]) {
                        debug!("testfile: filling {:?}: {e}", file.path());
                    }
                    self.files.push(file);
                }
                Err(e) => {
                    debug!("testfile: {e}");
                    break;
                }
            }
        }
        !self.files.is_empty()
    }

    fn get(&mut self, rng: &mut dyn RngCore) -> RawFd {
        let index = rng.next_u64() as usize % self.files.len();
        self.files[index].as_file().as_raw_fd()
    }
}
