//! Shared-memory control block.
//!
//! A memory-mapped file carries replay telemetry between the supervisor
//! and whatever steering process created the mapping: lifecycle flags,
//! death counters and a ring buffer of fixed-size text records. Counters
//! are atomics inside the mapping; the ring buffer is guarded by a named
//! mutex realized as an `flock`ed companion file. Openers validate the
//! header and refuse anything that does not look like a control block.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use memmap2::MmapMut;
use thiserror::Error;

pub const CONTROL_BLOCK_MAGIC: u32 = 0x5650_4331; // "VPC1"
pub const CONTROL_BLOCK_MESSAGE_SIZE: usize = 64;
pub const CONTROL_BLOCK_HEADER_SIZE: usize = 64;

// Header field offsets, all 4-byte aligned.
const OFFSET_MAGIC: usize = 0;
const OFFSET_RING_OFFSET: usize = 4;
const OFFSET_RING_SIZE: usize = 8;
const OFFSET_RING_HEAD: usize = 12;
const OFFSET_PROGRESS_STARTED: usize = 16;
const OFFSET_PROGRESS_COMPLETE: usize = 20;
const OFFSET_BANNED_MODULES: usize = 24;
const OFFSET_CLEAN_DEATHS: usize = 28;
const OFFSET_DIRTY_DEATHS: usize = 32;

#[derive(Debug, Error)]
pub enum ControlBlockError {
    #[error("control block is corrupt: {0}")]
    Corrupt(&'static str),

    #[error("ring size {0} is not a power of two")]
    BadRingSize(u32),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Bare names live under `/dev/shm`, anything with a separator is a path.
fn shm_path(name: &str) -> PathBuf {
    if name.contains('/') {
        PathBuf::from(name)
    } else {
        Path::new("/dev/shm").join(name)
    }
}

pub struct ControlBlock {
    map: MmapMut,
    _file: File,
    mutex_file: File,
}

impl ControlBlock {
    /// Create and initialize a control block. `ring_size` is the ring
    /// buffer's byte size and must be a power of two multiple of the
    /// record size.
    pub fn create(name: &str, mutex_name: &str, ring_size: u32) -> Result<Self, ControlBlockError> {
        if ring_size == 0
            || !ring_size.is_power_of_two()
            || ring_size as usize % CONTROL_BLOCK_MESSAGE_SIZE != 0
        {
            return Err(ControlBlockError::BadRingSize(ring_size));
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(shm_path(name))?;
        file.set_len((CONTROL_BLOCK_HEADER_SIZE + ring_size as usize) as u64)?;
        let mut map = unsafe { MmapMut::map_mut(&file)? };

        map[OFFSET_MAGIC..OFFSET_MAGIC + 4].copy_from_slice(&CONTROL_BLOCK_MAGIC.to_le_bytes());
        map[OFFSET_RING_OFFSET..OFFSET_RING_OFFSET + 4]
            .copy_from_slice(&(CONTROL_BLOCK_HEADER_SIZE as u32).to_le_bytes());
        map[OFFSET_RING_SIZE..OFFSET_RING_SIZE + 4].copy_from_slice(&ring_size.to_le_bytes());

        let mutex_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(shm_path(mutex_name))?;

        Ok(Self {
            map,
            _file: file,
            mutex_file,
        })
    }

    /// Map an existing control block, validating the header.
    pub fn open(name: &str, mutex_name: &str) -> Result<Self, ControlBlockError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(shm_path(name))?;
        let map = unsafe { MmapMut::map_mut(&file)? };

        if map.len() < CONTROL_BLOCK_HEADER_SIZE {
            return Err(ControlBlockError::Corrupt("mapping too small"));
        }
        let magic = u32::from_le_bytes(map[OFFSET_MAGIC..OFFSET_MAGIC + 4].try_into().unwrap());
        if magic != CONTROL_BLOCK_MAGIC {
            return Err(ControlBlockError::Corrupt("bad magic cookie"));
        }
        let ring_offset =
            u32::from_le_bytes(map[OFFSET_RING_OFFSET..OFFSET_RING_OFFSET + 4].try_into().unwrap());
        let ring_size =
            u32::from_le_bytes(map[OFFSET_RING_SIZE..OFFSET_RING_SIZE + 4].try_into().unwrap());
        if (ring_offset as usize) < CONTROL_BLOCK_HEADER_SIZE {
            return Err(ControlBlockError::Corrupt("ring overlaps header"));
        }
        if ring_size == 0 || !ring_size.is_power_of_two() {
            return Err(ControlBlockError::Corrupt("ring size is not a power of two"));
        }
        if ring_offset as usize + ring_size as usize > map.len() {
            return Err(ControlBlockError::Corrupt("ring exceeds mapping"));
        }

        let mutex_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(shm_path(mutex_name))?;

        Ok(Self {
            map,
            _file: file,
            mutex_file,
        })
    }

    fn counter(&self, offset: usize) -> &AtomicU32 {
        // SAFETY: the offset is in bounds, 4-byte aligned within a
        // page-aligned mapping, and all cross-process access to these
        // words goes through atomic operations.
        unsafe { &*(self.map.as_ptr().add(offset) as *const AtomicU32) }
    }

    pub fn set_progress_started(&self) {
        self.counter(OFFSET_PROGRESS_STARTED).store(1, Ordering::Release);
    }

    pub fn set_progress_complete(&self) {
        self.counter(OFFSET_PROGRESS_COMPLETE).store(1, Ordering::Release);
    }

    pub fn progress_started(&self) -> bool {
        self.counter(OFFSET_PROGRESS_STARTED).load(Ordering::Acquire) != 0
    }

    pub fn progress_complete(&self) -> bool {
        self.counter(OFFSET_PROGRESS_COMPLETE).load(Ordering::Acquire) != 0
    }

    pub fn increment_banned_modules(&self) {
        self.counter(OFFSET_BANNED_MODULES).fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_clean_deaths(&self) {
        self.counter(OFFSET_CLEAN_DEATHS).fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_dirty_deaths(&self) {
        self.counter(OFFSET_DIRTY_DEATHS).fetch_add(1, Ordering::Relaxed);
    }

    pub fn banned_modules(&self) -> u32 {
        self.counter(OFFSET_BANNED_MODULES).load(Ordering::Relaxed)
    }

    pub fn clean_deaths(&self) -> u32 {
        self.counter(OFFSET_CLEAN_DEATHS).load(Ordering::Relaxed)
    }

    pub fn dirty_deaths(&self) -> u32 {
        self.counter(OFFSET_DIRTY_DEATHS).load(Ordering::Relaxed)
    }

    fn ring_offset(&self) -> usize {
        u32::from_le_bytes(
            self.map[OFFSET_RING_OFFSET..OFFSET_RING_OFFSET + 4]
                .try_into()
                .unwrap(),
        ) as usize
    }

    fn ring_records(&self) -> usize {
        u32::from_le_bytes(
            self.map[OFFSET_RING_SIZE..OFFSET_RING_SIZE + 4]
                .try_into()
                .unwrap(),
        ) as usize
            / CONTROL_BLOCK_MESSAGE_SIZE
    }

    fn lock(&self) -> io::Result<()> {
        let ret = unsafe { libc::flock(self.mutex_file.as_raw_fd(), libc::LOCK_EX) };
        if ret != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn unlock(&self) {
        unsafe { libc::flock(self.mutex_file.as_raw_fd(), libc::LOCK_UN) };
    }

    /// Append one fixed-size text record to the ring buffer, holding the
    /// named mutex for the duration of the insert. Oversized text is
    /// truncated to the record size, NUL padding included.
    pub fn write_message(&self, text: &str) -> io::Result<()> {
        self.lock()?;

        let head = self.counter(OFFSET_RING_HEAD).load(Ordering::Relaxed);
        let slot = head as usize % self.ring_records();
        let start = self.ring_offset() + slot * CONTROL_BLOCK_MESSAGE_SIZE;

        let mut record = [0u8; CONTROL_BLOCK_MESSAGE_SIZE];
        let len = text.len().min(CONTROL_BLOCK_MESSAGE_SIZE - 1);
        record[..len].copy_from_slice(&text.as_bytes()[..len]);

        // SAFETY: the record slot is inside the mapping and the named
        // mutex serializes writers.
        unsafe {
            std::ptr::copy_nonoverlapping(
                record.as_ptr(),
                self.map.as_ptr().add(start) as *mut u8,
                CONTROL_BLOCK_MESSAGE_SIZE,
            );
        }
        self.counter(OFFSET_RING_HEAD)
            .store(head.wrapping_add(1), Ordering::Release);

        self.unlock();
        Ok(())
    }

    pub fn messages_written(&self) -> u32 {
        self.counter(OFFSET_RING_HEAD).load(Ordering::Acquire)
    }

    /// Read back record `index` (counted from the start of the run) if it
    /// is still inside the ring window.
    pub fn message(&self, index: u32) -> Option<String> {
        let head = self.messages_written();
        let records = self.ring_records() as u32;
        if index >= head || head - index > records {
            return None;
        }
        let slot = index as usize % records as usize;
        let start = self.ring_offset() + slot * CONTROL_BLOCK_MESSAGE_SIZE;
        let record = &self.map[start..start + CONTROL_BLOCK_MESSAGE_SIZE];
        let end = record.iter().position(|&b| b == 0).unwrap_or(record.len());
        Some(String::from_utf8_lossy(&record[..end]).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_names(dir: &tempfile::TempDir) -> (String, String) {
        (
            dir.path().join("vpc-shm").to_str().unwrap().to_string(),
            dir.path().join("vpc-shm.lock").to_str().unwrap().to_string(),
        )
    }

    #[test]
    fn create_then_open_round_trips_counters() {
        let dir = tempfile::tempdir().unwrap();
        let (shm, mutex) = temp_names(&dir);

        let block = ControlBlock::create(&shm, &mutex, 4096).unwrap();
        block.set_progress_started();
        block.increment_banned_modules();
        block.increment_clean_deaths();
        drop(block);

        let block = ControlBlock::open(&shm, &mutex).unwrap();
        assert!(block.progress_started());
        assert!(!block.progress_complete());
        assert_eq!(block.banned_modules(), 1);
        assert_eq!(block.clean_deaths(), 1);
        assert_eq!(block.dirty_deaths(), 0);
    }

    #[test]
    fn rejects_bad_magic() {
        let dir = tempfile::tempdir().unwrap();
        let (shm, mutex) = temp_names(&dir);

        ControlBlock::create(&shm, &mutex, 4096).unwrap();
        {
            use std::io::{Seek, SeekFrom, Write};
            let mut file = OpenOptions::new().write(true).open(shm_path(&shm)).unwrap();
            file.seek(SeekFrom::Start(0)).unwrap();
            file.write_all(&0xdead_beefu32.to_le_bytes()).unwrap();
        }
        assert!(matches!(
            ControlBlock::open(&shm, &mutex),
            Err(ControlBlockError::Corrupt("bad magic cookie"))
        ));
    }

    #[test]
    fn rejects_non_power_of_two_ring() {
        let dir = tempfile::tempdir().unwrap();
        let (shm, mutex) = temp_names(&dir);
        assert!(matches!(
            ControlBlock::create(&shm, &mutex, 3000),
            Err(ControlBlockError::BadRingSize(3000))
        ));
    }

    #[test]
    fn ring_messages_round_trip_and_wrap() {
        let dir = tempfile::tempdir().unwrap();
        let (shm, mutex) = temp_names(&dir);

        // Room for two records.
        let block = ControlBlock::create(&shm, &mutex, 128).unwrap();
        block.write_message("MODULE deadbeef").unwrap();
        assert_eq!(block.messages_written(), 1);
        assert_eq!(block.message(0).as_deref(), Some("MODULE deadbeef"));

        block.write_message("MODULE 1").unwrap();
        block.write_message("MODULE 2").unwrap();
        // The first record has been overwritten by the wrap-around.
        assert_eq!(block.message(0), None);
        assert_eq!(block.message(2).as_deref(), Some("MODULE 2"));
    }
}
