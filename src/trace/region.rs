use super::record::TraceRecord;
use crate::TestcaseId;
use byteorder::ByteOrder;
use byteorder::LE;
use memmap2::MmapMut;
use std::fs::File;
use std::fs::OpenOptions;
use std::os::fd::AsRawFd;
use std::path::PathBuf;

const MAGIC: u64 = 0x474f_414c_465a_5452;
const HEADER_BYTES: usize = 64;
const OFF_MAGIC: usize = 0;
const OFF_CAPACITY: usize = 8;
const OFF_USED: usize = 16;
const OFF_CURSOR: usize = 24;

/// one appended entry: testcase id + record
const ENTRY_BYTES: usize = 8 + TraceRecord::BYTES;

/// the process-wide shared mapping carrying traces from target to fuzzer.
/// a name-keyed file under the system temp directory backs the mapping; a
/// file lock doubles as the named mutex both sides take around access. the
/// payload is an append log of (testcase id, record) entries with a drain
/// cursor; the log is compacted whenever the reader catches up.
pub struct Region {
    path: PathBuf,
    file: File,
    map: MmapMut,
}

// attachment lifecycle
impl Region {
    pub fn path_for(name: &str) -> PathBuf {
        std::env::temp_dir().join(name)
    }

    /// fuzzer side: create (or reset) the region at one base size
    pub fn create(name: &str) -> std::io::Result<Self> {
        let path = Self::path_for(name);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        file.set_len(crate::TRACE_REGION_BASE_SIZE)?;
        let map = unsafe { MmapMut::map_mut(&file)? };
        let mut region = Self { path, file, map };
        LE::write_u64(&mut region.map[OFF_MAGIC..OFF_MAGIC + 8], MAGIC);
        region.write_header(OFF_CAPACITY, crate::TRACE_REGION_BASE_SIZE);
        region.write_header(OFF_USED, 0);
        region.write_header(OFF_CURSOR, 0);
        region.map.flush()?;
        Ok(region)
    }

    /// target side: attach to an existing region or fail
    pub fn open(name: &str) -> std::io::Result<Self> {
        let path = Self::path_for(name);
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        let map = unsafe { MmapMut::map_mut(&file)? };
        let region = Self { path, file, map };
        if region.map.len() < HEADER_BYTES
            || LE::read_u64(&region.map[OFF_MAGIC..OFF_MAGIC + 8]) != MAGIC
        {
            return Err(std::io::Error::other("trace region not initialized"));
        }
        Ok(region)
    }

    pub fn remove(name: &str) {
        let _ = std::fs::remove_file(Self::path_for(name));
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

// header bookkeeping
impl Region {
    fn read_header(&self, offset: usize) -> u64 {
        LE::read_u64(&self.map[offset..offset + 8])
    }

    fn write_header(&mut self, offset: usize, value: u64) {
        LE::write_u64(&mut self.map[offset..offset + 8], value);
    }

    pub fn capacity(&self) -> u64 {
        self.read_header(OFF_CAPACITY)
    }

    pub fn free(&self) -> u64 {
        self.capacity() - HEADER_BYTES as u64 - self.read_header(OFF_USED)
    }

    /// another attachment may have grown the file under us
    fn remap_if_grown(&mut self) -> std::io::Result<()> {
        if self.capacity() > self.map.len() as u64 {
            self.map = unsafe { MmapMut::map_mut(&self.file)? };
        }
        Ok(())
    }

    /// add one base size and reattach
    fn grow(&mut self) -> std::io::Result<()> {
        let capacity = self.capacity() + crate::TRACE_REGION_BASE_SIZE;
        self.file.set_len(capacity)?;
        self.map = unsafe { MmapMut::map_mut(&self.file)? };
        self.write_header(OFF_CAPACITY, capacity);
        log::info!("trace region grown to {} bytes", capacity);
        Ok(())
    }
}

// the named mutex around the log. holds the raw descriptor so the region
// stays mutably borrowable while locked; the file outlives every lock site.
struct Lock(std::os::fd::RawFd);

impl Lock {
    fn acquire(fd: std::os::fd::RawFd) -> std::io::Result<Self> {
        if unsafe { libc::flock(fd, libc::LOCK_EX) } != 0 {
            return Err(std::io::Error::last_os_error());
        }
        Ok(Self(fd))
    }
}

impl Drop for Lock {
    fn drop(&mut self) {
        unsafe { libc::flock(self.0, libc::LOCK_UN) };
    }
}

// log access
impl Region {
    /// append a batch of records for one testcase. grows the mapping when
    /// free space falls under a quarter of capacity.
    pub fn append(&mut self, testcase: TestcaseId, records: &[TraceRecord]) -> std::io::Result<()> {
        let _lock = Lock::acquire(self.file.as_raw_fd())?;
        self.remap_if_grown()?;
        let needed = (records.len() * ENTRY_BYTES) as u64;
        while self.free() < needed || self.free() * 4 < self.capacity() {
            self.grow()?;
        }
        let mut offset = HEADER_BYTES + self.read_header(OFF_USED) as usize;
        for record in records {
            LE::write_u64(&mut self.map[offset..offset + 8], testcase);
            let mut cursor = &mut self.map[offset + 8..offset + ENTRY_BYTES];
            record.encode(&mut cursor)?;
            offset += ENTRY_BYTES;
        }
        let used = (offset - HEADER_BYTES) as u64;
        self.write_header(OFF_USED, used);
        Ok(())
    }

    /// read everything past the cursor and compact the log
    pub fn drain(&mut self) -> std::io::Result<Vec<(TestcaseId, TraceRecord)>> {
        let _lock = Lock::acquire(self.file.as_raw_fd())?;
        self.remap_if_grown()?;
        let used = self.read_header(OFF_USED) as usize;
        let cursor = self.read_header(OFF_CURSOR) as usize;
        let mut drained = Vec::with_capacity((used - cursor) / ENTRY_BYTES);
        let mut offset = HEADER_BYTES + cursor;
        while offset + ENTRY_BYTES <= HEADER_BYTES + used {
            let testcase = LE::read_u64(&self.map[offset..offset + 8]);
            let mut bytes = &self.map[offset + 8..offset + ENTRY_BYTES];
            match TraceRecord::decode(&mut bytes) {
                Ok(record) => drained.push((testcase, record)),
                Err(e) => log::info!("dropping undecodable trace entry: {}", e),
            }
            offset += ENTRY_BYTES;
        }
        self.write_header(OFF_USED, 0);
        self.write_header(OFF_CURSOR, 0);
        Ok(drained)
    }
}
