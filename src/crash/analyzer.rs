use super::bloom::Bloom;
use super::minidump::CrashReport;
use super::minidump::Decode;
use super::minidump::DumpDecoder;
use crate::TestcaseId;
use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;

/// what lands next to each archived dump
#[derive(serde::Serialize)]
struct Summary<'a> {
    testcase_id: TestcaseId,
    crash_file: String,
    #[serde(flatten)]
    report: &'a CrashReport,
}

/// consumes the dumps the target runtime leaves behind: attributes each to
/// its testcase, fingerprints the crash kind, archives deduplicated copies
/// and remembers the crashers in a bloom filter for the search loop.
pub struct Analyzer {
    decoder: Box<dyn Decode + Send + Sync>,
    dumps: PathBuf,
    crashes: PathBuf,
    counts: Mutex<BTreeMap<String, usize>>,
    crashers: Mutex<Bloom>,
}

impl Analyzer {
    pub fn new(dumps: PathBuf, crashes: PathBuf) -> Self {
        Self {
            decoder: Box::new(DumpDecoder),
            dumps,
            crashes,
            counts: Mutex::new(BTreeMap::new()),
            crashers: Mutex::new(Bloom::default()),
        }
    }

    pub fn with_decoder(mut self, decoder: Box<dyn Decode + Send + Sync>) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn is_crashing(&self, testcase: TestcaseId) -> bool {
        self.crashers.lock().unwrap().lookup(testcase)
    }

    fn set_crashing(&self, testcase: TestcaseId) {
        self.crashers.lock().unwrap().add(testcase);
    }

    /// one pass over the dumps directory; returns how many dumps were
    /// consumed. decode failures leave the dump in place for a retry,
    /// sweeping never takes the driver down.
    pub fn sweep(&self) -> usize {
        let entries = match std::fs::read_dir(&self.dumps) {
            Ok(entries) => entries,
            Err(e) => {
                log::error!("dumps directory unreadable: {}", e);
                return 0;
            }
        };
        let mut consumed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().map(|e| e == "dmp").unwrap_or(false) && self.handle(&path) {
                let _ = std::fs::remove_file(&path);
                consumed += 1;
            }
        }
        consumed
    }

    fn handle(&self, dump: &Path) -> bool {
        log::info!("handling dump file {}", dump.display());
        let bytes = match std::fs::read(dump) {
            Ok(bytes) => bytes,
            Err(e) => {
                log::error!("cannot read dump {}: {}", dump.display(), e);
                return false;
            }
        };
        let testcase = extract_testcase_id(&bytes);
        let report = match self.decoder.decode(&bytes) {
            Some(report) => report,
            None => {
                log::error!("cannot decode dump {}", dump.display());
                // undecodable dumps only block the sweep forever; drop them
                return true;
            }
        };
        self.set_crashing(testcase);
        let fingerprint = fingerprint(&report);
        let seen = {
            let mut counts = self.counts.lock().unwrap();
            let count = counts.entry(fingerprint.clone()).or_insert(0);
            *count += 1;
            *count
        };
        if seen > crate::MAX_CRASHES_PER_KIND {
            log::info!("fingerprint {} is over quota, dropping dump", fingerprint);
            return true;
        }
        self.archive(dump, &bytes, testcase, &fingerprint, &report)
    }

    fn archive(
        &self,
        dump: &Path,
        bytes: &[u8],
        testcase: TestcaseId,
        fingerprint: &str,
        report: &CrashReport,
    ) -> bool {
        let directory = self.crashes.join(fingerprint).join(testcase.to_string());
        let summary = Summary {
            testcase_id: testcase,
            crash_file: dump
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_default(),
            report,
        };
        let archived = std::fs::create_dir_all(&directory)
            .and_then(|_| std::fs::write(directory.join("dump"), bytes))
            .and_then(|_| {
                let rendered = serde_json::to_string_pretty(&summary)?;
                std::fs::write(directory.join("info.json"), rendered)
            });
        match archived {
            Ok(_) => true,
            Err(e) => {
                log::error!("cannot archive crash {}: {}", fingerprint, e);
                false
            }
        }
    }
}

/// same reason and same frame offsets mean the same crash kind
pub fn fingerprint(report: &CrashReport) -> String {
    let mut keyed = format!("{}:", report.reason);
    for frame in &report.frames {
        keyed.push_str(&format!("{:#x},", frame.offset));
    }
    crate::hex128(&crate::hash128(keyed.as_bytes()))
}

/// scan the raw dump for the environment signature the runtime embeds
fn extract_testcase_id(bytes: &[u8]) -> TestcaseId {
    let needle = format!("{}=", crate::ENV_TESTCASE_ID);
    let needle = needle.as_bytes();
    let mut id = 0;
    for start in 0..bytes.len().saturating_sub(needle.len()) {
        if &bytes[start..start + needle.len()] == needle {
            let digits = &bytes[start + needle.len()..];
            id = digits
                .iter()
                .take_while(|b| b.is_ascii_digit())
                .fold(0u64, |acc, b| acc * 10 + (b - b'0') as u64);
            break;
        }
    }
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crash::minidump::write_dump;

    fn drop_dump(dumps: &Path, name: &str, address: u64, testcase: TestcaseId) {
        let mut bytes = Vec::new();
        write_dump(
            &mut bytes,
            libc::SIGSEGV as u32,
            address,
            "demo",
            0x1000,
            0x9000,
            testcase,
        )
        .unwrap();
        std::fs::write(dumps.join(name), bytes).unwrap();
    }

    fn setup() -> (tempfile::TempDir, Analyzer) {
        let dir = tempfile::tempdir().unwrap();
        let dumps = dir.path().join("dumps");
        let crashes = dir.path().join("crashes");
        std::fs::create_dir_all(&dumps).unwrap();
        std::fs::create_dir_all(&crashes).unwrap();
        let analyzer = Analyzer::new(dumps, crashes);
        (dir, analyzer)
    }

    #[test]
    fn same_site_shares_a_fingerprint_directory() {
        let (dir, analyzer) = setup();
        let dumps = dir.path().join("dumps");
        drop_dump(&dumps, "a.dmp", 0x1042, 1);
        drop_dump(&dumps, "b.dmp", 0x1042, 2);
        drop_dump(&dumps, "c.dmp", 0x1066, 3);
        assert_eq!(analyzer.sweep(), 3);
        let kinds = std::fs::read_dir(dir.path().join("crashes"))
            .unwrap()
            .count();
        assert_eq!(kinds, 2);
        // both same-site testcases are archived under one kind
        let shared = std::fs::read_dir(dir.path().join("crashes"))
            .unwrap()
            .flatten()
            .map(|kind| std::fs::read_dir(kind.path()).unwrap().count())
            .max()
            .unwrap();
        assert_eq!(shared, 2);
        // dumps are consumed
        assert_eq!(std::fs::read_dir(&dumps).unwrap().count(), 0);
    }

    #[test]
    fn crashers_are_remembered_in_the_bloom_filter() {
        let (dir, analyzer) = setup();
        drop_dump(&dir.path().join("dumps"), "a.dmp", 0x1042, 42);
        analyzer.sweep();
        assert!(analyzer.is_crashing(42));
        assert!(!analyzer.is_crashing(43));
    }

    #[test]
    fn archives_carry_a_summary() {
        let (dir, analyzer) = setup();
        drop_dump(&dir.path().join("dumps"), "a.dmp", 0x1042, 7);
        analyzer.sweep();
        let kind = std::fs::read_dir(dir.path().join("crashes"))
            .unwrap()
            .flatten()
            .next()
            .unwrap();
        let info = kind.path().join("7").join("info.json");
        let parsed: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(info).unwrap()).unwrap();
        assert_eq!(parsed["testcase_id"], 7);
        assert_eq!(parsed["reason"], "SIGSEGV");
        assert!(kind.path().join("7").join("dump").exists());
    }

    #[test]
    fn over_quota_kinds_drop_further_dumps() {
        let (dir, analyzer) = setup();
        let dumps = dir.path().join("dumps");
        {
            let mut counts = analyzer.counts.lock().unwrap();
            drop_dump(&dumps, "probe.dmp", 0x1042, 1);
            let bytes = std::fs::read(dumps.join("probe.dmp")).unwrap();
            let report = DumpDecoder.decode(&bytes).unwrap();
            counts.insert(fingerprint(&report), crate::MAX_CRASHES_PER_KIND);
        }
        assert_eq!(analyzer.sweep(), 1);
        // consumed but not archived: the kind directory never appears
        assert_eq!(std::fs::read_dir(dir.path().join("crashes")).unwrap().count(), 0);
        // the crasher is still remembered
        assert!(analyzer.is_crashing(1));
    }

    #[test]
    fn garbage_dumps_are_dropped_not_fatal() {
        let (dir, analyzer) = setup();
        std::fs::write(dir.path().join("dumps").join("junk.dmp"), b"junk").unwrap();
        assert_eq!(analyzer.sweep(), 1);
        assert_eq!(std::fs::read_dir(dir.path().join("crashes")).unwrap().count(), 0);
    }
}
