use byteorder::LE;
use byteorder::ReadBytesExt;
use byteorder::WriteBytesExt;
use std::io::Cursor;
use std::io::Seek;
use std::io::SeekFrom;
use std::io::Write;

const SIGNATURE: u32 = 0x504d_444d; // "MDMP"
const VERSION: u32 = 0xa793;

const STREAM_MODULE_LIST: u32 = 4;
const STREAM_EXCEPTION: u32 = 6;

const HEADER_BYTES: u32 = 32;
const DIRECTORY_ENTRY_BYTES: u32 = 12;
const MODULE_BYTES: usize = 108;

/// one resolved frame of the crashing thread
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Frame {
    pub module: String,
    pub offset: u64,
}

/// what the decoder extracts from a dump: enough to name the crash kind
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct CrashReport {
    pub reason: String,
    pub address: u64,
    pub frames: Vec<Frame>,
}

/// decoder seam. the pipeline only needs dump bytes to become a report;
/// richer symbolizing decoders plug in here.
pub trait Decode {
    fn decode(&self, bytes: &[u8]) -> Option<CrashReport>;
}

/// best-effort built-in decoder: walks the header, the stream directory,
/// the exception stream, and the module list, and reports the faulting
/// address as a single module+offset frame.
#[derive(Default)]
pub struct DumpDecoder;

struct Module {
    base: u64,
    size: u32,
    name: String,
}

impl Decode for DumpDecoder {
    fn decode(&self, bytes: &[u8]) -> Option<CrashReport> {
        let mut r = Cursor::new(bytes);
        if r.read_u32::<LE>().ok()? != SIGNATURE {
            return None;
        }
        let _version = r.read_u32::<LE>().ok()?;
        let streams = r.read_u32::<LE>().ok()?;
        let directory = r.read_u32::<LE>().ok()?;
        let mut exception = None;
        let mut modules = Vec::new();
        for index in 0..streams {
            let entry = directory + index * DIRECTORY_ENTRY_BYTES;
            r.seek(SeekFrom::Start(entry as u64)).ok()?;
            let kind = r.read_u32::<LE>().ok()?;
            let _size = r.read_u32::<LE>().ok()?;
            let rva = r.read_u32::<LE>().ok()?;
            match kind {
                STREAM_EXCEPTION => exception = read_exception(bytes, rva),
                STREAM_MODULE_LIST => modules = read_modules(bytes, rva),
                _ => continue,
            }
        }
        let (code, address) = exception?;
        let frames = match modules.iter().find(|m| m.contains(address)) {
            Some(module) => vec![Frame {
                module: module.name.clone(),
                offset: address - module.base,
            }],
            None => vec![],
        };
        Some(CrashReport {
            reason: signal_name(code).to_string(),
            address,
            frames,
        })
    }
}

impl Module {
    fn contains(&self, address: u64) -> bool {
        address >= self.base && address < self.base + self.size as u64
    }
}

fn read_exception(bytes: &[u8], rva: u32) -> Option<(u32, u64)> {
    let mut r = Cursor::new(bytes);
    r.seek(SeekFrom::Start(rva as u64)).ok()?;
    let _thread = r.read_u32::<LE>().ok()?;
    let _align = r.read_u32::<LE>().ok()?;
    let code = r.read_u32::<LE>().ok()?;
    let _flags = r.read_u32::<LE>().ok()?;
    let _inner = r.read_u64::<LE>().ok()?;
    let address = r.read_u64::<LE>().ok()?;
    Some((code, address))
}

fn read_modules(bytes: &[u8], rva: u32) -> Vec<Module> {
    let mut modules = Vec::new();
    let mut r = Cursor::new(bytes);
    if r.seek(SeekFrom::Start(rva as u64)).is_err() {
        return modules;
    }
    let count = match r.read_u32::<LE>() {
        Ok(count) => count,
        Err(_) => return modules,
    };
    for index in 0..count {
        let offset = rva as u64 + 4 + index as u64 * MODULE_BYTES as u64;
        if r.seek(SeekFrom::Start(offset)).is_err() {
            break;
        }
        let base = match r.read_u64::<LE>() {
            Ok(base) => base,
            Err(_) => break,
        };
        let size = r.read_u32::<LE>().unwrap_or(0);
        let _checksum = r.read_u32::<LE>().unwrap_or(0);
        let _time = r.read_u32::<LE>().unwrap_or(0);
        let name_rva = r.read_u32::<LE>().unwrap_or(0);
        let name = read_string(bytes, name_rva).unwrap_or_default();
        modules.push(Module { base, size, name });
    }
    modules
}

/// MINIDUMP_STRING: u32 byte length + UTF-16LE code units
fn read_string(bytes: &[u8], rva: u32) -> Option<String> {
    let mut r = Cursor::new(bytes);
    r.seek(SeekFrom::Start(rva as u64)).ok()?;
    let length = r.read_u32::<LE>().ok()? as usize / 2;
    let units = (0..length)
        .map(|_| r.read_u16::<LE>())
        .collect::<Result<Vec<_>, _>>()
        .ok()?;
    String::from_utf16(&units).ok()
}

fn signal_name(code: u32) -> &'static str {
    match code as i32 {
        libc::SIGSEGV => "SIGSEGV",
        libc::SIGABRT => "SIGABRT",
        libc::SIGBUS => "SIGBUS",
        libc::SIGFPE => "SIGFPE",
        libc::SIGILL => "SIGILL",
        _ => "SIGNAL_UNKNOWN",
    }
}

/// minimal dump emission, used by the runtime's crash handler. the layout
/// is the documented subset the built-in decoder understands, padded with
/// the environment signature the pipeline scans for testcase attribution.
pub fn write_dump(
    w: &mut impl Write,
    code: u32,
    address: u64,
    module: &str,
    base: u64,
    size: u32,
    testcase: u64,
) -> std::io::Result<()> {
    let directory = HEADER_BYTES;
    let exception_rva = directory + 2 * DIRECTORY_ENTRY_BYTES;
    let exception_bytes = 4 + 4 + 4 + 4 + 8 + 8;
    let modules_rva = exception_rva + exception_bytes;
    let modules_bytes = 4 + MODULE_BYTES as u32;
    let name_rva = modules_rva + modules_bytes;

    w.write_u32::<LE>(SIGNATURE)?;
    w.write_u32::<LE>(VERSION)?;
    w.write_u32::<LE>(2)?;
    w.write_u32::<LE>(directory)?;
    w.write_u32::<LE>(0)?;
    w.write_u32::<LE>(0)?;
    w.write_u64::<LE>(0)?;

    // stream directory
    w.write_u32::<LE>(STREAM_EXCEPTION)?;
    w.write_u32::<LE>(exception_bytes)?;
    w.write_u32::<LE>(exception_rva)?;
    w.write_u32::<LE>(STREAM_MODULE_LIST)?;
    w.write_u32::<LE>(modules_bytes)?;
    w.write_u32::<LE>(modules_rva)?;

    // exception stream
    w.write_u32::<LE>(0)?; // thread id
    w.write_u32::<LE>(0)?; // alignment
    w.write_u32::<LE>(code)?;
    w.write_u32::<LE>(0)?; // flags
    w.write_u64::<LE>(0)?; // inner record
    w.write_u64::<LE>(address)?;

    // module list
    w.write_u32::<LE>(1)?;
    w.write_u64::<LE>(base)?;
    w.write_u32::<LE>(size)?;
    w.write_u32::<LE>(0)?; // checksum
    w.write_u32::<LE>(0)?; // timestamp
    w.write_u32::<LE>(name_rva)?;
    w.write_all(&vec![0u8; MODULE_BYTES - 24])?;

    // module name
    w.write_u32::<LE>(2 * module.len() as u32)?;
    for unit in module.encode_utf16() {
        w.write_u16::<LE>(unit)?;
    }

    // environment signature for testcase attribution
    write!(w, "{}={}\0", crate::ENV_TESTCASE_ID, testcase)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dump(code: u32, address: u64, testcase: u64) -> Vec<u8> {
        let mut bytes = Vec::new();
        write_dump(&mut bytes, code, address, "demo", 0x1000, 0x9000, testcase).unwrap();
        bytes
    }

    #[test]
    fn decoder_reads_back_what_the_writer_emits() {
        let bytes = dump(libc::SIGSEGV as u32, 0x1042, 7);
        let report = DumpDecoder.decode(&bytes).unwrap();
        assert_eq!(report.reason, "SIGSEGV");
        assert_eq!(report.address, 0x1042);
        assert_eq!(report.frames.len(), 1);
        assert_eq!(report.frames[0].module, "demo");
        assert_eq!(report.frames[0].offset, 0x42);
    }

    #[test]
    fn address_outside_modules_keeps_an_empty_walk() {
        let bytes = dump(libc::SIGBUS as u32, 0xdead_0000, 7);
        let report = DumpDecoder.decode(&bytes).unwrap();
        assert_eq!(report.reason, "SIGBUS");
        assert!(report.frames.is_empty());
    }

    #[test]
    fn garbage_is_not_a_report() {
        assert!(DumpDecoder.decode(b"not a dump").is_none());
        assert!(DumpDecoder.decode(&[]).is_none());
    }

    #[test]
    fn testcase_signature_is_embedded() {
        let bytes = dump(libc::SIGSEGV as u32, 0x1042, 1234);
        let needle = format!("{}=1234", crate::ENV_TESTCASE_ID);
        let haystack = String::from_utf8_lossy(&bytes).to_string();
        assert!(haystack.contains(&needle));
    }
}
