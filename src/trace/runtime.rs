use super::record::TraceKind;
use super::record::TraceRecord;
use super::region::Region;
use crate::TestcaseId;
use std::sync::Mutex;
use std::sync::OnceLock;

/// the writer half of the trace transport, linked into the instrumented
/// target. rewritten functions call the exported symbols below; records
/// batch in-process and flush into the shared region every
/// `TRACE_FLUSH_EVENT_RATE` events and on every way out of the process
/// (normal exit, fatal signal, controlled timeout).
pub struct Runtime {
    testcase: TestcaseId,
    region: Mutex<Region>,
    batch: Mutex<Vec<TraceRecord>>,
}

static RUNTIME: OnceLock<Runtime> = OnceLock::new();

impl Runtime {
    /// the singleton, constructed on the first trace emission
    pub fn instance() -> &'static Runtime {
        let runtime = RUNTIME.get_or_init(|| {
            install_exit_handlers();
            Runtime {
                testcase: testcase_from_env(),
                region: Mutex::new(attach()),
                batch: Mutex::new(Vec::with_capacity(crate::TRACE_FLUSH_EVENT_RATE)),
            }
        });
        // deliberate fault once crash handling is live, to validate the
        // crash pipeline end to end
        static CRASH_ME: std::sync::Once = std::sync::Once::new();
        CRASH_ME.call_once(|| {
            if std::env::var(crate::ENV_CRASH_ME).as_deref() == Ok("1") {
                unsafe { libc::raise(libc::SIGSEGV) };
            }
        });
        runtime
    }

    pub fn testcase(&self) -> TestcaseId {
        self.testcase
    }

    pub fn record(&self, record: TraceRecord) {
        let full = {
            let mut batch = self.batch.lock().unwrap();
            batch.push(record);
            batch.len() >= crate::TRACE_FLUSH_EVENT_RATE
        };
        if full {
            self.flush();
        }
    }

    pub fn flush(&self) {
        let drained = {
            let mut batch = self.batch.lock().unwrap();
            std::mem::take(&mut *batch)
        };
        if drained.is_empty() {
            return;
        }
        let mut region = self.region.lock().unwrap();
        if let Err(e) = region.append(self.testcase, &drained) {
            // best effort: the trace carries whatever made it through
            eprintln!("goalfuzz runtime: flush failed: {}", e);
        }
    }
}

/// the region must exist before the target runs; the fuzzer creates it.
/// if it is not there yet we retry on a fixed cadence, as a target started
/// before the fuzzer would otherwise lose its whole trace.
fn attach() -> Region {
    loop {
        match Region::open(crate::TRACE_REGION_NAME) {
            Ok(region) => return region,
            Err(_) => {
                std::thread::sleep(std::time::Duration::from_secs(crate::TRACE_ATTACH_RETRY_SECS))
            }
        }
    }
}

fn testcase_from_env() -> TestcaseId {
    std::env::var(crate::ENV_TESTCASE_ID)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(0)
}

fn thread_id() -> u64 {
    use std::hash::Hash;
    use std::hash::Hasher;
    let ref mut hasher = std::collections::hash_map::DefaultHasher::new();
    std::thread::current().id().hash(hasher);
    hasher.finish()
}

// exit paths. handlers append the terminal marker and flush so the fuzzer
// always sees how the run ended.

extern "C" fn on_exit() {
    if let Some(runtime) = RUNTIME.get() {
        runtime.record(TraceRecord::marker(TraceKind::Terminated));
        runtime.flush();
    }
}

extern "C" fn on_timeout(_signal: libc::c_int) {
    if let Some(runtime) = RUNTIME.get() {
        runtime.record(TraceRecord::marker(TraceKind::TimedOut));
        runtime.flush();
    }
    std::process::exit(0);
}

extern "C" fn on_fatal(signal: libc::c_int) {
    if let Some(runtime) = RUNTIME.get() {
        runtime.record(TraceRecord::marker(TraceKind::Crashed));
        runtime.flush();
        write_dump(signal, runtime.testcase);
    }
    unsafe {
        libc::signal(signal, libc::SIG_DFL);
        libc::raise(signal);
    }
}

fn install_exit_handlers() {
    unsafe {
        libc::atexit(on_exit);
        libc::signal(libc::SIGUSR2, on_timeout as libc::sighandler_t);
        for fatal in [
            libc::SIGSEGV,
            libc::SIGABRT,
            libc::SIGBUS,
            libc::SIGFPE,
            libc::SIGILL,
        ] {
            libc::signal(fatal, on_fatal as libc::sighandler_t);
        }
    }
}

/// drop a minimal dump where the crash pipeline watches
fn write_dump(signal: libc::c_int, testcase: TestcaseId) {
    let dumps = match std::env::var(crate::ENV_DUMPS_PATH) {
        Ok(dumps) => std::path::PathBuf::from(dumps),
        Err(_) => return,
    };
    let path = dumps.join(format!("{}-{}.dmp", std::process::id(), testcase));
    let module = std::env::current_exe()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
        .unwrap_or_else(|| "target".to_string());
    let address = on_fatal as usize as u64;
    if let Ok(ref mut file) = std::fs::File::create(path) {
        let _ = crate::crash::minidump::write_dump(
            file,
            signal as u32,
            address,
            &module,
            address & !0xfff,
            1 << 20,
            testcase,
        );
    }
}

//
// the five runtime entry points. the rewriter emits calls to symbols of
// these names; the cdylib build of the runtime wraps them in extern "C"
// shims so the fuzzer binary itself never shadows libc symbols.
//

/// prefix of every basic block on the taken path
pub fn reach_block(func_id: u64, pred_block: u32, cur_block: u32) {
    let runtime = Runtime::instance();
    runtime.record(TraceRecord::reach(
        thread_id(),
        func_id as u32,
        pred_block,
        cur_block,
    ));
}

/// emitted on the not-taken side of a branch
pub fn skip_block(func_id: u64, pred_block: u32, cur_block: u32) {
    let runtime = Runtime::instance();
    runtime.record(TraceRecord::skip(
        thread_id(),
        func_id as u32,
        pred_block,
        cur_block,
    ));
}

/// function prologue
pub fn enter_func(func_id: u64) {
    let runtime = Runtime::instance();
    runtime.record(TraceRecord::boundary(
        TraceKind::EnterFunction,
        thread_id(),
        func_id as u32,
    ));
}

/// before each return site and on fallthrough
pub fn exit_func(func_id: u64) {
    let runtime = Runtime::instance();
    runtime.record(TraceRecord::boundary(
        TraceKind::ExitFunction,
        thread_id(),
        func_id as u32,
    ));
}

/// explicit termination request from the target
pub fn kill(func_id: u64) {
    let runtime = Runtime::instance();
    runtime.record(TraceRecord::boundary(
        TraceKind::Kill,
        thread_id(),
        func_id as u32,
    ));
    runtime.flush();
}
