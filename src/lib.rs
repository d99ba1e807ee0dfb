pub mod arena;
pub mod classify;
pub mod coverage;
pub mod crash;
pub mod driver;
pub mod error;
pub mod exec;
pub mod genetic;
pub mod measure;
pub mod model;
pub mod trace;

/// dimensional analysis types
pub type ElementId = u32;
pub type TestcaseId = u64;
pub type BlockNumber = u32;
pub type SlotIndex = usize;

/// the id reserved for "none"; no element ever carries it
pub const ERROR_ID: ElementId = 0;

// model store parameters
pub const LRU_CACHE_SIZE: usize = 15_000;
pub const MAX_BLIND_NUM_FUNC: u32 = 65_535;

// genetic algorithm parameters
pub const BEST_CANDIDATES_SIZE: usize = 500;
pub const MUTATION_PROBABILITY_PERCENT: u32 = 80;
pub const MAX_DUPLICATE_REPEAT: usize = 4;
pub const MAX_DUPLICATE_WINDOW: usize = 8;
pub const MAX_SHUFFLE_SPAN: usize = 8;
pub const MIN_SEGMENT_SIZE: usize = 4;
pub const NUMBER_SEGMENTS: usize = 32;

// trace transport parameters
pub const TRACE_REGION_NAME: &str = "goalfuzz-trace-region";
pub const TRACE_REGION_BASE_SIZE: u64 = 1 << 26;
pub const TRACE_FLUSH_EVENT_RATE: usize = 100;
pub const TRACE_ATTACH_RETRY_SECS: u64 = 1;

// process orchestration parameters
pub const WATCHER_TICK_MILLIS: u64 = 10;
pub const TIMEOUT_GRACE_MILLIS: u64 = 200;

// crash pipeline parameters
pub const MAX_CRASHES_PER_KIND: usize = 250;
pub const CRASHERS_BLOOM_SLOTS: usize = 65_536;
pub const CRASHERS_BLOOM_HASHES: usize = 3;

// environment contract with the instrumented target
pub const ENV_TESTCASE_ID: &str = "testcase_id";
pub const ENV_CRASH_ME: &str = "crash_me";
pub const ENV_DUMPS_PATH: &str = "dumps_path";

// command template placeholders
pub const INPUT_NEEDLE: &str = "__INPUT__";
pub const FILE_NEEDLE: &str = "__FILE__";

/// trait for random generation, mainly (strictly?) for testing
pub trait Arbitrary {
    fn random() -> Self;
}

/// progress bar
pub fn progress(n: usize) -> indicatif::ProgressBar {
    let tick = std::time::Duration::from_secs(60);
    let style = "{spinner:.cyan} {elapsed} ~ {percent:>3}% {wide_bar:.cyan}";
    let style = indicatif::ProgressStyle::with_template(style).unwrap();
    let progress = indicatif::ProgressBar::new(n as u64);
    progress.set_style(style);
    progress.enable_steady_tick(tick);
    progress
}

/// initialize logging and exit on ctrl-c
pub fn init() {
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.unwrap();
        println!();
        log::warn!("forcing exit");
        std::process::exit(0);
    });
    std::fs::create_dir_all("logs").expect("create logs directory");
    let config = simplelog::ConfigBuilder::new()
        .set_location_level(log::LevelFilter::Off)
        .set_target_level(log::LevelFilter::Off)
        .set_thread_level(log::LevelFilter::Off)
        .build();
    let time = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("time moves slow")
        .as_secs();
    let file = simplelog::WriteLogger::new(
        log::LevelFilter::Debug,
        config.clone(),
        std::fs::File::create(format!("logs/{}.log", time)).expect("create log file"),
    );
    let term = simplelog::TermLogger::new(
        log::LevelFilter::Info,
        config.clone(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    );
    simplelog::CombinedLogger::init(vec![term, file]).expect("initialize logger");
}

/// 128-bit content hash over a byte buffer
pub fn hash128(data: &[u8]) -> [u8; 16] {
    let digest = blake3::hash(data);
    let mut hash = [0u8; 16];
    hash.copy_from_slice(&digest.as_bytes()[..16]);
    hash
}

/// hex rendering of a 128-bit hash, used for crash directories
pub fn hex128(hash: &[u8; 16]) -> String {
    hash.iter().map(|b| format!("{:02x}", b)).collect()
}
