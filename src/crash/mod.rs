pub mod analyzer;
pub mod bloom;
pub mod minidump;

pub use analyzer::Analyzer;
pub use bloom::Bloom;
pub use minidump::CrashReport;
pub use minidump::Decode;
pub use minidump::DumpDecoder;
