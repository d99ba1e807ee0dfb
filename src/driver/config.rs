use clap::Parser;
use std::path::PathBuf;

/// the full option surface of the fuzzer binary. the target command line
/// itself arrives after a `--` separator and is extracted before parsing.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Prototype feedback, goal directed fuzzer")]
pub struct Config {
    /// path to the intermediate directory
    #[arg(long, short = 'd', default_value = ".fuzz-idir")]
    pub idir: PathBuf,

    /// remove all files previously set in the idir
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub clear_idir: bool,

    /// command line to execute the target, with input specifiers
    #[arg(long, default_value = "")]
    pub call: String,

    /// path to the seeds file, CSV of "string,value" / "file,path" lines
    #[arg(long)]
    pub seeds: Option<PathBuf>,

    /// path to the models file
    #[arg(long, default_value = "model.bin")]
    pub models: PathBuf,

    /// seed for the random generator
    #[arg(long, default_value_t = 0)]
    pub rand_seed: u64,

    /// initial size of the population
    #[arg(long, default_value_t = 300)]
    pub population_initial_size: usize,

    /// deviation for the size of the population
    #[arg(long, default_value_t = 20)]
    pub population_deviation_size: usize,

    /// initial size of randomly generated buffers
    #[arg(long, default_value_t = 8)]
    pub initial_buffer_size: usize,

    /// random deviation for the size of the initial buffers
    #[arg(long, default_value_t = 2)]
    pub initial_buffer_deviation_size: usize,

    /// maximum number of generated testcases
    #[arg(long, default_value_t = u64::MAX)]
    pub max_num_testcases: u64,

    /// maximum number of processes running at the same time
    #[arg(long, default_value_t = 350)]
    pub max_num_processes: usize,

    /// maximum number of seconds the target process can run
    #[arg(long, default_value_t = 30)]
    pub target_timeout_seconds: u64,

    /// maximum number of non-improving generations
    #[arg(long, default_value_t = 250)]
    pub max_evolution_fixpoint: u32,

    /// enable mating strategies that are computing intensive
    #[arg(long)]
    pub slow_mating_strategies: bool,

    /// force the target to crash when it is called
    #[arg(long)]
    pub force_crash_target: bool,

    /// skip calling the target, generate mocked traces instead
    #[arg(long)]
    pub fake_target_call: bool,

    /// forward the stdout/stderr of the target to the console
    #[arg(long)]
    pub stream_target_stdout: bool,

    /// extra environment variables, "name=value;name=value"
    #[arg(long)]
    pub environment: Option<String>,
}

/// split `argv` at the `--` separator: everything before is ours,
/// everything after is the target command line
pub fn extract_command_line(argv: &[String]) -> (Vec<String>, Option<String>) {
    match argv.iter().position(|arg| arg == "--") {
        None => (argv.to_vec(), None),
        Some(split) => (
            argv[..split].to_vec(),
            Some(argv[split + 1..].join(" ")),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse() {
        let config = Config::parse_from(["goalfuzz"]);
        assert_eq!(config.population_initial_size, 300);
        assert_eq!(config.target_timeout_seconds, 30);
        assert!(config.clear_idir);
        assert!(!config.fake_target_call);
    }

    #[test]
    fn tail_extraction_splits_at_the_separator() {
        let argv = ["goalfuzz", "--fake-target-call", "--", "./target", "__INPUT__"]
            .map(String::from)
            .to_vec();
        let (head, tail) = extract_command_line(&argv);
        assert_eq!(head, vec!["goalfuzz", "--fake-target-call"]);
        assert_eq!(tail.as_deref(), Some("./target __INPUT__"));
        let config = Config::parse_from(&head);
        assert!(config.fake_target_call);
    }

    #[test]
    fn no_separator_means_no_command() {
        let argv = ["goalfuzz", "--rand-seed", "7"].map(String::from).to_vec();
        let (head, tail) = extract_command_line(&argv);
        assert_eq!(head.len(), 3);
        assert!(tail.is_none());
    }
}
