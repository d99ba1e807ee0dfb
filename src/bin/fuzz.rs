use anyhow::Context;
use clap::Parser;
use goalfuzz::driver::Config;
use goalfuzz::driver::Fuzzer;
use goalfuzz::driver::config::extract_command_line;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let argv = std::env::args().collect::<Vec<_>>();
    let (head, tail) = extract_command_line(&argv);
    let mut config = Config::parse_from(&head);
    if let Some(command_line) = tail {
        config.call = command_line;
    }
    goalfuzz::init();
    log::info!("command line: {}", config.call);
    let mut fuzzer = Fuzzer::new(config).context("initialization failed")?;
    fuzzer.run().await.context("fuzzer stopped")?;
    Ok(())
}
