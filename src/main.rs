// src/main.rs

use orchestrate::{cli, config, logging, run};

#[tokio::main]
async fn main() {
    let code = match run_main().await {
        Ok(true) => 0,
        Ok(false) => 1,
        Err(err) => {
            eprintln!("orchestrate error: {err:?}");
            1
        }
    };
    // Exit explicitly: the terminal reader may still be parked on stdin.
    std::process::exit(code);
}

async fn run_main() -> anyhow::Result<bool> {
    let args = cli::parse();
    if args.sample_toml {
        print!("{}", config::SAMPLE_CONFIG);
        return Ok(true);
    }

    logging::init_logging(args.log_level, tracing::Level::WARN)?;
    run(args).await
}
