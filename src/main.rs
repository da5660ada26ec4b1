use clap::Parser;
use site_walker::{SiteWalk, WalkState};

mod args;
use args::Args;

#[tokio::main]
async fn main() {
    // Initialize logging
    env_logger::init();

    // Parse command-line arguments
    let args = Args::parse();

    ::log::info!("Starting site walk for: {}", args.url);
    eprintln!("Note: walking requires a WebDriver server (e.g., ChromeDriver).");
    eprintln!(
        "Set WEBDRIVER_URL environment variable if not using the default http://localhost:4444"
    );

    let state = match run(&args).await {
        Ok(state) => state,
        Err(e) => {
            ::log::error!("Walk failed: {}", e);
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = report(&args, &state) {
        ::log::error!("Failed to write walk result: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: &Args) -> Result<WalkState, Box<dyn std::error::Error>> {
    let mut walk = SiteWalk::new(&args.url);
    if let Some(path) = &args.config {
        walk = walk.with_config_file(path)?;
    }
    args.apply(walk.config_mut());

    let state = walk.with_seeds(args.seeds.clone()).walk().await?;

    ::log::info!(
        "Walk complete ({:?}): {} visited, {} queued, {} failed",
        state.stop_reason,
        state.visited.len(),
        state.frontier.len(),
        state.failed.len()
    );
    Ok(state)
}

fn report(args: &Args, state: &WalkState) -> Result<(), Box<dyn std::error::Error>> {
    let json = serde_json::to_string_pretty(state)?;
    match &args.output {
        Some(path) => std::fs::write(path, json)?,
        None => println!("{}", json),
    }
    Ok(())
}
