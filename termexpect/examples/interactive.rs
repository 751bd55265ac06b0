//! Spawn a local shell, run a command, then hand the terminal over.
//!
//! Type `:END:` to return from the interactive session.
//!
//! ```bash
//! cargo run --example interactive -- /bin/bash
//! ```

use std::env;

use termexpect::SessionBuilder;
use termexpect::transport::SpawnConfig;

#[tokio::main]
async fn main() -> Result<(), termexpect::Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let program = env::args().nth(1).unwrap_or_else(|| "/bin/sh".to_string());
    let mut session = SessionBuilder::new()
        .prompt("simple")
        .spawn(SpawnConfig::new(&program).env("PS1", "$ "));

    if let Some(output) = session.execute("echo ready").await {
        print!("{}", output);
    }

    let exit = session.interactive().await?;
    println!("\nInteractive session ended: {:?}", exit);

    if let Some(output) = session.execute("echo back in control").await {
        print!("{}", output);
    }
    session.close().await;
    Ok(())
}
