//! Run a few commands over SSH and print the results.
//!
//! # Usage
//!
//! With password authentication:
//! ```bash
//! cargo run --example ssh_commands -- --host localhost --user your_username --password your_password
//! ```
//!
//! With SSH key authentication:
//! ```bash
//! cargo run --example ssh_commands -- --host localhost --user your_username --key ~/.ssh/id_rsa
//! ```

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use termexpect::driver::ExecuteOptions;
use termexpect::{SessionBuilder, SshConfig};

#[tokio::main]
async fn main() {
    // Initialize logging (set RUST_LOG=debug for verbose output)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let mut config = SshConfig::new(&args.host, &args.user)
        .port(args.port)
        .timeout(Duration::from_secs(args.timeout));
    if let Some(password) = &args.password {
        config = config.password(password);
    } else if let Some(key_path) = &args.key {
        config = config.private_key(key_path, None);
    } else {
        eprintln!("Error: Must provide either --password or --key");
        std::process::exit(1);
    }

    println!("Connecting to {}:{}...", args.host, args.port);
    let mut session = SessionBuilder::new()
        .prompt(&args.prompt)
        .more(["yesno", "more", "denied"])
        .ssh(config)
        .await;

    if !session.is_connected() {
        eprintln!("Connection failed: exit code {}", session.exit_code());
        if let Some(error) = session.last_error() {
            eprintln!("  {}", error);
        }
        std::process::exit(session.exit_code().code());
    }

    if let Some(output) = session.execute("uname -a").await {
        println!("System: {}", output.as_single().unwrap_or_default().trim());
    }
    if let Some(welcome) = session.welcome() {
        println!("Banner:\n{}", welcome);
    }

    if let Some(output) = session.execute(["pwd", "whoami", "ls -la"]).await {
        session.show(&output);
    }

    if let Some(output) = session
        .execute_with(["id", "date"], ExecuteOptions::keyed())
        .await
    {
        session.show(&output);
    }

    println!("Last exit code: {}", session.exit_code());
    session.close().await;
}

/// Simple argument parser (avoiding external dependencies)
struct Args {
    host: String,
    port: u16,
    user: String,
    password: Option<String>,
    key: Option<PathBuf>,
    prompt: String,
    timeout: u64,
}

impl Args {
    fn parse() -> Self {
        let mut args = env::args().skip(1);
        let mut parsed = Self {
            host: "localhost".to_string(),
            port: 22,
            user: env::var("USER").unwrap_or_else(|_| "root".to_string()),
            password: None,
            key: None,
            prompt: "auto".to_string(),
            timeout: 30,
        };

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--host" | "-h" => parsed.host = args.next().unwrap_or(parsed.host),
                "--port" | "-p" => {
                    parsed.port = args.next().and_then(|v| v.parse().ok()).unwrap_or(22)
                }
                "--user" | "-u" => parsed.user = args.next().unwrap_or(parsed.user),
                "--password" | "-P" => parsed.password = args.next(),
                "--key" | "-k" => parsed.key = args.next().map(PathBuf::from),
                "--prompt" => parsed.prompt = args.next().unwrap_or(parsed.prompt),
                "--timeout" | "-t" => {
                    parsed.timeout = args.next().and_then(|v| v.parse().ok()).unwrap_or(30)
                }
                "--help" => {
                    println!(
                        "USAGE:\n    cargo run --example ssh_commands -- [--host H] [--port P] \
                         [--user U] (--password P | --key PATH) [--prompt NAME] [--timeout SECS]"
                    );
                    std::process::exit(0);
                }
                other => eprintln!("Unknown argument: {}", other),
            }
        }

        parsed
    }
}
