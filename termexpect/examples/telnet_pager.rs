//! Log in over Telnet and page through long output.
//!
//! ```bash
//! cargo run --example telnet_pager -- 192.168.1.1 admin secret "show running-config"
//! ```

use std::env;

use termexpect::SessionBuilder;
use termexpect::driver::{ContinuationRule, ExitCode};
use termexpect::transport::TelnetConfig;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().skip(1).collect();
    let [host, user, password, command] = args.as_slice() else {
        eprintln!("usage: telnet_pager <host> <user> <password> <command>");
        std::process::exit(1);
    };

    let mut session = SessionBuilder::new()
        .prompt("cisco")
        .more(["more", "command", "telnet"])
        .telnet(TelnetConfig::new(host).login(user, Some(password.clone())))
        .await;

    // Stop early if the device asks to reload
    match ContinuationRule::exit_with(r"Proceed with reload\? \[confirm\]", 60) {
        Ok(rule) => {
            let _ = session.add_more(rule);
        }
        Err(e) => eprintln!("{}", e),
    }

    match session.execute(command.as_str()).await {
        Some(output) => session.show(&output),
        None => eprintln!("Not connected: {:?}", session.last_error()),
    }

    if session.exit_code() != ExitCode::OK {
        eprintln!("Finished with {}", session.exit_code());
    }
    session.close().await;
}
