use std::{env, env::VarError};

/// The server takes no arguments. Any argument prints the help text and the current configuration.
pub fn handle_command_line_args() -> bool {
    let has_cli_args = env::args().count() > 1;
    if has_cli_args {
        display_readme();
        display_envs();
    }
    has_cli_args
}

fn display_readme() {
    const README: &str = include_str!("./cli-help.txt");
    println!("\n{README}\n");
}

fn display_envs() {
    // Secrets (OPY_WEBHOOK_SECRET, OPY_GATEWAY_API_KEY) are deliberately left off this list
    const DISPLAY_ENVS: [&str; 18] = [
        "RUST_LOG",
        "OPY_HOST",
        "OPY_PORT",
        "OPY_DATABASE_URL",
        "OPY_GATEWAY_URL",
        "OPY_MAINTENANCE_INTERVAL",
        "OPY_ACCESS_LOG",
        "OPY_SUPPORTED_CURRENCIES",
        "OPY_MIN_AMOUNT",
        "OPY_MAX_AMOUNT",
        "OPY_IDEMPOTENCY_KEY_TTL",
        "OPY_WEBHOOK_RETENTION",
        "OPY_GATEWAY_TIMEOUT",
        "OPY_GATEWAY_MAX_RETRIES",
        "OPY_GATEWAY_INITIAL_BACKOFF_MS",
        "OPY_GATEWAY_MAX_BACKOFF_MS",
        "OPY_WEBHOOK_WORKERS",
        "OPY_WEBHOOK_TIMEOUT",
    ];

    println!("Current environment values (EXCLUDING variables that contain secrets):");
    DISPLAY_ENVS.iter().for_each(|&name| {
        let val = match env::var(name) {
            Ok(s) => s,
            Err(VarError::NotPresent) => "Not set".into(),
            Err(VarError::NotUnicode(s)) => format!("Invalid value: {}", s.to_string_lossy()),
        };
        println!("  {name:<35} {val:<15}");
    })
}
