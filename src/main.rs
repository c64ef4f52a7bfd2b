/*!
 * jskern - Main Entry Point
 *
 * Runs one script as a process attached to the host's stdout:
 *
 *     jskern [--config FILE] <script> [args...]
 *
 * Ctrl-C terminates the process.
 */

use anyhow::{bail, Context, Result};
use jskern::{
    init_tracing, ExitStatus, KernelConfig, ProcessManager, StdioTerminal, TerminalRef,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

struct Invocation {
    config: Option<PathBuf>,
    script: PathBuf,
    args: Vec<String>,
}

fn parse_args(mut raw: impl Iterator<Item = String>) -> Result<Invocation> {
    let mut config = None;
    let script = loop {
        match raw.next() {
            Some(flag) if flag == "--config" => {
                let file = raw.next().context("--config requires a file argument")?;
                config = Some(PathBuf::from(file));
            }
            Some(flag) if flag == "-h" || flag == "--help" => {
                bail!("usage: jskern [--config FILE] <script> [args...]")
            }
            Some(script) => break PathBuf::from(script),
            None => bail!("usage: jskern [--config FILE] <script> [args...]"),
        }
    };
    Ok(Invocation {
        config,
        script,
        args: raw.collect(),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let invocation = parse_args(std::env::args().skip(1))?;
    let config = match &invocation.config {
        Some(path) => KernelConfig::from_json_file(path)?.with_env_overrides()?,
        None => KernelConfig::from_env()?,
    };

    let terminal = Arc::new(StdioTerminal);
    let manager = ProcessManager::new(TerminalRef::new(&terminal)).with_config(config);
    let envp: HashMap<String, String> = std::env::vars().collect();

    let pid = manager.spawn(&invocation.script, invocation.args, envp)?;
    let process = manager.get(pid).context("process vanished after spawn")?;
    info!(pid, script = %invocation.script.display(), "Running script");

    tokio::select! {
        _ = process.execute_async() => {}
        _ = tokio::signal::ctrl_c() => {
            info!(pid, "Interrupted");
            process.terminate();
        }
    }

    let status = process.status();
    manager.shutdown_all();

    match status {
        ExitStatus::Exited(code) => std::process::exit(code),
        ExitStatus::Faulted(_) => std::process::exit(1),
        ExitStatus::Pending => Ok(()),
    }
}
