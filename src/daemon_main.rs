use std::{
    env::args,
    net::{Ipv4Addr, SocketAddr},
};

use anyhow::Result;
use clap::Parser;
use clockin::{
    daemon::{args::DaemonArgs, start_daemon},
    utils::{
        dir::resolve_application_path,
        logging::{enable_logging, DAEMON_PREFIX},
        runtime::single_thread_runtime,
    },
};

fn main() -> Result<()> {
    run_service(args().collect::<Vec<_>>())
}

fn run_service(command_args: Vec<String>) -> Result<()> {
    let args = DaemonArgs::parse_from(&command_args);

    // Paths have to be resolved before daemonizing, which changes the working directory.
    let app_dir = resolve_application_path(args.dir.clone())?.canonicalize()?;

    if !args.force {
        #[cfg(unix)]
        {
            use daemonize::Daemonize;

            let daemonize = Daemonize::new()
                .working_directory(&app_dir)
                .stdout(daemonize::Stdio::devnull())
                .stderr(daemonize::Stdio::devnull())
                .execute();
            match daemonize {
                daemonize::Outcome::Parent(parent) => {
                    parent.inspect_err(|e| {
                        eprintln!("Failed to create daemon on parent side {e:?}")
                    })?;
                    println!("Created daemon listening on port {}", args.port);
                    return Ok(());
                }
                daemonize::Outcome::Child(child) => {
                    child?;
                }
            }
        }
        #[cfg(not(unix))]
        {
            println!("Detaching isn't supported on this platform, running in foreground");
        }
    }

    run(args, app_dir)
}

fn run(args: DaemonArgs, app_dir: std::path::PathBuf) -> Result<()> {
    enable_logging(DAEMON_PREFIX, &app_dir, args.log, args.log_console)?;
    let address = SocketAddr::from((Ipv4Addr::UNSPECIFIED, args.port));
    single_thread_runtime()?.block_on(async move { start_daemon(&app_dir, address).await })?;
    Ok(())
}
