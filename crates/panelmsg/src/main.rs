use anyhow::{Context, Result};
use clap::CommandFactory as _;
use std::time::Duration;

mod layerd;
mod listen;
mod opts;
mod paths;
mod util;

fn main() {
    let opts: opts::Opt = opts::Opt::from_env();

    let log_level_filter = if opts.log_debug { log::LevelFilter::Debug } else { log::LevelFilter::Info };
    if std::env::var("RUST_LOG").is_ok() {
        pretty_env_logger::init_timed();
    } else {
        pretty_env_logger::formatted_timed_builder()
            .filter(Some("panelmsg"), log_level_filter)
            .filter(Some("panel_relay"), log_level_filter)
            .init();
    }

    if let opts::Action::ShellCompletions { shell } = opts.action {
        clap_complete::generate(shell, &mut opts::RawOpt::command(), "panelmsg", &mut std::io::stdout());
        return;
    }

    let rt = tokio::runtime::Builder::new_multi_thread().enable_all().build().expect("Failed to initialize tokio runtime");
    if let Err(err) = rt.block_on(run(opts.action)) {
        log::error!("{:?}", err);
        std::process::exit(1);
    }
}

async fn run(action: opts::Action) -> Result<()> {
    match action {
        opts::Action::ShellCompletions { .. } => unreachable!(),
        opts::Action::Listen { sender, initial, signal } => listen::run(signal.into_filter(sender), initial).await,
        opts::Action::Send { message, signal } => {
            let con = zbus::Connection::session().await.context("Failed to connect to the session bus")?;
            panel_relay::emit_message(&con, &signal.into_filter(None), &message).await.context("Failed to send message")
        }
        opts::Action::Layerd { hid_dir, idle_timeout } => {
            let paths = paths::Paths::from_env().context("Failed to initialize panelmsg paths")?;
            log::info!("Initializing layerd ({})", paths);
            let config = layerd::LayerdConfig { hid_dir, idle_timeout: Duration::from_secs(idle_timeout.max(1)), ..Default::default() };
            layerd::run(config, &paths).await
        }
        opts::Action::Layers => {
            let paths = paths::Paths::from_env().context("Failed to initialize panelmsg paths")?;
            let report = layerd::status::query(paths.get_layerd_socket_file())
                .await
                .with_context(|| format!("Failed to reach layerd at {}", paths.get_layerd_socket_file().display()))?;
            print!("{}", report);
            Ok(())
        }
    }
}
