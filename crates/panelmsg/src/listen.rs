use anyhow::{Context, Result};
use panel_relay::{DbusBus, DisplayState, Indicator, SignalFilter};
use std::io::Write;

/// Run an indicator on the session bus and print what it displays, one line per message.
pub async fn run(filter: SignalFilter, initial: String) -> Result<()> {
    let bus = DbusBus::session().await.context("Failed to connect to the session bus")?;
    let mut indicator = Indicator::new(bus, filter).with_initial_text(initial);
    indicator.enable().await.context("Failed to subscribe to panel messages")?;

    let result = print_messages(&indicator).await;
    indicator.disable();
    result
}

async fn print_messages<B>(indicator: &Indicator<B>) -> Result<()>
where
    B: panel_relay::SignalBus + Clone,
{
    let mut text = indicator.display().map(DisplayState::subscribe).context("Indicator is not enabled")?;
    let shutdown = crate::util::ShutdownSignals::install().context("Failed to install signal handlers")?.wait();
    tokio::pin!(shutdown);

    let mut stdout = std::io::stdout();
    loop {
        let line = display_line(&text.borrow_and_update());
        writeln!(stdout, "{}", line).and_then(|_| stdout.flush()).context("Failed to write to stdout")?;

        tokio::select! {
            changed = text.changed() => if changed.is_err() { break },
            _ = &mut shutdown => break,
        }
    }
    Ok(())
}

/// Every message has to end up on exactly one line of output.
fn display_line(message: &str) -> String {
    message.replace(['\r', '\n'], " ")
}
