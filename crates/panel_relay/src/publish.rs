use crate::*;

/// Build the signal that `filter` listens for, carrying `body` as its arguments.
///
/// The sender is left unset; the bus fills it in when the message is actually sent.
pub fn signal_message<B>(filter: &SignalFilter, body: &B) -> zbus::Result<zbus::Message>
where
    B: serde::ser::Serialize + zbus::zvariant::DynamicType,
{
    zbus::MessageBuilder::signal(filter.object_path.as_str(), filter.interface.as_str(), filter.signal.as_str())?.build(body)
}

/// Broadcast `message` to every indicator listening on `con`'s bus.
pub async fn emit_message(con: &zbus::Connection, target: &SignalFilter, message: &str) -> Result<()> {
    con.emit_signal(
        None::<zbus::names::BusName<'_>>,
        target.object_path.as_str(),
        target.interface.as_str(),
        target.signal.as_str(),
        &(message,),
    )
    .await?;
    log::debug!("emitted {:?} as {}", message, target);
    Ok(())
}
