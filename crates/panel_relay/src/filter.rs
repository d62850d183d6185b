use crate::names;

/// Which signals a subscription listens to.
///
/// `sender: None` accepts the signal from any connection on the bus. Any process on the session
/// bus can therefore drive the display; set a sender to restrict that.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalFilter {
    pub sender: Option<String>,
    pub interface: String,
    pub signal: String,
    pub object_path: String,
}

impl Default for SignalFilter {
    fn default() -> Self {
        Self {
            sender: None,
            interface: names::INTERFACE_NAME.to_string(),
            signal: names::SIGNAL_NAME.to_string(),
            object_path: names::OBJECT_PATH.to_string(),
        }
    }
}

impl SignalFilter {
    /// Build the dbus match rule that the bus daemon uses to route matching signals to us.
    pub fn match_rule(&self) -> zbus::Result<zbus::MatchRule<'_>> {
        let mut builder = zbus::MatchRule::builder()
            .msg_type(zbus::MessageType::Signal)
            .interface(self.interface.as_str())?
            .member(self.signal.as_str())?
            .path(self.object_path.as_str())?;
        if let Some(sender) = &self.sender {
            builder = builder.sender(sender.as_str())?;
        }
        Ok(builder.build())
    }

    /// Check a message against this filter, for buses that do their own routing.
    ///
    /// `sender` is compared verbatim, no owner lookup of well-known names is done.
    pub fn matches(&self, sender: Option<&str>, msg: &zbus::Message) -> bool {
        if let Some(expected) = &self.sender {
            if sender != Some(expected.as_str()) {
                return false;
            }
        }
        msg.path().map_or(false, |p| p.as_str() == self.object_path)
            && msg.interface().map_or(false, |i| i.as_str() == self.interface)
            && msg.member().map_or(false, |m| m.as_str() == self.signal)
    }
}

impl std::fmt::Display for SignalFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{} on {} (sender: {})",
            self.interface,
            self.signal,
            self.object_path,
            self.sender.as_deref().unwrap_or("any")
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::signal_message;

    #[test]
    fn test_default_filter() {
        let filter = SignalFilter::default();
        assert_eq!(filter.sender, None);
        assert_eq!(filter.object_path, "/de/nichtsfrei/PanelMessage");
        assert_eq!(filter.interface, "de.nichtsfrei.PanelMessage");
        assert_eq!(filter.signal, "Message");
        assert_eq!(filter.to_string(), "de.nichtsfrei.PanelMessage.Message on /de/nichtsfrei/PanelMessage (sender: any)");
    }

    #[test]
    fn test_match_rule() {
        let rule = SignalFilter::default().match_rule().unwrap().to_string();
        assert!(rule.contains("type='signal'"));
        assert!(rule.contains("interface='de.nichtsfrei.PanelMessage'"));
        assert!(rule.contains("member='Message'"));
        assert!(rule.contains("path='/de/nichtsfrei/PanelMessage'"));
        assert!(!rule.contains("sender="));

        let filter = SignalFilter { sender: Some("de.nichtsfrei.PanelMessage".to_string()), ..Default::default() };
        assert!(filter.match_rule().unwrap().to_string().contains("sender='de.nichtsfrei.PanelMessage'"));

        let filter = SignalFilter { object_path: "not a path".to_string(), ..Default::default() };
        assert!(filter.match_rule().is_err());
    }

    #[test]
    fn test_matches() {
        let any = SignalFilter::default();
        let msg = signal_message(&any, &("hi",)).unwrap();
        assert!(any.matches(None, &msg));
        assert!(any.matches(Some(":1.42"), &msg));

        let restricted = SignalFilter { sender: Some(":1.7".to_string()), ..Default::default() };
        assert!(restricted.matches(Some(":1.7"), &msg));
        assert!(!restricted.matches(Some(":1.42"), &msg));
        assert!(!restricted.matches(None, &msg));

        let other_member = SignalFilter { signal: "Other".to_string(), ..Default::default() };
        let msg = signal_message(&other_member, &("hi",)).unwrap();
        assert!(!any.matches(None, &msg));
    }
}
