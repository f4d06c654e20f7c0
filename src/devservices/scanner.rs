use crate::config::PropertySource;

pub const INCOMING_PREFIX: &str = "mp.messaging.incoming.";
pub const OUTGOING_PREFIX: &str = "mp.messaging.outgoing.";
pub const CONNECTOR_SUFFIX: &str = ".connector";

/// Connector name of the AMQP messaging channels.
pub const AMQP_CONNECTOR: &str = "smallrye-amqp";

/// Whether some AMQP channel still needs a broker location.
///
/// Looks at every `mp.messaging.{incoming,outgoing}.<channel>.connector`
/// property naming the AMQP connector. Such a channel is configured when its
/// own `.host` or `.port` is set. Returns false only when at least one AMQP
/// channel exists and all of them are configured; with no AMQP channel at
/// all the answer is true and the global host/port checks decide.
pub fn has_channel_needing_discovery(properties: &dyn PropertySource) -> bool {
    let mut amqp_channels = 0usize;

    for name in properties.property_names() {
        let Some(channel_key) = channel_key(&name) else {
            continue;
        };

        let uses_amqp = properties
            .value(&name)
            .is_some_and(|v| v.trim().eq_ignore_ascii_case(AMQP_CONNECTOR));
        if !uses_amqp {
            continue;
        }
        amqp_channels += 1;

        let has_host = properties.is_present(&format!("{channel_key}.host"));
        let has_port = properties.is_present(&format!("{channel_key}.port"));
        if !has_host && !has_port {
            tracing::debug!("Channel '{}' has no AMQP host or port", channel_key);
            return true;
        }
    }

    if amqp_channels == 0 {
        tracing::debug!("No AMQP channel configured, broker discovery may be needed");
        return true;
    }
    false
}

/// `mp.messaging.incoming.prices.connector` -> `mp.messaging.incoming.prices`.
fn channel_key(name: &str) -> Option<&str> {
    let key = name.strip_suffix(CONNECTOR_SUFFIX)?;
    let channel = key
        .strip_prefix(INCOMING_PREFIX)
        .or_else(|| key.strip_prefix(OUTGOING_PREFIX))?;
    (!channel.is_empty()).then_some(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PropertyMap;

    #[test]
    fn test_no_channels_needs_discovery() {
        assert!(has_channel_needing_discovery(&PropertyMap::new()));
    }

    #[test]
    fn test_only_other_connectors_needs_discovery() {
        let props = PropertyMap::new()
            .with("mp.messaging.incoming.orders.connector", "smallrye-kafka")
            .with("mp.messaging.incoming.orders.bootstrap.servers", "kafka:9092");
        assert!(has_channel_needing_discovery(&props));
    }

    #[test]
    fn test_amqp_channel_without_location_needs_discovery() {
        let props = PropertyMap::new().with("mp.messaging.outgoing.prices.connector", "smallrye-amqp");
        assert!(has_channel_needing_discovery(&props));
    }

    #[test]
    fn test_all_amqp_channels_configured() {
        let props = PropertyMap::new()
            .with("mp.messaging.incoming.prices.connector", "SmallRye-AMQP")
            .with("mp.messaging.incoming.prices.host", "broker.internal")
            .with("mp.messaging.outgoing.quotes.connector", "smallrye-amqp")
            .with("mp.messaging.outgoing.quotes.port", "5672")
            .with("mp.messaging.incoming.orders.connector", "smallrye-kafka");
        assert!(!has_channel_needing_discovery(&props));
    }

    #[test]
    fn test_one_unconfigured_amqp_channel_is_enough() {
        let props = PropertyMap::new()
            .with("mp.messaging.incoming.prices.connector", "smallrye-amqp")
            .with("mp.messaging.incoming.prices.host", "broker.internal")
            .with("mp.messaging.outgoing.quotes.connector", "smallrye-amqp");
        assert!(has_channel_needing_discovery(&props));
    }

    #[test]
    fn test_empty_host_does_not_count() {
        let props = PropertyMap::new()
            .with("mp.messaging.incoming.prices.connector", "smallrye-amqp")
            .with("mp.messaging.incoming.prices.host", "");
        assert!(has_channel_needing_discovery(&props));
    }

    #[test]
    fn test_channel_key_extraction() {
        assert_eq!(
            channel_key("mp.messaging.incoming.prices.connector"),
            Some("mp.messaging.incoming.prices")
        );
        assert_eq!(channel_key("mp.messaging.incoming..connector"), None);
        assert_eq!(channel_key("mp.messaging.incoming.prices.host"), None);
        assert_eq!(channel_key("amqp.connector"), None);
    }
}
