use anyhow::Result;
use rdkafka::config::ClientConfig;
use redrive_config::KafkaConfig;
use tracing::info;

/// Creates a new `rdkafka::config::ClientConfig` from the application's `KafkaConfig`.
///
/// This function centralizes the logic for creating a Kafka client configuration,
/// ensuring that the failure consumer and the redelivery producer are configured
/// consistently.
///
/// It handles:
/// - Setting up bootstrap servers.
/// - Enabling SSL/TLS if `ssl_enabled` is true.
/// - Configuring SASL PLAIN authentication if a username and password are provided.
pub fn create_client_config(config: &KafkaConfig) -> Result<ClientConfig> {
    let mut client_config = ClientConfig::new();
    client_config.set("bootstrap.servers", &config.brokers);

    if !config.enabled {
        // Minimal config for a disabled client that will never connect.
        return Ok(client_config);
    }

    // Default to plaintext unless SSL/SASL say otherwise.
    client_config.set("security.protocol", "plaintext");

    if config.ssl_enabled {
        info!("Enabling SSL/TLS for Kafka connection");
        client_config.set("security.protocol", "ssl");
    }

    if let Some(ca_location) = &config.ssl_ca_location {
        client_config.set("ssl.ca.location", ca_location);
    }

    // Configure SASL if a mechanism is provided
    if let (Some(mechanism), Some(username), Some(password)) = (
        &config.sasl_mechanism,
        &config.sasl_username,
        &config.sasl_password,
    ) {
        info!(sasl_mechanism = %mechanism, "Configuring SASL authentication");
        client_config
            .set("sasl.mechanism", mechanism)
            .set("sasl.username", username)
            .set("sasl.password", password);

        if config.ssl_enabled {
            client_config.set("security.protocol", "sasl_ssl");
        } else {
            client_config.set("security.protocol", "sasl_plaintext");
        }
    }

    Ok(client_config)
}
