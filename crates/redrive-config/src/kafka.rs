// ============================================================================
// Kafka Configuration
// ============================================================================

/// Kafka configuration shared by the failure consumer and the redelivery
/// producer
#[derive(Clone, Debug)]
pub struct KafkaConfig {
    /// Whether Kafka is enabled (false = dry-run mode for tests)
    pub enabled: bool,
    /// Comma-separated list of Kafka brokers (e.g., "kafka1:9092,kafka2:9092")
    pub brokers: String,
    /// Topic carrying failure reports from consumers
    pub topic: String,
    /// Consumer group ID shared by all scheduler instances
    pub consumer_group: String,
    /// SSL/TLS enabled
    pub ssl_enabled: bool,
    /// SASL mechanism (e.g., "SCRAM-SHA-256", "PLAIN")
    pub sasl_mechanism: Option<String>,
    /// SASL username
    pub sasl_username: Option<String>,
    /// SASL password
    pub sasl_password: Option<String>,
    /// Path to CA certificate file (for self-signed certificates)
    pub ssl_ca_location: Option<String>,
    // producer-specific settings
    pub producer_compression: String, // "zstd" | "snappy" | "gzip" | "lz4" | "none"
    pub producer_acks: String,        // "all" | "1" | "-1" | "0"
    pub producer_linger_ms: u32,
    pub producer_retries: u32,
    pub producer_request_timeout_ms: u32,
    pub producer_enable_idempotence: bool,
}

impl KafkaConfig {
    pub(crate) fn from_env() -> Self {
        Self {
            enabled: std::env::var("KAFKA_ENABLED")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
            brokers: std::env::var("KAFKA_BROKERS")
                .unwrap_or_else(|_| "localhost:9092".to_string()),
            topic: std::env::var("KAFKA_TOPIC").unwrap_or_else(|_| "redrive-events".to_string()),
            consumer_group: std::env::var("KAFKA_CONSUMER_GROUP")
                .unwrap_or_else(|_| "redrive-schedulers".to_string()),
            ssl_enabled: std::env::var("KAFKA_SSL_ENABLED")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .unwrap_or(false),
            sasl_mechanism: std::env::var("KAFKA_SASL_MECHANISM").ok(),
            sasl_username: std::env::var("KAFKA_SASL_USERNAME").ok(),
            sasl_password: std::env::var("KAFKA_SASL_PASSWORD").ok(),
            ssl_ca_location: std::env::var("KAFKA_SSL_CA_LOCATION").ok(),
            producer_compression: std::env::var("KAFKA_PRODUCER_COMPRESSION")
                .unwrap_or_else(|_| "snappy".to_string()),
            producer_acks: std::env::var("KAFKA_PRODUCER_ACKS")
                .unwrap_or_else(|_| "all".to_string()),
            producer_linger_ms: std::env::var("KAFKA_PRODUCER_LINGER_MS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(10),
            producer_retries: std::env::var("KAFKA_PRODUCER_RETRIES")
                .unwrap_or_else(|_| "2147483647".to_string())
                .parse()
                .unwrap_or(2147483647),
            producer_request_timeout_ms: std::env::var("KAFKA_PRODUCER_REQUEST_TIMEOUT_MS")
                .unwrap_or_else(|_| "30000".to_string())
                .parse()
                .unwrap_or(30000),
            producer_enable_idempotence: std::env::var("KAFKA_PRODUCER_ENABLE_IDEMPOTENCE")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
        }
    }
}
