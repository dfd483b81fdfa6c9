use std::{env, fmt, path::PathBuf, time::Duration};

use simplelog::LevelFilter;

use crate::keys::LogicalKey;

/// Number of pads on the mat (3x3 grid)
pub const PAD_COUNT: usize = 9;

/// Default pub/sub topic the mat publishes its state on
pub const DEFAULT_TOPIC: &str = "dance/mat";

/// Suffix of the topic carrying page visibility changes
pub const VISIBILITY_SUFFIX: &str = "/visibility";

/// Storage key of the persisted pad mapping, shared by every screen
pub const MAPPING_KEY: &str = "inputMapping";

/// Logical key bound to each calibrated slot, row by row:
///
///   [q] [w] [e]
///   [a] [s] [d]
///   [z] [x] [c]
pub const KEY_MAP: [LogicalKey; PAD_COUNT] = [
    LogicalKey::Q,
    LogicalKey::W,
    LogicalKey::E,
    LogicalKey::A,
    LogicalKey::S,
    LogicalKey::D,
    LogicalKey::Z,
    LogicalKey::X,
    LogicalKey::C,
];

/// How often the menu re-reads the roster
pub const ROSTER_POLL: Duration = Duration::from_secs(10);

/// Which task set the binary runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Run,
    Calibrate,
    Reset,
    Menu,
    Register,
}

impl Mode {
    pub fn from_arg(arg: Option<&str>) -> Option<Self> {
        match arg {
            None | Some("run") => Some(Mode::Run),
            Some("calibrate") => Some(Mode::Calibrate),
            Some("reset") => Some(Mode::Reset),
            Some("menu") => Some(Mode::Menu),
            Some("register") => Some(Mode::Register),
            Some(_) => None,
        }
    }
}

/// Input sink the `run` mode registers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    /// One JSON line per key event on stdout
    Events,
    /// Held-key table, printed whenever it changes
    Table,
}

/// How often the held-key table is polled, matching a game frame
pub const TABLE_TICK: Duration = Duration::from_millis(16);

#[derive(Clone, PartialEq, Eq)]
pub struct MqttBroker {
    pub host: String,
    pub port: u16,
    pub tls: bool,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl fmt::Debug for MqttBroker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MqttBroker")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("tls", &self.tls)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Where pad frames come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PadTransport {
    /// `mqtt://host:port` or `mqtts://host:port`
    Mqtt(MqttBroker),
    /// `tcp://host:port`, one `<topic> <payload>` per line
    Lines(String),
}

impl PadTransport {
    pub fn parse(url: &str) -> Option<Self> {
        let (scheme, rest) = url.split_once("://")?;
        let rest = rest.trim_end_matches('/');

        let (default_port, tls) = match scheme {
            "mqtt" => (1883, false),
            "mqtts" => (8883, true),
            "tcp" => return (!rest.is_empty()).then(|| PadTransport::Lines(rest.to_string())),
            _ => return None,
        };

        let (host, port) = match rest.rsplit_once(':') {
            Some((host, port)) => (host, port.parse::<u16>().ok()?),
            None => (rest, default_port),
        };

        if host.is_empty() {
            return None;
        }

        Some(PadTransport::Mqtt(MqttBroker {
            host: host.to_string(),
            port,
            tls,
            username: None,
            password: None,
        }))
    }
}

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub transport: PadTransport,
    pub topic: String,
    pub store_dir: PathBuf,
    pub roster_url: String,
    pub log_level: LevelFilter,
    pub reconnect_period: Duration,
    pub sink: SinkKind,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        BridgeConfig {
            transport: PadTransport::Mqtt(MqttBroker {
                host: "127.0.0.1".to_string(),
                port: 1883,
                tls: false,
                username: None,
                password: None,
            }),
            topic: DEFAULT_TOPIC.to_string(),
            store_dir: PathBuf::from("."),
            roster_url: "http://127.0.0.1:8080".to_string(),
            log_level: LevelFilter::Info,
            reconnect_period: Duration::from_millis(2000),
            sink: SinkKind::Events,
        }
    }
}

impl BridgeConfig {
    /// Builds the config from `MATBRIDGE_*` variables, falling back to defaults
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = BridgeConfig::default();

        if let Some(url) = lookup("MATBRIDGE_BROKER") {
            match PadTransport::parse(&url) {
                Some(transport) => config.transport = transport,
                None => log::warn!("Unknown broker {:?}, using {:?}", url, config.transport),
            }
        }
        if let PadTransport::Mqtt(broker) = &mut config.transport {
            broker.username = lookup("MATBRIDGE_MQTT_USER");
            broker.password = lookup("MATBRIDGE_MQTT_PASSWORD");
        }
        if let Some(topic) = lookup("MATBRIDGE_TOPIC") {
            config.topic = topic;
        }
        if let Some(dir) = lookup("MATBRIDGE_STORE_DIR") {
            config.store_dir = PathBuf::from(dir);
        }
        if let Some(url) = lookup("MATBRIDGE_ROSTER_URL") {
            config.roster_url = url.trim_end_matches('/').to_string();
        }
        if let Some(level) = lookup("MATBRIDGE_LOG") {
            config.log_level = parse_level(&level).unwrap_or(config.log_level);
        }
        if let Some(ms) = lookup("MATBRIDGE_RECONNECT_MS").and_then(|v| v.parse::<u64>().ok()) {
            config.reconnect_period = Duration::from_millis(ms);
        }
        match lookup("MATBRIDGE_SINK").as_deref() {
            Some("table") => config.sink = SinkKind::Table,
            Some("events") | None => {}
            Some(other) => log::warn!("Unknown sink {:?}, using events", other),
        }

        config
    }

    pub fn visibility_topic(&self) -> String {
        format!("{}{}", self.topic, VISIBILITY_SUFFIX)
    }
}

fn parse_level(level: &str) -> Option<LevelFilter> {
    match level.to_ascii_lowercase().as_str() {
        "off" => Some(LevelFilter::Off),
        "error" => Some(LevelFilter::Error),
        "warn" => Some(LevelFilter::Warn),
        "info" => Some(LevelFilter::Info),
        "debug" => Some(LevelFilter::Debug),
        "trace" => Some(LevelFilter::Trace),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn defaults_without_environment() {
        let config = BridgeConfig::from_lookup(|_| None);

        assert_eq!(config.topic, "dance/mat");
        assert_eq!(config.visibility_topic(), "dance/mat/visibility");
        assert_eq!(config.reconnect_period, Duration::from_millis(2000));
        assert_eq!(config.log_level, LevelFilter::Info);
        assert_eq!(config.sink, SinkKind::Events);
    }

    #[test]
    fn overrides_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("MATBRIDGE_TOPIC", "arcade/mat"),
            ("MATBRIDGE_LOG", "DEBUG"),
            ("MATBRIDGE_RECONNECT_MS", "500"),
            ("MATBRIDGE_STORE_DIR", "/tmp/store"),
            ("MATBRIDGE_SINK", "table"),
            ("MATBRIDGE_BROKER", "mqtts://mat.example.net"),
            ("MATBRIDGE_MQTT_USER", "mat"),
            ("MATBRIDGE_MQTT_PASSWORD", "secret"),
            ("MATBRIDGE_ROSTER_URL", "https://roster.example.net/"),
        ]
        .into_iter()
        .collect();

        let config = BridgeConfig::from_lookup(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(config.topic, "arcade/mat");
        assert_eq!(config.log_level, LevelFilter::Debug);
        assert_eq!(config.reconnect_period, Duration::from_millis(500));
        assert_eq!(config.store_dir, PathBuf::from("/tmp/store"));
        assert_eq!(config.sink, SinkKind::Table);
        assert_eq!(config.roster_url, "https://roster.example.net");
        assert_eq!(
            config.transport,
            PadTransport::Mqtt(MqttBroker {
                host: "mat.example.net".to_string(),
                port: 8883,
                tls: true,
                username: Some("mat".to_string()),
                password: Some("secret".to_string()),
            })
        );
    }

    #[test]
    fn bad_values_keep_defaults() {
        let config = BridgeConfig::from_lookup(|name| match name {
            "MATBRIDGE_LOG" => Some("loud".to_string()),
            "MATBRIDGE_RECONNECT_MS" => Some("soon".to_string()),
            _ => None,
        });

        assert_eq!(config.log_level, LevelFilter::Info);
        assert_eq!(config.reconnect_period, Duration::from_millis(2000));
    }

    #[test]
    fn mode_from_arguments() {
        assert_eq!(Mode::from_arg(None), Some(Mode::Run));
        assert_eq!(Mode::from_arg(Some("calibrate")), Some(Mode::Calibrate));
        assert_eq!(Mode::from_arg(Some("reset")), Some(Mode::Reset));
        assert_eq!(Mode::from_arg(Some("menu")), Some(Mode::Menu));
        assert_eq!(Mode::from_arg(Some("register")), Some(Mode::Register));
        assert_eq!(Mode::from_arg(Some("dance")), None);
    }

    #[test]
    fn transport_urls() {
        assert_eq!(
            PadTransport::parse("tcp://10.0.0.5:9000"),
            Some(PadTransport::Lines("10.0.0.5:9000".to_string()))
        );
        let Some(PadTransport::Mqtt(broker)) = PadTransport::parse("mqtt://broker:1884") else {
            panic!("expected an MQTT broker");
        };
        assert_eq!((broker.host.as_str(), broker.port, broker.tls), ("broker", 1884, false));

        assert_eq!(PadTransport::parse("broker:1883"), None);
        assert_eq!(PadTransport::parse("ws://broker"), None);
        assert_eq!(PadTransport::parse("mqtt://broker:port"), None);
        assert_eq!(PadTransport::parse("tcp://"), None);
    }

    #[test]
    fn broker_debug_hides_password() {
        let broker = MqttBroker {
            host: "broker".to_string(),
            port: 1883,
            tls: false,
            username: Some("mat".to_string()),
            password: Some("secret".to_string()),
        };

        assert!(!format!("{:?}", broker).contains("secret"));
    }
}
