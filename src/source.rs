use std::{
    io::{self, BufRead},
    time::{Duration, Instant},
};

use futures_lite::StreamExt;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS, Transport};
use tokio::{io::AsyncRead, net::TcpStream, sync::mpsc::Sender, time::sleep};
use tokio_util::{
    bytes::{Buf, BytesMut},
    codec::{Decoder, FramedRead},
    sync::CancellationToken,
};

use crate::{
    config::MqttBroker,
    error::BridgeError,
    frame::Message,
    keys::{InputSource, KeyEvent, LogicalKey},
};

/// Longest relay line kept; a pad frame with its topic is far shorter
pub const MAX_LINE_LENGTH: usize = 256;

/// Everything the bridge task consumes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Relay message, not yet filtered by topic
    Message(Message),
    /// Already-logical key from the keyboard
    Key(KeyEvent),
}

/// Why a reader stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadEnd {
    Closed,
    Cancelled,
}

/// Drops repeated messages that arrive within `period` of the last one logged
#[derive(Debug)]
pub struct RateLimitedLog {
    period: Duration,
    last: Option<Instant>,
}

impl RateLimitedLog {
    pub fn new(period: Duration) -> Self {
        RateLimitedLog { period, last: None }
    }

    /// Returns whether the message was written
    pub fn log(&mut self, level: log::Level, message: &str) -> bool {
        let now = Instant::now();

        if let Some(last) = self.last {
            if now.duration_since(last) < self.period {
                return false;
            }
        }

        self.last = Some(now);
        log::log!(level, "{}", message);

        true
    }
}

/// One newline-terminated chunk from the relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayLine {
    Text(String),
    /// Not UTF-8, or longer than the codec allows
    Invalid,
}

/// Splits the relay stream on `\n` without ever failing on content.
/// Oversized lines are reported once as `Invalid` and skipped up to the next newline.
#[derive(Debug, Clone)]
pub struct RelayLineCodec {
    max_length: usize,
    next_index: usize,
    discarding: bool,
}

impl RelayLineCodec {
    pub fn new(max_length: usize) -> Self {
        RelayLineCodec {
            max_length,
            next_index: 0,
            discarding: false,
        }
    }
}

fn decode_line(bytes: &[u8]) -> RelayLine {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);

    match std::str::from_utf8(bytes) {
        Ok(text) => RelayLine::Text(text.to_string()),
        Err(_) => RelayLine::Invalid,
    }
}

impl Decoder for RelayLineCodec {
    type Item = RelayLine;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<RelayLine>, io::Error> {
        loop {
            let newline = buf[self.next_index..]
                .iter()
                .position(|b| *b == b'\n')
                .map(|i| i + self.next_index);

            match (self.discarding, newline) {
                (true, Some(end)) => {
                    buf.advance(end + 1);
                    self.discarding = false;
                    self.next_index = 0;
                }
                (true, None) => {
                    buf.advance(buf.len());
                    self.next_index = 0;
                    return Ok(None);
                }
                (false, Some(end)) => {
                    let line = buf.split_to(end + 1);
                    self.next_index = 0;

                    if end > self.max_length {
                        return Ok(Some(RelayLine::Invalid));
                    }

                    return Ok(Some(decode_line(&line[..end])));
                }
                (false, None) if buf.len() > self.max_length => {
                    buf.advance(buf.len());
                    self.discarding = true;
                    self.next_index = 0;
                    return Ok(Some(RelayLine::Invalid));
                }
                (false, None) => {
                    self.next_index = buf.len();
                    return Ok(None);
                }
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<RelayLine>, io::Error> {
        if let Some(line) = self.decode(buf)? {
            return Ok(Some(line));
        }

        self.next_index = 0;

        if buf.is_empty() || self.discarding {
            buf.clear();
            return Ok(None);
        }

        let line = buf.split_to(buf.len());

        Ok(Some(decode_line(&line)))
    }
}

/// Forwards every `<topic> <payload>` line from `reader` until EOF or cancellation.
/// Undecodable or oversized lines are skipped; the connection stays up.
pub async fn read_messages<R: AsyncRead + Unpin>(
    reader: R,
    tx: &Sender<Input>,
    token: &CancellationToken,
) -> Result<ReadEnd, BridgeError> {
    let mut lines = FramedRead::new(reader, RelayLineCodec::new(MAX_LINE_LENGTH));

    loop {
        let line = tokio::select! {
            v = lines.next() => v,
            _ = token.cancelled() => return Ok(ReadEnd::Cancelled),
        };

        let text = match line {
            None => return Ok(ReadEnd::Closed),
            Some(Err(err)) => return Err(err.into()),
            Some(Ok(RelayLine::Invalid)) => {
                log::debug!("Dropped undecodable relay line");
                continue;
            }
            Some(Ok(RelayLine::Text(text))) => text,
        };

        let Some(message) = Message::parse_line(&text) else {
            continue;
        };

        if tx.send(Input::Message(message)).await.is_err() {
            return Ok(ReadEnd::Cancelled);
        }
    }
}

/// Turns an MQTT publish into bridge input; payloads that are not UTF-8 are dropped
pub fn publish_input(topic: &str, payload: &[u8]) -> Option<Input> {
    match std::str::from_utf8(payload) {
        Ok(payload) => Some(Input::Message(Message {
            topic: topic.to_string(),
            payload: payload.trim().to_string(),
        })),
        Err(_) => {
            log::debug!("Dropped non-UTF-8 payload on {}", topic);
            None
        }
    }
}

pub fn mqtt_options(broker: &MqttBroker, client_id: &str) -> MqttOptions {
    let mut options = MqttOptions::new(client_id, broker.host.clone(), broker.port);
    options.set_keep_alive(Duration::from_secs(5));
    options.set_clean_session(true);

    if let (Some(username), Some(password)) = (&broker.username, &broker.password) {
        options.set_credentials(username.clone(), password.clone());
    }

    if broker.tls {
        options.set_transport(Transport::tls_with_default_config());
    }

    options
}

/// Subscribes to `topics` on the broker and forwards every publish.
/// The event loop reconnects on its own; each new session subscribes again.
pub async fn mqtt_source_task(
    broker: MqttBroker,
    topics: Vec<String>,
    reconnect: Duration,
    tx: Sender<Input>,
    token: CancellationToken,
) {
    let client_id = format!("matbridge-{}", std::process::id());
    let (client, mut eventloop) = AsyncClient::new(mqtt_options(&broker, &client_id), 10);
    let mut churn = RateLimitedLog::new(Duration::from_secs(1));

    loop {
        let event = tokio::select! {
            v = eventloop.poll() => v,
            _ = token.cancelled() => break,
        };

        match event {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                log::info!("Connected to MQTT broker {}:{}", broker.host, broker.port);

                for topic in &topics {
                    match client.try_subscribe(topic.clone(), QoS::AtMostOnce) {
                        Ok(()) => log::info!("Subscribed to {}", topic),
                        Err(err) => log::error!("Failed to subscribe to {}: {}", topic, err),
                    }
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let Some(input) = publish_input(&publish.topic, &publish.payload) else {
                    continue;
                };

                if tx.send(input).await.is_err() {
                    break;
                }
            }
            Ok(_) => {}
            Err(err) => {
                churn.log(log::Level::Info, &format!("Offline, reconnecting: {}", err));

                tokio::select! {
                    _ = sleep(reconnect) => {},
                    _ = token.cancelled() => break,
                }
            }
        }
    }

    if let Err(err) = client.try_disconnect() {
        log::debug!("Disconnect request failed: {}", BridgeError::from(err));
    }

    log::info!("Pad source is shutting down");
}

/// Keeps a connection to a line relay (`<topic> <payload>` per line) open, reconnecting every `reconnect` after a loss
pub async fn line_source_task(
    addr: String,
    reconnect: Duration,
    tx: Sender<Input>,
    token: CancellationToken,
) {
    let mut churn = RateLimitedLog::new(Duration::from_secs(1));

    loop {
        let connection = tokio::select! {
            v = TcpStream::connect(&addr) => v,
            _ = token.cancelled() => break,
        };

        match connection {
            Ok(stream) => {
                log::info!("Connected to pad relay at {}", addr);

                match read_messages(stream, &tx, &token).await {
                    Ok(ReadEnd::Cancelled) => break,
                    Ok(ReadEnd::Closed) => {
                        churn.log(log::Level::Info, "Connection closed");
                    }
                    Err(err) => {
                        churn.log(log::Level::Warn, &format!("Pad relay error: {}", err));
                    }
                }
            }
            Err(err) => {
                churn.log(log::Level::Info, &format!("Offline: {}", err));
            }
        }

        if tx.is_closed() {
            break;
        }

        churn.log(log::Level::Info, "Reconnecting...");

        tokio::select! {
            _ = sleep(reconnect) => {},
            _ = token.cancelled() => break,
        }
    }

    log::info!("Pad source is shutting down");
}

/// Each alphabet character typed becomes a press immediately followed by a release.
/// Blocking; runs on a dedicated thread.
pub fn keyboard_reader<R: BufRead>(reader: R, tx: Sender<Input>) {
    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                log::warn!("Keyboard input error: {}", err);
                break;
            }
        };

        for key in line.chars().filter_map(LogicalKey::from_char) {
            let press = Input::Key(KeyEvent::press(key, InputSource::Keyboard));
            let release = Input::Key(KeyEvent::release(key, InputSource::Keyboard));

            if tx.blocking_send(press).is_err() || tx.blocking_send(release).is_err() {
                return;
            }
        }
    }

    log::info!("Keyboard source is shutting down");
}
