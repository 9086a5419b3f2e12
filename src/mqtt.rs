// mqtt.rs

use rumqttc::{
    AsyncClient, Event, EventLoop, MqttOptions, Packet, TlsConfiguration, Transport,
};
use tokio::time::Instant;

use crate::*;

const KEEP_ALIVE: Duration = Duration::from_secs(30);
const REQUEST_CAPACITY: usize = 20;

const BACKOFF_BASE: Duration = Duration::from_secs(1);
const BACKOFF_MAX: Duration = Duration::from_secs(32);
const BACKOFF_STABLE: Duration = Duration::from_secs(20);

/// Reconnect delay: doubles on every failure up to a cap, and starts over
/// once a connection has stayed up long enough.
#[derive(Debug)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    stable: Duration,
    current: Duration,
    connected_at: Option<Instant>,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration, stable: Duration) -> Self {
        Backoff {
            base,
            max,
            stable,
            current: base,
            connected_at: None,
        }
    }

    pub fn connected(&mut self) {
        self.connected_at = Some(Instant::now());
    }

    pub fn next_delay(&mut self) -> Duration {
        if let Some(t) = self.connected_at.take() {
            if t.elapsed() >= self.stable {
                self.current = self.base;
            }
        }
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(BACKOFF_BASE, BACKOFF_MAX, BACKOFF_STABLE)
    }
}

fn read_pem(path: &Path, what: &str) -> anyhow::Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("cannot read {what} {}", path.display()))
}

/// Build the TLS client for the AWS IoT endpoint and wrap it in a shadow handler.
pub fn connect_mqtt(config: &MyConfig) -> anyhow::Result<(ShadowClient, EventLoop)> {
    let ca = read_pem(&config.root_ca, "root CA")?;
    let cert = read_pem(&config.cert, "certificate")?;
    let key = read_pem(&config.key, "private key")?;

    let mut opts = MqttOptions::new(&config.client_id, &config.endpoint, config.port);
    opts.set_keep_alive(KEEP_ALIVE);
    opts.set_clean_session(true);
    opts.set_transport(Transport::tls_with_config(TlsConfiguration::Simple {
        ca,
        alpn: None,
        client_auth: Some((cert, key)),
    }));

    info!(
        "MQTT client {} -> {}:{}",
        config.client_id, config.endpoint, config.port
    );
    let (client, eventloop) = AsyncClient::new(opts, REQUEST_CAPACITY);
    let shadow = ShadowClient::new(
        client,
        &config.thing_name,
        &config.client_id,
        config.shadow_timeout(),
    );
    Ok((shadow, eventloop))
}

/// Drive the MQTT connection forever, handing shadow responses to `shadow`.
pub async fn run_mqtt(
    mut eventloop: EventLoop,
    shadow: ShadowClient,
    state: Arc<MyState>,
) -> anyhow::Result<()> {
    let mut backoff = Backoff::default();

    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("MQTT connected.");
                backoff.connected();
                *state.mqtt_up.write().await = true;

                // the broker forgets our subscriptions on a clean session
                if let Err(e) = shadow.connected() {
                    error!("MQTT resubscribe failed: {e:#}");
                }
            }

            Ok(Event::Incoming(Packet::Publish(p))) => {
                if !shadow.dispatch(&p.topic, &p.payload) {
                    debug!("MQTT received on {}: {} bytes", p.topic, p.payload.len());
                }
            }

            Ok(Event::Incoming(Packet::Disconnect)) => {
                warn!("MQTT disconnected by broker.");
                *state.mqtt_up.write().await = false;
            }

            Ok(_) => {}

            Err(e) => {
                *state.mqtt_up.write().await = false;
                let delay = backoff.next_delay();
                error!("MQTT connection error: {e}, retrying in {delay:?}");
                sleep(delay).await;
            }
        }
    }
}


// EOF
