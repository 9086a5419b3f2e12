// shadow.rs

use std::{
    collections::HashMap,
    sync::{atomic::AtomicBool, Mutex},
};

use rumqttc::{AsyncClient, QoS};

use crate::*;

/// What the device reports into `state.reported`. Values are strings,
/// the dashboard side expects them that way.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reported {
    Disease { disease: String, probability: String },
    Sensors { moisture: String, temp: String },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShadowState {
    pub reported: Reported,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShadowDocument {
    pub state: ShadowState,
    #[serde(rename = "clientToken", skip_serializing_if = "Option::is_none", default)]
    pub client_token: Option<String>,
}

impl ShadowDocument {
    fn reported(reported: Reported) -> Self {
        ShadowDocument {
            state: ShadowState { reported },
            client_token: None,
        }
    }

    pub fn disease(diagnosis: &DiagnosisResult) -> Self {
        Self::reported(Reported::Disease {
            disease: diagnosis.name.clone(),
            probability: diagnosis.probability.to_string(),
        })
    }

    pub fn sensors(reading: &SensorReading) -> Self {
        Self::reported(Reported::Sensors {
            moisture: reading.moisture.to_string(),
            temp: reading.temperature.to_string(),
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShadowOutcome {
    Accepted,
    Rejected,
    Timeout,
}

/// Called exactly once per request with the outcome and the response
/// payload (empty on timeout).
pub type ShadowCallback = Box<dyn FnOnce(ShadowOutcome, &str) + Send + 'static>;

pub fn log_update_outcome(outcome: ShadowOutcome, payload: &str) {
    match outcome {
        ShadowOutcome::Accepted => info!("Update request accepted: {payload}"),
        ShadowOutcome::Rejected => error!("Update request rejected: {payload}"),
        ShadowOutcome::Timeout => error!("Update request timed out!"),
    }
}

pub fn log_delete_outcome(outcome: ShadowOutcome, payload: &str) {
    match outcome {
        ShadowOutcome::Accepted => info!("Shadow deleted."),
        // deleting a shadow that does not exist yet is rejected with 404
        ShadowOutcome::Rejected => warn!("Shadow delete rejected: {payload}"),
        ShadowOutcome::Timeout => error!("Shadow delete timed out!"),
    }
}

/// Fire-and-forget reporting seam used by the monitor loop.
#[allow(async_fn_in_trait)]
pub trait ShadowReporter {
    async fn report(&self, doc: ShadowDocument) -> anyhow::Result<()>;
}

#[derive(Deserialize)]
struct ResponseToken {
    #[serde(rename = "clientToken")]
    client_token: Option<String>,
}

#[derive(Serialize)]
struct DeleteRequest<'a> {
    #[serde(rename = "clientToken")]
    client_token: &'a str,
}

struct ShadowInner {
    client: AsyncClient,
    prefix: String,
    token_base: String,
    seq: AtomicU64,
    reset_done: AtomicBool,
    timeout: Duration,
    pending: Mutex<HashMap<String, ShadowCallback>>,
}

/// AWS IoT device shadow over MQTT.
#[derive(Clone)]
pub struct ShadowClient {
    inner: Arc<ShadowInner>,
}

impl ShadowClient {
    pub fn new(client: AsyncClient, thing_name: &str, client_id: &str, timeout: Duration) -> Self {
        ShadowClient {
            inner: Arc::new(ShadowInner {
                client,
                prefix: format!("$aws/things/{thing_name}/shadow"),
                token_base: client_id.chars().take(48).collect(),
                seq: AtomicU64::new(0),
                reset_done: AtomicBool::new(false),
                timeout,
                pending: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn update_topic(&self) -> String {
        format!("{}/update", self.inner.prefix)
    }

    pub fn delete_topic(&self) -> String {
        format!("{}/delete", self.inner.prefix)
    }

    fn response_topics(&self) -> [String; 4] {
        let p = &self.inner.prefix;
        [
            format!("{p}/update/accepted"),
            format!("{p}/update/rejected"),
            format!("{p}/delete/accepted"),
            format!("{p}/delete/rejected"),
        ]
    }

    /// Non-blocking subscribe, safe to call from the event loop itself.
    pub fn try_subscribe(&self) -> anyhow::Result<()> {
        for topic in self.response_topics() {
            self.inner.client.try_subscribe(&topic, QoS::AtLeastOnce)?;
        }
        info!("Subscribed to {}/+/accepted|rejected", self.inner.prefix);
        Ok(())
    }

    /// Run on every ConnAck: resubscribe, and on the first connection
    /// delete the shadow so stale reported state does not linger.
    pub fn connected(&self) -> anyhow::Result<()> {
        self.try_subscribe()?;
        if !self.inner.reset_done.load(Ordering::Relaxed) {
            let token = self.delete(Box::new(log_delete_outcome))?;
            self.inner.reset_done.store(true, Ordering::Relaxed);
            info!("Requested shadow reset {token}");
        }
        Ok(())
    }

    pub fn pending_count(&self) -> usize {
        self.lock_pending().len()
    }

    /// Publish a shadow update; `callback` receives the broker's verdict.
    /// Returns the client token of the request. Never waits on the
    /// connection: a full request queue fails the call instead.
    pub fn update(
        &self,
        mut doc: ShadowDocument,
        callback: ShadowCallback,
    ) -> anyhow::Result<String> {
        let token = self.next_token();
        doc.client_token = Some(token.clone());
        let payload = serde_json::to_vec(&doc)?;
        self.submit(self.update_topic(), payload, token, callback)
    }

    /// Delete the whole shadow document.
    pub fn delete(&self, callback: ShadowCallback) -> anyhow::Result<String> {
        let token = self.next_token();
        let payload = serde_json::to_vec(&DeleteRequest {
            client_token: &token,
        })?;
        self.submit(self.delete_topic(), payload, token, callback)
    }

    /// Route an incoming publish to whoever is waiting for it.
    /// Returns true when a pending request was completed.
    pub fn dispatch(&self, topic: &str, payload: &[u8]) -> bool {
        let Some(rest) = topic.strip_prefix(self.inner.prefix.as_str()) else {
            return false;
        };
        let outcome = if rest.ends_with("/accepted") {
            ShadowOutcome::Accepted
        } else if rest.ends_with("/rejected") {
            ShadowOutcome::Rejected
        } else {
            return false;
        };

        let token = match serde_json::from_slice::<ResponseToken>(payload) {
            Ok(ResponseToken {
                client_token: Some(t),
            }) => t,
            Ok(_) => {
                debug!("Shadow response on {topic} without client token");
                return false;
            }
            Err(e) => {
                warn!("Unparseable shadow response on {topic}: {e}");
                return false;
            }
        };

        let Some(callback) = self.lock_pending().remove(&token) else {
            debug!("Shadow response for unknown token {token}");
            return false;
        };
        callback(outcome, &String::from_utf8_lossy(payload));
        true
    }

    fn submit(
        &self,
        topic: String,
        payload: Vec<u8>,
        token: String,
        callback: ShadowCallback,
    ) -> anyhow::Result<String> {
        // register before publishing so a fast response cannot race us
        self.lock_pending().insert(token.clone(), callback);

        // the request queue only drains while connected
        if let Err(e) = self
            .inner
            .client
            .try_publish(&topic, QoS::AtLeastOnce, false, payload)
        {
            self.lock_pending().remove(&token);
            bail!("dropped {topic} request {token}: {e}");
        }
        debug!("Queued {topic} request {token}");

        let inner = Arc::clone(&self.inner);
        let t = token.clone();
        tokio::spawn(async move {
            sleep(inner.timeout).await;
            let expired = inner
                .pending
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .remove(&t);
            if let Some(callback) = expired {
                callback(ShadowOutcome::Timeout, "");
            }
        });
        Ok(token)
    }

    fn next_token(&self) -> String {
        let n = self.inner.seq.fetch_add(1, Ordering::Relaxed);
        format!("{}-{n}", self.inner.token_base)
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, HashMap<String, ShadowCallback>> {
        self.inner
            .pending
            .lock()
            .unwrap_or_else(|p| p.into_inner())
    }
}

impl ShadowReporter for ShadowClient {
    async fn report(&self, doc: ShadowDocument) -> anyhow::Result<()> {
        let token = self.update(doc, Box::new(log_update_outcome))?;
        info!("Published shadow update {token}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rumqttc::MqttOptions;

    use super::*;

    fn shadow(timeout: Duration) -> (ShadowClient, rumqttc::EventLoop) {
        let opts = MqttOptions::new("PlantHealthPublisher", "localhost", 8883);
        let (client, eventloop) = AsyncClient::new(opts, 16);
        (
            ShadowClient::new(client, "PlantMonitor", "PlantHealthPublisher", timeout),
            eventloop,
        )
    }

    fn recorder() -> (Arc<Mutex<Vec<ShadowOutcome>>>, ShadowCallback) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        (
            seen,
            Box::new(move |o: ShadowOutcome, _: &str| s.lock().unwrap().push(o)),
        )
    }

    #[test]
    fn disease_payload_shape() {
        let doc = ShadowDocument::disease(&DiagnosisResult {
            name: "Leaf Spot".into(),
            probability: 0.87,
        });
        assert_eq!(
            serde_json::to_string(&doc).unwrap(),
            r#"{"state":{"reported":{"disease":"Leaf Spot","probability":"0.87"}}}"#
        );
    }

    #[test]
    fn sensor_payload_shape() {
        let doc = ShadowDocument::sensors(&SensorReading {
            moisture: 250,
            temperature: 22.5,
        });
        assert_eq!(
            serde_json::to_string(&doc).unwrap(),
            r#"{"state":{"reported":{"moisture":"250","temp":"22.5"}}}"#
        );
    }

    #[tokio::test]
    async fn update_is_stamped_and_routed_to_topic() {
        let (shadow, _ev) = shadow(Duration::from_secs(5));
        assert_eq!(shadow.update_topic(), "$aws/things/PlantMonitor/shadow/update");
        assert_eq!(shadow.delete_topic(), "$aws/things/PlantMonitor/shadow/delete");

        let (_, cb) = recorder();
        let doc = ShadowDocument::disease(&DiagnosisResult {
            name: "Rust".into(),
            probability: 0.1,
        });
        let t1 = shadow.update(doc, cb).unwrap();
        let (_, cb) = recorder();
        let t2 = shadow.delete(cb).unwrap();
        assert_ne!(t1, t2);
        assert!(t1.starts_with("PlantHealthPublisher-"));
        assert_eq!(shadow.pending_count(), 2);
    }

    #[tokio::test]
    async fn rejected_response_fires_callback_once() {
        let (shadow, _ev) = shadow(Duration::from_secs(5));
        let (seen, cb) = recorder();
        let token = shadow
            .update(
                ShadowDocument::sensors(&SensorReading {
                    moisture: 250,
                    temperature: 20.0,
                }),
                cb,
            )
            .unwrap();

        let payload = format!(r#"{{"code":400,"message":"Missing required node: state","clientToken":"{token}"}}"#);
        let topic = "$aws/things/PlantMonitor/shadow/update/rejected";
        assert!(shadow.dispatch(topic, payload.as_bytes()));
        assert!(!shadow.dispatch(topic, payload.as_bytes()));

        assert_eq!(*seen.lock().unwrap(), vec![ShadowOutcome::Rejected]);
        assert_eq!(shadow.pending_count(), 0);
    }

    #[tokio::test]
    async fn accepted_delete_fires_callback() {
        let (shadow, _ev) = shadow(Duration::from_secs(5));
        let (seen, cb) = recorder();
        let token = shadow.delete(cb).unwrap();

        let payload = format!(r#"{{"version":3,"timestamp":1700000000,"clientToken":"{token}"}}"#);
        assert!(shadow.dispatch("$aws/things/PlantMonitor/shadow/delete/accepted", payload.as_bytes()));
        assert_eq!(*seen.lock().unwrap(), vec![ShadowOutcome::Accepted]);
    }

    #[tokio::test]
    async fn foreign_topics_and_tokens_are_ignored() {
        let (shadow, _ev) = shadow(Duration::from_secs(5));
        let (seen, cb) = recorder();
        shadow.delete(cb).unwrap();

        assert!(!shadow.dispatch("$aws/things/Other/shadow/update/accepted", br#"{"clientToken":"x"}"#));
        assert!(!shadow.dispatch("$aws/things/PlantMonitor/shadow/update/accepted", br#"{"clientToken":"nope"}"#));
        assert!(!shadow.dispatch("$aws/things/PlantMonitor/shadow/update/accepted", b"{}"));
        assert!(!shadow.dispatch("$aws/things/PlantMonitor/shadow/update/accepted", b"garbage"));
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(shadow.pending_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_request_times_out() {
        let (shadow, _ev) = shadow(Duration::from_secs(5));
        let (seen, cb) = recorder();
        let token = shadow.delete(cb).unwrap();

        sleep(Duration::from_secs(4)).await;
        assert!(seen.lock().unwrap().is_empty());

        sleep(Duration::from_secs(2)).await;
        assert_eq!(*seen.lock().unwrap(), vec![ShadowOutcome::Timeout]);

        // a late answer finds nobody waiting
        let payload = format!(r#"{{"clientToken":"{token}"}}"#);
        assert!(!shadow.dispatch("$aws/things/PlantMonitor/shadow/delete/accepted", payload.as_bytes()));
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn shadow_is_reset_on_first_connection_only() {
        let (shadow, _ev) = shadow(Duration::from_secs(5));
        shadow.connected().unwrap();
        assert_eq!(shadow.pending_count(), 1);
        // reconnects only resubscribe
        shadow.connected().unwrap();
        assert_eq!(shadow.pending_count(), 1);
    }

    #[tokio::test]
    async fn full_request_queue_drops_update_without_waiting() {
        // nobody polls the event loop, as while the broker is unreachable
        let opts = MqttOptions::new("PlantHealthPublisher", "localhost", 8883);
        let (client, _ev) = AsyncClient::new(opts, 2);
        let shadow = ShadowClient::new(client, "PlantMonitor", "PlantHealthPublisher", Duration::from_secs(5));
        let doc = || {
            ShadowDocument::sensors(&SensorReading {
                moisture: 400,
                temperature: 19.0,
            })
        };

        let (_, cb) = recorder();
        shadow.update(doc(), cb).unwrap();
        let (_, cb) = recorder();
        shadow.update(doc(), cb).unwrap();

        let (seen, cb) = recorder();
        assert!(shadow.update(doc(), cb).is_err());
        assert!(shadow.report(doc()).await.is_err());
        assert_eq!(shadow.pending_count(), 2);
        assert!(seen.lock().unwrap().is_empty());
    }
}

// EOF
