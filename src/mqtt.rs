use crate::config::MqttConfig;
use crate::error::{AdvisorError, Result};
use crate::models::{round1, IrrigationRecommendation, SimpleMessage};
use crate::state::StateStore;
use chrono::Utc;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};

// ---------------------------------------------------------------------------
// Topics
// ---------------------------------------------------------------------------

pub const TOPIC_RAW: &str = "raw";
pub const TOPIC_WATERING_REQUIRED: &str = "watering_required";
pub const TOPIC_WATER_AMOUNT: &str = "water_amount";
pub const TOPIC_REASON: &str = "reason";
pub const TOPIC_TEMPERATURE: &str = "temperature";
pub const TOPIC_SOIL_DEFICIT: &str = "soil_deficit";
pub const TOPIC_RAIN_FORECAST: &str = "rain_forecast";
pub const TOPIC_EXECUTE: &str = "execute";
pub const TOPIC_EXECUTED: &str = "executed";
pub const TOPIC_ADDON_STATUS: &str = "addon_status";

pub(crate) fn topic(base: &str, leaf: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), leaf)
}

/// Whether `topic` is one of the execution feedback topics under `base`
pub(crate) fn is_execution_topic(base: &str, topic_name: &str) -> bool {
    topic_name
        .strip_prefix(base.trim_end_matches('/'))
        .and_then(|rest| rest.strip_prefix('/'))
        .is_some_and(|leaf| leaf == TOPIC_EXECUTE || leaf == TOPIC_EXECUTED)
}

// ---------------------------------------------------------------------------
// Outgoing messages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutgoingMessage {
    pub topic: String,
    pub payload: String,
}

/// The topic/payload set for one cycle.
///
/// Extended topics are only added when a recommendation exists, a failed
/// cycle has no temperature or deficit to report.
pub fn build_messages(
    base: &str,
    message: &SimpleMessage,
    recommendation: Option<&IrrigationRecommendation>,
    extended: bool,
) -> Result<Vec<OutgoingMessage>> {
    let mut out = vec![
        OutgoingMessage {
            topic: topic(base, TOPIC_RAW),
            payload: serde_json::to_string(message)?,
        },
        OutgoingMessage {
            topic: topic(base, TOPIC_WATERING_REQUIRED),
            payload: message.watering_required.to_string(),
        },
        OutgoingMessage {
            topic: topic(base, TOPIC_WATER_AMOUNT),
            payload: message.water_amount_lpm2.to_string(),
        },
        OutgoingMessage {
            topic: topic(base, TOPIC_REASON),
            payload: message.reason.clone(),
        },
    ];

    if let (true, Some(rec)) = (extended, recommendation) {
        let analysis = &rec.analysis;
        out.push(OutgoingMessage {
            topic: topic(base, TOPIC_TEMPERATURE),
            payload: analysis.current_conditions.temperature.to_string(),
        });
        out.push(OutgoingMessage {
            topic: topic(base, TOPIC_SOIL_DEFICIT),
            payload: round1(analysis.soil_moisture_deficit_mm).to_string(),
        });
        out.push(OutgoingMessage {
            topic: topic(base, TOPIC_RAIN_FORECAST),
            payload: round1(analysis.upcoming_rain_3days_mm).to_string(),
        });
    }

    Ok(out)
}

// ---------------------------------------------------------------------------
// Publish report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublishResult {
    pub topic: String,
    pub delivered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublishReport {
    pub dry_run: bool,
    pub results: Vec<PublishResult>,
}

impl PublishReport {
    /// At least one sub-message reached the broker (always true for a dry run)
    pub fn success(&self) -> bool {
        self.dry_run || self.results.iter().any(|r| r.delivered)
    }

    pub fn delivered_count(&self) -> usize {
        self.results.iter().filter(|r| r.delivered).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &PublishResult> {
        self.results.iter().filter(|r| !r.delivered)
    }
}

// ---------------------------------------------------------------------------
// Publisher
// ---------------------------------------------------------------------------

pub struct MqttPublisher {
    config: MqttConfig,
    dry_run: bool,
}

impl MqttPublisher {
    pub fn new(config: MqttConfig) -> Self {
        Self {
            config,
            dry_run: false,
        }
    }

    /// Log what would be published instead of connecting
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Publish the simple message (and optionally the extended topics)
    pub async fn publish_cycle(
        &self,
        message: &SimpleMessage,
        recommendation: Option<&IrrigationRecommendation>,
    ) -> Result<PublishReport> {
        let messages = build_messages(
            &self.config.topic_base,
            message,
            recommendation,
            self.config.extended_topics,
        )?;
        Ok(self.publish(&messages).await)
    }

    /// Publish every message with QoS 1 and retain, waiting for broker acks.
    ///
    /// Each message is reported separately; a failure never stops the rest.
    pub async fn publish(&self, messages: &[OutgoingMessage]) -> PublishReport {
        if self.dry_run {
            for m in messages {
                tracing::info!(topic = %m.topic, payload = %m.payload, "[dry-run] would publish");
            }
            return PublishReport {
                dry_run: true,
                results: messages
                    .iter()
                    .map(|m| PublishResult {
                        topic: m.topic.clone(),
                        delivered: false,
                        error: None,
                    })
                    .collect(),
            };
        }

        if !self.config.enabled {
            tracing::warn!("MQTT publishing is disabled in config");
            return failed_report(messages, "MQTT disabled");
        }

        let (client, mut eventloop) = AsyncClient::new(self.options(), messages.len().max(1) + 10);

        // Queue everything, remember which ones made it into the request channel
        let mut queued = Vec::with_capacity(messages.len());
        let mut errors: Vec<Option<String>> = vec![None; messages.len()];
        for (i, m) in messages.iter().enumerate() {
            match client
                .publish(&m.topic, QoS::AtLeastOnce, true, m.payload.as_bytes().to_vec())
                .await
            {
                Ok(()) => queued.push(i),
                Err(e) => errors[i] = Some(e.to_string()),
            }
        }

        let wait = Duration::from_secs(self.config.publish_timeout_secs.max(1));
        let mut acks = AckTracker::new(queued);
        match timeout(wait, drive_until_acked(&mut eventloop, &mut acks)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "MQTT connection failed during publish");
                for i in acks.unacknowledged() {
                    errors[i] = Some(e.clone());
                }
            }
            Err(_) => {
                tracing::warn!(
                    timeout_secs = wait.as_secs(),
                    acked = acks.delivered.len(),
                    "Timed out waiting for MQTT acks"
                );
            }
        }
        let delivered = acks.delivered;

        if let Err(e) = client.disconnect().await {
            tracing::debug!(error = %e, "MQTT disconnect failed");
        }

        let results: Vec<PublishResult> = messages
            .iter()
            .enumerate()
            .map(|(i, m)| {
                let ok = delivered.contains(&i);
                PublishResult {
                    topic: m.topic.clone(),
                    delivered: ok,
                    error: if ok {
                        None
                    } else {
                        Some(errors[i].take().unwrap_or_else(|| "not acknowledged".into()))
                    },
                }
            })
            .collect();

        let report = PublishReport {
            dry_run: false,
            results,
        };

        for failure in report.failures() {
            tracing::warn!(topic = %failure.topic, error = ?failure.error, "MQTT publish failed");
        }
        tracing::info!(
            delivered = report.delivered_count(),
            total = messages.len(),
            broker = %self.config.broker,
            "MQTT publish finished"
        );

        report
    }

    /// Connect and wait for the broker to accept the session
    pub async fn test_connection(&self) -> Result<()> {
        let (client, mut eventloop) = AsyncClient::new(self.options(), 10);
        let wait = Duration::from_secs(self.config.publish_timeout_secs.max(1));

        let result = timeout(wait, async {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => return Ok(()),
                    Ok(_) => {}
                    Err(e) => return Err(AdvisorError::Publish(e.to_string())),
                }
            }
        })
        .await
        .map_err(|_| AdvisorError::Publish("timed out connecting to broker".into()))?;

        result?;
        client.disconnect().await?;
        Ok(())
    }

    fn options(&self) -> MqttOptions {
        options_for(&self.config, &self.config.client_id)
    }
}

fn options_for(config: &MqttConfig, client_id: &str) -> MqttOptions {
    let mut options = MqttOptions::new(client_id, &config.broker, config.port);
    options.set_keep_alive(Duration::from_secs(30));
    if let Some(username) = &config.username {
        options.set_credentials(username, config.password.clone().unwrap_or_default());
    }
    options
}

fn failed_report(messages: &[OutgoingMessage], reason: &str) -> PublishReport {
    PublishReport {
        dry_run: false,
        results: messages
            .iter()
            .map(|m| PublishResult {
                topic: m.topic.clone(),
                delivered: false,
                error: Some(reason.to_string()),
            })
            .collect(),
    }
}

/// Maps packet ids back to queued messages and records which were acked.
///
/// Outgoing publishes leave in queue order, so the n-th outgoing packet id
/// belongs to the n-th queued message.
#[derive(Debug, Default)]
struct AckTracker {
    queued: Vec<usize>,
    by_pkid: HashMap<u16, usize>,
    next_outgoing: usize,
    delivered: Vec<usize>,
}

impl AckTracker {
    fn new(queued: Vec<usize>) -> Self {
        Self {
            delivered: Vec::with_capacity(queued.len()),
            queued,
            ..Self::default()
        }
    }

    fn on_outgoing(&mut self, pkid: u16) {
        if let Some(index) = self.queued.get(self.next_outgoing) {
            self.by_pkid.insert(pkid, *index);
            self.next_outgoing += 1;
        }
    }

    fn on_ack(&mut self, pkid: u16) {
        if let Some(index) = self.by_pkid.remove(&pkid) {
            self.delivered.push(index);
        }
    }

    fn is_complete(&self) -> bool {
        self.delivered.len() >= self.queued.len()
    }

    fn unacknowledged(&self) -> Vec<usize> {
        self.queued
            .iter()
            .copied()
            .filter(|i| !self.delivered.contains(i))
            .collect()
    }
}

/// Poll until every queued publish is acknowledged.
///
/// Progress lives in `acks`, so it survives the future being dropped on timeout.
async fn drive_until_acked(
    eventloop: &mut EventLoop,
    acks: &mut AckTracker,
) -> std::result::Result<(), String> {
    while !acks.is_complete() {
        match eventloop.poll().await {
            Ok(Event::Outgoing(Outgoing::Publish(pkid))) => acks.on_outgoing(pkid),
            Ok(Event::Incoming(Packet::PubAck(ack))) => acks.on_ack(ack.pkid),
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                tracing::debug!("MQTT connected");
            }
            Ok(_) => {}
            Err(e) => return Err(e.to_string()),
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Execution feedback
// ---------------------------------------------------------------------------

/// Execution report sent by the home automation
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ExecutionReport {
    #[serde(default, alias = "actual_amount")]
    pub amount: Option<f64>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Parse a feedback payload: JSON object, bare number, or empty.
pub(crate) fn parse_execution_payload(payload: &[u8]) -> std::result::Result<ExecutionReport, String> {
    let text = String::from_utf8_lossy(payload);
    let text = text.trim();

    if text.is_empty() {
        return Ok(ExecutionReport::default());
    }

    if let Ok(amount) = text.parse::<f64>() {
        if !amount.is_finite() {
            return Err(format!("invalid amount '{text}'"));
        }
        return Ok(ExecutionReport {
            amount: Some(amount),
            notes: None,
        });
    }

    serde_json::from_str::<ExecutionReport>(text)
        .map_err(|e| format!("bad execution payload '{text}': {e}"))
}

/// Listen for execution feedback forever, reconnecting on errors
pub async fn run_feedback_listener(config: &MqttConfig, store: Arc<dyn StateStore>) -> Result<()> {
    if !config.enabled {
        return Err(AdvisorError::Config("MQTT is disabled in config".into()));
    }

    let client_id = format!("{}_feedback", config.client_id);
    let (client, mut eventloop) = AsyncClient::new(options_for(config, &client_id), 20);
    let base = config.topic_base.clone();

    tracing::info!(broker = %config.broker, port = config.port, base = %base, "Starting feedback listener");

    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                tracing::info!("MQTT connected");
                // Subscriptions do not survive a reconnect with a clean session
                for leaf in [TOPIC_EXECUTE, TOPIC_EXECUTED] {
                    if let Err(e) = client.try_subscribe(topic(&base, leaf), QoS::AtLeastOnce) {
                        tracing::error!(error = %e, leaf, "Failed to subscribe");
                    }
                }
            }
            Ok(Event::Incoming(Packet::Publish(p))) => {
                if !is_execution_topic(&base, &p.topic) {
                    tracing::debug!(topic = %p.topic, "Ignoring message");
                    continue;
                }
                handle_execution(&client, &base, store.as_ref(), &p.payload);
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                tracing::warn!("MQTT disconnected");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "MQTT error, reconnecting");
                sleep(Duration::from_secs(2)).await;
            }
        }
    }
}

fn handle_execution(client: &AsyncClient, base: &str, store: &dyn StateStore, payload: &[u8]) {
    let report = match parse_execution_payload(payload) {
        Ok(report) => report,
        Err(e) => {
            tracing::warn!(error = %e, "Ignoring execution feedback");
            return;
        }
    };

    if let Err(e) = store.mark_executed(report.amount, report.notes) {
        tracing::warn!(error = %e, "Failed to record execution");
        return;
    }

    match store
        .status_summary(Utc::now())
        .map_err(|e| e.to_string())
        .and_then(|s| serde_json::to_string(&s).map_err(|e| e.to_string()))
    {
        Ok(status) => {
            if let Err(e) = client.try_publish(
                topic(base, TOPIC_ADDON_STATUS),
                QoS::AtLeastOnce,
                true,
                status.into_bytes(),
            ) {
                tracing::warn!(error = %e, "Failed to publish status");
            }
        }
        Err(e) => tracing::warn!(error = %e, "Failed to build status summary"),
    }
}

// ===========================================================================
// Tests
// ===========================================================================
