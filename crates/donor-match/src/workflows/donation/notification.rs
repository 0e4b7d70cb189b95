//! Notification fan-out: who hears about a transition, and the asynchronous channel that
//! carries events away from the request path.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::domain::{Actor, ActorRole, DonorId, HospitalId, UrgencyLevel};
use super::lifecycle::LifecycleStatus;
use super::matching::{DonationMatch, MatchStatus};
use super::repository::{
    NotificationError, NotificationEvent, NotificationKind, NotificationRouter, Recipient,
};
use super::request::{DonationRequest, RequestStatus};

/// The parties to notify for an action taken by `actor`, excluding the actor's own side.
pub fn recipients_for(
    actor: &Actor,
    hospital: &HospitalId,
    donors: &[DonorId],
    urgency: UrgencyLevel,
) -> Vec<Recipient> {
    let mut recipients = Vec::new();

    if !(actor.role == ActorRole::Hospital && actor.id == hospital.0) {
        recipients.push(Recipient::Hospital(hospital.clone()));
    }
    for donor in donors {
        if actor.role == ActorRole::Donor && actor.id == donor.0 {
            continue;
        }
        recipients.push(Recipient::Donor(donor.clone()));
    }
    if urgency.escalates() {
        recipients.push(Recipient::Coordinators);
    }

    recipients.sort();
    recipients.dedup();
    recipients
}

fn fan_out(
    recipients: Vec<Recipient>,
    kind: NotificationKind,
    subject: String,
    message: String,
    payload: BTreeMap<String, String>,
) -> Vec<NotificationEvent> {
    recipients
        .into_iter()
        .map(|recipient| NotificationEvent {
            recipient,
            kind,
            subject: subject.clone(),
            message: message.clone(),
            payload: payload.clone(),
        })
        .collect()
}

fn request_payload(request: &DonationRequest) -> BTreeMap<String, String> {
    let mut payload = BTreeMap::new();
    payload.insert("request_id".to_string(), request.id.0.clone());
    payload.insert("hospital_id".to_string(), request.hospital.0.clone());
    payload.insert("status".to_string(), request.status().label().to_string());
    payload.insert("urgency".to_string(), request.urgency.label().to_string());
    payload
}

fn match_payload(record: &DonationMatch) -> BTreeMap<String, String> {
    let mut payload = BTreeMap::new();
    payload.insert("match_id".to_string(), record.id.0.clone());
    payload.insert("request_id".to_string(), record.request_id.0.clone());
    payload.insert("donor_id".to_string(), record.donor_id.0.clone());
    payload.insert("status".to_string(), record.status().label().to_string());
    payload.insert("urgency".to_string(), record.urgency.label().to_string());
    payload.insert("score".to_string(), record.score.total.to_string());
    payload
}

pub fn request_created_events(request: &DonationRequest, actor: &Actor) -> Vec<NotificationEvent> {
    let recipients = recipients_for(actor, &request.hospital, &[], request.urgency);
    fan_out(
        recipients,
        NotificationKind::RequestCreated,
        format!("New {} request {}", request.urgency.label(), request.id),
        format!(
            "Hospital {} requested {} by {}",
            request.hospital,
            request.detail.summary(),
            request.required_by
        ),
        request_payload(request),
    )
}

/// Events for one request step `previous -> current`; `donors` are the donors of the
/// request's open matches.
pub fn request_transition_events(
    request: &DonationRequest,
    previous: RequestStatus,
    current: RequestStatus,
    actor: &Actor,
    donors: &[DonorId],
) -> Vec<NotificationEvent> {
    let recipients = recipients_for(actor, &request.hospital, donors, request.urgency);
    let mut payload = request_payload(request);
    payload.insert("status".to_string(), current.label().to_string());
    payload.insert("previous_status".to_string(), previous.label().to_string());

    fan_out(
        recipients,
        NotificationKind::RequestStatusChanged,
        format!("Request {} is now {}", request.id, current.label()),
        format!(
            "Request {} moved from {} to {} ({})",
            request.id,
            previous.label(),
            current.label(),
            actor.role.label()
        ),
        payload,
    )
}

pub fn match_proposed_events(record: &DonationMatch, actor: &Actor) -> Vec<NotificationEvent> {
    let recipients = recipients_for(
        actor,
        &record.hospital,
        std::slice::from_ref(&record.donor_id),
        record.urgency,
    );
    fan_out(
        recipients,
        NotificationKind::MatchProposed,
        format!("Donation match {} proposed", record.id),
        format!(
            "Donor {} was proposed for request {} with score {}",
            record.donor_id, record.request_id, record.score.total
        ),
        match_payload(record),
    )
}

pub fn match_transition_events(
    record: &DonationMatch,
    previous: MatchStatus,
    actor: &Actor,
) -> Vec<NotificationEvent> {
    let recipients = recipients_for(
        actor,
        &record.hospital,
        std::slice::from_ref(&record.donor_id),
        record.urgency,
    );
    let mut payload = match_payload(record);
    payload.insert("previous_status".to_string(), previous.label().to_string());

    let kind = match (record.status(), &record.outcome) {
        (MatchStatus::Transplanted | MatchStatus::Failed, Some(_)) => {
            NotificationKind::OutcomeReported
        }
        _ => NotificationKind::MatchStatusChanged,
    };
    if let Some(outcome) = &record.outcome {
        payload.insert("successful".to_string(), outcome.successful.to_string());
    }

    fan_out(
        recipients,
        kind,
        format!("Match {} is now {}", record.id, record.status().label()),
        format!(
            "Match {} moved from {} to {} ({})",
            record.id,
            previous.label(),
            record.status().label(),
            actor.role.label()
        ),
        payload,
    )
}

pub fn logistics_events(record: &DonationMatch, actor: &Actor) -> Vec<NotificationEvent> {
    let recipients = recipients_for(
        actor,
        &record.hospital,
        std::slice::from_ref(&record.donor_id),
        record.urgency,
    );
    let mut payload = match_payload(record);
    if let Some(date) = record.logistics.scheduled_date {
        payload.insert("scheduled_date".to_string(), date.to_string());
    }

    fan_out(
        recipients,
        NotificationKind::LogisticsUpdated,
        format!("Logistics updated for match {}", record.id),
        format!("Transport details for match {} changed", record.id),
        payload,
    )
}

/// Router that hands events to an unbounded channel; `emit` never blocks.
#[derive(Debug, Clone)]
pub struct ChannelNotificationRouter {
    sender: mpsc::UnboundedSender<NotificationEvent>,
}

impl ChannelNotificationRouter {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<NotificationEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl NotificationRouter for ChannelNotificationRouter {
    fn emit(&self, event: NotificationEvent) -> Result<(), NotificationError> {
        self.sender
            .send(event)
            .map_err(|_| NotificationError::Closed)
    }
}

/// Final transport for a notification (email, SMS, push, ...).
pub trait NotificationSink: Send + Sync + 'static {
    fn deliver(&self, event: &NotificationEvent) -> Result<(), NotificationError>;
}

/// Sink that records deliveries in the log stream.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn deliver(&self, event: &NotificationEvent) -> Result<(), NotificationError> {
        info!(
            recipient = ?event.recipient,
            kind = ?event.kind,
            subject = %event.subject,
            "notification delivered"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(250),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryStats {
    pub delivered: u64,
    pub dropped: u64,
}

/// Drain `receiver` on a background task until every router handle is dropped.
pub fn spawn_delivery<S: NotificationSink>(
    mut receiver: mpsc::UnboundedReceiver<NotificationEvent>,
    sink: Arc<S>,
    policy: DeliveryPolicy,
) -> JoinHandle<DeliveryStats> {
    tokio::spawn(async move {
        let mut stats = DeliveryStats::default();
        while let Some(event) = receiver.recv().await {
            if deliver_with_retry(sink.as_ref(), &event, policy).await {
                stats.delivered += 1;
            } else {
                stats.dropped += 1;
            }
        }
        stats
    })
}

async fn deliver_with_retry<S: NotificationSink>(
    sink: &S,
    event: &NotificationEvent,
    policy: DeliveryPolicy,
) -> bool {
    let attempts = policy.max_attempts.max(1);
    for attempt in 1..=attempts {
        match sink.deliver(event) {
            Ok(()) => return true,
            Err(error) if attempt < attempts => {
                warn!(attempt, %error, subject = %event.subject, "notification delivery failed, retrying");
                tokio::time::sleep(policy.backoff * attempt).await;
            }
            Err(error) => {
                warn!(attempt, %error, subject = %event.subject, "notification dropped");
            }
        }
    }
    false
}
