use chrono::NaiveDate;
use donor_match::config::AppConfig;
use donor_match::workflows::donation::{
    BloodType, ChannelNotificationRouter, CompatibilityPolicy, DonationLifecycleService,
    DonorProfile, InMemoryDonationStore, MatchFinder, NotificationEvent, OrganType,
    RoleBasedAuthorization, ScoringEngine, UrgencyLevel,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) type ApiService =
    DonationLifecycleService<InMemoryDonationStore, ChannelNotificationRouter, RoleBasedAuthorization>;

/// In-memory service over `donors`; the receiver feeds the notification delivery task.
pub(crate) fn in_memory_service(
    donors: Vec<DonorProfile>,
    config: &AppConfig,
) -> (ApiService, UnboundedReceiver<NotificationEvent>) {
    let (router, receiver) = ChannelNotificationRouter::channel();
    let service = DonationLifecycleService::new(
        Arc::new(InMemoryDonationStore::with_donors(donors)),
        Arc::new(router),
        Arc::new(RoleBasedAuthorization),
        matcher(config),
    );
    (service, receiver)
}

pub(crate) fn matcher(config: &AppConfig) -> MatchFinder {
    MatchFinder::new(
        CompatibilityPolicy::default(),
        ScoringEngine::default(),
        config.matching.parallel_threshold,
    )
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

pub(crate) fn parse_blood_type(raw: &str) -> Result<BloodType, String> {
    BloodType::parse(raw).ok_or_else(|| format!("'{raw}' is not an ABO/Rh blood type"))
}

pub(crate) fn parse_organ(raw: &str) -> Result<OrganType, String> {
    OrganType::parse(raw).ok_or_else(|| format!("'{raw}' is not a supported organ"))
}

pub(crate) fn parse_urgency(raw: &str) -> Result<UrgencyLevel, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "routine" => Ok(UrgencyLevel::Routine),
        "urgent" => Ok(UrgencyLevel::Urgent),
        "emergency" => Ok(UrgencyLevel::Emergency),
        "critical" => Ok(UrgencyLevel::Critical),
        _ => Err(format!(
            "'{raw}' is not an urgency (routine, urgent, emergency, critical)"
        )),
    }
}
