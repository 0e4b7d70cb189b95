use crate::infra::{
    in_memory_service, matcher, parse_blood_type, parse_date, parse_organ, parse_urgency,
    ApiService,
};
use chrono::{Duration, NaiveDate, Utc};
use clap::Args;
use donor_match::config::AppConfig;
use donor_match::error::AppError;
use donor_match::workflows::donation::{
    load_donors, spawn_delivery, Actor, ActorRole, AvailabilityClass, BloodComponent, BloodType,
    Candidate, Coordinates, DonationRequest, DonorId, DonorProfile, HospitalId, LifecycleStatus,
    LogisticsUpdate, MatchId, MatchStatus, NewRequest, NotificationError, NotificationEvent,
    NotificationSink, OrganType, Recipient, RequestDetail, RequestId, TransitionTarget,
    TransportMethod, UrgencyLevel,
};
use serde_json::json;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

const DEMO_HOSPITAL: &str = "st-thomas";
const DEMO_HOSPITAL_LOCATION: Coordinates = Coordinates::new(51.4980, -0.1180);

#[derive(Args, Debug)]
pub(crate) struct CandidatesArgs {
    /// Donor roster CSV to rank
    #[arg(long)]
    pub(crate) donors: PathBuf,
    /// Recipient blood type (required for blood needs)
    #[arg(long, value_parser = parse_blood_type, required_unless_present = "organ")]
    pub(crate) blood_type: Option<BloodType>,
    /// Organ needed; turns the query into an organ request
    #[arg(long, value_parser = parse_organ)]
    pub(crate) organ: Option<OrganType>,
    /// Hospital latitude in decimal degrees
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    pub(crate) lat: f64,
    /// Hospital longitude in decimal degrees
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    pub(crate) lon: f64,
    #[arg(long, value_parser = parse_urgency, default_value = "urgent")]
    pub(crate) urgency: UrgencyLevel,
    /// Evaluate eligibility as of this date (YYYY-MM-DD); defaults to today
    #[arg(long, value_parser = parse_date)]
    pub(crate) as_of: Option<NaiveDate>,
    /// Print at most this many candidates
    #[arg(long)]
    pub(crate) limit: Option<usize>,
}

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Donor roster CSV; a built-in sample roster is used when omitted
    #[arg(long)]
    pub(crate) donors: Option<PathBuf>,
    #[arg(long, value_parser = parse_urgency, default_value = "emergency")]
    pub(crate) urgency: UrgencyLevel,
    /// Report a failed outcome instead of a transplant
    #[arg(long)]
    pub(crate) fail: bool,
}

pub(crate) fn run_candidates(args: CandidatesArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let donors = load_donors(&args.donors)?;
    let as_of = args.as_of.unwrap_or_else(|| Utc::now().date_naive());

    let detail = match (args.organ, args.blood_type) {
        (Some(organ), blood_type) => RequestDetail::Organ { organ, blood_type },
        (None, Some(blood_type)) => RequestDetail::Blood {
            blood_type,
            component: BloodComponent::WholeBlood,
            quantity_units: 1,
        },
        (None, None) => clap::Error::raw(
            clap::error::ErrorKind::MissingRequiredArgument,
            "--blood-type is required unless --organ is given\n",
        )
        .exit(),
    };
    let request = DonationRequest::open(
        RequestId("cli-query".to_string()),
        NewRequest {
            hospital: HospitalId("cli".to_string()),
            hospital_location: Coordinates::new(args.lat, args.lon),
            detail,
            urgency: args.urgency,
            required_by: as_of,
        },
        "cli",
        Utc::now(),
    );

    let mut candidates = matcher(&config).find_candidates(&request, &donors, as_of);
    if let Some(limit) = args.limit {
        candidates.truncate(limit);
    }

    let payload = json!({
        "as_of": as_of,
        "population": donors.len(),
        "candidates": candidates,
    });
    let rendered = serde_json::to_string_pretty(&payload).map_err(std::io::Error::from)?;
    println!("{rendered}");
    Ok(())
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let donors = match &args.donors {
        Some(path) => load_donors(path)?,
        None => sample_donors(),
    };

    println!("Donation lifecycle demo ({} donors on the roster)", donors.len());
    let (service, receiver) = in_memory_service(donors, &config);
    let delivery = spawn_delivery(
        receiver,
        Arc::new(ConsoleSink),
        config.notifications.delivery_policy(),
    );

    let hospital = Actor::new(DEMO_HOSPITAL, ActorRole::Hospital);
    let coordinator = Actor::new("coord-demo", ActorRole::Coordinator);
    let today = Utc::now().date_naive();

    let request = service.create_request(
        NewRequest {
            hospital: HospitalId(DEMO_HOSPITAL.to_string()),
            hospital_location: DEMO_HOSPITAL_LOCATION,
            detail: RequestDetail::Blood {
                blood_type: BloodType::ONegative,
                component: BloodComponent::RedCells,
                quantity_units: 2,
            },
            urgency: args.urgency,
            required_by: today + Duration::days(2),
        },
        &hospital,
    )?;
    println!(
        "- Opened request {} ({} urgency) -> {}",
        request.id,
        request.urgency.label(),
        request.status().label()
    );

    let candidates = service.find_candidates(&request.id)?;
    if candidates.is_empty() {
        println!("  No eligible donors on the roster; request stays pending");
        return Ok(());
    }
    println!("  Ranked candidates:");
    for candidate in &candidates {
        print_candidate(candidate);
    }

    let chosen = &candidates[0].donor.id;
    let record = service.propose_match(&request.id, chosen, &coordinator)?;
    println!(
        "- Proposed match {} with donor {} (score {})",
        record.id, chosen, record.score.total
    );

    let donor = Actor::new(chosen.0.clone(), ActorRole::Donor);
    advance(&service, &record.id, MatchStatus::PendingConfirmation, &coordinator)?;
    advance(&service, &record.id, MatchStatus::Confirmed, &donor)?;
    service.update_logistics(
        &record.id,
        LogisticsUpdate {
            transport_method: Some(TransportMethod::Courier),
            scheduled_date: Some(today + Duration::days(1)),
            tracking_position: None,
            instructions: Some("Keep between 2C and 6C".to_string()),
        },
        &coordinator,
    )?;
    println!("- Courier scheduled for {}", today + Duration::days(1));
    advance(&service, &record.id, MatchStatus::InTransit, &coordinator)?;
    advance(&service, &record.id, MatchStatus::Delivered, &coordinator)?;

    let notes = args.fail.then(|| "unit rejected at bedside check".to_string());
    let finished = service.report_outcome(&record.id, !args.fail, notes, &hospital)?;
    let request = service.get_request(&request.id)?;
    println!(
        "- Outcome reported: match {} / request {}",
        finished.status().label(),
        request.status().label()
    );

    println!("\nFinal records:");
    let rendered = serde_json::to_string_pretty(&json!({
        "request": request,
        "match": finished,
    }))
    .map_err(std::io::Error::from)?;
    println!("{rendered}");

    drop(service);
    let stats = delivery.await.map_err(std::io::Error::from)?;
    println!(
        "\nNotifications: {} delivered, {} dropped",
        stats.delivered, stats.dropped
    );
    Ok(())
}

fn advance(
    service: &ApiService,
    match_id: &MatchId,
    status: MatchStatus,
    actor: &Actor,
) -> Result<(), AppError> {
    let outcome = service.apply_transition(
        TransitionTarget::Match {
            id: match_id.clone(),
            status,
        },
        actor,
        None,
    )?;
    println!(
        "- Match {} -> {} ({} notifications queued)",
        match_id,
        status.label(),
        outcome.events.len()
    );
    Ok(())
}

fn print_candidate(candidate: &Candidate) {
    println!(
        "    - {} {} | {:.1} km | {} | score {}",
        candidate.donor.id,
        candidate.donor.blood_type,
        candidate.score.distance_km,
        candidate.donor.availability.label(),
        candidate.score.total
    );
}

struct ConsoleSink;

impl NotificationSink for ConsoleSink {
    fn deliver(&self, event: &NotificationEvent) -> Result<(), NotificationError> {
        let recipient = match &event.recipient {
            Recipient::Donor(id) => format!("donor {id}"),
            Recipient::Hospital(id) => format!("hospital {id}"),
            Recipient::Coordinators => "coordinators".to_string(),
        };
        println!("    [notify {recipient}] {}", event.subject);
        Ok(())
    }
}

fn sample_donors() -> Vec<DonorProfile> {
    let donor = |id: &str,
                 blood_type: BloodType,
                 offset: (f64, f64),
                 availability: AvailabilityClass,
                 last_donation_days_ago: Option<i64>| DonorProfile {
        id: DonorId(id.to_string()),
        blood_type,
        organ_donatable: BTreeMap::new(),
        is_available: true,
        availability,
        schedule: None,
        last_donation_date: last_donation_days_ago
            .map(|days| Utc::now().date_naive() - Duration::days(days)),
        location: Coordinates::new(
            DEMO_HOSPITAL_LOCATION.latitude + offset.0,
            DEMO_HOSPITAL_LOCATION.longitude + offset.1,
        ),
    };

    vec![
        donor(
            "donor-lambeth",
            BloodType::ONegative,
            (0.03, 0.01),
            AvailabilityClass::Immediate,
            Some(120),
        ),
        donor(
            "donor-camden",
            BloodType::ONegative,
            (0.06, -0.02),
            AvailabilityClass::Flexible,
            None,
        ),
        donor(
            "donor-croydon",
            BloodType::ONegative,
            (-0.12, -0.02),
            AvailabilityClass::Scheduled,
            Some(20),
        ),
        donor(
            "donor-hackney",
            BloodType::APositive,
            (0.05, 0.06),
            AvailabilityClass::Immediate,
            None,
        ),
    ]
}
