use crate::infra::{build_service, ApiService, InMemoryNotificationGateway};
use clap::Args;
use ministry_match::config::ScoringConfig;
use ministry_match::error::AppError;
use ministry_match::matching::{
    AssessmentResponses, CheckOutcome, CoordinatorId, Decision, GiftRating, Match,
    OpportunityDraft, OpportunityId, OrganizationId, ServingStyle, VolunteerId,
};
use std::sync::Arc;

const DEMO_ORGANIZATION: &str = "demo-church";
const DEMO_COORDINATOR: &str = "coord-demo";

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Volunteers needed for the contested opportunity.
    #[arg(long, default_value_t = 1)]
    pub(crate) capacity: u32,
    /// Print every notification handed to the gateway.
    #[arg(long)]
    pub(crate) show_notifications: bool,
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        capacity,
        show_notifications,
    } = args;

    let gateway = Arc::new(InMemoryNotificationGateway::default());
    let service = build_service(&ScoringConfig::default(), gateway.clone())?;
    let organization = OrganizationId::from(DEMO_ORGANIZATION);
    let coordinator = CoordinatorId::from(DEMO_COORDINATOR);
    service.register_coordinator(&organization, &coordinator)?;

    println!("Ministry match demo (fallback scoring, in-memory store)");

    let ada = VolunteerId::from("vol-ada");
    let ben = VolunteerId::from("vol-ben");
    service.submit_assessment(
        &ada,
        demo_responses(&["teaching", "mercy"], &["driving"]),
    )?;
    service.submit_assessment(&ben, demo_responses(&["teaching"], &["cooking"]))?;

    let kids = service.create_opportunity(
        &coordinator,
        demo_draft(
            "Kids church",
            &["teaching"],
            &["driving", "cooking"],
            capacity.max(1),
            false,
        ),
    )?;
    let nursery = service.create_opportunity(
        &coordinator,
        demo_draft("Nursery", &["mercy"], &[], 2, true),
    )?;
    let meals = service.create_opportunity(
        &coordinator,
        demo_draft(
            "Meal train",
            &["mercy", "hospitality"],
            &["cooking"],
            4,
            false,
        ),
    )?;

    println!("\nScoring round for {ada}");
    let ada_round = service.find_matches(&ada).await?;
    print_matches(&ada_round);

    println!(
        "\nContested approval ({} slot(s) in {})",
        kids.volunteers_needed, kids.title
    );
    let ben_round = service.find_matches(&ben).await?;
    let mut pending = Vec::new();
    for (volunteer, round) in [(&ada, &ada_round), (&ben, &ben_round)] {
        if let Some(candidate) = find(round, &kids.opportunity_id) {
            let registration = service.respond_to_match(&candidate.match_id, volunteer)?;
            println!("- {volunteer} applied -> {}", registration.status.label());
            pending.push(registration);
        }
    }
    for registration in &pending {
        match service.decide(
            &registration.registration_id,
            &coordinator,
            Decision::Approve,
            Some("Welcome to the team"),
        ) {
            Ok(receipt) => println!(
                "  {} -> {}",
                receipt.registration.volunteer_id,
                receipt.registration.status.label()
            ),
            Err(err) => println!("  {} -> refused: {err}", registration.volunteer_id),
        }
    }
    let kids_now = service.get_opportunity(&kids.opportunity_id)?;
    println!(
        "  Capacity: {}/{} ({})",
        kids_now.volunteers_registered,
        kids_now.volunteers_needed,
        kids_now.status.label()
    );

    println!("\nClearance gate for {}", nursery.title);
    if let Some(candidate) = find(&ada_round, &nursery.opportunity_id) {
        let registration = service.respond_to_match(&candidate.match_id, &ada)?;
        if let Err(err) = service.decide(
            &registration.registration_id,
            &coordinator,
            Decision::Approve,
            None,
        ) {
            println!("- First approval: {err}");
        }
        let check = service.request_background_check(&ada, "criminal")?;
        service.record_background_check_result(&check.check_id, CheckOutcome::Passed)?;
        println!("- Background check {} recorded as passed", check.check_id);
        let receipt = service.decide(
            &registration.registration_id,
            &coordinator,
            Decision::Approve,
            None,
        )?;
        println!("- Second approval -> {}", receipt.registration.status.label());
    }

    println!("\nRejection for {}", meals.title);
    reject_and_suggest(
        &service,
        &ben,
        &ben_round,
        &meals.opportunity_id,
        &coordinator,
    )
    .await?;

    let sent = gateway.sent();
    println!("\nNotifications dispatched: {}", sent.len());
    if show_notifications {
        for notification in sent {
            println!(
                "  - {:?} -> {}: {}",
                notification.kind, notification.recipient_id, notification.title
            );
        }
    }

    Ok(())
}

async fn reject_and_suggest(
    service: &ApiService,
    volunteer: &VolunteerId,
    round: &[Match],
    opportunity_id: &OpportunityId,
    coordinator: &CoordinatorId,
) -> Result<(), AppError> {
    let Some(candidate) = find(round, opportunity_id) else {
        println!("- {volunteer} has no match for this opportunity");
        return Ok(());
    };
    let registration = service.respond_to_match(&candidate.match_id, volunteer)?;
    let receipt = service.decide(
        &registration.registration_id,
        coordinator,
        Decision::Reject,
        Some("This team is full for the season"),
    )?;
    println!(
        "- {volunteer} -> {} (match {})",
        receipt.registration.status.label(),
        service.get_match(&registration.match_id)?.volunteer_response.label()
    );
    if let Some(search) = receipt.alternatives {
        if search.await.is_err() {
            println!("  Alternative search did not finish");
        }
    }
    Ok(())
}

fn find<'a>(round: &'a [Match], opportunity_id: &OpportunityId) -> Option<&'a Match> {
    round
        .iter()
        .find(|candidate| &candidate.opportunity_id == opportunity_id)
}

fn print_matches(matches: &[Match]) {
    if matches.is_empty() {
        println!("  No open opportunities fit right now");
        return;
    }
    for candidate in matches {
        println!(
            "  - {} score {:.2} ({}, {:?})",
            candidate.opportunity_id,
            candidate.divine_appointment_score,
            candidate.recommendation_tier.label(),
            candidate.source
        );
        println!("    {}", candidate.explanation);
    }
}

fn demo_responses(gifts: &[&str], skills: &[&str]) -> AssessmentResponses {
    AssessmentResponses {
        organization_id: OrganizationId::from(DEMO_ORGANIZATION),
        display_name: None,
        answers: gifts
            .iter()
            .map(|gift| GiftRating {
                gift: gift.to_string(),
                rating: 5,
            })
            .collect(),
        serving_style: ServingStyle::HandsOn,
        ministry_passions: vec!["children".to_string()],
        skills: skills.iter().map(|skill| skill.to_string()).collect(),
        availability: Default::default(),
    }
}

fn demo_draft(
    title: &str,
    gifts: &[&str],
    skills: &[&str],
    needed: u32,
    background_check_required: bool,
) -> OpportunityDraft {
    OpportunityDraft {
        organization_id: OrganizationId::from(DEMO_ORGANIZATION),
        title: title.to_string(),
        description: format!("{title} volunteers"),
        ministry_area: None,
        required_gifts: gifts.iter().map(|gift| gift.to_string()).collect(),
        required_skills: skills.iter().map(|skill| skill.to_string()).collect(),
        volunteers_needed: needed,
        background_check_required,
        is_leadership_role: false,
    }
}
