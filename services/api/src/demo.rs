use crate::infra::{voter_lookup, InMemoryRegistrantRepository};
use async_trait::async_trait;
use clap::Args;
use ksvotes::config::AppConfig;
use ksvotes::directory::CountyDirectory;
use ksvotes::error::AppError;
use ksvotes::forms::{CannedFormFiller, FormService};
use ksvotes::lookup::{LookupError, LookupOutcome, LookupQuery, VoterLookup};
use ksvotes::registrant::{RegistrationValues, SessionId, SosRecord};
use ksvotes::registration::{RegistrationService, RegistrationSettings, StartSession};
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct CheckArgs {
    /// Voter first name
    #[arg(long)]
    pub(crate) name_first: String,
    /// Voter last name
    #[arg(long)]
    pub(crate) name_last: String,
    /// Date of birth as MM/DD/YYYY
    #[arg(long)]
    pub(crate) dob: String,
    /// Residential ZIP code
    #[arg(long)]
    pub(crate) zip: Option<String>,
}

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Include the advance ballot path after registration.
    #[arg(long)]
    pub(crate) enable_ab: bool,
    /// Skip the registry lookup on step 0.
    #[arg(long)]
    pub(crate) skip_sos: bool,
}

pub(crate) async fn run_check(args: CheckArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let lookup = voter_lookup(&config)?;
    let query = LookupQuery {
        name_first: args.name_first,
        name_last: args.name_last,
        dob: args.dob,
        zip: args.zip,
        county: None,
    };

    match lookup.lookup(&query).await {
        Ok(outcome) if outcome.is_registered() => {
            println!("registered");
            for record in outcome.matches() {
                println!(
                    "- county {} | status {}",
                    record.county().unwrap_or("unknown"),
                    record.status().unwrap_or("unknown")
                );
            }
        }
        Ok(_) => println!("not registered"),
        Err(LookupError::MissingField(field)) => println!("lookup failed: {field} is required"),
        Err(err) => println!("lookup failed ({})", err.failure_reason()),
    }
    Ok(())
}

/// Registry stand-in answering with one active Douglas County voter.
struct CannedLookup;

#[async_trait]
impl VoterLookup for CannedLookup {
    async fn lookup(&self, query: &LookupQuery) -> Result<LookupOutcome, LookupError> {
        query.validate()?;
        let tree = json!({
            "Address": "1200 Massachusetts St, Lawrence, KS 66044",
            "County": "Douglas",
            "Party": "Unaffiliated",
            "Status": "Active",
        });
        Ok(LookupOutcome::Matches(vec![SosRecord {
            tree: tree.as_object().cloned().unwrap_or_default(),
            sample_ballot: None,
            districts: None,
            elections: None,
            polling: None,
        }]))
    }
}

fn form(value: Value) -> RegistrationValues {
    value.as_object().cloned().unwrap_or_default()
}

fn demo_address() -> Value {
    json!({
        "addr": "1200 Massachusetts St",
        "city": "Lawrence",
        "state": "KS",
        "zip": "66044",
    })
}

fn demo_service(enable_ab: bool) -> RegistrationService<InMemoryRegistrantRepository> {
    RegistrationService::new(
        Arc::new(InMemoryRegistrantRepository::default()),
        Arc::new(CannedLookup),
        FormService::new(Arc::new(CannedFormFiller), "en"),
        Arc::new(CountyDirectory::default()),
        RegistrationSettings {
            enable_ab,
            ..RegistrationSettings::default()
        },
    )
}

fn submit_steps(
    service: &RegistrationService<InMemoryRegistrantRepository>,
    session_id: &SessionId,
    steps: Vec<(&str, Value)>,
) -> Result<(), AppError> {
    for (slug, values) in steps {
        let result = service.submit_step(session_id, slug, form(values))?;
        if result.is_complete {
            println!("  {slug:<20} -> {}", result.redirect);
        } else {
            println!("  {slug:<20} incomplete, missing {}", result.missing.join(", "));
            break;
        }
    }
    Ok(())
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        enable_ab,
        skip_sos,
    } = args;

    println!("KSVotes registration demo (personal details redacted)");
    let service = demo_service(enable_ab);

    let started = service.start_session(StartSession {
        ref_code: Some("demo".to_string()),
        lang: Some("en".to_string()),
        prefill: None,
    })?;
    let session_id = started.session_id;
    println!("- Session {session_id} started via referral 'demo'");

    let identity = form(json!({
        "name_first": "Demo",
        "name_last": "Voter",
        "dob": "01/01/1990",
        "zip": "66044",
        "email": "demo@example.org",
    }));
    let step0 = service.submit_step0(&session_id, identity, skip_sos).await?;
    println!(
        "- Step 0: lookup complete {} | registration found {} ({} match(es)) -> {}",
        step0.reg_lookup_complete, step0.reg_found, step0.matches, step0.redirect
    );

    if !skip_sos {
        let view = service.change_or_apply(&session_id)?;
        println!(
            "- Change or apply: county {} | suggested path {}",
            view.county.as_deref().unwrap_or("unknown"),
            view.recommended_path.label()
        );
    }

    println!("\nVoter registration steps");
    submit_steps(
        &service,
        &session_id,
        vec![
            ("vr_citizenship", json!({"is_citizen": true, "is_eighteen": true})),
            ("vr_name", json!({"name_first": "Demo", "name_last": "Voter"})),
            ("vr_address", demo_address()),
            ("vr_party", json!({"party": "Unaffiliated"})),
            ("vr_identification", json!({"identification": "NONE"})),
            ("vr_preview", json!({"signature_string": "data:image/png;base64,demo"})),
            ("vr_affirmation", json!({"affirmation": true})),
        ],
    )?;
    let vr_form = service.vr_form(&session_id).await?;
    println!("  Filled registration form: {} bytes", vr_form.len());

    if enable_ab {
        println!("\nAdvance ballot steps");
        submit_steps(
            &service,
            &session_id,
            vec![
                ("ab_election_picker", json!({"elections": ["General (11/3/2026)"]})),
                ("ab_address", demo_address()),
                ("ab_identification", json!({"ab_identification": "K00-00-0000"})),
                ("ab_preview", json!({"signature_string": "data:image/png;base64,demo"})),
                ("ab_affirmation", json!({"affirmation": true})),
            ],
        )?;
        for ab_form in service.ab_forms(&session_id).await? {
            println!(
                "  Filled {} application for {}: {} bytes",
                ab_form.flavor,
                ab_form.election,
                ab_form.image.len()
            );
        }

        let change = service
            .change_county(&session_id, Some("Sedgwick".to_string()))
            .await?;
        println!(
            "  County changed to {} | ballot applications re-signed {}",
            change.county.as_deref().unwrap_or("unknown"),
            change.ab_forms_resigned
        );
    }

    let totals = service.total_processed().await?;
    println!(
        "\nTotals: {} registration(s) | {} advance ballot application(s)",
        totals.registrations, totals.advance_ballots
    );
    Ok(())
}
