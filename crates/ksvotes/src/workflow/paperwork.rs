use serde::Serialize;

use crate::registrant::Registrant;

use super::steps::FlowPath;

/// Advance ballot application form variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BallotFlavor {
    /// Single-election application.
    Ksav1,
    /// Permanent advance voting status.
    Ksav2,
}

impl BallotFlavor {
    pub fn for_election(election: &str) -> Self {
        if election.trim() == "permanent" {
            BallotFlavor::Ksav2
        } else {
            BallotFlavor::Ksav1
        }
    }

    pub const fn slug(self) -> &'static str {
        match self {
            BallotFlavor::Ksav1 => "ksav1",
            BallotFlavor::Ksav2 => "ksav2",
        }
    }
}

/// One government form the visitor has to sign, addressed to a county clerk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Paperwork {
    VoterRegistration {
        county: Option<String>,
    },
    AdvanceBallot {
        election: String,
        flavor: BallotFlavor,
        county: Option<String>,
    },
}

/// County on the registrant, falling back to the first registry match.
pub fn effective_county(registrant: &Registrant) -> Option<String> {
    registrant
        .county
        .clone()
        .filter(|county| !county.trim().is_empty())
        .or_else(|| {
            registrant
                .sos_reg()
                .and_then(|records| records.first().and_then(|record| record.county().map(str::to_string)))
        })
}

/// Path to suggest on the change-or-apply page.
pub fn recommended_path(registrant: &Registrant, enable_ab: bool) -> FlowPath {
    if enable_ab && registrant.reg_found {
        FlowPath::AdvanceBallot
    } else {
        FlowPath::VoterRegistration
    }
}

pub fn plan_paperwork(registrant: &Registrant, path: FlowPath) -> Vec<Paperwork> {
    let county = effective_county(registrant);
    match path {
        FlowPath::VoterRegistration => vec![Paperwork::VoterRegistration { county }],
        FlowPath::AdvanceBallot => registrant
            .elections()
            .into_iter()
            .map(|election| Paperwork::AdvanceBallot {
                flavor: BallotFlavor::for_election(&election),
                election,
                county: county.clone(),
            })
            .collect(),
    }
}
