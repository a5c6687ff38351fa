use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use super::filler::{FormFiller, FormFillerError};
use super::payload::{marshall_payload, FormKind};
use crate::config::is_supported_language;
use crate::registrant::Registrant;
use crate::workflow::BallotFlavor;

/// A filled advance ballot application kept on the registrant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbFormImage {
    pub election: String,
    pub flavor: String,
    pub image: String,
}

/// Marshals registrant data into form-filler requests.
#[derive(Clone)]
pub struct FormService {
    filler: Arc<dyn FormFiller>,
    default_lang: String,
}

impl FormService {
    pub fn new(filler: Arc<dyn FormFiller>, default_lang: impl Into<String>) -> Self {
        Self {
            filler,
            default_lang: default_lang.into(),
        }
    }

    fn lang<'a>(&'a self, registrant: &'a Registrant) -> &'a str {
        if is_supported_language(&registrant.lang) {
            &registrant.lang
        } else {
            &self.default_lang
        }
    }

    pub async fn vr_form(&self, registrant: &Registrant) -> Result<String, FormFillerError> {
        let url = format!("/vr/{}", self.lang(registrant));
        self.fetch(registrant, &url, &FormKind::VoterRegistration)
            .await
    }

    pub async fn ab_form(
        &self,
        registrant: &Registrant,
        election: &str,
    ) -> Result<AbFormImage, FormFillerError> {
        let flavor = BallotFlavor::for_election(election);
        let url = format!("/av/{}/{}", flavor.slug(), self.lang(registrant));
        let kind = FormKind::AdvanceBallot {
            flavor,
            election: election.to_string(),
        };
        let image = self.fetch(registrant, &url, &kind).await?;
        Ok(AbFormImage {
            election: election.to_string(),
            flavor: flavor.slug().to_string(),
            image,
        })
    }

    /// Regenerate one application per picked election and store them on the registrant.
    pub async fn sign_ab_forms(
        &self,
        registrant: &mut Registrant,
    ) -> Result<Vec<AbFormImage>, FormFillerError> {
        let mut forms = Vec::new();
        for election in registrant.elections() {
            forms.push(self.ab_form(registrant, &election).await?);
        }

        registrant.set_value("ab_forms", serde_json::to_value(&forms)?);
        Ok(forms)
    }

    async fn fetch(
        &self,
        registrant: &Registrant,
        url: &str,
        kind: &FormKind,
    ) -> Result<String, FormFillerError> {
        info!(session_id = %registrant.session_id, form = url, "form filler request");
        let mut payload = marshall_payload(registrant, kind);
        payload.insert(
            "uuid".to_string(),
            Value::String(registrant.session_id.to_string()),
        );
        self.filler.fill(url, &payload).await
    }
}
