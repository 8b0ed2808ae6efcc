//! Credential gate: keeps the chat surface closed until the backend holds
//! every secret it needs.

use crate::api::Backend;
use crate::notify::Toasts;
use crate::types::{Credential, KeyStatus};
use std::collections::BTreeMap;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct FormField {
    pub credential: Credential,
    pub value: String,
}

/// Entry form for the credentials the backend reported missing
#[derive(Debug, Clone, PartialEq)]
pub struct CredentialForm {
    fields: Vec<FormField>,
}

impl CredentialForm {
    pub fn from_missing(missing: &[Credential]) -> Self {
        Self {
            fields: missing
                .iter()
                .map(|c| FormField {
                    credential: c.clone(),
                    value: String::new(),
                })
                .collect(),
        }
    }

    pub fn fields(&self) -> &[FormField] {
        &self.fields
    }

    /// Set a field's value; false if the form does not ask for it
    pub fn set(&mut self, credential: &Credential, value: &str) -> bool {
        match self.fields.iter_mut().find(|f| f.credential == *credential) {
            Some(field) => {
                field.value = value.trim().to_string();
                true
            }
            None => false,
        }
    }

    /// First field still waiting for input
    pub fn next_empty(&self) -> Option<&Credential> {
        self.fields
            .iter()
            .find(|f| f.value.is_empty())
            .map(|f| &f.credential)
    }

    /// Every field is required before the form can be sent
    pub fn can_submit(&self) -> bool {
        !self.fields.is_empty() && self.fields.iter().all(|f| !f.value.is_empty())
    }

    /// Update body: only fields with a value, so an empty field means
    /// "leave unset" rather than "clear"
    pub fn payload(&self) -> BTreeMap<String, String> {
        self.fields
            .iter()
            .filter(|f| !f.value.is_empty())
            .map(|f| (f.credential.name().to_string(), f.value.clone()))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GatePhase {
    Loading,
    Form(CredentialForm),
    Ready,
}

pub struct CredentialGate {
    phase: GatePhase,
}

impl Default for CredentialGate {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialGate {
    pub fn new() -> Self {
        Self {
            phase: GatePhase::Loading,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.phase == GatePhase::Ready
    }

    pub fn is_loading(&self) -> bool {
        self.phase == GatePhase::Loading
    }

    pub fn form(&self) -> Option<&CredentialForm> {
        match &self.phase {
            GatePhase::Form(form) => Some(form),
            _ => None,
        }
    }

    pub fn form_mut(&mut self) -> Option<&mut CredentialForm> {
        match &mut self.phase {
            GatePhase::Form(form) => Some(form),
            _ => None,
        }
    }

    /// Move out of `Loading` according to a status report
    pub fn apply_status(&mut self, status: KeyStatus) {
        let status = status.sanitized();
        self.phase = if status.is_complete() {
            info!("All credentials present ({})", status.has.len());
            GatePhase::Ready
        } else {
            let names: Vec<&str> = status.missing.iter().map(|c| c.name()).collect();
            warn!("Missing credentials: {}", names.join(", "));
            GatePhase::Form(CredentialForm::from_missing(&status.missing))
        };
    }

    /// Query the backend; stays `Loading` until a status arrives
    pub async fn refresh<B: Backend>(&mut self, api: &B, toasts: &mut Toasts) {
        self.phase = GatePhase::Loading;
        let resp = api.key_status().await;
        match (resp.data, resp.error) {
            (_, Some(err)) => toasts.api_error("Could not check credentials", &err),
            (Some(status), None) => self.apply_status(status),
            (None, None) => warn!("Credential status had an unexpected shape"),
        }
    }

    /// Send the form, then re-query rather than assume the update completed
    /// the set. Returns false when nothing was sent or the update failed.
    pub async fn submit<B: Backend>(&mut self, api: &B, toasts: &mut Toasts) -> bool {
        let payload = match self.form() {
            Some(form) if form.can_submit() => form.payload(),
            _ => return false,
        };
        let resp = api.update_keys(&payload).await;
        if let Some(err) = resp.error {
            toasts.api_error("Could not save credentials", &err);
            return false;
        }
        toasts.info(format!("Saved {} credential(s)", payload.len()));
        self.refresh(api, toasts).await;
        true
    }
}
