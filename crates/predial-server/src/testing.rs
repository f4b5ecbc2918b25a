//! Test doubles shared by the workflow tests.
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use predial_common::error::CommonError;
use predial_common::mcp_api::{Profession, UserProfile};
use predial_common::text_service::{ChatTurn, ImagePayload, TextService};
use tokio::sync::Notify;

use crate::catalog::{Catalog, EMBEDDED_CATALOG};
use crate::correlate::Correlator;
use crate::profile::default_letterhead;
use crate::workflow::Context;

/// One recorded call to the text service.
#[derive(Debug, Clone)]
pub struct Call {
    pub prompt: String,
    pub images: usize,
    pub turns: Vec<ChatTurn>,
}

/// `TextService` answering from a script and recording every call.
///
/// With a gate, each call signals `entered` and then waits for `release` before
/// answering.
#[derive(Default)]
pub struct ScriptedText {
    replies: Mutex<VecDeque<Result<String, CommonError>>>,
    calls: Mutex<Vec<Call>>,
    gate: Option<(Arc<Notify>, Arc<Notify>)>,
}

impl ScriptedText {
    pub fn replying(replies: Vec<Result<String, CommonError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            ..Default::default()
        }
    }

    pub fn gated(replies: Vec<Result<String, CommonError>>) -> (Self, Arc<Notify>, Arc<Notify>) {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let service = Self {
            replies: Mutex::new(replies.into()),
            gate: Some((Arc::clone(&entered), Arc::clone(&release))),
            ..Default::default()
        };
        (service, entered, release)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().expect("calls lock").clone()
    }

    async fn answer(&self, call: Call) -> Result<String, CommonError> {
        self.calls.lock().expect("calls lock").push(call);
        if let Some((entered, release)) = &self.gate {
            entered.notify_one();
            release.notified().await;
        }
        self.replies
            .lock()
            .expect("replies lock")
            .pop_front()
            .unwrap_or(Err(CommonError::EmptyResponse))
    }
}

impl TextService for ScriptedText {
    async fn complete(&self, prompt: &str) -> Result<String, CommonError> {
        self.answer(Call {
            prompt: prompt.to_string(),
            images: 0,
            turns: Vec::new(),
        })
        .await
    }

    async fn complete_with_images(
        &self,
        prompt: &str,
        images: &[ImagePayload],
    ) -> Result<String, CommonError> {
        self.answer(Call {
            prompt: prompt.to_string(),
            images: images.len(),
            turns: Vec::new(),
        })
        .await
    }

    async fn converse(&self, system: &str, turns: &[ChatTurn]) -> Result<String, CommonError> {
        self.answer(Call {
            prompt: system.to_string(),
            images: 0,
            turns: turns.to_vec(),
        })
        .await
    }
}

pub fn catalog() -> Arc<Catalog> {
    Arc::new(Catalog::from_json(EMBEDDED_CATALOG).expect("embedded catalog"))
}

pub fn context(ai: ScriptedText) -> (Context<ScriptedText>, Arc<ScriptedText>) {
    let ai = Arc::new(ai);
    let catalog = catalog();
    let correlator = Arc::new(Correlator::new(catalog.all_pathologies()));
    let ctx = Context {
        ai: Arc::clone(&ai),
        catalog,
        correlator,
    };
    (ctx, ai)
}

pub fn profile() -> UserProfile {
    UserProfile {
        full_name: "Maria Souza".to_string(),
        profession: Profession::CivilEngineer,
        professional_registry: "CREA 12345".to_string(),
        registration_id: String::new(),
        role: String::new(),
        public_agency_name: "Secretaria de Obras".to_string(),
        public_agency_address: "Rua A, 100".to_string(),
        public_agency_cnpj: String::new(),
        letterhead: Some(default_letterhead()),
    }
}

pub fn failure() -> CommonError {
    CommonError::EmptyResponse
}
