//! Shared test fixtures: CSV files in temp dirs, pipelines over the memory
//! store and a scripted verification API

#![allow(dead_code)]

use async_trait::async_trait;
use recon_common::config::TomlConfig;
use recon_common::events::EventBus;
use recon_common::{Error, Identifier, Result};
use recon_pipeline::config::PipelineSettings;
use recon_pipeline::services::consultation::{CredentialSet, Credentials, VerificationApi};
use recon_pipeline::sheet::{CsvSource, Sheet, TabularSource};
use recon_pipeline::store::MemoryStore;
use recon_pipeline::utils::RecordingSleeper;
use recon_pipeline::workflow::Pipeline;
use serde_json::Value;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Write a CSV file with `headers` and `rows` into `dir`
pub fn write_csv(dir: &Path, name: &str, headers: &[&str], rows: &[&[&str]]) -> PathBuf {
    let path = dir.join(name);
    let sheet = Sheet::from_strs(name, headers, rows);
    CsvSource::new().save(&sheet, &path).expect("Failed to write test CSV");
    path
}

pub fn read_csv(path: &Path) -> Sheet {
    CsvSource::new().open(path).expect("Failed to read test CSV")
}

pub fn credentials(id: &str) -> Credentials {
    Credentials {
        client_id: id.to_string(),
        client_secret: format!("{}-secret", id),
        label: id.to_string(),
    }
}

pub fn both_credentials() -> CredentialSet {
    CredentialSet {
        primary: Some(credentials("primary")),
        secondary: Some(credentials("secondary")),
    }
}

/// Default settings with both credential pairs configured
pub fn test_settings() -> PipelineSettings {
    PipelineSettings::from_config(&TomlConfig::default(), both_credentials()).unwrap()
}

pub struct TestPipeline {
    pub pipeline: Arc<Pipeline>,
    pub store: Arc<MemoryStore>,
    pub sleeper: Arc<RecordingSleeper>,
}

pub fn pipeline_with(settings: PipelineSettings, api: Option<Arc<ScriptedApi>>) -> TestPipeline {
    let store = Arc::new(MemoryStore::new());
    let sleeper = Arc::new(RecordingSleeper::new());
    let mut pipeline = Pipeline::new(store.clone(), Arc::new(CsvSource::new()), settings, EventBus::new(1000))
        .with_sleeper(sleeper.clone());
    if let Some(api) = api {
        pipeline = pipeline.with_api(api);
    }
    TestPipeline {
        pipeline: Arc::new(pipeline),
        store,
        sleeper,
    }
}

pub fn test_pipeline() -> TestPipeline {
    pipeline_with(test_settings(), None)
}

/// One scripted reply of the fake API
pub enum Reply {
    /// Identifiers reported available (all others become clients)
    Available(Vec<&'static str>),
    /// Verify call fails with an API error
    Fail,
    /// Verify call returns a body that is not an object
    Malformed,
}

/// Verification API that replays `Reply`s in order and records every call
#[derive(Default)]
pub struct ScriptedApi {
    replies: Mutex<VecDeque<Reply>>,
    token_requests: Mutex<Vec<String>>,
    verified: Mutex<Vec<Vec<Identifier>>>,
}

impl ScriptedApi {
    pub fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            ..Self::default()
        }
    }

    /// Client ids used for token requests, in call order
    pub fn token_requests(&self) -> Vec<String> {
        self.token_requests.lock().unwrap().clone()
    }

    /// Identifier lists submitted to verify, in call order
    pub fn verified(&self) -> Vec<Vec<Identifier>> {
        self.verified.lock().unwrap().clone()
    }
}

#[async_trait]
impl VerificationApi for ScriptedApi {
    async fn acquire_token(&self, credentials: &Credentials) -> Result<String> {
        self.token_requests.lock().unwrap().push(credentials.client_id.clone());
        Ok(format!("token-{}", credentials.client_id))
    }

    async fn verify(&self, _token: &str, identifiers: &[Identifier]) -> Result<Value> {
        self.verified.lock().unwrap().push(identifiers.to_vec());
        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            Some(Reply::Available(ids)) => Ok(serde_json::json!({ "CNPJ_DISPONIVEL": ids })),
            Some(Reply::Malformed) => Ok(Value::String("upstream error page".to_string())),
            Some(Reply::Fail) | None => Err(Error::ExternalApi("HTTP 503: quota exceeded".to_string())),
        }
    }
}
