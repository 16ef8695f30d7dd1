//! InMemoryService - 開発・テスト用のリモートサービス代替
//!
//! 認証・ストレージ・定義レジストリ・work item の 4 つの port を 1 つの
//! 共有状態で実装します。Clone すると同じ状態を共有するので、テストでは
//! 片方を client に渡し、もう片方で状態を覗いたり失敗を仕込んだりします。
//!
//! # 振る舞い
//! - 409 / 404 はリモートサービスと同じ条件で返す
//! - アップロードは finalize するまで object key が解決できない
//! - work item の状態は `script_statuses` の順に返し、尽きたら最後の値を返し続ける
//! - Success を返した時点で、出力引数の URL に「ジョブの出力」を書き込む
//!   （Failed のときは `write_on_failure` で指定した出力だけ）

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::domain::{
    AliasInfo, ApiFailure, Credentials, Definition, DefinitionVersion, FlowError, FlowResult,
    QualifiedId, Scopes, Token, UploadKey, Version, WorkItemId, WorkItemRequest, WorkItemStatus,
};
use crate::ports::{
    Backend, Connection, DefinitionRegistry, ObjectStore, TokenProvider, UploadTarget,
    WorkItemApi, WorkItemInfo,
};

const UPLOAD_PREFIX: &str = "memory://upload/";
const DOWNLOAD_PREFIX: &str = "memory://download/";
const OUTPUT_PREFIX: &str = "memory://output/";

/// Operation that `fail_next` can make fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FakeOp {
    Token,
    CreateBucket,
    RequestUpload,
    PutBytes,
    CompleteUpload,
    SignedDownload,
    SignedUpload,
    CreateDefinition,
    CreateVersion,
    CreateAlias,
    UpdateAlias,
    GetAlias,
    GetDefinition,
    DeleteDefinition,
    SubmitWorkItem,
    WorkItemStatus,
}

impl FakeOp {
    fn method(self) -> &'static str {
        match self {
            FakeOp::SignedDownload
            | FakeOp::SignedUpload
            | FakeOp::GetAlias
            | FakeOp::GetDefinition
            | FakeOp::WorkItemStatus => "GET",
            FakeOp::PutBytes => "PUT",
            FakeOp::UpdateAlias => "PATCH",
            FakeOp::DeleteDefinition => "DELETE",
            _ => "POST",
        }
    }
}

#[derive(Debug, Default)]
struct PendingUpload {
    object_key: String,
    data: Option<Bytes>,
}

#[derive(Debug, Default)]
struct Registered {
    versions: Vec<serde_json::Value>,
    aliases: HashMap<String, Version>,
}

#[derive(Debug)]
struct SubmittedItem {
    request: WorkItemRequest,
    outputs_written: bool,
}

#[derive(Debug, Default)]
struct State {
    client_id: String,
    client_secret: String,

    buckets: BTreeSet<String>,
    pending_uploads: HashMap<String, PendingUpload>,
    objects: BTreeMap<String, Bytes>,

    definitions: HashMap<(&'static str, String), Registered>,
    ignore_alias_updates: bool,

    work_items: BTreeMap<String, SubmittedItem>,
    submission_order: Vec<String>,
    script: VecDeque<WorkItemStatus>,
    last_scripted: Option<WorkItemStatus>,
    status_reads: usize,
    omitted_outputs: BTreeSet<String>,
    failure_outputs: BTreeSet<String>,

    failures: HashMap<FakeOp, VecDeque<u16>>,
    tokens_issued: usize,
    sequence: u64,
}

impl State {
    fn next_sequence(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }

    fn injected(&mut self, op: FakeOp, url: &str) -> Result<(), ApiFailure> {
        match self.failures.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(status) => Err(ApiFailure::status(
                op.method(),
                url,
                status,
                Some(format!("injected {op:?} failure")),
            )),
            None => Ok(()),
        }
    }

    fn registered(&self, collection: &'static str, id: &str) -> Option<&Registered> {
        self.definitions
            .get(&(collection, id.to_string()))
            .filter(|r| !r.versions.is_empty())
    }

    /// Simulates the job side writing the outputs it was handed a URL for.
    fn write_outputs(&mut self, id: &str, succeeded: bool) {
        let Some(item) = self.work_items.get_mut(id) else {
            return;
        };
        if item.outputs_written {
            return;
        }
        item.outputs_written = true;

        let mut written = Vec::new();
        for (name, argument) in &item.request.arguments {
            let wanted = if succeeded {
                !self.omitted_outputs.contains(name)
            } else {
                self.failure_outputs.contains(name)
            };
            if !argument.verb.is_output() || !wanted {
                continue;
            }
            if let Some(object_key) = argument.url.strip_prefix(OUTPUT_PREFIX) {
                written.push((object_key.to_string(), format!("{name} written by {id}")));
            }
        }
        for (object_key, content) in written {
            self.objects.insert(object_key, Bytes::from(content));
        }
    }
}

fn not_found(method: &str, url: &str) -> ApiFailure {
    ApiFailure::status(method, url, 404, Some("not found".to_string()))
}

fn conflict(method: &str, url: &str) -> ApiFailure {
    ApiFailure::status(method, url, 409, Some("already exists".to_string()))
}

/// InMemoryService はリモートサービス一式のインメモリ実装
///
/// # 使用例
/// ```ignore
/// let service = InMemoryService::new("owner", "secret", "bucket");
/// service.fail_next(FakeOp::CreateBucket, 403);
/// let storage = StorageClient::new(service.clone());
/// ```
#[derive(Debug, Clone)]
pub struct InMemoryService {
    bucket_key: Arc<str>,
    state: Arc<Mutex<State>>,
}

impl InMemoryService {
    /// `client_id` is both the accepted credential and the owner of every
    /// definition; `bucket_key` is the single bucket the store talks to.
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        bucket_key: impl Into<String>,
    ) -> Self {
        let state = State {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            ..State::default()
        };
        Self {
            bucket_key: Arc::from(bucket_key.into()),
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make the next call of `op` fail with `status`. Calls queue up.
    pub fn fail_next(&self, op: FakeOp, status: u16) {
        self.lock().failures.entry(op).or_default().push_back(status);
    }

    /// Statuses returned by successive status reads (shared by all work items).
    pub fn script_statuses(&self, statuses: impl IntoIterator<Item = WorkItemStatus>) {
        let mut state = self.lock();
        state.script = statuses.into_iter().collect();
        state.last_scripted = None;
    }

    /// Never write the output bound to `parameter`, even on success.
    pub fn omit_output(&self, parameter: impl Into<String>) {
        self.lock().omitted_outputs.insert(parameter.into());
    }

    /// Write the output bound to `parameter` even when the job fails.
    pub fn write_on_failure(&self, parameter: impl Into<String>) {
        self.lock().failure_outputs.insert(parameter.into());
    }

    /// Make alias updates succeed without moving the alias.
    pub fn ignore_alias_updates(&self, ignore: bool) {
        self.lock().ignore_alias_updates = ignore;
    }

    /// Store a finalized object directly.
    pub fn insert_object(&self, object_key: impl Into<String>, data: Bytes) {
        self.lock().objects.insert(object_key.into(), data);
    }

    pub fn object(&self, object_key: &str) -> Option<Bytes> {
        self.lock().objects.get(object_key).cloned()
    }

    /// Resolve a presigned download URL the way an HTTP GET would.
    pub fn fetch(&self, url: &str) -> Option<Bytes> {
        let object_key = url.strip_prefix(DOWNLOAD_PREFIX)?;
        let object_key = object_key.split_once('?').map_or(object_key, |(k, _)| k);
        self.object(object_key)
    }

    pub fn bucket_count(&self) -> usize {
        self.lock().buckets.len()
    }

    pub fn alias_version(&self, collection: &'static str, id: &str, alias: &str) -> Option<Version> {
        self.lock()
            .registered(collection, id)
            .and_then(|r| r.aliases.get(alias).copied())
    }

    pub fn version_count(&self, collection: &'static str, id: &str) -> usize {
        self.lock()
            .registered(collection, id)
            .map_or(0, |r| r.versions.len())
    }

    /// Body of the latest registered version.
    pub fn latest_body(&self, collection: &'static str, id: &str) -> Option<serde_json::Value> {
        self.lock()
            .registered(collection, id)
            .and_then(|r| r.versions.last().cloned())
    }

    /// Every accepted submission, oldest first.
    pub fn submitted(&self) -> Vec<WorkItemRequest> {
        let state = self.lock();
        state
            .submission_order
            .iter()
            .filter_map(|id| state.work_items.get(id))
            .map(|item| item.request.clone())
            .collect()
    }

    pub fn status_reads(&self) -> usize {
        self.lock().status_reads
    }

    pub fn tokens_issued(&self) -> usize {
        self.lock().tokens_issued
    }
}

impl Backend for InMemoryService {
    /// Every handle shares this service's state; the token is not checked again.
    fn connect(&self, _token: Arc<Token>) -> Connection {
        let shared = Arc::new(self.clone());
        Connection {
            objects: shared.clone(),
            bundles: shared.clone(),
            activities: shared.clone(),
            work_items: shared,
        }
    }
}

#[async_trait]
impl TokenProvider for InMemoryService {
    async fn acquire(&self, credentials: &Credentials, scopes: &Scopes) -> FlowResult<Token> {
        const URL: &str = "memory://token";
        let mut state = self.lock();
        state.injected(FakeOp::Token, URL).map_err(FlowError::Auth)?;

        if credentials.client_id != state.client_id
            || credentials.client_secret() != state.client_secret
        {
            return Err(FlowError::Auth(ApiFailure::status(
                "POST",
                URL,
                401,
                Some("invalid_client".to_string()),
            )));
        }
        if scopes.is_empty() {
            return Err(FlowError::Auth(ApiFailure::status(
                "POST",
                URL,
                400,
                Some("invalid_scope".to_string()),
            )));
        }

        state.tokens_issued += 1;
        let n = state.next_sequence();
        Ok(Token::new(
            format!("memory-token-{n}"),
            Some(Duration::from_secs(3600)),
        ))
    }
}

#[async_trait]
impl ObjectStore for InMemoryService {
    fn bucket_key(&self) -> &str {
        &self.bucket_key
    }

    async fn create_bucket(&self, _policy_key: &str) -> Result<(), ApiFailure> {
        const URL: &str = "memory://buckets";
        let mut state = self.lock();
        state.injected(FakeOp::CreateBucket, URL)?;
        if !state.buckets.insert(self.bucket_key.to_string()) {
            return Err(conflict("POST", URL));
        }
        Ok(())
    }

    async fn request_upload(
        &self,
        object_key: &str,
        _content_length: u64,
    ) -> Result<UploadTarget, ApiFailure> {
        let url = format!("memory://objects/{object_key}/signeds3upload");
        let mut state = self.lock();
        state.injected(FakeOp::RequestUpload, &url)?;
        if !state.buckets.contains(&*self.bucket_key) {
            return Err(not_found("GET", &url));
        }

        let upload_key = format!("upload-{}", state.next_sequence());
        state.pending_uploads.insert(
            upload_key.clone(),
            PendingUpload {
                object_key: object_key.to_string(),
                data: None,
            },
        );
        Ok(UploadTarget {
            urls: vec![format!("{UPLOAD_PREFIX}{upload_key}")],
            upload_key: UploadKey::new(upload_key),
        })
    }

    async fn put_bytes(&self, url: &str, body: Bytes) -> Result<(), ApiFailure> {
        let mut state = self.lock();
        state.injected(FakeOp::PutBytes, url)?;

        if let Some(object_key) = url.strip_prefix(OUTPUT_PREFIX) {
            state.objects.insert(object_key.to_string(), body);
            return Ok(());
        }
        let pending = url
            .strip_prefix(UPLOAD_PREFIX)
            .and_then(|key| state.pending_uploads.get_mut(key))
            .ok_or_else(|| ApiFailure::status("PUT", url, 403, Some("signature mismatch".to_string())))?;
        pending.data = Some(body);
        Ok(())
    }

    async fn complete_upload(
        &self,
        object_key: &str,
        upload_key: &UploadKey,
    ) -> Result<(), ApiFailure> {
        let url = format!("memory://objects/{object_key}/signeds3upload");
        let mut state = self.lock();
        state.injected(FakeOp::CompleteUpload, &url)?;

        let matches = state
            .pending_uploads
            .get(upload_key.as_str())
            .is_some_and(|p| p.object_key == object_key && p.data.is_some());
        if !matches {
            return Err(ApiFailure::status(
                "POST",
                &url,
                400,
                Some("upload key does not match a transferred upload".to_string()),
            ));
        }
        if let Some(PendingUpload {
            object_key,
            data: Some(data),
        }) = state.pending_uploads.remove(upload_key.as_str())
        {
            state.objects.insert(object_key, data);
        }
        Ok(())
    }

    async fn signed_download(&self, object_key: &str) -> Result<String, ApiFailure> {
        let url = format!("memory://objects/{object_key}/signeds3download");
        let mut state = self.lock();
        state.injected(FakeOp::SignedDownload, &url)?;
        if !state.objects.contains_key(object_key) {
            return Err(not_found("GET", &url));
        }
        let n = state.next_sequence();
        Ok(format!("{DOWNLOAD_PREFIX}{object_key}?sig={n}"))
    }

    async fn signed_upload(&self, object_key: &str) -> Result<String, ApiFailure> {
        let url = format!("memory://objects/{object_key}/signed");
        let mut state = self.lock();
        state.injected(FakeOp::SignedUpload, &url)?;
        if !state.buckets.contains(&*self.bucket_key) {
            return Err(not_found("POST", &url));
        }
        Ok(format!("{OUTPUT_PREFIX}{object_key}"))
    }
}

#[async_trait]
impl<D: Definition> DefinitionRegistry<D> for InMemoryService {
    async fn create(&self, definition: &D) -> Result<DefinitionVersion, ApiFailure> {
        let url = format!("memory://{}", D::COLLECTION);
        let body = serde_json::to_value(definition)
            .map_err(|e| ApiFailure::transport("POST", &url, e.to_string()))?;
        let mut state = self.lock();
        state.injected(FakeOp::CreateDefinition, &url)?;

        let id = definition.id().to_string();
        if state.registered(D::COLLECTION, &id).is_some() {
            return Err(conflict("POST", &url));
        }
        state.definitions.insert(
            (D::COLLECTION, id.clone()),
            Registered {
                versions: vec![body],
                aliases: HashMap::new(),
            },
        );
        Ok(DefinitionVersion { id, version: 1 })
    }

    async fn create_version(&self, definition: &D) -> Result<DefinitionVersion, ApiFailure> {
        let id = definition.id().to_string();
        let url = format!("memory://{}/{id}/versions", D::COLLECTION);
        let body = definition
            .version_body()
            .map_err(|e| ApiFailure::transport("POST", &url, e.to_string()))?;
        let mut state = self.lock();
        state.injected(FakeOp::CreateVersion, &url)?;

        let registered = state
            .definitions
            .get_mut(&(D::COLLECTION, id.clone()))
            .filter(|r| !r.versions.is_empty())
            .ok_or_else(|| not_found("POST", &url))?;
        registered.versions.push(body);
        let version = registered.versions.len() as Version;
        Ok(DefinitionVersion { id, version })
    }

    async fn create_alias(
        &self,
        id: &str,
        alias: &str,
        version: Version,
    ) -> Result<AliasInfo, ApiFailure> {
        let url = format!("memory://{}/{id}/aliases", D::COLLECTION);
        let mut state = self.lock();
        state.injected(FakeOp::CreateAlias, &url)?;

        let registered = state
            .definitions
            .get_mut(&(D::COLLECTION, id.to_string()))
            .filter(|r| !r.versions.is_empty())
            .ok_or_else(|| not_found("POST", &url))?;
        if version == 0 || version as usize > registered.versions.len() {
            return Err(ApiFailure::status("POST", &url, 400, Some(format!("no version {version}"))));
        }
        if registered.aliases.contains_key(alias) {
            return Err(conflict("POST", &url));
        }
        registered.aliases.insert(alias.to_string(), version);
        Ok(AliasInfo {
            id: alias.to_string(),
            version,
        })
    }

    async fn update_alias(
        &self,
        id: &str,
        alias: &str,
        version: Version,
    ) -> Result<AliasInfo, ApiFailure> {
        let url = format!("memory://{}/{id}/aliases/{alias}", D::COLLECTION);
        let mut state = self.lock();
        state.injected(FakeOp::UpdateAlias, &url)?;
        let ignore = state.ignore_alias_updates;

        let registered = state
            .definitions
            .get_mut(&(D::COLLECTION, id.to_string()))
            .filter(|r| !r.versions.is_empty())
            .ok_or_else(|| not_found("PATCH", &url))?;
        if version == 0 || version as usize > registered.versions.len() {
            return Err(ApiFailure::status("PATCH", &url, 400, Some(format!("no version {version}"))));
        }
        let current = registered
            .aliases
            .get_mut(alias)
            .ok_or_else(|| not_found("PATCH", &url))?;
        if !ignore {
            *current = version;
        }
        Ok(AliasInfo {
            id: alias.to_string(),
            version,
        })
    }

    async fn get_alias(&self, id: &str, alias: &str) -> Result<AliasInfo, ApiFailure> {
        let url = format!("memory://{}/{id}/aliases/{alias}", D::COLLECTION);
        let mut state = self.lock();
        state.injected(FakeOp::GetAlias, &url)?;

        let version = state
            .registered(D::COLLECTION, id)
            .and_then(|r| r.aliases.get(alias).copied())
            .ok_or_else(|| not_found("GET", &url))?;
        Ok(AliasInfo {
            id: alias.to_string(),
            version,
        })
    }

    async fn get(&self, id: &QualifiedId) -> Result<DefinitionVersion, ApiFailure> {
        let url = format!("memory://{}/{id}", D::COLLECTION);
        let mut state = self.lock();
        state.injected(FakeOp::GetDefinition, &url)?;

        if id.owner() != state.client_id {
            return Err(not_found("GET", &url));
        }
        let registered = state
            .registered(D::COLLECTION, id.name())
            .ok_or_else(|| not_found("GET", &url))?;
        Ok(DefinitionVersion {
            id: id.name().to_string(),
            version: registered.versions.len() as Version,
        })
    }

    async fn delete(&self, id: &QualifiedId) -> Result<(), ApiFailure> {
        let url = format!("memory://{}/{id}", D::COLLECTION);
        let mut state = self.lock();
        state.injected(FakeOp::DeleteDefinition, &url)?;

        if id.owner() != state.client_id {
            return Err(not_found("DELETE", &url));
        }
        state
            .definitions
            .remove(&(D::COLLECTION, id.name().to_string()))
            .filter(|r| !r.versions.is_empty())
            .map(|_| ())
            .ok_or_else(|| not_found("DELETE", &url))
    }
}

#[async_trait]
impl WorkItemApi for InMemoryService {
    async fn submit(&self, request: &WorkItemRequest) -> Result<WorkItemInfo, ApiFailure> {
        const URL: &str = "memory://workitems";
        let mut state = self.lock();
        state.injected(FakeOp::SubmitWorkItem, URL)?;

        // activity の存在は確認しない（実サービスも投入後に failed で返す）
        let id = format!("wi-{}", state.next_sequence());
        state.work_items.insert(
            id.clone(),
            SubmittedItem {
                request: request.clone(),
                outputs_written: false,
            },
        );
        state.submission_order.push(id.clone());

        Ok(WorkItemInfo {
            id: WorkItemId::new(id),
            status: WorkItemStatus::Pending,
            report_url: None,
        })
    }

    async fn status(&self, id: &WorkItemId) -> Result<WorkItemInfo, ApiFailure> {
        let url = format!("memory://workitems/{id}");
        let mut state = self.lock();
        state.injected(FakeOp::WorkItemStatus, &url)?;

        if !state.work_items.contains_key(id.as_str()) {
            return Err(not_found("GET", &url));
        }
        state.status_reads += 1;

        let status = match state.script.pop_front() {
            Some(next) => {
                state.last_scripted = Some(next);
                next
            }
            None => state.last_scripted.unwrap_or(WorkItemStatus::Success),
        };
        match status {
            WorkItemStatus::Success => state.write_outputs(id.as_str(), true),
            WorkItemStatus::Failed => state.write_outputs(id.as_str(), false),
            _ => {}
        }

        Ok(WorkItemInfo {
            id: id.clone(),
            status,
            report_url: status
                .is_terminal()
                .then(|| format!("memory://reports/{id}.txt")),
        })
    }
}
