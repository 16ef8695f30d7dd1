//! Workflow - provisioning と実行の手順
//!
//! # 手順
//! - **provision**（デプロイごとに 1 回）: container 作成 → 入力と bundle zip の
//!   アップロード → bundle 登録 + alias → activity 登録 + alias
//! - **execute**（実行ごとに 1 回）: 最新の activity version を解決 → 出力 URL を
//!   presign → work item 投入 → 完了まで polling → 出力を収集
//!
//! どちらも最初に token を取り直します（実行をまたいでキャッシュしない）。
//! リモート呼び出しは常に 1 つずつ順番に行います。

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{info, warn};

use super::executor::Executor;
use super::publisher::{AliasIntent, Deletion, Publication, Publisher};
use super::results::collect_results;
use super::storage::{ContainerOutcome, StorageClient, UploadedObject};
use crate::config::FlowConfig;
use crate::domain::{
    ActivitySpec, Argument, BundleSpec, Dimensions, FlowError, FlowResult, QualifiedId,
    RunReport, Token, WorkItemId, WorkItemRequest,
};
use crate::ports::{
    Backend, Clock, Connection, DefinitionRegistry, ObjectStore, RunIdGenerator,
    UlidRunIdGenerator, WorkItemApi, WorkItemInfo,
};

type Objects = Arc<dyn ObjectStore>;
type Bundles = Publisher<BundleSpec, Arc<dyn DefinitionRegistry<BundleSpec>>>;
type Activities = Publisher<ActivitySpec, Arc<dyn DefinitionRegistry<ActivitySpec>>>;

/// Everything `provision` did.
#[derive(Debug, Clone)]
pub struct Provisioned {
    pub container: ContainerOutcome,
    pub uploads: Vec<UploadedObject>,
    pub bundle: Publication,
    pub activity: Publication,
}

/// Token-bound clients for one run.
struct Session {
    token: Arc<Token>,
    storage: StorageClient<Objects>,
    bundles: Bundles,
    activities: Activities,
    executor: Executor<Arc<dyn WorkItemApi>, Arc<dyn Clock>>,
}

pub struct Workflow<B> {
    config: Arc<FlowConfig>,
    backend: B,
    clock: Arc<dyn Clock>,
    run_ids: Box<dyn RunIdGenerator>,
}

impl<B: Backend> Workflow<B> {
    pub fn new(config: Arc<FlowConfig>, backend: B, clock: Arc<dyn Clock>) -> Self {
        let run_ids = Box::new(UlidRunIdGenerator::new(clock.clone()));
        Self {
            config,
            backend,
            clock,
            run_ids,
        }
    }

    /// Replace the generator behind run ids (and therefore output keys).
    ///
    /// # Example
    /// ```ignore
    /// let workflow = Workflow::new(config, backend, clock).with_run_ids(FixedRunIds(run_id));
    /// ```
    pub fn with_run_ids(mut self, run_ids: impl RunIdGenerator + 'static) -> Self {
        self.run_ids = Box::new(run_ids);
        self
    }

    pub fn config(&self) -> &FlowConfig {
        &self.config
    }

    fn owner(&self) -> &str {
        &self.config.credentials.client_id
    }

    async fn session(&self) -> FlowResult<Session> {
        let token = Arc::new(
            self.backend
                .acquire(&self.config.credentials, &self.config.scopes)
                .await?,
        );
        info!(client_id = %self.owner(), scopes = %self.config.scopes, "token acquired");

        let Connection {
            objects,
            bundles,
            activities,
            work_items,
        } = self.backend.connect(token.clone());

        Ok(Session {
            token,
            storage: StorageClient::new(objects),
            bundles: Publisher::new(bundles, self.owner()),
            activities: Publisher::new(activities, self.owner()),
            executor: Executor::new(work_items, self.clock.clone()),
        })
    }

    /// Register everything a run needs. Safe to re-run: existing container,
    /// ids and aliases are reused, and each definition gets a new version.
    pub async fn provision(&self) -> FlowResult<Provisioned> {
        let config = &self.config;
        let session = self.session().await?;

        let container = session
            .storage
            .ensure_container(&config.storage.policy_key)
            .await?;

        let mut uploads = Vec::new();
        uploads.push(
            session
                .storage
                .upload(&config.inputs.template, config.inputs.template_key()?)
                .await?,
        );

        if !tokio::fs::try_exists(&config.inputs.dims).await? {
            info!(path = %config.inputs.dims.display(), "no dimension file, writing defaults");
            Dimensions::default().write_to(&config.inputs.dims).await?;
        }
        uploads.push(
            session
                .storage
                .upload(&config.inputs.dims, config.inputs.dims_key()?)
                .await?,
        );

        let zip_key = config
            .bundle
            .object_key()
            .ok_or_else(|| FlowError::Config("bundle.zip_file has no file name".to_string()))?;
        let zip = session.storage.upload(&config.bundle.zip_file, zip_key).await?;
        let bundle_spec = config.bundle_spec(zip.urn.clone());
        uploads.push(zip);

        let bundle = session
            .bundles
            .publish(&bundle_spec, &config.bundle.alias, AliasIntent::PointAt)
            .await?;

        let bundle_ref = QualifiedId::new(self.owner(), &config.bundle.id)
            .at_alias(config.bundle.alias.as_str());
        let activity_spec = config.activity_spec(&bundle_ref)?;
        let activity = session
            .activities
            .publish(&activity_spec, &config.activity.alias, AliasIntent::PointAt)
            .await?;

        info!(
            bundle = %bundle.id,
            bundle_version = bundle.version,
            activity = %activity.id,
            activity_version = activity.version,
            "provisioned"
        );
        Ok(Provisioned {
            container,
            uploads,
            bundle,
            activity,
        })
    }

    /// Run the latest activity version once.
    ///
    /// `overrides` are `NAME=VALUE` dimension changes; when given, the
    /// dimension file is rewritten and uploaded again before submitting.
    /// Polling running out of attempts is reported in the result, not as an
    /// error, and outputs are collected in every case.
    pub async fn execute<S: AsRef<str>>(&self, overrides: &[S]) -> FlowResult<RunReport> {
        let config = &self.config;
        let regenerated = if overrides.is_empty() {
            None
        } else {
            Some(self.regenerate_dimensions(overrides).await?)
        };

        let session = self.session().await?;
        if let Some(dims) = regenerated {
            let json = serde_json::to_vec_pretty(&dims)?;
            session
                .storage
                .upload_bytes(Bytes::from(json), config.inputs.dims_key()?)
                .await?;
        }

        let activity = session
            .activities
            .current_version(&config.activity.id)
            .await?;
        let run_id = self.run_ids.next_run_id();
        info!(%run_id, %activity, "starting run");

        let mut request = WorkItemRequest::new(&activity);
        let mut expected = BTreeMap::new();
        for (name, parameter) in config.activity_parameters()? {
            if parameter.verb.is_output() {
                let object_key = run_id.output_key(&parameter.local_name);
                let url = session.storage.presign_put(&object_key).await?;
                request = request.bind(name.clone(), Argument::write(url));
                expected.insert(name, object_key);
            } else {
                let urn = session.storage.object_urn(&parameter.local_name);
                request = request.bind(name, Argument::read(urn, &session.token));
            }
        }

        let record = session
            .executor
            .run(&request, config.polling.policy())
            .await?;
        let exhausted = !record.is_terminal();
        if exhausted {
            warn!(work_item = %record.id, status = %record.status, "gave up waiting; the job keeps running remotely");
        }

        let outputs = collect_results(&session.storage, &record.id, &expected).await;

        Ok(RunReport {
            run_id,
            work_item_id: record.id,
            activity: activity.to_string(),
            status: record.status,
            polls: record.polls,
            exhausted,
            outputs,
        })
    }

    /// Single status read of an existing work item.
    pub async fn status(&self, id: &WorkItemId) -> FlowResult<WorkItemInfo> {
        let session = self.session().await?;
        session.executor.poll(id).await
    }

    /// Delete an activity (the configured one when `short_id` is `None`).
    pub async fn delete_activity(&self, short_id: Option<&str>) -> FlowResult<Deletion> {
        let session = self.session().await?;
        let short_id = short_id.unwrap_or(&self.config.activity.id);
        session.activities.delete(short_id).await
    }

    /// Load the local dimension file (or the defaults), apply `overrides`,
    /// validate and write it back.
    pub async fn regenerate_dimensions<S: AsRef<str>>(
        &self,
        overrides: &[S],
    ) -> FlowResult<Dimensions> {
        let path = &self.config.inputs.dims;
        let mut dims = if tokio::fs::try_exists(path).await? {
            Dimensions::load(path).await?
        } else {
            Dimensions::default()
        };
        dims.apply_overrides(overrides)?;
        dims.validate()?;
        dims.write_to(path).await?;
        info!(path = %path.display(), "dimension file regenerated");
        Ok(dims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Definition, OutputLocation, RunId, WorkItemStatus};
    use crate::impls::memory::{FakeOp, InMemoryService};
    use crate::ports::ManualClock;
    use chrono::{TimeZone, Utc};
    use std::path::Path;
    use ulid::Ulid;

    struct FixedRunIds(RunId);

    impl RunIdGenerator for FixedRunIds {
        fn next_run_id(&self) -> RunId {
            self.0
        }
    }

    fn write_config(dir: &Path) -> FlowConfig {
        std::fs::write(dir.join("Box.f3d"), b"f3d template").unwrap();
        std::fs::write(dir.join("DxfBundle.zip"), b"PK zip").unwrap();
        let toml = format!(
            r#"
            [credentials]
            client_id = "owner"
            client_secret = "secret"

            [storage]
            bucket_key = "flatline-bucket"

            [bundle]
            id = "DxfBundle"
            zip_file = "{dir}/DxfBundle.zip"

            [activity]
            id = "ParametricDXF"

            [inputs]
            template = "{dir}/Box.f3d"
            dims = "{dir}/dims.json"

            [polling]
            interval_secs = 5
            max_attempts = 4
            "#,
            dir = dir.display()
        );
        FlowConfig::from_toml_str(&toml).unwrap()
    }

    fn workflow(dir: &Path) -> (InMemoryService, Arc<ManualClock>, Workflow<InMemoryService>) {
        let service = InMemoryService::new("owner", "secret", "flatline-bucket");
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        ));
        let workflow = Workflow::new(Arc::new(write_config(dir)), service.clone(), clock.clone());
        (service, clock, workflow)
    }

    #[tokio::test]
    async fn provision_registers_everything() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _clock, workflow) = workflow(dir.path());

        let provisioned = workflow.provision().await.unwrap();

        assert_eq!(provisioned.container, ContainerOutcome::Created);
        assert_eq!(provisioned.uploads.len(), 3);
        assert_eq!(provisioned.bundle.version, 1);
        assert_eq!(provisioned.activity.version, 1);
        assert_eq!(
            service.object("DxfBundle.zip").unwrap().as_ref(),
            b"PK zip"
        );
        // dims.json did not exist, so the defaults were written and uploaded
        let dims: Dimensions =
            serde_json::from_slice(&service.object("dims.json").unwrap()).unwrap();
        assert_eq!(dims, Dimensions::default());

        let body = service
            .latest_body(ActivitySpec::COLLECTION, "ParametricDXF")
            .unwrap();
        assert_eq!(body["appbundles"][0], "owner.DxfBundle+prod");
        assert_eq!(body["parameters"]["templateF3D"]["localName"], "Box.f3d");
        let bundle = service
            .latest_body(BundleSpec::COLLECTION, "DxfBundle")
            .unwrap();
        assert_eq!(
            bundle["zipFileUrn"],
            "urn:adsk.objects:os.object:flatline-bucket/DxfBundle.zip"
        );
    }

    #[tokio::test]
    async fn reprovisioning_bumps_versions_and_aliases() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _clock, workflow) = workflow(dir.path());

        workflow.provision().await.unwrap();
        let second = workflow.provision().await.unwrap();

        assert_eq!(second.container, ContainerOutcome::AlreadyExists);
        assert_eq!(second.bundle.version, 2);
        assert_eq!(second.activity.version, 2);
        assert_eq!(
            service.alias_version(ActivitySpec::COLLECTION, "ParametricDXF", "prod"),
            Some(2)
        );
        assert_eq!(
            service.alias_version(BundleSpec::COLLECTION, "DxfBundle", "prod"),
            Some(2)
        );
    }

    #[tokio::test]
    async fn execute_binds_arguments_and_collects_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let (service, clock, workflow) = workflow(dir.path());
        workflow.provision().await.unwrap();
        workflow.provision().await.unwrap();
        service.script_statuses([WorkItemStatus::Inprogress, WorkItemStatus::Success]);

        let report = workflow.execute::<&str>(&[]).await.unwrap();

        assert!(report.succeeded());
        assert!(!report.exhausted);
        assert_eq!(report.polls, 2);
        assert_eq!(report.activity, "owner.ParametricDXF+2");
        assert_eq!(clock.sleeps().len(), 2);

        let submitted = service.submitted();
        assert_eq!(submitted.len(), 1);
        let request = &submitted[0];
        assert_eq!(request.activity_id, "owner.ParametricDXF+2");
        let template = &request.arguments["templateF3D"];
        assert_eq!(
            template.url,
            "urn:adsk.objects:os.object:flatline-bucket/Box.f3d"
        );
        assert!(template.headers["Authorization"].starts_with("Bearer "));
        assert!(request.arguments["TopDXF"].headers.is_empty());

        assert_eq!(report.outputs.len(), 4);
        let prefix = report.run_id.output_key("");
        for location in report.outputs.values() {
            match location {
                OutputLocation::Ready { object_key, url } => {
                    assert!(object_key.starts_with(&prefix));
                    assert!(service.fetch(url).is_some());
                }
                OutputLocation::Missing(m) => panic!("unexpected missing output {m:?}"),
            }
        }
    }

    #[tokio::test]
    async fn failed_job_still_reports_what_exists() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _clock, workflow) = workflow(dir.path());
        workflow.provision().await.unwrap();
        service.write_on_failure("report");
        service.script_statuses([WorkItemStatus::Failed]);

        let report = workflow.execute::<&str>(&[]).await.unwrap();

        assert_eq!(report.status, WorkItemStatus::Failed);
        assert!(!report.succeeded());
        assert_eq!(report.missing_outputs().count(), 3);
        let log = report.outputs["report"].url().unwrap();
        assert!(service.fetch(log).is_some());
        for name in ["TopDXF", "Side1DXF", "Side2DXF"] {
            assert!(report.outputs[name].is_missing(), "{name} should be missing");
        }
    }

    #[tokio::test]
    async fn missing_primary_artifact_does_not_hide_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _clock, workflow) = workflow(dir.path());
        workflow.provision().await.unwrap();
        service.omit_output("TopDXF");
        service.script_statuses([WorkItemStatus::Success]);

        let report = workflow.execute::<&str>(&[]).await.unwrap();

        assert!(report.succeeded());
        assert!(matches!(report.outputs["report"], OutputLocation::Ready { .. }));
        assert!(matches!(report.outputs["Side1DXF"], OutputLocation::Ready { .. }));
        match &report.outputs["TopDXF"] {
            OutputLocation::Missing(missing) => {
                assert_eq!(missing.object_key, report.run_id.output_key("Top_flat.dxf"));
                assert_eq!(missing.reason, "object not found");
            }
            other => panic!("expected TopDXF to be missing, got {other:?}"),
        }
        assert_eq!(report.missing_outputs().count(), 1);
    }

    #[tokio::test]
    async fn every_call_fetches_a_fresh_token() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _clock, workflow) = workflow(dir.path());

        workflow.provision().await.unwrap();
        assert_eq!(service.tokens_issued(), 1);

        workflow.execute::<&str>(&[]).await.unwrap();
        assert_eq!(service.tokens_issued(), 2);

        workflow.execute::<&str>(&[]).await.unwrap();
        assert_eq!(service.tokens_issued(), 3);
    }

    #[tokio::test]
    async fn injected_run_ids_name_the_output_keys() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _clock, workflow) = workflow(dir.path());
        let run_id = RunId::from_ulid(Ulid::from_parts(1_704_067_200_000, 7));
        let workflow = workflow.with_run_ids(FixedRunIds(run_id));
        workflow.provision().await.unwrap();
        service.script_statuses([WorkItemStatus::Success]);

        let report = workflow.execute::<&str>(&[]).await.unwrap();

        assert_eq!(report.run_id, run_id);
        let top = &service.submitted()[0].arguments["TopDXF"];
        assert!(top.url.ends_with(&run_id.output_key("Top_flat.dxf")));
        match &report.outputs["report"] {
            OutputLocation::Ready { object_key, .. } => {
                assert_eq!(*object_key, run_id.output_key("report.txt"));
            }
            other => panic!("expected report to be ready, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn exhausted_polling_is_reported_not_raised() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _clock, workflow) = workflow(dir.path());
        workflow.provision().await.unwrap();
        service.script_statuses([WorkItemStatus::Inprogress]);

        let report = workflow.execute::<&str>(&[]).await.unwrap();

        assert!(report.exhausted);
        assert_eq!(report.status, WorkItemStatus::Inprogress);
        assert_eq!(report.polls, 4);
    }

    #[tokio::test]
    async fn overrides_regenerate_and_reupload_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _clock, workflow) = workflow(dir.path());
        workflow.provision().await.unwrap();

        workflow.execute(&["Length=350", "Width_Screws=6"]).await.unwrap();

        let uploaded: Dimensions =
            serde_json::from_slice(&service.object("dims.json").unwrap()).unwrap();
        assert_eq!(uploaded.get("Length"), Some(350.0));
        assert_eq!(uploaded.get("Width_Screws"), Some(6.0));
        let local = Dimensions::load(dir.path().join("dims.json")).await.unwrap();
        assert_eq!(local, uploaded);
    }

    #[tokio::test]
    async fn invalid_override_stops_before_submitting() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _clock, workflow) = workflow(dir.path());
        workflow.provision().await.unwrap();

        let err = workflow.execute(&["Height=20"]).await.unwrap_err();

        assert!(matches!(err, FlowError::InvalidDimension(_)));
        assert!(service.submitted().is_empty());
    }

    #[tokio::test]
    async fn execute_without_provisioning_fails_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let (_service, _clock, workflow) = workflow(dir.path());

        let err = workflow.execute::<&str>(&[]).await.unwrap_err();
        assert!(matches!(err, FlowError::Lookup { .. }));
    }

    #[tokio::test]
    async fn auth_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _clock, workflow) = workflow(dir.path());
        service.fail_next(FakeOp::Token, 401);

        let err = workflow.provision().await.unwrap_err();
        assert!(matches!(err, FlowError::Auth(_)));
        assert_eq!(service.bucket_count(), 0);
    }

    #[tokio::test]
    async fn delete_defaults_to_configured_activity() {
        let dir = tempfile::tempdir().unwrap();
        let (_service, _clock, workflow) = workflow(dir.path());
        workflow.provision().await.unwrap();

        assert_eq!(workflow.delete_activity(None).await.unwrap(), Deletion::Deleted);
        assert_eq!(
            workflow.delete_activity(Some("ParametricDXF")).await.unwrap(),
            Deletion::AlreadyAbsent
        );
    }

    #[tokio::test]
    async fn status_reads_once() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _clock, workflow) = workflow(dir.path());
        workflow.provision().await.unwrap();
        service.script_statuses([WorkItemStatus::Success]);
        let report = workflow.execute::<&str>(&[]).await.unwrap();

        let info = workflow.status(&report.work_item_id).await.unwrap();
        assert_eq!(info.status, WorkItemStatus::Success);
        assert_eq!(service.status_reads(), 2);
    }
}
