//! Configuration - 実行に必要な設定値
//!
//! 設定は一度だけ読み込み、各コンポーネントの構築時に渡します（グローバルに参照しない）。
//!
//! # 読み込み順（後のものが優先）
//! 1. 各フィールドのデフォルト値
//! 2. `flatline.toml`（または `--config` で指定したファイル）
//! 3. `FLATLINE_` で始まる環境変数（`__` でネスト、例: `FLATLINE_CREDENTIALS__CLIENT_SECRET`）

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Toml};
use serde::Deserialize;

use crate::app::PollPolicy;
use crate::domain::{
    ActivitySpec, BundleSpec, Credentials, FlowError, FlowResult, ParameterSpec, Scopes,
    VersionRef,
};

pub const DEFAULT_CONFIG_FILE: &str = "flatline.toml";
const ENV_PREFIX: &str = "FLATLINE_";

const DEFAULT_ENGINE: &str = "Autodesk.Fusion+Latest";
const DEFAULT_ALIAS: &str = "prod";

/// Top-level configuration.
#[derive(Debug, Deserialize)]
pub struct FlowConfig {
    pub credentials: Credentials,

    #[serde(default)]
    pub endpoints: EndpointConfig,

    pub storage: StorageConfig,

    pub bundle: BundleConfig,

    pub activity: ActivityConfig,

    pub inputs: InputConfig,

    #[serde(default)]
    pub polling: PollingConfig,

    /// Requested with every token. Must cover every call of a run.
    #[serde(default)]
    pub scopes: Scopes,
}

impl FlowConfig {
    /// Load from `flatline.toml` in the current directory (if present) and the environment.
    pub fn load() -> FlowResult<Self> {
        Self::from_figment(Figment::new().merge(Toml::file(DEFAULT_CONFIG_FILE)))
    }

    /// Load from a specific file and the environment.
    pub fn from_file(path: impl AsRef<Path>) -> FlowResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(FlowError::Config(format!(
                "config file {} does not exist",
                path.display()
            )));
        }
        Self::from_figment(Figment::new().merge(Toml::file(path)))
    }

    /// Parse TOML text only, without the environment.
    pub fn from_toml_str(toml: &str) -> FlowResult<Self> {
        Figment::new()
            .merge(Toml::string(toml))
            .extract::<Self>()
            .map_err(|e| FlowError::Config(e.to_string()))
            .and_then(Self::validated)
    }

    fn from_figment(figment: Figment) -> FlowResult<Self> {
        figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract::<Self>()
            .map_err(|e| FlowError::Config(e.to_string()))
            .and_then(Self::validated)
    }

    fn validated(self) -> FlowResult<Self> {
        self.validate()?;
        Ok(self)
    }

    /// Reject values that would only fail later, half way through a run.
    pub fn validate(&self) -> FlowResult<()> {
        let required = [
            ("credentials.client_id", self.credentials.client_id.as_str()),
            ("credentials.client_secret", self.credentials.client_secret()),
            ("storage.bucket_key", self.storage.bucket_key.as_str()),
            ("bundle.id", self.bundle.id.as_str()),
            ("activity.id", self.activity.id.as_str()),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(FlowError::Config(format!("{name} must not be empty")));
            }
        }
        if self.polling.max_attempts == 0 {
            return Err(FlowError::Config(
                "polling.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.scopes.is_empty() {
            return Err(FlowError::Config("scopes must not be empty".to_string()));
        }
        if self.bundle.object_key().is_none() {
            return Err(FlowError::Config(format!(
                "bundle.zip_file {} has no file name",
                self.bundle.zip_file.display()
            )));
        }

        let parameters = self.activity_parameters()?;
        let report = &self.activity.report_parameter;
        match parameters.get(report) {
            Some(p) if p.verb.is_output() => {}
            Some(_) => {
                return Err(FlowError::Config(format!(
                    "report parameter {report:?} must be an output (verb = \"put\")"
                )));
            }
            None => {
                return Err(FlowError::Config(format!(
                    "activity does not declare the report parameter {report:?}"
                )));
            }
        }

        // 入力は provision でアップロードしたファイル名でしか参照できない
        let uploaded = [self.inputs.template_key()?, self.inputs.dims_key()?];
        for (name, parameter) in &parameters {
            let local_name = parameter.local_name.as_str();
            if !parameter.verb.is_output() && !uploaded.contains(&local_name) {
                return Err(FlowError::Config(format!(
                    "input parameter {name:?} has localName {:?}, but only {uploaded:?} are uploaded",
                    parameter.local_name
                )));
            }
        }
        Ok(())
    }

    /// Declared parameters, or the template-export defaults when none are configured.
    pub fn activity_parameters(&self) -> FlowResult<BTreeMap<String, ParameterSpec>> {
        if !self.activity.parameters.is_empty() {
            return Ok(self.activity.parameters.clone());
        }

        let mut parameters = BTreeMap::new();
        parameters.insert(
            "templateF3D".to_string(),
            ParameterSpec::input(file_name(&self.inputs.template, "inputs.template")?),
        );
        parameters.insert(
            "dims".to_string(),
            ParameterSpec::input(file_name(&self.inputs.dims, "inputs.dims")?),
        );
        for component in ["Top", "Side1", "Side2"] {
            parameters.insert(
                format!("{component}DXF"),
                ParameterSpec::output(format!("{component}_flat.dxf")),
            );
        }
        parameters.insert(
            self.activity.report_parameter.clone(),
            ParameterSpec::output("report.txt"),
        );
        Ok(parameters)
    }

    /// Bundle definition pointing at the uploaded zip.
    pub fn bundle_spec(&self, zip_file_urn: impl Into<String>) -> BundleSpec {
        BundleSpec {
            id: self.bundle.id.clone(),
            engine: self.bundle.engine.clone(),
            description: self.bundle.description.clone(),
            zip_file_urn: zip_file_urn.into(),
        }
    }

    /// Activity definition referencing `bundle` (normally `<owner>.<bundle>+<alias>`).
    pub fn activity_spec(&self, bundle: &VersionRef) -> FlowResult<ActivitySpec> {
        Ok(ActivitySpec {
            id: self.activity.id.clone(),
            engine: self.activity.engine.clone(),
            description: self.activity.description.clone(),
            command_line: self.activity.command_line.clone(),
            appbundles: vec![bundle.to_string()],
            parameters: self.activity_parameters()?,
        })
    }
}

fn file_name<'a>(path: &'a Path, setting: &str) -> FlowResult<&'a str> {
    path.file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| FlowError::Config(format!("{setting} {} has no file name", path.display())))
}

/// Remote service locations.
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_auth_path")]
    pub auth_path: String,

    #[serde(default = "default_storage_path")]
    pub storage_path: String,

    #[serde(default = "default_automation_path")]
    pub automation_path: String,

    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl EndpointConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            auth_path: default_auth_path(),
            storage_path: default_storage_path(),
            automation_path: default_automation_path(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "https://developer.api.autodesk.com".to_string()
}

fn default_auth_path() -> String {
    "/authentication/v2/token".to_string()
}

fn default_storage_path() -> String {
    "/oss/v2".to_string()
}

fn default_automation_path() -> String {
    "/da/us-east/v3".to_string()
}

const fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub bucket_key: String,

    #[serde(default = "default_policy_key")]
    pub policy_key: String,
}

fn default_policy_key() -> String {
    "persistent".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct BundleConfig {
    pub id: String,

    #[serde(default = "default_engine")]
    pub engine: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Local zip; uploaded under its file name.
    pub zip_file: PathBuf,

    #[serde(default = "default_alias")]
    pub alias: String,
}

impl BundleConfig {
    pub fn object_key(&self) -> Option<&str> {
        self.zip_file.file_name().and_then(|n| n.to_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActivityConfig {
    pub id: String,

    #[serde(default = "default_engine")]
    pub engine: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default = "default_command_line")]
    pub command_line: Vec<String>,

    #[serde(default = "default_alias")]
    pub alias: String,

    /// Empty means: derive from `inputs` plus the three DXF exports and the report.
    #[serde(default)]
    pub parameters: BTreeMap<String, ParameterSpec>,

    /// Output collected even when the job fails.
    #[serde(default = "default_report_parameter")]
    pub report_parameter: String,
}

fn default_engine() -> String {
    DEFAULT_ENGINE.to_string()
}

fn default_alias() -> String {
    DEFAULT_ALIAS.to_string()
}

fn default_command_line() -> Vec<String> {
    vec!["$(engine.path)\\FusionCoreConsole.exe".to_string()]
}

fn default_report_parameter() -> String {
    "report".to_string()
}

/// Local input files. Each is uploaded under its file name, which is also
/// the local name the job sees.
#[derive(Debug, Clone, Deserialize)]
pub struct InputConfig {
    pub template: PathBuf,
    pub dims: PathBuf,
}

impl InputConfig {
    pub fn template_key(&self) -> FlowResult<&str> {
        file_name(&self.template, "inputs.template")
    }

    pub fn dims_key(&self) -> FlowResult<&str> {
        file_name(&self.dims, "inputs.dims")
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl PollingConfig {
    pub fn policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_secs(self.interval_secs),
            max_attempts: self.max_attempts,
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            max_attempts: default_max_attempts(),
        }
    }
}

const fn default_interval_secs() -> u64 {
    5
}

const fn default_max_attempts() -> u32 {
    60
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{QualifiedId, Verb};

    const MINIMAL: &str = r#"
        [credentials]
        client_id = "abc123"
        client_secret = "s3cret"

        [storage]
        bucket_key = "flatline-bucket"

        [bundle]
        id = "DxfBundle"
        zip_file = "dist/DxfBundle.zip"

        [activity]
        id = "ParametricDXF"

        [inputs]
        template = "assets/Box.f3d"
        dims = "assets/dims.json"
    "#;

    #[test]
    fn minimal_config_gets_defaults() {
        let config = FlowConfig::from_toml_str(MINIMAL).unwrap();

        assert_eq!(config.endpoints.base_url, "https://developer.api.autodesk.com");
        assert_eq!(config.endpoints.automation_path, "/da/us-east/v3");
        assert_eq!(config.endpoints.timeout(), Duration::from_secs(30));
        assert_eq!(config.storage.policy_key, "persistent");
        assert_eq!(config.bundle.alias, "prod");
        assert_eq!(config.bundle.engine, "Autodesk.Fusion+Latest");
        assert_eq!(config.bundle.object_key(), Some("DxfBundle.zip"));
        assert_eq!(config.polling.policy(), PollPolicy::default());
        assert_eq!(
            config.scopes.to_string(),
            "data:read data:write bucket:create bucket:read code:all"
        );
        assert_eq!(config.credentials.client_secret(), "s3cret");
    }

    #[test]
    fn secret_is_not_in_debug_output() {
        let config = FlowConfig::from_toml_str(MINIMAL).unwrap();
        assert!(!format!("{config:?}").contains("s3cret"));
    }

    #[test]
    fn default_parameters_follow_inputs() {
        let config = FlowConfig::from_toml_str(MINIMAL).unwrap();
        let parameters = config.activity_parameters().unwrap();

        assert_eq!(parameters["templateF3D"].local_name, "Box.f3d");
        assert_eq!(parameters["templateF3D"].verb, Verb::Get);
        assert_eq!(parameters["dims"].local_name, "dims.json");
        assert_eq!(parameters["Side2DXF"].local_name, "Side2_flat.dxf");
        assert_eq!(parameters["report"].verb, Verb::Put);
        assert_eq!(parameters.len(), 6);
    }

    #[test]
    fn activity_spec_references_bundle_alias() {
        let config = FlowConfig::from_toml_str(MINIMAL).unwrap();
        let bundle = QualifiedId::new("abc123", "DxfBundle").at_alias("prod");

        let spec = config.activity_spec(&bundle).unwrap();
        assert_eq!(spec.appbundles, vec!["abc123.DxfBundle+prod".to_string()]);
        assert_eq!(spec.outputs().count(), 4);
        assert_eq!(spec.inputs().count(), 2);
    }

    #[test]
    fn explicit_parameters_must_declare_report() {
        let toml = format!(
            "{MINIMAL}\n[activity.parameters.TopDXF]\nlocalName = \"Top_flat.dxf\"\nverb = \"put\"\n"
        );
        let err = FlowConfig::from_toml_str(&toml).unwrap_err();
        assert!(err.to_string().contains("report parameter"));
    }

    #[test]
    fn input_local_name_must_match_an_uploaded_file() {
        let toml = format!(
            "{MINIMAL}
[activity.parameters.templateF3D]
localName = \"template.f3d\"
verb = \"get\"

[activity.parameters.report]
localName = \"report.txt\"
verb = \"put\"
"
        );
        let err = FlowConfig::from_toml_str(&toml).unwrap_err();
        assert!(matches!(err, FlowError::Config(ref m) if m.contains("templateF3D")));

        let toml = toml.replace("template.f3d", "Box.f3d");
        let config = FlowConfig::from_toml_str(&toml).unwrap();
        assert_eq!(config.activity_parameters().unwrap().len(), 2);
    }

    #[test]
    fn zero_attempts_is_rejected() {
        let toml = format!("{MINIMAL}\n[polling]\nmax_attempts = 0\n");
        let err = FlowConfig::from_toml_str(&toml).unwrap_err();
        assert!(matches!(err, FlowError::Config(ref m) if m.contains("max_attempts")));
    }

    #[test]
    fn empty_secret_is_rejected() {
        let toml = MINIMAL.replace("\"s3cret\"", "\"\"");
        let err = FlowConfig::from_toml_str(&toml).unwrap_err();
        assert!(err.to_string().contains("client_secret"));
    }

    #[test]
    fn missing_section_is_config_error() {
        let err = FlowConfig::from_toml_str("[credentials]\nclient_id = \"a\"\n").unwrap_err();
        assert!(matches!(err, FlowError::Config(_)));
    }

    #[test]
    fn from_file_reads_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flatline.toml");
        std::fs::write(&path, MINIMAL).unwrap();

        let config = FlowConfig::from_file(&path).unwrap();
        assert_eq!(config.activity.id, "ParametricDXF");

        let err = FlowConfig::from_file(dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, FlowError::Config(_)));
    }
}
