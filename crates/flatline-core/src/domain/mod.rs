//! Domain model (ids, definitions, arguments, status, errors, ...).

pub mod arguments;
pub mod credentials;
pub mod definition;
pub mod dimensions;
pub mod errors;
pub mod ids;
pub mod report;
pub mod status;
pub mod version;

pub use arguments::{Argument, WorkItemRequest};
pub use credentials::{Credentials, Scopes, Token};
pub use definition::{ActivitySpec, BundleSpec, Definition, ParameterSpec, Verb};
pub use dimensions::Dimensions;
pub use errors::{ApiFailure, FlowError, FlowResult, StoragePhase};
pub use ids::{RunId, UploadKey, WorkItemId};
pub use report::{MissingOutput, OutputLocation, RunReport};
pub use status::{WorkItemRecord, WorkItemStatus};
pub use version::{AliasInfo, DefinitionVersion, Label, QualifiedId, Version, VersionRef};
