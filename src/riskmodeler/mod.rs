pub mod analysis;
pub mod client;
pub mod edm;
pub mod endpoints;
pub mod errors;
pub mod jobs;
pub mod mri_import;
pub mod portfolio;
pub mod rdm;
pub mod reference_data;
pub mod tags;
pub mod treaty;
pub mod types;
pub mod utils;
pub mod validators;
pub mod workflows;

pub use analysis::{AnalysisManager, ModelJobRequest};
pub use client::{Client, WorkflowExecution};
pub use edm::EdmManager;
pub use errors::{IrpError, PollKind};
pub use jobs::JobKind;
pub use mri_import::{Bucket, FileType, ImportRequest, MriImportManager, StageRequest, StagedImport};
pub use portfolio::{GeohazRequest, NewPortfolio, PortfolioManager};
pub use rdm::RdmManager;
pub use reference_data::ReferenceDataManager;
pub use tags::TagManager;
pub use treaty::TreatyManager;
pub use types::{Account, Analysis, Edm, Portfolio, Submission, Tag, Treaty};
pub use utils::UploadCredentials;
pub use workflows::{FailedWorkflow, PollOptions, Workflow, WorkflowBatch, WorkflowStatus};
