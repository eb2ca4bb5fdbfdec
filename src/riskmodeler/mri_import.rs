// Multi-Risk Import: storage bucket, upload credentials, mapping file and
// import submission. Uploading the CSVs to S3 with the returned credentials
// is left to the caller.

use std::fmt;
use std::path::{Path, PathBuf};

use reqwest::Method;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use super::client::Client;
use super::endpoints;
use super::errors::IrpError;
use super::types::Submission;
use super::utils::{self, UploadCredentials};
use super::validators;
use super::workflows::{PollOptions, Workflow, WorkflowBatch};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Account,
    Location,
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FileType::Account => "account",
            FileType::Location => "location",
        })
    }
}

/// Upload bucket created for one import.
#[derive(Debug, Clone, PartialEq)]
pub struct Bucket {
    pub url: String,
    pub id: u64,
}

/// Body of an MRI import submission.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportRequest {
    pub edm_name: String,
    pub portfolio_id: u64,
    pub bucket_id: u64,
    pub accounts_file_id: u64,
    pub locations_file_id: u64,
    pub mapping_file_id: u64,
    pub delimiter: String,
    pub skip_lines: u32,
    pub currency: String,
    pub append_locations: bool,
}

impl ImportRequest {
    pub fn new(
        edm_name: impl Into<String>,
        portfolio_id: u64,
        bucket_id: u64,
        accounts_file_id: u64,
        locations_file_id: u64,
        mapping_file_id: u64,
    ) -> Self {
        Self {
            edm_name: edm_name.into(),
            portfolio_id,
            bucket_id,
            accounts_file_id,
            locations_file_id,
            mapping_file_id,
            delimiter: "COMMA".to_string(),
            skip_lines: 1,
            currency: "USD".to_string(),
            append_locations: false,
        }
    }

    fn validate(&self) -> Result<(), IrpError> {
        validators::non_empty(&self.edm_name, "edm_name")?;
        validators::positive(self.portfolio_id, "portfolio_id")?;
        validators::positive(self.bucket_id, "bucket_id")?;
        validators::positive(self.accounts_file_id, "accounts_file_id")?;
        validators::positive(self.locations_file_id, "locations_file_id")?;
        validators::positive(self.mapping_file_id, "mapping_file_id")
    }

    pub fn body(&self) -> Value {
        json!({
            "importType": "MRI",
            "bucketId": self.bucket_id,
            "dataSourceName": self.edm_name,
            "accountsFileId": self.accounts_file_id,
            "locationsFileId": self.locations_file_id,
            "mappingFileId": self.mapping_file_id,
            "delimiter": self.delimiter,
            "skipLines": self.skip_lines,
            "currency": self.currency,
            "portfolioId": self.portfolio_id,
            "appendLocations": self.append_locations,
        })
    }
}

/// Local files and targets for [`MriImportManager::stage_files`].
#[derive(Debug, Clone)]
pub struct StageRequest {
    pub edm_name: String,
    pub portfolio_name: String,
    pub accounts_file: PathBuf,
    pub locations_file: PathBuf,
    pub mapping_file: PathBuf,
}

/// Everything prepared server-side for one import. Upload both CSVs with
/// their credentials, then submit [`StagedImport::import_request`].
#[derive(Debug, Clone)]
pub struct StagedImport {
    pub edm_name: String,
    pub portfolio_id: u64,
    pub bucket: Bucket,
    pub accounts: UploadCredentials,
    pub locations: UploadCredentials,
    pub mapping_file_id: u64,
}

impl StagedImport {
    pub fn import_request(&self) -> Result<ImportRequest, IrpError> {
        let file_id = |creds: &UploadCredentials| -> Result<u64, IrpError> {
            creds.file_id.parse().map_err(|_| {
                IrpError::malformed(
                    format!("credentials for {}", creds.filename),
                    format!("file id '{}' is not numeric", creds.file_id),
                )
            })
        };
        Ok(ImportRequest::new(
            self.edm_name.clone(),
            self.portfolio_id,
            self.bucket.id,
            file_id(&self.accounts)?,
            file_id(&self.locations)?,
            self.mapping_file_id,
        ))
    }
}

pub struct MriImportManager<'a> {
    client: &'a Client,
}

impl<'a> MriImportManager<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    pub async fn create_bucket(&self) -> Result<Bucket, IrpError> {
        let response = self
            .client
            .send(&self.client.request(Method::POST, endpoints::STORAGE))
            .await
            .map_err(|e| e.context("Failed to create storage bucket"))?;
        let url = utils::location_header(&response, "storage bucket creation")?.to_string();
        let id = utils::workflow_id_from_location(&response, "storage bucket creation")?;
        info!(bucket_id = id, "Storage bucket created");
        Ok(Bucket { url, id })
    }

    /// Temporary upload credentials for one file. `size_kb` is the file size
    /// in KiB.
    pub async fn file_credentials(
        &self,
        bucket_url: &str,
        filename: &str,
        size_kb: u64,
        file_type: FileType,
    ) -> Result<UploadCredentials, IrpError> {
        validators::non_empty(bucket_url, "bucket_url")?;
        validators::non_empty(filename, "filename")?;
        validators::positive(size_kb, "file_size_kb")?;

        let spec = self
            .client
            .request_at(Method::POST, bucket_url, endpoints::STORAGE_FILE_PATH)
            .json(json!({
                "fileName": filename,
                "fileSize": size_kb,
                "fileType": file_type.to_string(),
            }));
        let response = self
            .client
            .send(&spec)
            .await
            .map_err(|e| e.context(format!("Failed to get upload credentials for '{filename}'")))?;
        let file_id = utils::id_from_location(&response, "file credentials response")?;
        let body: Value = response.json()?;
        UploadCredentials::from_mri_response(file_id, filename, &body)
    }

    /// POST the mapping JSON to the bucket and return the mapping file id.
    pub async fn upload_mapping_file(&self, mapping_file: &Path, bucket_id: u64) -> Result<u64, IrpError> {
        validators::file_exists(mapping_file, "mapping_file")?;
        validators::positive(bucket_id, "bucket_id")?;

        let mapping = read_json(mapping_file).await?;
        let response = self
            .client
            .post_json(&endpoints::storage_mapping(bucket_id), mapping)
            .await
            .map_err(|e| e.context("Failed to upload mapping file"))?;

        let id = match response.json::<Value>()? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        };
        id.ok_or_else(|| IrpError::malformed("mapping upload response", "expected a numeric file id"))
    }

    pub async fn get_import_job(&self, workflow_id: u64) -> Result<Workflow, IrpError> {
        self.client.get_workflow(workflow_id).await
    }

    pub async fn submit_import(&self, request: &ImportRequest) -> Result<Submission, IrpError> {
        request.validate()?;
        let spec = self
            .client
            .request(Method::POST, endpoints::IMPORTS)
            .json(request.body());
        self.client
            .submit(spec, "MRI import submission")
            .await
            .map_err(|e| e.context("Failed to submit MRI import"))
    }

    pub async fn poll_import_job_batch_to_completion(
        &self,
        workflow_ids: &[u64],
        options: &PollOptions,
    ) -> Result<WorkflowBatch, IrpError> {
        self.client
            .poll_workflow_batch_to_completion(workflow_ids, options)
            .await
    }

    /// Resolve the EDM and portfolio, sync the mapping with the CSV headers,
    /// create a bucket, fetch credentials for both CSVs and upload the mapping.
    pub async fn stage_files(&self, request: &StageRequest) -> Result<StagedImport, IrpError> {
        validators::file_exists(&request.accounts_file, "accounts_file")?;
        validators::file_exists(&request.locations_file, "locations_file")?;
        validators::file_exists(&request.mapping_file, "mapping_file")?;

        let edm = self.client.edms().find_by_name(&request.edm_name).await?;
        let portfolio = self
            .client
            .portfolios()
            .find_by_name(edm.exposure_id, &request.portfolio_name)
            .await?;

        sync_mapping_with_csv_headers(
            &request.mapping_file,
            &request.accounts_file,
            &request.locations_file,
        )
        .await?;

        let accounts_kb = file_size_kb(&request.accounts_file).await?;
        let locations_kb = file_size_kb(&request.locations_file).await?;

        let bucket = self.create_bucket().await?;
        let accounts = self
            .file_credentials(&bucket.url, &file_name(&request.accounts_file)?, accounts_kb, FileType::Account)
            .await?;
        let locations = self
            .file_credentials(&bucket.url, &file_name(&request.locations_file)?, locations_kb, FileType::Location)
            .await?;
        let mapping_file_id = self.upload_mapping_file(&request.mapping_file, bucket.id).await?;

        Ok(StagedImport {
            edm_name: request.edm_name.clone(),
            portfolio_id: portfolio.portfolio_id,
            bucket,
            accounts,
            locations,
            mapping_file_id,
        })
    }
}

/// File size in KiB, rounded up so any non-empty file reports at least 1.
pub async fn file_size_kb(path: &Path) -> Result<u64, IrpError> {
    let metadata = tokio::fs::metadata(path).await.map_err(|source| IrpError::File {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(metadata.len().div_ceil(1024))
}

fn file_name(path: &Path) -> Result<String, IrpError> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| IrpError::validation("file", format!("no file name in {}", path.display())))
}

async fn read_json(path: &Path) -> Result<Value, IrpError> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| IrpError::File {
            path: path.to_path_buf(),
            source,
        })?;
    serde_json::from_str(&raw).map_err(|source| IrpError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Column names from the first line of a tab-delimited file.
pub async fn read_tab_headers(path: &Path) -> Result<Vec<String>, IrpError> {
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|source| IrpError::File {
            path: path.to_path_buf(),
            source,
        })?;
    let mut line = String::new();
    BufReader::new(file)
        .read_line(&mut line)
        .await
        .map_err(|source| IrpError::File {
            path: path.to_path_buf(),
            source,
        })?;

    Ok(line
        .trim_start_matches('\u{feff}')
        .trim_end_matches(['\r', '\n'])
        .split('\t')
        .map(|h| h.trim().trim_matches('"').to_string())
        .filter(|h| !h.is_empty())
        .collect())
}

/// Append `HEADER -> HEADER` entries for headers that no item names as its
/// source (case-insensitive). Returns whether anything was added.
pub fn add_missing_sources(headers: &[String], items: &mut Vec<Value>) -> bool {
    let mut known: Vec<String> = items
        .iter()
        .filter_map(|item| item.get("source").and_then(Value::as_str))
        .map(str::to_uppercase)
        .collect();

    let mut modified = false;
    for header in headers {
        let upper = header.to_uppercase();
        if known.contains(&upper) {
            continue;
        }
        info!("Added mapping: {upper} -> {upper}");
        items.push(json!({ "source": upper, "destination": upper }));
        known.push(upper);
        modified = true;
    }
    modified
}

/// Make sure every account and location CSV header appears as a source in
/// the mapping file, rewriting the file only when something was added.
pub async fn sync_mapping_with_csv_headers(
    mapping_file: &Path,
    accounts_file: &Path,
    locations_file: &Path,
) -> Result<bool, IrpError> {
    let mut mapping = read_json(mapping_file).await?;
    let Some(sections) = mapping.as_object_mut() else {
        return Err(IrpError::validation(
            "mapping_file",
            format!("{} is not a JSON object", mapping_file.display()),
        ));
    };

    let mut modified = false;
    for (key, csv) in [("accountItems", accounts_file), ("locationItems", locations_file)] {
        let headers = read_tab_headers(csv).await?;
        let section = sections
            .entry(key)
            .or_insert_with(|| Value::Array(Vec::new()));
        let Some(items) = section.as_array_mut() else {
            return Err(IrpError::validation(
                "mapping_file",
                format!("'{key}' in {} is not an array", mapping_file.display()),
            ));
        };
        modified |= add_missing_sources(&headers, items);
    }

    if modified {
        let rendered = serde_json::to_string_pretty(&mapping).map_err(|source| IrpError::Json {
            path: mapping_file.to_path_buf(),
            source,
        })?;
        tokio::fs::write(mapping_file, rendered)
            .await
            .map_err(|source| IrpError::File {
                path: mapping_file.to_path_buf(),
                source,
            })?;
        info!(path = %mapping_file.display(), "Updated mapping file with new source entries");
    }
    Ok(modified)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn import_body_uses_api_defaults() {
        let body = ImportRequest::new("EDM_A", 4, 10, 11, 12, 13).body();
        assert_eq!(body["importType"], "MRI");
        assert_eq!(body["dataSourceName"], "EDM_A");
        assert_eq!(body["delimiter"], "COMMA");
        assert_eq!(body["skipLines"], 1);
        assert_eq!(body["currency"], "USD");
        assert_eq!(body["appendLocations"], false);
        assert_eq!(body["mappingFileId"], 13);
    }

    #[test]
    fn zero_ids_fail_validation() {
        let request = ImportRequest::new("EDM_A", 4, 0, 11, 12, 13);
        assert!(request.validate().unwrap_err().to_string().contains("bucket_id"));
    }

    #[test]
    fn missing_sources_are_added_once_in_upper_case() {
        let mut items = vec![json!({"source": "accntnum", "destination": "ACCNTNUM"})];
        let headers = vec!["ACCNTNUM".to_string(), "PolicyNum".to_string(), "policynum".to_string()];

        assert!(add_missing_sources(&headers, &mut items));
        assert_eq!(items.len(), 2);
        assert_eq!(items[1], json!({"source": "POLICYNUM", "destination": "POLICYNUM"}));
        assert!(!add_missing_sources(&headers, &mut items));
    }

    #[tokio::test]
    async fn mapping_file_is_synced_with_csv_headers() {
        let dir = tempfile::tempdir().unwrap();
        let mapping = dir.path().join("mapping.json");
        let accounts = dir.path().join("accounts.txt");
        let locations = dir.path().join("locations.txt");
        std::fs::write(
            &mapping,
            r#"{"accountItems": [{"source": "ACCNTNUM", "destination": "ACCNTNUM"}], "other": 1}"#,
        )
        .unwrap();
        std::fs::write(&accounts, "\u{feff}ACCNTNUM\tAcctName\r\nA1\tX\r\n").unwrap();
        std::fs::write(&locations, "\"LOCNUM\"\tCity\n").unwrap();

        assert!(sync_mapping_with_csv_headers(&mapping, &accounts, &locations).await.unwrap());

        let updated: Value = serde_json::from_str(&std::fs::read_to_string(&mapping).unwrap()).unwrap();
        assert_eq!(updated["accountItems"].as_array().unwrap().len(), 2);
        assert_eq!(updated["accountItems"][1]["source"], "ACCTNAME");
        let location_sources: Vec<&str> = updated["locationItems"]
            .as_array()
            .unwrap()
            .iter()
            .map(|i| i["source"].as_str().unwrap())
            .collect();
        assert_eq!(location_sources, ["LOCNUM", "CITY"]);
        assert_eq!(updated["other"], 1);

        assert!(!sync_mapping_with_csv_headers(&mapping, &accounts, &locations).await.unwrap());
    }

    #[tokio::test]
    async fn file_size_rounds_up_to_whole_kib() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.csv");
        std::fs::write(&path, vec![b'x'; 3 * 1024 + 1000]).unwrap();
        assert_eq!(file_size_kb(&path).await.unwrap(), 4);

        let small = dir.path().join("small.csv");
        std::fs::write(&small, "ACCNTNUM\tACCTNAME\n1\tA\n").unwrap();
        assert_eq!(file_size_kb(&small).await.unwrap(), 1);
        assert!(matches!(
            file_size_kb(&dir.path().join("missing.csv")).await,
            Err(IrpError::File { .. })
        ));
    }

    #[test]
    fn staged_import_requires_numeric_file_ids() {
        let creds = |id: &str| UploadCredentials {
            file_id: id.to_string(),
            filename: "f.csv".to_string(),
            access_key_id: String::new(),
            secret_access_key: String::new(),
            session_token: String::new(),
            s3_path: String::new(),
            s3_region: String::new(),
        };
        let mut staged = StagedImport {
            edm_name: "EDM_A".to_string(),
            portfolio_id: 2,
            bucket: Bucket { url: "u".to_string(), id: 3 },
            accounts: creds("21"),
            locations: creds("22"),
            mapping_file_id: 23,
        };
        let request = staged.import_request().unwrap();
        assert_eq!((request.accounts_file_id, request.locations_file_id), (21, 22));

        staged.locations = creds("abc");
        assert!(staged.import_request().is_err());
    }
}
