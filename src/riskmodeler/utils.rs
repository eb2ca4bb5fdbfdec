use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Serialize;
use serde_json::Value;

use super::errors::IrpError;
use super::workflows::Workflow;
use crate::http::ApiResponse;

/// How many candidate names a failed reference-data lookup lists.
const AVAILABLE_NAMES_SHOWN: usize = 5;

/// `Location` header of a submission response.
pub fn location_header<'a>(response: &'a ApiResponse, context: &str) -> Result<&'a str, IrpError> {
    response
        .location()
        .ok_or_else(|| IrpError::MissingLocation(context.to_string()))
}

/// Trailing path segment of the `Location` header.
pub fn id_from_location(response: &ApiResponse, context: &str) -> Result<String, IrpError> {
    let location = location_header(response, context)?;
    id_from_location_value(location).map(str::to_string)
}

/// Trailing path segment of a location URL. A trailing slash leaves an empty
/// segment, which is an error.
pub fn id_from_location_value(location: &str) -> Result<&str, IrpError> {
    let id = location.rsplit('/').next().unwrap_or_default();
    if id.is_empty() {
        return Err(IrpError::InvalidLocation(location.to_string()));
    }
    Ok(id)
}

/// Numeric id from the `Location` header, as used for workflows and most
/// created resources.
pub fn workflow_id_from_location(response: &ApiResponse, context: &str) -> Result<u64, IrpError> {
    let location = location_header(response, context)?;
    let id = id_from_location_value(location)?;
    id.parse()
        .map_err(|_| IrpError::InvalidLocation(location.to_string()))
}

pub fn decode_base64_field(encoded: &str, field: &str) -> Result<String, IrpError> {
    let bytes = STANDARD.decode(encoded.trim()).map_err(|e| IrpError::Decode {
        field: field.to_string(),
        reason: e.to_string(),
    })?;
    String::from_utf8(bytes).map_err(|e| IrpError::Decode {
        field: field.to_string(),
        reason: e.to_string(),
    })
}

/// Temporary S3 credentials for uploading one import file, decoded from the
/// base64 fields the API returns.
#[derive(Clone, PartialEq, Serialize)]
pub struct UploadCredentials {
    pub file_id: String,
    pub filename: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    pub s3_path: String,
    pub s3_region: String,
}

impl UploadCredentials {
    /// From a storage file-credentials response
    /// (`accessKeyId`, `secretAccessKey`, `sessionToken`, `s3Path`, `s3Region`).
    pub fn from_mri_response(
        file_id: impl Into<String>,
        filename: impl Into<String>,
        body: &Value,
    ) -> Result<Self, IrpError> {
        Self::decode(
            file_id.into(),
            filename.into(),
            body,
            ["accessKeyId", "secretAccessKey", "sessionToken", "s3Path", "s3Region"],
            "MRI credentials response",
        )
    }

    /// From presign parameters (`path` and `region` instead of `s3Path`/`s3Region`).
    pub fn from_presign_params(
        file_id: impl Into<String>,
        filename: impl Into<String>,
        params: &Value,
    ) -> Result<Self, IrpError> {
        Self::decode(
            file_id.into(),
            filename.into(),
            params,
            ["accessKeyId", "secretAccessKey", "sessionToken", "path", "region"],
            "presign params",
        )
    }

    fn decode(
        file_id: String,
        filename: String,
        body: &Value,
        fields: [&str; 5],
        context: &str,
    ) -> Result<Self, IrpError> {
        let missing: Vec<&str> = fields
            .iter()
            .copied()
            .filter(|f| body.get(f).and_then(Value::as_str).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(IrpError::malformed(
                context,
                format!("missing fields: {}", missing.join(", ")),
            ));
        }

        let field = |name: &str| decode_base64_field(body[name].as_str().unwrap_or_default(), name);
        Ok(Self {
            file_id,
            filename,
            access_key_id: field(fields[0])?,
            secret_access_key: field(fields[1])?,
            session_token: field(fields[2])?,
            s3_path: field(fields[3])?,
            s3_region: field(fields[4])?,
        })
    }

    /// Bucket and object key the file must be uploaded to:
    /// `<bucket>/<prefix>` from `s3_path`, key `<prefix>/<file_id>-<filename>`.
    pub fn object_location(&self) -> (String, String) {
        let (bucket, prefix) = match self.s3_path.split_once('/') {
            Some((bucket, prefix)) => (bucket, prefix),
            None => (self.s3_path.as_str(), ""),
        };
        (
            bucket.to_string(),
            format!("{prefix}/{}-{}", self.file_id, self.filename),
        )
    }
}

impl fmt::Debug for UploadCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadCredentials")
            .field("file_id", &self.file_id)
            .field("filename", &self.filename)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &"<redacted>")
            .field("s3_path", &self.s3_path)
            .field("s3_region", &self.s3_region)
            .finish()
    }
}

/// Find the item whose `name_field` equals `target`. The error lists the
/// first few names that are available.
pub fn find_reference_data_by_name<'a>(
    items: &'a [Value],
    target: &str,
    name_field: &str,
    data_type: &str,
) -> Result<&'a Value, IrpError> {
    if items.is_empty() {
        return Err(IrpError::ReferenceData(format!(
            "No {data_type} available to search"
        )));
    }

    if let Some(found) = items
        .iter()
        .find(|item| item.get(name_field).and_then(Value::as_str) == Some(target))
    {
        return Ok(found);
    }

    let mut names = items
        .iter()
        .take(AVAILABLE_NAMES_SHOWN)
        .map(|item| {
            item.get(name_field)
                .and_then(Value::as_str)
                .unwrap_or("<unnamed>")
                .to_string()
        })
        .collect::<Vec<_>>()
        .join(", ");
    if items.len() > AVAILABLE_NAMES_SHOWN {
        names.push_str(&format!(", ... ({} more)", items.len() - AVAILABLE_NAMES_SHOWN));
    }

    Err(IrpError::ReferenceData(format!(
        "{data_type} '{target}' not found. Available: {names}"
    )))
}

/// Numeric `field` of a reference-data item (ids may arrive as strings).
pub fn reference_id(item: &Value, field: &str, data_type: &str) -> Result<u64, IrpError> {
    let id = match item.get(field) {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.parse().ok(),
        _ => None,
    };
    id.ok_or_else(|| IrpError::malformed(data_type, format!("missing numeric '{field}'")))
}

/// List responses come back either as a bare array or wrapped in an object
/// under `items` / `searchItems`.
pub fn list_items(body: Value) -> Vec<Value> {
    match body {
        Value::Array(items) => items,
        Value::Object(mut map) => ["items", "searchItems"]
            .iter()
            .find_map(|key| match map.remove(*key) {
                Some(Value::Array(items)) => Some(items),
                _ => None,
            })
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

/// `output.analysisId` of a finished model workflow.
pub fn analysis_id_from_workflow(workflow: &Workflow) -> Result<u64, IrpError> {
    let raw = workflow
        .output
        .as_ref()
        .and_then(|output| output.get("analysisId"))
        .ok_or_else(|| {
            IrpError::malformed(
                format!("workflow {}", workflow.id),
                "missing 'output.analysisId'",
            )
        })?;
    let id = match raw {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    };
    id.ok_or_else(|| {
        IrpError::malformed(
            format!("workflow {}", workflow.id),
            format!("'output.analysisId' is not numeric: {raw}"),
        )
    })
}
