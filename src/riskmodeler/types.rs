use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Risk Modeler returns identifiers as numbers on most endpoints and as
/// numeric strings on a few. Accept both.
pub(crate) fn de_id<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Number(u64),
        Text(String),
    }

    match RawId::deserialize(deserializer)? {
        RawId::Number(id) => Ok(id),
        RawId::Text(text) => text
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("identifier '{text}' is not numeric"))),
    }
}

/// Exposure data manager (the server calls it an exposure).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edm {
    #[serde(deserialize_with = "de_id")]
    pub exposure_id: u64,
    pub exposure_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Portfolio {
    #[serde(deserialize_with = "de_id")]
    pub portfolio_id: u64,
    pub portfolio_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub portfolio_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<Value>,
    #[serde(default)]
    pub locations_count: u64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Treaty {
    #[serde(deserialize_with = "de_id")]
    pub treaty_id: u64,
    pub treaty_name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    #[serde(deserialize_with = "de_id")]
    pub analysis_id: u64,
    pub analysis_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exposure_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    #[serde(deserialize_with = "de_id")]
    pub tag_id: u64,
    pub tag_name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Result of a fire-and-forget submission: the id taken from the `Location`
/// header and the body that was sent, for audit logging by the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Submission {
    pub id: u64,
    pub request: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ids_accept_numbers_and_numeric_strings() {
        let edm: Edm = serde_json::from_value(json!({
            "exposureId": "12",
            "exposureName": "EDM_A",
            "status": "ACTIVE"
        }))
        .unwrap();
        assert_eq!(edm.exposure_id, 12);
        assert_eq!(edm.extra["status"], "ACTIVE");

        let tag: Tag = serde_json::from_value(json!({"tagId": 7, "tagName": "Q3"})).unwrap();
        assert_eq!(tag.tag_id, 7);
    }

    #[test]
    fn non_numeric_id_is_rejected() {
        let result: Result<Tag, _> = serde_json::from_value(json!({"tagId": "abc", "tagName": "x"}));
        assert!(result.is_err());
    }

    #[test]
    fn unknown_fields_survive_a_round_trip() {
        let raw = json!({
            "portfolioId": 3,
            "portfolioName": "P",
            "uri": "/platform/riskdata/v1/exposures/1/portfolios/3",
            "createdBy": "someone"
        });
        let portfolio: Portfolio = serde_json::from_value(raw).unwrap();
        let back = serde_json::to_value(&portfolio).unwrap();
        assert_eq!(back["createdBy"], "someone");
        assert!(back.get("portfolioNumber").is_none());
    }
}
