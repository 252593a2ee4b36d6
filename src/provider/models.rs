// ABOUTME: Response envelope of the real-time air quality API
// ABOUTME: Deserialized from JSON, unwrapped into provider rows

use serde::Deserialize;
use serde_json::{Map, Value};

/// Result code of a successful call
pub const RESULT_CODE_OK: &str = "00";

#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    pub response: ResponseBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponseBody {
    #[serde(default)]
    pub header: Option<Header>,
    pub body: Body,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Header {
    pub result_code: String,
    #[serde(default)]
    pub result_msg: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Body {
    pub items: Vec<Map<String, Value>>,
    #[serde(default)]
    pub total_count: Option<u64>,
    #[serde(default)]
    pub page_no: Option<u32>,
    #[serde(default)]
    pub num_of_rows: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_deserialization() {
        let json = r#"{
            "response": {
                "body": {
                    "totalCount": 2,
                    "items": [
                        {"stationName": "중구", "pm10Value": "45", "pm10Grade": "2", "dataTime": "2024-03-01 14:00"},
                        {"stationName": "종로구", "pm10Value": null}
                    ],
                    "pageNo": 1,
                    "numOfRows": 1000
                },
                "header": {"resultMsg": "NORMAL_CODE", "resultCode": "00"}
            }
        }"#;

        let envelope: Envelope = serde_json::from_str(json).unwrap();
        let header = envelope.response.header.unwrap();
        assert_eq!(header.result_code, RESULT_CODE_OK);
        assert_eq!(envelope.response.body.items.len(), 2);
        assert_eq!(envelope.response.body.total_count, Some(2));
        assert_eq!(envelope.response.body.items[0]["pm10Value"], "45");
    }

    #[test]
    fn test_envelope_without_items_is_rejected() {
        let json = r#"{"response": {"body": {"totalCount": 0}}}"#;
        assert!(serde_json::from_str::<Envelope>(json).is_err());
    }
}
