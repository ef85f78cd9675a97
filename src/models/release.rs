use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// One entry of the weekly feed, as sent by the remote service.
///
/// The feed is loose about types: ids and years show up as strings or numbers
/// and most fields may be null, so everything is kept as text.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ReleaseRecord {
    #[serde(deserialize_with = "text")]
    pub series: String,
    #[serde(default, deserialize_with = "opt_text")]
    pub alias: Option<String>,
    #[serde(deserialize_with = "text")]
    pub issue: String,
    #[serde(default, deserialize_with = "opt_text")]
    pub publisher: Option<String>,
    #[serde(default, deserialize_with = "opt_text")]
    pub shipdate: Option<String>,
    #[serde(default, deserialize_with = "opt_text")]
    pub coverdate: Option<String>,
    #[serde(default, deserialize_with = "opt_text")]
    pub comicid: Option<String>,
    #[serde(default, deserialize_with = "opt_text")]
    pub issueid: Option<String>,
    #[serde(default, deserialize_with = "opt_text")]
    pub weeknumber: Option<String>,
    #[serde(default, deserialize_with = "opt_text")]
    pub link: Option<String>,
    #[serde(default, deserialize_with = "opt_text")]
    pub year: Option<String>,
    #[serde(default, deserialize_with = "opt_text")]
    pub volume: Option<String>,
    #[serde(default, deserialize_with = "opt_text")]
    pub seriesyear: Option<String>,
    #[serde(rename = "type", default, deserialize_with = "opt_text")]
    pub format: Option<String>,
}

/// A feed entry ready to be written to the schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecord {
    pub comic: String,
    pub dynamic_name: String,
    pub issue: String,
    pub publisher: Option<String>,
    pub shipdate: Option<String>,
    pub comicid: Option<String>,
    pub issueid: Option<String>,
    pub volume: Option<String>,
    pub seriesyear: Option<String>,
    pub annuallink: Option<String>,
    pub format: Option<String>,
}

fn value_to_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

fn opt_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(value_to_text))
}

fn text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(opt_text(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decodes_mixed_types() {
        let body = r##"[{
            "series": "Saga", "alias": null, "issue": "#66", "publisher": "Image",
            "shipdate": "2024-01-10", "coverdate": null, "comicid": 72645,
            "issueid": "1000123", "weeknumber": "02", "link": null, "year": 2024,
            "volume": null, "seriesyear": "2012", "type": "Print"
        }]"##;

        let records: Vec<ReleaseRecord> = serde_json::from_str(body).unwrap();
        let saga = &records[0];

        assert_eq!(saga.series, "Saga");
        assert_eq!(saga.issue, "#66");
        assert_eq!(saga.comicid.as_deref(), Some("72645"));
        assert_eq!(saga.issueid.as_deref(), Some("1000123"));
        assert_eq!(saga.year.as_deref(), Some("2024"));
        assert_eq!(saga.format.as_deref(), Some("Print"));
        assert!(saga.alias.is_none());
        assert!(saga.link.is_none());
    }

    #[test]
    fn test_missing_optional_fields() {
        let records: Vec<ReleaseRecord> =
            serde_json::from_str(r#"[{"series": "Monstress", "issue": 50}]"#).unwrap();
        assert_eq!(records[0].issue, "50");
        assert!(records[0].publisher.is_none());
        assert!(records[0].weeknumber.is_none());
    }
}
