//! Canonical output record: the NVD JSON 1.1 CVE item.
//!
//! Only the subset of the NVD schema that vendor adapters populate is
//! modelled. Field names follow the NVD wire format exactly.

use serde::{Deserialize, Serialize};

pub const CVE_DATA_TYPE: &str = "CVE";
pub const CVE_DATA_FORMAT: &str = "MITRE";
pub const CVE_DATA_VERSION: &str = "4.0";

/// NVD timestamp layout (`2018-08-15T12:00Z`).
pub const NVD_TIME_FORMAT: &str = "%Y-%m-%dT%H:%MZ";

/// One canonical vulnerability record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CveItem {
    pub cve: Cve,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configurations: Option<Configurations>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impact: Option<Impact>,
    #[serde(
        rename = "publishedDate",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub published_date: Option<String>,
    #[serde(
        rename = "lastModifiedDate",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub last_modified_date: Option<String>,
}

impl CveItem {
    /// Empty item carrying only an identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            cve: Cve {
                data_type: CVE_DATA_TYPE.to_string(),
                data_format: CVE_DATA_FORMAT.to_string(),
                data_version: CVE_DATA_VERSION.to_string(),
                meta: CveDataMeta {
                    id: id.into(),
                    assigner: None,
                },
                problemtype: ProblemType::default(),
                references: References::default(),
                description: Description::default(),
            },
            configurations: None,
            impact: None,
            published_date: None,
            last_modified_date: None,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.cve.meta.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cve {
    pub data_type: String,
    pub data_format: String,
    pub data_version: String,
    #[serde(rename = "CVE_data_meta")]
    pub meta: CveDataMeta,
    #[serde(default)]
    pub problemtype: ProblemType,
    #[serde(default)]
    pub references: References,
    #[serde(default)]
    pub description: Description,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CveDataMeta {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "ASSIGNER", default, skip_serializing_if = "Option::is_none")]
    pub assigner: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemType {
    #[serde(default)]
    pub problemtype_data: Vec<ProblemTypeData>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemTypeData {
    #[serde(default)]
    pub description: Vec<LangString>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct References {
    #[serde(default)]
    pub reference_data: Vec<Reference>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refsource: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Description {
    #[serde(default)]
    pub description_data: Vec<LangString>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LangString {
    pub lang: String,
    pub value: String,
}

impl LangString {
    #[must_use]
    pub fn en(value: impl Into<String>) -> Self {
        Self {
            lang: "en".to_string(),
            value: value.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Configurations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configurations {
    #[serde(rename = "CVE_data_version")]
    pub data_version: String,
    #[serde(default)]
    pub nodes: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub operator: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Node>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cpe_match: Vec<CpeMatch>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpeMatch {
    pub vulnerable: bool,
    #[serde(rename = "cpe23Uri")]
    pub cpe23_uri: String,
}

// ---------------------------------------------------------------------------
// Impact
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Impact {
    #[serde(rename = "baseMetricV3", default, skip_serializing_if = "Option::is_none")]
    pub base_metric_v3: Option<BaseMetricV3>,
    #[serde(rename = "baseMetricV2", default, skip_serializing_if = "Option::is_none")]
    pub base_metric_v2: Option<BaseMetricV2>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseMetricV3 {
    #[serde(rename = "cvssV3")]
    pub cvss_v3: CvssV3,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CvssV3 {
    pub version: String,
    #[serde(rename = "vectorString")]
    pub vector_string: String,
    #[serde(rename = "baseScore")]
    pub base_score: f64,
    #[serde(rename = "baseSeverity")]
    pub base_severity: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseMetricV2 {
    #[serde(rename = "cvssV2")]
    pub cvss_v2: CvssV2,
    pub severity: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CvssV2 {
    pub version: String,
    #[serde(rename = "vectorString")]
    pub vector_string: String,
    #[serde(rename = "baseScore")]
    pub base_score: f64,
}

/// Qualitative CVSS v3 severity for a base score.
#[must_use]
pub fn severity_v3(score: f64) -> &'static str {
    if score <= 0.0 {
        "NONE"
    } else if score < 4.0 {
        "LOW"
    } else if score < 7.0 {
        "MEDIUM"
    } else if score < 9.0 {
        "HIGH"
    } else {
        "CRITICAL"
    }
}

/// Qualitative CVSS v2 severity for a base score.
#[must_use]
pub fn severity_v2(score: f64) -> &'static str {
    if score < 4.0 {
        "LOW"
    } else if score < 7.0 {
        "MEDIUM"
    } else {
        "HIGH"
    }
}

// ---------------------------------------------------------------------------
// Feed document
// ---------------------------------------------------------------------------

/// A whole NVD feed document. Writers stream items instead of building
/// this; it exists for readers and tests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feed {
    #[serde(rename = "CVE_data_type")]
    pub data_type: String,
    #[serde(rename = "CVE_data_format")]
    pub data_format: String,
    #[serde(rename = "CVE_data_version")]
    pub data_version: String,
    #[serde(rename = "CVE_data_timestamp", default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(rename = "CVE_Items", default)]
    pub items: Vec<CveItem>,
}
