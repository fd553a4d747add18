//! Flexera advisory API wire types.
//!
//! Fields the API may omit or send as `null` are optional so a sparse
//! advisory still decodes; conversion decides what is required.

use serde::{Deserialize, Serialize};

/// One Flexera (Secunia) advisory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Advisory {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Public identifier, e.g. `SA84920`.
    #[serde(default)]
    pub advisory_identifier: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub released: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_date: Option<String>,
    /// 1 (extremely critical) to 5 (not critical).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub criticality: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cvss_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cvss_vector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cvss3_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cvss3_vector: Option<String>,
    #[serde(default)]
    pub vulnerabilities: Vec<Vulnerability>,
    #[serde(default)]
    pub products: Vec<Product>,
    #[serde(default)]
    pub references: Vec<AdvisoryReference>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vulnerability {
    #[serde(default)]
    pub cve: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub cpes: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvisoryReference {
    pub url: String,
}

/// One page of `GET /api/advisories/`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdvisoryPage {
    #[serde(default)]
    pub count: u64,
    /// Absolute or base-relative link to the next page; `null` on the last.
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub results: Vec<Advisory>,
}
