//! Advisory to NVD CVE item conversion.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use vulnfeed_sdk::prelude::*;
use vulnfeed_types::nvd::{
    severity_v2, severity_v3, BaseMetricV2, BaseMetricV3, Configurations, CpeMatch, CveItem,
    CvssV2, CvssV3, Impact, LangString, Node, Reference, NVD_TIME_FORMAT,
};

use crate::schema::Advisory;

const NVD_DETAIL_URL: &str = "https://nvd.nist.gov/vuln/detail/";
const CONFIGURATIONS_VERSION: &str = "4.0";

/// Naive layouts seen in advisory timestamps, read as UTC.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%MZ",
    "%Y-%m-%dT%H:%M",
];

impl Convertible for Advisory {
    fn convert(&self) -> Result<CveItem, ConvertError> {
        let id = self.advisory_identifier.trim();
        if id.is_empty() {
            return Err(ConvertError::MissingField("advisory_identifier"));
        }

        let mut item = CveItem::new(id);
        item.cve.meta.assigner = Some("flexera".to_string());
        if let Some(text) = description(&self.title, &self.description) {
            item.cve.description.description_data.push(LangString::en(text));
        }
        item.cve.references.reference_data = self.references_data();
        item.configurations = self.configurations();
        item.impact = self.impact()?;
        item.published_date = nvd_time("released", self.released.as_deref())?;
        item.last_modified_date = nvd_time("modified_date", self.modified_date.as_deref())?;
        Ok(item)
    }

    fn record_id(&self) -> Option<String> {
        let id = self.advisory_identifier.trim();
        if id.is_empty() {
            self.id.map(|n| n.to_string())
        } else {
            Some(id.to_string())
        }
    }
}

impl Advisory {
    /// Vendor references first, then one NVD link per CVE alias.
    fn references_data(&self) -> Vec<Reference> {
        let vendor = self
            .references
            .iter()
            .map(|r| r.url.trim())
            .filter(|url| !url.is_empty())
            .map(|url| Reference {
                url: url.to_string(),
                name: None,
                refsource: Some("MISC".to_string()),
                tags: Vec::new(),
            });
        let aliases = self
            .vulnerabilities
            .iter()
            .map(|v| v.cve.trim())
            .filter(|cve| !cve.is_empty())
            .map(|cve| Reference {
                url: format!("{NVD_DETAIL_URL}{cve}"),
                name: Some(cve.to_string()),
                refsource: Some("CVE".to_string()),
                tags: Vec::new(),
            });
        vendor.chain(aliases).collect()
    }

    /// A single OR node over every affected product CPE.
    fn configurations(&self) -> Option<Configurations> {
        let cpe_match: Vec<CpeMatch> = self
            .products
            .iter()
            .flat_map(|p| p.cpes.iter())
            .map(|cpe| cpe.trim())
            .filter(|cpe| !cpe.is_empty())
            .map(|cpe| CpeMatch {
                vulnerable: true,
                cpe23_uri: cpe.to_string(),
            })
            .collect();
        if cpe_match.is_empty() {
            return None;
        }
        Some(Configurations {
            data_version: CONFIGURATIONS_VERSION.to_string(),
            nodes: vec![Node {
                operator: "OR".to_string(),
                children: Vec::new(),
                cpe_match,
            }],
        })
    }

    fn impact(&self) -> Result<Option<Impact>, ConvertError> {
        let v3 = match (self.cvss3_score, vector(self.cvss3_vector.as_deref())) {
            (Some(score), Some(vector)) => {
                let score = checked_score("cvss3_score", score)?;
                Some(BaseMetricV3 {
                    cvss_v3: CvssV3 {
                        version: v3_version(vector).to_string(),
                        vector_string: vector.to_string(),
                        base_score: score,
                        base_severity: severity_v3(score).to_string(),
                    },
                })
            }
            _ => None,
        };
        let v2 = match (self.cvss_score, vector(self.cvss_vector.as_deref())) {
            (Some(score), Some(vector)) => {
                let score = checked_score("cvss_score", score)?;
                Some(BaseMetricV2 {
                    cvss_v2: CvssV2 {
                        version: "2.0".to_string(),
                        vector_string: vector.to_string(),
                        base_score: score,
                    },
                    severity: severity_v2(score).to_string(),
                })
            }
            _ => None,
        };
        if v3.is_none() && v2.is_none() {
            return Ok(None);
        }
        Ok(Some(Impact {
            base_metric_v3: v3,
            base_metric_v2: v2,
        }))
    }
}

fn description(title: &str, body: &str) -> Option<String> {
    match (title.trim(), body.trim()) {
        ("", "") => None,
        (title, "") => Some(title.to_string()),
        ("", body) => Some(body.to_string()),
        (title, body) => Some(format!("{title}\n\n{body}")),
    }
}

fn vector(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|v| !v.is_empty())
}

fn checked_score(field: &'static str, score: f64) -> Result<f64, ConvertError> {
    if (0.0..=10.0).contains(&score) {
        Ok(score)
    } else {
        Err(ConvertError::invalid(field, score.to_string(), "score must be within 0-10"))
    }
}

/// `CVSS:3.1/AV:N/...` carries its own version; bare vectors are 3.0.
fn v3_version(vector: &str) -> &str {
    vector
        .strip_prefix("CVSS:")
        .and_then(|rest| rest.split('/').next())
        .filter(|v| !v.is_empty())
        .unwrap_or("3.0")
}

/// Reformat an advisory timestamp in the NVD layout. Blank means absent.
fn nvd_time(field: &'static str, raw: Option<&str>) -> Result<Option<String>, ConvertError> {
    let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
        return Ok(None);
    };
    parse_time(raw)
        .map(|dt| Some(dt.format(NVD_TIME_FORMAT).to_string()))
        .ok_or_else(|| ConvertError::invalid(field, raw, "unrecognized timestamp"))
}

fn parse_time(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Some(naive) = NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
    {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{AdvisoryReference, Product, Vulnerability};

    fn full() -> Advisory {
        Advisory {
            id: Some(84920),
            advisory_identifier: "SA84920".into(),
            title: "OpenSSL Multiple Vulnerabilities".into(),
            description: "Some vulnerabilities have been reported in OpenSSL.".into(),
            released: Some("2018-08-15T12:00:00Z".into()),
            modified_date: Some("2018-08-16 08:30:15".into()),
            criticality: Some(2),
            cvss_score: Some(5.0),
            cvss_vector: Some("(AV:N/AC:L/Au:N/C:N/I:N/A:P)".into()),
            cvss3_score: Some(7.5),
            cvss3_vector: Some("CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:N/I:N/A:H".into()),
            vulnerabilities: vec![
                Vulnerability {
                    cve: "CVE-2018-0732".into(),
                },
                Vulnerability { cve: " ".into() },
            ],
            products: vec![Product {
                id: Some(1),
                name: "OpenSSL 1.x".into(),
                cpes: vec!["cpe:2.3:a:openssl:openssl:1.1.0:*:*:*:*:*:*:*".into()],
            }],
            references: vec![AdvisoryReference {
                url: "https://www.openssl.org/news/secadv/20180612.txt".into(),
            }],
        }
    }

    #[test]
    fn converts_full_advisory() {
        let item = full().convert().unwrap();
        assert_eq!(item.id(), "SA84920");
        assert_eq!(
            item.cve.description.description_data[0].value,
            "OpenSSL Multiple Vulnerabilities\n\nSome vulnerabilities have been reported in OpenSSL."
        );
        assert_eq!(item.cve.description.description_data[0].lang, "en");

        let refs = &item.cve.references.reference_data;
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].url, "https://www.openssl.org/news/secadv/20180612.txt");
        assert_eq!(refs[1].url, "https://nvd.nist.gov/vuln/detail/CVE-2018-0732");
        assert_eq!(refs[1].name.as_deref(), Some("CVE-2018-0732"));

        let nodes = &item.configurations.as_ref().unwrap().nodes;
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].operator, "OR");
        assert!(nodes[0].cpe_match[0].vulnerable);

        let impact = item.impact.as_ref().unwrap();
        let v3 = &impact.base_metric_v3.as_ref().unwrap().cvss_v3;
        assert_eq!(v3.version, "3.1");
        assert_eq!(v3.base_severity, "HIGH");
        let v2 = impact.base_metric_v2.as_ref().unwrap();
        assert_eq!(v2.severity, "MEDIUM");
        assert_eq!(v2.cvss_v2.base_score, 5.0);

        assert_eq!(item.published_date.as_deref(), Some("2018-08-15T12:00Z"));
        assert_eq!(item.last_modified_date.as_deref(), Some("2018-08-16T08:30Z"));
    }

    #[test]
    fn minimal_advisory_converts() {
        let advisory = Advisory {
            advisory_identifier: "SA1".into(),
            title: "Title only".into(),
            ..Advisory::default()
        };
        let item = advisory.convert().unwrap();
        assert_eq!(item.id(), "SA1");
        assert_eq!(item.cve.description.description_data[0].value, "Title only");
        assert!(item.configurations.is_none());
        assert!(item.impact.is_none());
        assert!(item.published_date.is_none());
    }

    #[test]
    fn missing_identifier_fails() {
        let advisory = Advisory {
            id: Some(7),
            advisory_identifier: "  ".into(),
            ..Advisory::default()
        };
        assert_eq!(
            advisory.convert().unwrap_err(),
            ConvertError::MissingField("advisory_identifier")
        );
        assert_eq!(advisory.record_id().as_deref(), Some("7"));
    }

    #[test]
    fn unparseable_date_fails() {
        let advisory = Advisory {
            released: Some("last tuesday".into()),
            ..full()
        };
        let err = advisory.convert().unwrap_err();
        assert!(matches!(
            err,
            ConvertError::InvalidField {
                field: "released",
                ..
            }
        ));
    }

    #[test]
    fn out_of_range_score_fails() {
        let advisory = Advisory {
            cvss3_score: Some(11.0),
            ..full()
        };
        assert!(advisory.convert().is_err());
    }

    #[test]
    fn score_without_vector_is_omitted() {
        let advisory = Advisory {
            cvss3_vector: None,
            cvss_vector: Some(String::new()),
            ..full()
        };
        assert!(advisory.convert().unwrap().impact.is_none());
    }

    #[test]
    fn accepts_common_timestamp_layouts() {
        for raw in [
            "2018-08-15T12:00:00Z",
            "2018-08-15T14:00:00+02:00",
            "2018-08-15T12:00:00.123456",
            "2018-08-15 12:00:00",
            "2018-08-15T12:00Z",
        ] {
            assert_eq!(
                nvd_time("released", Some(raw)).unwrap().as_deref(),
                Some("2018-08-15T12:00Z"),
                "{raw}"
            );
        }
        assert_eq!(
            nvd_time("released", Some("2018-08-15")).unwrap().as_deref(),
            Some("2018-08-15T00:00Z")
        );
        assert_eq!(nvd_time("released", Some("")).unwrap(), None);
    }

    #[test]
    fn bare_v3_vector_defaults_to_3_0() {
        assert_eq!(v3_version("AV:N/AC:L"), "3.0");
        assert_eq!(v3_version("CVSS:3.0/AV:N"), "3.0");
    }

    #[test]
    fn conversion_is_deterministic() {
        assert_eq!(full().convert().unwrap(), full().convert().unwrap());
    }
}
