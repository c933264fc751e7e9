use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::config::DnsConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    Cname,
    Txt,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::Cname => "CNAME",
            RecordType::Txt => "TXT",
        }
    }

    /// RR type number used in DNS JSON answers.
    pub fn code(&self) -> u16 {
        match self {
            RecordType::Cname => 5,
            RecordType::Txt => 16,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DnsError {
    #[error("DNS request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("DNS resolver returned HTTP {0}")]
    Status(u16),
}

#[async_trait]
pub trait DnsResolver: Send + Sync + 'static {
    /// Record data for `name`; an empty list when the name has no such record.
    async fn lookup(&self, name: &str, record_type: RecordType) -> Result<Vec<String>, DnsError>;
}

#[derive(Debug, Deserialize)]
struct DohResponse {
    #[serde(rename = "Status")]
    status: u32,
    #[serde(rename = "Answer", default)]
    answer: Vec<DohAnswer>,
}

#[derive(Debug, Deserialize)]
struct DohAnswer {
    #[serde(rename = "type")]
    record_type: u16,
    data: String,
}

/// DNS-over-HTTPS client for resolvers speaking the JSON API
/// (Google `dns.google/resolve`, Cloudflare `cloudflare-dns.com/dns-query`).
#[derive(Clone)]
pub struct DohResolver {
    endpoint: String,
    client: reqwest::Client,
}

impl DohResolver {
    pub fn new(config: &DnsConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            endpoint: config.resolver_url.clone(),
            client,
        })
    }
}

fn answers_of(body: DohResponse, record_type: RecordType) -> Vec<String> {
    // NXDOMAIN, SERVFAIL and friends mean "no record" for our purposes.
    if body.status != 0 {
        return Vec::new();
    }
    body.answer
        .into_iter()
        .filter(|a| a.record_type == record_type.code())
        .map(|a| a.data)
        .collect()
}

#[async_trait]
impl DnsResolver for DohResolver {
    async fn lookup(&self, name: &str, record_type: RecordType) -> Result<Vec<String>, DnsError> {
        let resp = self
            .client
            .get(&self.endpoint)
            .query(&[("name", name), ("type", record_type.as_str())])
            .header(reqwest::header::ACCEPT, "application/dns-json")
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(DnsError::Status(resp.status().as_u16()));
        }
        let body: DohResponse = resp.json().await?;
        Ok(answers_of(body, record_type))
    }
}

/// `"abc" "123"` -> `abc123`; resolvers quote TXT strings and split long ones.
pub fn unquote_txt(data: &str) -> String {
    let data = data.trim();
    if !data.starts_with('"') {
        return data.to_string();
    }
    data.split('"')
        .enumerate()
        .filter(|(i, _)| i % 2 == 1)
        .map(|(_, s)| s)
        .collect()
}

/// Compares host names ignoring case and a trailing root dot.
pub fn same_host(a: &str, b: &str) -> bool {
    a.trim().trim_end_matches('.').eq_ignore_ascii_case(b.trim().trim_end_matches('.'))
}

#[cfg(test)]
pub mod fake {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Canned answers keyed by (name, type); unknown names have no records.
    #[derive(Default)]
    pub struct StaticResolver {
        records: Mutex<HashMap<(String, RecordType), Vec<String>>>,
        pub fail: bool,
        pub calls: Mutex<Vec<(String, RecordType)>>,
    }

    impl StaticResolver {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        pub fn with(self, name: &str, record_type: RecordType, data: &str) -> Self {
            self.records
                .lock()
                .unwrap()
                .entry((name.to_string(), record_type))
                .or_default()
                .push(data.to_string());
            self
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl DnsResolver for StaticResolver {
        async fn lookup(
            &self,
            name: &str,
            record_type: RecordType,
        ) -> Result<Vec<String>, DnsError> {
            self.calls
                .lock()
                .unwrap()
                .push((name.to_string(), record_type));
            if self.fail {
                return Err(DnsError::Status(502));
            }
            Ok(self
                .records
                .lock()
                .unwrap()
                .get(&(name.to_string(), record_type))
                .cloned()
                .unwrap_or_default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_google_style_answers() {
        let body: DohResponse = serde_json::from_str(
            r#"{"Status":0,"TC":false,"Question":[{"name":"www.myteam.com.","type":5}],
            "Answer":[{"name":"www.myteam.com.","type":5,"TTL":300,"data":"eagles.tallyroster.com."},
                      {"name":"eagles.tallyroster.com.","type":1,"TTL":60,"data":"76.76.21.21"}]}"#,
        )
        .unwrap();
        assert_eq!(answers_of(body, RecordType::Cname), vec!["eagles.tallyroster.com."]);
    }

    #[test]
    fn nxdomain_and_missing_answer_are_empty() {
        let body: DohResponse = serde_json::from_str(r#"{"Status":3}"#).unwrap();
        assert!(answers_of(body, RecordType::Txt).is_empty());

        let body: DohResponse = serde_json::from_str(r#"{"Status":0}"#).unwrap();
        assert!(answers_of(body, RecordType::Txt).is_empty());
    }

    #[test]
    fn txt_unquoting() {
        assert_eq!(unquote_txt("\"abc123\""), "abc123");
        assert_eq!(unquote_txt("\"abc\" \"123\""), "abc123");
        assert_eq!(unquote_txt("abc123"), "abc123");
        assert_eq!(unquote_txt(" \"\" "), "");
    }

    #[test]
    fn host_comparison() {
        assert!(same_host("Eagles.TallyRoster.com.", "eagles.tallyroster.com"));
        assert!(!same_host("hawks.tallyroster.com", "eagles.tallyroster.com"));
    }
}
