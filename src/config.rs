use crate::util::ensure_dir;
use anyhow::{Context, Result};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: Server,
    #[serde(default)]
    pub api: Api,
    #[serde(default)]
    pub polling: Polling,
    #[serde(default = "default_scenarios")]
    pub scenarios: Vec<Scenario>,
    #[serde(default)]
    pub limits: Limits,
    #[serde(default)]
    pub probes: Probes,
    #[serde(default)]
    pub output: Output,
    #[serde(default)]
    pub logging: Logging,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let cfg: Config = toml::from_str(&raw).with_context(|| "parsing TOML")?;
        Ok(cfg)
    }

    /// Loads `path` when given, otherwise the first config file found in the
    /// working directory, otherwise the built-in defaults.
    pub fn resolve(user: Option<&Path>) -> Result<Self> {
        if let Some(p) = user {
            return Self::load(p);
        }
        for candidate in ["recon-bench.toml", "recon-bench.example.toml"] {
            let path = PathBuf::from(candidate);
            if path.exists() {
                return Self::load(&path);
            }
        }
        Ok(Self::default())
    }

    /// Writes the resolved configuration as TOML, creating parent directories.
    pub fn write_effective(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            ensure_dir(parent)?;
        }
        let raw = toml::to_string(self).context("serializing effective config")?;
        std::fs::write(path, raw).with_context(|| format!("writing {}", path.display()))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: Default::default(),
            api: Default::default(),
            polling: Default::default(),
            scenarios: default_scenarios(),
            limits: Default::default(),
            probes: Default::default(),
            output: Default::default(),
            logging: Default::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Server {
    pub base_url: String,
    pub request_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    pub health_timeout_ms: u64,
    pub user_agent: String,
}
impl Default for Server {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".into(),
            request_timeout_ms: 30_000,
            connect_timeout_ms: 5_000,
            health_timeout_ms: 5_000,
            user_agent: concat!("recon-bench/", env!("CARGO_PKG_VERSION")).into(),
        }
    }
}
impl Server {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_millis(self.health_timeout_ms)
    }
}

/// Request paths on the service. `{batch_id}` is substituted with the job handle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Api {
    pub health_path: String,
    pub upload_path: String,
    pub batch_path: String,
    pub transactions_path: String,
    pub search_path: String,
    pub upload_field: String,
    pub upload_mime: String,
}
impl Default for Api {
    fn default() -> Self {
        Self {
            health_path: "/health".into(),
            upload_path: "/api/reconciliation/upload".into(),
            batch_path: "/api/reconciliation/{batch_id}".into(),
            transactions_path: "/api/reconciliation/{batch_id}/transactions".into(),
            search_path: "/api/invoices/search".into(),
            upload_field: "file".into(),
            upload_mime: "text/csv".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Polling {
    pub poll_interval_ms: u64,
    pub max_wait_seconds: u64,
}
impl Default for Polling {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1_000,
            max_wait_seconds: 300,
        }
    }
}
impl Polling {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub label: String,
    pub input: PathBuf,
    /// A missing input or rejected upload aborts the whole run when set;
    /// otherwise the scenario is skipped.
    #[serde(default)]
    pub required: bool,
}

fn default_scenarios() -> Vec<Scenario> {
    vec![
        Scenario {
            label: "1000_transactions".into(),
            input: PathBuf::from("bank_transactions.csv"),
            required: true,
        },
        Scenario {
            label: "10000_transactions".into(),
            input: PathBuf::from("bank_transactions_large.csv"),
            required: false,
        },
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub max_upload_bytes: u64,
    pub require_csv_extension: bool,
}
impl Default for Limits {
    fn default() -> Self {
        Self {
            max_upload_bytes: 50 * 1024 * 1024,
            require_csv_extension: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchCase {
    pub label: String,
    pub params: QueryParams,
}

/// Query parameters in the order they were configured. Written as an inline
/// TOML table; sent on the wire in that same order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams(Vec<(String, String)>);

impl QueryParams {
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn to_pairs(&self) -> Vec<(String, String)> {
        self.0.clone()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for QueryParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl Serialize for QueryParams {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for QueryParams {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ParamsVisitor;

        impl<'de> Visitor<'de> for ParamsVisitor {
            type Value = QueryParams;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a table of query parameter names to string values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<QueryParams, A::Error> {
                let mut pairs = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((k, v)) = access.next_entry::<String, String>()? {
                    pairs.push((k, v));
                }
                Ok(QueryParams(pairs))
            }
        }

        deserializer.deserialize_map(ParamsVisitor)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListCase {
    pub label: String,
    pub status: String,
    pub limit: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Probes {
    pub search: Vec<SearchCase>,
    pub list: Vec<ListCase>,
}
impl Default for Probes {
    fn default() -> Self {
        let search = |label: &str, params: &[(&str, &str)]| SearchCase {
            label: label.into(),
            params: params.iter().copied().collect(),
        };
        let list = |label: &str, status: &str, limit: u32| ListCase {
            label: label.into(),
            status: status.into(),
            limit,
        };
        Self {
            search: vec![
                search("Text search (customer name)", &[("q", "smith")]),
                search("Invoice number search", &[("q", "INV")]),
                search("Amount search", &[("amount", "450.00")]),
                search("Status filter", &[("status", "sent")]),
                search("Combined search", &[("q", "john"), ("amount", "450.00")]),
            ],
            list: vec![
                list("All transactions (50)", "all", 50),
                list("Auto-matched (50)", "auto_matched", 50),
                list("Needs review (50)", "needs_review", 50),
                list("All transactions (200)", "all", 200),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Output {
    pub report_path: PathBuf,
    pub write_report: bool,
    pub print_summary: bool,
    pub dump_effective_config: bool,
}
impl Default for Output {
    fn default() -> Self {
        Self {
            report_path: PathBuf::from("performance_results.json"),
            write_report: true,
            print_summary: true,
            dump_effective_config: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Logging {
    pub level: String,
    pub json: bool,
    pub write_to_file: bool,
    pub file_path: String,
}
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            write_to_file: false,
            file_path: "".into(),
        }
    }
}
