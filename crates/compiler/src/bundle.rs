use std::collections::BTreeMap;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use pagesmith_project::{FlatFile, NodeKind};

/// Node id of the visible bundled artifact kept under the project root.
pub const BUNDLE_NODE_ID: &str = "bundle";

static EXTENSION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\..+$").expect("extension pattern"));

/// Plans the virtual-module map sent to the bundler: compiled files only,
/// module names are their paths with the extension stripped
/// (`src/main.js` → `src/main`).
/// 規劃送往打包器的虛擬模組對應：僅編譯後檔案，模組名為去除副檔名的路徑。
pub fn pre_bundle(files: &[FlatFile]) -> BTreeMap<String, String> {
    let mut virtual_files = BTreeMap::new();
    for file in files {
        if file.kind != NodeKind::JavaScript {
            continue;
        }
        let name = EXTENSION.replace(&file.path, "").into_owned();
        virtual_files.insert(name, file.content.clone());
    }
    virtual_files
}

/// Failures from the external bundler.
/// 外部打包器的失敗情形。
#[derive(Debug, Error)]
pub enum BundleError {
    #[error("bundle request failed: {0}")]
    Http(String),
    #[error("bundler returned no output")]
    EmptyOutput,
}

/// Seam to the external bundler: a virtual-module map in, bundled text out.
/// 外部打包器的介面：輸入虛擬模組對應，輸出打包後文字。
pub trait BundleService {
    fn bundle(&self, virtual_files: &BTreeMap<String, String>) -> Result<String, BundleError>;
}

/// Blocking HTTP client for the bundle endpoint.
/// 打包端點的同步 HTTP 用戶端。
#[derive(Debug, Clone)]
pub struct HttpBundleService {
    base_url: String,
    timeout: Duration,
}

impl HttpBundleService {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl BundleService for HttpBundleService {
    fn bundle(&self, virtual_files: &BTreeMap<String, String>) -> Result<String, BundleError> {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(self.timeout))
            .build()
            .into();
        let url = format!("{}/rollup", self.base_url.trim_end_matches('/'));
        log::debug!("posting {} virtual modules to {url}", virtual_files.len());
        let mut response = agent
            .post(&url)
            .send_json(virtual_files)
            .map_err(|err| BundleError::Http(err.to_string()))?;
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|err| BundleError::Http(err.to_string()))?;
        if body.trim().is_empty() {
            return Err(BundleError::EmptyOutput);
        }
        Ok(body)
    }
}
