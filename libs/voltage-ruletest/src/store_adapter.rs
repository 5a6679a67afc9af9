//! Store adapter
//!
//! Moves scenario values into and out of the shared store and judges each
//! expectation. Single failed comparisons are results, not errors; only
//! transport failures surface as [`HarnessError::Transport`], logged at most
//! once per category per throttle window.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, trace, warn};
use voltage_calc::Scalar;
use voltage_rtdb::{Bytes, Rtdb};
use voltage_rules::DOMAIN_PREFIXES;

use crate::comparison::{coerce_actual, compare_values};
use crate::config::DEFAULT_POLLING_INTERVAL_MS;
use crate::error::{HarnessError, Result};
use crate::scenario::{StorageFormat, TestExpectation, TestInput, ValidatorKind};

/// Window during which repeated transport errors of one category are not logged
pub const ERROR_LOG_WINDOW: Duration = Duration::from_secs(60);

/// Hash field used when a hash-format key names no field
pub const DEFAULT_HASH_FIELD: &str = "value";

// ============================================================================
// Key resolution
// ============================================================================

/// Physical address of a value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyLocation {
    pub key: String,
    pub field: Option<String>,
    pub format: StorageFormat,
}

fn has_domain_prefix(key: &str) -> bool {
    DOMAIN_PREFIXES.iter().any(|prefix| key.starts_with(prefix))
}

/// Resolve where a key lives
///
/// Domain-prefixed keys (`input:`, `output:`, `state:`, `buffer:`) are plain
/// strings addressed verbatim. A bare `a:b` key without an explicit field is
/// the legacy hash convention: hash `a`, field `b`.
pub fn determine_key_format(
    key: &str,
    field: Option<&str>,
    format: Option<StorageFormat>,
) -> KeyLocation {
    let legacy_split = || {
        if has_domain_prefix(key) {
            None
        } else {
            key.rsplit_once(':')
                .filter(|(hash, field)| !hash.is_empty() && !field.is_empty())
        }
    };

    match (format, field) {
        (Some(StorageFormat::Hash), Some(field)) | (None, Some(field)) => KeyLocation {
            key: key.to_string(),
            field: Some(field.to_string()),
            format: StorageFormat::Hash,
        },
        (Some(StorageFormat::Hash), None) => match legacy_split() {
            Some((hash, field)) => KeyLocation {
                key: hash.to_string(),
                field: Some(field.to_string()),
                format: StorageFormat::Hash,
            },
            None => KeyLocation {
                key: key.to_string(),
                field: Some(DEFAULT_HASH_FIELD.to_string()),
                format: StorageFormat::Hash,
            },
        },
        (None, None) => match legacy_split() {
            Some((hash, field)) => KeyLocation {
                key: hash.to_string(),
                field: Some(field.to_string()),
                format: StorageFormat::Hash,
            },
            None => KeyLocation {
                key: key.to_string(),
                field: None,
                format: StorageFormat::String,
            },
        },
        (Some(format), _) => KeyLocation {
            key: key.to_string(),
            field: None,
            format,
        },
    }
}

// ============================================================================
// Results
// ============================================================================

/// Outcome of one expectation check
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpectationResult {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub expected: Option<Scalar>,
    /// Last value observed in the store
    pub actual: Option<String>,
    pub success: bool,
    /// Polling deadline passed without a match
    pub timed_out: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

// ============================================================================
// Error throttling
// ============================================================================

/// Rate limiter for transport error logs, keyed by category
#[derive(Debug)]
pub struct ErrorThrottle {
    window: Duration,
    last_logged: Mutex<HashMap<String, Instant>>,
}

impl ErrorThrottle {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_logged: Mutex::new(HashMap::new()),
        }
    }

    /// True when `category` has not been logged within the window; records the hit
    pub fn should_log(&self, category: &str) -> bool {
        let now = Instant::now();
        let mut last_logged = self.last_logged.lock();
        match last_logged.get(category) {
            Some(at) if now.duration_since(*at) < self.window => false,
            _ => {
                last_logged.insert(category.to_string(), now);
                true
            },
        }
    }
}

impl Default for ErrorThrottle {
    fn default() -> Self {
        Self::new(ERROR_LOG_WINDOW)
    }
}

// ============================================================================
// Adapter
// ============================================================================

/// Scenario-facing access to the shared store
pub struct StoreAdapter {
    rtdb: Arc<dyn Rtdb>,
    throttle: ErrorThrottle,
    polling_interval: Duration,
}

impl StoreAdapter {
    pub fn new(rtdb: Arc<dyn Rtdb>) -> Self {
        Self {
            rtdb,
            throttle: ErrorThrottle::default(),
            polling_interval: Duration::from_millis(DEFAULT_POLLING_INTERVAL_MS),
        }
    }

    /// Polling interval for expectations that do not set one
    pub fn with_polling_interval(mut self, interval: Duration) -> Self {
        self.polling_interval = interval;
        self
    }

    pub fn with_throttle(mut self, throttle: ErrorThrottle) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn rtdb(&self) -> &Arc<dyn Rtdb> {
        &self.rtdb
    }

    /// Log (throttled) and convert a backend failure
    fn transport_error(&self, operation: &str, err: anyhow::Error) -> HarnessError {
        if self.throttle.should_log(operation) {
            error!(operation, "Store error: {:#}", err);
        } else {
            trace!(operation, "Store error suppressed: {:#}", err);
        }
        HarnessError::transport(operation, format!("{:#}", err))
    }

    /// Write each input in its resolved format
    pub async fn send_inputs(&self, inputs: &[TestInput]) -> Result<()> {
        for input in inputs {
            let location = determine_key_format(&input.key, input.field.as_deref(), input.format);
            trace!(key = %location.key, value = %input.value, format = ?location.format, "Send input");
            self.write(&location, &input.value)
                .await
                .map_err(|e| self.transport_error("send_inputs", e))?;
        }
        debug!("Sent {} inputs", inputs.len());
        Ok(())
    }

    async fn write(&self, location: &KeyLocation, value: &Scalar) -> anyhow::Result<()> {
        match location.format {
            StorageFormat::String => {
                self.rtdb
                    .set_string(&location.key, &value.to_store_string())
                    .await
            },
            StorageFormat::Hash => {
                let field = location.field.as_deref().unwrap_or(DEFAULT_HASH_FIELD);
                self.rtdb
                    .hash_set(&location.key, field, Bytes::from(value.to_store_string()))
                    .await
            },
            StorageFormat::Json => {
                let payload = match value {
                    Scalar::Text(s) => s.clone(),
                    other => serde_json::to_string(other)?,
                };
                self.rtdb.set_string(&location.key, &payload).await
            },
            StorageFormat::Pub => {
                let receivers = self
                    .rtdb
                    .publish(&location.key, &value.to_store_string())
                    .await?;
                trace!(channel = %location.key, receivers, "Published input");
                Ok(())
            },
        }
    }

    async fn read(&self, location: &KeyLocation) -> anyhow::Result<Option<String>> {
        match location.format {
            StorageFormat::String => self.rtdb.get_string(&location.key).await,
            StorageFormat::Hash => {
                let field = location.field.as_deref().unwrap_or(DEFAULT_HASH_FIELD);
                self.rtdb.hash_get_string(&location.key, field).await
            },
            StorageFormat::Json => {
                let raw = self.rtdb.get_string(&location.key).await?;
                Ok(raw.map(|text| json_scalar_text(&text)))
            },
            StorageFormat::Pub => Ok(None),
        }
    }

    /// Check expectations in order
    pub async fn check_expectations(
        &self,
        expectations: &[TestExpectation],
    ) -> Result<Vec<ExpectationResult>> {
        let mut results = Vec::with_capacity(expectations.len());
        for expectation in expectations {
            results.push(self.check_expectation(expectation).await?);
        }
        Ok(results)
    }

    /// Check one expectation, polling until its timeout when one is set
    pub async fn check_expectation(&self, expectation: &TestExpectation) -> Result<ExpectationResult> {
        let location = determine_key_format(
            &expectation.key,
            expectation.field.as_deref(),
            expectation.format,
        );

        if location.format == StorageFormat::Pub {
            return Ok(ExpectationResult {
                key: expectation.key.clone(),
                field: expectation.field.clone(),
                expected: expectation.expected.clone(),
                actual: None,
                success: false,
                timed_out: false,
                details: Some("pub format is write-only and cannot be verified".to_string()),
            });
        }

        let timeout = expectation
            .timeout_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis);
        let interval = expectation
            .polling_interval_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
            .unwrap_or(self.polling_interval);

        let started = tokio::time::Instant::now();
        let mut polls = 0u32;
        loop {
            polls += 1;
            let raw = self
                .read(&location)
                .await
                .map_err(|e| self.transport_error("check_expectations", e))?;

            if evaluate(expectation, raw.as_deref()) {
                trace!(key = %expectation.key, polls, "Expectation met");
                return Ok(self.result(expectation, raw, true, false));
            }

            let Some(timeout) = timeout else {
                return Ok(self.result(expectation, raw, false, false));
            };

            let elapsed = started.elapsed();
            if elapsed >= timeout {
                debug!(
                    key = %expectation.key,
                    polls,
                    timeout_ms = timeout.as_millis() as u64,
                    "Expectation timed out"
                );
                return Ok(self.result(expectation, raw, false, true));
            }
            tokio::time::sleep(interval.min(timeout - elapsed)).await;
        }
    }

    fn result(
        &self,
        expectation: &TestExpectation,
        actual: Option<String>,
        success: bool,
        timed_out: bool,
    ) -> ExpectationResult {
        let details = (!success).then(|| {
            let validator = expectation.effective_validator();
            let expected = expectation
                .expected
                .as_ref()
                .map_or_else(|| "null".to_string(), |v| format!("{:?}", v.to_store_string()));
            let shown = actual
                .as_deref()
                .map_or_else(|| "<missing>".to_string(), |v| format!("{:?}", v));
            let mut message = format!(
                "{} comparison failed: expected {}, actual {}",
                validator_name(validator),
                expected,
                shown
            );
            if timed_out {
                message.push_str(&format!(
                    " (timed out after {} ms)",
                    expectation.timeout_ms.unwrap_or_default()
                ));
            }
            message
        });

        ExpectationResult {
            key: expectation.key.clone(),
            field: expectation.field.clone(),
            expected: expectation.expected.clone(),
            actual,
            success,
            timed_out,
            details,
        }
    }

    /// Prime outputs with direct string writes
    pub async fn set_pre_test_outputs(&self, outputs: &BTreeMap<String, Scalar>) -> Result<()> {
        for (key, value) in outputs {
            self.rtdb
                .set_string(key, &value.to_store_string())
                .await
                .map_err(|e| self.transport_error("set_pre_test_outputs", e))?;
        }
        debug!("Pre-set {} outputs", outputs.len());
        Ok(())
    }

    /// Delete every key matching `pattern`; returns how many were removed
    ///
    /// Individual delete failures are logged and skipped.
    pub async fn clear_keys(&self, pattern: &str) -> Result<usize> {
        let keys = self
            .rtdb
            .scan_match(pattern)
            .await
            .map_err(|e| self.transport_error("clear_keys", e))?;

        let mut removed = 0;
        for key in &keys {
            match self.rtdb.del(key).await {
                Ok(true) => removed += 1,
                Ok(false) => {},
                Err(e) => warn!(key = %key, "Failed to delete key: {:#}", e),
            }
        }
        debug!(pattern, removed, "Cleared keys");
        Ok(removed)
    }
}

fn validator_name(kind: ValidatorKind) -> &'static str {
    match kind {
        ValidatorKind::Auto => "auto",
        ValidatorKind::Boolean => "boolean",
        ValidatorKind::Numeric => "numeric",
        ValidatorKind::String => "string",
    }
}

/// JSON scalars read back as their plain text; other payloads stay raw
fn json_scalar_text(raw: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::String(s)) => s,
        Ok(serde_json::Value::Bool(b)) => b.to_string(),
        Ok(serde_json::Value::Number(n)) => n.to_string(),
        _ => raw.to_string(),
    }
}

/// Coerce the raw value and compare it with the expectation
fn evaluate(expectation: &TestExpectation, raw: Option<&str>) -> bool {
    let expected = expectation.expected.as_ref();
    let actual = raw.map(|text| coerce_actual(text, expected));
    compare_values(
        expectation.validator,
        expected,
        actual.as_ref(),
        expectation.tolerance,
    )
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing_test::traced_test;
    use voltage_rtdb::MemoryRtdb;

    fn adapter() -> (Arc<MemoryRtdb>, StoreAdapter) {
        let rtdb = Arc::new(MemoryRtdb::new());
        let adapter = StoreAdapter::new(rtdb.clone()).with_polling_interval(Duration::from_millis(5));
        (rtdb, adapter)
    }

    /// Backend whose every call fails
    struct UnreachableRtdb {
        calls: AtomicUsize,
    }

    impl UnreachableRtdb {
        fn fail<T>(&self) -> anyhow::Result<T> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(anyhow::anyhow!("connection refused"))
        }
    }

    #[async_trait]
    impl Rtdb for UnreachableRtdb {
        async fn get(&self, _key: &str) -> anyhow::Result<Option<Bytes>> {
            self.fail()
        }
        async fn set(&self, _key: &str, _value: Bytes) -> anyhow::Result<()> {
            self.fail()
        }
        async fn del(&self, _key: &str) -> anyhow::Result<bool> {
            self.fail()
        }
        async fn exists(&self, _key: &str) -> anyhow::Result<bool> {
            self.fail()
        }
        async fn hash_set(&self, _key: &str, _field: &str, _value: Bytes) -> anyhow::Result<()> {
            self.fail()
        }
        async fn hash_get(&self, _key: &str, _field: &str) -> anyhow::Result<Option<Bytes>> {
            self.fail()
        }
        async fn hash_get_all(&self, _key: &str) -> anyhow::Result<HashMap<String, Bytes>> {
            self.fail()
        }
        async fn hash_del(&self, _key: &str, _field: &str) -> anyhow::Result<bool> {
            self.fail()
        }
        async fn publish(&self, _channel: &str, _message: &str) -> anyhow::Result<u32> {
            self.fail()
        }
        async fn scan_match(&self, _pattern: &str) -> anyhow::Result<Vec<String>> {
            self.fail()
        }
    }

    #[test]
    fn test_determine_key_format() {
        let loc = determine_key_format("input:temperature", None, None);
        assert_eq!(loc.format, StorageFormat::String);
        assert_eq!(loc.key, "input:temperature");

        let loc = determine_key_format("sensors:t1", None, None);
        assert_eq!(loc.format, StorageFormat::Hash);
        assert_eq!((loc.key.as_str(), loc.field.as_deref()), ("sensors", Some("t1")));

        let loc = determine_key_format("comsrv:1001:T", None, None);
        assert_eq!((loc.key.as_str(), loc.field.as_deref()), ("comsrv:1001", Some("T")));

        let loc = determine_key_format("output:level", Some("max"), None);
        assert_eq!(loc.format, StorageFormat::Hash);
        assert_eq!(loc.key, "output:level");

        let loc = determine_key_format("plain", Some(""), Some(StorageFormat::Hash));
        assert_eq!(loc.field.as_deref(), Some(""));

        let loc = determine_key_format("output:flag", None, Some(StorageFormat::Hash));
        assert_eq!(loc.field.as_deref(), Some(DEFAULT_HASH_FIELD));

        let loc = determine_key_format("plain", None, None);
        assert_eq!(loc.format, StorageFormat::String);

        let loc = determine_key_format("alerts", None, Some(StorageFormat::Pub));
        assert_eq!(loc.format, StorageFormat::Pub);
    }

    #[tokio::test]
    async fn test_send_inputs_in_every_format() {
        let (rtdb, adapter) = adapter();
        let inputs = vec![
            TestInput::new("input:temperature", 45.0),
            TestInput::new("sensors:t1", true),
            TestInput {
                format: Some(StorageFormat::Json),
                ..TestInput::new("input:payload", 1.5)
            },
            TestInput {
                format: Some(StorageFormat::Json),
                ..TestInput::new("input:label", "pump")
            },
            TestInput {
                format: Some(StorageFormat::Pub),
                ..TestInput::new("alerts", "hot")
            },
        ];
        adapter.send_inputs(&inputs).await.unwrap();

        assert_eq!(
            rtdb.get_string("input:temperature").await.unwrap().as_deref(),
            Some("45")
        );
        assert_eq!(
            rtdb.hash_get_string("sensors", "t1").await.unwrap().as_deref(),
            Some("true")
        );
        assert_eq!(
            rtdb.get_string("input:payload").await.unwrap().as_deref(),
            Some("1.5")
        );
        assert_eq!(
            rtdb.get_string("input:label").await.unwrap().as_deref(),
            Some("pump")
        );
        assert_eq!(rtdb.published_messages()[0].channel, "alerts");
    }

    #[tokio::test]
    async fn test_single_check_without_timeout() {
        let (rtdb, adapter) = adapter();
        rtdb.set_string("output:alarm", "1").await.unwrap();

        let result = adapter
            .check_expectation(&TestExpectation::new("output:alarm", true))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.actual.as_deref(), Some("1"));
        assert!(result.details.is_none());

        let result = adapter
            .check_expectation(&TestExpectation::new("output:missing", 3.0))
            .await
            .unwrap();
        assert!(!result.success);
        assert!(!result.timed_out);
        assert!(result.details.unwrap().contains("<missing>"));
    }

    #[tokio::test]
    async fn test_polling_sees_late_value() {
        let (rtdb, adapter) = adapter();
        let writer = rtdb.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(40)).await;
            writer.set_string("output:level", "2,5").await.unwrap();
        });

        let expectation = TestExpectation {
            timeout_ms: Some(2000),
            ..TestExpectation::new("output:level", 2.5)
        };
        let result = adapter.check_expectation(&expectation).await.unwrap();
        assert!(result.success, "{:?}", result.details);
    }

    #[tokio::test]
    async fn test_timeout_returns_last_value() {
        let (rtdb, adapter) = adapter();
        rtdb.set_string("output:mode", "manual").await.unwrap();

        let expectation = TestExpectation {
            timeout_ms: Some(50),
            polling_interval_ms: Some(10),
            ..TestExpectation::new("output:mode", "auto")
        };
        let started = Instant::now();
        let result = adapter.check_expectation(&expectation).await.unwrap();

        assert!(started.elapsed() >= Duration::from_millis(50));
        assert!(!result.success);
        assert!(result.timed_out);
        assert_eq!(result.actual.as_deref(), Some("manual"));
        assert!(result.details.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_hash_and_json_read_back() {
        let (rtdb, adapter) = adapter();
        rtdb.hash_set("plant", "state", Bytes::from("RUNNING"))
            .await
            .unwrap();
        rtdb.set_string("output:doc", "\"ok\"").await.unwrap();

        let hash = adapter
            .check_expectation(&TestExpectation::new("plant:state", "running"))
            .await
            .unwrap();
        assert!(hash.success);

        let json = adapter
            .check_expectation(&TestExpectation {
                format: Some(StorageFormat::Json),
                ..TestExpectation::new("output:doc", "ok")
            })
            .await
            .unwrap();
        assert!(json.success, "{:?}", json.details);
    }

    #[tokio::test]
    async fn test_pub_expectation_is_a_failure_not_an_error() {
        let (_rtdb, adapter) = adapter();
        let result = adapter
            .check_expectation(&TestExpectation {
                format: Some(StorageFormat::Pub),
                ..TestExpectation::new("alerts", "x")
            })
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.details.unwrap().contains("write-only"));
    }

    #[tokio::test]
    async fn test_pre_set_and_clear() {
        let (rtdb, adapter) = adapter();
        let outputs = BTreeMap::from([
            ("output:a".to_string(), Scalar::Bool(false)),
            ("output:b".to_string(), Scalar::Number(0.0)),
        ]);
        adapter.set_pre_test_outputs(&outputs).await.unwrap();
        rtdb.set_string("input:keep", "1").await.unwrap();

        assert_eq!(rtdb.get_string("output:a").await.unwrap().as_deref(), Some("false"));
        assert_eq!(adapter.clear_keys("output:*").await.unwrap(), 2);
        assert!(!rtdb.exists("output:b").await.unwrap());
        assert!(rtdb.exists("input:keep").await.unwrap());
    }

    #[tokio::test]
    #[traced_test]
    async fn test_transport_errors_are_throttled() {
        let rtdb = Arc::new(UnreachableRtdb {
            calls: AtomicUsize::new(0),
        });
        let adapter = StoreAdapter::new(rtdb.clone());

        for _ in 0..3 {
            let err = adapter
                .send_inputs(&[TestInput::new("input:x", 1.0)])
                .await
                .unwrap_err();
            assert!(err.is_transport());
        }
        let err = adapter.clear_keys("output:*").await.unwrap_err();
        assert!(matches!(err, HarnessError::Transport { ref operation, .. } if operation == "clear_keys"));

        assert_eq!(rtdb.calls.load(Ordering::SeqCst), 4);
        logs_assert(|lines: &[&str]| {
            let errors = lines
                .iter()
                .filter(|line| line.contains("Store error:"))
                .count();
            if errors == 2 {
                Ok(())
            } else {
                Err(format!("expected 2 logged store errors, got {}", errors))
            }
        });
    }

    #[test]
    fn test_throttle_window() {
        let throttle = ErrorThrottle::new(Duration::from_millis(20));
        assert!(throttle.should_log("a"));
        assert!(!throttle.should_log("a"));
        assert!(throttle.should_log("b"));
        std::thread::sleep(Duration::from_millis(30));
        assert!(throttle.should_log("a"));
    }
}
