use dashmap::DashMap;
use serde_json::Value;

use crate::error::AppError;

/// Stored outcome of a mutating request that carried an `Idempotency-Key`.
#[derive(Debug, Clone)]
pub struct IdempotencyRecord {
    pub key: String,
    pub method: String,
    pub path: String,
    pub status_code: u16,
    pub response_body: String,
}

/// Ledger of honored idempotency keys. A key is bound to the method+path it
/// was first used with; replays against the same endpoint return the stored
/// response, replays against a different endpoint are a conflict.
#[derive(Default)]
pub struct IdempotencyLedger {
    records: DashMap<String, IdempotencyRecord>,
}

impl IdempotencyLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(
        &self,
        key: &str,
        method: &str,
        path: &str,
    ) -> Result<Option<IdempotencyRecord>, AppError> {
        let Some(rec) = self.records.get(key) else {
            return Ok(None);
        };

        if rec.method == method && rec.path == path {
            Ok(Some(rec.clone()))
        } else {
            Err(AppError::Conflict(
                "idempotency key reused for a different request".to_string(),
            ))
        }
    }

    /// Called once per honored key, after the mutation and its side effects
    /// committed. Writes for the same key are logically identical, so a
    /// last-write-wins upsert is fine.
    pub fn save(&self, key: &str, method: &str, path: &str, status_code: u16, body: &Value) {
        self.records.insert(
            key.to_string(),
            IdempotencyRecord {
                key: key.to_string(),
                method: method.to_string(),
                path: path.to_string(),
                status_code,
                response_body: body.to_string(),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_key_is_a_miss() {
        let ledger = IdempotencyLedger::new();
        assert!(ledger.lookup("k1", "POST", "/orders").unwrap().is_none());
    }

    #[test]
    fn stored_record_replays_on_matching_endpoint() {
        let ledger = IdempotencyLedger::new();
        ledger.save("k1", "POST", "/orders", 200, &json!({"id": 7}));

        let rec = ledger.lookup("k1", "POST", "/orders").unwrap().unwrap();
        assert_eq!(rec.status_code, 200);
        assert_eq!(rec.response_body, r#"{"id":7}"#);
    }

    #[test]
    fn cross_endpoint_reuse_is_a_conflict() {
        let ledger = IdempotencyLedger::new();
        ledger.save("k1", "POST", "/orders", 200, &json!({"id": 7}));

        let err = ledger.lookup("k1", "POST", "/orders/7/claim").unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn duplicate_save_is_an_upsert() {
        let ledger = IdempotencyLedger::new();
        ledger.save("k1", "POST", "/orders", 200, &json!({"id": 7}));
        ledger.save("k1", "POST", "/orders", 200, &json!({"id": 7}));

        let rec = ledger.lookup("k1", "POST", "/orders").unwrap().unwrap();
        assert_eq!(rec.response_body, r#"{"id":7}"#);
    }
}
