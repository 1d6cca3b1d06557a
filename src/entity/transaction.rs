use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Age after which a pending transaction is reported as stuck
pub const STUCK_AFTER_HOURS: i64 = 24;

/// Lifecycle status of a wallet transaction
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    Pending,
    Confirmed,
    Failed,
    Cancelled,
}

impl TxStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TxStatus::Pending)
    }

    /// Merge rank. The merged status of a record is always the highest rank seen,
    /// so terminal statuses can never fall back to pending.
    fn rank(&self) -> u8 {
        match self {
            TxStatus::Pending => 0,
            TxStatus::Cancelled => 1,
            TxStatus::Failed => 2,
            TxStatus::Confirmed => 3,
        }
    }

    pub fn merge(self, other: TxStatus) -> TxStatus {
        if other.rank() > self.rank() {
            other
        } else {
            self
        }
    }
}

impl std::fmt::Display for TxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TxStatus::Pending => write!(f, "PENDING"),
            TxStatus::Confirmed => write!(f, "CONFIRMED"),
            TxStatus::Failed => write!(f, "FAILED"),
            TxStatus::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// Kind of wallet activity. The backend list is open-ended, unknown kinds decode as `Unknown`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TxType {
    Deposit,
    Withdraw,
    Swap,
    Send,
    Receive,
    CardSpend,
    Bridge,
    DirectDeposit,
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for TxType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            TxType::Deposit => "Deposit",
            TxType::Withdraw => "Withdraw",
            TxType::Swap => "Swap",
            TxType::Send => "Send",
            TxType::Receive => "Receive",
            TxType::CardSpend => "Card spend",
            TxType::Bridge => "Bridge",
            TxType::DirectDeposit => "Direct deposit",
            TxType::Unknown => "Transaction",
        };
        write!(f, "{}", label)
    }
}

/// Where a record came from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RecordSource {
    /// Created locally when the user submitted the transaction
    Optimistic,
    #[default]
    Backend,
}

/// Cached wallet transaction, keyed by `client_tx_id`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub client_tx_id: String,
    pub status: TxStatus,
    #[serde(rename = "type")]
    pub tx_type: TxType,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub chain_id: Option<u64>,
    #[serde(default)]
    pub tx_hash: Option<String>,
    #[serde(default)]
    pub source: RecordSource,
}

impl TransactionRecord {
    /// Pending transaction older than the stuck threshold
    pub fn is_stuck(&self, now: DateTime<Utc>) -> bool {
        self.status == TxStatus::Pending
            && now.signed_duration_since(self.timestamp) > Duration::hours(STUCK_AFTER_HOURS)
    }
}

/// Partial update of a transaction record.
///
/// Stream events usually carry nothing but the id and a new status, backend pages
/// carry full records. Both reach the store in this shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecordUpdate {
    pub client_tx_id: String,
    #[serde(default)]
    pub status: Option<TxStatus>,
    #[serde(default, rename = "type")]
    pub tx_type: Option<TxType>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub chain_id: Option<u64>,
    #[serde(default)]
    pub tx_hash: Option<String>,
    #[serde(default)]
    pub source: RecordSource,
}

impl RecordUpdate {
    pub fn status(client_tx_id: impl Into<String>, status: TxStatus) -> Self {
        Self {
            client_tx_id: client_tx_id.into(),
            status: Some(status),
            tx_type: None,
            timestamp: None,
            amount: None,
            symbol: None,
            chain_id: None,
            tx_hash: None,
            source: RecordSource::Backend,
        }
    }

    /// Build a fresh record for an id the store has never seen
    pub fn into_record(self, now: DateTime<Utc>) -> TransactionRecord {
        TransactionRecord {
            client_tx_id: self.client_tx_id,
            status: self.status.unwrap_or(TxStatus::Pending),
            tx_type: self.tx_type.unwrap_or(TxType::Unknown),
            timestamp: self.timestamp.unwrap_or(now),
            amount: self.amount,
            symbol: self.symbol,
            chain_id: self.chain_id,
            tx_hash: self.tx_hash,
            source: self.source,
        }
    }

    /// Merge this update into an existing record.
    ///
    /// Backend updates overwrite the fields they carry. Optimistic updates only fill
    /// gaps once the backend has taken over the record.
    pub fn merge_into(&self, existing: &TransactionRecord) -> TransactionRecord {
        let backend_wins = self.source == RecordSource::Backend
            || existing.source == RecordSource::Optimistic;

        fn pick<T: Clone>(incoming: &Option<T>, current: &Option<T>, incoming_wins: bool) -> Option<T> {
            match (incoming, current) {
                (Some(value), _) if incoming_wins => Some(value.clone()),
                (Some(value), None) => Some(value.clone()),
                _ => current.clone(),
            }
        }

        let tx_type = match (self.tx_type, existing.tx_type) {
            (Some(incoming), TxType::Unknown) => incoming,
            (Some(incoming), _) if backend_wins => incoming,
            (_, current) => current,
        };

        let timestamp = match self.timestamp {
            Some(ts)
                if self.source == RecordSource::Backend
                    && existing.source == RecordSource::Optimistic =>
            {
                ts
            }
            _ => existing.timestamp,
        };

        let source = if self.source == RecordSource::Backend {
            RecordSource::Backend
        } else {
            existing.source
        };

        TransactionRecord {
            client_tx_id: existing.client_tx_id.clone(),
            status: match self.status {
                Some(status) => existing.status.merge(status),
                None => existing.status,
            },
            tx_type,
            timestamp,
            amount: pick(&self.amount, &existing.amount, backend_wins),
            symbol: pick(&self.symbol, &existing.symbol, backend_wins),
            chain_id: pick(&self.chain_id, &existing.chain_id, backend_wins),
            tx_hash: pick(&self.tx_hash, &existing.tx_hash, backend_wins),
            source,
        }
    }
}

impl From<TransactionRecord> for RecordUpdate {
    fn from(record: TransactionRecord) -> Self {
        Self {
            client_tx_id: record.client_tx_id,
            status: Some(record.status),
            tx_type: Some(record.tx_type),
            timestamp: Some(record.timestamp),
            amount: record.amount,
            symbol: record.symbol,
            chain_id: record.chain_id,
            tx_hash: record.tx_hash,
            source: record.source,
        }
    }
}

/// Query filter for `ActivityStore::get_all`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordFilter {
    pub tx_type: Option<TxType>,
    pub status: Option<TxStatus>,
}

impl RecordFilter {
    pub fn matches(&self, record: &TransactionRecord) -> bool {
        self.tx_type.map_or(true, |t| record.tx_type == t)
            && self.status.map_or(true, |s| record.status == s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn pending(id: &str, ts: DateTime<Utc>) -> TransactionRecord {
        TransactionRecord {
            client_tx_id: id.to_string(),
            status: TxStatus::Pending,
            tx_type: TxType::Deposit,
            timestamp: ts,
            amount: Some(Decimal::new(1250, 2)),
            symbol: Some("USDC".to_string()),
            chain_id: Some(8453),
            tx_hash: None,
            source: RecordSource::Optimistic,
        }
    }

    #[test]
    fn stuck_threshold_is_24_hours() {
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap();

        assert!(!pending("a", now - Duration::hours(23)).is_stuck(now));
        assert!(!pending("a", now - Duration::hours(24)).is_stuck(now));
        assert!(pending("a", now - Duration::hours(25)).is_stuck(now));

        let mut confirmed = pending("a", now - Duration::hours(48));
        confirmed.status = TxStatus::Confirmed;
        assert!(!confirmed.is_stuck(now));
    }

    #[test]
    fn status_merge_keeps_highest_rank() {
        let all = [
            TxStatus::Pending,
            TxStatus::Cancelled,
            TxStatus::Failed,
            TxStatus::Confirmed,
        ];
        for a in all {
            for b in all {
                assert_eq!(a.merge(b), b.merge(a));
                if a.is_terminal() {
                    assert!(a.merge(b).is_terminal());
                }
            }
        }
        assert_eq!(TxStatus::Confirmed.merge(TxStatus::Pending), TxStatus::Confirmed);
    }

    #[test]
    fn backend_update_replaces_optimistic_fields() {
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap();
        let existing = pending("a", now);

        let mut update = RecordUpdate::status("a", TxStatus::Confirmed);
        update.amount = Some(Decimal::new(1249, 2));
        update.timestamp = Some(now - Duration::minutes(1));
        update.tx_hash = Some("0xabc".to_string());

        let merged = update.merge_into(&existing);
        assert_eq!(merged.status, TxStatus::Confirmed);
        assert_eq!(merged.amount, Some(Decimal::new(1249, 2)));
        assert_eq!(merged.timestamp, now - Duration::minutes(1));
        assert_eq!(merged.tx_hash.as_deref(), Some("0xabc"));
        assert_eq!(merged.symbol.as_deref(), Some("USDC"));
        assert_eq!(merged.source, RecordSource::Backend);
    }

    #[test]
    fn optimistic_update_only_fills_gaps_on_backend_record() {
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap();
        let mut existing = pending("a", now);
        existing.source = RecordSource::Backend;
        existing.symbol = None;

        let mut update: RecordUpdate = pending("a", now + Duration::minutes(5)).into();
        update.amount = Some(Decimal::new(1, 0));
        update.symbol = Some("ETH".to_string());

        let merged = update.merge_into(&existing);
        assert_eq!(merged.amount, Some(Decimal::new(1250, 2)));
        assert_eq!(merged.symbol.as_deref(), Some("ETH"));
        assert_eq!(merged.timestamp, now);
        assert_eq!(merged.source, RecordSource::Backend);
    }

    #[test]
    fn decodes_backend_json() {
        let json = r#"{
            "clientTxId": "tx-1",
            "status": "confirmed",
            "type": "card_spend",
            "timestamp": "2026-03-10T12:00:00Z",
            "amount": "42.5",
            "symbol": "USDC",
            "chainId": 1
        }"#;
        let record: TransactionRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.tx_type, TxType::CardSpend);
        assert_eq!(record.amount, Some(Decimal::new(425, 1)));
        assert_eq!(record.source, RecordSource::Backend);

        let odd = json.replace("card_spend", "staking_reward");
        let record: TransactionRecord = serde_json::from_str(&odd).unwrap();
        assert_eq!(record.tx_type, TxType::Unknown);
    }
}
