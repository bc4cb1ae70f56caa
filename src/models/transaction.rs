use serde::{Deserialize, Serialize};

/// Payment methods accepted on the create endpoint.
pub const SUPPORTED_PAYMENT_METHODS: &[&str] = &[
    "qris",
    "bca_va",
    "bni_va",
    "bri_va",
    "mandiri_va",
    "permata_va",
    "cimb_va",
    "paypal",
];

/// A brokered payment. Created once by the create flow; mutated only by the
/// reconciler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub project_id: String,
    /// Merchant-supplied reference (invoice number etc.), not unique
    pub external_id: String,
    /// Generated order id on the gateway side, unique and never reused
    pub gateway_order_id: String,
    pub method: String,
    pub status: TransactionStatus,
    /// Gross amount in minor units, immutable after creation
    pub amount: i64,
    /// Derived fee, recomputed on every sync
    pub fee: i64,
    pub total_payment: i64,
    /// Opaque instrument data (VA number etc.) as last reported
    pub payment_number: Option<String>,
    pub expired_at: Option<i64>,
    pub paid_at: Option<i64>,
    /// Raw status string as the gateway reported it
    pub gateway_status: Option<String>,
    pub gateway_completed_at: Option<i64>,
    /// Full raw gateway payload (JSON text), retained for audit/debug
    pub gateway_raw: Option<String>,
    /// Optimistic concurrency counter; bumped on every reconciliation write
    pub version: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Transaction {
    /// Gross received amount: gateway-reported total when present, else the
    /// original amount.
    pub fn gross_received(&self) -> i64 {
        if self.total_payment > 0 {
            self.total_payment
        } else {
            self.amount
        }
    }
}

/// Lifecycle state of a transaction.
///
/// Transitions only `pending` -> {`paid`, `failed`, `expired`}; the terminal
/// states never transition again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Paid,
    Failed,
    Expired,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Failed => "failed",
            Self::Expired => "expired",
        }
    }

    /// Terminal states trigger merchant webhooks and never transition again.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::str::FromStr for TransactionStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "failed" => Ok(Self::Failed),
            "expired" => Ok(Self::Expired),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Data required to create a new transaction row
#[derive(Debug, Clone)]
pub struct CreateTransaction {
    pub project_id: String,
    pub external_id: String,
    pub gateway_order_id: String,
    pub method: String,
    pub status: TransactionStatus,
    pub amount: i64,
    pub fee: i64,
    pub total_payment: i64,
    pub payment_number: Option<String>,
    pub expired_at: Option<i64>,
    pub paid_at: Option<i64>,
    pub gateway_status: Option<String>,
    pub gateway_completed_at: Option<i64>,
    pub gateway_raw: Option<String>,
}
