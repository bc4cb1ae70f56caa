use serde::{Deserialize, Serialize};

/// A merchant payout request. Reserves withdrawable balance while open.
#[derive(Debug, Clone, Serialize)]
pub struct Withdrawal {
    pub id: String,
    pub project_id: String,
    pub status: WithdrawalStatus,
    pub amount_gross: i64,
    pub amount_fee: i64,
    pub amount_net: i64,
    /// Payout destination snapshot taken at request time
    pub payout_bank_name: String,
    pub payout_account_name: String,
    pub payout_account_number: String,
    pub note: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalStatus {
    Pending,
    Processing,
    Completed,
    Rejected,
}

impl WithdrawalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Rejected => "rejected",
        }
    }

    /// Every status except `rejected` keeps the gross amount reserved
    /// against the withdrawable balance.
    pub fn reserves_balance(&self) -> bool {
        !matches!(self, Self::Rejected)
    }
}

impl std::str::FromStr for WithdrawalStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "rejected" => Ok(Self::Rejected),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for WithdrawalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Data required to create a withdrawal request
#[derive(Debug, Clone)]
pub struct CreateWithdrawal {
    pub project_id: String,
    pub amount_gross: i64,
    pub amount_fee: i64,
    pub amount_net: i64,
    pub payout_bank_name: String,
    pub payout_account_name: String,
    pub payout_account_number: String,
    pub note: Option<String>,
}
