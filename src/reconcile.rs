//! Transaction reconciliation against the gateway.
//!
//! Merchant-initiated sync, the gateway push callback, and the background
//! poller all converge on [`reconcile_transaction`]; no trigger can produce
//! divergent behavior. The write is guarded by an optimistic version check
//! so concurrent reconciliations of the same transaction cannot double-fire
//! the terminal-state webhook.

use crate::db::{queries, AppState};
use crate::error::Result;
use crate::fees;
use crate::models::{Transaction, TransactionStatus};

/// Pull current gateway truth for a transaction and apply it locally.
///
/// Returns None when the transaction does not exist. On success the updated
/// row is returned; if the status moved to a terminal value, the merchant
/// webhook is delivered before returning (the dispatcher's internal retry is
/// invisible to the caller). A failed gateway read leaves the prior
/// persisted state untouched.
pub async fn reconcile_transaction(
    state: &AppState,
    transaction_id: &str,
) -> Result<Option<Transaction>> {
    let transaction = {
        let conn = state.db.get()?;
        match queries::get_transaction_by_id(&conn, transaction_id)? {
            Some(t) => t,
            None => return Ok(None),
        }
    };

    let detail = state
        .gateway
        .fetch_detail(transaction.amount, &transaction.gateway_order_id)
        .await?;

    // The fee contract is ours, not the gateway's: always recompute from the
    // stored method and amount.
    let fee = fees::total_fee(&transaction.method, transaction.amount);

    let previous_status = transaction.status;
    let updated = {
        let conn = state.db.get()?;
        match queries::apply_reconciliation(&conn, &transaction, &detail, fee)? {
            Some(updated) => updated,
            None => {
                // Lost the version race: another reconciliation applied its
                // gateway read first. Surface that state without firing
                // side effects of our own.
                tracing::debug!(
                    transaction_id = %transaction.id,
                    "Reconciliation raced; returning current row"
                );
                return queries::get_transaction_by_id(&conn, transaction_id);
            }
        }
    };

    if previous_status != updated.status && updated.status.is_terminal() {
        if updated.status == TransactionStatus::Paid {
            let split = fees::split_revenue(updated.fee, state.platform_fee);
            tracing::info!(
                transaction_id = %updated.id,
                fee = updated.fee,
                platform_share = split.platform_share,
                provider_share = split.provider_share,
                "Transaction settled"
            );
        }

        let project = {
            let conn = state.db.get()?;
            queries::get_project_by_id(&conn, &updated.project_id)?
        };
        match project {
            Some(project) => {
                state.webhooks.deliver(&state.db, &project, &updated).await;
            }
            None => {
                tracing::error!(
                    project_id = %updated.project_id,
                    "Transaction references missing project; webhook skipped"
                );
            }
        }
    }

    Ok(Some(updated))
}
