//! Position (invoice approval) record
//!
//! Lifecycle:
//!
//! ```text
//! approve ──► Approved ──fund──► Funded ──reconcile / unfactor──► (removed)
//!                                   │
//!                                   └──impair──► Impaired ──reconcile──► (removed)
//! ```
//!
//! Amounts are zero until funding. Once funded, the daily rate and amounts
//! never change; only the position's membership in the aggregates does.
//!
//! CRITICAL: All money values are i64 (smallest asset unit)

use serde::{Deserialize, Serialize};

use crate::fees::{FeeSnapshot, FeeTerms};
use crate::providers::InvoiceId;

/// Where a position is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    /// Approved by the underwriter, not yet funded
    Approved,
    /// Funded and counted in the accrual tracker and capital ledger
    Funded,
    /// Written down after the impairment date; out of the aggregates
    Impaired,
}

/// Approval and funding record of one invoice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub invoice_id: InvoiceId,
    pub status: PositionStatus,
    /// Timestamp of approval; the approval expires `approval_duration` later
    pub approved_at: u64,
    /// Invoice creditor at approval time (stale-snapshot check at funding)
    pub creditor: String,
    /// Who received the advance
    pub receiver: Option<String>,
    pub due_date: u64,
    /// Due date + impairment grace period
    pub impairment_date: u64,
    pub funded_at: Option<u64>,
    pub gross_funded: i64,
    pub net_funded: i64,
    /// Face value the position is priced on (override or outstanding amount)
    pub initial_face_value: i64,
    /// Invoice paid amount at approval time
    pub initial_paid: i64,
    pub protocol_fee: i64,
    pub fee_terms: FeeTerms,
    /// Scaled daily interest rate, fixed at funding
    pub daily_rate: i128,
}

impl Position {
    /// Create an unfunded approval
    #[allow(clippy::too_many_arguments)]
    pub fn approved(
        invoice_id: InvoiceId,
        approved_at: u64,
        creditor: String,
        due_date: u64,
        impairment_grace_period: u64,
        initial_face_value: i64,
        initial_paid: i64,
        fee_terms: FeeTerms,
    ) -> Self {
        Self {
            invoice_id,
            status: PositionStatus::Approved,
            approved_at,
            creditor,
            receiver: None,
            due_date,
            impairment_date: due_date.saturating_add(impairment_grace_period),
            funded_at: None,
            gross_funded: 0,
            net_funded: 0,
            initial_face_value,
            initial_paid,
            protocol_fee: 0,
            fee_terms,
            daily_rate: 0,
        }
    }

    pub fn is_funded(&self) -> bool {
        self.status == PositionStatus::Funded
    }

    pub fn is_impaired(&self) -> bool {
        self.status == PositionStatus::Impaired
    }

    /// Seconds elapsed since funding (0 if unfunded)
    pub fn elapsed_since_funding(&self, now: u64) -> u64 {
        self.funded_at.map_or(0, |t| now.saturating_sub(t))
    }

    /// Amounts the waterfall is computed against, given the invoice's current face value
    pub fn fee_snapshot(&self, invoice_amount: i64) -> FeeSnapshot {
        FeeSnapshot {
            invoice_amount,
            initial_paid: self.initial_paid,
            initial_face_value: self.initial_face_value,
            net_funded: self.net_funded,
            protocol_fee: self.protocol_fee,
        }
    }

    /// Gross advance plus protocol fee: what the position reserves in the ledger
    pub fn capital_reserved(&self) -> i64 {
        self.gross_funded + self.protocol_fee
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terms() -> FeeTerms {
        FeeTerms {
            target_yield_bps: 500,
            spread_bps: 200,
            admin_fee_bps: 50,
            protocol_fee_bps: 25,
            upfront_bps: 8_000,
        }
    }

    #[test]
    fn test_new_approval_is_unfunded() {
        let p = Position::approved(1, 100, "creditor".into(), 1_000, 50, 10_000, 0, terms());
        assert_eq!(p.status, PositionStatus::Approved);
        assert_eq!(p.impairment_date, 1_050);
        assert_eq!(p.elapsed_since_funding(500), 0);
        assert_eq!(p.capital_reserved(), 0);
    }
}
