use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use super::{require_user, validate_amount};
use super::settlement_service::SettlementService;
use crate::core::errors::{ServiceError, ServiceResult};
use crate::core::locks::EntityLocks;
use crate::core::time::Clock;
use crate::domain::{Money, Payment, Period};
use crate::storage::LedgerRepository;

/// Records repayments against a month's shared-expense debt.
pub struct PaymentService {
    repo: Arc<dyn LedgerRepository>,
    clock: Arc<dyn Clock>,
    settlement: SettlementService,
    periods: EntityLocks<Period>,
}

impl PaymentService {
    pub fn new(repo: Arc<dyn LedgerRepository>, clock: Arc<dyn Clock>) -> Self {
        Self {
            settlement: SettlementService::new(Arc::clone(&repo)),
            repo,
            clock,
            periods: EntityLocks::new(),
        }
    }

    /// Records a payment of at most the debt still open for `period`.
    ///
    /// Input is checked before the month is read: amount, then payer versus
    /// payee, then that both users exist. Only then is an empty debt
    /// reported as [`ServiceError::InvalidState`].
    pub fn add_payment(
        &self,
        period: Period,
        payer_id: Uuid,
        payee_id: Uuid,
        amount: Money,
    ) -> ServiceResult<Payment> {
        validate_amount(amount)?;
        if payer_id == payee_id {
            return Err(ServiceError::InvalidArgument(
                "payer and payee must differ".into(),
            ));
        }
        require_user(self.repo.as_ref(), payer_id)?;
        require_user(self.repo.as_ref(), payee_id)?;

        self.periods.with_lock(period, || {
            let summary = self.settlement.monthly_summary(period, true)?;
            let remaining = summary.remaining_debt;
            if !remaining.is_positive() {
                return Err(ServiceError::InvalidState(format!(
                    "nothing is owed for {period}"
                )));
            }
            if amount > remaining {
                return Err(ServiceError::InvalidArgument(format!(
                    "payment of {amount} exceeds the remaining debt of {remaining}"
                )));
            }
            match summary.settlement {
                Some(open) if open.debtor_id == payer_id && open.creditor_id == payee_id => {}
                _ => {
                    return Err(ServiceError::InvalidArgument(
                        "payments must go from the debtor to the creditor".into(),
                    ))
                }
            }

            let payment = Payment::new(period, payer_id, payee_id, amount, self.clock.now());
            self.repo.create_payment(&payment)?;
            info!(
                payment_id = %payment.id,
                month = period.month(),
                year = period.year(),
                amount = %amount,
                "payment recorded"
            );
            Ok(payment)
        })
    }

    pub fn delete_payment(&self, id: Uuid) -> ServiceResult<()> {
        if !self.repo.delete_payment(id)? {
            return Err(ServiceError::not_found("Payment", id));
        }
        info!(payment_id = %id, "payment deleted");
        Ok(())
    }

    /// Newest first.
    pub fn list_payments(&self, period: Period) -> ServiceResult<Vec<Payment>> {
        Ok(self.repo.find_payments(period)?)
    }
}
