//! EPC069-12 ("GiroCode") payload encoding for SEPA credit transfers.

use paygate_application::PaymentPayloadBuilder;
use paygate_core::{AppError, AppResult};
use paygate_domain::{Money, PaymentPayload, PaymentReference, ReceivingAccount};

const SERVICE_TAG: &str = "BCD";
const VERSION: &str = "002";
const CHARACTER_SET_UTF8: &str = "1";
const IDENTIFICATION: &str = "SCT";
const MAX_BENEFICIARY_NAME_CHARS: usize = 70;
const MAX_AMOUNT_MINOR: i64 = 99_999_999_999;

/// Builds EPC QR payloads carrying the payment reference as unstructured remittance.
#[derive(Debug, Clone, Copy, Default)]
pub struct EpcQrPayloadBuilder;

impl EpcQrPayloadBuilder {
    /// Creates a payload builder.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl PaymentPayloadBuilder for EpcQrPayloadBuilder {
    fn build_payload(
        &self,
        amount: &Money,
        reference: &PaymentReference,
        receiving_account: &ReceivingAccount,
    ) -> AppResult<PaymentPayload> {
        if amount.currency().as_str() != "EUR" {
            return Err(AppError::Validation(format!(
                "EPC QR payloads only support EUR, got {}",
                amount.currency()
            )));
        }
        if amount.amount_minor() > MAX_AMOUNT_MINOR {
            return Err(AppError::Validation(format!(
                "amount {amount} exceeds the EPC QR maximum"
            )));
        }

        let beneficiary_name: String = receiving_account
            .beneficiary_name()
            .chars()
            .take(MAX_BENEFICIARY_NAME_CHARS)
            .collect();
        let amount_field = format!(
            "EUR{}.{:02}",
            amount.amount_minor() / 100,
            amount.amount_minor() % 100
        );

        let lines = [
            SERVICE_TAG,
            VERSION,
            CHARACTER_SET_UTF8,
            IDENTIFICATION,
            receiving_account.bic().unwrap_or_default(),
            beneficiary_name.as_str(),
            receiving_account.iban(),
            amount_field.as_str(),
            // purpose code
            "",
            // structured creditor reference
            "",
            reference.as_str(),
        ];

        Ok(PaymentPayload::new(lines.join("\n")))
    }
}
