use paygate_core::AppResult;
use paygate_domain::{Money, PaymentPayload, PaymentReference, ReceivingAccount};

/// Pure encoder of the payment payload shown to the payer (QR content).
pub trait PaymentPayloadBuilder: Send + Sync {
    /// Encodes amount, reference and receiving account into an opaque payload.
    fn build_payload(
        &self,
        amount: &Money,
        reference: &PaymentReference,
        receiving_account: &ReceivingAccount,
    ) -> AppResult<PaymentPayload>;
}
