use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! intent_labels {
    ($($variant:ident => $label:literal),+ $(,)?) => {
        /// Banking intent labels as produced by the upstream classifier.
        ///
        /// Labels outside the known set are kept verbatim in `Unrecognized` so a
        /// newer classifier can emit them without breaking routing; they classify
        /// as informational unless a registry entry says otherwise.
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(from = "String", into = "String")]
        pub enum IntentLabel {
            $($variant,)+
            Unrecognized(String),
        }

        impl IntentLabel {
            pub const KNOWN_LABELS: &'static [&'static str] = &[$($label,)+];

            pub fn as_str(&self) -> &str {
                match self {
                    $(Self::$variant => $label,)+
                    Self::Unrecognized(raw) => raw.as_str(),
                }
            }

            pub fn parse(value: &str) -> Self {
                let trimmed = value.trim();
                $(
                    if trimmed.eq_ignore_ascii_case($label) {
                        return Self::$variant;
                    }
                )+
                Self::Unrecognized(trimmed.to_string())
            }

            pub fn is_known(&self) -> bool {
                !matches!(self, Self::Unrecognized(_))
            }
        }
    };
}

intent_labels! {
    ActivateMyCard => "activate_my_card",
    AgeLimit => "age_limit",
    ApplePayOrGooglePay => "apple_pay_or_google_pay",
    AtmSupport => "atm_support",
    AutomaticTopUp => "automatic_top_up",
    BalanceNotUpdatedAfterBankTransfer => "balance_not_updated_after_bank_transfer",
    BalanceNotUpdatedAfterChequeOrCashDeposit => "balance_not_updated_after_cheque_or_cash_deposit",
    BeneficiaryNotAllowed => "beneficiary_not_allowed",
    CancelTransfer => "cancel_transfer",
    CardAboutToExpire => "card_about_to_expire",
    CardAcceptance => "card_acceptance",
    CardArrival => "card_arrival",
    CardDeliveryEstimate => "card_delivery_estimate",
    CardLinking => "card_linking",
    CardNotWorking => "card_not_working",
    CardPaymentFeeCharged => "card_payment_fee_charged",
    CardPaymentNotRecognised => "card_payment_not_recognised",
    CardPaymentWrongExchangeRate => "card_payment_wrong_exchange_rate",
    CardSwallowed => "card_swallowed",
    CashWithdrawalCharge => "cash_withdrawal_charge",
    CashWithdrawalNotRecognised => "cash_withdrawal_not_recognised",
    ChangePin => "change_pin",
    CompromisedCard => "compromised_card",
    ContactlessNotWorking => "contactless_not_working",
    CountrySupport => "country_support",
    DeclinedCardPayment => "declined_card_payment",
    DeclinedCashWithdrawal => "declined_cash_withdrawal",
    DeclinedTransfer => "declined_transfer",
    DirectDebitPaymentNotRecognised => "direct_debit_payment_not_recognised",
    DisposableCardLimits => "disposable_card_limits",
    EditPersonalDetails => "edit_personal_details",
    ExchangeCharge => "exchange_charge",
    ExchangeRate => "exchange_rate",
    ExchangeViaApp => "exchange_via_app",
    ExtraChargeOnStatement => "extra_charge_on_statement",
    FailedTransfer => "failed_transfer",
    FiatCurrencySupport => "fiat_currency_support",
    GetDisposableVirtualCard => "get_disposable_virtual_card",
    GetPhysicalCard => "get_physical_card",
    GettingSpareCard => "getting_spare_card",
    GettingVirtualCard => "getting_virtual_card",
    LostOrStolenCard => "lost_or_stolen_card",
    LostOrStolenPhone => "lost_or_stolen_phone",
    OrderPhysicalCard => "order_physical_card",
    PasscodeForgotten => "passcode_forgotten",
    PendingCardPayment => "pending_card_payment",
    PendingCashWithdrawal => "pending_cash_withdrawal",
    PendingTopUp => "pending_top_up",
    PendingTransfer => "pending_transfer",
    PinBlocked => "pin_blocked",
    ReceivingMoney => "receiving_money",
    RefundNotShowingUp => "Refund_not_showing_up",
    RequestRefund => "request_refund",
    RevertedCardPayment => "reverted_card_payment",
    SupportedCardsAndCurrencies => "supported_cards_and_currencies",
    TerminateAccount => "terminate_account",
    TopUpByBankTransferCharge => "top_up_by_bank_transfer_charge",
    TopUpByCardCharge => "top_up_by_card_charge",
    TopUpByCashOrCheque => "top_up_by_cash_or_cheque",
    TopUpFailed => "top_up_failed",
    TopUpLimits => "top_up_limits",
    TopUpReverted => "top_up_reverted",
    ToppingUpByCard => "topping_up_by_card",
    TransactionChargedTwice => "transaction_charged_twice",
    TransferFeeCharged => "transfer_fee_charged",
    TransferIntoAccount => "transfer_into_account",
    TransferNotReceivedByRecipient => "transfer_not_received_by_recipient",
    TransferTiming => "transfer_timing",
    UnableToVerifyIdentity => "unable_to_verify_identity",
    VerifyMyIdentity => "verify_my_identity",
    VerifySourceOfFunds => "verify_source_of_funds",
    VerifyTopUp => "verify_top_up",
    VirtualCardNotWorking => "virtual_card_not_working",
    VisaOrMastercard => "visa_or_mastercard",
    WhyVerifyIdentity => "why_verify_identity",
    WrongAmountOfCashReceived => "wrong_amount_of_cash_received",
    WrongExchangeRateForCashWithdrawal => "wrong_exchange_rate_for_cash_withdrawal",
}

impl From<String> for IntentLabel {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<&str> for IntentLabel {
    fn from(value: &str) -> Self {
        Self::parse(value)
    }
}

impl From<IntentLabel> for String {
    fn from(value: IntentLabel) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for IntentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn normalize_text(input: &str) -> String {
    input
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}
