use crate::error::RoutingError;
use crate::models::{
    MissingField, Outcome, ResponseEnvelope, ResponseStatus, RouterDecision, SideEffects,
};
use crate::money::format_money;

pub const SECURITY_ALERT_MESSAGE: &str =
    "SECURITY ALERT: I have temporarily frozen your account to prevent fraud.";
pub const NO_INFORMATION_MESSAGE: &str =
    "I checked the policy documents but found no specific answer.";
pub const SERVICE_UNAVAILABLE_MESSAGE: &str =
    "The assistant is temporarily unavailable. No changes were made to your account; please try again shortly.";

pub fn compose_envelope(decision: RouterDecision) -> ResponseEnvelope {
    let (status, message, side_effects) = match &decision.outcome {
        Outcome::Frozen { .. } => (
            ResponseStatus::Ok,
            SECURITY_ALERT_MESSAGE.to_string(),
            SideEffects {
                frozen: Some(true),
                transaction: None,
            },
        ),
        Outcome::Committed { transaction } => (
            ResponseStatus::Ok,
            format!(
                "Transfer complete: sent {} to {}. New balance: {}.",
                format_money(transaction.amount),
                transaction.counterparty,
                format_money(transaction.balance_after)
            ),
            SideEffects {
                frozen: None,
                transaction: Some(transaction.clone()),
            },
        ),
        Outcome::Answered { chunk } => (
            ResponseStatus::Ok,
            format!("Policy info: {}", chunk.chunk),
            SideEffects::default(),
        ),
        Outcome::Declined { error } => (
            error.status(),
            decline_message(error),
            SideEffects {
                frozen: None,
                transaction: error.transaction().cloned(),
            },
        ),
    };

    ResponseEnvelope {
        status,
        message,
        side_effects,
        decision,
    }
}

pub fn decline_message(error: &RoutingError) -> String {
    match error {
        RoutingError::MissingEntity {
            missing,
            recipient,
            balance,
        } => missing_entity_message(missing, recipient.as_deref(), *balance),
        RoutingError::InsufficientFunds {
            balance, requested, ..
        } => format!(
            "Insufficient funds. Your balance is {}, which does not cover {}.",
            format_money(*balance),
            format_money(*requested)
        ),
        RoutingError::LowConfidenceRetrieval { .. } => NO_INFORMATION_MESSAGE.to_string(),
        RoutingError::AdapterTimeout { .. } | RoutingError::AdapterFailure { .. } => {
            SERVICE_UNAVAILABLE_MESSAGE.to_string()
        }
        RoutingError::ConcurrencyConflict { .. } => {
            "Another operation on this account was in progress and nothing was changed. Please retry."
                .to_string()
        }
        RoutingError::AccountFrozen { .. } => {
            "Your account is frozen for your protection, so transfers are disabled. Please contact support."
                .to_string()
        }
        RoutingError::AccountNotFound { account_id } => {
            format!("No account named '{account_id}' exists.")
        }
        RoutingError::InvalidAmount { amount } => format!(
            "{amount} is not a valid transfer amount. Use a positive value with at most two decimal places."
        ),
        RoutingError::Storage { .. } => {
            "Something went wrong while recording your request. No changes were made.".to_string()
        }
    }
}

fn missing_entity_message(
    missing: &[MissingField],
    recipient: Option<&str>,
    balance: Option<rust_decimal::Decimal>,
) -> String {
    let balance_note = balance
        .map(|value| format!(" Current balance: {}.", format_money(value)))
        .unwrap_or_default();

    let needs_recipient = missing.contains(&MissingField::Recipient);
    let needs_amount = missing.contains(&MissingField::Amount);

    match (needs_recipient, needs_amount, recipient) {
        (false, true, Some(name)) => format!(
            "I can help transfer funds to {name}. Please specify an amount (e.g., $500).{balance_note}"
        ),
        (true, false, _) => format!(
            "Who should receive this transfer? Please name the recipient.{balance_note}"
        ),
        _ => format!(
            "To make a transfer, tell me who should receive it and how much to send (e.g., \"send $500 to John\").{balance_note}"
        ),
    }
}
