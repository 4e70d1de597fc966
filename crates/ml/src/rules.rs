use teller_core::IntentLabel;

enum Matcher {
    Contains(&'static [&'static str]),
    FirstWord(&'static [&'static str]),
}

struct Rule {
    label: IntentLabel,
    matcher: Matcher,
}

// First match wins; complaint phrasings go ahead of the bare transfer command.
static RULES: &[Rule] = &[
    Rule {
        label: IntentLabel::LostOrStolenCard,
        matcher: Matcher::Contains(&[
            "lost my card",
            "lost card",
            "stolen card",
            "card was stolen",
            "card stolen",
            "stole my card",
            "can't find my card",
            "cannot find my card",
        ]),
    },
    Rule {
        label: IntentLabel::LostOrStolenPhone,
        matcher: Matcher::Contains(&[
            "lost my phone",
            "phone was stolen",
            "stolen phone",
            "stole my phone",
        ]),
    },
    Rule {
        label: IntentLabel::CompromisedCard,
        matcher: Matcher::Contains(&["card compromised", "compromised card", "card details leaked"]),
    },
    Rule {
        label: IntentLabel::BalanceNotUpdatedAfterBankTransfer,
        matcher: Matcher::Contains(&[
            "balance not updated",
            "balance wasn't updated",
            "balance hasn't updated",
            "balance didn't update",
            "balance has not updated",
        ]),
    },
    Rule {
        label: IntentLabel::TransferFeeCharged,
        matcher: Matcher::Contains(&["transfer fee", "fee for transfer", "charged for a transfer"]),
    },
    Rule {
        label: IntentLabel::TransactionChargedTwice,
        matcher: Matcher::Contains(&["charged twice", "double charged", "duplicate charge"]),
    },
    Rule {
        label: IntentLabel::TopUpByBankTransferCharge,
        matcher: Matcher::Contains(&["top up by bank transfer", "top-up by bank transfer"]),
    },
    Rule {
        label: IntentLabel::TransferTiming,
        matcher: Matcher::Contains(&["how long does a transfer", "how long do transfers", "transfer take"]),
    },
    Rule {
        label: IntentLabel::ApplePayOrGooglePay,
        matcher: Matcher::Contains(&["apple pay", "google pay"]),
    },
    Rule {
        label: IntentLabel::TransferIntoAccount,
        matcher: Matcher::FirstWord(&["transfer", "send", "pay", "wire"]),
    },
    Rule {
        label: IntentLabel::TransferIntoAccount,
        matcher: Matcher::Contains(&["send money", "transfer money", "wire money"]),
    },
    Rule {
        label: IntentLabel::ChangePin,
        matcher: Matcher::Contains(&["change pin", "change my pin", "new pin"]),
    },
    Rule {
        label: IntentLabel::PinBlocked,
        matcher: Matcher::Contains(&["pin blocked", "pin is blocked", "pin locked"]),
    },
    Rule {
        label: IntentLabel::CardArrival,
        matcher: Matcher::Contains(&["card arrive", "card delivery", "card hasn't arrived", "when will my card"]),
    },
    Rule {
        label: IntentLabel::ExchangeRate,
        matcher: Matcher::Contains(&["exchange rate", "conversion rate"]),
    },
    Rule {
        label: IntentLabel::CashWithdrawalCharge,
        matcher: Matcher::Contains(&["withdrawal fee", "withdrawal charge", "atm fee"]),
    },
    Rule {
        label: IntentLabel::AtmSupport,
        matcher: Matcher::Contains(&["atm", "cash machine"]),
    },
    Rule {
        label: IntentLabel::TopUpLimits,
        matcher: Matcher::Contains(&["top up limit", "top-up limit", "maximum top up"]),
    },
    Rule {
        label: IntentLabel::TerminateAccount,
        matcher: Matcher::Contains(&["close my account", "delete my account", "terminate my account"]),
    },
    Rule {
        label: IntentLabel::VerifyMyIdentity,
        matcher: Matcher::Contains(&["verify my identity", "identity verification", "verify identity"]),
    },
    Rule {
        label: IntentLabel::AgeLimit,
        matcher: Matcher::Contains(&["age limit", "how old", "minimum age"]),
    },
    Rule {
        label: IntentLabel::CountrySupport,
        matcher: Matcher::Contains(&["which countries", "supported countries", "country support"]),
    },
    Rule {
        label: IntentLabel::RequestRefund,
        matcher: Matcher::Contains(&["refund"]),
    },
];

/// Keyword fallback used when no trained dataset is available.
pub fn classify_intent_rules(text: &str) -> Option<IntentLabel> {
    let lower = text.to_lowercase();
    let first_word = lower
        .split_whitespace()
        .next()
        .map(|word| word.trim_matches(|ch: char| !ch.is_alphanumeric()))
        .unwrap_or_default();

    RULES
        .iter()
        .find(|rule| match rule.matcher {
            Matcher::Contains(needles) => contains_any(&lower, needles),
            Matcher::FirstWord(words) => words.contains(&first_word),
        })
        .map(|rule| rule.label.clone())
}

// Needles must start on a word boundary, so "atm" does not fire inside "treatment".
fn contains_any(input: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| {
        input.match_indices(needle).any(|(start, _)| {
            input[..start]
                .chars()
                .next_back()
                .map_or(true, |prev| !prev.is_alphanumeric())
        })
    })
}
