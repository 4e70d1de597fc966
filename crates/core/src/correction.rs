use std::collections::HashSet;

use crate::intent::IntentLabel;
use crate::models::{EntityKind, EntityMention, IntentPrediction};

/// Complaint-style labels the upstream classifier confuses with an actual
/// transfer command.
pub const DEFAULT_AMBIGUOUS_LABELS: &[IntentLabel] = &[
    IntentLabel::BalanceNotUpdatedAfterBankTransfer,
    IntentLabel::TopUpByBankTransferCharge,
    IntentLabel::TransferFeeCharged,
    IntentLabel::TransactionChargedTwice,
];

pub const DEFAULT_COMMAND_PREFIXES: &[&str] = &["transfer", "send", "pay"];

/// Evidence-driven override from an ambiguous label to the canonical transfer
/// label. Confidence is carried through untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrectionHeuristic {
    ambiguous: HashSet<IntentLabel>,
    canonical: IntentLabel,
    command_prefixes: Vec<String>,
}

impl Default for CorrectionHeuristic {
    fn default() -> Self {
        Self::new(
            DEFAULT_AMBIGUOUS_LABELS.iter().cloned(),
            IntentLabel::TransferIntoAccount,
            DEFAULT_COMMAND_PREFIXES.iter().map(|prefix| prefix.to_string()),
        )
    }
}

impl CorrectionHeuristic {
    pub fn new(
        ambiguous: impl IntoIterator<Item = IntentLabel>,
        canonical: IntentLabel,
        command_prefixes: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            ambiguous: ambiguous.into_iter().collect(),
            canonical,
            command_prefixes: command_prefixes
                .into_iter()
                .map(|prefix| prefix.trim().to_lowercase())
                .filter(|prefix| !prefix.is_empty())
                .collect(),
        }
    }

    pub fn canonical(&self) -> &IntentLabel {
        &self.canonical
    }

    pub fn is_ambiguous(&self, label: &IntentLabel) -> bool {
        self.ambiguous.contains(label)
    }

    pub fn ambiguous_labels(&self) -> impl Iterator<Item = &IntentLabel> {
        self.ambiguous.iter()
    }

    pub fn command_prefixes(&self) -> &[String] {
        &self.command_prefixes
    }

    pub fn correct(&self, intent: &IntentPrediction, entities: &[EntityMention]) -> IntentPrediction {
        if self.is_ambiguous(&intent.label) && has_person(entities) {
            return intent.with_label(self.canonical.clone());
        }
        intent.clone()
    }

    /// Like [`correct`](Self::correct), but an imperative first word such as
    /// "send" also counts as evidence. Only ambiguous labels are ever rewritten.
    pub fn correct_with_text(
        &self,
        intent: &IntentPrediction,
        entities: &[EntityMention],
        text: &str,
    ) -> IntentPrediction {
        if !self.is_ambiguous(&intent.label) {
            return intent.clone();
        }
        if has_person(entities) || self.starts_with_command(text) {
            return intent.with_label(self.canonical.clone());
        }
        intent.clone()
    }

    fn starts_with_command(&self, text: &str) -> bool {
        let Some(first) = text.split_whitespace().next() else {
            return false;
        };
        let first = first
            .trim_matches(|ch: char| !ch.is_alphanumeric())
            .to_lowercase();
        self.command_prefixes.iter().any(|prefix| *prefix == first)
    }
}

fn has_person(entities: &[EntityMention]) -> bool {
    entities.iter().any(|entity| entity.kind == EntityKind::Person)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prediction(label: IntentLabel, confidence: f32) -> IntentPrediction {
        IntentPrediction::new(label, confidence)
    }

    #[test]
    fn overrides_every_ambiguous_label_at_any_confidence() {
        let heuristic = CorrectionHeuristic::default();
        let entities = vec![EntityMention::person("David")];

        for label in DEFAULT_AMBIGUOUS_LABELS {
            for confidence in [0.0, 0.12, 0.5, 0.97, 1.0] {
                let corrected = heuristic.correct(&prediction(label.clone(), confidence), &entities);
                assert_eq!(corrected.label, IntentLabel::TransferIntoAccount);
                assert_eq!(corrected.confidence, confidence);
            }
        }
    }

    #[test]
    fn leaves_labels_outside_the_set_alone() {
        let heuristic = CorrectionHeuristic::default();
        let entities = vec![
            EntityMention::person("David"),
            EntityMention::amount("$50", None),
        ];

        for raw in IntentLabel::KNOWN_LABELS {
            let label = IntentLabel::parse(raw);
            if heuristic.is_ambiguous(&label) {
                continue;
            }
            let input = prediction(label.clone(), 0.4);
            assert_eq!(heuristic.correct(&input, &entities).label, label);
            assert_eq!(
                heuristic
                    .correct_with_text(&input, &entities, "send 50 to David")
                    .label,
                label
            );
        }
    }

    #[test]
    fn ambiguous_label_without_person_is_unchanged() {
        let heuristic = CorrectionHeuristic::default();
        let input = prediction(IntentLabel::TransferFeeCharged, 0.9);
        let entities = vec![EntityMention::amount("$12", None)];
        assert_eq!(heuristic.correct(&input, &entities), input);
    }

    #[test]
    fn several_people_still_only_assert_a_correction() {
        let heuristic = CorrectionHeuristic::default();
        let input = prediction(IntentLabel::TransactionChargedTwice, 0.3);
        let entities = vec![EntityMention::person("Ana"), EntityMention::person("Ben")];
        let corrected = heuristic.correct(&input, &entities);
        assert_eq!(corrected.label, IntentLabel::TransferIntoAccount);
    }

    #[test]
    fn explicit_command_counts_as_evidence() {
        let heuristic = CorrectionHeuristic::default();
        let input = prediction(IntentLabel::TopUpByBankTransferCharge, 0.8);

        let corrected = heuristic.correct_with_text(&input, &[], "Send $40 to my landlord");
        assert_eq!(corrected.label, IntentLabel::TransferIntoAccount);

        let untouched = heuristic.correct_with_text(&input, &[], "why was I charged to send money");
        assert_eq!(untouched.label, IntentLabel::TopUpByBankTransferCharge);
    }
}
