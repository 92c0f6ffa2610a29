//! Deterministic keyword extraction over the freeform reason text.
//!
//! Natural-language understanding proper is out of scope; this is the
//! pluggable seam for it. The keyword classifier fills in severity and cost
//! hints the submitter left unstructured, and nothing it produces can
//! overrule a structured field.

use rust_decimal::Decimal;

use cityhall_core::domain::request::{ActionRequest, Severity};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestIntent {
    pub severity_hint: Option<Severity>,
    pub cost_hint: Option<Decimal>,
    pub matched_phrases: Vec<String>,
    pub confidence_score: u8,
}

pub trait IntentClassifier: Send + Sync {
    fn classify(&self, text: &str) -> RequestIntent;
}

#[derive(Clone, Debug, Default)]
pub struct KeywordIntentClassifier;

impl KeywordIntentClassifier {
    pub fn new() -> Self {
        Self
    }
}

impl IntentClassifier for KeywordIntentClassifier {
    fn classify(&self, text: &str) -> RequestIntent {
        let normalized_text = normalize_text(text);
        let tokens = tokenize(&normalized_text);

        let mut matched_phrases = Vec::new();

        let emergency = EMERGENCY_PHRASES
            .iter()
            .filter(|phrase| normalized_text.contains(*phrase))
            .map(|phrase| (*phrase).to_string())
            .collect::<Vec<_>>();
        let elevated = ELEVATED_PHRASES
            .iter()
            .filter(|phrase| normalized_text.contains(*phrase))
            .map(|phrase| (*phrase).to_string())
            .collect::<Vec<_>>();

        let severity_hint = if !emergency.is_empty() {
            Some(Severity::Emergency)
        } else if !elevated.is_empty() {
            Some(Severity::Elevated)
        } else {
            None
        };
        matched_phrases.extend(emergency);
        matched_phrases.extend(elevated);

        let cost_hint = extract_cost(&tokens);

        let confidence_score = confidence_score(
            severity_hint.is_some(),
            cost_hint.is_some(),
            !matched_phrases.is_empty(),
        );

        RequestIntent { severity_hint, cost_hint, matched_phrases, confidence_score }
    }
}

/// Fill unset structured fields from extracted hints. Structured input
/// always wins over anything mined from text.
pub fn enrich_request(mut request: ActionRequest, intent: &RequestIntent) -> ActionRequest {
    if request.severity.is_none() {
        request.severity = intent.severity_hint;
    }
    if request.estimated_cost.is_none() {
        request.estimated_cost = intent.cost_hint;
    }
    request
}

const EMERGENCY_PHRASES: &[&str] = &[
    "burst",
    "flooding",
    "gas leak",
    "collapse",
    "contamination",
    "structure fire",
    "life safety",
    "emergency",
];

const ELEVATED_PHRASES: &[&str] = &[
    "major leak",
    "major",
    "urgent",
    "overflowing",
    "outage",
    "backed up",
    "hazard",
];

fn normalize_text(text: &str) -> String {
    text.to_ascii_lowercase()
}

fn tokenize(text: &str) -> Vec<String> {
    let mut sanitized = String::with_capacity(text.len());
    for character in text.chars() {
        if character.is_ascii_alphanumeric() || matches!(character, '$' | '.' | 'k' | 'm') {
            sanitized.push(character);
        } else {
            sanitized.push(' ');
        }
    }
    sanitized.split_whitespace().map(|token| token.to_string()).collect()
}

fn extract_cost(tokens: &[String]) -> Option<Decimal> {
    let cost_context = ["cost", "costs", "estimate", "estimated", "around", "about", "roughly"];
    for (index, token) in tokens.iter().enumerate() {
        let in_context = index > 0 && cost_context.contains(&tokens[index - 1].as_str());
        if token.starts_with('$') || in_context {
            if let Some(amount) = parse_money_token(token) {
                return Some(amount);
            }
        }
    }
    None
}

fn parse_money_token(token: &str) -> Option<Decimal> {
    let trimmed = token.trim_start_matches('$').trim_end_matches(',');
    if trimmed.is_empty() {
        return None;
    }

    let (number_part, multiplier) = if let Some(prefix) = trimmed.strip_suffix('k') {
        (prefix, Decimal::new(1_000, 0))
    } else if let Some(prefix) = trimmed.strip_suffix('m') {
        (prefix, Decimal::new(1_000_000, 0))
    } else {
        (trimmed, Decimal::ONE)
    };

    let amount = number_part.parse::<Decimal>().ok()?;
    if amount <= Decimal::ZERO {
        return None;
    }
    Some(amount * multiplier)
}

fn confidence_score(has_severity: bool, has_cost: bool, has_phrases: bool) -> u8 {
    let mut score = 20u8;
    if has_severity {
        score += 35;
    }
    if has_cost {
        score += 30;
    }
    if has_phrases {
        score += 15;
    }
    score.min(100)
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use cityhall_core::domain::department::Department;
    use cityhall_core::domain::request::{ActionRequest, RequestKind, Severity};

    use super::{enrich_request, IntentClassifier, KeywordIntentClassifier};

    fn classifier() -> KeywordIntentClassifier {
        KeywordIntentClassifier::new()
    }

    #[test]
    fn burst_main_reads_as_emergency() {
        let intent = classifier().classify("Water main burst near the school, street flooding");
        assert_eq!(intent.severity_hint, Some(Severity::Emergency));
        assert!(intent.confidence_score >= 50);
    }

    #[test]
    fn major_leak_reads_as_elevated() {
        let intent = classifier().classify("Major leak at the Elm Street crossing");
        assert_eq!(intent.severity_hint, Some(Severity::Elevated));
    }

    #[test]
    fn dollar_amounts_parse_with_suffixes() {
        let intent = classifier().classify("Resurfacing project, estimated $85k");
        assert_eq!(intent.cost_hint, Some(Decimal::new(85_000, 0)));

        let plain = classifier().classify("repair cost 12000 per the crew estimate");
        assert_eq!(plain.cost_hint, Some(Decimal::new(12_000, 0)));
    }

    #[test]
    fn bland_text_produces_no_hints() {
        let intent = classifier().classify("please schedule the quarterly review");
        assert_eq!(intent.severity_hint, None);
        assert_eq!(intent.cost_hint, None);
        assert!(intent.matched_phrases.is_empty());
    }

    #[test]
    fn enrichment_never_overrides_structured_fields() {
        let request = ActionRequest {
            department: Department::Water,
            kind: RequestKind::LeakRepair,
            reason: "burst main, estimate $90k".to_string(),
            location: "Zone-A".to_string(),
            severity: Some(Severity::Routine),
            estimated_cost: Some(Decimal::new(10_000, 0)),
            requested_window: None,
            has_permit: false,
        };
        let intent = classifier().classify(&request.reason);

        let enriched = enrich_request(request.clone(), &intent);
        assert_eq!(enriched.severity, Some(Severity::Routine));
        assert_eq!(enriched.estimated_cost, Some(Decimal::new(10_000, 0)));

        let mut blank = request;
        blank.severity = None;
        blank.estimated_cost = None;
        let enriched_blank = enrich_request(blank, &intent);
        assert_eq!(enriched_blank.severity, Some(Severity::Emergency));
        assert_eq!(enriched_blank.estimated_cost, Some(Decimal::new(90_000, 0)));
    }
}
