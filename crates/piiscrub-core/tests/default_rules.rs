use piiscrub_core::{anonymize, resolve_spans, Detector, ResolvePolicy, RuleDetector};
use std::path::PathBuf;

fn default_rules() -> RuleDetector {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../rules/default.toml");
    RuleDetector::from_path(&path).unwrap()
}

fn redact(text: &str) -> String {
    let d = default_rules();
    let spans = d.analyze(text, "en", 0.5).unwrap();
    let spans = resolve_spans(text, spans, &ResolvePolicy::default());
    anonymize(text, &spans).result
}

#[test]
fn shipped_rules_all_compile() {
    let d = default_rules();
    assert_eq!(d.rule_count(), 10);
}

#[test]
fn email_and_phone_formats() {
    assert_eq!(redact("Email: john@example.com!"), "Email: <EMAIL_ADDRESS>!");
    assert_eq!(redact("Mobile: 0412 345 678"), "Mobile: <PHONE_NUMBER>");
    assert_eq!(redact("Call 0412345678"), "Call <PHONE_NUMBER>");
    assert_eq!(redact("International: +61 412 345 678"), "International: <PHONE_NUMBER>");
    assert_eq!(redact("Office: (03) 9123 4567"), "Office: <PHONE_NUMBER>");
}

#[test]
fn tax_numbers_keep_their_label() {
    assert_eq!(redact("TFN: 123 456 782"), "TFN: <AU_TFN>");
    assert_eq!(redact("ABN 53 004 085 616"), "ABN <AU_ABN>");
}

#[test]
fn honorific_names_and_states() {
    assert_eq!(redact("Dr. Jane Citizen moved to Queensland"), "Dr. <PERSON> moved to <LOCATION>");
    // 较长的 "South Australia" 优先于 "Australia"
    assert_eq!(redact("Adelaide, South Australia"), "Adelaide, <LOCATION>");
}

#[test]
fn no_pii_is_untouched() {
    let text = "The quick brown fox jumps over the lazy dog.";
    assert_eq!(redact(text), text);
}
