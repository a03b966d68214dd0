//! Suite catalog self-consistency: every registered suite must deliver
//! exactly what it claims, and every suite must round-trip a letter.

mod common;

use common::{envelope_for_suite, suite, test_trust_store, TEST_DATA};
use jess_core::{suites, Letter, SUITE_WIRE_V1};

#[test]
fn claimed_provides_match_compiled_requirements() {
    let store = test_trust_store();

    for suite in suites() {
        let envelope = envelope_for_suite(&store, suite);
        let session = envelope
            .correspondence(&store)
            .unwrap_or_else(|err| panic!("suite {} failed to compile: {err}", suite.id));

        assert_eq!(
            session.tool_requirements(),
            suite.provides,
            "suite {} claims {} but compiles to {}",
            suite.id,
            suite.provides,
            session.tool_requirements(),
        );
        assert_eq!(
            session.security_level(),
            suite.security_level,
            "suite {} declares level {} but compiles to {}",
            suite.id,
            suite.security_level,
            session.security_level(),
        );
    }
}

#[test]
fn every_suite_roundtrips_a_letter() {
    let store = test_trust_store();

    for suite in suites() {
        let envelope = envelope_for_suite(&store, suite);
        let mut session = envelope
            .correspondence(&store)
            .unwrap_or_else(|err| panic!("suite {} failed to compile: {err}", suite.id));

        let letter = session.close(TEST_DATA)
            .unwrap_or_else(|err| panic!("suite {} failed to close: {err}", suite.id));

        // Through JSON, like the letter would travel.
        let encoded = letter.to_json().unwrap();
        let parsed = Letter::from_json(&encoded).unwrap();

        let opened = parsed
            .open(Some(suite.provides), &store)
            .unwrap_or_else(|err| panic!("suite {} failed to open: {err}", suite.id));
        assert_eq!(opened, TEST_DATA, "suite {} data mismatch", suite.id);

        if !parsed.signatures.is_empty() {
            parsed
                .verify(Some(suite.provides), &store)
                .unwrap_or_else(|err| panic!("suite {} failed to verify: {err}", suite.id));
        }
    }
}

#[test]
fn wire_suite_compiles_as_wire_session() {
    let store = test_trust_store();
    let envelope = envelope_for_suite(&store, suite(SUITE_WIRE_V1));
    envelope.wire_correspondence(&store).unwrap();
}
