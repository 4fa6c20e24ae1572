//! Round-trip validator.
//!
//! Serializes the document, parses it back, and requires the result to be
//! structurally identical. Also requires the serialized stream to pass
//! local validation.

use nexml::xml;
use nexml::Document;

use crate::report::ConformanceReport;

/// Validates that `document` survives an encode/decode round trip.
#[must_use]
pub fn validate(document: &Document) -> ConformanceReport {
    let mut report = ConformanceReport::new();
    report.record_check("roundtrip");

    let bytes = xml::encode(document);

    if let xml::Validation::Invalid(messages) = xml::validate(&bytes, None) {
        for message in messages {
            report.fail("roundtrip", None, format!("serialized form fails validation: {message}"));
        }
        return report;
    }

    match xml::decode(&bytes) {
        Ok(restored) if restored == *document => {}
        Ok(_) => {
            report.fail(
                "roundtrip",
                None,
                "decode(encode(document)) differs from the original",
            );
        }
        Err(err) => {
            report.fail(
                "roundtrip",
                None,
                format!("serialized form fails to parse: {err}"),
            );
        }
    }

    report
}
