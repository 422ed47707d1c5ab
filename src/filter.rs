//! Line-level reduction of a serialized trial record to its eligibility fields.
//!
//! This is deliberately not a JSON parser. Lines are matched by substring, so
//! a value that happens to contain one of the field names is kept as well.

/// Field names whose lines are kept wherever they appear.
pub const WANTED_FIELDS: &[&str] = &[
    "eligibilityCriteria",
    "healthyVolunteers",
    "sex",
    "minimumAge",
    "studyPopulation",
];

/// Opening line of the one array block kept in full.
pub const ARRAY_OPEN_MARKER: &str = "\"stdAges\": [";

const ARRAY_CLOSE: char = ']';
const ELEMENT_QUOTE: char = '"';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Scanning,
    InArray,
}

/// Keep wanted-field lines plus the whole `stdAges` block, in input order.
///
/// Retained lines are copied verbatim. Output is a subsequence of the input
/// lines joined by `\n`, and `filter_record(filter_record(x)) == filter_record(x)`.
pub fn filter_record(raw: &str) -> String {
    let mut kept: Vec<&str> = Vec::new();
    let mut state = State::Scanning;

    for line in raw.lines() {
        match state {
            State::Scanning => {
                if line.contains(ARRAY_OPEN_MARKER) {
                    kept.push(line);
                    state = State::InArray;
                } else if is_wanted(line) {
                    kept.push(line);
                }
            }
            State::InArray => {
                if line.contains(ARRAY_CLOSE) {
                    kept.push(line);
                    state = State::Scanning;
                } else if line.contains(ELEMENT_QUOTE) {
                    kept.push(line);
                }
            }
        }
    }

    kept.join("\n")
}

fn is_wanted(line: &str) -> bool {
    WANTED_FIELDS.iter().any(|field| line.contains(field))
}

// ── Tests ──
