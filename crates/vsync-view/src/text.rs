//! Line-oriented textual encoding of a [`View`].
//!
//! One field per line, in fixed order:
//!
//! ```text
//! 7                          epoch id
//! 0 1 3 4                    member ids
//! 10.0.0.1:1 10.0.0.2:1 ...  member addresses
//! F F T F                    failed flags
//! 1                          failed count
//! 4                          member count
//! 2                          my rank
//! ```
//!
//! Parsing is strict. Every line must be present, every token must parse,
//! and the counts must agree with the vectors; a short or inconsistent
//! input is an error rather than a half-populated view.

use std::str::FromStr;

use vsync_types::{EpochId, NodeAddress, NodeId};

use crate::{View, ViewError};

const FIELD_LINES: usize = 7;

impl View {
    /// Renders the view in the line-oriented encoding.
    pub fn to_text(&self) -> String {
        fn joined<T: ToString>(items: &[T]) -> String {
            items.iter().map(ToString::to_string).collect::<Vec<_>>().join(" ")
        }
        let failed: Vec<&str> = self
            .failed()
            .iter()
            .map(|f| if *f { "T" } else { "F" })
            .collect();

        let lines = [
            self.epoch_id().to_string(),
            joined(self.members()),
            joined(self.member_addresses()),
            failed.join(" "),
            self.num_failed().to_string(),
            self.num_members().to_string(),
            self.my_rank().to_string(),
        ];
        format!("{}\n", lines.join("\n"))
    }
}

fn parse_error(line: usize, reason: impl Into<String>) -> ViewError {
    ViewError::Parse {
        line,
        reason: reason.into(),
    }
}

fn parse_count(line_no: usize, line: &str, what: &str) -> Result<usize, ViewError> {
    line.trim()
        .parse::<usize>()
        .map_err(|_| parse_error(line_no, format!("{what} {:?} is not a count", line.trim())))
}

impl FromStr for View {
    type Err = ViewError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lines: Vec<&str> = s.lines().collect();
        if lines.len() < FIELD_LINES {
            return Err(parse_error(
                lines.len() + 1,
                format!("expected {FIELD_LINES} lines, found {}", lines.len()),
            ));
        }
        if let Some(extra) = lines[FIELD_LINES..].iter().position(|l| !l.trim().is_empty()) {
            return Err(parse_error(
                FIELD_LINES + extra + 1,
                "unexpected content after the last field",
            ));
        }

        let epoch = EpochId::from_str(lines[0].trim()).map_err(|e| parse_error(1, e.to_string()))?;

        let members = lines[1]
            .split_whitespace()
            .map(NodeId::from_str)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| parse_error(2, e.to_string()))?;

        let addresses = lines[2]
            .split_whitespace()
            .map(NodeAddress::from_str)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| parse_error(3, e.to_string()))?;

        let failed = lines[3]
            .split_whitespace()
            .map(|token| match token {
                "T" => Ok(true),
                "F" => Ok(false),
                other => Err(parse_error(4, format!("failure flag {other:?} is not T or F"))),
            })
            .collect::<Result<Vec<_>, _>>()?;

        let num_failed = parse_count(5, lines[4], "failed count")?;
        let num_members = parse_count(6, lines[5], "member count")?;
        let my_rank = parse_count(7, lines[6], "rank")?;

        if members.len() != num_members {
            return Err(parse_error(
                6,
                format!("member count {num_members} but {} ids listed", members.len()),
            ));
        }
        let counted = failed.iter().filter(|f| **f).count();
        if counted != num_failed {
            return Err(parse_error(
                5,
                format!("failed count {num_failed} but {counted} flags are T"),
            ));
        }

        View::from_parts(epoch, members, addresses, failed, my_rank, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use test_case::test_case;

    const SAMPLE: &str = "7\n0 1 3 4\na:1 b:1 c:1 d:1\nF F T F\n1\n4\n2\n";

    #[test]
    fn parses_sample() {
        let view: View = SAMPLE.parse().unwrap();
        assert_eq!(view.epoch_id(), EpochId::new(7));
        assert_eq!(view.members()[2], NodeId::new(3));
        assert_eq!(view.member_addresses()[3].as_str(), "d:1");
        assert_eq!(view.failed(), &[false, false, true, false]);
        assert_eq!(view.num_failed(), 1);
        assert_eq!(view.my_rank(), 2);
    }

    #[test]
    fn renders_sample() {
        let view: View = SAMPLE.parse().unwrap();
        assert_eq!(view.to_text(), SAMPLE);
    }

    #[test]
    fn tolerates_trailing_blank_lines_and_spaces() {
        let padded = "7\n0 1 3 4 \na:1 b:1 c:1 d:1 \nF F T F \n1\n4\n2\n\n\n";
        let view: View = padded.parse().unwrap();
        assert_eq!(view.num_members(), 4);
    }

    #[test_case("7\n0 1 3 4\na:1 b:1 c:1 d:1\nF F T F\n1\n4\n", 7 ; "missing rank")]
    #[test_case("7\n0 1\n", 3 ; "truncated after members")]
    #[test_case("", 1 ; "empty input")]
    fn missing_lines_are_errors(input: &str, line: usize) {
        match input.parse::<View>() {
            Err(ViewError::Parse { line: got, .. }) => assert_eq!(got, line),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test_case("x\n0\na:1\nF\n0\n1\n0\n", 1 ; "bad epoch")]
    #[test_case("1\n0 q\na:1 b:1\nF F\n0\n2\n0\n", 2 ; "bad member id")]
    #[test_case("1\n0 1\na:1 b:1\nF Y\n0\n2\n0\n", 4 ; "bad flag")]
    #[test_case("1\n0 1\na:1 b:1\nF T\n0\n2\n0\n", 5 ; "failed count mismatch")]
    #[test_case("1\n0 1\na:1 b:1\nF F\n0\n3\n0\n", 6 ; "member count mismatch")]
    #[test_case("1\n0 1\na:1 b:1\nF F\n0\n2\nzero\n", 7 ; "bad rank")]
    #[test_case("1\n0\na:1\nF\n0\n1\n0\nextra\n", 8 ; "trailing garbage")]
    fn malformed_fields_are_errors(input: &str, line: usize) {
        match input.parse::<View>() {
            Err(ViewError::Parse { line: got, .. }) => assert_eq!(got, line),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn structurally_invalid_view_rejected() {
        // Three addresses for two members parses line by line but is not a view.
        let input = "1\n0 1\na:1 b:1 c:1\nF F\n0\n2\n0\n";
        assert!(matches!(
            input.parse::<View>(),
            Err(ViewError::Invariant(_))
        ));
    }

    proptest! {
        #[test]
        fn rendered_views_parse_back(
            flags in proptest::collection::vec(any::<bool>(), 1..12),
            epoch in 0u64..1_000_000,
            rank_seed in any::<usize>(),
        ) {
            let mut failed = flags;
            failed[0] = false;
            let n = failed.len();
            let view = View::from_parts(
                EpochId::new(epoch),
                (0..n as u32).map(|i| NodeId::new(i * 3)).collect(),
                (0..n).map(|i| NodeAddress::new(format!("h{i}:1")).unwrap()).collect(),
                failed,
                rank_seed % n,
                None,
            )
            .unwrap();

            let parsed: View = view.to_text().parse().unwrap();
            prop_assert_eq!(parsed, view);
        }
    }
}
