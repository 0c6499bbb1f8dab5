use crate::error::RiskSyncError;

use super::RiskReport;

/// Rows with fewer fields than this are skipped without comment.
const MIN_FIELDS: usize = 10;

/// Present in the body when the CASB answered with its login page instead of
/// the CSV export.
const HTML_MARKER: &str = "<html>";

/// Parse the CSV risk report.
///
/// The first line is a header. Each remaining row contributes its account
/// (field 0), login alias (field 1) and score (field 2). Scores are read as
/// floats and truncated toward zero; an unreadable score counts as 0, and an
/// account's score never drops below 0.
pub fn parse_report(body: &str) -> Result<RiskReport, RiskSyncError> {
    if body.contains(HTML_MARKER) {
        return Err(RiskSyncError::ReportUnavailable(
            "CASB returned an HTML page instead of the risk score CSV; check the CASB credentials"
                .to_owned(),
        ));
    }

    let mut report = RiskReport::default();

    for line in body.trim().lines().skip(1) {
        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() < MIN_FIELDS {
            continue;
        }
        let (account, login_name, raw_score) = (fields[0], fields[1], fields[2]);

        let score = raw_score.trim().parse::<f64>().map_or(0, |s| s.trunc() as i64);

        let best = report.scores.entry(account.to_owned()).or_insert(0);
        *best = (*best).max(score);

        report
            .aliases
            .entry(account.to_owned())
            .or_default()
            .insert(login_name.to_owned());
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    const HEADER: &str = "Account,Login Name,Risk Score,Country,Device,Service,Activity,Category,Last Seen,Notes";

    fn row(account: &str, login: &str, score: &str) -> String {
        format!("{account},{login},{score},US,laptop,Box,upload,storage,2024-01-01,-")
    }

    fn body(rows: &[String]) -> String {
        let mut text = String::from(HEADER);
        for r in rows {
            text.push('\n');
            text.push_str(r);
        }
        text
    }

    #[test]
    fn header_is_skipped() {
        let report = parse_report(HEADER).unwrap();
        assert!(report.scores.is_empty());
        assert!(report.aliases.is_empty());
    }

    #[test]
    fn empty_body_yields_empty_report() {
        assert_eq!(parse_report("").unwrap(), RiskReport::default());
    }

    #[test]
    fn score_is_max_across_rows_truncated() {
        let text = body(&[
            row("jdoe", "jdoe@corp.io", "12.9"),
            row("jdoe", "jdoe@corp.io", "57.99"),
            row("jdoe", "john.doe@corp.io", "31"),
        ]);
        let report = parse_report(&text).unwrap();
        assert_eq!(report.scores["jdoe"], 57);
    }

    #[test]
    fn fractional_scores_are_not_rounded() {
        let report = parse_report(&body(&[row("a", "a@corp.io", "69.999")])).unwrap();
        assert_eq!(report.scores["a"], 69);
    }

    #[test]
    fn aliases_accumulate_without_duplicates() {
        let text = body(&[
            row("jdoe", "jdoe@corp.io", "1"),
            row("jdoe", "john.doe@corp.io", "2"),
            row("jdoe", "jdoe@corp.io", "3"),
        ]);
        let report = parse_report(&text).unwrap();
        let expected: BTreeSet<String> = ["jdoe@corp.io", "john.doe@corp.io"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(report.aliases["jdoe"], expected);
    }

    #[test]
    fn short_rows_are_skipped() {
        let text = body(&[
            "broken,row,99".to_owned(),
            row("ok", "ok@corp.io", "5"),
        ]);
        let report = parse_report(&text).unwrap();
        assert_eq!(report.scores.len(), 1);
        assert!(!report.scores.contains_key("broken"));
    }

    #[test]
    fn unreadable_score_counts_as_zero() {
        let text = body(&[row("a", "a@corp.io", "n/a")]);
        let report = parse_report(&text).unwrap();
        assert_eq!(report.scores["a"], 0);
    }

    #[test]
    fn html_body_is_report_unavailable() {
        let text = format!("{}\n<html><body>Sign in</body></html>", body(&[row("a", "a@x.io", "80")]));
        let err = parse_report(&text).unwrap_err();
        assert!(matches!(err, RiskSyncError::ReportUnavailable(_)));
    }

    #[test]
    fn crlf_line_endings_are_accepted() {
        let text = format!("{HEADER}\r\n{}\r\n", row("a", "a@corp.io", "44"));
        let report = parse_report(&text).unwrap();
        assert_eq!(report.scores["a"], 44);
    }

    #[test]
    fn parsing_is_idempotent() {
        let text = body(&[
            row("a", "a@corp.io", "10"),
            row("b", "b@corp.io", "90.5"),
            row("a", "alias@corp.io", "20"),
        ]);
        assert_eq!(parse_report(&text).unwrap(), parse_report(&text).unwrap());
    }
}
