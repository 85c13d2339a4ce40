use std::collections::HashMap;
use std::fmt;

use crate::quiz::results::ResultRecord;

pub const NO_RESULTS: &str = "Пока нет результатов 😅";
const HEADER: &str = "🏆 Рейтинг:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderboardEntry {
    pub name: String,
    pub best_score: u32,
    pub total: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ranking {
    Empty,
    Ranked(Vec<LeaderboardEntry>),
}

/// Best score per display name, highest first, at most `top_n` entries.
///
/// Names tie-break case-insensitively. When one name has several records at
/// its best score, the earliest one supplies `total`.
pub fn build(records: &[ResultRecord], top_n: usize) -> Ranking {
    if records.is_empty() {
        return Ranking::Empty;
    }

    let mut best: HashMap<&str, LeaderboardEntry> = HashMap::new();
    for record in records {
        let entry = best
            .entry(record.name.as_str())
            .or_insert_with(|| LeaderboardEntry {
                name: record.name.clone(),
                best_score: record.score,
                total: record.total,
            });
        if record.score > entry.best_score {
            entry.best_score = record.score;
            entry.total = record.total;
        }
    }

    let mut entries: Vec<LeaderboardEntry> = best.into_values().collect();
    entries.sort_by(|a, b| {
        b.best_score
            .cmp(&a.best_score)
            .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
            .then_with(|| a.name.cmp(&b.name))
    });
    entries.truncate(top_n);
    Ranking::Ranked(entries)
}

impl fmt::Display for LeaderboardEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} — {}/{}", self.name, self.best_score, self.total)
    }
}

impl fmt::Display for Ranking {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ranking::Empty => write!(f, "{NO_RESULTS}"),
            Ranking::Ranked(entries) => {
                writeln!(f, "{HEADER}")?;
                for (place, entry) in entries.iter().enumerate() {
                    write!(f, "\n{}. {}", place + 1, entry)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(name: &str, score: u32, total: u32) -> ResultRecord {
        ResultRecord {
            name: name.to_string(),
            score,
            total,
            completed_at: Some(Utc::now()),
        }
    }

    fn lines(ranking: &Ranking) -> Vec<String> {
        match ranking {
            Ranking::Empty => Vec::new(),
            Ranking::Ranked(entries) => entries.iter().map(ToString::to_string).collect(),
        }
    }

    #[test]
    fn keeps_best_score_per_name() {
        let records = [record("A", 5, 10), record("B", 7, 10), record("A", 3, 10)];
        let ranking = build(&records, 10);
        assert_eq!(lines(&ranking), ["B — 7/10", "A — 5/10"]);
    }

    #[test]
    fn empty_store_renders_marker() {
        let ranking = build(&[], 10);
        assert_eq!(ranking, Ranking::Empty);
        assert_eq!(ranking.to_string(), NO_RESULTS);
    }

    #[test]
    fn ties_sort_by_name_ignoring_case() {
        let records = [
            record("charlie", 4, 5),
            record("Bravo", 4, 5),
            record("alpha", 4, 5),
            record("Zulu", 5, 5),
        ];
        let ranking = build(&records, 10);
        assert_eq!(
            lines(&ranking),
            ["Zulu — 5/5", "alpha — 4/5", "Bravo — 4/5", "charlie — 4/5"]
        );
    }

    #[test]
    fn names_are_case_sensitive_identities() {
        let records = [record("anna", 2, 3), record("Anna", 2, 3)];
        let ranking = build(&records, 10);
        assert_eq!(lines(&ranking), ["Anna — 2/3", "anna — 2/3"]);
    }

    #[test]
    fn first_record_at_best_score_supplies_total() {
        let records = [record("A", 4, 5), record("A", 4, 6)];
        assert_eq!(lines(&build(&records, 10)), ["A — 4/5"]);
    }

    #[test]
    fn truncates_to_top_n_and_numbers_from_one() {
        let records = [record("A", 1, 3), record("B", 2, 3), record("C", 3, 3)];
        let ranking = build(&records, 2);
        assert_eq!(
            ranking.to_string(),
            "🏆 Рейтинг:\n\n1. C — 3/3\n2. B — 2/3"
        );
    }
}
