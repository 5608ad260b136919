use std::collections::HashMap;

use citeharvest_core::PaperTable;
use citeharvest_core::config::ClassifyConfig;
use citeharvest_science::{Pass, RunReport};
use tracing::{info, warn};

use crate::classifier::{Classifier, clean_title};
use crate::error::Result;

/// Fill the category column of every row that has none, one batch at a
/// time, saving the table after each batch that assigned something.
pub async fn classify_table(
    table: &mut PaperTable,
    classifier: &dyn Classifier,
    config: &ClassifyConfig,
) -> Result<RunReport> {
    let name = table
        .path()
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut report = RunReport::start(name, Pass::Classify);
    let column = config.column.as_str();

    let pending = (0..table.len())
        .filter(|&row| table.get(row, column).is_none() && !table.title(row).is_empty())
        .collect::<Vec<_>>();
    report.skipped = table.len() - pending.len();
    info!(file = %report.file, pending = pending.len(), "classification started");

    for batch in pending.chunks(config.batch_size.max(1)) {
        let titles = batch
            .iter()
            .map(|&row| table.title(row).to_string())
            .collect::<Vec<_>>();
        report.attempted += batch.len();

        let results = classifier.classify(&titles).await;
        if results.is_empty() {
            warn!(file = %report.file, rows = batch.len(), "batch left unclassified");
            report.unresolved += batch.len();
            report.add_error(format!("no classification for batch starting with {:?}", titles[0]));
            continue;
        }

        let by_title = results
            .iter()
            .map(|c| (c.title.trim(), c.category.trim()))
            .collect::<HashMap<_, _>>();

        let mut assigned = 0;
        for (pos, (&row, title)) in batch.iter().zip(&titles).enumerate() {
            let category = by_title
                .get(title.as_str())
                .or_else(|| by_title.get(clean_title(title).as_str()))
                .copied()
                .or_else(|| results.get(pos).map(|c| c.category.trim()))
                .and_then(|c| known_category(&config.categories, c));

            match category {
                Some(category) => {
                    table.set(row, column, category);
                    assigned += 1;
                }
                None => warn!(file = %report.file, title = %title, "no usable category"),
            }
        }

        report.resolved += assigned;
        report.unresolved += batch.len() - assigned;
        if assigned > 0 {
            table.save()?;
        }
    }

    let report = report.finish();
    info!("{report}");
    Ok(report)
}

/// The configured spelling of `category`, if it is one of `categories`.
fn known_category<'a>(categories: &'a [String], category: &str) -> Option<&'a str> {
    categories
        .iter()
        .find(|c| c.eq_ignore_ascii_case(category))
        .map(String::as_str)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use citeharvest_core::YearRange;
    use tempfile::TempDir;

    use super::*;
    use crate::classifier::Classification;

    /// Answers each batch from a script, recording what it was asked.
    struct ScriptedClassifier {
        replies: Mutex<Vec<Vec<Classification>>>,
        seen: Mutex<Vec<Vec<String>>>,
    }

    impl ScriptedClassifier {
        fn new(replies: Vec<Vec<(&str, &str)>>) -> Self {
            let replies = replies
                .into_iter()
                .rev()
                .map(|batch| {
                    batch
                        .into_iter()
                        .map(|(title, category)| Classification {
                            title: title.to_string(),
                            category: category.to_string(),
                        })
                        .collect()
                })
                .collect();
            Self {
                replies: Mutex::new(replies),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Classifier for ScriptedClassifier {
        async fn classify(&self, titles: &[String]) -> Vec<Classification> {
            self.seen.lock().unwrap().push(titles.to_vec());
            self.replies.lock().unwrap().pop().unwrap_or_default()
        }
    }

    fn config(batch_size: usize) -> ClassifyConfig {
        ClassifyConfig {
            batch_size,
            categories: vec![
                "Computer Vision".to_string(),
                "Natural Language Processing".to_string(),
            ],
            ..Default::default()
        }
    }

    fn table(dir: &TempDir, csv: &str) -> PaperTable {
        let path = dir.path().join("iclr.final.csv");
        std::fs::write(&path, csv).unwrap();
        PaperTable::load(&path, YearRange::default()).unwrap()
    }

    #[tokio::test]
    async fn assigns_by_title_then_clean_title_then_position() {
        let dir = TempDir::new().unwrap();
        let csv = "title,ai_category\n\
                   ViT,\n\
                   \"BERT \"\"Large\"\"\",\n\
                   Unnamed Result,\n";
        let mut table = table(&dir, csv);
        let classifier = ScriptedClassifier::new(vec![vec![
            ("ViT", "Computer Vision"),
            ("BERT 'Large'", "natural language processing"),
            ("Something the model made up", "Computer Vision"),
        ]]);

        let report = classify_table(&mut table, &classifier, &config(5)).await.unwrap();

        assert_eq!(report.resolved, 3);
        assert_eq!(table.get(0, "ai_category"), Some("Computer Vision"));
        assert_eq!(table.get(1, "ai_category"), Some("Natural Language Processing"));
        assert_eq!(table.get(2, "ai_category"), Some("Computer Vision"));

        let reloaded = PaperTable::load(table.path(), YearRange::default()).unwrap();
        assert_eq!(reloaded.get(2, "ai_category"), Some("Computer Vision"));
    }

    #[tokio::test]
    async fn unknown_categories_and_failed_batches_stay_pending() {
        let dir = TempDir::new().unwrap();
        let csv = "title,venue\nA,x\nB,y\nC,z\n";
        let mut table = table(&dir, csv);
        let classifier = ScriptedClassifier::new(vec![
            vec![("A", "Astrology"), ("B", "Computer Vision")],
            vec![],
        ]);

        let report = classify_table(&mut table, &classifier, &config(2)).await.unwrap();

        assert_eq!(report.attempted, 3);
        assert_eq!(report.resolved, 1);
        assert_eq!(report.unresolved, 2);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(table.get(0, "ai_category"), None);
        assert_eq!(table.get(1, "ai_category"), Some("Computer Vision"));
        assert_eq!(table.get(2, "ai_category"), None);
        assert_eq!(
            *classifier.seen.lock().unwrap(),
            vec![
                vec!["A".to_string(), "B".to_string()],
                vec!["C".to_string()]
            ]
        );
    }

    #[tokio::test]
    async fn classified_rows_are_skipped() {
        let dir = TempDir::new().unwrap();
        let csv = "title,ai_category\nA,Computer Vision\n";
        let mut table = table(&dir, csv);
        let classifier = ScriptedClassifier::new(vec![]);

        let report = classify_table(&mut table, &classifier, &config(5)).await.unwrap();

        assert_eq!(report.skipped, 1);
        assert_eq!(report.attempted, 0);
        assert!(classifier.seen.lock().unwrap().is_empty());
        assert_eq!(std::fs::read_to_string(table.path()).unwrap(), csv);
    }
}
