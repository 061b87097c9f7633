//! The conversational session.
//!
//! A [`Session`] owns everything one analyst's conversation needs: the
//! files supplied so far, the loader and its cache, the current table, the
//! rolling context, the two collaborators and the turn history. A turn runs
//! resolve, dispatch and phrase to completion before the context moves on.

pub mod dispatch;

pub use dispatch::{dispatch, next_context, GUIDANCE_MESSAGE};

use crate::agent::{resolve, ClassifyRequest, IntentClassifier, Phraser};
use crate::data::{DatasetLoader, LoaderOptions, UploadSet};
use crate::error::LoadError;
use crate::models::{Context, Intent, ResultRecord, SalesTable};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One completed question and answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub question: String,
    pub intent: Intent,
    pub result: ResultRecord,
    pub answer: String,
    pub asked_at: DateTime<Utc>,
}

/// Outcome of offering files to the session.
#[derive(Debug, Default)]
pub struct AddFilesReport {
    /// Accepted files with the year each was recognized as.
    pub accepted: Vec<(i32, PathBuf)>,
    /// Per-file problems; the other files are still accepted.
    pub rejected: Vec<LoadError>,
}

/// Where the session stands after a load attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadStatus {
    /// Every expected year is present and the table is ready.
    Ready { rows: usize },
    /// Still waiting for these years.
    Waiting { missing: Vec<i32> },
}

pub struct Session {
    uploads: UploadSet,
    loader: DatasetLoader,
    table: Option<Arc<SalesTable>>,
    context: Context,
    classifier: Box<dyn IntentClassifier>,
    phraser: Box<dyn Phraser>,
    turns: Vec<Turn>,
}

impl Session {
    pub fn new(
        expected_years: Vec<i32>,
        options: LoaderOptions,
        classifier: Box<dyn IntentClassifier>,
        phraser: Box<dyn Phraser>,
    ) -> Self {
        Self {
            uploads: UploadSet::new(expected_years),
            loader: DatasetLoader::new(options),
            table: None,
            context: Context::empty(),
            classifier,
            phraser,
            turns: Vec::new(),
        }
    }

    /// Register files. Each file succeeds or fails on its own.
    pub fn add_files<P: AsRef<Path>>(&mut self, paths: &[P]) -> AddFilesReport {
        let mut report = AddFilesReport::default();

        for path in paths {
            let path = path.as_ref();
            match self.uploads.add_file(path) {
                Ok(year) => {
                    info!("Registered {} for {}", path.display(), year);
                    report.accepted.push((year, path.to_path_buf()));
                }
                Err(e) => {
                    warn!("{}", e);
                    report.rejected.push(e);
                }
            }
        }

        debug!(
            "{} of {} yearly files registered",
            self.uploads.len(),
            self.uploads.expected_years().len()
        );
        report
    }

    /// Build the table once every expected year has a file.
    ///
    /// While years are missing no table is produced and the current one, if
    /// any, stays in place. A new table starts a fresh context.
    pub fn try_load(&mut self) -> Result<LoadStatus, LoadError> {
        if !self.uploads.is_complete() {
            let missing = self.uploads.missing_years();
            info!("Waiting for files: {:?}", missing);
            return Ok(LoadStatus::Waiting { missing });
        }

        let table = self.loader.load(&self.uploads)?;
        debug!("{} normalized tables cached", self.loader.cached_tables());
        if table.is_empty() {
            warn!("The dataset has no rows with a valid date");
        }
        let replaced = !self
            .table
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, &table));
        if replaced {
            self.context = Context::empty();
        }

        let rows = table.len();
        self.table = Some(table);
        Ok(LoadStatus::Ready { rows })
    }

    pub fn table(&self) -> Option<&Arc<SalesTable>> {
        self.table.as_ref()
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn uploads(&self) -> &UploadSet {
        &self.uploads
    }

    pub fn reset_context(&mut self) {
        self.context = Context::empty();
    }

    /// Answer one question.
    ///
    /// The context is only replaced once the whole turn has succeeded; a
    /// collaborator failure leaves it as it was.
    pub async fn ask(&mut self, question: &str) -> Result<&Turn> {
        let table = match self.table.as_ref() {
            Some(table) => Arc::clone(table),
            None => {
                return Err(LoadError::Incomplete {
                    missing: self.uploads.missing_years(),
                }
                .into())
            }
        };

        let families = table.families();
        let request = ClassifyRequest {
            question,
            context: &self.context,
            families: &families,
        };

        let intent = resolve(self.classifier.as_ref(), request).await?;
        info!("Resolved intent: {}", serde_json::Value::Object(intent.to_map()));

        let result = dispatch(&table, &intent, &self.context);
        let answer = self.phraser.phrase(&result).await?;

        self.context = next_context(&intent, &result);
        self.turns.push(Turn {
            question: question.to_string(),
            intent,
            result,
            answer,
            asked_at: Utc::now(),
        });

        self.turns
            .last()
            .ok_or_else(|| anyhow::anyhow!("turn history is empty"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{RuleBasedClassifier, TemplatePhraser};
    use crate::models::Action;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::fs;
    use tempfile::TempDir;

    const HEADER: &str = "FechaMov,Cantidad,Familia,Cliente\n";

    fn write_year_files(dir: &TempDir) -> Vec<PathBuf> {
        let files = [
            ("ventas_2018.csv", "10/01/2018,4,Brocas,C1\n"),
            ("ventas_2019.csv", "12/11/2019,8,Tornillos,C2\n"),
            (
                "ventas_2020.csv",
                "15/02/2020,40,Tornillos,C3\n16/02/2020,20,Brocas,C4\n01/03/2020,25,Anclas,C5\n04/03/2020,45,Tornillos,C6\n04/08/2020,5,Taquetes,C7\n",
            ),
            (
                "ventas_2021.csv",
                "03/05/2021,70,Tornillos,C8\n17/05/2021,50,Anclas,C9\n20/05/2021,NADA,Anclas,C10\nno es fecha,99,Anclas,C11\n",
            ),
        ];

        files
            .iter()
            .map(|(name, body)| {
                let path = dir.path().join(name);
                fs::write(&path, format!("{}{}", HEADER, body)).unwrap();
                path
            })
            .collect()
    }

    fn offline_session() -> Session {
        Session::new(
            vec![2018, 2019, 2020, 2021],
            LoaderOptions::default(),
            Box::new(RuleBasedClassifier::new()),
            Box::new(TemplatePhraser::new()),
        )
    }

    fn loaded_session(dir: &TempDir) -> Session {
        let mut session = offline_session();
        let report = session.add_files(&write_year_files(dir));
        assert_eq!(report.accepted.len(), 4);
        assert_eq!(session.try_load().unwrap(), LoadStatus::Ready { rows: 10 });
        session
    }

    /// Classifier whose answers are scripted by the test.
    struct ScriptedClassifier {
        intents: std::sync::Mutex<Vec<Intent>>,
    }

    #[async_trait]
    impl IntentClassifier for ScriptedClassifier {
        async fn classify(&self, _request: ClassifyRequest<'_>) -> Result<Intent> {
            let mut intents = self.intents.lock().unwrap();
            if intents.is_empty() {
                Ok(Intent::help())
            } else {
                Ok(intents.remove(0))
            }
        }
    }

    struct FailingPhraser;

    #[async_trait]
    impl Phraser for FailingPhraser {
        async fn phrase(&self, _result: &ResultRecord) -> Result<String> {
            Err(anyhow::anyhow!("service unavailable"))
        }
    }

    #[test]
    fn test_waits_for_every_year() {
        let dir = TempDir::new().unwrap();
        let files = write_year_files(&dir);
        let mut session = offline_session();

        session.add_files(&files[..2]);
        assert_eq!(
            session.try_load().unwrap(),
            LoadStatus::Waiting {
                missing: vec![2020, 2021]
            }
        );
        assert!(session.table().is_none());
    }

    #[test]
    fn test_unrecognized_file_does_not_block_others() {
        let dir = TempDir::new().unwrap();
        let mut files = write_year_files(&dir);
        let stray = dir.path().join("clientes.csv");
        fs::write(&stray, HEADER).unwrap();
        files.insert(1, stray);

        let mut session = offline_session();
        let report = session.add_files(&files);

        assert_eq!(report.accepted.len(), 4);
        assert_eq!(report.rejected.len(), 1);
        assert!(matches!(report.rejected[0], LoadError::UnrecognizedYear(_)));
    }

    #[tokio::test]
    async fn test_ask_before_load_is_an_error() {
        let mut session = offline_session();
        assert!(session.ask("Ventas en mayo 2021").await.is_err());
        assert!(session.context().is_empty());
    }

    #[tokio::test]
    async fn test_month_question_end_to_end() {
        let dir = TempDir::new().unwrap();
        let mut session = loaded_session(&dir);

        let turn = session
            .ask("¿Cuáles fueron las ventas en mayo del 2021?")
            .await
            .unwrap();

        assert_eq!(
            turn.intent,
            Intent::new(Action::SalesByMonth).with_year(2021).with_month("mayo")
        );
        assert_eq!(turn.result.get("total_unidades"), Some(&json!(120.0)));
        assert_eq!(turn.answer, "En Mayo de 2021 se vendieron 120 unidades.");
        assert_eq!(session.context().get("total_unidades"), Some(&json!(120.0)));
    }

    #[tokio::test]
    async fn test_top_families_end_to_end() {
        let dir = TempDir::new().unwrap();
        let mut session = loaded_session(&dir);

        let turn = session.ask("Top 3 familias 2020").await.unwrap();

        assert_eq!(turn.intent, Intent::new(Action::TopFamilies).with_year(2020).with_k(3));
        let rows = turn.result.get("top_familias").and_then(Value::as_array).unwrap();
        assert!(rows.len() <= 3);
        assert_eq!(rows[0]["Familia"], json!("Tornillos"));
    }

    #[tokio::test]
    async fn test_follow_up_uses_previous_turn() {
        let dir = TempDir::new().unwrap();
        let mut session = loaded_session(&dir);

        session.ask("Ventas en mayo 2021").await.unwrap();
        let turn = session.ask("¿Y qué pasó ese mes?").await.unwrap();

        assert_eq!(turn.intent.action, Action::SalesByMonth);
        assert_eq!(turn.intent.year, Some(2021));
        assert_eq!(turn.intent.month.as_deref(), Some("mayo"));
        assert_eq!(session.turns().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_turn_keeps_context() {
        let dir = TempDir::new().unwrap();
        let mut session = loaded_session(&dir);
        session.ask("Ventas en 2020").await.unwrap();
        let before = session.context().clone();

        session.phraser = Box::new(FailingPhraser);
        assert!(session.ask("Ventas en 2021").await.is_err());

        assert_eq!(session.context(), &before);
        assert_eq!(session.turns().len(), 1);
    }

    #[tokio::test]
    async fn test_scripted_classifier_and_reset() {
        let dir = TempDir::new().unwrap();
        let mut session = loaded_session(&dir);
        session.classifier = Box::new(ScriptedClassifier {
            intents: std::sync::Mutex::new(vec![Intent::new(Action::Unrecognized(
                "borrar_todo".to_string(),
            ))]),
        });

        let turn = session.ask("borra todo").await.unwrap();
        assert_eq!(turn.answer, GUIDANCE_MESSAGE);

        session.reset_context();
        assert!(session.context().is_empty());
    }

    fn fixture_session() -> Session {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures");
        let files = crate::data::discover_csv_files(&dir, 1);
        assert_eq!(files.len(), 4);

        let mut session = offline_session();
        session.add_files(&files);
        assert_eq!(session.try_load().unwrap(), LoadStatus::Ready { rows: 21 });
        session
    }

    #[tokio::test]
    async fn test_that_month_in_another_year() {
        let mut session = fixture_session();
        session.ask("Ventas en mayo 2021").await.unwrap();

        let turn = session.ask("¿Y ese mes en 2020?").await.unwrap();

        assert_eq!(
            turn.intent,
            Intent::new(Action::SalesByMonth).with_year(2020).with_month("mayo")
        );
        assert_eq!(turn.result.get("total_unidades"), Some(&json!(0.0)));
    }

    #[tokio::test]
    async fn test_that_year_total_drops_the_month() {
        let mut session = fixture_session();
        session.ask("Ventas en mayo 2021").await.unwrap();

        let turn = session.ask("¿Y el total de ese año?").await.unwrap();

        assert_eq!(turn.intent, Intent::new(Action::SalesByYear).with_year(2021));
        assert_eq!(turn.result.get("total_unidades"), Some(&json!(160.0)));
    }

    #[tokio::test]
    async fn test_fixture_directory_end_to_end() {
        let mut session = fixture_session();

        let turn = session.ask("Top 2 familias 2019").await.unwrap();
        assert_eq!(
            turn.answer,
            "Familias más vendidas en 2019: 1. Tornillos (215 unidades); 2. Anclas (60 unidades)."
        );
    }

    #[test]
    fn test_reloading_same_files_reuses_table() {
        let dir = TempDir::new().unwrap();
        let mut session = loaded_session(&dir);
        let first = Arc::clone(session.table().unwrap());

        session.try_load().unwrap();
        assert!(Arc::ptr_eq(&first, session.table().unwrap()));
    }
}
