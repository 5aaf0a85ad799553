// Runs controller requests against the backend on the tokio runtime and
// reports each outcome back through the settlement channel.

use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::Instrument;

use crate::app::{Request, Settlement};
use crate::backend::{MedRagApi, ReportUpload};

pub struct Dispatcher {
    api: Arc<dyn MedRagApi>,
    tx: UnboundedSender<Settlement>,
}

impl Dispatcher {
    pub fn new(api: Arc<dyn MedRagApi>, tx: UnboundedSender<Settlement>) -> Self {
        Self { api, tx }
    }

    /// Spawn the request. Exactly one settlement is sent for it, whatever happens.
    pub fn dispatch(&self, request: Request) {
        let api = Arc::clone(&self.api);
        let tx = self.tx.clone();

        match request {
            Request::Ask { id, question } => {
                let span = tracing::info_span!("ask", request = id.0);
                tokio::spawn(
                    async move {
                        let result = api.ask(&question).await;
                        if tx.send(Settlement::Answered { id, result }).is_err() {
                            tracing::debug!("event loop gone, answer discarded");
                        }
                    }
                    .instrument(span),
                );
            }
            Request::Upload { id, path } => {
                let span = tracing::info_span!("upload", request = id.0, path = %path.display());
                tokio::spawn(
                    async move {
                        let result = match ReportUpload::from_path(&path).await {
                            Ok(report) => api.upload(report).await,
                            Err(e) => Err(e),
                        };
                        if tx.send(Settlement::Uploaded { id, result }).is_err() {
                            tracing::debug!("event loop gone, upload result discarded");
                        }
                    }
                    .instrument(span),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::App;
    use crate::backend::{ApiError, AskResponse};
    use crate::config::Config;
    use crate::medical::{EvidenceChunk, MedicalAnalysis};
    use async_trait::async_trait;
    use std::io::Write;
    use std::sync::Mutex;
    use std::time::Instant;
    use tokio::sync::mpsc;

    /// In-memory backend that records what it was asked.
    #[derive(Default)]
    struct FakeApi {
        answer: Option<AskResponse>,
        uploads: Mutex<Vec<String>>,
        questions: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl MedRagApi for FakeApi {
        async fn upload(&self, report: ReportUpload) -> Result<MedicalAnalysis, ApiError> {
            self.uploads.lock().unwrap().push(report.file_name);
            let mut analysis = MedicalAnalysis::default();
            analysis.report_type = "CBC".to_string();
            Ok(analysis)
        }

        async fn ask(&self, question: &str) -> Result<AskResponse, ApiError> {
            self.questions.lock().unwrap().push(question.to_string());
            self.answer
                .clone()
                .ok_or_else(|| ApiError::Network("connection refused".to_string()))
        }
    }

    fn report_file(dir: &tempfile::TempDir) -> std::path::PathBuf {
        let path = dir.path().join("cbc.pdf");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"%PDF-1.4").unwrap();
        path
    }

    #[tokio::test]
    async fn test_upload_then_ask_round_trip() {
        let api = Arc::new(FakeApi {
            answer: Some(AskResponse {
                answer: "Your hemoglobin is low at 9.1.".to_string(),
                chunks: vec![EvidenceChunk {
                    content: "Hemoglobin 9.1 L".to_string(),
                    source: "doc1".to_string(),
                    test_name: Some("Hemoglobin".to_string()),
                    score: 0.87,
                }],
            }),
            ..Default::default()
        });
        let (tx, mut rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher::new(api.clone(), tx);
        let mut app = App::new(Config::default());
        let dir = tempfile::tempdir().unwrap();

        let upload = app.begin_upload(&report_file(&dir)).unwrap();
        dispatcher.dispatch(upload);
        app.settle(rx.recv().await.unwrap(), Instant::now());
        assert_eq!(app.analysis().unwrap().report_type, "CBC");

        app.ui.input = "What is my hemoglobin?".to_string();
        let ask = app.submit_input().unwrap();
        dispatcher.dispatch(ask);
        app.settle(rx.recv().await.unwrap(), Instant::now());

        assert_eq!(app.conversation().len(), 2);
        assert_eq!(app.conversation().turns()[1].evidence().len(), 1);
        assert_eq!(*api.uploads.lock().unwrap(), vec!["cbc.pdf".to_string()]);
        assert_eq!(*api.questions.lock().unwrap(), vec!["What is my hemoglobin?".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_ask_settles_once() {
        let api = Arc::new(FakeApi::default());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher::new(api, tx);
        let mut app = App::new(Config::default());
        let dir = tempfile::tempdir().unwrap();

        dispatcher.dispatch(app.begin_upload(&report_file(&dir)).unwrap());
        app.settle(rx.recv().await.unwrap(), Instant::now());

        app.ui.input = "anything".to_string();
        dispatcher.dispatch(app.submit_input().unwrap());
        let settlement = rx.recv().await.unwrap();
        assert!(matches!(settlement, Settlement::Answered { result: Err(ApiError::Network(_)), .. }));
        app.settle(settlement, Instant::now());

        assert_eq!(app.conversation().len(), 2);
        assert!(!app.is_submitting());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_missing_file_settles_as_upload_error() {
        let api = Arc::new(FakeApi::default());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher::new(api.clone(), tx);
        let mut app = App::new(Config::default());
        let dir = tempfile::tempdir().unwrap();

        let request = app.begin_upload(&dir.path().join("missing.pdf")).unwrap();
        dispatcher.dispatch(request);

        match rx.recv().await.unwrap() {
            Settlement::Uploaded { result, .. } => assert!(matches!(result, Err(ApiError::File(_)))),
            other => panic!("unexpected settlement {:?}", other),
        }
        assert!(api.uploads.lock().unwrap().is_empty());
    }
}
