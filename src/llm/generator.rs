//! Concurrent artifact generation.
//!
//! Issues `count` identical completion requests at once and writes each
//! response to `prompt<index>.json`. The index is fixed when the request is
//! dispatched, so the files on disk do not depend on the order in which
//! responses arrive.
//!
//! All requests live in one [`JoinSet`]. When any of them fails, the rest
//! are aborted and awaited before the error is returned, so nothing
//! outlives the stage.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{error, info, info_span, Instrument};

use super::completion::{CompletionClient, CompletionRequest};
use crate::error::LlmError;
use crate::pipeline::config::PipelineConfig;

/// One persisted completion response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Position of the request in dispatch order.
    pub index: usize,
    /// File the response body was written to.
    pub path: PathBuf,
}

/// File name for the artifact at `index`.
pub fn artifact_file_name(index: usize) -> String {
    format!("prompt{index}.json")
}

/// Writes one response body, creating the output directory if needed.
///
/// Directory creation tolerates a sibling task creating it concurrently.
pub async fn write_artifact(
    output_dir: &Path,
    index: usize,
    body: &[u8],
) -> Result<PathBuf, LlmError> {
    tokio::fs::create_dir_all(output_dir).await?;
    let path = output_dir.join(artifact_file_name(index));
    tokio::fs::write(&path, body).await?;
    Ok(path)
}

/// Fans out completion requests and persists each response.
pub struct ArtifactGenerator {
    client: CompletionClient,
    request: Arc<CompletionRequest>,
    count: usize,
    output_dir: PathBuf,
}

impl ArtifactGenerator {
    pub fn new(
        client: CompletionClient,
        request: CompletionRequest,
        count: usize,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            client,
            request: Arc::new(request),
            count,
            output_dir: output_dir.into(),
        }
    }

    /// Builds a generator from the `[generator]` and `[azure]` settings.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, LlmError> {
        let settings = &config.generator;
        Ok(Self::new(
            CompletionClient::from_config(config)?,
            CompletionRequest::conversation(
                settings.model.clone(),
                settings.system_prompt.clone(),
                settings.user_prompt.clone(),
            ),
            settings.count,
            settings.output_dir.clone(),
        ))
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Runs all requests concurrently and returns the artifacts by index.
    ///
    /// # Errors
    ///
    /// Returns the first failure observed. Remaining requests are aborted;
    /// artifacts already written stay on disk.
    pub async fn generate(&self) -> Result<Vec<Artifact>, LlmError> {
        info!(
            count = self.count,
            url = self.client.url(),
            output_dir = %self.output_dir.display(),
            "Requesting completions"
        );

        let mut join_set = JoinSet::new();
        for index in 0..self.count {
            let client = self.client.clone();
            let request = Arc::clone(&self.request);
            let output_dir = self.output_dir.clone();

            join_set.spawn(
                async move {
                    let body = client.complete(&request).await?;
                    let path = write_artifact(&output_dir, index, &body).await?;
                    info!(path = %path.display(), "Saved completion");
                    Ok::<Artifact, LlmError>(Artifact { index, path })
                }
                .instrument(info_span!("completion", index)),
            );
        }

        let mut artifacts = Vec::with_capacity(self.count);
        while let Some(joined) = join_set.join_next().await {
            let outcome = joined
                .map_err(|e| LlmError::TaskFailed(e.to_string()))
                .and_then(|result| result);

            match outcome {
                Ok(artifact) => artifacts.push(artifact),
                Err(e) => {
                    error!(error = %e, "Completion failed, cancelling remaining requests");
                    join_set.abort_all();
                    while join_set.join_next().await.is_some() {}
                    return Err(e);
                }
            }
        }

        artifacts.sort_by_key(|a| a.index);
        Ok(artifacts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_file_name() {
        assert_eq!(artifact_file_name(0), "prompt0.json");
        assert_eq!(artifact_file_name(12), "prompt12.json");
    }

    #[tokio::test]
    async fn test_write_artifact_creates_directory_and_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("dreamweavers").join("metadata");

        let path = write_artifact(&out, 1, br#"{"a":1}"#).await.unwrap();
        assert_eq!(path, out.join("prompt1.json"));
        assert_eq!(std::fs::read(&path).unwrap(), br#"{"a":1}"#);

        let path = write_artifact(&out, 1, br#"{"a":2}"#).await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), br#"{"a":2}"#);
    }

    #[tokio::test]
    async fn test_concurrent_directory_creation_is_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("metadata");

        let (a, b, c) = tokio::join!(
            write_artifact(&out, 0, b"{}"),
            write_artifact(&out, 1, b"{}"),
            write_artifact(&out, 2, b"{}"),
        );
        assert!(a.is_ok() && b.is_ok() && c.is_ok());
        assert_eq!(std::fs::read_dir(&out).unwrap().count(), 3);
    }

    mod fan_out {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::time::{Duration, Instant};

        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

        use super::*;

        /// First request fails at once; the rest answer after `delay`.
        struct FailFirst {
            seen: AtomicUsize,
            delay: Duration,
        }

        impl Respond for FailFirst {
            fn respond(&self, _request: &Request) -> ResponseTemplate {
                if self.seen.fetch_add(1, Ordering::SeqCst) == 0 {
                    ResponseTemplate::new(500).set_body_string("overloaded")
                } else {
                    ResponseTemplate::new(200)
                        .set_body_string(r#"{"id":"late"}"#)
                        .set_delay(self.delay)
                }
            }
        }

        async fn generator_for(server: &MockServer, output_dir: &Path) -> ArtifactGenerator {
            let client = CompletionClient::new(
                format!("{}/completions", server.uri()),
                "key",
                Duration::from_secs(30),
            )
            .unwrap();
            ArtifactGenerator::new(
                client,
                CompletionRequest::conversation("gpt-3.5-turbo", "s", "u"),
                3,
                output_dir,
            )
        }

        fn written(output_dir: &Path) -> Vec<PathBuf> {
            (0..3)
                .map(|i| output_dir.join(artifact_file_name(i)))
                .filter(|p| p.exists())
                .collect()
        }

        #[tokio::test]
        async fn test_failure_cancels_in_flight_requests() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/completions"))
                .respond_with(FailFirst {
                    seen: AtomicUsize::new(0),
                    delay: Duration::from_secs(2),
                })
                .mount(&server)
                .await;

            let dir = tempfile::tempdir().unwrap();
            let out = dir.path().join("metadata");
            let generator = generator_for(&server, &out).await;

            let started = Instant::now();
            let err = generator.generate().await.unwrap_err();
            assert!(matches!(err, LlmError::ApiError { code: 500, .. }), "got {err:?}");
            assert!(started.elapsed() < Duration::from_secs(1));

            // Siblings were aborted, so nothing lands once their responses would have arrived.
            tokio::time::sleep(Duration::from_millis(2500)).await;
            assert!(written(&out).is_empty());
        }

        #[tokio::test]
        async fn test_non_json_response_writes_nothing() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
                .mount(&server)
                .await;

            let dir = tempfile::tempdir().unwrap();
            let out = dir.path().join("metadata");
            let generator = generator_for(&server, &out).await;

            let err = generator.generate().await.unwrap_err();
            assert!(matches!(err, LlmError::ParseError(_)), "got {err:?}");
            assert!(written(&out).is_empty());
        }
    }
}
