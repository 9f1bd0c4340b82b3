//! Scripted stage collaborators.

use async_trait::async_trait;
use chrono::Utc;
use rookery_proto::{
    CommitOutcome, Committer, DraftContent, ImageReference, Illustrator, InputRecord,
    PublishedArtifact, Publisher, RecordSource, ResearchSummary, Researcher, StageError, Writer,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Ordered responses. Once the queue runs dry the last response repeats.
#[derive(Debug)]
pub struct Script<T> {
    queue: Mutex<VecDeque<Result<T, StageError>>>,
    last: Mutex<Option<Result<T, StageError>>>,
    calls: AtomicUsize,
}

impl<T: Clone> Script<T> {
    pub fn new(responses: Vec<Result<T, StageError>>) -> Self {
        Self {
            queue: Mutex::new(responses.into()),
            last: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    /// Always returns `value`.
    pub fn always(value: T) -> Self {
        Self::new(vec![Ok(value)])
    }

    /// Always fails with `error`.
    pub fn failing(error: StageError) -> Self {
        Self::new(vec![Err(error)])
    }

    /// Returns the next response.
    pub fn next(&self) -> Result<T, StageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut last = lock(&self.last);
        if let Some(response) = lock(&self.queue).pop_front() {
            *last = Some(response.clone());
            return response;
        }
        last.clone()
            .unwrap_or_else(|| Err(StageError::Transient("script is empty".to_string())))
    }

    /// Number of responses handed out so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

async fn pause(delay: Option<Duration>) {
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
}

/// Researcher replaying a [`Script`], with per-record overrides.
#[derive(Debug)]
pub struct ScriptedResearcher {
    script: Script<ResearchSummary>,
    failures: HashMap<String, StageError>,
    panics: HashSet<String>,
    delay: Option<Duration>,
    feedback: Mutex<Vec<Option<String>>>,
}

impl ScriptedResearcher {
    pub fn new(script: Script<ResearchSummary>) -> Self {
        Self {
            script,
            failures: HashMap::new(),
            panics: HashSet::new(),
            delay: None,
            feedback: Mutex::new(Vec::new()),
        }
    }

    pub fn always(summary: ResearchSummary) -> Self {
        Self::new(Script::always(summary))
    }

    /// Fails every call for the record with id `record`.
    #[must_use]
    pub fn fail_for(mut self, record: &str, error: StageError) -> Self {
        self.failures.insert(record.to_string(), error);
        self
    }

    /// Panics on the record with id `record`.
    #[must_use]
    pub fn panic_for(mut self, record: &str) -> Self {
        self.panics.insert(record.to_string());
        self
    }

    /// Sleeps before answering.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.script.calls()
    }

    /// Feedback received on each call, in call order.
    pub fn feedback_seen(&self) -> Vec<Option<String>> {
        lock(&self.feedback).clone()
    }
}

#[async_trait]
impl Researcher for ScriptedResearcher {
    async fn research(
        &self,
        record: &InputRecord,
        feedback: Option<&str>,
    ) -> Result<ResearchSummary, StageError> {
        let id = record.id();
        if self.panics.contains(&id) {
            panic!("scripted panic for {id}");
        }
        lock(&self.feedback).push(feedback.map(str::to_string));
        pause(self.delay).await;
        if let Some(err) = self.failures.get(&id) {
            self.script.calls.fetch_add(1, Ordering::SeqCst);
            return Err(err.clone());
        }
        self.script.next()
    }
}

/// Writer replaying a [`Script`].
#[derive(Debug)]
pub struct ScriptedWriter {
    script: Script<DraftContent>,
    delay: Option<Duration>,
    feedback: Mutex<Vec<Option<String>>>,
}

impl ScriptedWriter {
    pub fn new(script: Script<DraftContent>) -> Self {
        Self {
            script,
            delay: None,
            feedback: Mutex::new(Vec::new()),
        }
    }

    pub fn always(draft: DraftContent) -> Self {
        Self::new(Script::always(draft))
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.script.calls()
    }

    pub fn feedback_seen(&self) -> Vec<Option<String>> {
        lock(&self.feedback).clone()
    }
}

#[async_trait]
impl Writer for ScriptedWriter {
    async fn write(
        &self,
        _research: &ResearchSummary,
        feedback: Option<&str>,
    ) -> Result<DraftContent, StageError> {
        lock(&self.feedback).push(feedback.map(str::to_string));
        pause(self.delay).await;
        self.script.next()
    }
}

/// Illustrator replaying a [`Script`].
#[derive(Debug)]
pub struct ScriptedIllustrator {
    script: Script<ImageReference>,
}

impl ScriptedIllustrator {
    pub fn new(script: Script<ImageReference>) -> Self {
        Self { script }
    }

    pub fn calls(&self) -> usize {
        self.script.calls()
    }
}

#[async_trait]
impl Illustrator for ScriptedIllustrator {
    async fn illustrate(
        &self,
        _record: &InputRecord,
        _draft: &DraftContent,
    ) -> Result<ImageReference, StageError> {
        self.script.next()
    }
}

/// Publisher that builds artifacts in memory under `output_dir/<slug>.md`.
///
/// Front matter carries `title` from the headline and `date` from the record.
#[derive(Debug)]
pub struct RecordingPublisher {
    output_dir: PathBuf,
    blank_fields: Vec<String>,
    failure: Option<StageError>,
    published: Mutex<Vec<PathBuf>>,
}

impl Default for RecordingPublisher {
    fn default() -> Self {
        Self::new("content/posts")
    }
}

impl RecordingPublisher {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            blank_fields: Vec::new(),
            failure: None,
            published: Mutex::new(Vec::new()),
        }
    }

    /// Emits `field` with an empty value.
    #[must_use]
    pub fn blanking(mut self, field: &str) -> Self {
        self.blank_fields.push(field.to_string());
        self
    }

    /// Fails every call with `error`.
    #[must_use]
    pub fn failing(mut self, error: StageError) -> Self {
        self.failure = Some(error);
        self
    }

    /// Paths published so far, in call order.
    pub fn published(&self) -> Vec<PathBuf> {
        lock(&self.published).clone()
    }

    pub fn calls(&self) -> usize {
        lock(&self.published).len()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(
        &self,
        record: &InputRecord,
        draft: &DraftContent,
        image: Option<&ImageReference>,
    ) -> Result<PublishedArtifact, StageError> {
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        let path = self.output_dir.join(format!("{}.md", record.slug()));
        let date = record
            .date()
            .unwrap_or_else(|| Utc::now().date_naive())
            .format("%Y-%m-%d")
            .to_string();

        let mut artifact = PublishedArtifact {
            path: path.clone(),
            body: draft.full_content(),
            ..Default::default()
        };
        artifact
            .metadata
            .insert("title".to_string(), draft.headline.clone());
        artifact.metadata.insert("date".to_string(), date);
        if let Some(image) = image {
            artifact
                .metadata
                .insert("image".to_string(), image.location.clone());
        }
        for field in &self.blank_fields {
            artifact.metadata.insert(field.clone(), String::new());
        }

        lock(&self.published).push(path);
        Ok(artifact)
    }
}

/// Committer replaying a [`Script`] and tracking overlapping calls.
#[derive(Debug)]
pub struct ScriptedCommitter {
    script: Script<CommitOutcome>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedCommitter {
    pub fn new(script: Script<CommitOutcome>) -> Self {
        Self {
            script,
            delay: None,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn always(outcome: CommitOutcome) -> Self {
        Self::new(Script::always(outcome))
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.script.calls()
    }

    /// Highest number of commits that were ever running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Committer for ScriptedCommitter {
    async fn commit(&self, _artifact: &PublishedArtifact) -> Result<CommitOutcome, StageError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let result = self.script.next();
        pause(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Record source returning a fixed list.
#[derive(Debug, Clone)]
pub struct StaticRecordSource {
    records: Result<Vec<InputRecord>, StageError>,
}

impl StaticRecordSource {
    pub fn new(records: Vec<InputRecord>) -> Self {
        Self {
            records: Ok(records),
        }
    }

    pub fn failing(error: StageError) -> Self {
        Self {
            records: Err(error),
        }
    }
}

#[async_trait]
impl RecordSource for StaticRecordSource {
    async fn list_records(&self) -> Result<Vec<InputRecord>, StageError> {
        self.records.clone()
    }
}
