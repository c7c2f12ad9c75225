//! Slide content supplied by the content-generation collaborator.
//!
//! The orchestrator consumes exactly [`SLIDE_COUNT`] entries. Whatever the
//! collaborator returns is validated first; a wrong count, a blank title, or
//! a collaborator failure is an input problem and is answered with the
//! built-in deck rather than failing the run.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{AppError, Result};

/// Number of slides in every generated deck.
pub const SLIDE_COUNT: usize = 5;

/// Title used when the caller does not provide one.
pub const DEFAULT_TITLE: &str = "Presentation Title";

/// Text content of one slide.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlideContent {
    /// Slide title.
    pub title: String,
    /// Ordered bullet points.
    #[serde(alias = "content", default)]
    pub bullets: Vec<String>,
    /// Presenter notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl SlideContent {
    /// Slide without notes.
    #[must_use]
    pub fn new(title: impl Into<String>, bullets: &[&str]) -> Self {
        Self {
            title: title.into(),
            bullets: bullets.iter().map(|&b| b.to_owned()).collect(),
            notes: None,
        }
    }
}

/// Turns a topic prompt into slide text.
pub trait ContentSource: Send + Sync {
    /// Produce slides for `prompt`, optionally under an explicit `title`.
    ///
    /// # Errors
    ///
    /// Implementation-specific; the orchestrator recovers from any error.
    fn generate<'a>(
        &'a self,
        prompt: &'a str,
        title: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<SlideContent>>> + Send + 'a>>;
}

/// Fixed five-slide deck; the offline default and the recovery set.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinContent;

impl BuiltinContent {
    /// The built-in deck with its first slide titled `title`.
    #[must_use]
    pub fn deck(title: Option<&str>) -> Vec<SlideContent> {
        vec![
            SlideContent::new(
                title.unwrap_or(DEFAULT_TITLE),
                &["Professional presentation created with MCP PowerPoint Server"],
            ),
            SlideContent::new(
                "Overview",
                &[
                    "Key objectives and goals",
                    "Market analysis and opportunities",
                    "Strategic approach and methodology",
                    "Expected outcomes and benefits",
                ],
            ),
            SlideContent::new(
                "Key Metrics",
                &[
                    "Performance Metrics: 94% customer satisfaction",
                    "Growth Rate: 127% year-over-year increase",
                    "Market Share: 45% of target segment",
                    "ROI: 340% return on investment",
                ],
            ),
            SlideContent::new(
                "Strategic Insights",
                &[
                    "Data-driven decision making approach",
                    "Customer-centric solution development",
                    "Agile implementation methodology",
                    "Continuous improvement and optimization",
                ],
            ),
            SlideContent::new(
                "Next Steps",
                &[
                    "Implementation roadmap and timeline",
                    "Resource allocation and team structure",
                    "Success metrics and KPI tracking",
                    "Follow-up meetings and checkpoints",
                ],
            ),
        ]
    }
}

impl ContentSource for BuiltinContent {
    fn generate<'a>(
        &'a self,
        _prompt: &'a str,
        title: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<SlideContent>>> + Send + 'a>> {
        Box::pin(async move { Ok(Self::deck(title)) })
    }
}

/// Reads a JSON array of slides from disk, e.g. the saved output of an
/// upstream language-model step.
#[derive(Debug, Clone)]
pub struct FileContent {
    path: PathBuf,
}

impl FileContent {
    /// Content source backed by the JSON file at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ContentSource for FileContent {
    fn generate<'a>(
        &'a self,
        _prompt: &'a str,
        title: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<SlideContent>>> + Send + 'a>> {
        Box::pin(async move {
            let raw = tokio::fs::read_to_string(&self.path).await.map_err(|err| {
                AppError::InvalidContent(format!("cannot read {}: {err}", self.path.display()))
            })?;
            let mut slides: Vec<SlideContent> = serde_json::from_str(&raw)
                .map_err(|err| AppError::InvalidContent(format!("malformed slide json: {err}")))?;
            if let (Some(title), Some(first)) = (title, slides.first_mut()) {
                title.clone_into(&mut first.title);
            }
            Ok(slides)
        })
    }
}

/// Check that `slides` is a usable deck.
///
/// # Errors
///
/// Returns [`AppError::InvalidContent`] unless there are exactly
/// [`SLIDE_COUNT`] slides and every title is non-blank.
pub fn validate(slides: &[SlideContent]) -> Result<()> {
    if slides.len() != SLIDE_COUNT {
        return Err(AppError::InvalidContent(format!(
            "expected {SLIDE_COUNT} slides, got {}",
            slides.len()
        )));
    }
    if let Some(index) = slides.iter().position(|s| s.title.trim().is_empty()) {
        return Err(AppError::InvalidContent(format!("slide {index} has a blank title")));
    }
    Ok(())
}

/// Ask `source` for slides, substituting the built-in deck on any problem.
pub async fn resolve_content(
    source: &dyn ContentSource,
    prompt: &str,
    title: Option<&str>,
) -> Vec<SlideContent> {
    match source.generate(prompt, title).await {
        Ok(slides) => match validate(&slides) {
            Ok(()) => slides,
            Err(err) => {
                warn!(%err, "content rejected; using built-in deck");
                BuiltinContent::deck(title)
            }
        },
        Err(err) => {
            warn!(%err, "content generation failed; using built-in deck");
            BuiltinContent::deck(title)
        }
    }
}
