//! Presentation build workflow.
//!
//! One [`Orchestrator::generate`] call drives one run through
//! `Idle → SessionCreated → SlidesBuilt → Styled → Persisted`. Each step
//! depends on the previous step's effect on the server, so the steps are
//! issued strictly in sequence even though the correlator underneath could
//! multiplex them.
//!
//! Failure policy:
//! - styling failures are logged and swallowed;
//! - any other failure moves the run to `Failed` and starts the fallback
//!   workflow (fresh session, one title-only slide, immediate save);
//! - if the fallback fails too the caller gets [`AppError::WorkflowFailed`].

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::GlobalConfig;
use crate::toolserver::invoker::ToolCaller;
use crate::workflow::content::{self, ContentSource, SlideContent};
use crate::workflow::downloads;
use crate::workflow::session::{
    extract_session_id, extract_slide_count, extract_slide_index, PresentationSession,
};
use crate::{AppError, Result};

/// `create_presentation` tool.
pub const CREATE_PRESENTATION: &str = "create_presentation";
/// `add_slide` tool.
pub const ADD_SLIDE: &str = "add_slide";
/// `populate_placeholder` tool.
pub const POPULATE_PLACEHOLDER: &str = "populate_placeholder";
/// `add_bullet_points` tool.
pub const ADD_BULLET_POINTS: &str = "add_bullet_points";
/// `add_notes` tool.
pub const ADD_NOTES: &str = "add_notes";
/// `apply_professional_design` tool.
pub const APPLY_DESIGN: &str = "apply_professional_design";
/// `get_presentation_info` tool.
pub const GET_PRESENTATION_INFO: &str = "get_presentation_info";
/// `save_presentation` tool.
pub const SAVE_PRESENTATION: &str = "save_presentation";

/// Layout of the first slide.
pub const TITLE_LAYOUT: u64 = 0;
/// Layout of every other slide.
pub const BODY_LAYOUT: u64 = 1;
/// Placeholder on the title layout that receives the subtitle.
const SUBTITLE_PLACEHOLDER: u64 = 1;
/// Subtitle used when the title slide has no bullets.
const DEFAULT_SUBTITLE: &str = "Professional Presentation";
/// Title of the fallback deck when the caller gave none.
pub const FALLBACK_TITLE: &str = "Generated Presentation";

/// Stage of one workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStage {
    /// Nothing issued yet.
    Idle,
    /// `create_presentation` succeeded.
    SessionCreated,
    /// Every slide is built.
    SlidesBuilt,
    /// Styling stage finished (successfully or not).
    Styled,
    /// Saved to disk; terminal success.
    Persisted,
    /// Unrecovered error; terminal failure.
    Failed,
}

impl WorkflowStage {
    /// The only stage a successful step may move to.
    #[must_use]
    pub fn successor(self) -> Option<Self> {
        match self {
            Self::Idle => Some(Self::SessionCreated),
            Self::SessionCreated => Some(Self::SlidesBuilt),
            Self::SlidesBuilt => Some(Self::Styled),
            Self::Styled => Some(Self::Persisted),
            Self::Persisted | Self::Failed => None,
        }
    }
}

/// Successful outcome of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkflowResult {
    /// Generated `presentation_<uuid>.pptx` name.
    pub filename: String,
    /// Location the download surface serves the file from.
    pub download_location: String,
    /// Absolute path the server was asked to save to.
    pub file_path: PathBuf,
    /// Whether the fallback workflow produced this file.
    pub used_fallback: bool,
    /// Completion time.
    pub generated_at: DateTime<Utc>,
}

/// Settings the workflow needs from the global configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowSettings {
    /// Directory the server saves into.
    pub output_dir: PathBuf,
    /// Prefix for download locations.
    pub download_prefix: String,
    /// Color scheme for the styling stage.
    pub color_scheme: String,
}

impl From<&GlobalConfig> for WorkflowSettings {
    fn from(config: &GlobalConfig) -> Self {
        Self {
            output_dir: config.output_dir.clone(),
            download_prefix: config.download_prefix.clone(),
            color_scheme: config.design.color_scheme.clone(),
        }
    }
}

/// Tracks the stage of one run and logs every transition.
#[derive(Debug)]
struct WorkflowRun {
    stage: WorkflowStage,
}

impl WorkflowRun {
    fn new() -> Self {
        Self {
            stage: WorkflowStage::Idle,
        }
    }

    fn advance(&mut self, next: WorkflowStage) {
        if self.stage.successor() == Some(next) {
            info!(from = ?self.stage, to = ?next, "workflow stage advanced");
            self.stage = next;
        } else {
            error!(from = ?self.stage, to = ?next, "illegal workflow transition ignored");
        }
    }

    fn fail(&mut self, err: &AppError) {
        warn!(stage = ?self.stage, %err, "workflow failed");
        self.stage = WorkflowStage::Failed;
    }
}

/// Builds presentations by sequencing tool calls.
#[derive(Clone)]
pub struct Orchestrator {
    tools: Arc<dyn ToolCaller>,
    content: Arc<dyn ContentSource>,
    settings: WorkflowSettings,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Create an orchestrator.
    #[must_use]
    pub fn new(
        tools: Arc<dyn ToolCaller>,
        content: Arc<dyn ContentSource>,
        settings: WorkflowSettings,
    ) -> Self {
        Self {
            tools,
            content,
            settings,
        }
    }

    /// Generate one presentation for `prompt`.
    ///
    /// # Errors
    ///
    /// - [`AppError::InvalidContent`] if `prompt` is blank (no tool is called).
    /// - [`AppError::WorkflowFailed`] if the primary and the fallback
    ///   workflow both fail.
    pub async fn generate(&self, prompt: &str, title: Option<&str>) -> Result<WorkflowResult> {
        if prompt.trim().is_empty() {
            return Err(AppError::InvalidContent("prompt is required".into()));
        }

        let slides = content::resolve_content(self.content.as_ref(), prompt, title).await;
        let mut run = WorkflowRun::new();

        let primary = self
            .run_primary(&mut run, &slides)
            .instrument(info_span!("primary_workflow"))
            .await;

        let primary_err = match primary {
            Ok(result) => return Ok(result),
            Err(err) => err,
        };
        run.fail(&primary_err);
        warn!(error = %primary_err, "primary workflow abandoned; running fallback");

        match self
            .run_fallback(title)
            .instrument(info_span!("fallback_workflow"))
            .await
        {
            Ok(result) => {
                info!(filename = %result.filename, "fallback workflow succeeded");
                Ok(result)
            }
            Err(fallback_err) => {
                error!(
                    primary = %primary_err,
                    fallback = %fallback_err,
                    "fallback workflow failed"
                );
                Err(AppError::WorkflowFailed {
                    primary: Box::new(primary_err),
                    fallback: Box::new(fallback_err),
                })
            }
        }
    }

    async fn run_primary(
        &self,
        run: &mut WorkflowRun,
        slides: &[SlideContent],
    ) -> Result<WorkflowResult> {
        let mut session = self.create_session().await?;
        run.advance(WorkflowStage::SessionCreated);

        self.build_slides(&mut session, slides).await?;
        run.advance(WorkflowStage::SlidesBuilt);

        if let Err(err) = self.apply_styling(&session).await {
            warn!(%err, "styling failed; keeping unstyled presentation");
        }
        run.advance(WorkflowStage::Styled);

        let result = self.persist(&session, false).await?;
        run.advance(WorkflowStage::Persisted);
        Ok(result)
    }

    async fn run_fallback(&self, title: Option<&str>) -> Result<WorkflowResult> {
        let mut session = self.create_session().await?;

        let title = title.unwrap_or(FALLBACK_TITLE);
        self.call(
            ADD_SLIDE,
            session.arguments(json!({ "layout_index": TITLE_LAYOUT, "title": title })),
        )
        .await?;
        session.slide_count += 1;

        self.persist(&session, true).await
    }

    async fn create_session(&self) -> Result<PresentationSession> {
        let created = self.call(CREATE_PRESENTATION, json!({})).await?;
        let session = PresentationSession::new(extract_session_id(&created));
        if session.session_id.is_placeholder() {
            warn!("no presentation id in server output; using the current presentation");
        }
        info!(session_id = %session.session_id, "presentation session created");
        Ok(session)
    }

    async fn build_slides(
        &self,
        session: &mut PresentationSession,
        slides: &[SlideContent],
    ) -> Result<()> {
        for (position, slide) in slides.iter().enumerate() {
            let layout = if position == 0 { TITLE_LAYOUT } else { BODY_LAYOUT };
            let added = self
                .call(
                    ADD_SLIDE,
                    session.arguments(json!({ "layout_index": layout, "title": slide.title })),
                )
                .await?;
            let index = extract_slide_index(&added).unwrap_or(session.slide_count);
            session.slide_count += 1;
            debug!(position, index, title = %slide.title, "slide added");

            if position == 0 {
                let subtitle = slide.bullets.first().map_or(DEFAULT_SUBTITLE, String::as_str);
                self.call(
                    POPULATE_PLACEHOLDER,
                    session.arguments(json!({
                        "slide_index": index,
                        "placeholder_idx": SUBTITLE_PLACEHOLDER,
                        "text": subtitle,
                    })),
                )
                .await?;
            } else {
                self.call(
                    ADD_BULLET_POINTS,
                    session.arguments(json!({
                        "slide_index": index,
                        "bullet_points": slide.bullets,
                    })),
                )
                .await?;
            }

            if let Some(notes) = slide.notes.as_deref().filter(|n| !n.trim().is_empty()) {
                let attached = self
                    .call(
                        ADD_NOTES,
                        session.arguments(json!({ "slide_index": index, "notes": notes })),
                    )
                    .await;
                if let Err(err) = attached {
                    warn!(index, %err, "speaker notes skipped");
                }
            }
        }
        Ok(())
    }

    async fn apply_styling(&self, session: &PresentationSession) -> Result<()> {
        let scheme = self.settings.color_scheme.as_str();
        self.call(
            APPLY_DESIGN,
            session.arguments(json!({
                "operation": "theme",
                "color_scheme": scheme,
                "apply_to_existing": true,
            })),
        )
        .await?;

        let info = self
            .call(GET_PRESENTATION_INFO, session.arguments(json!({})))
            .await?;
        let count = match extract_slide_count(&info) {
            Some(reported) if reported <= session.slide_count => reported,
            Some(reported) => {
                warn!(
                    reported,
                    tracked = session.slide_count,
                    "reported slide count exceeds slides added; using tracked count"
                );
                session.slide_count
            }
            None => {
                debug!(
                    tracked = session.slide_count,
                    "slide count not reported; using tracked count"
                );
                session.slide_count
            }
        };

        for index in 0..count {
            self.call(
                APPLY_DESIGN,
                session.arguments(json!({
                    "operation": "enhance",
                    "slide_index": index,
                    "color_scheme": scheme,
                })),
            )
            .await?;
        }
        Ok(())
    }

    async fn persist(
        &self,
        session: &PresentationSession,
        used_fallback: bool,
    ) -> Result<WorkflowResult> {
        let filename = downloads::generate_filename();
        let file_path = self.settings.output_dir.join(&filename);

        info!(path = %file_path.display(), "saving presentation");
        self.call(
            SAVE_PRESENTATION,
            session.arguments(json!({ "file_path": file_path.to_string_lossy() })),
        )
        .await?;

        Ok(WorkflowResult {
            download_location: downloads::download_location(
                &self.settings.download_prefix,
                &filename,
            ),
            filename,
            file_path,
            used_fallback,
            generated_at: Utc::now(),
        })
    }

    async fn call(&self, tool: &str, arguments: Value) -> Result<Value> {
        debug!(tool, "invoking tool");
        self.tools.call_tool(tool, arguments).await
    }
}
