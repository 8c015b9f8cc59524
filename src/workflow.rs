//! Authoring sessions: draft → validated, transcoded, assembled, packaged post.
//!
//! One [`AuthoringSession`] owns one draft. Create and edit are the same
//! pipeline; they differ only in where the draft starts and which id the
//! manifest gets (fresh for create, the post's own for edit).
//!
//! ## Submission
//!
//! ```text
//! Editing → Validating → Transcoding → Assembling → Packaging → Done
//!               │             └────────────┴────────────┴──→ Failed → Editing
//!               └─ validation error ──────────────────────────────────→ Editing
//! ```
//!
//! Every image is resolved and transcoded on rayon's pool; all of them finish
//! before assembly starts. Existing images missing from the catalog are
//! dropped with a warning. Undecodable images, assembly errors and writer
//! errors fail the submission with one generic message and leave the draft
//! intact for a retry. A successful submission discards the draft, which
//! releases every preview handle it held.
//!
//! ## Re-entrancy
//!
//! Session state lives behind a mutex. A second `submit`, or any draft edit,
//! while a submission is in flight fails with [`SubmitError::Busy`]. The
//! pipeline itself runs without holding the lock.

use crate::archive::{self, ArchiveError, Manifest, TranscodedImage};
use crate::catalog::Catalog;
use crate::config::AppConfig;
use crate::draft::{AddOutcome, Draft, DraftLimits, ImageItem, PreviewStore, ValidationError};
use crate::imaging::{Dimensions, ImageBackend, Quality, TranscodeConfig, TranscodeError, transcode};
use crate::import::ImportedPost;
use crate::naming;
use crate::package::{ArchiveLayout, PackageError, PackageWriter};
use crate::types::{Post, PostFields};
use rayon::prelude::*;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Editing,
    Validating,
    Transcoding,
    Assembling,
    Packaging,
    Done,
    Failed,
}

impl SessionState {
    /// A submission is running.
    pub fn is_busy(self) -> bool {
        matches!(
            self,
            Self::Validating | Self::Transcoding | Self::Assembling | Self::Packaging
        )
    }
}

/// Whether the session creates a new post or rewrites an existing one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionMode {
    Create,
    Edit { id: String },
}

/// Progress events emitted during a submission.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitEvent {
    StateChanged(SessionState),
    ImageTranscoded {
        position: usize,
        label: String,
        original: Dimensions,
        output: Dimensions,
        optimized: bool,
        fallback_reason: Option<String>,
    },
    ImageDropped {
        position: usize,
        label: String,
        reason: String,
    },
    Packaged {
        file_name: String,
        size: usize,
    },
}

/// Cause behind a failed submission.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("image {} ({label}) is unreadable", position + 1)]
    Transcode {
        position: usize,
        label: String,
        #[source]
        source: TranscodeError,
    },
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error(transparent)]
    Package(#[from] PackageError),
}

#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("{0}")]
    Validation(#[from] ValidationError),
    #[error("a submission is already in progress")]
    Busy,
    #[error("this session is finished")]
    NoDraft,
    #[error("none of the post's images are available")]
    EmptyImageSet { warnings: Vec<String> },
    #[error("could not generate the archive, try again")]
    Failed(#[source] PipelineError),
}

/// A packaged post.
#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    /// Suggested download name.
    pub file_name: String,
    pub package: Vec<u8>,
    pub manifest: Manifest,
    /// Images dropped along the way, in position order.
    pub warnings: Vec<String>,
}

/// The external pieces a session works against.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub backend: &'a dyn ImageBackend,
    pub catalog: &'a dyn Catalog,
    pub writer: &'a dyn PackageWriter,
}

/// Session settings derived from [`AppConfig`].
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub limits: DraftLimits,
    pub transcode: TranscodeConfig,
    pub layout: ArchiveLayout,
    pub download_prefix: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl SessionSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            limits: (&config.posts).into(),
            transcode: TranscodeConfig {
                max_dimension: config.images.max_dimension,
                quality: Quality::new(config.images.quality),
            },
            layout: (&config.archive).into(),
            download_prefix: config.archive.download_prefix.clone(),
        }
    }
}

struct SessionInner {
    state: SessionState,
    draft: Option<Draft>,
}

/// Image source captured at submit time, detached from the draft.
enum Source {
    Existing(String),
    New {
        name: String,
        content_type: String,
        bytes: Arc<[u8]>,
    },
}

impl Source {
    fn label(&self) -> &str {
        match self {
            Source::Existing(path) => path,
            Source::New { name, .. } => name,
        }
    }
}

enum ImageResult {
    Ready(TranscodedImage),
    Dropped { position: usize, warning: String },
    Unreadable(PipelineError),
}

pub struct AuthoringSession<'a> {
    services: Collaborators<'a>,
    settings: SessionSettings,
    mode: SessionMode,
    previews: PreviewStore,
    inner: Mutex<SessionInner>,
    progress: Option<Sender<SubmitEvent>>,
}

impl<'a> AuthoringSession<'a> {
    fn with_draft(
        services: Collaborators<'a>,
        settings: SessionSettings,
        mode: SessionMode,
        previews: PreviewStore,
        draft: Draft,
    ) -> Self {
        Self {
            services,
            settings,
            mode,
            previews,
            inner: Mutex::new(SessionInner {
                state: SessionState::Editing,
                draft: Some(draft),
            }),
            progress: None,
        }
    }

    /// Session for a new post, starting from an empty draft.
    pub fn create(services: Collaborators<'a>, settings: SessionSettings) -> Self {
        let previews = PreviewStore::new();
        let draft = Draft::new(settings.limits, previews.clone());
        Self::with_draft(services, settings, SessionMode::Create, previews, draft)
    }

    /// Session editing `post`. Returns notices for anything not carried over.
    pub fn edit(services: Collaborators<'a>, settings: SessionSettings, post: &Post) -> (Self, Vec<String>) {
        let previews = PreviewStore::new();
        let (draft, notices) = Draft::from_post(post, settings.limits, previews.clone());
        let mode = SessionMode::Edit {
            id: post.id.clone(),
        };
        (
            Self::with_draft(services, settings, mode, previews, draft),
            notices,
        )
    }

    /// Session for a re-imported package. Keeps the package's id when it has one.
    pub fn import(
        services: Collaborators<'a>,
        settings: SessionSettings,
        imported: ImportedPost,
    ) -> (Self, AddOutcome, Vec<String>) {
        let previews = PreviewStore::new();
        let mut draft = Draft::new(settings.limits, previews.clone());
        let PostFields {
            title,
            map_id,
            method,
            tags,
        } = imported.fields;
        draft.set_title(&title);
        draft.set_map(map_id);
        draft.set_methods(method);
        draft.set_side(tags.side);
        draft.set_site(tags.site);
        draft.set_utility(tags.utility);
        let added = draft.add_images(imported.images);

        let mode = match imported.id {
            Some(id) => SessionMode::Edit { id },
            None => SessionMode::Create,
        };
        (
            Self::with_draft(services, settings, mode, previews, draft),
            added,
            imported.notices,
        )
    }

    /// Send progress events to `tx`.
    pub fn with_progress(mut self, tx: Sender<SubmitEvent>) -> Self {
        self.progress = Some(tx);
        self
    }

    pub fn mode(&self) -> &SessionMode {
        &self.mode
    }

    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    /// Preview handles held by this session's draft.
    pub fn previews(&self) -> &PreviewStore {
        &self.previews
    }

    /// Read the draft. `None` once the session is done.
    pub fn read<R>(&self, f: impl FnOnce(&Draft) -> R) -> Option<R> {
        self.lock().draft.as_ref().map(f)
    }

    /// Mutate the draft. Rejected while a submission is in flight.
    pub fn edit_draft<R>(&self, f: impl FnOnce(&mut Draft) -> R) -> Result<R, SubmitError> {
        let mut inner = self.lock();
        if inner.state.is_busy() {
            return Err(SubmitError::Busy);
        }
        let draft = inner.draft.as_mut().ok_or(SubmitError::NoDraft)?;
        let result = f(draft);
        if inner.state == SessionState::Failed {
            inner.state = SessionState::Editing;
        }
        Ok(result)
    }

    /// Validate, transcode, assemble and package the draft.
    pub fn submit(&self) -> Result<SubmitOutcome, SubmitError> {
        let (fields, sources) = {
            let mut inner = self.lock();
            if inner.state.is_busy() {
                return Err(SubmitError::Busy);
            }
            let Some(draft) = inner.draft.as_ref() else {
                return Err(SubmitError::NoDraft);
            };
            let snapshot = draft.validate().map(|()| {
                let sources: Vec<Source> = draft.images().iter().map(capture).collect();
                (draft.fields().clone(), sources)
            });
            self.set_state(&mut inner, SessionState::Validating);
            match snapshot {
                Ok(snapshot) => {
                    self.set_state(&mut inner, SessionState::Transcoding);
                    snapshot
                }
                Err(err) => {
                    self.set_state(&mut inner, SessionState::Editing);
                    return Err(err.into());
                }
            }
        };

        let result = self.run_pipeline(&fields, &sources);

        let mut inner = self.lock();
        match &result {
            Ok(_) => {
                self.set_state(&mut inner, SessionState::Done);
                inner.draft = None;
            }
            Err(_) => {
                self.set_state(&mut inner, SessionState::Failed);
                self.set_state(&mut inner, SessionState::Editing);
            }
        }
        result
    }

    fn run_pipeline(&self, fields: &PostFields, sources: &[Source]) -> Result<SubmitOutcome, SubmitError> {
        let results: Vec<ImageResult> = sources
            .par_iter()
            .enumerate()
            .map(|(position, source)| self.prepare_image(position, source))
            .collect();

        let mut ready = Vec::with_capacity(results.len());
        let mut warnings = Vec::new();
        for result in results {
            match result {
                ImageResult::Ready(image) => ready.push(image),
                ImageResult::Dropped { position, warning } => {
                    warnings.push(format!("image {}: {warning}", position + 1))
                }
                ImageResult::Unreadable(err) => return Err(SubmitError::Failed(err)),
            }
        }
        if ready.is_empty() {
            return Err(SubmitError::EmptyImageSet { warnings });
        }

        self.transition(SessionState::Assembling);
        let id = match &self.mode {
            SessionMode::Edit { id } => id.clone(),
            SessionMode::Create => {
                let map_id = fields.map_id.as_deref().unwrap_or_default();
                naming::generate_post_id(map_id, &mut rand::rng())
            }
        };
        let assembled = archive::assemble(&id, fields, ready)
            .map_err(|e| SubmitError::Failed(e.into()))?;
        let manifest = assembled.manifest.clone();

        self.transition(SessionState::Packaging);
        let (manifest_blob, images) = self.settings.layout.entries(assembled);
        let package = self
            .services
            .writer
            .write_package(&manifest_blob, &images)
            .map_err(|e| SubmitError::Failed(e.into()))?;

        let file_name = naming::download_file_name(&self.settings.download_prefix, &fields.title);
        self.emit(SubmitEvent::Packaged {
            file_name: file_name.clone(),
            size: package.len(),
        });
        Ok(SubmitOutcome {
            file_name,
            package,
            manifest,
            warnings,
        })
    }

    /// Resolve and transcode one image. Runs on a rayon worker.
    fn prepare_image(&self, position: usize, item: &Source) -> ImageResult {
        let label = item.label().to_string();
        let resolved;
        let (bytes, content_type): (&[u8], Option<&str>) = match item {
            Source::Existing(path) => match self.services.catalog.resolve_existing_image_bytes(path) {
                Some(b) => {
                    resolved = b;
                    (resolved.as_slice(), None)
                }
                None => {
                    let reason = "not found in catalog".to_string();
                    self.emit(SubmitEvent::ImageDropped {
                        position,
                        label: label.clone(),
                        reason: reason.clone(),
                    });
                    return ImageResult::Dropped {
                        position,
                        warning: format!("{label} {reason}"),
                    };
                }
            },
            Source::New {
                content_type,
                bytes,
                ..
            } => (&bytes[..], Some(content_type.as_str())),
        };

        match transcode(self.services.backend, bytes, &self.settings.transcode) {
            Ok(t) => {
                self.emit(SubmitEvent::ImageTranscoded {
                    position,
                    label: label.clone(),
                    original: t.original,
                    output: t.output,
                    optimized: t.optimized,
                    fallback_reason: t.fallback_reason.clone(),
                });
                ImageResult::Ready(TranscodedImage {
                    position,
                    extension: naming::choose_extension(t.mime, content_type, Some(&label)),
                    bytes: t.bytes,
                })
            }
            Err(err) => ImageResult::Unreadable(PipelineError::Transcode {
                position,
                label,
                source: err,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        // State and draft are only replaced whole; a poisoned lock still holds a consistent value.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_state(&self, inner: &mut SessionInner, state: SessionState) {
        inner.state = state;
        self.emit(SubmitEvent::StateChanged(state));
    }

    fn transition(&self, state: SessionState) {
        let mut inner = self.lock();
        self.set_state(&mut inner, state);
    }

    fn emit(&self, event: SubmitEvent) {
        if let Some(tx) = &self.progress {
            tx.send(event).ok();
        }
    }
}

fn capture(item: &ImageItem) -> Source {
    match item {
        ImageItem::Existing { path } => Source::Existing(path.clone()),
        ImageItem::New(image) => Source::New {
            name: image.name.clone(),
            content_type: image.content_type.clone(),
            bytes: Arc::clone(&image.bytes),
        },
    }
}
