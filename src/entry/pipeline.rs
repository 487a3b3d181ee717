//! Entry state machine: capture, optional recognition, review, commit.
//!
//! ```text
//! Idle -> Capturing -> [Recognizing] -> Reviewing -> Committed
//! ```
//!
//! Photo and text captures pass through `Recognizing`; manual captures and
//! edits of existing records go straight to `Reviewing`. While a recognition
//! call is in flight every capture-related action fails with
//! [`EntryError::Busy`], so two calls can never race to fill the same
//! candidate.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    calendar::Zone,
    core::store::{MealStore, StoreError},
    error::ValidationError,
    meal::{MealDraft, MealPatch, MealRecord, normalize_food_name, parse_protein},
    types::{Category, MealId},
};

use super::{
    image::{ImageLimits, ImagePreprocessor, PreparedImage, RawImage},
    recognition::{RecognitionFailure, RecognitionRequest, Recognizer, parse_recognition},
};

/// Why a pipeline action was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntryError {
    /// A recognition call is still outstanding.
    #[error("a recognition request is still in flight")]
    Busy,
    /// The action does not apply in the current state.
    #[error("cannot {action} while {state}")]
    InvalidTransition {
        /// State the pipeline was in.
        state: &'static str,
        /// Action that was attempted.
        action: &'static str,
    },
    /// Candidate or capture failed validation.
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    /// The image could not be prepared.
    #[error(transparent)]
    Recognition(#[from] RecognitionFailure),
    /// The store refused the submission.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// How the user is entering a meal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryMode {
    /// A photo sent for recognition.
    Photo,
    /// A free-text description sent for recognition.
    Text,
    /// Fields typed directly, no recognition.
    Manual,
}

/// Where an [`EntryPipeline`] is in its flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Nothing in progress.
    Idle,
    /// Waiting for input.
    Capturing {
        /// Chosen entry mode.
        mode: EntryMode,
    },
    /// A recognition call is in flight.
    Recognizing {
        /// Mode that produced the request.
        mode: EntryMode,
    },
    /// A candidate is staged for review.
    Reviewing {
        /// Mode that produced the candidate.
        mode: EntryMode,
    },
    /// The last candidate was written to the store.
    Committed {
        /// Record written.
        id: MealId,
    },
}

impl PipelineState {
    /// Short lowercase name for logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Capturing { .. } => "capturing",
            Self::Recognizing { .. } => "recognizing",
            Self::Reviewing { .. } => "reviewing",
            Self::Committed { .. } => "committed",
        }
    }
}

/// What happens to an edited record's timestamp when its target date changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditTimestampPolicy {
    /// Keep the original instant regardless of the edited date.
    #[default]
    Preserve,
    /// Move the record onto the edited date within the same undoable edit.
    FollowTargetDate,
}

/// Editable staging fields. Protein is kept as typed text until commit.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Candidate {
    /// Name as typed or recognized.
    pub food_name: String,
    /// Protein as typed, parsed at commit.
    pub protein: String,
    /// Chosen category.
    pub category: Category,
    /// Attached image, if any.
    pub image_url: Option<String>,
    /// `None` means today.
    pub target_date: Option<NaiveDate>,
}

/// Input for a photo or text capture.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CaptureInput {
    /// Photo for photo mode.
    pub image: Option<RawImage>,
    /// Description for text mode.
    pub text: Option<String>,
    /// Day to log the meal on; `None` means today.
    pub target_date: Option<NaiveDate>,
}

/// A validated candidate, ready for the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// Log a new meal.
    Create(MealDraft),
    /// Edit an existing meal.
    Update {
        /// Record being edited.
        id: MealId,
        /// Field changes.
        patch: MealPatch,
        /// New local day, when the edit moves the record.
        reschedule: Option<NaiveDate>,
    },
}

/// Anything that can take a [`Submission`].
pub trait MealSink {
    /// Applies `submission` as one mutation.
    fn submit(&mut self, submission: Submission) -> Result<MealRecord, StoreError>;
}

impl MealSink for MealStore {
    fn submit(&mut self, submission: Submission) -> Result<MealRecord, StoreError> {
        match submission {
            Submission::Create(draft) => self.create(draft),
            Submission::Update {
                id,
                patch,
                reschedule,
            } => self.edit(id, patch, reschedule),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct EditTarget {
    id: MealId,
    original_date: NaiveDate,
}

#[derive(Debug, Clone)]
struct PendingCapture {
    image: Option<PreparedImage>,
    target_date: Option<NaiveDate>,
}

/// One user interaction's entry flow.
#[derive(Debug)]
pub struct EntryPipeline<P> {
    preprocessor: P,
    limits: ImageLimits,
    edit_policy: EditTimestampPolicy,
    state: PipelineState,
    candidate: Option<Candidate>,
    editing: Option<EditTarget>,
    pending: Option<PendingCapture>,
    failure: Option<RecognitionFailure>,
}

impl<P: ImagePreprocessor> EntryPipeline<P> {
    /// Idle pipeline using `preprocessor` with `limits`.
    pub fn new(preprocessor: P, limits: ImageLimits) -> Self {
        Self {
            preprocessor,
            limits,
            edit_policy: EditTimestampPolicy::default(),
            state: PipelineState::Idle,
            candidate: None,
            editing: None,
            pending: None,
            failure: None,
        }
    }

    /// Sets how edits treat a changed target date.
    pub fn with_edit_policy(mut self, policy: EditTimestampPolicy) -> Self {
        self.edit_policy = policy;
        self
    }

    /// Current state.
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// True while a recognition call is outstanding.
    pub fn is_busy(&self) -> bool {
        matches!(self.state, PipelineState::Recognizing { .. })
    }

    /// Staged candidate, if any.
    pub fn candidate(&self) -> Option<&Candidate> {
        self.candidate.as_ref()
    }

    /// Staging area; only available while reviewing.
    pub fn candidate_mut(&mut self) -> Option<&mut Candidate> {
        match self.state {
            PipelineState::Reviewing { .. } => self.candidate.as_mut(),
            _ => None,
        }
    }

    /// Last recognition failure, surfaced for manual correction.
    pub fn failure(&self) -> Option<&RecognitionFailure> {
        self.failure.as_ref()
    }

    /// Record being edited, if any.
    pub fn editing(&self) -> Option<MealId> {
        self.editing.map(|e| e.id)
    }

    /// Starts a new entry in `mode`.
    pub fn begin(&mut self, mode: EntryMode) -> Result<(), EntryError> {
        self.ensure_ready("begin")?;
        self.clear();
        self.transition(PipelineState::Capturing { mode });
        Ok(())
    }

    /// Loads an existing record for editing.
    pub fn begin_edit(&mut self, record: &MealRecord, zone: &Zone) -> Result<(), EntryError> {
        self.ensure_ready("edit")?;
        self.clear();
        let original_date = zone.local_date(record.timestamp);
        self.candidate = Some(Candidate {
            food_name: record.food_name.clone(),
            protein: record.protein_grams.to_string(),
            category: record.category,
            image_url: record.image_url.clone(),
            target_date: Some(original_date),
        });
        self.editing = Some(EditTarget {
            id: record.id,
            original_date,
        });
        self.transition(PipelineState::Reviewing {
            mode: EntryMode::Manual,
        });
        Ok(())
    }

    /// Manual fields skip recognition.
    pub fn capture_manual(&mut self, fields: Candidate) -> Result<(), EntryError> {
        match self.state {
            PipelineState::Capturing {
                mode: EntryMode::Manual,
            } => {
                self.candidate = Some(fields);
                self.transition(PipelineState::Reviewing {
                    mode: EntryMode::Manual,
                });
                Ok(())
            }
            state => Err(self.reject(state, "capture manual fields")),
        }
    }

    /// Starts recognition for a photo or text capture and returns the request
    /// to send. A preprocessing error leaves the pipeline in `Capturing`.
    pub fn submit_capture(&mut self, input: CaptureInput) -> Result<RecognitionRequest, EntryError> {
        let mode = match self.state {
            PipelineState::Capturing {
                mode: mode @ (EntryMode::Photo | EntryMode::Text),
            } => mode,
            state => return Err(self.reject(state, "submit a capture")),
        };

        let text = input
            .text
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        match mode {
            EntryMode::Photo if input.image.is_none() => {
                return Err(ValidationError::MissingImage.into());
            }
            EntryMode::Text if text.is_none() => return Err(ValidationError::MissingText.into()),
            _ => {}
        }

        let image = input
            .image
            .map(|raw| self.preprocessor.preprocess(raw, &self.limits))
            .transpose()?;

        let request = RecognitionRequest {
            image: image.clone(),
            text,
        };
        self.pending = Some(PendingCapture {
            image,
            target_date: input.target_date,
        });
        self.transition(PipelineState::Recognizing { mode });
        Ok(request)
    }

    /// Feeds the service outcome back in. Failures and malformed payloads
    /// leave an empty candidate (keeping the attached image and date) and are
    /// exposed through [`EntryPipeline::failure`].
    pub fn complete_recognition(
        &mut self,
        result: Result<String, RecognitionFailure>,
    ) -> Result<&Candidate, EntryError> {
        let mode = match self.state {
            PipelineState::Recognizing { mode } => mode,
            state => return Err(self.reject(state, "complete recognition")),
        };

        let pending = self.pending.take();
        let mut candidate = Candidate {
            image_url: pending
                .as_ref()
                .and_then(|p| p.image.as_ref())
                .map(|img| img.data_url.clone()),
            target_date: pending.and_then(|p| p.target_date),
            ..Candidate::default()
        };

        match result.and_then(|payload| parse_recognition(&payload)) {
            Ok(found) => {
                candidate.food_name = found.food_name;
                candidate.protein = found.protein_grams.to_string();
                candidate.category = found.category;
                self.failure = None;
            }
            Err(failure) => {
                warn!(%failure, "recognition failed; falling back to manual entry");
                self.failure = Some(failure);
            }
        }

        self.transition(PipelineState::Reviewing { mode });
        let candidate: &Candidate = self.candidate.insert(candidate);
        Ok(candidate)
    }

    /// Runs a full recognition round trip. This is the pipeline's only
    /// suspension point; it is not cancellable and has no timeout of its own.
    pub async fn recognize_with<R: Recognizer>(
        &mut self,
        recognizer: &R,
        input: CaptureInput,
    ) -> Result<&Candidate, EntryError> {
        let request = self.submit_capture(input)?;
        let result = recognizer.recognize(&request).await;
        self.complete_recognition(result)
    }

    /// Discards the candidate without touching the store.
    pub fn cancel(&mut self) -> Result<(), EntryError> {
        match self.state {
            PipelineState::Recognizing { .. } => Err(EntryError::Busy),
            PipelineState::Idle => Ok(()),
            _ => {
                self.clear();
                self.transition(PipelineState::Idle);
                Ok(())
            }
        }
    }

    /// Validates the candidate into a store submission without committing.
    pub fn prepare_commit(&self) -> Result<Submission, EntryError> {
        let candidate = match (self.state, &self.candidate) {
            (PipelineState::Reviewing { .. }, Some(candidate)) => candidate,
            (state, _) => return Err(self.reject(state, "commit")),
        };

        let food_name = normalize_food_name(&candidate.food_name)?;
        let protein_grams = parse_protein(&candidate.protein)?;

        Ok(match self.editing {
            Some(edit) => Submission::Update {
                id: edit.id,
                patch: MealPatch {
                    food_name: Some(food_name),
                    protein_grams: Some(protein_grams),
                    category: Some(candidate.category),
                    image_url: Some(candidate.image_url.clone()),
                },
                reschedule: match self.edit_policy {
                    EditTimestampPolicy::Preserve => None,
                    EditTimestampPolicy::FollowTargetDate => candidate
                        .target_date
                        .filter(|date| *date != edit.original_date),
                },
            },
            None => Submission::Create(MealDraft {
                food_name,
                protein_grams,
                category: candidate.category,
                image_url: candidate.image_url.clone(),
                target_date: candidate.target_date,
            }),
        })
    }

    /// Validates, submits to `sink` and moves to `Committed`. A store error
    /// keeps the candidate in review.
    ///
    /// `Committed` holds no candidate and counts as idle: [`begin`] and
    /// [`begin_edit`] are accepted from it directly, so calling [`reset`]
    /// first is optional.
    ///
    /// [`begin`]: EntryPipeline::begin
    /// [`begin_edit`]: EntryPipeline::begin_edit
    /// [`reset`]: EntryPipeline::reset
    pub fn commit<S: MealSink>(&mut self, sink: &mut S) -> Result<MealRecord, EntryError> {
        let submission = self.prepare_commit()?;
        let record = sink.submit(submission)?;
        self.finish_commit(&record)?;
        Ok(record)
    }

    /// Completes a commit whose submission went through another path, such
    /// as the async runtime handle.
    pub fn finish_commit(&mut self, record: &MealRecord) -> Result<(), EntryError> {
        match self.state {
            PipelineState::Reviewing { .. } => {
                self.clear();
                self.transition(PipelineState::Committed { id: record.id });
                Ok(())
            }
            state => Err(self.reject(state, "finish a commit")),
        }
    }

    /// Returns to `Idle` after a commit, forgetting the committed id.
    pub fn reset(&mut self) -> Result<(), EntryError> {
        match self.state {
            PipelineState::Idle | PipelineState::Committed { .. } => {
                self.clear();
                self.transition(PipelineState::Idle);
                Ok(())
            }
            PipelineState::Recognizing { .. } => Err(EntryError::Busy),
            state => Err(self.reject(state, "reset")),
        }
    }

    fn ensure_ready(&self, action: &'static str) -> Result<(), EntryError> {
        match self.state {
            PipelineState::Idle | PipelineState::Committed { .. } => Ok(()),
            state => Err(self.reject(state, action)),
        }
    }

    fn reject(&self, state: PipelineState, action: &'static str) -> EntryError {
        if matches!(state, PipelineState::Recognizing { .. }) {
            EntryError::Busy
        } else {
            EntryError::InvalidTransition {
                state: state.name(),
                action,
            }
        }
    }

    fn clear(&mut self) {
        self.candidate = None;
        self.editing = None;
        self.pending = None;
        self.failure = None;
    }

    fn transition(&mut self, next: PipelineState) {
        debug!(from = self.state.name(), to = next.name(), "entry pipeline transition");
        self.state = next;
    }
}
