//! Form Traversal Engine: drives one application wizard from its first
//! step to submission.
//!
//! A traversal is two walks over the same wizard. The probe pass fills
//! placeholders so every step can be left, collecting the questions it
//! could not settle on its own. Those go out in a single resolution call,
//! then the commit pass rewinds to the first step and writes the real
//! answers before submitting. A wizard without open questions is submitted
//! straight from the probe pass.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::errors::AppError;
use crate::form::{FieldClassifier, FieldHandler, FillPolicy, Pass, StepState};
use crate::guards::{retry_with_backoff_on, run_bounded, Deadline, RetryPolicy};
use crate::models::{ApplicationSession, CandidateProfile, FailureReason, Outcome, TraversalState};
use crate::resolution::AnswerResolver;
use crate::sites::JobSource;

/// Limits applied to every traversal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineSettings {
    /// Steps a single pass may visit before the form is given up on.
    pub max_steps: usize,
    /// Cooperative wall-clock budget for one traversal.
    pub application_timeout: Duration,
    /// Backoff for re-running a step after a transient error. Only one
    /// retry is ever made.
    pub step_retry: RetryPolicy,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_steps: 5,
            application_timeout: Duration::from_secs(100),
            step_retry: RetryPolicy::default(),
        }
    }
}

pub struct FormTraversalEngine {
    resolver: Arc<AnswerResolver>,
    profile: Arc<CandidateProfile>,
    policy: FillPolicy,
    settings: EngineSettings,
}

/// Everything one attempt at a step needs mutable access to.
struct StepContext<'e, 's> {
    engine: &'e FormTraversalEngine,
    source: &'s mut dyn JobSource,
    session: &'s mut ApplicationSession,
    pass: Pass,
}

impl FormTraversalEngine {
    pub fn new(
        resolver: Arc<AnswerResolver>,
        profile: Arc<CandidateProfile>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            resolver,
            profile,
            policy: FillPolicy::default(),
            settings,
        }
    }

    pub fn with_policy(mut self, policy: FillPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Runs the wizard currently open on `source` to a terminal state.
    ///
    /// Never returns an error: every failure ends up as `Outcome::Failed`
    /// with the session moved to `Failed`.
    pub async fn traverse(
        &self,
        session: &mut ApplicationSession,
        source: &mut dyn JobSource,
    ) -> Outcome {
        let deadline = Deadline::after(self.settings.application_timeout);
        info!(
            "Session {}: traversing application for {} on {} ({}s budget)",
            session.id,
            session.job.url,
            session.site,
            deadline.bound().as_secs()
        );

        let outcome = match self.run(session, source, &deadline).await {
            Ok(()) => Outcome::Submitted,
            Err(reason) => Outcome::Failed(reason),
        };

        match &outcome {
            Outcome::Submitted => info!("Session {}: SUBMITTED {}", session.id, session.job.url),
            Outcome::Failed(reason) => {
                warn!("Session {}: FAILED {}: {}", session.id, session.job.url, reason)
            }
        }
        session.finish(outcome)
    }

    async fn run(
        &self,
        session: &mut ApplicationSession,
        source: &mut dyn JobSource,
        deadline: &Deadline,
    ) -> Result<(), FailureReason> {
        transition(session, TraversalState::Probing);
        self.walk(session, source, deadline, Pass::Probe).await?;

        if session.batch.is_empty() {
            debug!("Session {}: no open questions", session.id);
        } else {
            transition(session, TraversalState::Resolving);
            let answers = run_bounded(
                deadline.remaining(),
                self.resolver.resolve_answers(&session.batch, &self.profile),
            )
            .await
            .map_err(|_| FailureReason::TimedOut)?;
            if answers.is_empty() {
                warn!(
                    "Session {}: no answers resolved for {} questions; committing fallbacks",
                    session.id,
                    session.batch.len()
                );
            }
            session.answers = answers;

            transition(session, TraversalState::Committing);
            source.rewind().await.map_err(failure_from)?;
            self.walk(session, source, deadline, Pass::Commit).await?;
        }

        deadline.check().map_err(|_| FailureReason::TimedOut)?;
        retry_with_backoff_on(
            source,
            &self.settings.step_retry.single_retry(),
            "submit",
            AppError::is_transient,
            |s| s.submit(),
        )
        .await
        .map_err(failure_from)
    }

    /// Walks from the current step up to (not through) the submit control.
    async fn walk(
        &self,
        session: &mut ApplicationSession,
        source: &mut dyn JobSource,
        deadline: &Deadline,
        pass: Pass,
    ) -> Result<(), FailureReason> {
        session.step_index = 0;
        let step_retry = self.settings.step_retry.single_retry();

        loop {
            deadline.check().map_err(|_| FailureReason::TimedOut)?;
            if session.step_index >= self.settings.max_steps {
                return Err(FailureReason::StepLimitExceeded {
                    limit: self.settings.max_steps,
                });
            }
            session.step_index += 1;

            let mut ctx = StepContext {
                engine: self,
                source: &mut *source,
                session: &mut *session,
                pass,
            };
            let at_submit = retry_with_backoff_on(
                &mut ctx,
                &step_retry,
                "form step",
                AppError::is_transient,
                |ctx| Box::pin(ctx.process_step()),
            )
            .await
            .map_err(failure_from)?;

            if at_submit {
                return Ok(());
            }
        }
    }
}

impl StepContext<'_, '_> {
    /// Re-acquires the current step, fills it, and leaves it unless it is
    /// the submit step. Returns whether the submit step was reached.
    async fn process_step(&mut self) -> Result<bool, AppError> {
        let step = match self.source.current_step().await? {
            StepState::Step(step) => step,
            StepState::Closed => {
                return Err(AppError::Application(
                    "application wizard closed unexpectedly".to_string(),
                ))
            }
        };
        let engine = self.engine;
        let classifier = FieldClassifier::new(&engine.policy);

        // Enqueue before filling: placeholders would otherwise read as
        // answers.
        if self.pass == Pass::Probe {
            for question in
                classifier.pending_questions(&step, &self.session.answers, &engine.profile)
            {
                let text = question.text.clone();
                if self.session.batch.push(question) {
                    debug!("Session {}: queued question '{}'", self.session.id, text);
                }
            }
        }

        let handler = FieldHandler::new(&engine.policy, &engine.profile);
        for cf in classifier.classify(&step) {
            let action = handler
                .apply(&mut *self.source, &cf, self.pass, &self.session.answers)
                .await?;
            debug!("{:?} '{}': {:?}", self.pass, cf.question.text, action);
        }

        if step.control.is_submit() {
            return Ok(true);
        }
        self.source.advance(step.control).await?;
        Ok(false)
    }
}

fn transition(session: &mut ApplicationSession, next: TraversalState) {
    if session.state.is_terminal() {
        warn!(
            "Session {}: ignoring {:?} after terminal {:?}",
            session.id, next, session.state
        );
        return;
    }
    info!("Session {}: {:?} -> {:?}", session.id, session.state, next);
    session.state = next;
}

fn failure_from(error: AppError) -> FailureReason {
    match error {
        AppError::Timeout(_) => FailureReason::TimedOut,
        other => FailureReason::Application(other.to_string()),
    }
}
