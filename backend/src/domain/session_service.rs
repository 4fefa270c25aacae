use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use log::{info, warn};
use shared::{
    AttemptDto, ChoiceHistory, PerformanceReport, SessionReport, SessionSummary,
    StopSessionResponse,
};

use crate::db::DbConnection;
use crate::domain::models::session::Session;
use crate::domain::reconciler::StatsReconciler;
use crate::domain::registry;
use crate::error::CoordinatorError;
use crate::storage::{ActivityRepository, AttemptRepository, ChildRepository, SessionRepository};
use crate::transport::{
    await_ready, performance_topic, start_topic, stop_topic, TransportFactory,
};

/// How long a stop call waits for the device's performance report.
pub const RESULT_TIMEOUT: Duration = Duration::from_secs(10);

/// How long a protocol call polls the transport for readiness before
/// publishing into the void.
pub const CONNECT_WINDOW: Duration = Duration::from_secs(2);

/// Protocol state of one (child, activity) pair.
///
/// Tracked explicitly so illegal calls (stop before start) are rejected
/// instead of silently signalling a device that never started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Started,
    AwaitingResult,
    Completed,
    TimedOut,
}

impl SessionState {
    /// Start re-arms a running session but never interrupts a pending wait.
    fn may_start(self) -> bool {
        !matches!(self, SessionState::AwaitingResult)
    }

    fn may_stop(self) -> bool {
        matches!(self, SessionState::Started)
    }
}

type StateKey = (String, i64);

/// Coordinates activity runs with the device: the start/stop handshake, the
/// bounded wait for the performance report, and the hand-off to the stats
/// reconciler.
#[derive(Clone)]
pub struct SessionService {
    children: ChildRepository,
    activities: ActivityRepository,
    sessions: SessionRepository,
    attempts: AttemptRepository,
    reconciler: StatsReconciler,
    transports: Arc<dyn TransportFactory>,
    states: Arc<Mutex<HashMap<StateKey, SessionState>>>,
    result_timeout: Duration,
}

impl SessionService {
    pub fn new(
        db: DbConnection,
        transports: Arc<dyn TransportFactory>,
        result_timeout: Duration,
    ) -> Self {
        Self {
            children: ChildRepository::new(db.clone()),
            activities: ActivityRepository::new(db.clone()),
            sessions: SessionRepository::new(db.clone()),
            attempts: AttemptRepository::new(db.clone()),
            reconciler: StatsReconciler::new(db),
            transports,
            states: Arc::new(Mutex::new(HashMap::new())),
            result_timeout,
        }
    }

    /// Current protocol state of a (child, activity) pair.
    pub fn state_of(&self, child_id: &str, activity_id: i64) -> SessionState {
        self.states
            .lock()
            .unwrap()
            .get(&(child_id.to_string(), activity_id))
            .copied()
            .unwrap_or(SessionState::Idle)
    }

    fn set_state(&self, child_id: &str, activity_id: i64, state: SessionState) {
        self.states
            .lock()
            .unwrap()
            .insert((child_id.to_string(), activity_id), state);
    }

    /// Begin an activity run: create or re-stamp the session row and signal
    /// the device to start.
    pub async fn start_session(
        &self,
        child_id: &str,
        activity_id: i64,
    ) -> Result<SessionSummary, CoordinatorError> {
        self.children
            .get_child(child_id)
            .await?
            .ok_or_else(|| CoordinatorError::ChildNotFound(child_id.to_string()))?;
        self.activities
            .get_activity(activity_id)
            .await?
            .ok_or(CoordinatorError::ActivityNotFound(activity_id))?;

        let state = self.state_of(child_id, activity_id);
        if !state.may_start() {
            return Err(CoordinatorError::IllegalTransition {
                operation: "start",
                state,
            });
        }

        let session = self
            .sessions
            .upsert_start(child_id, activity_id, Utc::now())
            .await?;

        // fire-and-forget: a lost start signal degrades to a timed-out run
        let transport = self.transports.create();
        transport.connect().await;
        if !await_ready(&*transport, CONNECT_WINDOW).await {
            warn!("Device channel not ready; start signal may be lost");
        }
        if let Err(err) = transport.publish(&start_topic(activity_id), b"start").await {
            warn!("Failed to publish start signal: {:#}", err);
        }

        self.set_state(child_id, activity_id, SessionState::Started);
        info!("Started activity {} for child {}", activity_id, child_id);
        Ok(summarize(&session))
    }

    /// End an activity run: signal the device to stop, await its performance
    /// report and reconcile it into the store.
    ///
    /// The stop timestamp is recorded whether or not data arrives, so
    /// duration reporting degrades gracefully. The transport instance and
    /// its subscription are private to this call, and the subscription is
    /// dropped on every exit path.
    pub async fn stop_session(
        &self,
        child_id: &str,
        activity_id: i64,
    ) -> Result<StopSessionResponse, CoordinatorError> {
        let state = self.state_of(child_id, activity_id);
        if !state.may_stop() {
            return Err(CoordinatorError::IllegalTransition {
                operation: "stop",
                state,
            });
        }

        let session = self
            .sessions
            .get_session(child_id, activity_id)
            .await?
            .ok_or_else(|| CoordinatorError::SessionNotFound {
                child_id: child_id.to_string(),
                activity_id,
            })?;

        self.set_state(child_id, activity_id, SessionState::AwaitingResult);

        let transport = self.transports.create();
        transport.connect().await;
        if !await_ready(&*transport, CONNECT_WINDOW).await {
            warn!("Device channel not ready; expecting no performance data");
        }

        let topic = performance_topic(activity_id);
        let handle = match transport.subscribe(&topic).await {
            Ok(handle) => Some(handle),
            Err(err) => {
                warn!("Failed to subscribe to {}: {:#}", topic, err);
                None
            }
        };

        // a failed stop publish still runs the wait and times out naturally
        if let Err(err) = transport.publish(&stop_topic(activity_id), b"stop").await {
            warn!("Failed to publish stop signal: {:#}", err);
        }

        let payload = match handle {
            Some(handle) => handle.await_within(self.result_timeout).await,
            None => {
                tokio::time::sleep(self.result_timeout).await;
                None
            }
        };

        // exactly one unsubscribe per stop call, result or not
        if let Err(err) = transport.unsubscribe(&topic).await {
            warn!("Failed to unsubscribe from {}: {:#}", topic, err);
        }

        let stopped_at = Utc::now();
        self.sessions.set_stopped(session.id, stopped_at).await?;

        let (final_state, data_received, ingest_result) = match payload {
            Some(bytes) => match serde_json::from_slice::<PerformanceReport>(&bytes) {
                Ok(report) => {
                    let outcome = self.reconciler.ingest(&session, &report, stopped_at).await;
                    (SessionState::Completed, true, outcome.map(Some))
                }
                Err(err) => {
                    warn!("Discarding malformed performance payload: {}", err);
                    (SessionState::TimedOut, false, Ok(None))
                }
            },
            None => {
                info!(
                    "No performance data for activity {} within {:?}",
                    activity_id, self.result_timeout
                );
                (SessionState::TimedOut, false, Ok(None))
            }
        };

        self.set_state(child_id, activity_id, final_state);
        ingest_result?;

        let session = self
            .sessions
            .get_session(child_id, activity_id)
            .await?
            .ok_or_else(|| CoordinatorError::SessionNotFound {
                child_id: child_id.to_string(),
                activity_id,
            })?;

        Ok(StopSessionResponse {
            session: summarize(&session),
            data_received,
        })
    }

    /// Read path for the reporting collaborator: the session summary plus
    /// the retained per-choice attempt history, choices in registry order.
    pub async fn session_report(
        &self,
        child_id: &str,
        activity_id: i64,
    ) -> Result<SessionReport, CoordinatorError> {
        let session = self
            .sessions
            .get_session(child_id, activity_id)
            .await?
            .ok_or_else(|| CoordinatorError::SessionNotFound {
                child_id: child_id.to_string(),
                activity_id,
            })?;

        let mut choices = Vec::new();
        if let Some(spec) = registry::lookup(activity_id) {
            let attempts = self
                .attempts
                .attempts_for_session(&spec.stats, session.id)
                .await?;

            for (value, display) in spec.stats.choices {
                let history: Vec<AttemptDto> = attempts
                    .iter()
                    .filter(|attempt| attempt.choice == *value)
                    .map(|attempt| AttemptDto {
                        attempt_number: attempt.attempt_number,
                        right_answers: attempt.right_answers,
                        wrong_answers: attempt.wrong_answers,
                        score: attempt.score(),
                        level: attempt.level().to_string(),
                        recorded_at: attempt.recorded_at.to_rfc3339(),
                    })
                    .collect();

                if !history.is_empty() {
                    choices.push(ChoiceHistory {
                        choice: value.to_string(),
                        display_name: display.to_string(),
                        attempts: history,
                    });
                }
            }
        }

        Ok(SessionReport {
            session: summarize(&session),
            choices,
        })
    }
}

fn summarize(session: &Session) -> SessionSummary {
    SessionSummary {
        child_id: session.child_id.clone(),
        activity_id: session.activity_id,
        started_at: session.started_at.map(|t| t.to_rfc3339()),
        stopped_at: session.stopped_at.map(|t| t.to_rfc3339()),
        total_right_answers: session.total_right_answers,
        total_wrong_answers: session.total_wrong_answers,
        duration_minutes: session.duration_minutes(),
        score: session.score(),
        level: session.level().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::child_service::{ChildService, CreateChildCommand};
    use crate::transport::testing::ScriptedFactory;

    const TEST_TIMEOUT: Duration = Duration::from_millis(200);

    async fn setup_test(factory: ScriptedFactory) -> (SessionService, Arc<ScriptedFactory>, String) {
        let db = DbConnection::init_test().await.expect("test db");
        ActivityRepository::new(db.clone()).seed_catalog().await.expect("seed");

        let child = ChildService::new(db.clone())
            .create_child(CreateChildCommand {
                name: "Yara".to_string(),
                date_of_birth: "2017-02-14".to_string(),
                gender: "female".to_string(),
                learning_difficulty: "hearing impairment".to_string(),
            })
            .await
            .expect("child");

        let factory = Arc::new(factory);
        let service = SessionService::new(db, factory.clone(), TEST_TIMEOUT);
        (service, factory, child.id)
    }

    fn color_report() -> Vec<u8> {
        br#"{"right_answers": {"red": 5, "blue": 2}, "wrong_answers": {"red": 1}}"#.to_vec()
    }

    #[tokio::test]
    async fn stop_before_start_is_rejected() {
        let (service, _factory, child_id) = setup_test(ScriptedFactory::silent()).await;

        let result = service.stop_session(&child_id, 2).await;
        assert!(matches!(
            result,
            Err(CoordinatorError::IllegalTransition { operation: "stop", state: SessionState::Idle })
        ));
    }

    #[tokio::test]
    async fn start_requires_known_child_and_activity() {
        let (service, _factory, child_id) = setup_test(ScriptedFactory::silent()).await;

        let unknown_child = service.start_session("child::missing", 2).await;
        assert!(matches!(unknown_child, Err(CoordinatorError::ChildNotFound(_))));

        let unknown_activity = service.start_session(&child_id, 42).await;
        assert!(matches!(unknown_activity, Err(CoordinatorError::ActivityNotFound(42))));
    }

    #[tokio::test]
    async fn full_run_reconciles_the_report() {
        let (service, factory, child_id) =
            setup_test(ScriptedFactory::with_result(&color_report())).await;

        service.start_session(&child_id, 2).await.expect("start");
        assert_eq!(service.state_of(&child_id, 2), SessionState::Started);

        let response = service.stop_session(&child_id, 2).await.expect("stop");
        assert!(response.data_received);
        assert_eq!(response.session.total_right_answers, 7);
        assert_eq!(response.session.total_wrong_answers, 1);
        assert_eq!(response.session.score, 87.5);
        assert_eq!(response.session.level, "Good");
        assert_eq!(service.state_of(&child_id, 2), SessionState::Completed);

        let topics = factory.log.published_topics();
        assert_eq!(topics, vec!["activity/start/2", "activity/stop/2"]);
        assert_eq!(factory.log.unsubscribes.load(std::sync::atomic::Ordering::SeqCst), 1);

        let report = service.session_report(&child_id, 2).await.expect("report");
        assert_eq!(report.choices.len(), 2);
        assert_eq!(report.choices[0].choice, "red");
        assert_eq!(report.choices[0].display_name, "Red");
        assert_eq!(report.choices[0].attempts[0].right_answers, 5);
        assert_eq!(report.choices[1].choice, "blue");
        assert_eq!(report.choices[1].attempts[0].wrong_answers, 0);
    }

    #[tokio::test]
    async fn timeout_leaves_no_attempt_rows_but_stamps_stop() {
        let (service, factory, child_id) = setup_test(ScriptedFactory::silent()).await;

        service.start_session(&child_id, 2).await.expect("start");
        let response = service.stop_session(&child_id, 2).await.expect("stop");

        assert!(!response.data_received);
        assert_eq!(service.state_of(&child_id, 2), SessionState::TimedOut);
        assert_eq!(factory.log.unsubscribes.load(std::sync::atomic::Ordering::SeqCst), 1);

        let started = chrono::DateTime::parse_from_rfc3339(
            &response.session.started_at.expect("started"),
        )
        .expect("valid start timestamp");
        let stopped = chrono::DateTime::parse_from_rfc3339(
            &response.session.stopped_at.expect("stopped"),
        )
        .expect("valid stop timestamp");
        assert!(stopped >= started);

        let report = service.session_report(&child_id, 2).await.expect("report");
        assert!(report.choices.is_empty());
    }

    #[tokio::test]
    async fn malformed_payload_counts_as_no_data() {
        let (service, factory, child_id) =
            setup_test(ScriptedFactory::with_result(b"not json at all")).await;

        service.start_session(&child_id, 2).await.expect("start");
        let response = service.stop_session(&child_id, 2).await.expect("stop");

        assert!(!response.data_received);
        assert_eq!(service.state_of(&child_id, 2), SessionState::TimedOut);
        assert_eq!(factory.log.unsubscribes.load(std::sync::atomic::Ordering::SeqCst), 1);

        let report = service.session_report(&child_id, 2).await.expect("report");
        assert!(report.choices.is_empty());
    }

    #[tokio::test]
    async fn restart_rearms_a_started_session_without_duplicating_rows() {
        let (service, _factory, child_id) =
            setup_test(ScriptedFactory::with_result(&color_report())).await;

        service.start_session(&child_id, 2).await.expect("first start");
        service.start_session(&child_id, 2).await.expect("re-arm");
        let response = service.stop_session(&child_id, 2).await.expect("stop");
        assert!(response.data_received);

        // a later run for the same pair reuses the single session row
        service.start_session(&child_id, 2).await.expect("second run");
        assert_eq!(service.state_of(&child_id, 2), SessionState::Started);
    }

    #[tokio::test]
    async fn report_for_an_unknown_session_is_an_error() {
        let (service, _factory, child_id) = setup_test(ScriptedFactory::silent()).await;

        let result = service.session_report(&child_id, 2).await;
        assert!(matches!(result, Err(CoordinatorError::SessionNotFound { .. })));
    }
}
