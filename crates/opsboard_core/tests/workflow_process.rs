use opsboard_core::db::open_db_in_memory;
use opsboard_core::model::app::DefinitionError;
use opsboard_core::{
    Actor, AppKind, AppRepository, Application, Capability, NewAction, NewApp, NewField,
    NewStatus, ProcessAction, ProcessRepository, ProcessStatus, Record, RecordRepository,
    RepoError, SqliteAppRepository, SqliteProcessRepository, SqliteRecordRepository,
    WorkflowService,
};
use rusqlite::Connection;

struct Flow {
    app: Application,
    record: Record,
    draft: ProcessStatus,
    review: ProcessStatus,
    approved: ProcessStatus,
    submit: ProcessAction,
    approve: ProcessAction,
}

fn reviewer() -> Actor {
    Actor::with_capabilities("rita", [Capability::ProcessReview])
}

fn approver() -> Actor {
    Actor::with_capabilities("amir", [Capability::ProcessReview, Capability::ProcessApprove])
}

fn setup_flow(conn: &mut Connection) -> Flow {
    let app = {
        let repo = SqliteAppRepository::try_new(conn).unwrap();
        let app = repo
            .create_app(&NewApp::new("expense_report", "Expenses", AppKind::Dynamic))
            .unwrap();
        repo.define_field(&NewField::new(app.id, "title", "text", "Title"))
            .unwrap();
        app
    };

    let record = {
        let mut records = SqliteRecordRepository::try_new(conn).unwrap();
        records
            .create_record(
                app.id,
                serde_json::json!({"title": "travel"}).as_object().unwrap(),
                &Actor::new("alice"),
            )
            .unwrap()
    };

    let mut process = SqliteProcessRepository::try_new(conn).unwrap();
    let statuses = process
        .define_statuses(
            app.id,
            &[
                NewStatus::initial("Draft"),
                NewStatus::new("Review"),
                NewStatus::fin("Approved"),
            ],
        )
        .unwrap();
    let (draft, review, approved) = (
        statuses[0].clone(),
        statuses[1].clone(),
        statuses[2].clone(),
    );

    let submit = process
        .define_action(&NewAction {
            app_id: app.id,
            name: "Submit".to_string(),
            from_status_id: draft.id,
            to_status_id: review.id,
            guard: Some(Capability::ProcessReview),
        })
        .unwrap();
    let approve = process
        .define_action(&NewAction {
            app_id: app.id,
            name: "Approve".to_string(),
            from_status_id: review.id,
            to_status_id: approved.id,
            guard: Some(Capability::ProcessApprove),
        })
        .unwrap();

    Flow {
        app,
        record,
        draft,
        review,
        approved,
        submit,
        approve,
    }
}

#[test]
fn status_definitions_require_exactly_one_initial() {
    let mut conn = open_db_in_memory().unwrap();
    let app = {
        let repo = SqliteAppRepository::try_new(&mut conn).unwrap();
        repo.create_app(&NewApp::new("expense_report", "Expenses", AppKind::Dynamic))
            .unwrap()
    };

    let mut process = SqliteProcessRepository::try_new(&mut conn).unwrap();
    let none = process
        .define_statuses(app.id, &[NewStatus::new("A"), NewStatus::new("B")])
        .unwrap_err();
    assert!(matches!(
        none,
        RepoError::Definition(DefinitionError::InitialStatusCount(0))
    ));

    let two = process
        .define_statuses(app.id, &[NewStatus::initial("A"), NewStatus::initial("B")])
        .unwrap_err();
    assert!(matches!(
        two,
        RepoError::Definition(DefinitionError::InitialStatusCount(2))
    ));
}

#[test]
fn actions_must_connect_statuses_of_the_same_app() {
    let mut conn = open_db_in_memory().unwrap();
    let flow = setup_flow(&mut conn);

    let other_app = {
        let repo = SqliteAppRepository::try_new(&mut conn).unwrap();
        repo.create_app(&NewApp::new("other_app", "Other", AppKind::Dynamic))
            .unwrap()
    };
    let mut process = SqliteProcessRepository::try_new(&mut conn).unwrap();
    process
        .define_statuses(other_app.id, &[NewStatus::initial("Open")])
        .unwrap();
    let foreign = process
        .define_action(&NewAction {
            app_id: other_app.id,
            name: "Jump".to_string(),
            from_status_id: flow.draft.id,
            to_status_id: flow.review.id,
            guard: None,
        })
        .unwrap_err();
    assert!(matches!(foreign, RepoError::StatusNotFound(_)));
}

#[test]
fn new_record_sits_on_the_initial_status_with_its_actions() {
    let mut conn = open_db_in_memory().unwrap();
    let flow = setup_flow(&mut conn);

    let process = SqliteProcessRepository::try_new(&mut conn).unwrap();
    let service = WorkflowService::new(process);

    let current = service.current_status(flow.record.id).unwrap().unwrap();
    assert_eq!(current.id, flow.draft.id);
    assert_eq!(current.app_id, flow.app.id);
    assert!(current.is_initial);

    let available = service.available_actions(flow.record.id, &reviewer()).unwrap();
    assert_eq!(available.len(), 1);
    assert_eq!(available[0].id, flow.submit.id);

    // Without the guard capability the action disappears.
    let unprivileged = service
        .available_actions(flow.record.id, &Actor::new("guest"))
        .unwrap();
    assert!(unprivileged.is_empty());
}

#[test]
fn submit_then_approve_walks_the_machine_to_a_terminal_state() {
    let mut conn = open_db_in_memory().unwrap();
    let flow = setup_flow(&mut conn);

    let process = SqliteProcessRepository::try_new(&mut conn).unwrap();
    let mut service = WorkflowService::new(process);

    let log = service
        .execute_action(flow.record.id, flow.submit.id, &reviewer(), Some("ptal"))
        .unwrap();
    assert_eq!(log.from_status_id, flow.draft.id);
    assert_eq!(log.to_status_id, flow.review.id);
    assert_eq!(log.comment.as_deref(), Some("ptal"));

    let current = service.current_status(flow.record.id).unwrap().unwrap();
    assert_eq!(current.id, flow.review.id);
    assert_eq!(service.transition_log(flow.record.id).unwrap().len(), 1);

    // Submitting again from Review is a stale transition.
    let stale = service
        .execute_action(flow.record.id, flow.submit.id, &reviewer(), None)
        .unwrap_err();
    assert!(matches!(stale, RepoError::InvalidTransition { .. }));
    assert_eq!(service.transition_log(flow.record.id).unwrap().len(), 1);

    service
        .execute_action(flow.record.id, flow.approve.id, &approver(), None)
        .unwrap();
    let current = service.current_status(flow.record.id).unwrap().unwrap();
    assert_eq!(current.id, flow.approved.id);
    assert!(current.is_final);

    // Terminal status offers nothing, even to fully capable actors.
    let available = service.available_actions(flow.record.id, &approver()).unwrap();
    assert!(available.is_empty());
    assert_eq!(service.transition_log(flow.record.id).unwrap().len(), 2);
}

#[test]
fn guard_violations_are_terminal_and_write_no_log() {
    let mut conn = open_db_in_memory().unwrap();
    let flow = setup_flow(&mut conn);

    let process = SqliteProcessRepository::try_new(&mut conn).unwrap();
    let mut service = WorkflowService::new(process);

    let denied = service
        .execute_action(flow.record.id, flow.submit.id, &Actor::new("guest"), None)
        .unwrap_err();
    assert!(matches!(denied, RepoError::PermissionDenied(_)));
    assert!(service.transition_log(flow.record.id).unwrap().is_empty());

    let current = service.current_status(flow.record.id).unwrap().unwrap();
    assert_eq!(current.id, flow.draft.id);
}

#[test]
fn replaying_the_same_action_sequence_is_deterministic() {
    let run = || {
        let mut conn = open_db_in_memory().unwrap();
        let flow = setup_flow(&mut conn);
        let process = SqliteProcessRepository::try_new(&mut conn).unwrap();
        let mut service = WorkflowService::new(process);
        service
            .execute_action(flow.record.id, flow.submit.id, &reviewer(), None)
            .unwrap();
        service
            .execute_action(flow.record.id, flow.approve.id, &approver(), None)
            .unwrap();

        let final_status = service.current_status(flow.record.id).unwrap().unwrap();
        let steps: Vec<(String, String)> = service
            .transition_log(flow.record.id)
            .unwrap()
            .into_iter()
            .map(|log| {
                (
                    log.executed_by,
                    format!("{}->{}", log.from_status_id, log.to_status_id),
                )
            })
            .collect();
        (final_status.name, final_status.is_final, steps.len())
    };

    let first = run();
    let second = run();
    assert_eq!(first.0, second.0);
    assert_eq!(first.1, second.1);
    assert_eq!(first.2, second.2);
    assert_eq!(first.0, "Approved");
    assert_eq!(first.2, 2);
}

#[test]
fn records_of_workflow_less_apps_have_no_status_or_actions() {
    let mut conn = open_db_in_memory().unwrap();
    let app = {
        let repo = SqliteAppRepository::try_new(&mut conn).unwrap();
        let app = repo
            .create_app(&NewApp::new("plain_list", "Plain", AppKind::Dynamic))
            .unwrap();
        repo.define_field(&NewField::new(app.id, "title", "text", "Title"))
            .unwrap();
        app
    };
    let record = {
        let mut records = SqliteRecordRepository::try_new(&mut conn).unwrap();
        records
            .create_record(
                app.id,
                serde_json::json!({"title": "solo"}).as_object().unwrap(),
                &Actor::new("alice"),
            )
            .unwrap()
    };

    let process = SqliteProcessRepository::try_new(&mut conn).unwrap();
    let service = WorkflowService::new(process);
    assert!(service.current_status(record.id).unwrap().is_none());
    assert!(service
        .available_actions(record.id, &approver())
        .unwrap()
        .is_empty());
}
