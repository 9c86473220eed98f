mod common;

use common::{crowd_fund, example02, network, plan};
use ledger_webapp::membership::MembershipProfile;
use ledger_webapp::network::{FabricProfile, LedgerError, NetworkLatency};
use ledger_webapp::workflow::{
    ChaincodeCall, EngineOptions, FailureCause, PreconditionError, TransactionOutcome,
    TransactionRequest, WorkflowEngine, WorkflowError, WorkflowStage,
};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_test::{assert_err, assert_ok};

fn query(name: &str) -> ChaincodeCall {
    ChaincodeCall::new("query", vec![name.to_string()])
}

fn transfer(amount: &str) -> ChaincodeCall {
    ChaincodeCall::new(
        "invoke",
        vec!["a".to_string(), "b".to_string(), amount.to_string()],
    )
}

#[tokio::test(start_paused = true)]
async fn test_full_workflow_moves_funds() {
    let net = network(FabricProfile::default());
    let engine = WorkflowEngine::new(net.chain.clone(), EngineOptions::default());

    let ready = assert_ok!(engine.bootstrap(&plan(example02())).await);
    assert_eq!(engine.stage(), WorkflowStage::Ready);
    assert_eq!(engine.chaincode_handle(), Some(ready.chaincode.clone()));
    assert!(ready.admin.is_registrar());
    assert_eq!(ready.user.name(), "WebApp_user1");

    let a = assert_ok!(engine.query(&ready.user, query("a")).await);
    assert_eq!(a.result_string(), "100");

    let committed = assert_ok!(engine.invoke_and_confirm(&ready.user, transfer("10")).await);
    assert!(committed.block_number >= 2);

    let a = assert_ok!(engine.query(&ready.user, query("a")).await);
    let b = assert_ok!(engine.query(&ready.user, query("b")).await);
    assert_eq!(a.result_string(), "90");
    assert_eq!(b.result_string(), "210");
}

#[tokio::test(start_paused = true)]
async fn test_submitted_invoke_is_visible_after_commit() {
    let net = network(FabricProfile::default());
    let engine = WorkflowEngine::new(net.chain.clone(), EngineOptions::default());
    let ready = assert_ok!(engine.bootstrap(&plan(example02())).await);

    let receipt = assert_ok!(engine.invoke(&ready.user, transfer("10")).await);
    assert!(!receipt.tx_id.is_empty());

    // Past the committer's batching delay.
    tokio::time::sleep(Duration::from_secs(1)).await;

    let a = assert_ok!(engine.query(&ready.user, query("a")).await);
    let b = assert_ok!(engine.query(&ready.user, query("b")).await);
    assert_eq!(a.result_string(), "90");
    assert_eq!(b.result_string(), "210");
}

#[tokio::test(start_paused = true)]
async fn test_overflowing_deposit_is_rejected_and_commits_continue() {
    let net = network(FabricProfile::default());
    let engine = WorkflowEngine::new(net.chain.clone(), EngineOptions::default());
    let ready = assert_ok!(engine.bootstrap(&plan(crowd_fund())).await);
    let fund = |amount: i64| {
        ChaincodeCall::new("invoke", vec!["account".to_string(), amount.to_string()])
    };

    assert_ok!(engine.invoke_and_confirm(&ready.user, fund(i64::MAX)).await);
    let err = assert_err!(engine.invoke_and_confirm(&ready.user, fund(1)).await);
    assert!(matches!(err.cause, FailureCause::Ledger(LedgerError::Chaincode(_))));

    assert_ok!(engine.invoke_and_confirm(&ready.user, fund(-5)).await);
    let balance = assert_ok!(engine.query(&ready.user, query("account")).await);
    assert_eq!(balance.result_string(), (i64::MAX - 5).to_string());
}

#[tokio::test(start_paused = true)]
async fn test_confirmations_survive_a_lagging_event_stream() {
    // One block carrying every invocation overflows the event buffer.
    let profile = FabricProfile {
        latency: NetworkLatency {
            commit_batch: Duration::from_secs(1),
            ..NetworkLatency::default()
        },
        ..FabricProfile::default()
    };
    let net = network(profile);
    let options = EngineOptions {
        operation_timeout: Some(Duration::from_secs(60)),
        ..EngineOptions::default()
    };
    let engine = Arc::new(WorkflowEngine::new(net.chain.clone(), options));
    let ready = assert_ok!(engine.bootstrap(&plan(example02())).await);

    let mut confirms = JoinSet::new();
    for _ in 0..300 {
        let engine = engine.clone();
        let user = ready.user.clone();
        confirms.spawn(async move { engine.invoke_and_confirm(&user, transfer("1")).await });
    }

    let mut confirmed = 0;
    while let Some(joined) = confirms.join_next().await {
        assert_ok!(joined.expect("confirm task completes"));
        confirmed += 1;
    }
    assert_eq!(confirmed, 300);

    let a = assert_ok!(engine.query(&ready.user, query("a")).await);
    let b = assert_ok!(engine.query(&ready.user, query("b")).await);
    assert_eq!(a.result_string(), "-200");
    assert_eq!(b.result_string(), "500");
}

#[tokio::test(start_paused = true)]
async fn test_rejected_secret_leaves_no_registrar() {
    let net = network(FabricProfile::default());
    let engine = WorkflowEngine::new(net.chain.clone(), EngineOptions::default());

    let err = assert_err!(engine.enroll_admin("WebAppAdmin", "not-the-secret").await);
    assert_eq!(
        err.cause,
        FailureCause::Ledger(LedgerError::InvalidSecret("WebAppAdmin".to_string()))
    );
    assert!(!err.to_string().contains("not-the-secret"));
    assert!(err.to_string().contains("WebAppAdmin"));
    assert!(engine.context().registrar().is_none());
    assert!(engine.stage().is_failed());

    let requests = net.fabric.request_count();
    let err = assert_err!(engine.register_and_enroll_user("WebApp_user1", "bank_a").await);
    assert_eq!(
        err.cause,
        FailureCause::Precondition(PreconditionError::NoRegistrar)
    );
    assert_eq!(net.fabric.request_count(), requests);
}

#[tokio::test(start_paused = true)]
async fn test_transactions_before_deploy_make_no_requests() {
    let net = network(FabricProfile::default());
    let engine = WorkflowEngine::new(net.chain.clone(), EngineOptions::default());
    assert_ok!(engine.enroll_admin("WebAppAdmin", "DJY27pEnl16d").await);
    let user = assert_ok!(engine.register_and_enroll_user("WebApp_user1", "bank_a").await);

    let requests = net.fabric.request_count();
    let err = assert_err!(engine.invoke(&user, transfer("10")).await);
    assert_eq!(
        err.cause,
        FailureCause::Precondition(PreconditionError::NotDeployed)
    );
    let err = assert_err!(engine.query(&user, query("a")).await);
    assert!(err.cause.is_precondition());
    assert_eq!(net.fabric.request_count(), requests);
    assert_eq!(engine.stage(), WorkflowStage::UserRegistered);
}

#[tokio::test(start_paused = true)]
async fn test_stages_run_in_order() {
    let net = network(FabricProfile::default());
    let engine = WorkflowEngine::new(net.chain.clone(), EngineOptions::default());
    let admin = assert_ok!(engine.enroll_admin("WebAppAdmin", "DJY27pEnl16d").await);

    let err = assert_err!(engine.deploy(&admin, example02()).await);
    assert!(matches!(
        err.cause,
        FailureCause::Precondition(PreconditionError::OutOfOrder { .. })
    ));
    assert!(!engine.stage().is_failed());

    let err = assert_err!(engine.enroll_admin("admin", "Xurw3yU9zI0l").await);
    assert_eq!(
        err.cause,
        FailureCause::Precondition(PreconditionError::RegistrarAlreadySet(
            "WebAppAdmin".to_string()
        ))
    );
}

#[tokio::test(start_paused = true)]
async fn test_enrolled_identity_needs_no_registration() {
    let net = network(FabricProfile::default());
    let engine = WorkflowEngine::new(net.chain.clone(), EngineOptions::default());
    assert_ok!(engine.enroll_admin("WebAppAdmin", "DJY27pEnl16d").await);

    let requests = net.fabric.request_count();
    let user = assert_ok!(engine.register_and_enroll_user("WebAppAdmin", "institution_a").await);
    assert_eq!(user.name(), "WebAppAdmin");
    assert_eq!(net.fabric.request_count(), requests);
    assert_eq!(engine.stage(), WorkflowStage::UserRegistered);

    assert_ok!(engine.deploy(&user, example02()).await);
    let err = assert_err!(engine.deploy(&user, example02()).await);
    assert!(matches!(
        err.cause,
        FailureCause::Precondition(PreconditionError::AlreadyDeployed(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_single_certificate_batches_serve_concurrent_queries() {
    let net = network(FabricProfile::default());
    let options = EngineOptions {
        tcert_batch_size: NonZeroUsize::new(1),
        ..EngineOptions::default()
    };
    let engine = WorkflowEngine::new(net.chain.clone(), options);
    let ready = assert_ok!(engine.bootstrap(&plan(example02())).await);
    assert_eq!(ready.user.certificate_batch_size().get(), 1);

    let (a, b) = tokio::join!(
        engine.query(&ready.user, query("a")),
        engine.query(&ready.user, query("b"))
    );
    assert_eq!(assert_ok!(a).result_string(), "100");
    assert_eq!(assert_ok!(b).result_string(), "200");
}

#[tokio::test(start_paused = true)]
async fn test_timed_out_deploy_yields_no_handle() {
    let profile = FabricProfile {
        latency: NetworkLatency {
            peer: Duration::from_secs(60),
            ..NetworkLatency::default()
        },
        ..FabricProfile::default()
    };
    let net = network(profile);
    let options = EngineOptions {
        operation_timeout: Some(Duration::from_secs(5)),
        ..EngineOptions::default()
    };
    let engine = WorkflowEngine::new(net.chain.clone(), options);

    let err = assert_err!(engine.bootstrap(&plan(example02())).await);
    let WorkflowError::Deploy(deploy) = &err else {
        panic!("expected a deploy failure, got {err}");
    };
    assert_eq!(deploy.cause, FailureCause::TimedOut(Duration::from_secs(5)));
    assert!(engine.stage().is_failed());

    // Let the abandoned deployment finish on the network.
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert!(engine.chaincode_handle().is_none());
    assert!(net.fabric.block_height().await >= 2);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_certificates_surface_as_resource_errors() {
    let profile = FabricProfile {
        membership: MembershipProfile {
            tcert_quota: 2,
            ..MembershipProfile::default()
        },
        ..FabricProfile::default()
    };
    let net = network(profile);
    let engine = WorkflowEngine::new(net.chain.clone(), EngineOptions::default());
    let ready = assert_ok!(engine.bootstrap(&plan(example02())).await);

    assert_ok!(engine.query(&ready.user, query("a")).await);
    let err = assert_err!(engine.query(&ready.user, query("a")).await);
    assert!(err.cause.is_resource_exhausted());
    assert_eq!(engine.stage(), WorkflowStage::Ready);
}

#[tokio::test(start_paused = true)]
async fn test_chaincode_rejection_is_reported_at_commit() {
    let net = network(FabricProfile::default());
    let engine = WorkflowEngine::new(net.chain.clone(), EngineOptions::default());
    let ready = assert_ok!(engine.bootstrap(&plan(example02())).await);

    let receipt = assert_ok!(engine.invoke(&ready.user, transfer("ten")).await);
    assert!(!receipt.tx_id.is_empty());

    let err = assert_err!(engine.invoke_and_confirm(&ready.user, transfer("ten")).await);
    assert!(matches!(err.cause, FailureCause::Ledger(LedgerError::Chaincode(_))));

    let a = assert_ok!(engine.query(&ready.user, query("a")).await);
    assert_eq!(a.result_string(), "100");
}

#[tokio::test(start_paused = true)]
async fn test_execute_reports_outcomes() {
    let net = network(FabricProfile::default());
    let engine = WorkflowEngine::new(net.chain.clone(), EngineOptions::default());
    let ready = assert_ok!(engine.bootstrap(&plan(example02())).await);

    let outcome = engine
        .execute(&ready.user, TransactionRequest::Query(query("b")))
        .await;
    assert_eq!(
        outcome,
        TransactionOutcome::Completed {
            payload: b"200".to_vec()
        }
    );

    let outcome = engine
        .execute(&ready.user, TransactionRequest::Invoke(transfer("1")))
        .await;
    assert!(matches!(outcome, TransactionOutcome::Submitted { .. }));

    let foreign = query("a").on(ledger_webapp::network::ChaincodeHandle::new("elsewhere"));
    let outcome = engine
        .execute(&ready.user, TransactionRequest::Query(foreign))
        .await;
    assert!(matches!(outcome, TransactionOutcome::Failed { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_session_disconnects_event_hub_after_failure() {
    let net = network(FabricProfile::default());
    let chain = net.chain.clone();
    let engine = WorkflowEngine::new(chain.clone(), EngineOptions::default());

    let mut bad_plan = plan(example02());
    bad_plan.admin_secret = "wrong".to_string();
    let err = assert_err!(engine.bootstrap(&bad_plan).await);
    assert!(matches!(err, WorkflowError::Enroll(_)));
    assert!(chain.is_event_hub_connected());

    drop(net);
    assert!(!chain.is_event_hub_connected());
    assert!(chain.subscribe().is_err());
}
