//! End-to-end distribution scenarios over a RocksDB-backed peer

use cbdc_ledger::{
    CallerIdentity, Config, ErrorKind, Peer, Proposal, Response, TransactionHistory,
    TransactionType, WorldState,
};
use serde_json::Value;
use tempfile::TempDir;

fn issuer() -> CallerIdentity {
    CallerIdentity::new("Org1MSP", "admin@org1.example.com")
}

fn bank(name: &str) -> CallerIdentity {
    CallerIdentity::new("Org2MSP", name)
}

fn user(name: &str) -> CallerIdentity {
    CallerIdentity::new("Org3MSP", name)
}

fn test_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.data_dir = dir.path().to_path_buf();
    config
}

/// Create test peer with temp directory
fn create_test_peer() -> (Peer, TempDir) {
    let temp_dir = tempfile::tempdir().unwrap();
    let peer = Peer::open(test_config(&temp_dir)).unwrap();
    (peer, temp_dir)
}

fn balance(peer: &Peer, account: &str) -> String {
    let response = peer.evaluate(Proposal::new("GetBalance", [account], user("auditor")));
    assert!(response.is_success(), "{:?}", response);
    response.payload["balance"].as_str().unwrap().to_string()
}

fn history(peer: &Peer, account: &str) -> Vec<TransactionHistory> {
    let response = peer.evaluate(Proposal::new(
        "GetTransactionHistory",
        [account],
        user("auditor"),
    ));
    assert!(response.is_success(), "{:?}", response);
    serde_json::from_value(response.payload).unwrap()
}

async fn submit_ok(peer: &Peer, proposal: Proposal) -> Response {
    let response = peer.submit(proposal).await;
    assert!(response.is_success(), "{:?}", response);
    response
}

#[tokio::test]
async fn test_two_tier_distribution() {
    let (peer, _dir) = create_test_peer();

    // 1. Issue
    submit_ok(&peer, Proposal::new("IssueTokens", ["1000.00"], issuer())).await;
    assert_eq!(balance(&peer, "central-bank"), "1000.00");
    let log = history(&peer, "central-bank");
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].from_id, "");
    assert_eq!(log[0].to_id, "central-bank");
    assert_eq!(log[0].amount.to_string(), "1000.00");
    assert_eq!(log[0].tx_type, TransactionType::Issue);

    // 2. Wholesale
    submit_ok(&peer, Proposal::new("TransferToCB", ["bank1", "400.00"], issuer())).await;
    assert_eq!(balance(&peer, "central-bank"), "600.00");
    assert_eq!(balance(&peer, "bank1"), "400.00");

    // 3. Retail
    submit_ok(&peer, Proposal::new("TransferToUser", ["alice", "50.00"], bank("bank1"))).await;
    assert_eq!(balance(&peer, "bank1"), "350.00");
    assert_eq!(balance(&peer, "alice"), "50.00");

    // 4. Overdraft
    let response = peer
        .submit(Proposal::new(
            "TransferTokens",
            ["alice", "bob", "70.00"],
            user("alice"),
        ))
        .await;
    assert_eq!(response.status, 409);
    let error = response.error.unwrap();
    assert_eq!(error.kind, ErrorKind::InsufficientFunds);
    assert_eq!(error.available.unwrap().to_string(), "50.00");
    assert_eq!(error.requested.unwrap().to_string(), "70.00");
    assert_eq!(balance(&peer, "alice"), "50.00");
    assert_eq!(balance(&peer, "bob"), "0.00");

    // 5. Redemption
    submit_ok(&peer, Proposal::new("RedeemTokens", ["bank1", "100.00"], bank("bank1"))).await;
    assert_eq!(balance(&peer, "bank1"), "250.00");
    assert_eq!(balance(&peer, "central-bank"), "600.00");

    let log = history(&peer, "bank1");
    assert_eq!(log.len(), 3);
    assert!(log
        .iter()
        .any(|e| e.tx_type == TransactionType::Redeem && e.to_id == "central-bank"));

    peer.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_response_envelope() {
    let (peer, _dir) = create_test_peer();

    let response = submit_ok(&peer, Proposal::new("IssueTokens", ["10"], issuer())).await;
    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(json["status"], 200);
    assert!(json["txId"].is_string());
    assert!(json.get("payload").is_none());
    assert!(json.get("error").is_none());

    let response = peer
        .submit(Proposal::new("IssueTokens", ["10"], bank("bank1")))
        .await;
    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(json["status"], 403);
    assert_eq!(json["error"]["kind"], "AuthorizationError");
    assert_eq!(json["error"]["clientCorrectable"], false);

    let response = peer
        .submit(Proposal::new("MintMoney", ["10"], issuer()))
        .await;
    assert_eq!(response.status, 400);
    assert_eq!(response.error.unwrap().kind, ErrorKind::ValidationError);

    peer.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_concurrent_spend_conflicts() {
    let (peer, _dir) = create_test_peer();

    submit_ok(&peer, Proposal::new("IssueTokens", ["100.00"], issuer())).await;
    submit_ok(&peer, Proposal::new("TransferToCB", ["bank1", "100.00"], issuer())).await;
    submit_ok(&peer, Proposal::new("TransferToUser", ["alice", "100.00"], bank("bank1"))).await;

    // Both endorsed against the same committed balance
    let first = peer.endorse(Proposal::new(
        "TransferTokens",
        ["alice", "bob", "80.00"],
        user("alice"),
    ));
    let second = peer.endorse(Proposal::new(
        "TransferTokens",
        ["alice", "carol", "80.00"],
        user("alice"),
    ));
    assert!(first.result.is_ok());
    assert!(second.result.is_ok());

    assert!(peer.commit(first).await.is_success());
    let response = peer.commit(second).await;
    assert_eq!(response.status, 500);
    let error = response.error.unwrap();
    assert_eq!(error.kind, ErrorKind::StateStoreError);
    assert_eq!(error.message, "internal ledger error");

    assert_eq!(balance(&peer, "alice"), "20.00");
    assert_eq!(balance(&peer, "bob"), "80.00");
    assert_eq!(balance(&peer, "carol"), "0.00");
    assert_eq!(
        peer.metrics()
            .commits_total
            .with_label_values(&["conflict"])
            .get(),
        1
    );

    peer.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_state_survives_restart() {
    let temp_dir = tempfile::tempdir().unwrap();

    let height = {
        let peer = Peer::open(test_config(&temp_dir)).unwrap();
        submit_ok(&peer, Proposal::new("IssueTokens", ["250.50"], issuer())).await;
        submit_ok(&peer, Proposal::new("TransferToCB", ["bank7", "0.50"], issuer())).await;
        let height = peer.world_state().height();
        peer.shutdown().await.unwrap();
        height
    };

    let peer = Peer::open(test_config(&temp_dir)).unwrap();
    assert_eq!(peer.world_state().height(), height);
    assert_eq!(balance(&peer, "central-bank"), "250.00");
    assert_eq!(balance(&peer, "bank7"), "0.50");
    assert_eq!(history(&peer, "bank7").len(), 1);

    peer.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_documents_are_tagged() {
    let (peer, _dir) = create_test_peer();

    let response = submit_ok(&peer, Proposal::new("IssueTokens", ["5"], issuer())).await;
    let world = peer.world_state();

    let token: Value =
        serde_json::from_slice(&world.get(&response.tx_id).unwrap().unwrap().value).unwrap();
    assert_eq!(token["docType"], "token");
    assert_eq!(token["owner"], "admin");
    assert_eq!(token["issuerId"], "central-bank");

    let balance: Value =
        serde_json::from_slice(&world.get("balance_central-bank").unwrap().unwrap().value)
            .unwrap();
    assert_eq!(balance["docType"], "balance");
    assert_eq!(balance["balance"], "5.00");

    let entry: Value = serde_json::from_slice(
        &world
            .get(&format!("tx_{}", response.tx_id))
            .unwrap()
            .unwrap()
            .value,
    )
    .unwrap();
    assert_eq!(entry["docType"], "transaction");
    assert_eq!(entry["type"], "Issue");

    peer.shutdown().await.unwrap();
}
