//! Bitcoin service against mocked node and explorer endpoints.

#![cfg(feature = "bitcoin")]

use bitcoin::consensus::encode::deserialize;
use bitcoin::{Network as BtcNetwork, Transaction};
use chain_engine::blockchain::bitcoin::account::require_address;
use chain_engine::blockchain::bitcoin::BitcoinService;
use chain_engine::core::config::{BitcoinConfig, ClientConfig, Network};
use chain_engine::core::domain::{KeyPair, TransferOrder, TransferRequest};
use chain_engine::{BlockchainService, WalletError};
use httpmock::{Method, MockServer};
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use serde_json::json;
use std::str::FromStr;

const API_KEY: &str = "test-api-key";
const FUNDING_TXID: &str = "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b";
const BROADCAST_TXID: &str = "f4184fc596403b9d638783cf57adfe4c75c605f6356fbc91338530e9831e9e16";

struct Harness {
    server: MockServer,
    service: BitcoinService,
    sender: KeyPair,
    recipient: KeyPair,
}

async fn harness() -> Harness {
    let server = MockServer::start_async().await;
    let mut config = BitcoinConfig::single_endpoint(
        Network::Testnet,
        &server.url("/node"),
        &server.url("/api/v2"),
        "https://blockstream.info/testnet",
    );
    config.api_key = API_KEY.to_string();

    let service = BitcoinService::new(config, &ClientConfig { timeout_secs: 5 }).unwrap();
    let sender = service.create().unwrap();
    let recipient = service.create().unwrap();
    Harness { server, service, sender, recipient }
}

fn btc(raw: &str) -> Decimal {
    Decimal::from_str(raw).unwrap()
}

impl Harness {
    fn request(&self, value: &str) -> TransferRequest {
        TransferRequest {
            from: self.sender.address.clone(),
            to: self.recipient.address.clone(),
            value: btc(value),
        }
    }

    async fn mock_utxos(&self, values: &[u64]) -> httpmock::Mock<'_> {
        let body: Vec<_> = values
            .iter()
            .enumerate()
            .map(|(vout, value)| {
                json!({"txid": FUNDING_TXID, "vout": vout, "value": value.to_string(), "confirmations": 6})
            })
            .collect();
        let path = format!("/api/v2/utxo/{}", self.sender.address);
        self.server
            .mock_async(|when, then| {
                when.method(Method::GET).path(path);
                then.status(200).json_body(json!(body));
            })
            .await
    }

    async fn mock_address(&self) -> httpmock::Mock<'_> {
        let path = format!("/api/v2/address/{}", self.sender.address);
        let address = self.sender.address.clone();
        self.server
            .mock_async(|when, then| {
                when.method(Method::GET).path(path).header("api-key", API_KEY);
                then.status(200).json_body(json!({
                    "address": address,
                    "balance": "5000000",
                    "totalReceived": "7000000",
                    "totalSent": "2000000",
                    "txs": 2,
                    "txids": [FUNDING_TXID, BROADCAST_TXID]
                }));
            })
            .await
    }
}

#[tokio::test]
async fn test_quote_single_covering_output() {
    let h = harness().await;
    let utxos = h.mock_utxos(&[5_000_000]).await;

    let plan = h.service.calculate_tx(&h.request("0.01")).await.unwrap();

    assert_eq!(plan.value, 1_000_000);
    assert_eq!(plan.network_fee, 2_920);
    assert_eq!(plan.service_fee, btc("0.00002"));
    assert_eq!(plan.total_fee, btc("0.0000492"));
    assert_eq!(plan.total_output, btc("0.01"));
    assert_eq!(plan.total_input, btc("0.0100492"));
    assert_eq!(plan.from, h.sender.address);
    assert_eq!(plan.to, h.recipient.address);
    utxos.assert_async().await;
}

#[tokio::test]
async fn test_quote_is_repeatable() {
    let h = harness().await;
    h.mock_utxos(&[5_000_000, 3_000_000]).await;

    let first = h.service.calculate_tx(&h.request("0.01")).await.unwrap();
    let second = h.service.calculate_tx(&h.request("0.01")).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_quote_with_no_covering_output_is_insufficient_funds() {
    let h = harness().await;
    h.mock_utxos(&[400_000, 500_000]).await;

    let err = h.service.calculate_tx(&h.request("0.01")).await.unwrap_err();
    assert!(matches!(err, WalletError::InsufficientFunds(_)), "{:?}", err);
}

#[tokio::test]
async fn test_quote_rejects_address_from_other_network() {
    let h = harness().await;
    let mut request = h.request("0.01");
    request.to = "1BvBMSEYstWetqTFn5Au4m4GFg7xJaNVN2".to_string();

    let err = h.service.calculate_tx(&request).await.unwrap_err();
    assert!(matches!(err, WalletError::InvalidAddress(_)));
}

#[tokio::test]
async fn test_explorer_outage_reads_as_unknown() {
    let h = harness().await;
    let path = format!("/api/v2/address/{}", h.sender.address);
    h.server
        .mock_async(|when, then| {
            when.method(Method::GET).path(path);
            then.status(500).body("upstream down");
        })
        .await;

    assert!(h.service.get_address(&h.sender.address).await.is_none());
    assert!(h.service.get_balance(&h.sender.address).await.is_none());
}

#[tokio::test]
async fn test_address_snapshot() {
    let h = harness().await;
    let mock = h.mock_address().await;

    let snapshot = h.service.get_address(&h.sender.address).await.unwrap();
    assert_eq!(snapshot.balance, btc("0.05"));
    assert_eq!(snapshot.total_received, 7_000_000);
    assert_eq!(snapshot.total_sent, 2_000_000);
    assert_eq!(snapshot.tx_count, 2);
    assert_eq!(snapshot.tx_ids.len(), 2);
    assert_eq!(h.service.get_balance(&h.sender.address).await, Some(btc("0.05")));
    mock.assert_hits_async(2).await;
}

#[tokio::test]
async fn test_get_utxo_filters_and_orders() {
    let h = harness().await;
    h.mock_utxos(&[9_000, 700_000, 200_000, 50_000]).await;

    let utxos = h.service.get_utxo(&h.sender.address, 100_000).await.unwrap();
    let amounts: Vec<u64> = utxos.iter().map(|u| u.amount).collect();
    assert_eq!(amounts, vec![200_000, 700_000]);
    assert!(utxos.iter().all(|u| u.address == h.sender.address && !u.locking_script.is_empty()));
}

#[tokio::test]
async fn test_signed_transaction_matches_plan() {
    let h = harness().await;
    h.mock_utxos(&[5_000_000]).await;

    let plan = h.service.calculate_tx(&h.request("0.01")).await.unwrap();
    let signed = h.service.sign_transaction(&plan, &h.sender.private_key).await.unwrap();

    let tx: Transaction = deserialize(&hex::decode(signed.as_hex()).unwrap()).unwrap();
    let sender = require_address(&h.sender.address, BtcNetwork::Testnet).unwrap();
    let recipient = require_address(&h.recipient.address, BtcNetwork::Testnet).unwrap();

    assert_eq!(tx.input.len(), 1);
    assert_eq!(tx.input[0].previous_output.txid.to_string(), FUNDING_TXID);
    assert_eq!(tx.output.len(), 3);
    assert_eq!(tx.output[0].value.to_sat(), 1_000_000);
    assert_eq!(tx.output[0].script_pubkey, recipient.script_pubkey());
    assert_eq!(tx.output[1].value.to_sat(), 2_000);
    assert_eq!(tx.output[1].script_pubkey, sender.script_pubkey());
    assert_eq!(tx.output[2].value.to_sat(), 5_000_000 - 1_000_000 - 2_000 - 2_920);
    assert_eq!(tx.output[2].script_pubkey, sender.script_pubkey());
}

#[tokio::test]
async fn test_sign_with_wrong_key_fails() {
    let h = harness().await;
    h.mock_utxos(&[5_000_000]).await;

    let plan = h.service.calculate_tx(&h.request("0.01")).await.unwrap();
    let err = h.service.sign_transaction(&plan, &h.recipient.private_key).await.unwrap_err();
    assert!(matches!(err, WalletError::SignFailed(_)), "{:?}", err);
}

#[tokio::test]
async fn test_send_broadcasts_and_links_explorer() {
    let h = harness().await;
    h.mock_address().await;
    h.mock_utxos(&[5_000_000]).await;
    let node = h
        .server
        .mock_async(|when, then| {
            when.method(Method::POST)
                .path("/node")
                .header("api-key", API_KEY)
                .body_contains(r#""API_key":"test-api-key""#)
                .body_contains(r#""jsonrpc":"2.0""#)
                .body_contains("sendrawtransaction");
            then.status(200).json_body(json!({"result": BROADCAST_TXID, "error": null, "id": "1"}));
        })
        .await;

    let order = TransferOrder::new(
        &h.sender.address,
        &h.recipient.address,
        btc("0.01"),
        h.sender.expose_private_key(),
    );
    let result = h.service.send_transaction(&order).await.unwrap();

    assert_eq!(result.hash, BROADCAST_TXID);
    assert_eq!(result.explorer_link, format!("https://blockstream.info/testnet/tx/{}", BROADCAST_TXID));
    assert_eq!(result.value, 1_000_000);
    assert_eq!(result.network_fee, 2_920);
    assert_eq!(result.total_fee, btc("0.0000492"));
    node.assert_async().await;
}

#[tokio::test]
async fn test_send_rejected_by_node_is_broadcast_failure() {
    let h = harness().await;
    h.mock_address().await;
    h.mock_utxos(&[5_000_000]).await;
    h.server
        .mock_async(|when, then| {
            when.method(Method::POST).path("/node");
            then.status(200).json_body(json!({
                "result": null,
                "error": {"code": -26, "message": "bad-txns-inputs-missingorspent"},
                "id": "1"
            }));
        })
        .await;

    let order = TransferOrder::new(
        &h.sender.address,
        &h.recipient.address,
        btc("0.01"),
        h.sender.expose_private_key(),
    );
    let err = h.service.send_transaction(&order).await.unwrap_err();
    assert!(matches!(err, WalletError::BroadcastFailed(_)));
    assert!(err.is_ambiguous_submission());
}

#[tokio::test]
async fn test_send_stops_when_source_unreadable() {
    let h = harness().await;
    let node = h
        .server
        .mock_async(|when, then| {
            when.method(Method::POST).path("/node");
            then.status(200).json_body(json!({"result": BROADCAST_TXID, "error": null, "id": "1"}));
        })
        .await;

    let order = TransferOrder::new(
        &h.sender.address,
        &h.recipient.address,
        btc("0.01"),
        h.sender.expose_private_key(),
    );
    let err = h.service.send_transaction(&order).await.unwrap_err();
    assert!(matches!(err, WalletError::NetworkUnavailable(_)));
    node.assert_hits_async(0).await;
}

#[tokio::test]
async fn test_latest_block_from_status_root() {
    let h = harness().await;
    h.server
        .mock_async(|when, then| {
            when.method(Method::GET).path("/api/v2/");
            then.status(200).json_body(json!({
                "blockbook": {"coin": "Testnet", "bestHeight": 2_500_123},
                "backend": {"chain": "test", "blocks": 2_500_123}
            }));
        })
        .await;

    assert_eq!(h.service.get_latest_block().await, Some(2_500_123));
}

#[tokio::test]
async fn test_block_and_raw_transaction_reads() {
    let h = harness().await;
    h.server
        .mock_async(|when, then| {
            when.method(Method::GET).path("/api/v2/block/703052");
            then.status(200).json_body(json!({"hash": "00ab", "height": 703052, "txCount": 12}));
        })
        .await;
    h.server
        .mock_async(|when, then| {
            when.method(Method::POST).path("/node").body_contains("getrawtransaction");
            then.status(200).json_body(json!({
                "result": {"txid": FUNDING_TXID, "confirmations": 6},
                "error": null,
                "id": "1"
            }));
        })
        .await;

    let block = h.service.get_block(703_052).await.unwrap();
    assert_eq!(block.height, 703_052);
    assert_eq!(block.tx_count, Some(12));

    let tx = h.service.get_raw_transaction(FUNDING_TXID).await.unwrap();
    assert_eq!(tx["confirmations"], 6);
}

#[tokio::test]
async fn test_dust_change_goes_to_the_reported_fee() {
    let h = harness().await;
    h.mock_utxos(&[1_005_020]).await;

    let plan = h.service.calculate_tx(&h.request("0.01")).await.unwrap();
    assert_eq!(plan.network_fee, 3_020);
    assert_eq!(plan.total_fee, btc("0.0000502"));

    let signed = h.service.sign_transaction(&plan, &h.sender.private_key).await.unwrap();
    let tx: Transaction = deserialize(&hex::decode(signed.as_hex()).unwrap()).unwrap();

    assert_eq!(tx.output.len(), 2);
    let paid_out: u64 = tx.output.iter().map(|o| o.value.to_sat()).sum();
    assert_eq!(1_005_020 - paid_out, plan.network_fee as u64);
}

#[tokio::test]
async fn test_send_with_node_http_error_is_broadcast_failure() {
    let h = harness().await;
    let address = h.mock_address().await;
    h.mock_utxos(&[5_000_000]).await;
    let node = h
        .server
        .mock_async(|when, then| {
            when.method(Method::POST).path("/node").body_contains("sendrawtransaction");
            then.status(500).body("internal error");
        })
        .await;

    let balance_before = h.service.get_balance(&h.sender.address).await;
    let order = TransferOrder::new(
        &h.sender.address,
        &h.recipient.address,
        btc("0.01"),
        h.sender.expose_private_key(),
    );
    let outcome = h.service.send_transaction(&order).await;

    let err = outcome.err().expect("no broadcast result on node failure");
    assert!(matches!(err, WalletError::BroadcastFailed(_)), "{:?}", err);
    node.assert_async().await;

    assert_eq!(h.service.get_balance(&h.sender.address).await, balance_before);
    assert_eq!(balance_before, Some(btc("0.05")));
    // before, during send, after
    address.assert_hits_async(3).await;
}
