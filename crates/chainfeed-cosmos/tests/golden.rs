//! Golden fixture integration tests for chainfeed-cosmos.
//!
//! Each test loads a fixture JSON from `fixtures/cosmos/`, parses the
//! recorded `/block` and `/block_results` responses, runs the block command
//! parser and asserts the commands match the fixture's `expected` list.

use chainfeed_core::{Command, FeedError};
use chainfeed_cosmos::types::{parse_block_resp, parse_block_results_resp};
use chainfeed_cosmos::{
    parse_block_commands, parse_transaction_commands, tx_hash, CreateTransactionParams,
    TxDecoder, BLOCK_CREATED, TRANSACTION_CREATED,
};

// ─── Helpers ──────────────────────────────────────────────────────────────────

fn fixture_path(name: &str) -> std::path::PathBuf {
    let mut p = std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    p.push("../../fixtures/cosmos");
    p.push(name);
    p
}

fn load_fixture(name: &str) -> serde_json::Value {
    let content = std::fs::read_to_string(fixture_path(name)).expect("fixture not found");
    serde_json::from_str(&content).expect("invalid fixture JSON")
}

fn parse_fixture(
    fixture: &serde_json::Value,
) -> Result<Vec<CreateTransactionParams>, FeedError> {
    let (block, _) = parse_block_resp(&fixture["blockResp"].to_string())?;
    let results = parse_block_results_resp(&fixture["blockResultsResp"].to_string())?;
    assert_eq!(block.height, fixture["height"].as_u64().unwrap());

    let commands = parse_transaction_commands(&TxDecoder::new("basetcro"), &block, &results)?;
    Ok(commands
        .iter()
        .map(|c| c.as_transaction().cloned().expect("transaction command"))
        .collect())
}

fn expected(fixture: &serde_json::Value) -> Vec<CreateTransactionParams> {
    serde_json::from_value(fixture["expected"].clone()).expect("invalid expected block")
}

// ─── Hash ─────────────────────────────────────────────────────────────────────

#[test]
fn golden_tx_hash_of_testnet_transaction() {
    let f = load_fixture("one-tx-two-msg.json");
    let (block, _) = parse_block_resp(&f["blockResp"].to_string()).unwrap();

    assert_eq!(block.txs[0].len(), 596);
    assert_eq!(
        tx_hash(&block.txs[0]),
        "4936522F7391D425F2A93AD47576F8AEC3947DC907113BE8A2FBCFF8E9F2A416"
    );
}

// ─── Transaction commands ─────────────────────────────────────────────────────

#[test]
fn golden_one_tx_two_msg_without_fee() {
    let f = load_fixture("one-tx-two-msg.json");
    let cmds = parse_fixture(&f).unwrap();

    assert_eq!(cmds, expected(&f));
    let cmd = &cmds[0];
    assert_eq!(cmd.msg_count, 2);
    assert!(cmd.fee.is_zero());

    let log: serde_json::Value = serde_json::from_str(&cmd.log).unwrap();
    let entries = log.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    for entry in entries {
        assert_eq!(entry["events"][0]["attributes"][0]["key"], "action");
        assert_eq!(entry["events"][0]["attributes"][0]["value"], "send");
    }
}

#[test]
fn golden_tx_with_fee() {
    let f = load_fixture("tx-with-fee.json");
    let cmds = parse_fixture(&f).unwrap();

    assert_eq!(cmds, expected(&f));
    assert_eq!(cmds[0].fee.to_string(), "8000000basetcro");
}

#[test]
fn golden_failed_tx_keeps_raw_error_log() {
    let f = load_fixture("failed-tx-with-fee.json");
    let cmds = parse_fixture(&f).unwrap();

    assert_eq!(cmds, expected(&f));
    let cmd = &cmds[0];
    assert_eq!(cmd.code, 11);
    assert_eq!(
        cmd.log,
        "out of gas in location: WriteFlat; gasWanted: 80000000, gasUsed: 80150021: out of gas"
    );
    assert!(serde_json::from_str::<serde_json::Value>(&cmd.log).is_err());
    assert_eq!(cmd.gas_wanted, "80000000");
    assert_eq!(cmd.gas_used, "80150021");
}

#[test]
fn golden_failed_tx_without_fee() {
    let f = load_fixture("failed-tx-without-fee.json");
    let cmds = parse_fixture(&f).unwrap();

    assert_eq!(cmds, expected(&f));
    assert_eq!(cmds[0].msg_count, 5);
    assert!(cmds[0].fee.is_zero());
}

#[test]
fn golden_fee_coins_are_summed() {
    let f = load_fixture("two-fee-coins.json");
    let cmds = parse_fixture(&f).unwrap();

    assert_eq!(cmds, expected(&f));
    assert_eq!(cmds[0].fee.amount.to_string(), "7500");
    assert_eq!(cmds.iter().map(|c| c.index).collect::<Vec<_>>(), [0, 1]);
}

#[test]
fn golden_truncated_tx_reports_length() {
    let f = load_fixture("truncated-tx.json");
    let err = parse_fixture(&f).unwrap_err();
    let want = &f["expectedError"];

    match err {
        FeedError::Decode {
            height,
            index,
            tx_len,
            reason,
        } => {
            assert_eq!(height, 600_001);
            assert_eq!(index as u64, want["index"].as_u64().unwrap());
            assert_eq!(tx_len as u64, want["txLen"].as_u64().unwrap());
            assert!(reason.contains(want["txHash"].as_str().unwrap()));
        }
        other => panic!("expected Decode, got {other:?}"),
    }
}

// ─── Determinism ──────────────────────────────────────────────────────────────

#[test]
fn golden_decoding_is_deterministic() {
    for name in [
        "one-tx-two-msg.json",
        "tx-with-fee.json",
        "failed-tx-without-fee.json",
        "two-fee-coins.json",
    ] {
        let f = load_fixture(name);
        assert_eq!(parse_fixture(&f).unwrap(), parse_fixture(&f).unwrap(), "{name}");
    }
}

// ─── Block commands → events ──────────────────────────────────────────────────

#[test]
fn golden_block_commands_to_events() {
    let f = load_fixture("two-fee-coins.json");
    let (block, _) = parse_block_resp(&f["blockResp"].to_string()).unwrap();
    let results = parse_block_results_resp(&f["blockResultsResp"].to_string()).unwrap();

    let events = parse_block_commands(&TxDecoder::new("basetcro"), &block, &results)
        .unwrap()
        .iter()
        .map(|c| c.exec())
        .collect::<Result<Vec<_>, _>>()
        .unwrap();

    let names: Vec<_> = events.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, [BLOCK_CREATED, TRANSACTION_CREATED, TRANSACTION_CREATED]);
    assert!(events.iter().all(|e| e.height == 512_000));
    assert_eq!(events[0].payload["txCount"], 2);
    assert_eq!(events[0].payload["committedSignatures"], 2);
    assert_eq!(events[2].payload["msgCount"], 2);
}
