// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Attested Processor Contributors

//! # Runtime Configuration Constants
//!
//! This module defines environment variable names, default values and the
//! fixed timing thresholds used throughout the processor. Configuration is
//! loaded from the environment at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DATA_DIR` | Root directory for the embedded replay-state store | `/data` |
//! | `KEY_WRAP_SECRET` | Hex-encoded 32-byte key-wrapping secret for sealed keys | Required |
//! | `ACURAST_RPC_URLS` | Comma-separated account-model chain RPC endpoints | Required |
//! | `ETHEREUM_RPC_URLS` | Comma-separated EVM RPC endpoints | Optional |
//! | `TEZOS_RPC_URLS` | Comma-separated tz-style RPC endpoints | Optional |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info` |

use std::time::Duration;

/// Environment variable name for the embedded store directory path.
///
/// When running under an enclave runtime this is mounted as an encrypted
/// filesystem; the sealed key blobs and replay state live here.
pub const DATA_DIR_ENV: &str = "DATA_DIR";

/// Environment variable holding the hex-encoded key-wrapping secret.
pub const KEY_WRAP_SECRET_ENV: &str = "KEY_WRAP_SECRET";

/// Environment variables holding comma-separated RPC endpoint lists.
pub const ACURAST_RPC_URLS_ENV: &str = "ACURAST_RPC_URLS";
pub const ETHEREUM_RPC_URLS_ENV: &str = "ETHEREUM_RPC_URLS";
pub const TEZOS_RPC_URLS_ENV: &str = "TEZOS_RPC_URLS";

/// Default store directory.
pub const DEFAULT_DATA_DIR: &str = "/data";

/// Maximum age of the cached account counter before it is re-fetched from
/// the network. Rapid repeated submissions inside this window reuse the
/// cached value plus one.
pub const COUNTER_FRESHNESS_WINDOW: Duration = Duration::from_secs(30);

/// An endpoint is considered synced when its reported head timestamp is
/// within this much of local wall-clock time.
pub const NODE_SYNC_THRESHOLD: Duration = Duration::from_secs(120);

/// Per-endpoint probe timeout during a selection round.
pub const NODE_PROBE_TIMEOUT: Duration = Duration::from_millis(500);

/// How many randomly selected synced endpoints a single read or
/// submission is raced against.
pub const ENDPOINT_RACE_SET_SIZE: usize = 3;

/// Transaction submission attempt budget.
pub const SUBMISSION_RETRY_ATTEMPTS: u32 = 3;

/// Base delay for linear submission backoff (`attempt x base`).
pub const SUBMISSION_RETRY_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Interval between on-chain liveness heartbeats.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(900);

/// Wall-clock budget for a single sandboxed script execution.
pub const SCRIPT_EXECUTION_DEADLINE: Duration = Duration::from_secs(10);

/// Connect/read timeout for HTTP calls issued on behalf of a script.
pub const CAPABILITY_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Connect/read timeout for chain RPC calls.
pub const RPC_TIMEOUT: Duration = Duration::from_secs(30);

/// Read a comma-separated URL list from the environment.
pub fn rpc_urls_from_env(var: &str) -> Vec<String> {
    std::env::var(var)
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rpc_url_list_parses_and_trims() {
        std::env::set_var("TEST_RPC_URLS", "https://a.example, https://b.example ,");
        let urls = rpc_urls_from_env("TEST_RPC_URLS");
        assert_eq!(urls, vec!["https://a.example", "https://b.example"]);
        std::env::remove_var("TEST_RPC_URLS");
    }

    #[test]
    fn missing_var_yields_empty_list() {
        assert!(rpc_urls_from_env("TEST_RPC_URLS_MISSING").is_empty());
    }
}
