//! ERC-20 `balanceOf` over JSON-RPC.
//!
//! One batched request per call: every account becomes an `eth_call` in a
//! single JSON-RPC batch against the chain's configured endpoint.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::BaseBalanceService;

/// `balanceOf(address)` selector.
const BALANCE_OF_SELECTOR: &str = "70a08231";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Deserialize)]
struct RpcResponse {
    id: usize,
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

pub struct RpcBalanceService {
    http_client: Client,
    rpc_urls: HashMap<u64, String>,
}

impl RpcBalanceService {
    pub fn new(rpc_urls: HashMap<u64, String>) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build RPC HTTP client")?;

        Ok(Self {
            http_client,
            rpc_urls,
        })
    }
}

#[async_trait]
impl BaseBalanceService for RpcBalanceService {
    async fn balance_of(
        &self,
        chain_id: u64,
        accounts: &[String],
        token: &str,
    ) -> Result<Vec<u128>> {
        if accounts.is_empty() {
            return Ok(Vec::new());
        }

        let rpc_url = self
            .rpc_urls
            .get(&chain_id)
            .ok_or_else(|| anyhow!("no RPC endpoint configured for chain {}", chain_id))?;

        let batch = accounts
            .iter()
            .enumerate()
            .map(|(id, account)| {
                Ok(json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "method": "eth_call",
                    "params": [
                        { "to": token, "data": encode_balance_of(account)? },
                        "latest"
                    ],
                }))
            })
            .collect::<Result<Vec<_>>>()?;

        let responses: Vec<RpcResponse> = self
            .http_client
            .post(rpc_url)
            .json(&batch)
            .send()
            .await
            .context("balanceOf batch request failed")?
            .error_for_status()?
            .json()
            .await
            .context("Failed to parse balanceOf batch response")?;

        let mut balances = vec![0u128; accounts.len()];
        for response in responses {
            if let Some(error) = response.error {
                return Err(anyhow!("eth_call {} failed: {}", response.id, error));
            }
            let slot = balances
                .get_mut(response.id)
                .ok_or_else(|| anyhow!("unexpected response id {}", response.id))?;
            *slot = decode_uint(response.result.as_deref().unwrap_or("0x"))?;
        }

        Ok(balances)
    }
}

/// Calldata for `balanceOf(account)`.
pub fn encode_balance_of(account: &str) -> Result<String> {
    let raw = account.strip_prefix("0x").unwrap_or(account);
    let bytes = hex::decode(raw).with_context(|| format!("invalid address {}", account))?;
    if bytes.len() != 20 {
        return Err(anyhow!("address {} is not 20 bytes", account));
    }
    Ok(format!(
        "0x{}{:0>64}",
        BALANCE_OF_SELECTOR,
        hex::encode(bytes)
    ))
}

/// Decode a `uint256` return value, saturating at `u128::MAX`.
pub fn decode_uint(result: &str) -> Result<u128> {
    let raw = result.strip_prefix("0x").unwrap_or(result);
    if raw.is_empty() {
        return Ok(0);
    }
    let digits = raw.trim_start_matches('0');
    if digits.is_empty() {
        return Ok(0);
    }
    if digits.len() > 32 {
        return Ok(u128::MAX);
    }
    u128::from_str_radix(digits, 16).with_context(|| format!("invalid uint256 {}", result))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_selector_and_left_padded_address() {
        let data = encode_balance_of("0x00000000000000000000000000000000000000ff").unwrap();
        assert!(data.starts_with("0x70a08231"));
        assert_eq!(data.len(), 2 + 8 + 64);
        assert!(data.ends_with("ff"));
        assert_eq!(&data[10..34], "000000000000000000000000");
    }

    #[test]
    fn rejects_malformed_addresses() {
        assert!(encode_balance_of("0x1234").is_err());
        assert!(encode_balance_of("not-an-address").is_err());
    }

    #[test]
    fn decodes_uint256_results() {
        assert_eq!(decode_uint("0x").unwrap(), 0);
        assert_eq!(
            decode_uint("0x00000000000000000000000000000000000000000000000000000000000f4240")
                .unwrap(),
            1_000_000
        );
        assert_eq!(
            decode_uint("0xffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff")
                .unwrap(),
            u128::MAX
        );
    }
}
