//! Blockfrost REST client.

use async_trait::async_trait;
use chain_ada::value::AssetId;
use chain_ada::{
    AdaNetwork, Address, ProtocolParameters, SignedTransaction, TransactionInput,
    TransactionOutput, TxId, Utxo, Value,
};
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{ChainProvider, ProviderError};

const PROJECT_ID_HEADER: &str = "project_id";
const PAGE_SIZE: usize = 100;
const LOVELACE_UNIT: &str = "lovelace";
// Blockfrost answers 425 when its mempool is full.
const MEMPOOL_FULL: u16 = 425;

#[derive(Debug, Deserialize)]
struct AmountEntry {
    unit: String,
    quantity: String,
}

#[derive(Debug, Deserialize)]
struct UtxoEntry {
    tx_hash: String,
    output_index: u32,
    amount: Vec<AmountEntry>,
}

#[derive(Debug, Deserialize)]
struct EpochParameters {
    min_fee_a: u64,
    min_fee_b: u64,
    min_utxo: String,
    coins_per_utxo_size: Option<String>,
    max_tx_size: u64,
}

#[derive(Debug, Deserialize)]
struct LatestBlock {
    slot: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

fn malformed(what: impl std::fmt::Display) -> ProviderError {
    ProviderError::Unavailable(format!("malformed provider response: {what}"))
}

fn parse_quantity(raw: &str) -> Result<u64, ProviderError> {
    raw.parse()
        .map_err(|_| malformed(format!("quantity {raw:?} is not an unsigned integer")))
}

fn value_from_amounts(amounts: &[AmountEntry]) -> Result<Value, ProviderError> {
    let mut value = Value::default();
    for entry in amounts {
        let qty = parse_quantity(&entry.quantity)?;
        if entry.unit == LOVELACE_UNIT {
            value.coin = value
                .coin
                .checked_add(qty)
                .ok_or_else(|| malformed("lovelace overflows"))?;
        } else {
            let asset = AssetId::from_unit(&entry.unit).map_err(malformed)?;
            value
                .assets
                .add(asset, qty)
                .ok_or_else(|| malformed("asset quantity overflows"))?;
        }
    }
    Ok(value)
}

/// Map a non-success response to a provider error: throttling and server
/// faults are transient, every other client error is terminal.
async fn classify(response: reqwest::Response) -> ProviderError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .map(|e| e.message)
        .unwrap_or(body);
    let detail = format!("{status}: {message}");
    if status == StatusCode::TOO_MANY_REQUESTS
        || status.as_u16() == MEMPOOL_FULL
        || status.is_server_error()
    {
        ProviderError::Unavailable(detail)
    } else {
        ProviderError::Rejected(detail)
    }
}

fn transport(e: reqwest::Error) -> ProviderError {
    ProviderError::Unavailable(e.to_string())
}

/// Chain provider backed by the Blockfrost API.
#[derive(Debug, Clone)]
pub struct BlockfrostProvider {
    base_url: String,
    project_id: SecretString,
    client: reqwest::Client,
}

impl BlockfrostProvider {
    pub fn new(base_url: impl Into<String>, project_id: SecretString) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            project_id,
            client: reqwest::Client::new(),
        }
    }

    /// Provider for the public Blockfrost endpoint of `network`.
    pub fn for_network(network: AdaNetwork, project_id: SecretString) -> Self {
        Self::new(network.default_provider_url(), project_id)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, ProviderError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .header(PROJECT_ID_HEADER, self.project_id.expose_secret())
            .send()
            .await
            .map_err(transport)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(classify(response).await);
        }
        response.json::<T>().await.map(Some).map_err(malformed)
    }

    /// Whether `tx_id` is already in a block or in the provider's mempool.
    async fn is_known(&self, tx_id: &TxId) -> Result<bool, ProviderError> {
        for path in [format!("/txs/{tx_id}"), format!("/mempool/{tx_id}")] {
            if self.get_json::<IgnoredAny>(&path).await?.is_some() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// A rejected resubmission of a transaction whose first response was
    /// lost fails on its own inputs; resolve that case to the id.
    async fn resolve_rejection(&self, tx_cbor: &[u8], err: ProviderError) -> Result<TxId, ProviderError> {
        let Ok(tx) = SignedTransaction::from_cbor(tx_cbor) else {
            return Err(err);
        };
        let tx_id = tx.id();
        match self.is_known(&tx_id).await {
            Ok(true) => {
                info!(%tx_id, rejection = %err, "rejected transaction is already known to the chain");
                Ok(tx_id)
            }
            Ok(false) => Err(err),
            Err(lookup) => {
                debug!(%tx_id, error = %lookup, "could not look up rejected transaction");
                Err(err)
            }
        }
    }
}

#[async_trait]
impl ChainProvider for BlockfrostProvider {
    async fn utxos(&self, address: &Address) -> Result<Vec<Utxo>, ProviderError> {
        let bech32 = address.to_bech32();
        let mut utxos = Vec::new();
        let mut page = 1usize;
        loop {
            let path = format!("/addresses/{bech32}/utxos?page={page}&count={PAGE_SIZE}");
            // Addresses that never received funds are unknown to the indexer.
            let Some(entries) = self.get_json::<Vec<UtxoEntry>>(&path).await? else {
                break;
            };
            let fetched = entries.len();
            for entry in entries {
                let tx_id: TxId = entry.tx_hash.parse().map_err(malformed)?;
                utxos.push(Utxo::new(
                    TransactionInput::new(tx_id, entry.output_index),
                    TransactionOutput::new(address.clone(), value_from_amounts(&entry.amount)?),
                ));
            }
            if fetched < PAGE_SIZE {
                break;
            }
            page += 1;
        }
        debug!(address = %bech32, count = utxos.len(), "fetched utxos");
        Ok(utxos)
    }

    async fn protocol_parameters(&self) -> Result<ProtocolParameters, ProviderError> {
        let raw: EpochParameters = self
            .get_json("/epochs/latest/parameters")
            .await?
            .ok_or_else(|| malformed("no parameters for the latest epoch"))?;
        let coins_per_utxo_byte = match raw.coins_per_utxo_size.as_deref() {
            Some(v) => parse_quantity(v)?,
            None => 0,
        };
        Ok(ProtocolParameters {
            min_fee_constant: raw.min_fee_b,
            min_fee_coefficient: raw.min_fee_a,
            min_utxo_value: parse_quantity(&raw.min_utxo)?,
            coins_per_utxo_byte,
            max_tx_size: usize::try_from(raw.max_tx_size).map_err(malformed)?,
        })
    }

    async fn submit_tx(&self, tx_cbor: &[u8]) -> Result<TxId, ProviderError> {
        let url = format!("{}/tx/submit", self.base_url);
        let response = self
            .client
            .post(&url)
            .header(PROJECT_ID_HEADER, self.project_id.expose_secret())
            .header(CONTENT_TYPE, "application/cbor")
            .body(tx_cbor.to_vec())
            .send()
            .await
            .map_err(transport)?;
        if !response.status().is_success() {
            let outcome = match classify(response).await {
                err @ ProviderError::Rejected(_) => self.resolve_rejection(tx_cbor, err).await,
                err => Err(err),
            };
            if let Err(err) = &outcome {
                warn!(error = %err, "transaction submission failed");
            }
            return outcome;
        }
        let hash: String = response.json().await.map_err(malformed)?;
        hash.parse().map_err(malformed)
    }

    async fn latest_slot(&self) -> Result<u64, ProviderError> {
        let block: LatestBlock = self
            .get_json("/blocks/latest")
            .await?
            .ok_or_else(|| malformed("no latest block"))?;
        block.slot.ok_or_else(|| malformed("latest block has no slot"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain_ada::Credential;
    use wiremock::matchers::{body_bytes, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TX_HASH: &str = "4e3a6e7fdcb0d0efa17bf79c13aed2b4cb9baf37fb1aa2e39553d5bd720c5c99";
    const POLICY: &str = "0029cb7c88c7567b63d1a512c0ed626aa169688ec980730c0473b913";

    fn provider(server: &MockServer) -> BlockfrostProvider {
        BlockfrostProvider::new(server.uri(), SecretString::from("preprodTestKey".to_string()))
    }

    fn address() -> Address {
        Address::enterprise(Credential::Key([0x21; 28]), AdaNetwork::Testnet)
    }

    fn utxos_path() -> String {
        format!("/addresses/{}/utxos", address().to_bech32())
    }

    #[tokio::test]
    async fn utxos_are_mapped_with_assets() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(utxos_path()))
            .and(header("project_id", "preprodTestKey"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {
                    "address": address().to_bech32(),
                    "tx_hash": TX_HASH,
                    "output_index": 1,
                    "amount": [
                        { "unit": "lovelace", "quantity": "5000000" },
                        { "unit": format!("{POLICY}6e7574636f696e"), "quantity": "12" }
                    ],
                    "block": "7eb8e27d18686c7db9a18f8bbcfe34e3fed6e047afaa2d969904d15e934847e6",
                    "data_hash": null
                }
            ])))
            .mount(&server)
            .await;

        let utxos = provider(&server).utxos(&address()).await.unwrap();
        assert_eq!(utxos.len(), 1);
        let utxo = &utxos[0];
        assert_eq!(utxo.input.tx_id.to_hex(), TX_HASH);
        assert_eq!(utxo.input.index, 1);
        assert_eq!(utxo.output.address, address());
        assert_eq!(utxo.output.value.coin, 5_000_000);
        let asset = AssetId::from_unit(&format!("{POLICY}6e7574636f696e")).unwrap();
        assert_eq!(utxo.output.value.assets.get(&asset), 12);
    }

    #[tokio::test]
    async fn unknown_address_has_no_utxos() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(utxos_path()))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "status_code": 404,
                "error": "Not Found",
                "message": "The requested component has not been found."
            })))
            .mount(&server)
            .await;

        assert!(provider(&server).utxos(&address()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn utxos_follow_pagination() {
        let server = MockServer::start().await;
        let full_page: Vec<_> = (0..PAGE_SIZE as u32)
            .map(|i| {
                serde_json::json!({
                    "tx_hash": TX_HASH,
                    "output_index": i,
                    "amount": [{ "unit": "lovelace", "quantity": "1000000" }]
                })
            })
            .collect();
        Mock::given(method("GET"))
            .and(path(utxos_path()))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(full_page))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(utxos_path()))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                { "tx_hash": TX_HASH, "output_index": 500,
                  "amount": [{ "unit": "lovelace", "quantity": "7" }] }
            ])))
            .mount(&server)
            .await;

        let utxos = provider(&server).utxos(&address()).await.unwrap();
        assert_eq!(utxos.len(), PAGE_SIZE + 1);
        assert_eq!(utxos.last().unwrap().output.value.coin, 7);
    }

    #[tokio::test]
    async fn protocol_parameters_are_mapped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/epochs/latest/parameters"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "epoch": 225,
                "min_fee_a": 44,
                "min_fee_b": 155381,
                "max_block_size": 65536,
                "max_tx_size": 16384,
                "min_utxo": "4310",
                "coins_per_utxo_size": "4310"
            })))
            .mount(&server)
            .await;

        let params = provider(&server).protocol_parameters().await.unwrap();
        assert_eq!(
            params,
            ProtocolParameters {
                min_utxo_value: 4310,
                ..ProtocolParameters::default()
            }
        );
    }

    #[tokio::test]
    async fn missing_coins_per_utxo_size_disables_size_rule() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/epochs/latest/parameters"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "min_fee_a": 44,
                "min_fee_b": 155381,
                "max_tx_size": 16384,
                "min_utxo": "1000000",
                "coins_per_utxo_size": null
            })))
            .mount(&server)
            .await;

        let params = provider(&server).protocol_parameters().await.unwrap();
        assert_eq!(params.coins_per_utxo_byte, 0);
        assert_eq!(params.min_utxo_value, 1_000_000);
    }

    #[tokio::test]
    async fn submit_posts_cbor_and_returns_hash() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tx/submit"))
            .and(header("content-type", "application/cbor"))
            .and(body_bytes(vec![0x84, 0xa0]))
            .respond_with(ResponseTemplate::new(200).set_body_json(TX_HASH))
            .expect(1)
            .mount(&server)
            .await;

        let id = provider(&server).submit_tx(&[0x84, 0xa0]).await.unwrap();
        assert_eq!(id.to_hex(), TX_HASH);
    }

    #[tokio::test]
    async fn submit_bad_request_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tx/submit"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "status_code": 400,
                "error": "Bad Request",
                "message": "BadInputsUTxO"
            })))
            .mount(&server)
            .await;

        let err = provider(&server).submit_tx(&[0x80]).await.unwrap_err();
        match err {
            ProviderError::Rejected(msg) => assert!(msg.contains("BadInputsUTxO")),
            other => panic!("expected Rejected, got {other:?}"),
        }
    }

    fn signed_bytes() -> (Vec<u8>, TxId) {
        let spent = Utxo::new(
            TransactionInput::new(TX_HASH.parse().unwrap(), 0),
            TransactionOutput::new(address(), Value::lovelace(5_000_000)),
        );
        let body = chain_ada::TransactionBody {
            inputs: vec![spent.input],
            outputs: vec![TransactionOutput::new(address(), Value::lovelace(4_800_000))],
            fee: 200_000,
            ttl: None,
        };
        let unsigned = chain_ada::UnsignedTransaction::new(body, vec![spent]).unwrap();
        (unsigned.to_cbor(), unsigned.id())
    }

    fn bad_inputs() -> ResponseTemplate {
        ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "status_code": 400,
            "error": "Bad Request",
            "message": "BadInputsUTxO"
        }))
    }

    #[tokio::test]
    async fn rejected_resubmit_of_confirmed_tx_returns_its_id() {
        let server = MockServer::start().await;
        let (bytes, tx_id) = signed_bytes();
        Mock::given(method("POST"))
            .and(path("/tx/submit"))
            .respond_with(bad_inputs())
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/txs/{tx_id}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "hash": tx_id.to_hex(),
                "block_height": 123456,
                "slot": 412162200
            })))
            .expect(1)
            .mount(&server)
            .await;

        assert_eq!(provider(&server).submit_tx(&bytes).await.unwrap(), tx_id);
    }

    #[tokio::test]
    async fn rejected_resubmit_found_in_mempool_returns_its_id() {
        let server = MockServer::start().await;
        let (bytes, tx_id) = signed_bytes();
        Mock::given(method("POST"))
            .and(path("/tx/submit"))
            .respond_with(bad_inputs())
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/txs/{tx_id}")))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/mempool/{tx_id}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "tx": { "hash": tx_id.to_hex() }
            })))
            .mount(&server)
            .await;

        assert_eq!(provider(&server).submit_tx(&bytes).await.unwrap(), tx_id);
    }

    #[tokio::test]
    async fn rejected_unknown_tx_stays_rejected() {
        let server = MockServer::start().await;
        let (bytes, tx_id) = signed_bytes();
        Mock::given(method("POST"))
            .and(path("/tx/submit"))
            .respond_with(bad_inputs())
            .mount(&server)
            .await;
        for lookup in [format!("/txs/{tx_id}"), format!("/mempool/{tx_id}")] {
            Mock::given(method("GET"))
                .and(path(lookup))
                .respond_with(ResponseTemplate::new(404))
                .expect(1)
                .mount(&server)
                .await;
        }

        let err = provider(&server).submit_tx(&bytes).await.unwrap_err();
        assert!(matches!(err, ProviderError::Rejected(msg) if msg.contains("BadInputsUTxO")));
    }

    #[tokio::test]
    async fn throttling_and_outages_are_transient() {
        for status in [429u16, 500, 503] {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/tx/submit"))
                .respond_with(ResponseTemplate::new(status))
                .mount(&server)
                .await;
            let err = provider(&server).submit_tx(&[0x80]).await.unwrap_err();
            assert!(matches!(err, ProviderError::Unavailable(_)), "status {status}");
        }
    }

    #[tokio::test]
    async fn connection_failure_is_transient() {
        let p = BlockfrostProvider::new("http://127.0.0.1:1", SecretString::from("k".to_string()));
        let err = p.latest_slot().await.unwrap_err();
        assert!(matches!(err, ProviderError::Unavailable(_)));
    }

    #[tokio::test]
    async fn latest_slot_is_read() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/blocks/latest"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "hash": "4ea1ba291e8eef538635a53e59fddba7810d1679631cc3aed7c8e6c4091a516a",
                "height": 15243593,
                "slot": 412162133
            })))
            .mount(&server)
            .await;

        assert_eq!(provider(&server).latest_slot().await.unwrap(), 412_162_133);
    }

    #[test]
    fn malformed_quantities_fail() {
        let amounts = vec![AmountEntry {
            unit: "lovelace".into(),
            quantity: "-5".into(),
        }];
        assert!(value_from_amounts(&amounts).is_err());
    }

    #[test]
    fn default_urls_follow_network() {
        let mainnet = BlockfrostProvider::for_network(AdaNetwork::Mainnet, SecretString::from("k".to_string()));
        assert!(mainnet.base_url().contains("mainnet"));
        let testnet = BlockfrostProvider::for_network(AdaNetwork::Testnet, SecretString::from("k".to_string()));
        assert!(testnet.base_url().contains("preprod"));
    }
}
