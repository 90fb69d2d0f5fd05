use alloy::{
    dyn_abi::{DynSolType, DynSolValue, FunctionExt, Specifier},
    eips::eip2718::Encodable2718,
    json_abi::Function,
    network::{Ethereum, EthereumWallet, TransactionBuilder},
    primitives::{Address, Bytes, TxHash, U256},
    rpc::types::TransactionRequest,
    signers::local::PrivateKeySigner,
};
use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Mutex;
use tracing::{debug, info, warn};

use super::abi::ContractRecord;
use super::chain::{ChainClient, MethodCall};
use super::classifier::{DispatchClass, Mutability, MethodTable};
use super::{TransactionInfo, TxEvent};
use crate::error::DispatchError;

/// A contract the dispatcher can talk to.
#[derive(Debug, Clone)]
pub struct LoadedContract {
    pub name: String,
    pub address: Address,
    pub abi: Value,
    methods: MethodTable,
}

impl LoadedContract {
    pub fn methods(&self) -> &MethodTable {
        &self.methods
    }
}

#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    pub from: Option<Address>,
}

/// Per-transaction overrides. Anything left `None` is resolved from the node.
#[derive(Debug, Clone, Default)]
pub struct TxOptions {
    pub value: Option<U256>,
    pub nonce: Option<u64>,
    pub gas_price: Option<u128>,
    pub gas_limit: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GasDefaults {
    pub gas_price: Option<u128>,
    pub gas_limit: Option<u64>,
}

/// A fully prepared transaction, ready to hand to the node.
#[derive(Debug, Clone)]
pub enum Submission {
    /// Signed here; `raw` is the EIP-2718 encoded envelope.
    Signed {
        request: TransactionRequest,
        raw: Bytes,
    },
    /// Signed by the node's wallet; no call data is attached yet.
    Delegated {
        request: TransactionRequest,
        call: MethodCall,
    },
}

impl Submission {
    pub fn request(&self) -> &TransactionRequest {
        match self {
            Submission::Signed { request, .. } | Submission::Delegated { request, .. } => request,
        }
    }
}

enum Stage {
    Ready(Submission),
    Broadcast(TxHash),
    Done,
}

/// Drives a submission through broadcast and mining, one event at a time.
pub struct PendingSubmission<'a, C: ?Sized> {
    client: &'a C,
    stage: Stage,
}

impl<'a, C: ChainClient + ?Sized> PendingSubmission<'a, C> {
    fn new(client: &'a C, submission: Submission) -> Self {
        Self {
            client,
            stage: Stage::Ready(submission),
        }
    }

    /// Next lifecycle event, or `None` once a terminal event was returned.
    pub async fn next_event(&mut self) -> Option<TxEvent> {
        match std::mem::replace(&mut self.stage, Stage::Done) {
            Stage::Ready(submission) => {
                let broadcast = match submission {
                    Submission::Signed { raw, .. } => self.client.send_raw_transaction(&raw).await,
                    Submission::Delegated { request, call } => {
                        self.client.send_contract_call(request, &call).await
                    }
                };

                match broadcast {
                    Ok(hash) => {
                        info!("Transaction sent with hash: 0x{:x}", hash);
                        self.stage = Stage::Broadcast(hash);
                        Some(TxEvent::Submitted(hash))
                    }
                    Err(e) => Some(TxEvent::Failed(e)),
                }
            }
            Stage::Broadcast(hash) => match self.client.wait_for_receipt(hash).await {
                Ok(receipt) if receipt.status => Some(TxEvent::Mined(receipt)),
                Ok(receipt) => Some(TxEvent::Failed(DispatchError::ChainRpc(format!(
                    "Transaction {} reverted in block {}",
                    receipt.hash, receipt.block_number
                )))),
                Err(e) => Some(TxEvent::Failed(e)),
            },
            Stage::Done => None,
        }
    }

    /// Runs to the terminal event, passing every event to `on_event` first.
    pub async fn finish(
        mut self,
        mut on_event: impl FnMut(&TxEvent),
    ) -> Result<TransactionInfo, DispatchError> {
        while let Some(event) = self.next_event().await {
            on_event(&event);
            match event {
                TxEvent::Submitted(_) => continue,
                TxEvent::Mined(receipt) => return Ok(receipt),
                TxEvent::Failed(e) => return Err(e),
            }
        }
        Err(DispatchError::ChainRpc(
            "Transaction lifecycle already completed".to_string(),
        ))
    }
}

/// Outcome of [`Dispatcher::dispatch`].
pub enum Dispatched<'a, C: ?Sized> {
    Read(Value),
    Submitted(PendingSubmission<'a, C>),
}

/// A call as entered by a user: which function, with what, from whom.
#[derive(Debug, Clone, Default)]
pub struct Invocation {
    pub contract: String,
    pub method: String,
    pub params: Value,
    pub from: Option<Address>,
    pub private_key: Option<String>,
    pub options: TxOptions,
}

pub struct Dispatcher<C> {
    client: C,
    contracts: HashMap<String, LoadedContract>,
    gas: Mutex<GasDefaults>,
    user_account: Mutex<Option<Address>>,
}

impl<C: ChainClient> Dispatcher<C> {
    pub fn new(client: C) -> Self {
        Self {
            client,
            contracts: HashMap::new(),
            gas: Mutex::new(GasDefaults::default()),
            user_account: Mutex::new(None),
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Registers a contract under `name`, replacing any previous one.
    pub fn load_contract(&mut self, address: Address, abi: Value, name: &str) {
        let methods = MethodTable::from_abi(&abi);
        self.insert_contract(address, abi, methods, name);
    }

    fn insert_contract(&mut self, address: Address, abi: Value, methods: MethodTable, name: &str) {
        debug!("Loaded contract {} at 0x{:x}", name, address);
        self.contracts.insert(
            name.to_string(),
            LoadedContract {
                name: name.to_string(),
                address,
                abi,
                methods,
            },
        );
    }

    /// Loads every record deployed on `network_id`. Returns the names of the
    /// records that have no deployment there.
    pub fn boot_contracts(&mut self, records: &[ContractRecord], network_id: u64) -> Vec<String> {
        let mut skipped = Vec::new();
        for record in records {
            match record.address_on(network_id) {
                Some(address) => self.insert_contract(
                    address,
                    record.abi.clone(),
                    record.methods().clone(),
                    record.name(),
                ),
                None => {
                    warn!(
                        "The network ID {} does not exist for the contract {}. Probably you have to change network.",
                        network_id,
                        record.name()
                    );
                    skipped.push(record.name().to_string());
                }
            }
        }
        skipped
    }

    pub fn contract(&self, name: &str) -> Option<&LoadedContract> {
        self.contracts.get(name)
    }

    pub fn contract_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.contracts.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Mutability of `method` on `contract`, `Unknown` if either is missing.
    pub fn classify(&self, method: &str, contract: &str) -> Mutability {
        self.contract(contract)
            .map(|c| c.methods.classify(method))
            .unwrap_or(Mutability::Unknown)
    }

    /// Read-only call through `eth_call`, decoded to JSON.
    pub async fn call(
        &self,
        method: &str,
        params: &Value,
        contract: &str,
        options: &CallOptions,
    ) -> Result<Value, DispatchError> {
        let loaded = self.loaded(contract)?;
        let call = self.method_call(loaded, method, params)?;

        let mut request = TransactionRequest::default()
            .with_to(loaded.address)
            .with_input(call.encode()?);
        if let Some(from) = options.from {
            request = request.with_from(from);
        }

        let output = self.client.call(&request).await?;
        decode_output(&call.function, &output)
    }

    /// Builds and submits a state-changing call. With a private key the
    /// transaction is signed here and broadcast raw; without one it goes to
    /// the node unsigned.
    pub async fn send_transaction(
        &self,
        from: Address,
        private_key: Option<&str>,
        method: &str,
        params: &Value,
        options: &TxOptions,
        contract: &str,
    ) -> Result<PendingSubmission<'_, C>, DispatchError> {
        let submission = self
            .prepare_submission(from, private_key, method, params, options, contract)
            .await?;
        Ok(PendingSubmission::new(&self.client, submission))
    }

    pub async fn prepare_submission(
        &self,
        from: Address,
        private_key: Option<&str>,
        method: &str,
        params: &Value,
        options: &TxOptions,
        contract: &str,
    ) -> Result<Submission, DispatchError> {
        let loaded = self.loaded(contract)?;
        let call = self.method_call(loaded, method, params)?;

        let Some(private_key) = private_key else {
            let request = self.transaction_scaffold(from, loaded.address, options).await?;
            return Ok(Submission::Delegated { request, call });
        };

        let signer = parse_signer(private_key)?;
        let signer_address = signer.address();
        if signer_address != from {
            warn!(
                "Sender 0x{:x} does not match the private key, sending from 0x{:x}",
                from, signer_address
            );
        }

        let request = self
            .transaction_scaffold(signer_address, loaded.address, options)
            .await?
            .with_chain_id(self.client.chain_id().await?)
            .with_input(call.encode()?);

        let wallet = EthereumWallet::from(signer);
        let envelope = <TransactionRequest as TransactionBuilder<Ethereum>>::build(
            request.clone(),
            &wallet,
        )
        .await
        .map_err(|e| DispatchError::Signing(e.to_string()))?;

        Ok(Submission::Signed {
            request,
            raw: envelope.encoded_2718().into(),
        })
    }

    /// `from`, `to`, a fresh pending nonce, and the gas defaults unless
    /// overridden. `value` only when one was supplied.
    pub async fn transaction_scaffold(
        &self,
        from: Address,
        to: Address,
        options: &TxOptions,
    ) -> Result<TransactionRequest, DispatchError> {
        let nonce = match options.nonce {
            Some(nonce) => nonce,
            None => self.client.pending_nonce(from).await?,
        };
        let gas_price = match options.gas_price {
            Some(gas_price) => gas_price,
            None => self.gas_price().await?,
        };
        let gas_limit = match options.gas_limit {
            Some(gas_limit) => gas_limit,
            None => self.gas_limit().await?,
        };

        let mut request = TransactionRequest::default()
            .with_from(from)
            .with_to(to)
            .with_nonce(nonce)
            .with_gas_price(gas_price)
            .with_gas_limit(gas_limit);
        if let Some(value) = options.value {
            request = request.with_value(value);
        }

        Ok(request)
    }

    /// Gas price, fetched on first use and then reused.
    pub async fn gas_price(&self) -> Result<u128, DispatchError> {
        if let Some(gas_price) = self.gas_defaults().gas_price {
            return Ok(gas_price);
        }

        let gas_price = self.client.gas_price().await?;
        self.update_gas(|gas| gas.gas_price = Some(gas_price));
        Ok(gas_price)
    }

    /// Gas limit of the latest block, fetched on first use and then reused.
    pub async fn gas_limit(&self) -> Result<u64, DispatchError> {
        if let Some(gas_limit) = self.gas_defaults().gas_limit {
            return Ok(gas_limit);
        }

        let gas_limit = self.fetch_gas_limit().await?;
        self.update_gas(|gas| gas.gas_limit = Some(gas_limit));
        Ok(gas_limit)
    }

    /// Replaces the cached gas price and limit with fresh values.
    pub async fn refresh_gas(&self) -> Result<GasDefaults, DispatchError> {
        let gas_price = self.client.gas_price().await?;
        let gas_limit = self.fetch_gas_limit().await?;
        let fresh = GasDefaults {
            gas_price: Some(gas_price),
            gas_limit: Some(gas_limit),
        };
        self.update_gas(|gas| *gas = fresh);
        Ok(fresh)
    }

    pub fn gas_defaults(&self) -> GasDefaults {
        self.gas.lock().map(|gas| *gas).unwrap_or_default()
    }

    /// First account managed by the node, if any.
    pub async fn user_account(&self) -> Result<Option<Address>, DispatchError> {
        if let Some(account) = self.user_account.lock().ok().and_then(|guard| *guard) {
            return Ok(Some(account));
        }

        let account = self.client.accounts().await?.into_iter().next();
        if let (Some(account), Ok(mut guard)) = (account, self.user_account.lock()) {
            *guard = Some(account);
        }
        Ok(account)
    }

    /// Classifies the method and routes it to [`call`](Self::call) or
    /// [`send_transaction`](Self::send_transaction).
    pub async fn dispatch(
        &self,
        invocation: &Invocation,
    ) -> Result<Dispatched<'_, C>, DispatchError> {
        let loaded = self.loaded(&invocation.contract)?;
        let class = loaded
            .methods
            .classify(&invocation.method)
            .dispatch_class(&invocation.method)?;

        info!("Calling the smart contract function: {}", invocation.method);

        match class {
            DispatchClass::ReadOnly => {
                let from = match invocation.from {
                    Some(from) => Some(from),
                    None => self.user_account().await?,
                };
                let value = self
                    .call(
                        &invocation.method,
                        &invocation.params,
                        &invocation.contract,
                        &CallOptions { from },
                    )
                    .await?;
                Ok(Dispatched::Read(value))
            }
            DispatchClass::Transaction { payable } => {
                if !payable && invocation.options.value.is_some_and(|v| !v.is_zero()) {
                    warn!(
                        "Sending value to non-payable function {}, the node will likely reject it",
                        invocation.method
                    );
                }

                let from = self.sender(invocation).await?;
                let pending = self
                    .send_transaction(
                        from,
                        invocation.private_key.as_deref(),
                        &invocation.method,
                        &invocation.params,
                        &invocation.options,
                        &invocation.contract,
                    )
                    .await?;
                Ok(Dispatched::Submitted(pending))
            }
        }
    }

    async fn sender(&self, invocation: &Invocation) -> Result<Address, DispatchError> {
        if let Some(from) = invocation.from {
            return Ok(from);
        }
        if let Some(key) = &invocation.private_key {
            return Ok(parse_signer(key)?.address());
        }
        self.user_account().await?.ok_or_else(|| {
            DispatchError::InvalidParams(
                "No sending account: pass a sender address or a private key".to_string(),
            )
        })
    }

    async fn fetch_gas_limit(&self) -> Result<u64, DispatchError> {
        self.client.latest_gas_limit().await?.ok_or_else(|| {
            DispatchError::ChainRpc("The node returned no latest block".to_string())
        })
    }

    fn update_gas(&self, update: impl FnOnce(&mut GasDefaults)) {
        if let Ok(mut gas) = self.gas.lock() {
            update(&mut gas);
        }
    }

    fn loaded(&self, contract: &str) -> Result<&LoadedContract, DispatchError> {
        self.contracts
            .get(contract)
            .ok_or_else(|| DispatchError::ContractNotLoaded(contract.to_string()))
    }

    fn method_call(
        &self,
        loaded: &LoadedContract,
        method: &str,
        params: &Value,
    ) -> Result<MethodCall, DispatchError> {
        let function = loaded
            .methods
            .find(method)
            .and_then(|entry| entry.function.clone())
            .ok_or_else(|| DispatchError::MethodNotFound {
                method: method.to_string(),
                contract: loaded.name.clone(),
            })?;

        let args = resolve_args(&function, params)?;
        Ok(MethodCall { function, args })
    }
}

fn parse_signer(private_key: &str) -> Result<PrivateKeySigner, DispatchError> {
    let private_key = private_key.trim();
    let private_key = private_key.strip_prefix("0x").unwrap_or(private_key);
    PrivateKeySigner::from_str(private_key)
        .map_err(|e| DispatchError::InvalidPrivateKey(e.to_string()))
}

/// Turns user parameters into ABI values. `null` means no arguments, an array
/// is positional, an object is matched by input name, and any other value is
/// the single argument.
fn resolve_args(function: &Function, params: &Value) -> Result<Vec<DynSolValue>, DispatchError> {
    let values: Vec<&Value> = match params {
        Value::Null => Vec::new(),
        Value::Array(items) => items.iter().collect(),
        Value::Object(named) => function
            .inputs
            .iter()
            .map(|input| {
                named.get(&input.name).ok_or_else(|| {
                    DispatchError::InvalidParams(format!(
                        "Missing parameter '{}' of type '{}' for function '{}'",
                        input.name, input.ty, function.name
                    ))
                })
            })
            .collect::<Result<_, _>>()?,
        scalar => vec![scalar],
    };

    if values.len() != function.inputs.len() {
        let expected: Vec<String> = function
            .inputs
            .iter()
            .map(|input| format!("{} {}", input.ty, input.name))
            .collect();
        return Err(DispatchError::InvalidParams(format!(
            "Function '{}' expects {} parameter(s) [{}], got {}",
            function.name,
            function.inputs.len(),
            expected.join(", "),
            values.len()
        )));
    }

    function
        .inputs
        .iter()
        .zip(values)
        .enumerate()
        .map(|(i, (input, value))| {
            let ty: DynSolType = input.resolve().map_err(|e| {
                DispatchError::InvalidParams(format!("Unsupported type '{}': {}", input.ty, e))
            })?;
            json_to_sol_value(value, &ty).map_err(|e| {
                DispatchError::InvalidParams(format!(
                    "Invalid parameter #{} ('{}' of type '{}'): {}",
                    i + 1,
                    input.name,
                    input.ty,
                    e
                ))
            })
        })
        .collect()
}

fn json_to_sol_value(value: &Value, ty: &DynSolType) -> Result<DynSolValue, String> {
    match (ty, value) {
        (DynSolType::Array(inner), Value::Array(items)) => items
            .iter()
            .map(|item| json_to_sol_value(item, inner))
            .collect::<Result<_, _>>()
            .map(DynSolValue::Array),
        (DynSolType::FixedArray(inner, len), Value::Array(items)) => {
            if items.len() != *len {
                return Err(format!("expected {} elements, got {}", len, items.len()));
            }
            items
                .iter()
                .map(|item| json_to_sol_value(item, inner))
                .collect::<Result<_, _>>()
                .map(DynSolValue::FixedArray)
        }
        (DynSolType::Tuple(types), Value::Array(items)) => {
            if items.len() != types.len() {
                return Err(format!("expected {} fields, got {}", types.len(), items.len()));
            }
            types
                .iter()
                .zip(items)
                .map(|(ty, item)| json_to_sol_value(item, ty))
                .collect::<Result<_, _>>()
                .map(DynSolValue::Tuple)
        }
        (DynSolType::String, Value::String(s)) => Ok(DynSolValue::String(s.clone())),
        (DynSolType::Bool, Value::Bool(b)) => Ok(DynSolValue::Bool(*b)),
        (_, Value::String(s)) => ty.coerce_str(s.trim()).map_err(|e| e.to_string()),
        (_, Value::Number(n)) => ty.coerce_str(&n.to_string()).map_err(|e| e.to_string()),
        _ => Err(format!("cannot use {} as {}", value, ty)),
    }
}

fn decode_output(function: &Function, output: &Bytes) -> Result<Value, DispatchError> {
    if output.is_empty() {
        if function.outputs.is_empty() {
            return Ok(Value::Null);
        }
        return Err(DispatchError::ChainRpc(format!(
            "Returned values aren't valid for {}: the call returned no data. The contract may not be deployed at this address on the current network",
            function.name
        )));
    }

    let decoded = function
        .abi_decode_output(output, false)
        .map_err(|e| DispatchError::ChainRpc(format!("Failed to decode result: {}", e)))?;

    match decoded.as_slice() {
        [single] => Ok(sol_value_to_json(single)),
        values => Ok(Value::Array(values.iter().map(sol_value_to_json).collect())),
    }
}

fn sol_value_to_json(value: &DynSolValue) -> Value {
    match value {
        DynSolValue::Address(addr) => Value::String(addr.to_checksum(None)),
        DynSolValue::Uint(num, _) => Value::String(num.to_string()),
        DynSolValue::Int(num, _) => Value::String(num.to_string()),
        DynSolValue::Bool(b) => Value::Bool(*b),
        DynSolValue::String(s) => Value::String(s.clone()),
        DynSolValue::Bytes(bytes) => Value::String(format!("0x{}", hex::encode(bytes))),
        DynSolValue::FixedBytes(word, size) => {
            Value::String(format!("0x{}", hex::encode(&word[..*size])))
        }
        DynSolValue::Array(items) | DynSolValue::FixedArray(items) | DynSolValue::Tuple(items) => {
            Value::Array(items.iter().map(sol_value_to_json).collect())
        }
        other => Value::String(format!("{:?}", other)),
    }
}
