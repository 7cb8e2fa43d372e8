//! `eip712Signer`: sign or verify arbitrary EIP-712 typed data.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use w402::NodeError;
use w402::node::{Node, NodeContext, Parameters, run_items};
use w402_evm::TypedDataSigner;
use w402_evm::signer::{self, signature_hex, typed_data};

use crate::params;
use crate::payment::EVM_PRIVATE_KEY_CREDENTIAL;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
enum Operation {
    Sign,
    Verify,
}

/// Typed-data signer over operator-supplied domain, types and message.
#[derive(Debug, Clone, Copy, Default)]
pub struct Eip712Node;

/// Domain object with empty fields left out.
fn domain(ctx: &dyn NodeContext, item: usize) -> Value {
    let mut domain = Map::new();
    let fields = [
        ("domainName", "name"),
        ("domainVersion", "version"),
        ("verifyingContract", "verifyingContract"),
        ("salt", "salt"),
    ];
    for (parameter, key) in fields {
        let value = ctx.str_or(parameter, item, "");
        if !value.trim().is_empty() {
            domain.insert(key.to_owned(), Value::String(value.trim().to_owned()));
        }
    }
    let chain_id = ctx.u64_or("chainId", item, 0);
    if chain_id != 0 {
        domain.insert("chainId".to_owned(), chain_id.into());
    }
    Value::Object(domain)
}

/// A JSON field given as text or as a value.
fn json_field(ctx: &dyn NodeContext, name: &str, item: usize, what: &str) -> Result<Value, NodeError> {
    match ctx.parameter(name, item) {
        Some(Value::String(text)) => serde_json::from_str(&text).map_err(|e| {
            NodeError::configuration(format!("Invalid {what} JSON")).with_description(e.to_string())
        }),
        Some(Value::Null) | None => Err(NodeError::configuration(format!("Invalid {what} JSON"))),
        Some(value) => Ok(value),
    }
}

impl Eip712Node {
    fn execute_item(ctx: &dyn NodeContext, item: usize) -> Result<Value, NodeError> {
        let operation: Operation = params::choice(ctx, "operation", item, "sign")?;
        let types = json_field(ctx, "typesDefinition", item, "types definition")?;
        let message = json_field(ctx, "messageData", item, "message data")?;
        let primary_type = ctx.required_str("primaryType", item)?;
        let domain = domain(ctx, item);
        let data = typed_data(&domain, &types, primary_type.trim(), &message)?;

        match operation {
            Operation::Sign => {
                let key = ctx
                    .credential_str(EVM_PRIVATE_KEY_CREDENTIAL, "privateKey")
                    .map_err(|_| NodeError::validation("Private key is required"))?;
                let signer = TypedDataSigner::from_private_key(&key)?;
                let signature = signer.sign(&data)?;
                Ok(json!({
                    "signature": signature_hex(&signature),
                    "signerAddress": signer.address().to_string(),
                    "domain": domain,
                    "types": types,
                    "message": message,
                    "primaryType": primary_type,
                }))
            }
            Operation::Verify => {
                let signature = ctx.required_str("signatureToVerify", item)?;
                let expected = ctx.required_str("signerAddress", item)?;
                let verification = signer::verify(&data, &signature, &expected)?;
                Ok(json!({
                    "isValid": verification.is_valid,
                    "recoveredAddress": verification.recovered.to_string(),
                    "expectedSignerAddress": expected,
                    "signature": signature,
                    "domain": domain,
                    "types": types,
                    "message": message,
                    "primaryType": primary_type,
                }))
            }
        }
    }
}

#[async_trait]
impl Node for Eip712Node {
    fn name(&self) -> &'static str {
        "eip712Signer"
    }

    async fn execute(&self, ctx: &dyn NodeContext) -> Result<Vec<Vec<Value>>, NodeError> {
        let items = run_items(ctx, |item| async move { Self::execute_item(ctx, item) }).await?;
        Ok(vec![items])
    }
}
