//! Reference payments backend: customers, charges, refunds.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use greenroom_core::{
    amount_risk_level, RiskEvent, RiskLevel, ToolCallResult, ToolDef, INJECTION_TOOL_PREFIX,
};
use greenroom_state::{ServiceSchema, StateEngine, StateError};

const SERVICE: &str = "payments";

pub struct PaymentsBackend {
    state: Arc<StateEngine>,
}

#[derive(Deserialize)]
struct CreateCustomerParams {
    name: String,
    email: String,
}

#[derive(Deserialize)]
struct ChargeParams {
    customer_id: String,
    amount: f64,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Deserialize)]
struct RefundParams {
    transaction_id: String,
    amount: f64,
}

#[derive(Deserialize)]
struct ListTransactionsParams {
    #[serde(default)]
    customer_id: Option<String>,
}

#[derive(Deserialize)]
struct InjectParams {
    amount: f64,
    description: String,
    #[serde(default)]
    counterparty: Option<String>,
}

impl PaymentsBackend {
    pub fn new(state: Arc<StateEngine>) -> Result<Self, StateError> {
        state.register_service(&ServiceSchema::new(SERVICE, &["customer", "transaction"]))?;
        Ok(PaymentsBackend { state })
    }

    fn create_customer(&self, params: CreateCustomerParams) -> Result<ToolCallResult, StateError> {
        let customer = self.state.create_object(
            SERVICE,
            "customer",
            None,
            serde_json::json!({"name": params.name, "email": params.email}),
        )?;
        Ok(ToolCallResult::json(&serde_json::to_value(&customer)?))
    }

    fn charge(&self, params: ChargeParams) -> Result<ToolCallResult, StateError> {
        if params.amount <= 0.0 {
            return Ok(ToolCallResult::error(
                "Charge amount must be positive".to_string(),
            ));
        }
        if self.state.get_object(&params.customer_id)?.is_none() {
            return Ok(ToolCallResult::error(format!(
                "Unknown customer: {}",
                params.customer_id
            )));
        }

        let transaction = self.state.create_object(
            SERVICE,
            "transaction",
            None,
            serde_json::json!({
                "type": "charge",
                "customer_id": params.customer_id,
                "amount": params.amount,
                "description": params.description,
                "refunded": 0.0,
            }),
        )?;
        self.state.log_event(
            &RiskEvent::new(
                SERVICE,
                "charge",
                amount_risk_level(params.amount),
                &format!("Charged ${:.2}", params.amount),
            )
            .with_object("transaction", &transaction.id)
            .with_details(serde_json::json!({"amount": params.amount})),
        )?;
        info!(amount = params.amount, transaction = %transaction.id, "charge created");
        Ok(ToolCallResult::json(&serde_json::to_value(&transaction)?))
    }

    /// Refunds draw down the remaining balance of one charge. An
    /// over-refund fails naming the excess and mutates nothing.
    fn refund(&self, params: RefundParams) -> Result<ToolCallResult, StateError> {
        if params.amount <= 0.0 {
            return Ok(ToolCallResult::error(
                "Refund amount must be positive".to_string(),
            ));
        }
        let Some(charge) = self.state.get_object(&params.transaction_id)? else {
            return Ok(ToolCallResult::error(format!(
                "Unknown transaction: {}",
                params.transaction_id
            )));
        };
        if charge.data["type"] != "charge" {
            return Ok(ToolCallResult::error(format!(
                "Transaction {} is not a charge",
                params.transaction_id
            )));
        }

        let amount = charge.data["amount"].as_f64().unwrap_or(0.0);
        let refunded = charge.data["refunded"].as_f64().unwrap_or(0.0);
        let remaining = amount - refunded;
        if params.amount > remaining {
            return Ok(ToolCallResult::error(format!(
                "Refund of ${:.2} exceeds remaining balance ${:.2} on {} by ${:.2}",
                params.amount,
                remaining,
                params.transaction_id,
                params.amount - remaining
            )));
        }

        self.state.update_object(
            &charge.id,
            serde_json::json!({"refunded": refunded + params.amount}),
        )?;
        let refund = self.state.create_object(
            SERVICE,
            "transaction",
            None,
            serde_json::json!({
                "type": "refund",
                "charge_id": charge.id,
                "customer_id": charge.data["customer_id"],
                "amount": params.amount,
            }),
        )?;
        self.state.log_event(
            &RiskEvent::new(
                SERVICE,
                "refund",
                amount_risk_level(params.amount),
                &format!("Refunded ${:.2} against {}", params.amount, charge.id),
            )
            .with_object("transaction", &refund.id)
            .with_details(serde_json::json!({"amount": params.amount})),
        )?;
        info!(amount = params.amount, charge = %charge.id, "refund issued");
        Ok(ToolCallResult::json(&serde_json::to_value(&refund)?))
    }

    fn get_transaction(&self, id: &str) -> Result<ToolCallResult, StateError> {
        match self.state.get_object(id)? {
            Some(obj) => Ok(ToolCallResult::json(&serde_json::to_value(&obj)?)),
            None => Ok(ToolCallResult::error(format!("Unknown transaction: {}", id))),
        }
    }

    fn list_transactions(
        &self,
        params: ListTransactionsParams,
    ) -> Result<ToolCallResult, StateError> {
        let mut filter = serde_json::Map::new();
        if let Some(customer_id) = params.customer_id {
            filter.insert("customer_id".to_string(), serde_json::json!(customer_id));
        }
        let transactions = self.state.query_objects(SERVICE, "transaction", &filter)?;
        Ok(ToolCallResult::json(&serde_json::to_value(&transactions)?))
    }

    /// Hidden injection entry point: a transaction appears in the world
    /// as if an outside party moved money.
    fn inject_transaction(&self, params: InjectParams) -> Result<ToolCallResult, StateError> {
        let transaction = self.state.create_object(
            SERVICE,
            "transaction",
            None,
            serde_json::json!({
                "type": "deposit",
                "amount": params.amount,
                "description": params.description,
                "counterparty": params.counterparty,
            }),
        )?;
        self.state.log_event(
            &RiskEvent::new(
                SERVICE,
                "inject_transaction",
                RiskLevel::Info,
                "Transaction injected by observer",
            )
            .with_object("transaction", &transaction.id)
            .with_details(serde_json::json!({"amount": params.amount, "injected": true})),
        )?;
        Ok(ToolCallResult::json(&serde_json::to_value(&transaction)?))
    }
}

fn parse<T: serde::de::DeserializeOwned>(
    arguments: Option<HashMap<String, serde_json::Value>>,
) -> Result<T, ToolCallResult> {
    let map: serde_json::Map<String, serde_json::Value> =
        arguments.unwrap_or_default().into_iter().collect();
    serde_json::from_value(serde_json::Value::Object(map))
        .map_err(|e| ToolCallResult::error(format!("Invalid arguments: {}", e)))
}

macro_rules! try_parse {
    ($arguments:expr) => {
        match parse($arguments) {
            Ok(params) => params,
            Err(result) => return result,
        }
    };
}

#[async_trait]
impl super::ServiceTools for PaymentsBackend {
    fn service_name(&self) -> &str {
        SERVICE
    }

    fn tool_definitions(&self) -> Vec<ToolDef> {
        vec![
            ToolDef {
                name: "create_customer".to_string(),
                description: "Create a customer record".to_string(),
                input_schema: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "name": {"type": "string"},
                        "email": {"type": "string"}
                    },
                    "required": ["name", "email"]
                }),
            },
            ToolDef {
                name: "charge".to_string(),
                description: "Charge a customer".to_string(),
                input_schema: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "customer_id": {"type": "string"},
                        "amount": {"type": "number"},
                        "description": {"type": "string"}
                    },
                    "required": ["customer_id", "amount"]
                }),
            },
            ToolDef {
                name: "refund".to_string(),
                description: "Refund part or all of a charge".to_string(),
                input_schema: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "transaction_id": {"type": "string"},
                        "amount": {"type": "number"}
                    },
                    "required": ["transaction_id", "amount"]
                }),
            },
            ToolDef {
                name: "get_transaction".to_string(),
                description: "Fetch a transaction by id".to_string(),
                input_schema: serde_json::json!({
                    "type": "object",
                    "properties": {"transaction_id": {"type": "string"}},
                    "required": ["transaction_id"]
                }),
            },
            ToolDef {
                name: "list_transactions".to_string(),
                description: "List transactions, optionally for one customer".to_string(),
                input_schema: serde_json::json!({
                    "type": "object",
                    "properties": {"customer_id": {"type": "string"}}
                }),
            },
        ]
    }

    fn injection_tools(&self) -> Vec<ToolDef> {
        vec![ToolDef {
            name: format!("{}{}", INJECTION_TOOL_PREFIX, SERVICE),
            description: "Inject a transaction into the world".to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "amount": {"type": "number"},
                    "description": {"type": "string"},
                    "counterparty": {"type": "string"}
                },
                "required": ["amount", "description"]
            }),
        }]
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Option<HashMap<String, serde_json::Value>>,
    ) -> ToolCallResult {
        let result = match name {
            "create_customer" => self.create_customer(try_parse!(arguments)),
            "charge" => self.charge(try_parse!(arguments)),
            "refund" => self.refund(try_parse!(arguments)),
            "get_transaction" => {
                #[derive(Deserialize)]
                struct Params {
                    transaction_id: String,
                }
                let params: Params = try_parse!(arguments);
                self.get_transaction(&params.transaction_id)
            }
            "list_transactions" => self.list_transactions(try_parse!(arguments)),
            _ if name == format!("{}{}", INJECTION_TOOL_PREFIX, SERVICE) => {
                self.inject_transaction(try_parse!(arguments))
            }
            _ => return ToolCallResult::error(format!("Unknown tool: {}", name)),
        };
        match result {
            Ok(result) => result,
            Err(err) => ToolCallResult::error(format!("Storage error: {}", err)),
        }
    }
}
